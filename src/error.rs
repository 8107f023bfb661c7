//! Protocol-level failures of ring operations.
//!
//! `ChordError` values cross node boundaries inside `Payload::Failure`, so the type is
//! serializable and cheap to clone. Ambient plumbing (configuration, transport setup, logging)
//! stays on `anyhow`; a `ChordError` wrapped into an `anyhow::Error` can be recovered with
//! [`ChordError::classify`].

use crate::core::{Address, Identifier};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ChordError {
    /// A remote call did not complete within its timeout and retries.
    #[error("peer {address} is unreachable: {reason}")]
    PeerUnreachable { address: Address, reason: String },

    /// An incoming message could not be decoded, or was a reply where a request was expected.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The hop counter of a lookup exceeded the configured bound.
    #[error("lookup of {target} exceeded the hop bound at {hops} hops")]
    LookupExceededHops { target: Identifier, hops: u32 },

    #[error("failed to join the ring through {introducer}: {reason}")]
    JoinError { introducer: Address, reason: String },

    /// Every successor of the node failed and it fell back to a singleton ring.
    #[error("node {0} lost all of its successors")]
    RingIsolated(Address),
}

impl ChordError {
    /// Finds the first `ChordError` in the chain of an `anyhow` error, if any.
    pub fn classify(err: &anyhow::Error) -> Option<ChordError> {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<ChordError>())
            .cloned()
    }

    pub fn unreachable(address: Address, reason: impl ToString) -> ChordError {
        ChordError::PeerUnreachable {
            address,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_classify_walks_context_chain() {
        let address = Address::new("10.0.0.1", "8081");
        let err: anyhow::Result<()> = Err(ChordError::MalformedMessage("bad".to_string()).into());
        let err = err
            .context("decoding reply")
            .context(format!("calling {}", address))
            .unwrap_err();
        assert_eq!(
            ChordError::classify(&err),
            Some(ChordError::MalformedMessage("bad".to_string()))
        );

        let plain = anyhow::anyhow!("connection refused");
        assert_eq!(ChordError::classify(&plain), None);
    }

    #[test]
    fn test_error_round_trips_through_json() {
        let err = ChordError::LookupExceededHops {
            target: Identifier::new(55),
            hops: 15,
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: ChordError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
        assert_eq!(
            err.to_string(),
            "lookup of 55 exceeded the hop bound at 15 hops"
        );
    }
}
