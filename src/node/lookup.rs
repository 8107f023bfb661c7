use crate::core::{Identifier, Identity};
use crate::error::ChordError;
use crate::node::peer::MIN_ATTEMPT_TIMEOUT;
use crate::node::ChordNode;
use std::time::{Duration, Instant};

/// Deadline for answering a lookup whose sender waits `budget_ms`. A quarter of the budget is
/// left for the reply to travel back.
pub(super) fn forwarded_deadline(budget_ms: u64) -> Instant {
    let budget = Duration::from_millis(budget_ms);
    Instant::now() + (budget - budget / 4)
}

impl ChordNode {
    /// Resolves the successor of `id`, where `hops` counts how many times the request has already
    /// been forwarded. The lookup is bounded by `lookup_budget` from now.
    pub fn resolve_successor(&self, id: Identifier, hops: u32) -> Result<Identity, ChordError> {
        self.resolve_before(id, hops, Instant::now() + self.lookup_budget())
    }

    /// Longest a lookup started here may take: one retried call for every next hop the
    /// successor list can fall back to.
    pub(super) fn lookup_budget(&self) -> Duration {
        let per_hop = self.options.rpc_timeout * (self.options.rpc_retries + 1);
        per_hop * (self.successors.capacity() as u32 + 1)
    }

    /// Resolves the successor of `id` before `deadline`.
    ///
    /// The lookup answers locally when `id` falls between this node and its successor, and
    /// otherwise forwards to the closest preceding node it knows of. A next hop that fails to
    /// answer is dropped from the routing state and the next best candidate is tried. Failures
    /// reported from further down the chain are returned unchanged, so a caller only drops a
    /// hop that failed itself. No forward is started once the deadline has passed, and losing
    /// the last successor re-seeds the node and reports `RingIsolated`.
    pub(super) fn resolve_before(
        &self,
        id: Identifier,
        hops: u32,
        deadline: Instant,
    ) -> Result<Identity, ChordError> {
        let _enter = self.span.enter();
        if hops > self.options.max_hops {
            tracing::warn!("lookup of {} exceeded the hop bound at {} hops", id, hops);
            return Err(ChordError::LookupExceededHops { target: id, hops });
        }

        let mut last_failure = None;
        for _ in 0..=self.successors.capacity() {
            let successor = self.successor();
            if self
                .ring
                .in_right_closed_interval(id, self.identity.id(), successor.id())
            {
                tracing::trace!("{} is owned by successor {} (hops: {})", id, successor, hops);
                return Ok(successor);
            }

            let next = self.closest_preceding_node(id);
            if next == self.identity {
                return Ok(successor);
            }

            if deadline.saturating_duration_since(Instant::now()) < MIN_ATTEMPT_TIMEOUT {
                tracing::debug!("lookup of {} ran out of time before reaching {}", id, next);
                return Err(last_failure.unwrap_or_else(|| {
                    ChordError::unreachable(next.address(), "lookup deadline expired")
                }));
            }

            tracing::trace!("forwarding lookup of {} to {} (hops: {})", id, next, hops + 1);
            match self
                .peer(next.address())
                .resolve_successor(id, hops + 1, deadline)
            {
                Ok(found) => return Ok(found),
                Err(ChordError::PeerUnreachable { address, reason })
                    if address == next.address() =>
                {
                    tracing::warn!("next hop {} is unreachable: {}", next, reason);
                    self.forget(&address);
                    if self.successors.is_empty() {
                        tracing::error!("no live successor left, falling back to a singleton ring");
                        self.seed();
                        return Err(ChordError::RingIsolated(self.address()));
                    }
                    last_failure = Some(ChordError::PeerUnreachable { address, reason });
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_failure
            .unwrap_or_else(|| ChordError::unreachable(self.address(), "no next hop remained")))
    }

    /// The known member that most closely precedes `id`: the highest finger strictly inside
    /// `(self, id)`, else the furthest such successor-list entry, else the node itself.
    pub fn closest_preceding_node(&self, id: Identifier) -> Identity {
        let own = self.identity.id();
        let precedes = |candidate: &Identity| {
            *candidate != self.identity && self.ring.in_open_interval(candidate.id(), own, id)
        };

        if let Some((_, finger)) = self
            .fingers()
            .into_iter()
            .rev()
            .find(|(_, finger)| precedes(finger))
        {
            return finger;
        }

        self.successors
            .list()
            .into_iter()
            .rev()
            .find(|successor| precedes(successor))
            .unwrap_or(self.identity)
    }
}
