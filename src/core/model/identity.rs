use crate::core::model::ring::Ring;
use crate::core::{Address, Identifier};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

/// Identity is an immutable reference to a ring member: its position on the ring and the address
/// it can be reached at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    id: Identifier,
    address: Address,
}

impl Identity {
    /// Create a new Identity
    pub fn new(id: Identifier, address: Address) -> Identity {
        Identity { id, address }
    }

    /// Derives the identity of the member listening on `address` by hashing the address onto the
    /// ring.
    pub fn from_address(ring: &Ring, address: Address) -> Identity {
        Identity {
            id: ring.hash_to_identifier(&address.to_string()),
            address,
        }
    }

    /// Get the identifier of the node
    pub fn id(&self) -> Identifier {
        self.id
    }

    /// Get the address of the node
    pub fn address(&self) -> Address {
        self.address
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.address)
    }
}
