mod chord_node;
mod kv;
mod lookup;
pub mod maintenance;
pub mod peer;
mod snapshot;
mod stabilize;

#[cfg(test)]
mod lookup_test;

use crate::core::{Identifier, Identity, Ring};
use crate::error::ChordError;
use std::time::Duration;

pub use chord_node::ChordNode;
pub use maintenance::{spawn_maintenance, MaintenanceConfig};
pub use peer::RemotePeer;
pub use snapshot::NodeSnapshot;

pub const DEFAULT_SUCCESSOR_LIST_LEN: usize = 3;
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_RPC_RETRIES: u32 = 1;

/// Per-node tunables of the ring protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeOptions {
    /// Number of successors kept for fault tolerance.
    pub successor_list_len: usize,
    /// Upper bound on a single remote call.
    pub rpc_timeout: Duration,
    /// Extra attempts after a failed remote call before the peer counts as unreachable.
    pub rpc_retries: u32,
    /// A lookup that has been forwarded more often than this fails with `LookupExceededHops`.
    pub max_hops: u32,
}

impl NodeOptions {
    /// Defaults for the given ring; the hop bound is twice the finger count.
    pub fn for_ring(ring: &Ring) -> NodeOptions {
        NodeOptions {
            successor_list_len: DEFAULT_SUCCESSOR_LIST_LEN,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            rpc_retries: DEFAULT_RPC_RETRIES,
            max_hops: 2 * ring.finger_count() as u32,
        }
    }
}

/// Node is a single member of a Chord ring.
pub trait Node {
    /// Returns the identity of the node.
    fn identity(&self) -> Identity;

    /// Joins the ring through the given introducer, or starts a new single-node ring when no
    /// introducer is given. Joining again discards the previous neighbors.
    fn join(&self, introducer: Option<Identity>) -> Result<(), ChordError>;

    /// Resolves the member responsible for `id`, that is the first member clockwise from `id`.
    fn find_successor(&self, id: Identifier) -> Result<Identity, ChordError>;

    /// Stores a key-value pair at the member responsible for the key.
    fn insert(&self, key: &str, value: &str) -> Result<(), ChordError>;

    /// Fetches the value of `key` from the member responsible for it.
    /// Returns `Ok(None)` if that member holds no value for the key.
    fn lookup(&self, key: &str) -> Result<Option<String>, ChordError>;

    /// A point-in-time view of the node's neighbors, fingers and stored keys.
    fn describe(&self) -> NodeSnapshot;
}
