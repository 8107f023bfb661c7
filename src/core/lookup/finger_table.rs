use crate::core::model::identity::Identity;
use crate::core::Address;

/// FingerIndex is the position of an entry in a finger table; entry `i` points at the successor of
/// `(owner + 2^i) mod M`.
pub type FingerIndex = usize;

/// FingerTable is the routing view of a Chord node towards the ring. Entries may be stale; they
/// are only hints used to shortcut lookups.
pub trait FingerTable: Send + Sync {
    /// Update the entry at the given index.
    fn update_entry(&self, identity: Identity, index: FingerIndex) -> anyhow::Result<()>;

    /// Removes every entry that points at the given address and returns how many were removed.
    fn evict(&self, address: &Address) -> anyhow::Result<usize>;

    /// Returns the populated entries in ascending index order.
    fn entries(&self) -> anyhow::Result<Vec<(FingerIndex, Identity)>>;

    /// Drops every entry.
    fn clear(&self) -> anyhow::Result<()>;

    /// Number of slots in the table.
    fn size(&self) -> usize;

    fn clone_box(&self) -> Box<dyn FingerTable>;
}

impl Clone for Box<dyn FingerTable> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
