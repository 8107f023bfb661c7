use crate::core::model::identity::Identity;
use crate::core::Address;
use parking_lot::RwLock;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tracing::{Level, Span};

/// SuccessorList holds up to `capacity` of the nearest known members clockwise from its owner,
/// nearest first. The owner never appears in the list, except that a seeded singleton ring holds
/// `capacity` copies of the owner.
/// Uses Arc for shallow cloning - cloned instances share the same underlying data.
pub struct SuccessorList {
    owner: Identity,
    capacity: usize,
    entries: Arc<RwLock<Vec<Identity>>>,
    span: Span,
}

impl SuccessorList {
    /// Creates an empty list. `capacity` must be at least 1.
    pub fn new(parent_span: &Span, owner: Identity, capacity: usize) -> SuccessorList {
        let span = tracing::span!(parent: parent_span, Level::TRACE, "successor_list");
        SuccessorList {
            owner,
            capacity: capacity.max(1),
            entries: Arc::new(RwLock::new(Vec::with_capacity(capacity))),
            span,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Resets the list to a singleton ring: `capacity` copies of the owner.
    pub fn seed(&self) {
        *self.entries.write() = vec![self.owner; self.capacity];
        let _enter = self.span.enter();
        tracing::trace!("seeded successor list with {} copies of {}", self.capacity, self.owner);
    }

    /// The immediate successor, if any is known.
    pub fn first(&self) -> Option<Identity> {
        self.entries.read().first().copied()
    }

    pub fn list(&self) -> Vec<Identity> {
        self.entries.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Replaces the whole list with a single successor, as learned when joining.
    pub fn reset_to(&self, successor: Identity) {
        if successor == self.owner {
            self.seed();
            return;
        }
        *self.entries.write() = vec![successor];
    }

    /// Puts a closer successor in front of the current ones. Copies of the owner are dropped.
    pub fn push_front(&self, successor: Identity) {
        if successor == self.owner {
            return;
        }
        let mut entries = self.entries.write();
        entries.retain(|entry| *entry != successor && *entry != self.owner);
        entries.insert(0, successor);
        entries.truncate(self.capacity);

        let _enter = self.span.enter();
        tracing::trace!("adopted {} as immediate successor", successor);
    }

    /// Removes every entry at `address` and returns true if anything was removed.
    pub fn remove(&self, address: &Address) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.address() != *address);
        before != entries.len()
    }

    /// Rebuilds the list from the current successor and that successor's own list: the
    /// successor first, then its entries in order, skipping duplicates, stopping where the list
    /// wraps back to the owner, truncated to capacity.
    pub fn reconcile(&self, successor: Identity, remote: &[Identity]) {
        if successor == self.owner {
            self.seed();
            return;
        }

        let mut rebuilt = Vec::with_capacity(self.capacity);
        rebuilt.push(successor);
        for entry in remote {
            if rebuilt.len() >= self.capacity || *entry == self.owner {
                break;
            }
            if !rebuilt.contains(entry) {
                rebuilt.push(*entry);
            }
        }

        let mut entries = self.entries.write();
        if *entries != rebuilt {
            let _enter = self.span.enter();
            tracing::trace!("successor list changed from {:?} to {:?}", *entries, rebuilt);
            *entries = rebuilt;
        }
    }
}

impl Clone for SuccessorList {
    fn clone(&self) -> Self {
        // Shallow clone: cloned instances share the same underlying data via Arc
        SuccessorList {
            owner: self.owner,
            capacity: self.capacity,
            entries: Arc::clone(&self.entries),
            span: self.span.clone(),
        }
    }
}

impl Debug for SuccessorList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuccessorList")
            .field("owner", &self.owner)
            .field("entries", &*self.entries.read())
            .finish()
    }
}
