use crate::error::ChordError;
use crate::node::{ChordNode, Node};

impl ChordNode {
    /// Stores a pair at the owner of the key, found by a fresh lookup on every call.
    pub(super) fn put_key(&self, key: &str, value: &str) -> Result<(), ChordError> {
        let id = self.key_id(key);
        let owner = self.find_successor(id)?;

        let _enter = self.span.enter();
        if owner.address() == self.address() {
            tracing::debug!("storing key {:?} ({}) locally", key, id);
            self.store.put(id, key, value);
            return Ok(());
        }
        tracing::debug!("storing key {:?} ({}) at {}", key, id, owner);
        self.peer(owner.address()).put(key, value)
    }

    pub(super) fn get_key(&self, key: &str) -> Result<Option<String>, ChordError> {
        let id = self.key_id(key);
        let owner = self.find_successor(id)?;

        let _enter = self.span.enter();
        if owner.address() == self.address() {
            tracing::trace!("reading key {:?} ({}) locally", key, id);
            return Ok(self.store.get(id, key));
        }
        tracing::trace!("reading key {:?} ({}) from {}", key, id, owner);
        self.peer(owner.address()).get(key)
    }
}
