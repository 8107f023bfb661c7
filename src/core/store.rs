use crate::core::Identifier;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{Level, Span};

/// DataStore holds the key-value pairs owned by one node, ordered by the ring position of the
/// key. Entries keep the original key, so distinct keys hashing to the same identifier never
/// shadow each other.
/// Uses Arc for shallow cloning - cloned instances share the same underlying data.
pub struct DataStore {
    entries: Arc<RwLock<BTreeMap<(Identifier, String), String>>>,
    span: Span,
}

impl DataStore {
    pub fn new(parent_span: &Span) -> DataStore {
        let span = tracing::span!(parent: parent_span, Level::TRACE, "data_store");
        DataStore {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            span,
        }
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put(&self, id: Identifier, key: &str, value: &str) {
        let previous = self
            .entries
            .write()
            .insert((id, key.to_string()), value.to_string());

        let _enter = self.span.enter();
        tracing::trace!(
            "stored key {:?} at {} (replaced: {})",
            key,
            id,
            previous.is_some()
        );
    }

    pub fn get(&self, id: Identifier, key: &str) -> Option<String> {
        self.entries.read().get(&(id, key.to_string())).cloned()
    }

    /// Snapshot of every entry as `(identifier, key, value)`, in ring order.
    pub fn entries(&self) -> Vec<(Identifier, String, String)> {
        self.entries
            .read()
            .iter()
            .map(|((id, key), value)| (*id, key.clone(), value.clone()))
            .collect()
    }
}

impl Clone for DataStore {
    fn clone(&self) -> Self {
        DataStore {
            entries: Arc::clone(&self.entries),
            span: self.span.clone(),
        }
    }
}
