use crate::core::lookup::finger_table::{FingerIndex, FingerTable};
use crate::core::model::identity::Identity;
use crate::core::Address;
use anyhow::anyhow;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, RwLock};
use tracing::{Level, Span};

/// A fixed-size array of optional finger entries, one slot per bit of the ring.
/// Uses Arc for shallow cloning - cloned instances share the same underlying data.
pub struct ArrayFingerTable {
    inner: Arc<RwLock<Vec<Option<Identity>>>>,
    span: Span,
}

impl ArrayFingerTable {
    /// Create a new empty finger table with `size` slots.
    pub fn new(parent_span: &Span, size: usize) -> ArrayFingerTable {
        let span = tracing::span!(parent: parent_span, Level::TRACE, "array_finger_table");

        ArrayFingerTable {
            inner: Arc::new(RwLock::new(vec![None; size])),
            span,
        }
    }

    fn check_index(&self, index: FingerIndex) -> anyhow::Result<()> {
        if index >= self.size() {
            return Err(anyhow!(
                "finger index {} is out of bounds for a table of {} entries",
                index,
                self.size()
            ));
        }
        Ok(())
    }
}

impl Clone for ArrayFingerTable {
    fn clone(&self) -> Self {
        // Shallow clone: cloned instances share the same underlying data via Arc
        ArrayFingerTable {
            inner: Arc::clone(&self.inner),
            span: self.span.clone(),
        }
    }
}

impl Debug for ArrayFingerTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let inner = match self.inner.read() {
            Ok(guard) => guard,
            Err(_) => return write!(f, "Failed to acquire read lock on the finger table"),
        };
        writeln!(f, "ArrayFingerTable: {{")?;
        for (i, entry) in inner.iter().enumerate() {
            writeln!(f, "Finger: {i}, Entry: {entry:?}")?;
        }
        write!(f, "}}")
    }
}

impl FingerTable for ArrayFingerTable {
    fn update_entry(&self, identity: Identity, index: FingerIndex) -> anyhow::Result<()> {
        self.check_index(index)?;

        let mut inner = match self.inner.write() {
            Ok(guard) => guard,
            Err(_) => return Err(anyhow!("Failed to acquire write lock on the finger table")),
        };
        inner[index] = Some(identity);

        let _enter = self.span.enter();
        tracing::trace!("updated finger {} with identity {}", index, identity);
        Ok(())
    }

    fn evict(&self, address: &Address) -> anyhow::Result<usize> {
        let mut inner = match self.inner.write() {
            Ok(guard) => guard,
            Err(_) => return Err(anyhow!("Failed to acquire write lock on the finger table")),
        };

        let mut evicted = 0;
        for entry in inner.iter_mut() {
            if entry.is_some_and(|identity| identity.address() == *address) {
                *entry = None;
                evicted += 1;
            }
        }

        if evicted > 0 {
            let _enter = self.span.enter();
            tracing::debug!("evicted {} finger entries pointing at {}", evicted, address);
        }
        Ok(evicted)
    }

    fn entries(&self) -> anyhow::Result<Vec<(FingerIndex, Identity)>> {
        let inner = match self.inner.read() {
            Ok(guard) => guard,
            Err(_) => return Err(anyhow!("Failed to acquire read lock on the finger table")),
        };
        Ok(inner
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| entry.map(|identity| (i, identity)))
            .collect())
    }

    fn clear(&self) -> anyhow::Result<()> {
        let mut inner = match self.inner.write() {
            Ok(guard) => guard,
            Err(_) => return Err(anyhow!("Failed to acquire write lock on the finger table")),
        };
        inner.iter_mut().for_each(|entry| *entry = None);
        Ok(())
    }

    fn size(&self) -> usize {
        // the length never changes after construction, so a poisoned lock still reports it
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn clone_box(&self) -> Box<dyn FingerTable> {
        Box::new(self.clone())
    }
}
