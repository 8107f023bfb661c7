use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Debug, Display, Formatter};

/// Identifier is a position on the Chord ring, always reduced into `[0, M)` by the `Ring` that
/// produced it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(u64);

impl Identifier {
    /// Wraps a raw ring position. Callers outside the ring geometry should go through
    /// `Ring::identifier` so that the value is reduced modulo the ring size.
    pub const fn new(raw: u64) -> Identifier {
        Identifier(raw)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<Identifier> for u64 {
    fn from(id: Identifier) -> u64 {
        id.0
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Override Debug to also call Display
impl Debug for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // This ensures both {:?} and {:#?} produce the same output as Display.
        write!(f, "{}", self)
    }
}
