use crate::core::model::identifier::Identifier;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Largest supported bit width for a power-of-two ring.
pub const MAX_RING_BITS: u32 = 63;

/// Ring captures the geometry of the circular identifier space `[0, modulus)`.
///
/// All interval predicates are clockwise arcs that wrap around zero. When both endpoints are the
/// same identifier the arc is the whole ring: the open interval holds everything but the endpoint,
/// and both half-open intervals hold every identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ring {
    modulus: u64,
}

impl Ring {
    /// Creates a ring of the given size. Any modulus of at least 2 is accepted.
    pub fn new(modulus: u64) -> anyhow::Result<Ring> {
        if modulus < 2 {
            return Err(anyhow!("ring modulus must be at least 2, got {}", modulus));
        }
        Ok(Ring { modulus })
    }

    /// Creates a ring of size `2^bits`.
    pub fn with_bits(bits: u32) -> anyhow::Result<Ring> {
        if bits == 0 || bits > MAX_RING_BITS {
            return Err(anyhow!(
                "ring bits must be within 1..={}, got {}",
                MAX_RING_BITS,
                bits
            ));
        }
        Ring::new(1u64 << bits)
    }

    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    /// Number of finger table entries, `ceil(log2(modulus))`.
    pub fn finger_count(&self) -> usize {
        (u64::BITS - (self.modulus - 1).leading_zeros()) as usize
    }

    /// Reduces a raw value onto the ring.
    pub fn identifier(&self, raw: u64) -> Identifier {
        Identifier::new(raw % self.modulus)
    }

    /// Clockwise addition.
    pub fn add(&self, id: Identifier, offset: u64) -> Identifier {
        let sum = (id.value() as u128 + offset as u128) % self.modulus as u128;
        Identifier::new(sum as u64)
    }

    /// Start of the i-th finger interval of `id`, that is `(id + 2^i) mod M`.
    pub fn finger_start(&self, id: Identifier, i: usize) -> Identifier {
        let offset = (1u128 << i) % self.modulus as u128;
        self.add(id, offset as u64)
    }

    /// Clockwise distance travelled from `from` to reach `to`.
    pub fn distance(&self, from: Identifier, to: Identifier) -> u64 {
        let m = self.modulus as u128;
        let d = (to.value() as u128 % m + m - from.value() as u128 % m) % m;
        d as u64
    }

    /// x ∈ (a, b)
    pub fn in_open_interval(&self, x: Identifier, a: Identifier, b: Identifier) -> bool {
        if a == b {
            return x != a;
        }
        let dx = self.distance(a, x);
        dx > 0 && dx < self.distance(a, b)
    }

    /// x ∈ [a, b)
    pub fn in_left_closed_interval(&self, x: Identifier, a: Identifier, b: Identifier) -> bool {
        if a == b {
            return true;
        }
        self.distance(a, x) < self.distance(a, b)
    }

    /// x ∈ (a, b]
    pub fn in_right_closed_interval(&self, x: Identifier, a: Identifier, b: Identifier) -> bool {
        if a == b {
            return true;
        }
        let dx = self.distance(a, x);
        dx > 0 && dx <= self.distance(a, b)
    }

    /// Hashes an arbitrary string onto the ring: SHA-1, first eight digest bytes read big-endian,
    /// reduced modulo the ring size. Node identifiers hash the node's `host:port` address and keys
    /// hash the key string, so every member computes the same placement.
    pub fn hash_to_identifier(&self, s: &str) -> Identifier {
        let digest = Sha1::digest(s.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        self.identifier(u64::from_be_bytes(prefix))
    }
}
