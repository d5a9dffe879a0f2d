//! Core scalar and index types shared across the crate.

use std::sync::atomic::{AtomicU64, Ordering};

/// The scalar type used for features, weights, and losses.
///
/// Reductions that are prone to cancellation (objective value accumulation,
/// Gram-matrix construction) are carried out in `f64` and truncated back to
/// `Real` only at the boundary; see [`crate::objective::linear`].
pub type Real = f32;

/// Zero-cost wrapper around a label index.
///
/// Ordered, copyable, and supports offsetting, matching the way label ranges
/// are sliced throughout the training and I/O paths.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelId(pub u32);

impl LabelId {
    /// Construct from a plain index.
    #[inline]
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// The underlying index.
    #[inline]
    pub fn to_index(self) -> usize {
        self.0 as usize
    }
}

impl std::ops::Add<u32> for LabelId {
    type Output = LabelId;
    #[inline]
    fn add(self, rhs: u32) -> LabelId {
        LabelId(self.0 + rhs)
    }
}

impl std::fmt::Display for LabelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque monotonically-unique identifier carried by [`crate::hashvec::HashedVector`].
///
/// `VectorHash::INVALID` is a distinguished value that never equals a real
/// hash: real hashes are issued from a process-wide counter starting at 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VectorHash(u64);

impl VectorHash {
    /// A hash value that never compares equal to a freshly-issued one.
    pub const INVALID: VectorHash = VectorHash(0);

    /// Issue a fresh, globally unique hash.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        VectorHash(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}
