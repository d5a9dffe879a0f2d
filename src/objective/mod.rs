//! The objective contract and its implementations.
//!
//! Every trainable loss in this crate — margin losses, regularizers, and
//! their sums — implements [`Objective`]. The contract is deliberately small:
//! value, gradient, Hessian-vector products, a diagonal preconditioner, and a
//! cheap "evaluate along a line" fast path used by the line search. See
//! `SPEC_FULL.md` §4.2 for the full rationale.

/// Margin loss functions (squared hinge, Huber hinge, logistic).
pub mod margin;
/// Pointwise regularizers (squared, Huber, elastic net).
pub mod regularizer;
/// `LinearClassifierLoss`: the per-label objective combining a feature
/// matrix, margin function, regularizer, and cost-sensitive labels.
pub mod linear;

use crate::error::InvalidArgument;
use crate::hashvec::HashedVector;
use crate::types::Real;

/// The contract every trainable objective implements.
///
/// All methods take a [`HashedVector`] (never an owning `Vec`) so that
/// implementations can cache intermediate quantities keyed by the vector's
/// hash instead of recomputing them or comparing contents.
pub trait Objective {
    /// The number of variables this objective expects, or `None` if it
    /// accepts any dimension (e.g. a bare regularizer used standalone).
    fn num_variables(&self) -> Option<usize>;

    /// Validate that `w` has the expected dimension, if this objective has one.
    fn check_dimension(&self, w: &HashedVector) -> Result<(), InvalidArgument> {
        if let Some(n) = self.num_variables() {
            if w.len() != n {
                return Err(InvalidArgument::DimensionMismatch { expected: n, actual: w.len() });
            }
        }
        Ok(())
    }

    /// `f(w)`.
    fn value(&mut self, w: &HashedVector) -> Real;

    /// Write `grad f(w)` into `out`.
    fn gradient(&mut self, w: &HashedVector, out: &mut [Real]);

    /// Write `grad f(0)` into `out`. Typically much cheaper than `gradient` at an
    /// arbitrary point, since many cached quantities are trivial at the origin.
    fn gradient_at_zero(&mut self, out: &mut [Real]);

    /// Write `H(w) * d` into `out`.
    fn hessian_times_direction(&mut self, w: &HashedVector, d: &[Real], out: &mut [Real]);

    /// Write an approximation of `diag(H(w))` into `out`, suitable as a CG preconditioner.
    fn diag_preconditioner(&mut self, w: &HashedVector, out: &mut [Real]);

    /// Combined gradient + preconditioner computation; implementations may
    /// share work between the two. Default implementation just calls both.
    fn gradient_and_preconditioner(&mut self, w: &HashedVector, g_out: &mut [Real], p_out: &mut [Real]) {
        self.gradient(w, g_out);
        self.diag_preconditioner(w, p_out);
    }

    /// Precompute whatever caches make `lookup_on_line` O(1) amortized for the
    /// line `w + t*d`.
    fn project_to_line(&mut self, w: &HashedVector, d: &[Real]);

    /// Evaluate `f(w + t*d)` using the caches set up by `project_to_line`.
    fn lookup_on_line(&mut self, t: Real) -> Real;

    /// Hint that a given vector equals the position last evaluated by
    /// `lookup_on_line`, letting the caller's own caches (e.g. `X^T w`) update
    /// without an extra matrix multiply. Implementations that maintain such a
    /// cache should refresh it here; the default is a no-op.
    fn declare_vector_on_last_line(&mut self, _w: &HashedVector, _t: Real) {}
}
