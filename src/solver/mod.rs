//! Numerical solvers: conjugate gradient, backtracking line search, and the
//! Newton loop that ties them together.

/// Preconditioned conjugate gradient inner solve.
pub mod cg;
/// Armijo backtracking line search.
pub mod line_search;
/// The outer Newton loop.
pub mod newton;

pub use newton::{minimize, MinimizationResult, NewtonOptions, Status};
