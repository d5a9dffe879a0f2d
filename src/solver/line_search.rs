//! Armijo backtracking line search.

use crate::error::InvalidArgument;
use crate::types::Real;

/// Hyperparameters for [`search`].
#[derive(Clone, Debug)]
pub struct LineSearchOptions {
    /// Initial step length, `> 0`.
    pub alpha0: Real,
    /// Shrink factor applied on rejection, in `(0, 1)`.
    pub rho: Real,
    /// Armijo sufficient-decrease constant, in `(0, 1)`.
    pub eta: Real,
    /// Maximum number of backtracking steps.
    pub max_steps: usize,
}

impl Default for LineSearchOptions {
    fn default() -> Self {
        Self { alpha0: 1.0, rho: 0.5, eta: 0.01, max_steps: 20 }
    }
}

impl LineSearchOptions {
    /// Validate ranges.
    pub fn validate(&self) -> Result<(), InvalidArgument> {
        if !(self.alpha0 > 0.0) {
            return Err(crate::error::out_of_range("search.alpha0", "> 0", self.alpha0));
        }
        if !(self.rho > 0.0 && self.rho < 1.0) {
            return Err(crate::error::out_of_range("search.rho", "in (0, 1)", self.rho));
        }
        if !(self.eta > 0.0 && self.eta < 1.0) {
            return Err(crate::error::out_of_range("search.eta", "in (0, 1)", self.eta));
        }
        if self.max_steps == 0 {
            return Err(crate::error::out_of_range("search.max_steps", ">= 1", self.max_steps));
        }
        Ok(())
    }
}

/// Outcome of a line search.
#[derive(Clone, Debug)]
pub struct LineSearchResult {
    /// Accepted step length; `0.0` if the search was exhausted.
    pub step: Real,
    /// `g(step)`, the objective value at the accepted point (or `g(0)` on failure).
    pub value: Real,
    /// Whether a step was accepted.
    pub accepted: bool,
}

/// Backtrack `alpha` from `alpha0` while `g(alpha) - g0 > eta * alpha * g_ts`.
///
/// `g` is the projected scalar objective (typically
/// `Objective::lookup_on_line`). `g_ts` is the directional derivative
/// `grad f(w)^T d` at the line's origin.
pub fn search(g0: Real, g_ts: Real, opts: &LineSearchOptions, mut g: impl FnMut(Real) -> Real) -> LineSearchResult {
    let mut alpha = opts.alpha0;
    for _ in 0..opts.max_steps {
        let val = g(alpha);
        if val.is_finite() && val - g0 <= opts.eta * alpha * g_ts {
            return LineSearchResult { step: alpha, value: val, accepted: true };
        }
        alpha *= opts.rho;
    }
    LineSearchResult { step: 0.0, value: g0, accepted: false }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_full_step_on_strongly_decreasing_quadratic() {
        let opts = LineSearchOptions::default();
        // g(t) = (t-1)^2 - 1, g(0) = 0, directional derivative at 0 is -2.
        let result = search(0.0, -2.0, &opts, |t| (t - 1.0).powi(2) - 1.0);
        assert!(result.accepted);
    }

    #[test]
    fn rejects_when_objective_increases() {
        let opts = LineSearchOptions::default();
        let result = search(0.0, -1.0, &opts, |t| t * t + 10.0 * t);
        // with aggressive increase the search should backtrack toward 0 but
        // may still find a small accepted step; exhausting is also valid.
        assert!(result.step <= opts.alpha0);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let mut opts = LineSearchOptions::default();
        opts.rho = 1.5;
        assert!(opts.validate().is_err());
    }
}
