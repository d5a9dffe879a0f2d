//! Newton's method with a CG inner solve and Armijo line search.
//!
//! No trust region: the CG direction is always accepted subject to
//! backtracking. Convergence is judged on `||grad|| / ||grad_0||`. See
//! `SPEC_FULL.md` §4.7 for the full pseudocode this mirrors.

use crate::error::{InvalidArgument, NumericFailure};
use crate::hashvec::HashedVector;
use crate::objective::Objective;
use crate::solver::cg::{self, CgOptions};
use crate::solver::line_search::{self, LineSearchOptions};
use crate::types::Real;

/// Hyperparameters for [`NewtonSolver`].
#[derive(Clone, Debug)]
pub struct NewtonOptions {
    /// Relative gradient-norm tolerance for declaring success.
    pub epsilon: Real,
    /// Maximum number of outer Newton iterations.
    pub max_steps: usize,
    /// Preconditioner regularization weight in `(0, 1)`: `p <- (1-a) + a*p`.
    pub alpha_pcg: Real,
    /// Inner CG solver options.
    pub cg: CgOptions,
    /// Line search options.
    pub search: LineSearchOptions,
}

impl Default for NewtonOptions {
    fn default() -> Self {
        Self {
            epsilon: 0.01,
            max_steps: 1000,
            alpha_pcg: 0.01,
            cg: CgOptions::default(),
            search: LineSearchOptions::default(),
        }
    }
}

impl NewtonOptions {
    /// Validate all nested hyperparameters.
    pub fn validate(&self) -> Result<(), InvalidArgument> {
        if !(self.epsilon > 0.0) {
            return Err(crate::error::out_of_range("newton.epsilon", "> 0", self.epsilon));
        }
        if self.max_steps == 0 {
            return Err(crate::error::out_of_range("newton.max_steps", ">= 1", self.max_steps));
        }
        if !(self.alpha_pcg > 0.0 && self.alpha_pcg < 1.0) {
            return Err(crate::error::out_of_range("newton.alpha_pcg", "in (0, 1)", self.alpha_pcg));
        }
        self.cg.validate()?;
        self.search.validate()?;
        Ok(())
    }
}

/// Outcome status of a Newton solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Converged to the requested tolerance.
    Success,
    /// Stalled, exhausted the line search, or otherwise failed to progress.
    Failed,
    /// The objective diverged towards negative infinity.
    Diverged,
    /// The iteration cap was reached without convergence.
    TimedOut,
}

/// Full result of a Newton solve: final status, iteration count, and the
/// final objective/gradient norm (useful for statistics and diagnostics).
#[derive(Clone, Debug)]
pub struct MinimizationResult {
    /// Final status.
    pub status: Status,
    /// Number of outer iterations performed.
    pub iterations: usize,
    /// Final objective value.
    pub final_value: Real,
    /// Final `||grad||`.
    pub final_grad_norm: Real,
}

/// Newton's method over an [`Objective`], starting from `w0`.
///
/// Writes the final iterate into `w` in place and returns the
/// [`MinimizationResult`]. `w` is consumed as the initial point and becomes
/// the solution on return (mirroring the in-place convention used by the
/// weight buffers throughout the OVA driver).
pub fn minimize(objective: &mut dyn Objective, w: &mut HashedVector, opts: &NewtonOptions) -> Result<MinimizationResult, InvalidArgument> {
    opts.validate()?;
    let n = w.len();

    let mut g0 = vec![0.0 as Real; n];
    objective.gradient_at_zero(&mut g0);
    let g0_norm = norm(&g0);

    let mut f = objective.value(w);
    let mut g = vec![0.0 as Real; n];
    let mut p = vec![0.0 as Real; n];
    objective.gradient_and_preconditioner(w, &mut g, &mut p);

    if !f.is_finite() || !norm(&g).is_finite() {
        return Ok(MinimizationResult { status: Status::Failed, iterations: 0, final_value: f, final_grad_norm: norm(&g) });
    }

    let tol = opts.epsilon * g0_norm.max(Real::EPSILON);
    if norm(&g) <= tol {
        return Ok(MinimizationResult { status: Status::Success, iterations: 0, final_value: f, final_grad_norm: norm(&g) });
    }

    let mut f_prev = f;
    for iter in 1..=opts.max_steps {
        for pi in p.iter_mut() {
            *pi = (1.0 - opts.alpha_pcg) + opts.alpha_pcg * *pi;
        }

        let grad_norm_minv = {
            let mut acc = 0.0f64;
            for i in 0..n {
                acc += f64::from(g[i]) * f64::from(g[i]) / f64::from(p[i]);
            }
            acc as Real
        };

        let cg_result = match cg::solve(&g, &p, &opts.cg, grad_norm_minv, |d| {
            let mut out = vec![0.0 as Real; n];
            objective.hessian_times_direction(w, d, &mut out);
            out
        }) {
            Ok(r) => r,
            Err(_) => {
                return Ok(MinimizationResult { status: Status::Failed, iterations: iter, final_value: f, final_grad_norm: norm(&g) });
            }
        };
        // CG solves H d + g = 0, i.e. d is the Newton step (descent direction).
        let d = cg_result.x;

        objective.project_to_line(w, &d);
        let g_ts = dot(&g, &d);
        let ls = line_search::search(f, g_ts, &opts.search, |t| objective.lookup_on_line(t));

        if !ls.accepted {
            return Ok(MinimizationResult { status: Status::Failed, iterations: iter, final_value: f, final_grad_norm: norm(&g) });
        }

        let t = ls.step;
        let moved: Vec<Real> = w.as_slice().iter().zip(&d).map(|(wi, di)| wi + t * di).collect();
        w.assign(moved);
        objective.declare_vector_on_last_line(w, t);

        f = objective.value(w);
        objective.gradient_and_preconditioner(w, &mut g, &mut p);

        let gn = norm(&g);
        if gn <= tol {
            return Ok(MinimizationResult { status: Status::Success, iterations: iter, final_value: f, final_grad_norm: gn });
        }
        if f < -1e32 {
            return Ok(MinimizationResult { status: Status::Diverged, iterations: iter, final_value: f, final_grad_norm: gn });
        }
        if (f_prev - f).abs() <= 1e-12 * f.abs().max(1.0) {
            return Ok(MinimizationResult { status: Status::Failed, iterations: iter, final_value: f, final_grad_norm: gn });
        }
        f_prev = f;
    }

    Ok(MinimizationResult { status: Status::TimedOut, iterations: opts.max_steps, final_value: f, final_grad_norm: norm(&g) })
}

/// Map a non-convergent [`Status`] onto the [`NumericFailure`] the OVA driver
/// logs for that label; `None` for [`Status::Success`].
pub fn status_to_numeric_failure(status: Status, iterations: usize) -> Option<NumericFailure> {
    match status {
        Status::Success => None,
        Status::Failed => Some(NumericFailure::Stalled),
        Status::Diverged => Some(NumericFailure::Diverged),
        Status::TimedOut => Some(NumericFailure::NonFinite { iteration: iterations }),
    }
}

fn norm(v: &[Real]) -> Real {
    let mut acc = 0.0f64;
    for &x in v {
        acc += f64::from(x) * f64::from(x);
    }
    (acc.sqrt()) as Real
}

fn dot(a: &[Real], b: &[Real]) -> Real {
    let mut acc = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        acc += f64::from(*x) * f64::from(*y);
    }
    acc as Real
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvalidArgument as IA;

    /// `f(w) = 1/2 w^T A w + b^T w` over a fixed SPD `A`.
    struct Quadratic {
        a: Vec<Real>,
        b: Vec<Real>,
        n: usize,
        line_w: Vec<Real>,
        line_d: Vec<Real>,
    }

    impl Quadratic {
        fn mv(&self, d: &[Real]) -> Vec<Real> {
            let n = self.n;
            let mut out = vec![0.0 as Real; n];
            for i in 0..n {
                let mut acc = 0.0f64;
                for j in 0..n {
                    acc += f64::from(self.a[i * n + j]) * f64::from(d[j]);
                }
                out[i] = acc as Real;
            }
            out
        }
    }

    impl Objective for Quadratic {
        fn num_variables(&self) -> Option<usize> {
            Some(self.n)
        }
        fn value(&mut self, w: &HashedVector) -> Real {
            let aw = self.mv(w.as_slice());
            let mut acc = 0.0f64;
            for i in 0..self.n {
                acc += 0.5 * f64::from(w.as_slice()[i]) * f64::from(aw[i]) + f64::from(self.b[i]) * f64::from(w.as_slice()[i]);
            }
            acc as Real
        }
        fn gradient(&mut self, w: &HashedVector, out: &mut [Real]) {
            let aw = self.mv(w.as_slice());
            for i in 0..self.n {
                out[i] = aw[i] + self.b[i];
            }
        }
        fn gradient_at_zero(&mut self, out: &mut [Real]) {
            out.copy_from_slice(&self.b);
        }
        fn hessian_times_direction(&mut self, _w: &HashedVector, d: &[Real], out: &mut [Real]) {
            out.copy_from_slice(&self.mv(d));
        }
        fn diag_preconditioner(&mut self, _w: &HashedVector, out: &mut [Real]) {
            for i in 0..self.n {
                out[i] = self.a[i * self.n + i];
            }
        }
        fn project_to_line(&mut self, w: &HashedVector, d: &[Real]) {
            self.line_w = w.as_slice().to_vec();
            self.line_d = d.to_vec();
        }
        fn lookup_on_line(&mut self, t: Real) -> Real {
            let moved: Vec<Real> = self.line_w.iter().zip(&self.line_d).map(|(w, d)| w + t * d).collect();
            self.value(&HashedVector::new(moved))
        }
    }

    #[test]
    fn converges_on_quadratic() -> Result<(), IA> {
        let n = 3;
        // A = diag(4, 9, 2) (SPD, trivially).
        let a = vec![4.0, 0.0, 0.0, 0.0, 9.0, 0.0, 0.0, 0.0, 2.0];
        let b = vec![1.0, -2.0, 0.5];
        let mut obj = Quadratic { a: a.clone(), b: b.clone(), n, line_w: vec![], line_d: vec![] };

        let mut w = HashedVector::zeros(n);
        let opts = NewtonOptions { epsilon: 1e-6, max_steps: 10, ..NewtonOptions::default() };
        let result = minimize(&mut obj, &mut w, &opts)?;
        assert_eq!(result.status, Status::Success);

        // expected w* = -A^-1 b
        let expected = [-b[0] / a[0], -b[4] / a[4], -b[8] / a[8]];
        for (got, want) in w.as_slice().iter().zip(expected) {
            assert!((got - want).abs() < 1e-3, "got={got} want={want}");
        }
        Ok(())
    }
}
