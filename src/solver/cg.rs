//! Preconditioned conjugate gradient, used as the Newton solver's inner loop.
//!
//! Solves `A x + b = 0` for SPD `A`, given only a matrix-vector-product
//! closure and a positive diagonal preconditioner. The stopping rule tracks
//! progress of the quadratic approximation rather than the residual norm
//! directly; see `SPEC_FULL.md` §4.5.

use crate::error::{InvalidArgument, NumericFailure};
use crate::types::Real;

/// Hyperparameters for [`solve`].
#[derive(Clone, Debug)]
pub struct CgOptions {
    /// Relative tolerance on quadratic-approximation progress, in `(0, 1)`.
    pub epsilon: Real,
    /// Hard cap on iteration count; the effective cap is `max(n, max_iter)`.
    pub max_iter: usize,
}

impl Default for CgOptions {
    fn default() -> Self {
        Self { epsilon: 0.5, max_iter: 10 }
    }
}

impl CgOptions {
    /// Validate ranges.
    pub fn validate(&self) -> Result<(), InvalidArgument> {
        if !(self.epsilon > 0.0 && self.epsilon < 1.0) {
            return Err(crate::error::out_of_range("cg.epsilon", "in (0, 1)", self.epsilon));
        }
        Ok(())
    }
}

/// Result of a CG solve.
#[derive(Clone, Debug)]
pub struct CgResult {
    /// The approximate solution `x`.
    pub x: Vec<Real>,
    /// Number of iterations performed.
    pub iterations: usize,
}

/// Solve `A x + b = 0` via preconditioned CG.
///
/// `mv` computes `A * d` given a direction `d`. `precond` is the diagonal of
/// an SPD preconditioner (all entries strictly positive). `grad_norm_minv` is
/// `sqrt(g^T M^-1 g)` for the gradient `g` the caller is really solving
/// against (used only to cap `epsilon` in the stopping rule, matching the
/// Newton solver's use of CG).
pub fn solve(
    b: &[Real],
    precond: &[Real],
    opts: &CgOptions,
    grad_norm_minv: Real,
    mut mv: impl FnMut(&[Real]) -> Vec<Real>,
) -> Result<CgResult, NumericFailure> {
    let n = b.len();
    let mut x = vec![0.0 as Real; n];
    // Solving A x = -b: residual r = -b - A x, which is -b when x = 0.
    let mut r: Vec<Real> = b.iter().map(|&v| -v).collect();
    let mut z: Vec<Real> = (0..n).map(|i| r[i] / precond[i]).collect();
    let mut p = z.clone();

    let tol = opts.epsilon.min(grad_norm_minv.max(0.0).sqrt());
    let max_iter = opts.max_iter.max(n).max(1);

    let mut q_prev = 0.0f64;
    let mut rz = dot(&r, &z);

    for k in 0..max_iter {
        let ap = mv(&p);
        let p_ap = dot(&p, &ap);
        if (p_ap as f64).abs() < 1e-16 {
            return Err(NumericFailure::DegenerateDirection { iteration: k });
        }
        let alpha = (rz as f64 / p_ap as f64) as Real;
        for i in 0..n {
            x[i] += alpha * p[i];
            r[i] -= alpha * ap[i];
        }

        // Q(x) = 1/2 x^T A x + b^T x (the quadratic whose gradient is A x + b).
        // Since r = -b - A x, A x = -b - r, so Q(x) = 1/2 x^T b - 1/2 x^T r = -1/2 x^T (r - b).
        let mut q_k = 0.0f64;
        for i in 0..n {
            q_k += -0.5 * f64::from(x[i]) * f64::from(r[i] - b[i]);
        }

        let progress = q_k - q_prev;
        if q_k <= 0.0 && progress <= 0.0 && (k as f64 + 1.0) * progress.abs() >= f64::from(tol) * q_k.abs() {
            return Ok(CgResult { x, iterations: k + 1 });
        }
        q_prev = q_k;

        for i in 0..n {
            z[i] = r[i] / precond[i];
        }
        let rz_new = dot(&r, &z);
        let beta = (rz_new as f64 / rz as f64) as Real;
        for i in 0..n {
            p[i] = z[i] + beta * p[i];
        }
        rz = rz_new;
    }

    Ok(CgResult { x, iterations: max_iter })
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
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn solves_random_spd_system() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 5;
        let mut m = vec![0.0 as Real; n * n];
        for v in m.iter_mut() {
            *v = rng.gen_range(-1.0..1.0);
        }
        // A = M M^T + n*I, guaranteed SPD and well conditioned.
        let mut a = vec![0.0 as Real; n * n];
        for i in 0..n {
            for j in 0..n {
                let mut acc = 0.0f64;
                for k in 0..n {
                    acc += f64::from(m[i * n + k]) * f64::from(m[j * n + k]);
                }
                a[i * n + j] = acc as Real;
            }
            a[i * n + i] += n as Real;
        }
        let b: Vec<Real> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let precond: Vec<Real> = (0..n).map(|i| a[i * n + i]).collect();

        let opts = CgOptions { epsilon: 1e-4, max_iter: 50 };
        let result = solve(&b, &precond, &opts, 0.0, |d| {
            let mut out = vec![0.0 as Real; n];
            for i in 0..n {
                let mut acc = 0.0f64;
                for j in 0..n {
                    acc += f64::from(a[i * n + j]) * f64::from(d[j]);
                }
                out[i] = acc as Real;
            }
            out
        })
        .unwrap();

        let mut residual = 0.0f64;
        let mut bnorm = 0.0f64;
        for i in 0..n {
            let mut ax = 0.0f64;
            for j in 0..n {
                ax += f64::from(a[i * n + j]) * f64::from(result.x[j]);
            }
            let r = ax + f64::from(b[i]);
            residual += r * r;
            bnorm += f64::from(b[i]) * f64::from(b[i]);
        }
        assert!((residual.sqrt()) <= 1e-2 * bnorm.sqrt().max(1.0));
    }
}
