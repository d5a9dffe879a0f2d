//! Pointwise regularizers.
//!
//! `R(w) = s * sum_{j in J} r(w_j)`, where `J` excludes the last coordinate
//! when `ignore_bias` is set (the bias-augmentation convention described in
//! `SPEC_FULL.md` §9).

use crate::error::InvalidArgument;
use crate::types::Real;

/// A pointwise regularizer function `r`.
#[derive(Clone, Debug)]
pub enum RegularizerKind {
    /// `w^2 / 2`.
    Squared,
    /// Huber penalty with crossover `epsilon`.
    Huber {
        /// Crossover radius between the quadratic center and linear tails.
        epsilon: Real,
    },
    /// `alpha * Squared + (1 - alpha) * Huber(epsilon)`.
    Elastic {
        /// Crossover radius for the Huber component.
        epsilon: Real,
        /// Interpolation weight in `[0, 1]`; 1 is pure L2, 0 is pure Huber.
        alpha: Real,
    },
}

impl RegularizerKind {
    fn point_value(&self, w: Real) -> Real {
        match *self {
            RegularizerKind::Squared => 0.5 * w * w,
            RegularizerKind::Huber { epsilon } => huber_value(w, epsilon),
            RegularizerKind::Elastic { epsilon, alpha } => {
                alpha * 0.5 * w * w + (1.0 - alpha) * huber_value(w, epsilon)
            }
        }
    }

    fn point_grad(&self, w: Real) -> Real {
        match *self {
            RegularizerKind::Squared => w,
            RegularizerKind::Huber { epsilon } => huber_grad(w, epsilon),
            RegularizerKind::Elastic { epsilon, alpha } => alpha * w + (1.0 - alpha) * huber_grad(w, epsilon),
        }
    }

    fn point_curvature(&self, w: Real) -> Real {
        match *self {
            RegularizerKind::Squared => 1.0,
            RegularizerKind::Huber { epsilon } => huber_curvature(w, epsilon),
            RegularizerKind::Elastic { epsilon, alpha } => alpha + (1.0 - alpha) * huber_curvature(w, epsilon),
        }
    }
}

fn huber_value(w: Real, epsilon: Real) -> Real {
    if w.abs() <= epsilon {
        w * w / (2.0 * epsilon)
    } else {
        w.abs() - epsilon / 2.0
    }
}

fn huber_grad(w: Real, epsilon: Real) -> Real {
    if w.abs() <= epsilon {
        w / epsilon
    } else {
        w.signum()
    }
}

fn huber_curvature(w: Real, epsilon: Real) -> Real {
    if w.abs() <= epsilon {
        1.0 / epsilon
    } else {
        1.0 / (2.0 * w.abs().max(epsilon))
    }
}

/// A configured regularizer: kind, overall strength, and whether the last
/// coordinate (the bias column) is excluded.
#[derive(Clone, Debug)]
pub struct Regularizer {
    kind: RegularizerKind,
    strength: Real,
    ignore_bias: bool,
}

impl Regularizer {
    /// L2 / squared regularizer.
    pub fn squared(strength: Real, ignore_bias: bool) -> Result<Self, InvalidArgument> {
        Self::new(RegularizerKind::Squared, strength, ignore_bias)
    }

    /// Huber regularizer.
    pub fn huber(strength: Real, epsilon: Real, ignore_bias: bool) -> Result<Self, InvalidArgument> {
        if !(epsilon > 0.0) {
            return Err(crate::error::out_of_range("regularizer.epsilon", "> 0", epsilon));
        }
        Self::new(RegularizerKind::Huber { epsilon }, strength, ignore_bias)
    }

    /// Elastic-net style interpolation between squared and Huber.
    pub fn elastic(strength: Real, epsilon: Real, interpolation: Real, ignore_bias: bool) -> Result<Self, InvalidArgument> {
        if !(epsilon > 0.0) {
            return Err(crate::error::out_of_range("regularizer.epsilon", "> 0", epsilon));
        }
        if !(0.0..=1.0).contains(&interpolation) {
            return Err(crate::error::out_of_range("regularizer.interpolation", "in [0, 1]", interpolation));
        }
        Self::new(RegularizerKind::Elastic { epsilon, alpha: interpolation }, strength, ignore_bias)
    }

    fn new(kind: RegularizerKind, strength: Real, ignore_bias: bool) -> Result<Self, InvalidArgument> {
        if strength < 0.0 {
            return Err(crate::error::out_of_range("regularizer.strength", ">= 0", strength));
        }
        Ok(Self { kind, strength, ignore_bias })
    }

    fn active_len(&self, n: usize) -> usize {
        if self.ignore_bias && n > 0 {
            n - 1
        } else {
            n
        }
    }

    /// `R(w)`.
    pub fn value(&self, w: &[Real]) -> Real {
        let active = self.active_len(w.len());
        let sum: f64 = w[..active].iter().map(|&x| f64::from(self.kind.point_value(x))).sum();
        self.strength * sum as Real
    }

    /// Add `grad R(w)` into `out` (accumulates, does not overwrite).
    pub fn add_gradient(&self, w: &[Real], out: &mut [Real]) {
        let active = self.active_len(w.len());
        for j in 0..active {
            out[j] += self.strength * self.kind.point_grad(w[j]);
        }
    }

    /// Add `diag(R''(w)) .* d` into `out` (the regularizer's Hessian is diagonal).
    pub fn add_hessian_times_direction(&self, w: &[Real], d: &[Real], out: &mut [Real]) {
        let active = self.active_len(w.len());
        for j in 0..active {
            out[j] += self.strength * self.kind.point_curvature(w[j]) * d[j];
        }
    }

    /// Add `diag(R''(w))` into `out`.
    pub fn add_diag_curvature(&self, w: &[Real], out: &mut [Real]) {
        let active = self.active_len(w.len());
        for j in 0..active {
            out[j] += self.strength * self.kind.point_curvature(w[j]);
        }
    }

    /// Closed-form line evaluation for the squared regularizer:
    /// `||w + t d||^2 = ||w||^2 + 2t <w,d> + t^2 ||d||^2` over the active range.
    /// For Huber/Elastic kinds this falls back to `None`, signalling that the
    /// caller must recompute `value` directly at each `t`.
    pub fn project_to_line_closed_form(&self, w: &[Real], d: &[Real]) -> Option<(f64, f64, f64)> {
        if !matches!(self.kind, RegularizerKind::Squared) {
            return None;
        }
        let active = self.active_len(w.len());
        let mut ww = 0.0f64;
        let mut wd = 0.0f64;
        let mut dd = 0.0f64;
        for j in 0..active {
            let wj = f64::from(w[j]);
            let dj = f64::from(d[j]);
            ww += wj * wj;
            wd += wj * dj;
            dd += dj * dj;
        }
        Some((ww, wd, dd))
    }

    /// Evaluate `R(w + t d)` from the `(w.w, w.d, d.d)` triple returned by
    /// [`project_to_line_closed_form`](Self::project_to_line_closed_form).
    pub fn value_from_closed_form(&self, coefficients: (f64, f64, f64), t: Real) -> Real {
        let (ww, wd, dd) = coefficients;
        let t = f64::from(t);
        let sum = 0.5 * (ww + 2.0 * t * wd + t * t * dd);
        self.strength * sum as Real
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_strength() {
        assert!(Regularizer::squared(-1.0, false).is_err());
    }

    #[test]
    fn squared_value_matches_half_norm_squared() {
        let r = Regularizer::squared(1.0, false).unwrap();
        let w = [1.0, 2.0, 3.0];
        assert!((r.value(&w) - 7.0).abs() < 1e-6);
    }

    #[test]
    fn ignore_bias_excludes_last_coordinate() {
        let r = Regularizer::squared(1.0, true).unwrap();
        let w = [1.0, 2.0, 100.0];
        assert!((r.value(&w) - 2.5).abs() < 1e-6);
    }

    #[test]
    fn elastic_interpolates_between_parts() {
        let pure_sq = Regularizer::squared(1.0, false).unwrap();
        let elastic = Regularizer::elastic(1.0, 1.0, 1.0, false).unwrap();
        let w = [0.4, -0.6];
        assert!((pure_sq.value(&w) - elastic.value(&w)).abs() < 1e-5);
    }
}
