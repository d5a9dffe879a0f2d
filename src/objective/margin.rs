//! Margin functions for linear classification losses.
//!
//! Each [`MarginFunction`] implements `value`/`grad` in terms of the margin
//! `m = y * (x^T w)`, plus a curvature surrogate `q` used in place of the true
//! second derivative where that derivative is zero or undefined (the squared
//! hinge has a kink; the Huber hinge's quadratic region only covers part of
//! its domain).

use crate::error::InvalidArgument;
use crate::types::Real;

/// A margin-based loss `phi(m)`, per SPEC_FULL.md §4.3.
#[derive(Clone, Debug)]
pub enum MarginFunction {
    /// `max(0, 1-m)^2`.
    SquaredHinge,
    /// Huber-smoothed hinge with transition width `epsilon`.
    HuberHinge {
        /// Width of the quadratic transition region.
        epsilon: Real,
    },
    /// `log(1 + exp(-m))`.
    Logistic,
}

impl MarginFunction {
    /// Construct the Huber hinge, validating `epsilon > 0`.
    pub fn huber_hinge(epsilon: Real) -> Result<Self, InvalidArgument> {
        if !(epsilon > 0.0) {
            return Err(crate::error::out_of_range("huber_hinge.epsilon", "> 0", epsilon));
        }
        Ok(MarginFunction::HuberHinge { epsilon })
    }

    /// `phi(m)`.
    pub fn value(&self, m: Real) -> Real {
        match *self {
            MarginFunction::SquaredHinge => {
                let z = (1.0 - m).max(0.0);
                z * z
            }
            MarginFunction::HuberHinge { epsilon } => {
                if m > 1.0 {
                    0.0
                } else if m < 1.0 - epsilon {
                    1.0 - epsilon / 2.0 - m
                } else {
                    let z = 1.0 - m;
                    z * z / (2.0 * epsilon)
                }
            }
            MarginFunction::Logistic => {
                // log(1+exp(-m)); guard against overflow of exp(-m) for very negative m.
                if m < -30.0 {
                    -m
                } else {
                    (1.0 + (-m).exp()).ln()
                }
            }
        }
    }

    /// `phi'(m)`.
    pub fn grad(&self, m: Real) -> Real {
        match *self {
            MarginFunction::SquaredHinge => {
                if m < 1.0 {
                    -2.0 * (1.0 - m)
                } else {
                    0.0
                }
            }
            MarginFunction::HuberHinge { epsilon } => {
                if m > 1.0 {
                    0.0
                } else if m < 1.0 - epsilon {
                    -1.0
                } else {
                    -(1.0 - m) / epsilon
                }
            }
            MarginFunction::Logistic => {
                if m > 30.0 {
                    -(-m).exp()
                } else {
                    -1.0 / (1.0 + m.exp())
                }
            }
        }
    }

    /// Curvature surrogate used by the Hessian-vector product and the diagonal
    /// preconditioner (a true second derivative where defined, a stand-in
    /// otherwise).
    pub fn curvature(&self, m: Real) -> Real {
        match *self {
            MarginFunction::SquaredHinge => {
                if m < 1.0 {
                    2.0
                } else {
                    0.0
                }
            }
            MarginFunction::HuberHinge { epsilon } => {
                if m > 1.0 {
                    0.0
                } else if m < 1.0 - epsilon {
                    1.0 / (1.0 - m).max(epsilon)
                } else {
                    1.0 / epsilon
                }
            }
            MarginFunction::Logistic => {
                let s = if m > 30.0 {
                    0.0
                } else if m < -30.0 {
                    1.0
                } else {
                    1.0 / (1.0 + m.exp())
                };
                let sigma_pos = 1.0 - s;
                s * sigma_pos
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn squared_hinge_at_margin_one_is_zero() {
        let f = MarginFunction::SquaredHinge;
        assert_eq!(f.value(1.0), 0.0);
        assert_eq!(f.value(2.0), 0.0);
        assert!((f.value(0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn logistic_does_not_overflow_for_very_negative_margin() {
        let f = MarginFunction::Logistic;
        let v = f.value(-1000.0);
        assert!(v.is_finite());
        assert!((v - 1000.0).abs() < 1.0);
    }

    #[test]
    fn huber_hinge_rejects_nonpositive_epsilon() {
        assert!(MarginFunction::huber_hinge(0.0).is_err());
        assert!(MarginFunction::huber_hinge(-1.0).is_err());
    }

    #[test]
    fn finite_difference_matches_grad() {
        let f = MarginFunction::Logistic;
        let m = 0.3f32;
        let eps = 1e-3f32;
        let fd = (f.value(m + eps) - f.value(m - eps)) / (2.0 * eps);
        assert!((fd - f.grad(m)).abs() < 1e-2);
    }
}
