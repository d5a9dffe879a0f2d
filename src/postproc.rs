//! Post-processors applied to a label's weight vector after the solver runs.

use crate::error::InvalidArgument;
use crate::hashvec::HashedVector;
use crate::objective::Objective;
use crate::types::{LabelId, Real};

/// A transform applied to the solved weight vector of one label.
pub trait PostProcessor {
    /// Mutate `weights` in place. `objective` is the thread-local objective
    /// already retargeted at `label`, made available for feedback-driven
    /// processors such as [`Sparsify`].
    fn process(&mut self, label: LabelId, weights: &mut [Real], objective: &mut dyn Objective);
}

impl PostProcessor for Box<dyn PostProcessor + Send> {
    fn process(&mut self, label: LabelId, weights: &mut [Real], objective: &mut dyn Objective) {
        (**self).process(label, weights, objective)
    }
}

/// No-op.
pub struct Identity;

impl PostProcessor for Identity {
    fn process(&mut self, _label: LabelId, _weights: &mut [Real], _objective: &mut dyn Objective) {}
}

/// Zero any coordinate with `|w_j| <= epsilon`.
pub struct Cull {
    epsilon: Real,
}

impl Cull {
    /// Construct, rejecting negative `epsilon`.
    pub fn new(epsilon: Real) -> Result<Self, InvalidArgument> {
        if epsilon < 0.0 {
            return Err(crate::error::out_of_range("cull.epsilon", ">= 0", epsilon));
        }
        Ok(Self { epsilon })
    }
}

impl PostProcessor for Cull {
    fn process(&mut self, _label: LabelId, weights: &mut [Real], _objective: &mut dyn Objective) {
        for w in weights.iter_mut() {
            if w.abs() <= self.epsilon {
                *w = 0.0;
            }
        }
    }
}

/// Feedback-driven sparsification: binary-search the largest culling
/// threshold `t` such that zeroing every `|w_j| <= t` increases the loss by
/// at most a `tau` relative factor.
pub struct Sparsify {
    tau: Real,
    /// Number of bisection steps; 20 resolves `f32` magnitudes comfortably.
    iterations: u32,
}

impl Sparsify {
    /// Construct, rejecting negative `tau`.
    pub fn new(tau: Real) -> Result<Self, InvalidArgument> {
        if tau < 0.0 {
            return Err(crate::error::out_of_range("sparsify.tau", ">= 0", tau));
        }
        Ok(Self { tau, iterations: 20 })
    }
}

impl PostProcessor for Sparsify {
    fn process(&mut self, _label: LabelId, weights: &mut [Real], objective: &mut dyn Objective) {
        let w0 = HashedVector::new(weights.to_vec());
        let f0 = {
            let mut obj = objective;
            obj.value(&w0)
        };
        let max_abs = weights.iter().fold(0.0 as Real, |acc, &w| acc.max(w.abs()));
        if max_abs == 0.0 {
            return;
        }

        let cull_at = |t: Real| -> Vec<Real> {
            weights.iter().map(|&w| if w.abs() <= t { 0.0 } else { w }).collect()
        };

        let mut lo = 0.0 as Real;
        let mut hi = max_abs;
        let mut best = lo;
        for _ in 0..self.iterations {
            let mid = 0.5 * (lo + hi);
            let culled = cull_at(mid);
            let hv = HashedVector::new(culled);
            let f = {
                let obj: &mut dyn Objective = objective;
                obj.value(&hv)
            };
            if f <= (1.0 + self.tau) * f0 {
                best = mid;
                lo = mid;
            } else {
                hi = mid;
            }
        }

        for w in weights.iter_mut() {
            if w.abs() <= best {
                *w = 0.0;
            }
        }
    }
}

/// Apply a fixed column permutation (used when the driver reorders features
/// for cache locality).
pub struct Reorder {
    permutation: Vec<usize>,
}

impl Reorder {
    /// Construct from a permutation of `0..n`.
    pub fn new(permutation: Vec<usize>) -> Result<Self, InvalidArgument> {
        let n = permutation.len();
        let mut seen = vec![false; n];
        for &p in &permutation {
            if p >= n || seen[p] {
                return Err(crate::error::out_of_range("reorder.permutation", "a valid permutation", p));
            }
            seen[p] = true;
        }
        Ok(Self { permutation })
    }
}

impl PostProcessor for Reorder {
    fn process(&mut self, _label: LabelId, weights: &mut [Real], _objective: &mut dyn Objective) {
        let original = weights.to_vec();
        for (dst, &src) in self.permutation.iter().enumerate() {
            weights[dst] = original[src];
        }
    }
}

/// Apply a sequence of post-processors in order.
pub struct Combined {
    stages: Vec<Box<dyn PostProcessor + Send>>,
}

impl Combined {
    /// Construct from an ordered list of stages.
    pub fn new(stages: Vec<Box<dyn PostProcessor + Send>>) -> Self {
        Self { stages }
    }
}

impl PostProcessor for Combined {
    fn process(&mut self, label: LabelId, weights: &mut [Real], objective: &mut dyn Objective) {
        for stage in self.stages.iter_mut() {
            stage.process(label, weights, objective);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{DenseMatrix, FeatureMatrix};
    use crate::objective::linear::LinearClassifierLoss;
    use crate::objective::margin::MarginFunction;
    use crate::objective::regularizer::Regularizer;
    use std::sync::Arc;

    #[test]
    fn cull_rejects_negative_epsilon() {
        assert!(Cull::new(-1.0).is_err());
    }

    #[test]
    fn cull_zeros_small_coordinates() {
        let mut c = Cull::new(0.5).unwrap();
        let mut obj = toy_objective();
        let mut w = vec![0.1, -0.4, 0.6, -0.6];
        c.process(LabelId::new(0), &mut w, &mut obj);
        assert_eq!(w, vec![0.0, 0.0, 0.6, -0.6]);
    }

    fn toy_objective() -> LinearClassifierLoss {
        let dm = DenseMatrix::from_row_major(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0], 2, 4).unwrap();
        let features = Arc::new(FeatureMatrix::Dense(dm));
        let reg = Regularizer::squared(0.1, false).unwrap();
        let mut obj = LinearClassifierLoss::new(features, MarginFunction::SquaredHinge, reg);
        obj.retarget(vec![1.0, -1.0], vec![1.0, 1.0]).unwrap();
        obj
    }

    #[test]
    fn sparsify_keeps_loss_within_budget() {
        let mut obj = toy_objective();
        let mut sp = Sparsify::new(0.1).unwrap();
        let mut w = vec![1.0, 0.01, -0.02, 0.9];
        let before = obj.value(&HashedVector::new(w.clone()));
        sp.process(LabelId::new(0), &mut w, &mut obj);
        let after = obj.value(&HashedVector::new(w.clone()));
        assert!(after <= 1.1 * before + 1e-6);
    }
}
