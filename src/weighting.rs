//! Per-label positive/negative instance weighting.
//!
//! Grounded in the original `PropensityModel`/`*Weighting` hierarchy: the
//! propensity formula and constants below are reproduced exactly so the
//! doctest constant `0.25562221863533147` (a=0.55, b=1.5, N=50, n+=1) holds.

use crate::error::InvalidArgument;
use crate::types::LabelId;

/// Propensity model `p_k = 1 / (1 + C * exp(-a * log(n+_k + b)))`,
/// `C = (log(N) - 1) * (b+1)^a`.
#[derive(Clone, Debug)]
pub struct PropensityModel {
    a: f64,
    b: f64,
    c: f64,
}

impl PropensityModel {
    /// Construct from dataset size `num_examples` and the model's `(a, b)`.
    pub fn new(num_examples: usize, a: f64, b: f64) -> Self {
        let c = ((num_examples as f64).ln() - 1.0) * (b + 1.0).powf(a);
        Self { a, b, c }
    }

    /// `p_k` for a label with `num_positives` positive instances.
    pub fn propensity(&self, num_positives: usize) -> f64 {
        let d = self.c * (-self.a * (num_positives as f64 + self.b).ln()).exp();
        1.0 / (1.0 + d)
    }
}

/// Per-label positive/negative instance weight.
pub trait LabelWeighting {
    /// Weight applied to positive instances of `label`.
    fn positive_weight(&self, label: LabelId) -> Result<f64, InvalidArgument>;
    /// Weight applied to negative instances of `label`.
    fn negative_weight(&self, label: LabelId) -> Result<f64, InvalidArgument>;
}

/// Same weight for every label.
#[derive(Clone, Debug)]
pub struct ConstantWeighting {
    positive: f64,
    negative: f64,
}

impl ConstantWeighting {
    /// Construct, rejecting negative costs.
    pub fn new(positive: f64, negative: f64) -> Result<Self, InvalidArgument> {
        if positive < 0.0 || negative < 0.0 {
            return Err(crate::error::out_of_range("weighting.cost", ">= 0", format!("({positive}, {negative})")));
        }
        Ok(Self { positive, negative })
    }
}

impl LabelWeighting for ConstantWeighting {
    fn positive_weight(&self, _label: LabelId) -> Result<f64, InvalidArgument> {
        Ok(self.positive)
    }
    fn negative_weight(&self, _label: LabelId) -> Result<f64, InvalidArgument> {
        Ok(self.negative)
    }
}

/// `(2/p - 1, 1)`.
#[derive(Clone, Debug)]
pub struct PropensityWeighting {
    /// Per-label positive instance count, indexed by [`LabelId`].
    num_positives: Vec<usize>,
    model: PropensityModel,
}

impl PropensityWeighting {
    /// Construct from the per-label positive counts and propensity model.
    pub fn new(num_positives: Vec<usize>, model: PropensityModel) -> Self {
        Self { num_positives, model }
    }

    fn propensity(&self, label: LabelId) -> Result<f64, InvalidArgument> {
        let idx = label.to_index();
        let n = *self.num_positives.get(idx).ok_or_else(|| InvalidArgument::LabelOutOfRange {
            label: label.0,
            begin: 0,
            end: self.num_positives.len() as u32,
        })?;
        Ok(self.model.propensity(n))
    }
}

impl LabelWeighting for PropensityWeighting {
    fn positive_weight(&self, label: LabelId) -> Result<f64, InvalidArgument> {
        Ok(2.0 / self.propensity(label)? - 1.0)
    }
    fn negative_weight(&self, _label: LabelId) -> Result<f64, InvalidArgument> {
        Ok(1.0)
    }
}

/// `(1, p/(2-p))`.
#[derive(Clone, Debug)]
pub struct PropensityDownweight {
    num_positives: Vec<usize>,
    model: PropensityModel,
}

impl PropensityDownweight {
    /// Construct from the per-label positive counts and propensity model.
    pub fn new(num_positives: Vec<usize>, model: PropensityModel) -> Self {
        Self { num_positives, model }
    }
}

impl LabelWeighting for PropensityDownweight {
    fn positive_weight(&self, _label: LabelId) -> Result<f64, InvalidArgument> {
        Ok(1.0)
    }
    fn negative_weight(&self, label: LabelId) -> Result<f64, InvalidArgument> {
        let idx = label.to_index();
        let n = *self.num_positives.get(idx).ok_or_else(|| InvalidArgument::LabelOutOfRange {
            label: label.0,
            begin: 0,
            end: self.num_positives.len() as u32,
        })?;
        let p = self.model.propensity(n);
        Ok(p / (2.0 - p))
    }
}

/// Explicit per-label weights supplied by the caller.
#[derive(Clone, Debug)]
pub struct CustomWeighting {
    positive: Vec<f64>,
    negative: Vec<f64>,
}

impl CustomWeighting {
    /// Construct, rejecting mismatched lengths.
    pub fn new(positive: Vec<f64>, negative: Vec<f64>) -> Result<Self, InvalidArgument> {
        if positive.len() != negative.len() {
            return Err(InvalidArgument::DimensionMismatch { expected: positive.len(), actual: negative.len() });
        }
        Ok(Self { positive, negative })
    }
}

impl LabelWeighting for CustomWeighting {
    fn positive_weight(&self, label: LabelId) -> Result<f64, InvalidArgument> {
        self.positive.get(label.to_index()).copied().ok_or(InvalidArgument::LabelOutOfRange {
            label: label.0,
            begin: 0,
            end: self.positive.len() as u32,
        })
    }
    fn negative_weight(&self, label: LabelId) -> Result<f64, InvalidArgument> {
        self.negative.get(label.to_index()).copied().ok_or(InvalidArgument::LabelOutOfRange {
            label: label.0,
            begin: 0,
            end: self.negative.len() as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propensity_matches_reference_constants() {
        let model = PropensityModel::new(50, 0.55, 1.5);
        let p1 = model.propensity(1);
        assert!((p1 - 0.25562221863533147).abs() < 1e-12, "got {p1}");

        let p25 = model.propensity(25);
        assert!((p25 - 0.5571545100089221).abs() < 1e-12, "got {p25}");
    }

    #[test]
    fn constant_weighting_rejects_negative_cost() {
        assert!(ConstantWeighting::new(2.0, 5.0).is_ok());
        assert!(ConstantWeighting::new(-1.0, 2.0).is_err());
        assert!(ConstantWeighting::new(1.0, -2.0).is_err());
    }

    #[test]
    fn propensity_weighting_matches_formula() {
        let model = PropensityModel::new(50, 0.55, 1.5);
        let w = PropensityWeighting::new(vec![1], model);
        let label = LabelId::new(0);
        let expected = 2.0 / 0.25562221863533147 - 1.0;
        assert!((w.positive_weight(label).unwrap() - expected).abs() < 1e-9);
        assert_eq!(w.negative_weight(label).unwrap(), 1.0);
    }

    #[test]
    fn custom_weighting_rejects_mismatched_lengths() {
        assert!(CustomWeighting::new(vec![1.0, 2.0], vec![1.0]).is_err());
    }
}
