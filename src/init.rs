//! Weight initialization strategies.
//!
//! `FeatureMean` and `MultiPositive` are grounded directly in
//! `training/init/subset.cpp` and `training/init/multi_pos.cpp`: the exact
//! `calculate_factors` formula and Gram-matrix construction are reproduced
//! here, translated into the teacher's iterator-based dense/sparse handling
//! instead of Eigen expression templates.

use std::sync::Arc;

use crate::error::InvalidArgument;
use crate::feature::FeatureMatrix;
use crate::model::Model;
use crate::types::{LabelId, Real};

/// Seeds the initial weight vector for one label's Newton solve.
pub trait WeightInitializer {
    /// Write an initial `w` for `label` into `target` (length = `num_features`).
    /// `label_column` holds `{-1, +1}` per instance for this label.
    fn initialize(&mut self, label: LabelId, label_column: &[Real], target: &mut [Real]) -> Result<(), InvalidArgument>;
}

impl WeightInitializer for Box<dyn WeightInitializer + Send> {
    fn initialize(&mut self, label: LabelId, label_column: &[Real], target: &mut [Real]) -> Result<(), InvalidArgument> {
        (**self).initialize(label, label_column, target)
    }
}

/// `w <- 0`.
pub struct Zero;

impl WeightInitializer for Zero {
    fn initialize(&mut self, _label: LabelId, _label_column: &[Real], target: &mut [Real]) -> Result<(), InvalidArgument> {
        target.iter_mut().for_each(|x| *x = 0.0);
        Ok(())
    }
}

/// `w <- v` for a fixed scalar `v`.
pub struct Constant {
    value: Real,
}

impl Constant {
    /// Construct with the fill value.
    pub fn new(value: Real) -> Self {
        Self { value }
    }
}

impl WeightInitializer for Constant {
    fn initialize(&mut self, _label: LabelId, _label_column: &[Real], target: &mut [Real]) -> Result<(), InvalidArgument> {
        target.iter_mut().for_each(|x| *x = self.value);
        Ok(())
    }
}

/// `w <- model.weights(label)`.
pub struct Pretrained {
    model: Arc<Model>,
}

impl Pretrained {
    /// Construct from a previously trained (partial) model.
    pub fn new(model: Arc<Model>) -> Self {
        Self { model }
    }
}

impl WeightInitializer for Pretrained {
    fn initialize(&mut self, label: LabelId, _label_column: &[Real], target: &mut [Real]) -> Result<(), InvalidArgument> {
        self.model.weights_for_label_into(label, target)
    }
}

/// Precomputed per-dataset statistics shared by [`FeatureMean`] and [`MultiPositive`].
#[derive(Clone, Debug)]
pub struct DatasetMeans {
    /// Mean feature vector over all instances.
    pub mean_of_all: Vec<Real>,
    /// `||mean_of_all||^2`.
    pub mean_all_norm_squared: f64,
    /// Total instance count.
    pub num_examples: usize,
}

impl DatasetMeans {
    /// Compute from the feature matrix.
    pub fn compute(features: &FeatureMatrix) -> Self {
        let n = features.rows();
        let d = features.cols();
        let mut mean = vec![0.0 as Real; d];
        let scales = vec![1.0 as Real / n as Real; n];
        features.weighted_row_sum(&scales, &mut mean);
        let mut norm_sq = 0.0f64;
        for &x in &mean {
            norm_sq += f64::from(x) * f64::from(x);
        }
        Self { mean_of_all: mean, mean_all_norm_squared: norm_sq, num_examples: n }
    }
}

fn positive_mean(features: &FeatureMatrix, label_column: &[Real]) -> (Vec<Real>, usize) {
    let d = features.cols();
    let mut mean = vec![0.0 as Real; d];
    let mut count = 0usize;
    let scales: Vec<Real> = label_column
        .iter()
        .map(|&y| {
            if y > 0.0 {
                count += 1;
                1.0
            } else {
                0.0
            }
        })
        .collect();
    if count > 0 {
        let inv = 1.0 / count as Real;
        let scaled: Vec<Real> = scales.iter().map(|&s| s * inv).collect();
        features.weighted_row_sum(&scaled, &mut mean);
    }
    (mean, count)
}

/// Reproduces `subset.cpp`'s `calculate_factors`: returns `(u, v)` such that
/// `w = u * mean_of_positives + v * mean_of_all`.
fn calculate_factors(
    mean_of_positives: &[Real],
    means: &DatasetMeans,
    num_pos: usize,
    pos_target: Real,
    neg_target: Real,
) -> (Real, Real) {
    let epsilon = Real::EPSILON as f64;
    let pp: f64 = mean_of_positives.iter().map(|&x| f64::from(x) * f64::from(x)).sum();
    let pa: f64 = mean_of_positives.iter().zip(&means.mean_of_all).map(|(&a, &b)| f64::from(a) * f64::from(b)).sum();
    let p = num_pos as f64 / means.num_examples as f64;
    let divide = pa * pa - pp * means.mean_all_norm_squared;

    if pa.abs() < epsilon {
        return (0.0, -1.0);
    }
    if divide.abs() < epsilon {
        tracing::warn!("FeatureMean initializer: mean vectors are linearly dependent, falling back");
        return (0.0, -1.0);
    }
    let f = p * (f64::from(pos_target) - f64::from(neg_target)) + f64::from(neg_target);
    let u = (f * pa - f64::from(pos_target) * means.mean_all_norm_squared) / divide;
    let v = (f64::from(pos_target) - u * pp) / pa;
    (u as Real, v as Real)
}

/// Mean-of-features initializer (`MSI`): `w <- u * mean_of_positives + v * mean_of_all`.
pub struct FeatureMean {
    features: Arc<FeatureMatrix>,
    means: DatasetMeans,
    pos_target: Real,
    neg_target: Real,
}

impl FeatureMean {
    /// Construct over `features` with precomputed dataset-wide means.
    pub fn new(features: Arc<FeatureMatrix>, means: DatasetMeans, pos_target: Real, neg_target: Real) -> Self {
        Self { features, means, pos_target, neg_target }
    }
}

impl WeightInitializer for FeatureMean {
    fn initialize(&mut self, _label: LabelId, label_column: &[Real], target: &mut [Real]) -> Result<(), InvalidArgument> {
        let (mean_pos, num_pos) = positive_mean(&self.features, label_column);
        let (u, v) = calculate_factors(&mean_pos, &self.means, num_pos, self.pos_target, self.neg_target);
        for j in 0..target.len() {
            target[j] = u * mean_pos[j] + v * self.means.mean_of_all[j];
        }
        Ok(())
    }
}

/// Least-squares initializer over the Gram matrix of `mean_of_all` and up to
/// `max_positives` positive instances; falls back to [`FeatureMean`] when a
/// label has more positives than that. Grounded in `multi_pos.cpp`.
pub struct MultiPositive {
    features: Arc<FeatureMatrix>,
    means: DatasetMeans,
    max_positives: usize,
    pos_target: Real,
    neg_target: Real,
    lambda: f64,
}

impl MultiPositive {
    /// Construct over `features`; `max_positives` bounds the Gram matrix size.
    pub fn new(features: Arc<FeatureMatrix>, means: DatasetMeans, max_positives: usize, pos_target: Real, neg_target: Real) -> Self {
        Self { features, means, max_positives, pos_target, neg_target, lambda: 0.01 }
    }

    fn positive_rows(&self, label_column: &[Real]) -> Vec<Vec<Real>> {
        let mut rows = Vec::new();
        for (i, &y) in label_column.iter().enumerate() {
            if y > 0.0 {
                let mut row = vec![0.0 as Real; self.features.cols()];
                match &*self.features {
                    FeatureMatrix::Dense(m) => row.copy_from_slice(m.row(i)),
                    FeatureMatrix::Sparse(m) => {
                        for (&idx, &val) in m.row(i).indices.iter().zip(&m.row(i).values) {
                            row[idx as usize] = val;
                        }
                    }
                }
                rows.push(row);
            }
        }
        rows
    }
}

impl WeightInitializer for MultiPositive {
    fn initialize(&mut self, label: LabelId, label_column: &[Real], target: &mut [Real]) -> Result<(), InvalidArgument> {
        let positives = self.positive_rows(label_column);
        let num_pos = positives.len();

        if num_pos > self.max_positives {
            let mut fallback = FeatureMean::new(self.features.clone(), self.means.clone(), self.pos_target, self.neg_target);
            return fallback.initialize(label, label_column, target);
        }
        if num_pos == 0 {
            target.iter_mut().for_each(|x| *x = 0.0);
            return Ok(());
        }

        let n = num_pos + 1;
        let num_samples = self.means.num_examples as f64;
        let mut gram = vec![0.0f64; n * n];
        let mut rhs = vec![0.0f64; n];
        rhs[0] = f64::from(self.neg_target);
        for i in 1..n {
            rhs[i] = f64::from(self.pos_target);
        }

        gram[0] = self.means.mean_all_norm_squared;

        let dot = |a: &[Real], b: &[Real]| -> f64 { a.iter().zip(b).map(|(&x, &y)| f64::from(x) * f64::from(y)).sum() };

        for i in 0..num_pos {
            for j in i..num_pos {
                let d = dot(&positives[i], &positives[j]);
                gram[(i + 1) * n + (j + 1)] = d;
                gram[(j + 1) * n + (i + 1)] = d;
            }
            gram[0] += gram[(i + 1) * n + (i + 1)] / num_samples / num_samples;
            let x_ta = dot(&positives[i], &self.means.mean_of_all);
            gram[0 * n + (i + 1)] = x_ta;
            gram[0] -= 2.0 * x_ta / num_samples;
        }

        for i in 0..num_pos {
            for j in 0..num_pos {
                gram[0 * n + (i + 1)] -= gram[j * n + (i + 1)] / num_samples;
            }
            gram[(i + 1) * n] = gram[i + 1];
            gram[(i + 1) * n + (i + 1)] += self.lambda;
        }
        gram[0] += self.lambda;

        let alpha = match cholesky_solve(&gram, &rhs, n) {
            Some(a) => a,
            None => {
                let mut fallback = FeatureMean::new(self.features.clone(), self.means.clone(), self.pos_target, self.neg_target);
                return fallback.initialize(label, label_column, target);
            }
        };

        for j in 0..target.len() {
            target[j] = (alpha[0] * f64::from(self.means.mean_of_all[j])) as Real;
        }
        for i in 0..num_pos {
            let coeff = alpha[i + 1] - alpha[0] / num_samples;
            for j in 0..target.len() {
                target[j] += (coeff * f64::from(positives[i][j])) as Real;
            }
        }
        Ok(())
    }
}

/// Solve `A x = b` for a symmetric positive-definite `A` via Cholesky.
/// Returns `None` if `A` is not numerically SPD (a non-positive pivot is found).
fn cholesky_solve(a: &[f64], b: &[f64], n: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0f64; n * n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[i * n + j] = sum.sqrt();
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }
    // forward solve L y = b
    let mut y = vec![0.0f64; n];
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[i * n + k] * y[k];
        }
        y[i] = sum / l[i * n + i];
    }
    // back solve L^T x = y
    let mut x = vec![0.0f64; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for k in (i + 1)..n {
            sum -= l[k * n + i] * x[k];
        }
        x[i] = sum / l[i * n + i];
    }
    Some(x)
}

/// Global warm start: solve the all-labels-negative problem once and reuse
/// the resulting `w` for every label.
pub struct OvaPrimal {
    warm_start: Vec<Real>,
}

impl OvaPrimal {
    /// Construct from a precomputed warm-start vector (the solution of the
    /// all-negative Newton solve; see [`crate::training_spec`]).
    pub fn new(warm_start: Vec<Real>) -> Self {
        Self { warm_start }
    }
}

impl WeightInitializer for OvaPrimal {
    fn initialize(&mut self, _label: LabelId, _label_column: &[Real], target: &mut [Real]) -> Result<(), InvalidArgument> {
        if target.len() != self.warm_start.len() {
            return Err(InvalidArgument::DimensionMismatch { expected: self.warm_start.len(), actual: target.len() });
        }
        target.copy_from_slice(&self.warm_start);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::DenseMatrix;

    fn toy_features() -> Arc<FeatureMatrix> {
        let data = vec![
            1.0, 0.0, //
            0.0, 1.0, //
            1.0, 1.0, //
            0.5, 0.5,
        ];
        Arc::new(FeatureMatrix::Dense(DenseMatrix::from_row_major(data, 4, 2).unwrap()))
    }

    #[test]
    fn zero_initializer_zeros_target() {
        let mut init = Zero;
        let mut target = vec![1.0, 2.0];
        init.initialize(LabelId::new(0), &[1.0, -1.0, 1.0, -1.0], &mut target).unwrap();
        assert_eq!(target, vec![0.0, 0.0]);
    }

    #[test]
    fn feature_mean_runs_without_degenerate_fallback() {
        let features = toy_features();
        let means = DatasetMeans::compute(&features);
        let mut init = FeatureMean::new(features, means, 1.0, -1.0);
        let mut target = vec![0.0; 2];
        let labels = [1.0, -1.0, 1.0, -1.0];
        init.initialize(LabelId::new(0), &labels, &mut target).unwrap();
        assert!(target.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn multi_positive_falls_back_above_max() {
        let features = toy_features();
        let means = DatasetMeans::compute(&features);
        let mut init = MultiPositive::new(features, means, 0, 1.0, -1.0);
        let mut target = vec![0.0; 2];
        let labels = [1.0, -1.0, 1.0, -1.0];
        init.initialize(LabelId::new(0), &labels, &mut target).unwrap();
        assert!(target.iter().all(|x| x.is_finite()));
    }
}
