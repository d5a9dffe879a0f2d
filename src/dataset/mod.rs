//! Dataset loading: the concrete type behind the "feature-matrix factory"
//! and "label-column accessor" interfaces the training core depends on.

/// SLICE-format dataset reader.
pub mod slice;
/// XMC-repository-format dataset reader/writer.
pub mod xmc;

use std::sync::Arc;

use crate::error::InvalidArgument;
use crate::feature::FeatureMatrix;
use crate::types::{LabelId, Real};

/// A loaded dataset: a shared feature matrix plus an inverted label index
/// (which instances are positive for each label), built once at load time.
pub struct Dataset {
    features: Arc<FeatureMatrix>,
    num_labels: u32,
    /// For each label, the sorted instance indices that are positive.
    positives_by_label: Vec<Vec<u32>>,
}

impl Dataset {
    /// Construct from a feature matrix and, for each instance, the list of
    /// labels it is positive for.
    pub fn new(features: FeatureMatrix, num_labels: u32, labels_per_instance: Vec<Vec<u32>>) -> Result<Self, InvalidArgument> {
        if labels_per_instance.len() != features.rows() {
            return Err(InvalidArgument::DimensionMismatch { expected: features.rows(), actual: labels_per_instance.len() });
        }
        let mut positives_by_label = vec![Vec::new(); num_labels as usize];
        for (instance, labels) in labels_per_instance.iter().enumerate() {
            for &label in labels {
                if label >= num_labels {
                    return Err(InvalidArgument::LabelOutOfRange { label, begin: 0, end: num_labels });
                }
                positives_by_label[label as usize].push(instance as u32);
            }
        }
        Ok(Self { features: Arc::new(features), num_labels, positives_by_label })
    }

    /// The shared feature matrix.
    pub fn features(&self) -> Arc<FeatureMatrix> {
        self.features.clone()
    }

    /// Number of instances.
    pub fn num_examples(&self) -> usize {
        self.features.rows()
    }

    /// Number of features.
    pub fn num_features(&self) -> usize {
        self.features.cols()
    }

    /// Total labels.
    pub fn num_labels(&self) -> u32 {
        self.num_labels
    }

    /// Number of positive instances for `label`.
    pub fn num_positives(&self, label: LabelId) -> usize {
        self.positives_by_label[label.to_index()].len()
    }

    /// The dense `{-1, +1}` column for `label`.
    pub fn label_column(&self, label: LabelId) -> Vec<Real> {
        let mut column = vec![-1.0 as Real; self.num_examples()];
        for &idx in &self.positives_by_label[label.to_index()] {
            column[idx as usize] = 1.0;
        }
        column
    }

    /// Positive instance counts for every label, in label order (used to
    /// build a [`crate::weighting::PropensityWeighting`] without re-scanning
    /// per label).
    pub fn positive_counts(&self) -> Vec<usize> {
        self.positives_by_label.iter().map(|v| v.len()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::DenseMatrix;

    #[test]
    fn label_column_matches_inverted_index() {
        let dm = DenseMatrix::from_row_major(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], 3, 2).unwrap();
        let fm = FeatureMatrix::Dense(dm);
        let labels_per_instance = vec![vec![0], vec![], vec![0, 1]];
        let ds = Dataset::new(fm, 2, labels_per_instance).unwrap();
        assert_eq!(ds.label_column(LabelId::new(0)), vec![1.0, -1.0, 1.0]);
        assert_eq!(ds.label_column(LabelId::new(1)), vec![-1.0, -1.0, 1.0]);
        assert_eq!(ds.num_positives(LabelId::new(0)), 2);
    }

    #[test]
    fn rejects_out_of_range_label() {
        let dm = DenseMatrix::from_row_major(vec![1.0], 1, 1).unwrap();
        let fm = FeatureMatrix::Dense(dm);
        assert!(Dataset::new(fm, 1, vec![vec![5]]).is_err());
    }
}
