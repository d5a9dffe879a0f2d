//! The in-memory model: weights for a contiguous range of labels.

use crate::error::InvalidArgument;
use crate::types::{LabelId, Real};

/// `(first_label, label_count, total_labels)`, validated as a well-formed
/// sub-range of a logical `total_labels`-label model.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PartialModelSpec {
    /// First label covered (inclusive).
    pub first_label: u32,
    /// Number of labels covered.
    pub label_count: u32,
    /// Total labels in the logical model this is a fragment of.
    pub total_labels: u32,
}

impl PartialModelSpec {
    /// Validate and construct.
    pub fn new(first_label: u32, label_count: u32, total_labels: u32) -> Result<Self, InvalidArgument> {
        if label_count == 0 {
            return Err(crate::error::out_of_range("partial_model.label_count", ">= 1", label_count));
        }
        if first_label.checked_add(label_count).map_or(true, |end| end > total_labels) {
            return Err(crate::error::out_of_range(
                "partial_model.first_label + label_count",
                "<= total_labels",
                first_label as u64 + label_count as u64,
            ));
        }
        Ok(Self { first_label, label_count, total_labels })
    }

    /// Exclusive upper bound of the covered range.
    pub fn end(&self) -> u32 {
        self.first_label + self.label_count
    }
}

/// One non-zero entry of a sparse label's weight vector.
#[derive(Copy, Clone, Debug)]
pub struct SparseEntry {
    /// Feature index.
    pub index: u32,
    /// Weight value.
    pub value: Real,
}

enum Storage {
    Dense { data: Vec<Real> },
    Sparse { rows: Vec<Vec<SparseEntry>> },
}

/// Weights for a contiguous label range `[first, first+count)` of a logical
/// `total`-label model, stored either densely or sparsely.
pub struct Model {
    spec: PartialModelSpec,
    num_features: usize,
    storage: Storage,
}

impl Model {
    /// A dense model, zero-initialized.
    pub fn new_dense(spec: PartialModelSpec, num_features: usize) -> Self {
        let data = vec![0.0 as Real; num_features * spec.label_count as usize];
        Self { spec, num_features, storage: Storage::Dense { data } }
    }

    /// A sparse model, empty-initialized.
    pub fn new_sparse(spec: PartialModelSpec, num_features: usize) -> Self {
        let rows = vec![Vec::new(); spec.label_count as usize];
        Self { spec, num_features, storage: Storage::Sparse { rows } }
    }

    /// The label range this model covers.
    pub fn spec(&self) -> PartialModelSpec {
        self.spec
    }

    /// Feature dimension, constant for the model's lifetime.
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Whether this model stores weights sparsely.
    pub fn is_sparse(&self) -> bool {
        matches!(self.storage, Storage::Sparse { .. })
    }

    fn local_index(&self, label: LabelId) -> Result<usize, InvalidArgument> {
        let idx = label.0;
        if idx < self.spec.first_label || idx >= self.spec.end() {
            return Err(InvalidArgument::LabelOutOfRange { label: idx, begin: self.spec.first_label, end: self.spec.end() });
        }
        Ok((idx - self.spec.first_label) as usize)
    }

    /// Overwrite the weights for `label` from a dense slice. Sparse models
    /// drop exact zeros on insert.
    pub fn set_weights_for_label(&mut self, label: LabelId, weights: &[Real]) -> Result<(), InvalidArgument> {
        if weights.len() != self.num_features {
            return Err(InvalidArgument::DimensionMismatch { expected: self.num_features, actual: weights.len() });
        }
        let local = self.local_index(label)?;
        match &mut self.storage {
            Storage::Dense { data } => {
                let start = local * self.num_features;
                data[start..start + self.num_features].copy_from_slice(weights);
            }
            Storage::Sparse { rows } => {
                rows[local] = weights
                    .iter()
                    .enumerate()
                    .filter(|(_, &v)| v != 0.0)
                    .map(|(i, &v)| SparseEntry { index: i as u32, value: v })
                    .collect();
            }
        }
        Ok(())
    }

    /// Set the weights for `label` from an explicit sparse representation.
    pub fn set_sparse_weights_for_label(&mut self, label: LabelId, entries: Vec<SparseEntry>) -> Result<(), InvalidArgument> {
        let local = self.local_index(label)?;
        match &mut self.storage {
            Storage::Sparse { rows } => {
                rows[local] = entries;
                Ok(())
            }
            Storage::Dense { data } => {
                let start = local * self.num_features;
                data[start..start + self.num_features].iter_mut().for_each(|x| *x = 0.0);
                for e in entries {
                    data[start + e.index as usize] = e.value;
                }
                Ok(())
            }
        }
    }

    /// Write the dense expansion of `label`'s weights into `out`.
    pub fn weights_for_label_into(&self, label: LabelId, out: &mut [Real]) -> Result<(), InvalidArgument> {
        if out.len() != self.num_features {
            return Err(InvalidArgument::DimensionMismatch { expected: self.num_features, actual: out.len() });
        }
        let local = self.local_index(label)?;
        out.iter_mut().for_each(|x| *x = 0.0);
        match &self.storage {
            Storage::Dense { data } => {
                let start = local * self.num_features;
                out.copy_from_slice(&data[start..start + self.num_features]);
            }
            Storage::Sparse { rows } => {
                for e in &rows[local] {
                    out[e.index as usize] = e.value;
                }
            }
        }
        Ok(())
    }

    /// Dense expansion of `label`'s weights as an owned `Vec`.
    pub fn weights_for_label(&self, label: LabelId) -> Result<Vec<Real>, InvalidArgument> {
        let mut out = vec![0.0 as Real; self.num_features];
        self.weights_for_label_into(label, &mut out)?;
        Ok(out)
    }

    /// Sparse entries for `label`, computed on demand for a dense model.
    pub fn sparse_weights_for_label(&self, label: LabelId) -> Result<Vec<SparseEntry>, InvalidArgument> {
        let local = self.local_index(label)?;
        match &self.storage {
            Storage::Sparse { rows } => Ok(rows[local].clone()),
            Storage::Dense { data } => {
                let start = local * self.num_features;
                Ok(data[start..start + self.num_features]
                    .iter()
                    .enumerate()
                    .filter(|(_, &v)| v != 0.0)
                    .map(|(i, &v)| SparseEntry { index: i as u32, value: v })
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_label_count() {
        assert!(PartialModelSpec::new(0, 0, 10).is_err());
    }

    #[test]
    fn rejects_range_exceeding_total() {
        assert!(PartialModelSpec::new(8, 5, 10).is_err());
    }

    #[test]
    fn dense_model_round_trips_weights() {
        let spec = PartialModelSpec::new(2, 3, 10).unwrap();
        let mut model = Model::new_dense(spec, 4);
        model.set_weights_for_label(LabelId::new(3), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let got = model.weights_for_label(LabelId::new(3)).unwrap();
        assert_eq!(got, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn out_of_range_label_is_rejected() {
        let spec = PartialModelSpec::new(2, 3, 10).unwrap();
        let model = Model::new_dense(spec, 4);
        assert!(model.weights_for_label(LabelId::new(0)).is_err());
        assert!(model.weights_for_label(LabelId::new(5)).is_err());
    }

    #[test]
    fn sparse_model_drops_zeros_on_insert() {
        let spec = PartialModelSpec::new(0, 1, 1).unwrap();
        let mut model = Model::new_sparse(spec, 4);
        model.set_weights_for_label(LabelId::new(0), &[0.0, 2.0, 0.0, 4.0]).unwrap();
        let entries = model.sparse_weights_for_label(LabelId::new(0)).unwrap();
        assert_eq!(entries.len(), 2);
    }
}
