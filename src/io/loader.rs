//! Loads a model (or a sub-range of one) back off disk.

use std::path::{Path, PathBuf};

use crate::error::{ConsistencyError, IoError};
use crate::io::format;
use crate::io::metadata::{Metadata, WeightFileEntry};
use crate::model::{Model, PartialModelSpec};
use crate::types::LabelId;

/// Whether a loaded model should be materialized sparsely or densely.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SparseMode {
    /// Match whatever the on-disk entry used.
    MatchFile,
    /// Force dense materialization regardless of the on-disk format.
    ForceDense,
    /// Force sparse materialization regardless of the on-disk format.
    ForceSparse,
}

/// Reads the metadata file and serves label-range queries against it.
pub struct PartialModelLoader {
    dir: PathBuf,
    metadata: Metadata,
    sparse_mode: SparseMode,
}

impl PartialModelLoader {
    /// Parse the metadata file at `path`.
    pub fn new(path: &Path, sparse_mode: SparseMode) -> Result<Self, IoError> {
        let dir = path.parent().map(|p| p.to_path_buf()).unwrap_or_default();
        let text = std::fs::read_to_string(path).map_err(|source| IoError::Open { path: path.to_path_buf(), source })?;
        let metadata: Metadata = serde_json::from_str(&text).map_err(|source| IoError::MetadataParse { path: path.to_path_buf(), source })?;
        Ok(Self { dir, metadata, sparse_mode })
    }

    /// Total labels declared by the metadata.
    pub fn num_labels(&self) -> u32 {
        self.metadata.num_labels
    }

    /// Feature dimension, if any model has been added yet.
    pub fn num_features(&self) -> Option<usize> {
        self.metadata.num_features
    }

    fn entries_overlapping(&self, begin: u32, end: u32) -> Vec<&WeightFileEntry> {
        self.metadata.files.iter().filter(|e| e.first < end && begin < e.end()).collect()
    }

    fn is_sparse_for(&self, entry: &WeightFileEntry) -> bool {
        match self.sparse_mode {
            SparseMode::MatchFile => entry.format == crate::io::metadata::WeightFormat::SparseText,
            SparseMode::ForceDense => false,
            SparseMode::ForceSparse => true,
        }
    }

    /// Load the single weight-file entry covering label `label`.
    pub fn load_label(&self, label: LabelId) -> Result<Model, IoError> {
        self.load_range(label.0, label.0 + 1)
    }

    /// Load the smallest union of weight files overlapping `[begin, end)`,
    /// returning a [`Model`] whose [`PartialModelSpec`] spans exactly the
    /// union of the overlapping entries' ranges.
    pub fn load_range(&self, begin: u32, end: u32) -> Result<Model, IoError> {
        let num_features = self.metadata.num_features.ok_or_else(|| IoError::DimensionMismatch {
            path: self.dir.clone(),
            expected: 0,
            actual: 0,
        })?;

        let entries = self.entries_overlapping(begin, end);
        let lo = entries.iter().map(|e| e.first).min().unwrap_or(begin);
        let hi = entries.iter().map(|e| e.end()).max().unwrap_or(end);
        let spec = PartialModelSpec::new(lo, hi - lo, self.metadata.num_labels).map_err(|_| IoError::DimensionMismatch {
            path: self.dir.clone(),
            expected: self.metadata.num_labels as usize,
            actual: (hi - lo) as usize,
        })?;

        let sparse_union = entries.iter().any(|e| self.is_sparse_for(e));
        let mut union_model = if sparse_union { Model::new_sparse(spec, num_features) } else { Model::new_dense(spec, num_features) };

        for entry in entries {
            let path = self.dir.join(&entry.file_name);
            let entry_spec = PartialModelSpec::new(entry.first, entry.count, self.metadata.num_labels)
                .map_err(|_| IoError::DimensionMismatch { path: path.clone(), expected: num_features, actual: 0 })?;
            let sparse = self.is_sparse_for(entry);
            let piece = format::read_model(&path, entry_spec, num_features, entry.format, sparse)?;
            for local in 0..entry.count {
                let label = LabelId::new(entry.first + local);
                let weights = piece.weights_for_label(label).expect("label within piece by construction");
                union_model.set_weights_for_label(label, &weights).map_err(|_| IoError::DimensionMismatch {
                    path: path.clone(),
                    expected: num_features,
                    actual: weights.len(),
                })?;
            }
        }

        Ok(union_model)
    }

    /// Validate that the metadata's entries are non-overlapping and, if
    /// `require_complete`, that they cover `[0, num_labels)`.
    pub fn validate(&self, require_complete: bool) -> Result<(), ConsistencyError> {
        let files = &self.metadata.files;
        for i in 0..files.len() {
            for j in (i + 1)..files.len() {
                if files[i].overlaps(&files[j]) {
                    return Err(ConsistencyError::OverlappingEntries {
                        a_begin: files[i].first,
                        a_end: files[i].end(),
                        b_begin: files[j].first,
                        b_end: files[j].end(),
                    });
                }
            }
        }
        if require_complete && !self.metadata.is_fully_covered() {
            let (covered, _) = self.metadata.first_gap();
            return Err(ConsistencyError::IncompleteCoverage { covered, total: self.metadata.num_labels });
        }
        Ok(())
    }
}
