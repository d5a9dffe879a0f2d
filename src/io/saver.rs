//! The partial-model saver: the state machine that lets training checkpoint
//! and resume across process invocations.
//!
//! States are `Empty -> Accepting -> Finalized`. `add_model` appends a
//! weight-file entry and kicks off an asynchronous write; the metadata file
//! itself is untouched until `update_meta_file`/`finalize`. Joining the
//! previous save's handle before issuing the next is both backpressure and
//! the happens-before fence that keeps a crash-read metadata file pointing
//! only at fully-flushed weight files.

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crate::error::{ConsistencyError, IoError};
use crate::io::format;
use crate::io::metadata::{Metadata, WeightFileEntry, WeightFormat};
use crate::model::Model;

/// Lifecycle state of a [`PartialModelSaver`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SaverState {
    /// No model has been added yet.
    Empty,
    /// At least one model has been added; more may follow.
    Accepting,
    /// `finalize()` has succeeded; the metadata is complete and up to date.
    Finalized,
}

/// Output format and text precision used for newly added weight files.
#[derive(Clone, Debug)]
pub struct SaveOptions {
    /// Text precision (significant digits) for `DenseText`/`SparseText`.
    pub precision: usize,
    /// Weight file encoding.
    pub format: WeightFormat,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self { precision: 6, format: WeightFormat::DenseText }
    }
}

/// A handle to an in-flight asynchronous weight-file write.
pub struct SaveFuture {
    handle: JoinHandle<Result<WeightFileEntry, IoError>>,
}

impl SaveFuture {
    /// Block until the write completes, returning its entry.
    pub fn join(self) -> Result<WeightFileEntry, IoError> {
        self.handle.join().unwrap_or_else(|_| {
            Err(IoError::Generic {
                path: PathBuf::new(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "writer thread panicked"),
            })
        })
    }

    /// Whether the write has already completed.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Manages the metadata file and the weight files it references, across a
/// potentially resumed, batched training run.
pub struct PartialModelSaver {
    dir: PathBuf,
    base_name: String,
    metadata: Metadata,
    state: SaverState,
    options: SaveOptions,
}

impl PartialModelSaver {
    /// Open (or create) the saver at `path`. If `load_existing` and a
    /// metadata file is already present, its entries are loaded and the state
    /// becomes [`SaverState::Accepting`]; otherwise a fresh, empty metadata is
    /// created and the state is [`SaverState::Empty`].
    pub fn new(path: &Path, num_labels: u32, load_existing: bool, options: SaveOptions, now: String) -> Result<Self, IoError> {
        let dir = path.parent().map(|p| p.to_path_buf()).unwrap_or_default();
        let base_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

        if load_existing && path.exists() {
            let text = std::fs::read_to_string(path).map_err(|source| IoError::Open { path: path.to_path_buf(), source })?;
            let metadata: Metadata = serde_json::from_str(&text).map_err(|source| IoError::MetadataParse { path: path.to_path_buf(), source })?;
            let state = if metadata.files.is_empty() { SaverState::Empty } else { SaverState::Accepting };
            Ok(Self { dir, base_name, metadata, state, options })
        } else {
            Ok(Self { dir, base_name, metadata: Metadata::empty(num_labels, now), state: SaverState::Empty, options })
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SaverState {
        self.state
    }

    /// The first gap in label coverage, or `(num_labels, num_labels)` if none.
    pub fn get_missing_weights(&self) -> (u32, u32) {
        self.metadata.first_gap()
    }

    fn default_file_name(&self, first: u32, count: u32) -> String {
        format!("{}.weights-{}-{}", self.base_name, first, first + count)
    }

    /// Append `model`'s weights as a new entry and kick off an asynchronous
    /// write; the metadata file on disk is **not** touched by this call.
    /// Rejects ranges that overlap an existing entry, or a feature-count
    /// mismatch with previously added models.
    pub fn add_model(&mut self, model: Model, file_name: Option<String>) -> Result<SaveFuture, ConsistencyError> {
        let spec = model.spec();
        let candidate = WeightFileEntry {
            first: spec.first_label,
            count: spec.label_count,
            file_name: file_name.unwrap_or_else(|| self.default_file_name(spec.first_label, spec.label_count)),
            format: self.options.format,
        };

        if let Some(existing) = self.metadata.num_features {
            if existing != model.num_features() {
                return Err(ConsistencyError::WeightFileMismatch {
                    file: candidate.file_name.clone(),
                    declared: model.num_features() as u32,
                    expected: existing as u32,
                });
            }
        } else {
            self.metadata.num_features = Some(model.num_features());
        }

        for entry in &self.metadata.files {
            if entry.overlaps(&candidate) {
                return Err(ConsistencyError::OverlappingEntries {
                    a_begin: entry.first,
                    a_end: entry.end(),
                    b_begin: candidate.first,
                    b_end: candidate.end(),
                });
            }
        }

        self.metadata.insert_sorted(candidate.clone());
        self.state = SaverState::Accepting;

        let path = self.dir.join(&candidate.file_name);
        let format = self.options.format;
        let precision = self.options.precision;
        let handle = std::thread::spawn(move || {
            format::write_model(&path, &model, format, precision)?;
            Ok(candidate)
        });
        Ok(SaveFuture { handle })
    }

    /// Rewrite the metadata file from the in-memory entries list. Legal at
    /// any point after the first `add_model` call.
    pub fn update_meta_file(&self) -> Result<(), IoError> {
        let path = self.dir.join(&self.base_name);
        let text = serde_json::to_string_pretty(&self.metadata).expect("Metadata always serializes");
        std::fs::write(&path, text).map_err(|source| IoError::Generic { path, source })
    }

    /// Verify full coverage of `[0, num_labels)`, then rewrite the metadata
    /// file and transition to [`SaverState::Finalized`].
    pub fn finalize(&mut self) -> Result<(), ConsistencyError> {
        if !self.metadata.is_fully_covered() {
            let (covered, _) = self.metadata.first_gap();
            return Err(ConsistencyError::IncompleteCoverage { covered, total: self.metadata.num_labels });
        }
        self.update_meta_file().map_err(|_| ConsistencyError::IncompleteCoverage {
            covered: self.metadata.first_gap().0,
            total: self.metadata.num_labels,
        })?;
        self.state = SaverState::Finalized;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Model, PartialModelSpec};
    use crate::types::LabelId;

    fn scratch_path(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("dismec-saver-test-{}-{}", std::process::id(), name));
        p
    }

    #[test]
    fn e3_partial_save_and_resume() {
        let path = scratch_path("meta.json");
        let _ = std::fs::remove_file(&path);
        let mut saver = PartialModelSaver::new(&path, 6, false, SaveOptions::default(), "2026-07-29".into()).unwrap();

        let spec_mid = PartialModelSpec::new(1, 4, 6).unwrap();
        let mut m_mid = Model::new_dense(spec_mid, 2);
        for l in 1..5 {
            m_mid.set_weights_for_label(LabelId::new(l), &[1.0, 1.0]).unwrap();
        }
        let f1 = saver.add_model(m_mid, None).unwrap();

        let spec_first = PartialModelSpec::new(0, 1, 6).unwrap();
        let mut m_first = Model::new_dense(spec_first, 2);
        m_first.set_weights_for_label(LabelId::new(0), &[0.5, 0.5]).unwrap();
        let f2 = saver.add_model(m_first, None).unwrap();

        assert_eq!(saver.get_missing_weights(), (5, 6));
        assert!(saver.finalize().is_err());

        let spec_last = PartialModelSpec::new(5, 1, 6).unwrap();
        let mut m_last = Model::new_dense(spec_last, 2);
        m_last.set_weights_for_label(LabelId::new(5), &[0.1, 0.1]).unwrap();
        let f3 = saver.add_model(m_last, None).unwrap();

        f1.join().unwrap();
        f2.join().unwrap();
        f3.join().unwrap();

        saver.finalize().unwrap();
        assert_eq!(saver.state(), SaverState::Finalized);

        let firsts: Vec<u32> = saver.metadata.files.iter().map(|e| e.first).collect();
        assert_eq!(firsts, vec![0, 1, 5]);

        let _ = std::fs::remove_file(&path);
        for entry in &saver.metadata.files {
            let _ = std::fs::remove_file(saver.dir.join(&entry.file_name));
        }
    }

    #[test]
    fn rejects_overlapping_ranges() {
        let path = scratch_path("overlap.json");
        let _ = std::fs::remove_file(&path);
        let mut saver = PartialModelSaver::new(&path, 4, false, SaveOptions::default(), "2026-07-29".into()).unwrap();

        let spec_a = PartialModelSpec::new(0, 2, 4).unwrap();
        let m_a = Model::new_dense(spec_a, 2);
        let f_a = saver.add_model(m_a, None).unwrap();
        f_a.join().unwrap();

        let spec_b = PartialModelSpec::new(1, 2, 4).unwrap();
        let m_b = Model::new_dense(spec_b, 2);
        assert!(saver.add_model(m_b, None).is_err());

        let _ = std::fs::remove_file(&path);
        for entry in &saver.metadata.files {
            let _ = std::fs::remove_file(saver.dir.join(&entry.file_name));
        }
    }
}
