//! Crate root: public surface and module map for the OVA extreme
//! multi-label linear classifier trainer.
//!
//! This module is the single canonical entry point for downstream users of
//! the library. It re-exports the small set of types most callers need
//! (`Dataset`, `TrainingSpec`, the driver's `train`/`train_exact_range`) and
//! otherwise leaves each submodule's public surface to speak for itself.
//!
//! ## Invariants
//!
//! - **Per-label independence.** Every label's Newton solve reads only its
//!   own retargeted objective and writes only its own weight column; no
//!   cross-label state is shared except the read-only feature matrix.
//! - **Streaming discipline.** The feature matrix is loaded once, wrapped in
//!   an `Arc`, and never mutated; every worker thread holds a clone and reads
//!   through it concurrently. See [`feature::FeatureMatrix`].
//! - **Checkpoint safety.** The driver only advances its on-disk metadata
//!   file after the weight file it describes has finished writing (see
//!   [`driver`] and [`io::saver`]), so a crash mid-run never produces a
//!   metadata file that points at a partial weight file.
//!
//! These invariants are enforced by design across the submodules. If any
//! invariant is violated at runtime, the failure mode is a precise
//! [`error::DismecError`], never UB -- this crate forbids unsafe code
//! throughout.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Crate-wide error hierarchy (`InvalidArgument`, `NumericFailure`, `IoError`,
/// `ConsistencyError`, composed into `DismecError`).
pub mod error;
/// Scalar type alias, `LabelId`, and the vector-mutation-count `VectorHash`.
pub mod types;
/// `HashedVector` / `HashCache`: hash-gated memoization for per-label solves.
pub mod hashvec;
/// The shared, immutable dense/sparse feature matrix.
pub mod feature;
/// Margin functions, regularizers, and the per-label `Objective` contract.
pub mod objective;
/// Preconditioned CG, Armijo line search, and the outer Newton solver.
pub mod solver;
/// Per-label positive/negative instance weighting schemes.
pub mod weighting;
/// Post-solve transforms applied to a label's weight vector (cull, sparsify, reorder).
pub mod postproc;
/// Weight initialization strategies seeding each label's Newton solve.
pub mod init;
/// Per-thread statistics gathering, merged once training finishes.
pub mod stats;
/// The in-memory model: weights for a contiguous label range.
pub mod model;
/// Partial-model persistence: metadata schema, codecs, saver, loader.
pub mod io;
/// Dataset loading (XMC/SLICE formats) and the label-column/positive-index accessor.
pub mod dataset;
/// The `TrainingSpec` factory trait binding dataset + objective + solver + init + post-processing.
pub mod training_spec;
/// Fixed-size worker pool dispatching contiguous task chunks under a deadline.
pub mod scheduler;
/// The OVA training driver: per-label Newton solves, batched, with async checkpointing.
pub mod driver;
/// Hyperparameter plumbing and CLI-facing `Config` assembly.
pub mod config;

pub use crate::dataset::Dataset;
pub use crate::driver::{train, train_exact_range, DriverOptions, TrainReport};
pub use crate::error::DismecError;
pub use crate::model::Model;
pub use crate::training_spec::TrainingSpec;
pub use crate::types::{LabelId, Real};
