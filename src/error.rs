//! Crate-wide error hierarchy
//!
//! Each module that can fail defines its own narrow error enum; this module
//! collects the four error *kinds* that recur everywhere (bad input, numeric
//! failure, I/O, and on-disk inconsistency) and composes them into
//! [`DismecError`], the type returned at the driver boundary.

use std::path::PathBuf;

use thiserror::Error;

/// A hyperparameter, dimension, or label id outside its legal range.
#[derive(Debug, Error)]
pub enum InvalidArgument {
    /// A scalar hyperparameter fell outside its documented range.
    #[error("{name} must be {constraint} (got {value})")]
    OutOfRange {
        /// Hyperparameter name.
        name: &'static str,
        /// Human-readable constraint, e.g. "> 0".
        constraint: &'static str,
        /// The offending value, formatted by the caller.
        value: String,
    },
    /// Two vectors/matrices that should agree in length do not.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },
    /// A label id fell outside the range the caller declared as valid.
    #[error("label {label} outside valid range [{begin}, {end})")]
    LabelOutOfRange {
        /// The offending label.
        label: u32,
        /// Lower bound (inclusive).
        begin: u32,
        /// Upper bound (exclusive).
        end: u32,
    },
    /// A hyperparameter name was not recognized by the component.
    #[error("unknown hyperparameter {0:?}")]
    UnknownHyperParameter(String),
    /// A hyperparameter was looked up with the wrong value type.
    #[error("hyperparameter {0:?} has the wrong type")]
    WrongHyperParameterType(String),
    /// Two label ranges that are being combined into one model overlap.
    #[error("label range [{a_begin}, {a_end}) overlaps [{b_begin}, {b_end})")]
    OverlappingRanges {
        /// Start of the first range.
        a_begin: u32,
        /// End of the first range.
        a_end: u32,
        /// Start of the second range.
        b_begin: u32,
        /// End of the second range.
        b_end: u32,
    },
    /// A free-form message for cases not covered by the variants above.
    #[error("{0}")]
    Other(String),
}

/// A numerical solver could not make progress.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NumericFailure {
    /// The objective value or gradient became non-finite.
    #[error("non-finite value encountered at iteration {iteration}")]
    NonFinite {
        /// Iteration at which this was detected.
        iteration: usize,
    },
    /// The line search exhausted its step budget without an accepted step.
    #[error("line search exhausted after {steps} steps")]
    LineSearchExhausted {
        /// Number of backtracking steps attempted.
        steps: usize,
    },
    /// Successive objective values stopped changing before convergence.
    #[error("optimization stalled: |f_prev - f| below tolerance")]
    Stalled,
    /// The CG search direction became degenerate (`d^T A d` too small).
    #[error("conjugate gradient direction degenerate at iteration {iteration}")]
    DegenerateDirection {
        /// Iteration at which this was detected.
        iteration: usize,
    },
    /// The objective diverged towards negative infinity.
    #[error("objective diverged")]
    Diverged,
}

/// Failure to read or write a file on disk.
#[derive(Debug, Error)]
pub enum IoError {
    /// The file could not be opened.
    #[error("cannot open {path}: {source}")]
    Open {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// The metadata file could not be parsed as JSON.
    #[error("cannot parse metadata {path}: {source}")]
    MetadataParse {
        /// Path of the offending metadata file.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// A weight file's declared dimensions disagree with the model being loaded into.
    #[error("dimension mismatch in {path}: expected {expected} features, found {actual}")]
    DimensionMismatch {
        /// Offending file.
        path: PathBuf,
        /// Expected feature count.
        expected: usize,
        /// Feature count found in the file.
        actual: usize,
    },
    /// A generic read/write failure.
    #[error("I/O error on {path}: {source}")]
    Generic {
        /// Offending path.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

/// The on-disk model is internally inconsistent.
#[derive(Debug, Error)]
pub enum ConsistencyError {
    /// Two weight-file entries in the same metadata cover overlapping label ranges.
    #[error("metadata lists overlapping label ranges [{a_begin}, {a_end}) and [{b_begin}, {b_end})")]
    OverlappingEntries {
        /// Start of the first range.
        a_begin: u32,
        /// End of the first range.
        a_end: u32,
        /// Start of the second range.
        b_begin: u32,
        /// End of the second range.
        b_end: u32,
    },
    /// A finalized model's entries do not cover the full label range.
    #[error("model covers [0, {covered}) but declares {total} labels")]
    IncompleteCoverage {
        /// Labels actually covered by on-disk entries.
        covered: u32,
        /// Labels the metadata claims to have.
        total: u32,
    },
    /// A weight file's label count disagrees with its metadata entry.
    #[error("weight file {file} declares {declared} labels but metadata entry spans {expected}")]
    WeightFileMismatch {
        /// Offending weight file.
        file: String,
        /// Label count found in the file.
        declared: u32,
        /// Label count the metadata entry expects.
        expected: u32,
    },
}

/// Top-level error type returned by the OVA driver and the CLI.
#[derive(Debug, Error)]
pub enum DismecError {
    /// See [`InvalidArgument`].
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),
    /// See [`NumericFailure`]. At the driver level this is only surfaced when
    /// every label in a batch failed; single-label failures are logged and
    /// training continues.
    #[error(transparent)]
    NumericFailure(#[from] NumericFailure),
    /// See [`IoError`].
    #[error(transparent)]
    Io(#[from] IoError),
    /// See [`ConsistencyError`].
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
}

/// Convenience constructor for a range-validation error.
pub fn out_of_range(name: &'static str, constraint: &'static str, value: impl std::fmt::Display) -> InvalidArgument {
    InvalidArgument::OutOfRange { name, constraint, value: value.to_string() }
}
