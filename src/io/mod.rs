//! Partial-model persistence: metadata schema, weight-file codecs, the
//! checkpoint-writing saver, and the range-query loader.

/// Weight-file encode/decode for each [`metadata::WeightFormat`].
pub mod format;
/// Range-query loader reassembling weight files into a [`crate::model::Model`].
pub mod loader;
/// The on-disk metadata schema (`Metadata`, `WeightFileEntry`, `WeightFormat`).
pub mod metadata;
/// The checkpoint-writing saver and its async [`saver::SaveFuture`].
pub mod saver;

pub use loader::{PartialModelLoader, SparseMode};
pub use metadata::{Metadata, WeightFileEntry, WeightFormat};
pub use saver::{PartialModelSaver, SaveFuture, SaveOptions, SaverState};
