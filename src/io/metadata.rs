//! The model metadata file: JSON schema plus the `WeightFileEntry` list.

use serde::{Deserialize, Serialize};

/// On-disk weight file encodings.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeightFormat {
    /// One line per label, whitespace-separated reals.
    DenseText,
    /// One line per label, whitespace-separated `index:value` pairs.
    SparseText,
    /// NumPy-compatible `.npy`, row-major, one row per label.
    DenseBinary,
    /// No file written; used only in tests.
    Null,
}

/// One entry in the metadata's `files` array: the weight file covering
/// `[first, first+count)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightFileEntry {
    /// First label covered.
    pub first: u32,
    /// Number of labels covered.
    pub count: u32,
    /// Weight file name, relative to the metadata file's directory.
    pub file_name: String,
    /// Encoding of the weight file.
    pub format: WeightFormat,
}

impl WeightFileEntry {
    /// Exclusive upper bound of the covered range.
    pub fn end(&self) -> u32 {
        self.first + self.count
    }

    /// Whether this entry's range overlaps `other`'s.
    pub fn overlaps(&self, other: &WeightFileEntry) -> bool {
        self.first < other.end() && other.first < self.end()
    }
}

/// The full metadata file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Metadata {
    /// Feature dimension; `None` until the first model is added.
    #[serde(rename = "num-features")]
    pub num_features: Option<usize>,
    /// Total label count for the logical model.
    #[serde(rename = "num-labels")]
    pub num_labels: u32,
    /// Creation/last-update date, ISO-8601.
    pub date: String,
    /// Weight file entries, kept sorted by `first`.
    pub files: Vec<WeightFileEntry>,
}

impl Metadata {
    /// A fresh, empty metadata for a `num_labels`-label model.
    pub fn empty(num_labels: u32, date: String) -> Self {
        Self { num_features: None, num_labels, date, files: Vec::new() }
    }

    /// Insert `entry` at its sorted position. Caller is responsible for
    /// overlap-checking beforehand (see [`crate::io::saver::PartialModelSaver`]).
    pub fn insert_sorted(&mut self, entry: WeightFileEntry) {
        let pos = self.files.partition_point(|e| e.first < entry.first);
        self.files.insert(pos, entry);
    }

    /// The first gap in `[0, num_labels)` not covered by any entry, or
    /// `(num_labels, num_labels)` if fully covered.
    pub fn first_gap(&self) -> (u32, u32) {
        let mut cursor = 0u32;
        for entry in &self.files {
            if entry.first > cursor {
                return (cursor, entry.first);
            }
            cursor = cursor.max(entry.end());
        }
        if cursor < self.num_labels {
            (cursor, self.num_labels)
        } else {
            (self.num_labels, self.num_labels)
        }
    }

    /// Whether every label in `[0, num_labels)` is covered exactly once.
    pub fn is_fully_covered(&self) -> bool {
        self.first_gap() == (self.num_labels, self.num_labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_gap_on_empty_metadata() {
        let meta = Metadata::empty(10, "2026-01-01".into());
        assert_eq!(meta.first_gap(), (0, 10));
    }

    #[test]
    fn first_gap_after_partial_coverage() {
        let mut meta = Metadata::empty(6, "2026-01-01".into());
        meta.insert_sorted(WeightFileEntry { first: 1, count: 4, file_name: "a".into(), format: WeightFormat::DenseText });
        meta.insert_sorted(WeightFileEntry { first: 0, count: 1, file_name: "b".into(), format: WeightFormat::DenseText });
        assert_eq!(meta.first_gap(), (5, 6));
        assert!(!meta.is_fully_covered());
    }

    #[test]
    fn insert_sorted_keeps_entries_ordered() {
        let mut meta = Metadata::empty(6, "2026-01-01".into());
        meta.insert_sorted(WeightFileEntry { first: 5, count: 1, file_name: "c".into(), format: WeightFormat::DenseText });
        meta.insert_sorted(WeightFileEntry { first: 0, count: 1, file_name: "a".into(), format: WeightFormat::DenseText });
        meta.insert_sorted(WeightFileEntry { first: 1, count: 4, file_name: "b".into(), format: WeightFormat::DenseText });
        let firsts: Vec<u32> = meta.files.iter().map(|e| e.first).collect();
        assert_eq!(firsts, vec![0, 1, 5]);
    }

    #[test]
    fn overlap_detection() {
        let a = WeightFileEntry { first: 0, count: 5, file_name: "a".into(), format: WeightFormat::DenseText };
        let b = WeightFileEntry { first: 4, count: 2, file_name: "b".into(), format: WeightFormat::DenseText };
        assert!(a.overlaps(&b));
        let c = WeightFileEntry { first: 5, count: 2, file_name: "c".into(), format: WeightFormat::DenseText };
        assert!(!a.overlaps(&c));
    }
}
