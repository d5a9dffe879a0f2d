//! The XMC extreme-multi-label text format.
//!
//! ```text
//! N D L
//! lbl1,lbl2,... ftr:val ftr:val ...
//! ```
//! Blank lines and `#`-prefixed comment lines are skipped. Indices are
//! 0-based unless `one_based` is set.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::dataset::Dataset;
use crate::error::IoError;
use crate::feature::{FeatureMatrix, SparseMatrix, SparseRow};
use crate::types::Real;

/// Parse an XMC-format file into a [`Dataset`] with a sparse feature matrix.
pub fn read_xmc(path: &Path, one_based: bool) -> Result<Dataset, IoError> {
    let file = std::fs::File::open(path).map_err(|source| IoError::Open { path: path.to_path_buf(), source })?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let header = loop {
        let line = lines.next().ok_or_else(|| IoError::Generic {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "missing header"),
        })??;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        break trimmed.to_string();
    };

    let mut header_fields = header.split_whitespace();
    let parse_usize = |tok: Option<&str>| -> Result<usize, IoError> {
        tok.and_then(|t| t.parse().ok()).ok_or_else(|| IoError::Generic {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed header"),
        })
    };
    let n = parse_usize(header_fields.next())?;
    let d = parse_usize(header_fields.next())?;
    let l = parse_usize(header_fields.next())?;

    let mut rows = Vec::with_capacity(n);
    let mut labels_per_instance = Vec::with_capacity(n);

    for line_result in lines {
        let line = line_result.map_err(|source| IoError::Generic { path: path.to_path_buf(), source })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut tokens = trimmed.split_whitespace();
        let label_tok = tokens.next().unwrap_or("");
        let mut labels = Vec::new();
        if !label_tok.is_empty() {
            for part in label_tok.split(',') {
                if let Ok(mut idx) = part.parse::<u32>() {
                    if one_based {
                        idx = idx.saturating_sub(1);
                    }
                    labels.push(idx);
                }
            }
        }

        let mut indices = Vec::new();
        let mut values = Vec::new();
        for tok in tokens {
            if let Some((idx_s, val_s)) = tok.split_once(':') {
                if let (Ok(mut idx), Ok(val)) = (idx_s.parse::<u32>(), val_s.parse::<Real>()) {
                    if one_based {
                        idx = idx.saturating_sub(1);
                    }
                    indices.push(idx);
                    values.push(val);
                }
            }
        }
        rows.push(SparseRow { indices, values });
        labels_per_instance.push(labels);
    }

    let matrix = SparseMatrix::from_rows(rows, d).map_err(|_| IoError::DimensionMismatch { path: path.to_path_buf(), expected: d, actual: 0 })?;
    Dataset::new(FeatureMatrix::Sparse(matrix), l as u32, labels_per_instance)
        .map_err(|_| IoError::DimensionMismatch { path: path.to_path_buf(), expected: n, actual: 0 })
}

/// Write `dataset` in XMC text format. Writers never emit trailing
/// whitespace; see `read_xmc`'s tolerance of it on read.
pub fn save_xmc(path: &Path, dataset: &Dataset, precision: usize) -> Result<(), IoError> {
    let mut file = std::fs::File::create(path).map_err(|source| IoError::Open { path: path.to_path_buf(), source })?;
    writeln!(file, "{} {} {}", dataset.num_examples(), dataset.num_features(), dataset.num_labels())
        .map_err(|source| IoError::Generic { path: path.to_path_buf(), source })?;

    let features = dataset.features();
    for i in 0..dataset.num_examples() {
        let mut labels: Vec<u32> = Vec::new();
        for l in 0..dataset.num_labels() {
            if dataset.label_column(crate::types::LabelId::new(l))[i] > 0.0 {
                labels.push(l);
            }
        }
        let label_str: Vec<String> = labels.iter().map(|l| l.to_string()).collect();

        let feature_str: Vec<String> = match &*features {
            FeatureMatrix::Sparse(m) => m
                .row(i)
                .indices
                .iter()
                .zip(&m.row(i).values)
                .map(|(idx, val)| format!("{}:{:.*}", idx, precision, val))
                .collect(),
            FeatureMatrix::Dense(m) => m
                .row(i)
                .iter()
                .enumerate()
                .filter(|(_, &v)| v != 0.0)
                .map(|(idx, val)| format!("{}:{:.*}", idx, precision, val))
                .collect(),
        };

        writeln!(file, "{} {}", label_str.join(","), feature_str.join(" ")).map_err(|source| IoError::Generic { path: path.to_path_buf(), source })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("dismec-xmc-test-{}-{}", std::process::id(), name));
        p
    }

    #[test]
    fn parses_header_and_rows() {
        let path = scratch_path("toy.xmc");
        std::fs::write(&path, "2 3 2\n0 0:1.0 2:2.0\n0,1 1:1.5\n").unwrap();
        let ds = read_xmc(&path, false).unwrap();
        assert_eq!(ds.num_examples(), 2);
        assert_eq!(ds.num_features(), 3);
        assert_eq!(ds.num_labels(), 2);
        assert_eq!(ds.num_positives(crate::types::LabelId::new(0)), 2);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        let path = scratch_path("comments.xmc");
        std::fs::write(&path, "# a comment\n\n1 1 1\n\n0 0:1.0\n").unwrap();
        let ds = read_xmc(&path, false).unwrap();
        assert_eq!(ds.num_examples(), 1);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn round_trip_preserves_features_and_labels() {
        let path = scratch_path("roundtrip.xmc");
        std::fs::write(&path, "2 3 2\n0 0:1.000000 2:2.000000\n1 1:1.500000\n").unwrap();
        let ds = read_xmc(&path, false).unwrap();

        let out_path = scratch_path("roundtrip_out.xmc");
        save_xmc(&out_path, &ds, 6).unwrap();
        let ds2 = read_xmc(&out_path, false).unwrap();

        assert_eq!(ds.num_examples(), ds2.num_examples());
        assert_eq!(ds.num_features(), ds2.num_features());
        for l in 0..2 {
            assert_eq!(ds.label_column(crate::types::LabelId::new(l)), ds2.label_column(crate::types::LabelId::new(l)));
        }
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(&out_path);
    }
}
