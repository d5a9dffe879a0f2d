//! The SLICE two-file dataset format: a feature file and a label file sharing
//! the same per-line token grammar as XMC's row bodies.

use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::dataset::Dataset;
use crate::error::IoError;
use crate::feature::{FeatureMatrix, SparseMatrix, SparseRow};
use crate::types::Real;

fn read_lines(path: &Path) -> Result<Vec<String>, IoError> {
    let file = std::fs::File::open(path).map_err(|source| IoError::Open { path: path.to_path_buf(), source })?;
    BufReader::new(file)
        .lines()
        .map(|l| l.map_err(|source| IoError::Generic { path: path.to_path_buf(), source }))
        .collect()
}

/// Read the SLICE format: `features_path` holds `N D` on the first line then
/// one sparse feature row per line; `labels_path` holds `N L` then one
/// comma-separated label list per line.
pub fn read_slice(features_path: &Path, labels_path: &Path) -> Result<Dataset, IoError> {
    let feature_lines = read_lines(features_path)?;
    let label_lines = read_lines(labels_path)?;

    let mut feat_header = feature_lines.first().ok_or_else(|| IoError::Generic {
        path: features_path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "missing header"),
    })?.split_whitespace();
    let n: usize = feat_header.next().and_then(|t| t.parse().ok()).unwrap_or(0);
    let d: usize = feat_header.next().and_then(|t| t.parse().ok()).unwrap_or(0);

    let mut label_header = label_lines.first().ok_or_else(|| IoError::Generic {
        path: labels_path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "missing header"),
    })?.split_whitespace();
    let _n2: usize = label_header.next().and_then(|t| t.parse().ok()).unwrap_or(0);
    let l: usize = label_header.next().and_then(|t| t.parse().ok()).unwrap_or(0);

    let mut rows = Vec::with_capacity(n);
    for line in feature_lines.iter().skip(1).take(n) {
        let mut indices = Vec::new();
        let mut values = Vec::new();
        for tok in line.split_whitespace() {
            if let Some((idx_s, val_s)) = tok.split_once(':') {
                if let (Ok(idx), Ok(val)) = (idx_s.parse::<u32>(), val_s.parse::<Real>()) {
                    indices.push(idx);
                    values.push(val);
                }
            }
        }
        rows.push(SparseRow { indices, values });
    }

    let mut labels_per_instance = Vec::with_capacity(n);
    for line in label_lines.iter().skip(1).take(n) {
        let labels: Vec<u32> = line.trim().split(',').filter(|s| !s.is_empty()).filter_map(|s| s.parse().ok()).collect();
        labels_per_instance.push(labels);
    }

    let matrix = SparseMatrix::from_rows(rows, d)
        .map_err(|_| IoError::DimensionMismatch { path: features_path.to_path_buf(), expected: d, actual: 0 })?;
    Dataset::new(FeatureMatrix::Sparse(matrix), l as u32, labels_per_instance)
        .map_err(|_| IoError::DimensionMismatch { path: labels_path.to_path_buf(), expected: n, actual: 0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("dismec-slice-test-{}-{}", std::process::id(), name));
        p
    }

    #[test]
    fn parses_feature_and_label_files() {
        let feat = scratch_path("feat.txt");
        let labl = scratch_path("label.txt");
        std::fs::write(&feat, "2 3\n0:1.0 2:2.0\n1:1.5\n").unwrap();
        std::fs::write(&labl, "2 2\n0\n0,1\n").unwrap();

        let ds = read_slice(&feat, &labl).unwrap();
        assert_eq!(ds.num_examples(), 2);
        assert_eq!(ds.num_features(), 3);
        assert_eq!(ds.num_labels(), 2);

        let _ = std::fs::remove_file(&feat);
        let _ = std::fs::remove_file(&labl);
    }
}
