//! Readers and writers for the three weight-file encodings.

use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::IoError;
use crate::io::metadata::WeightFormat;
use crate::model::{Model, PartialModelSpec, SparseEntry};
use crate::types::{LabelId, Real};

fn open_read(path: &Path) -> Result<BufReader<std::fs::File>, IoError> {
    let f = std::fs::File::open(path).map_err(|source| IoError::Open { path: path.to_path_buf(), source })?;
    Ok(BufReader::new(f))
}

fn create_write(path: &Path) -> Result<BufWriter<std::fs::File>, IoError> {
    let f = std::fs::File::create(path).map_err(|source| IoError::Open { path: path.to_path_buf(), source })?;
    Ok(BufWriter::new(f))
}

/// Write `model` to `path` in the given `format`, with `precision` significant
/// digits for text formats.
pub fn write_model(path: &Path, model: &Model, format: WeightFormat, precision: usize) -> Result<(), IoError> {
    match format {
        WeightFormat::Null => Ok(()),
        WeightFormat::DenseText => write_dense_text(path, model, precision),
        WeightFormat::SparseText => write_sparse_text(path, model, precision),
        WeightFormat::DenseBinary => write_dense_binary(path, model),
    }
}

fn write_dense_text(path: &Path, model: &Model, precision: usize) -> Result<(), IoError> {
    let mut w = create_write(path)?;
    let spec = model.spec();
    for local in 0..spec.label_count {
        let label = LabelId::new(spec.first_label + local);
        let weights = model.weights_for_label(label).expect("label in range by construction");
        let line: Vec<String> = weights.iter().map(|v| format!("{:.*}", precision, v)).collect();
        writeln!(w, "{}", line.join(" ")).map_err(|source| IoError::Generic { path: path.to_path_buf(), source })?;
    }
    Ok(())
}

fn write_sparse_text(path: &Path, model: &Model, precision: usize) -> Result<(), IoError> {
    let mut w = create_write(path)?;
    let spec = model.spec();
    for local in 0..spec.label_count {
        let label = LabelId::new(spec.first_label + local);
        let entries = model.sparse_weights_for_label(label).expect("label in range by construction");
        let line: Vec<String> = entries.iter().map(|e| format!("{}:{:.*}", e.index, precision, e.value)).collect();
        writeln!(w, "{}", line.join(" ")).map_err(|source| IoError::Generic { path: path.to_path_buf(), source })?;
    }
    Ok(())
}

fn write_dense_binary(path: &Path, model: &Model) -> Result<(), IoError> {
    let spec = model.spec();
    let rows = spec.label_count as usize;
    let cols = model.num_features();
    let mut w = create_write(path)?;

    let header_dict = format!("{{'descr': '<f4', 'fortran_order': False, 'shape': ({rows}, {cols}), }}");
    let prefix_len = 10; // magic(6) + version(2) + header_len(2)
    let unpadded = prefix_len + header_dict.len() + 1; // +1 for trailing newline
    let padded = (unpadded + 63) / 64 * 64;
    let pad = padded - unpadded;
    let mut header = header_dict.into_bytes();
    header.extend(std::iter::repeat(b' ').take(pad));
    header.push(b'\n');

    w.write_all(b"\x93NUMPY").map_err(|source| IoError::Generic { path: path.to_path_buf(), source })?;
    w.write_all(&[1u8, 0u8]).map_err(|source| IoError::Generic { path: path.to_path_buf(), source })?;
    let header_len = header.len() as u16;
    w.write_all(&header_len.to_le_bytes()).map_err(|source| IoError::Generic { path: path.to_path_buf(), source })?;
    w.write_all(&header).map_err(|source| IoError::Generic { path: path.to_path_buf(), source })?;

    for local in 0..rows as u32 {
        let label = LabelId::new(spec.first_label + local);
        let weights = model.weights_for_label(label).expect("label in range by construction");
        for v in weights {
            w.write_all(&v.to_le_bytes()).map_err(|source| IoError::Generic { path: path.to_path_buf(), source })?;
        }
    }
    Ok(())
}

/// Read a weight file into a freshly allocated [`Model`] for `spec`.
pub fn read_model(path: &Path, spec: PartialModelSpec, num_features: usize, format: WeightFormat, sparse: bool) -> Result<Model, IoError> {
    match format {
        WeightFormat::Null => Ok(if sparse { Model::new_sparse(spec, num_features) } else { Model::new_dense(spec, num_features) }),
        WeightFormat::DenseText => read_dense_text(path, spec, num_features, sparse),
        WeightFormat::SparseText => read_sparse_text(path, spec, num_features, sparse),
        WeightFormat::DenseBinary => read_dense_binary(path, spec, num_features, sparse),
    }
}

fn read_dense_text(path: &Path, spec: PartialModelSpec, num_features: usize, sparse: bool) -> Result<Model, IoError> {
    let reader = open_read(path)?;
    let mut model = if sparse { Model::new_sparse(spec, num_features) } else { Model::new_dense(spec, num_features) };
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| IoError::Generic { path: path.to_path_buf(), source })?;
        let values: Vec<Real> = line.split_whitespace().map(|tok| tok.parse().unwrap_or(0.0)).collect();
        if values.len() != num_features {
            return Err(IoError::DimensionMismatch { path: path.to_path_buf(), expected: num_features, actual: values.len() });
        }
        let label = LabelId::new(spec.first_label + i as u32);
        model.set_weights_for_label(label, &values).map_err(|_| IoError::DimensionMismatch {
            path: path.to_path_buf(),
            expected: spec.label_count as usize,
            actual: i + 1,
        })?;
    }
    Ok(model)
}

fn read_sparse_text(path: &Path, spec: PartialModelSpec, num_features: usize, sparse: bool) -> Result<Model, IoError> {
    let reader = open_read(path)?;
    let mut model = if sparse { Model::new_sparse(spec, num_features) } else { Model::new_dense(spec, num_features) };
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| IoError::Generic { path: path.to_path_buf(), source })?;
        // Trailing whitespace is tolerated on read even though the writer never emits it.
        let mut entries = Vec::new();
        for tok in line.split_whitespace() {
            if let Some((idx_s, val_s)) = tok.split_once(':') {
                if let (Ok(idx), Ok(val)) = (idx_s.parse::<u32>(), val_s.parse::<Real>()) {
                    entries.push(SparseEntry { index: idx, value: val });
                }
            }
        }
        let label = LabelId::new(spec.first_label + i as u32);
        model.set_sparse_weights_for_label(label, entries).map_err(|_| IoError::DimensionMismatch {
            path: path.to_path_buf(),
            expected: spec.label_count as usize,
            actual: i + 1,
        })?;
    }
    Ok(model)
}

fn read_dense_binary(path: &Path, spec: PartialModelSpec, num_features: usize, sparse: bool) -> Result<Model, IoError> {
    let mut f = std::fs::File::open(path).map_err(|source| IoError::Open { path: path.to_path_buf(), source })?;
    let mut magic = [0u8; 6];
    f.read_exact(&mut magic).map_err(|source| IoError::Generic { path: path.to_path_buf(), source })?;
    let mut version = [0u8; 2];
    f.read_exact(&mut version).map_err(|source| IoError::Generic { path: path.to_path_buf(), source })?;
    let mut len_bytes = [0u8; 2];
    f.read_exact(&mut len_bytes).map_err(|source| IoError::Generic { path: path.to_path_buf(), source })?;
    let header_len = u16::from_le_bytes(len_bytes) as usize;
    let mut header = vec![0u8; header_len];
    f.read_exact(&mut header).map_err(|source| IoError::Generic { path: path.to_path_buf(), source })?;

    let mut model = if sparse { Model::new_sparse(spec, num_features) } else { Model::new_dense(spec, num_features) };
    let mut buf4 = [0u8; 4];
    for local in 0..spec.label_count {
        let mut row = vec![0.0 as Real; num_features];
        for slot in row.iter_mut() {
            f.read_exact(&mut buf4).map_err(|source| IoError::Generic { path: path.to_path_buf(), source })?;
            *slot = Real::from_le_bytes(buf4);
        }
        let label = LabelId::new(spec.first_label + local);
        model.set_weights_for_label(label, &row).map_err(|_| IoError::DimensionMismatch {
            path: path.to_path_buf(),
            expected: spec.label_count as usize,
            actual: local as usize + 1,
        })?;
    }
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile_shim::TempPath;

    mod tempfile_shim {
        use std::path::PathBuf;
        /// Minimal scratch-file helper (std-only, no `tempfile` dependency).
        pub struct TempPath(pub PathBuf);
        impl TempPath {
            pub fn new(name: &str) -> Self {
                let mut p = std::env::temp_dir();
                p.push(format!("dismec-test-{}-{}", std::process::id(), name));
                TempPath(p)
            }
        }
        impl Drop for TempPath {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.0);
            }
        }
    }

    #[test]
    fn dense_text_round_trip() {
        let tmp = TempPath::new("dense.txt");
        let spec = PartialModelSpec::new(0, 2, 2).unwrap();
        let mut model = Model::new_dense(spec, 3);
        model.set_weights_for_label(LabelId::new(0), &[1.0, 2.0, 3.0]).unwrap();
        model.set_weights_for_label(LabelId::new(1), &[4.0, 5.0, 6.0]).unwrap();
        write_model(&tmp.0, &model, WeightFormat::DenseText, 6).unwrap();

        let loaded = read_model(&tmp.0, spec, 3, WeightFormat::DenseText, false).unwrap();
        assert_eq!(loaded.weights_for_label(LabelId::new(0)).unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(loaded.weights_for_label(LabelId::new(1)).unwrap(), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn sparse_text_round_trip_drops_zeros() {
        let tmp = TempPath::new("sparse.txt");
        let spec = PartialModelSpec::new(0, 1, 1).unwrap();
        let mut model = Model::new_sparse(spec, 4);
        model.set_weights_for_label(LabelId::new(0), &[0.0, 2.0, 0.0, 4.0]).unwrap();
        write_model(&tmp.0, &model, WeightFormat::SparseText, 6).unwrap();

        let loaded = read_model(&tmp.0, spec, 4, WeightFormat::SparseText, true).unwrap();
        assert_eq!(loaded.weights_for_label(LabelId::new(0)).unwrap(), vec![0.0, 2.0, 0.0, 4.0]);
    }
}
