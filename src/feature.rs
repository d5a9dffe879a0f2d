//! The shared, immutable feature matrix.
//!
//! [`FeatureMatrix`] is a tagged union of a dense row-major matrix and a
//! sparse CSR matrix. It is constructed once per dataset load, wrapped in an
//! `Arc`, and never mutated afterwards: every worker thread in the
//! [`crate::scheduler::TaskScheduler`] holds a clone of the `Arc` and reads
//! through it concurrently.

use crate::error::InvalidArgument;
use crate::types::Real;

/// One row of a sparse matrix: parallel `(column, value)` runs, columns sorted ascending.
#[derive(Clone, Debug, Default)]
pub struct SparseRow {
    /// Column indices, strictly increasing.
    pub indices: Vec<u32>,
    /// Values parallel to `indices`.
    pub values: Vec<Real>,
}

impl SparseRow {
    /// Dot product with a dense vector of length >= max(indices)+1.
    pub fn dot_dense(&self, other: &[Real]) -> Real {
        let mut acc = 0.0f64;
        for (&idx, &val) in self.indices.iter().zip(&self.values) {
            acc += f64::from(val) * f64::from(other[idx as usize]);
        }
        acc as Real
    }

    /// Scaled accumulate into a dense vector: `out += scale * self`.
    pub fn axpy_into(&self, scale: Real, out: &mut [Real]) {
        for (&idx, &val) in self.indices.iter().zip(&self.values) {
            out[idx as usize] += scale * val;
        }
    }

    /// Elementwise squared accumulate into a dense vector: `out += scale * self.^2`.
    pub fn axpy_squared_into(&self, scale: Real, out: &mut [Real]) {
        for (&idx, &val) in self.indices.iter().zip(&self.values) {
            out[idx as usize] += scale * val * val;
        }
    }

    /// Number of explicit non-zeros.
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }
}

/// Dense, row-major feature storage: `data[row * cols + col]`.
#[derive(Clone, Debug)]
pub struct DenseMatrix {
    data: Vec<Real>,
    rows: usize,
    cols: usize,
}

impl DenseMatrix {
    /// Build from row-major data, validating the shape.
    pub fn from_row_major(data: Vec<Real>, rows: usize, cols: usize) -> Result<Self, InvalidArgument> {
        if data.len() != rows * cols {
            return Err(InvalidArgument::DimensionMismatch { expected: rows * cols, actual: data.len() });
        }
        Ok(Self { data, rows, cols })
    }

    /// Borrow row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> &[Real] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }
}

/// Sparse, CSR-style feature storage: one [`SparseRow`] per instance.
#[derive(Clone, Debug)]
pub struct SparseMatrix {
    rows: Vec<SparseRow>,
    cols: usize,
}

impl SparseMatrix {
    /// Build from per-row sparse data, validating that no column exceeds `cols`.
    pub fn from_rows(rows: Vec<SparseRow>, cols: usize) -> Result<Self, InvalidArgument> {
        for row in &rows {
            if let Some(&max_idx) = row.indices.last() {
                if max_idx as usize >= cols {
                    return Err(InvalidArgument::DimensionMismatch { expected: cols, actual: max_idx as usize + 1 });
                }
            }
        }
        Ok(Self { rows, cols })
    }

    /// Borrow row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> &SparseRow {
        &self.rows[i]
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }
}

/// Tagged union over the two supported feature layouts.
///
/// Every inner loop in [`crate::objective::linear`] dispatches on this
/// enum exactly once per call (not per row), so the match itself never shows
/// up as a hot-path cost.
#[derive(Clone, Debug)]
pub enum FeatureMatrix {
    /// Dense row-major storage.
    Dense(DenseMatrix),
    /// Sparse CSR storage.
    Sparse(SparseMatrix),
}

impl FeatureMatrix {
    /// Number of instances (rows).
    pub fn rows(&self) -> usize {
        match self {
            FeatureMatrix::Dense(m) => m.rows(),
            FeatureMatrix::Sparse(m) => m.rows(),
        }
    }

    /// Number of features (columns).
    pub fn cols(&self) -> usize {
        match self {
            FeatureMatrix::Dense(m) => m.cols(),
            FeatureMatrix::Sparse(m) => m.cols(),
        }
    }

    /// Whether this matrix is stored in sparse form.
    pub fn is_sparse(&self) -> bool {
        matches!(self, FeatureMatrix::Sparse(_))
    }

    /// Dot product of row `i` with a dense vector `w`.
    pub fn row_dot(&self, i: usize, w: &[Real]) -> Real {
        match self {
            FeatureMatrix::Dense(m) => {
                let row = m.row(i);
                let mut acc = 0.0f64;
                for (a, b) in row.iter().zip(w) {
                    acc += f64::from(*a) * f64::from(*b);
                }
                acc as Real
            }
            FeatureMatrix::Sparse(m) => m.row(i).dot_dense(w),
        }
    }

    /// Compute `X^T w` for all rows: a dense vector of length `rows()`.
    pub fn mat_vec_rows(&self, w: &[Real]) -> Vec<Real> {
        (0..self.rows()).map(|i| self.row_dot(i, w)).collect()
    }

    /// Accumulate `out += scale_i * row_i` for every row, with per-row scale `scales[i]`.
    pub fn weighted_row_sum(&self, scales: &[Real], out: &mut [Real]) {
        match self {
            FeatureMatrix::Dense(m) => {
                for i in 0..m.rows() {
                    let s = scales[i];
                    if s == 0.0 {
                        continue;
                    }
                    let row = m.row(i);
                    for (o, x) in out.iter_mut().zip(row) {
                        *o += s * x;
                    }
                }
            }
            FeatureMatrix::Sparse(m) => {
                for i in 0..m.rows() {
                    let s = scales[i];
                    if s == 0.0 {
                        continue;
                    }
                    m.row(i).axpy_into(s, out);
                }
            }
        }
    }

    /// Accumulate `out += scale_i * row_i .^ 2` for every row (used by diagonal preconditioners).
    pub fn weighted_row_sum_squared(&self, scales: &[Real], out: &mut [Real]) {
        match self {
            FeatureMatrix::Dense(m) => {
                for i in 0..m.rows() {
                    let s = scales[i];
                    if s == 0.0 {
                        continue;
                    }
                    let row = m.row(i);
                    for (o, x) in out.iter_mut().zip(row) {
                        *o += s * x * x;
                    }
                }
            }
            FeatureMatrix::Sparse(m) => {
                for i in 0..m.rows() {
                    let s = scales[i];
                    if s == 0.0 {
                        continue;
                    }
                    m.row(i).axpy_squared_into(s, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_row_dot() {
        let m = DenseMatrix::from_row_major(vec![1.0, 2.0, 3.0, 4.0], 2, 2).unwrap();
        let fm = FeatureMatrix::Dense(m);
        assert_eq!(fm.row_dot(0, &[1.0, 1.0]), 3.0);
        assert_eq!(fm.row_dot(1, &[0.0, 1.0]), 4.0);
    }

    #[test]
    fn sparse_row_dot() {
        let row = SparseRow { indices: vec![0, 3], values: vec![2.0, 5.0] };
        let m = SparseMatrix::from_rows(vec![row], 4).unwrap();
        let fm = FeatureMatrix::Sparse(m);
        assert_eq!(fm.row_dot(0, &[1.0, 0.0, 0.0, 1.0]), 7.0);
    }

    #[test]
    fn sparse_rejects_out_of_range_column() {
        let row = SparseRow { indices: vec![5], values: vec![1.0] };
        assert!(SparseMatrix::from_rows(vec![row], 4).is_err());
    }
}
