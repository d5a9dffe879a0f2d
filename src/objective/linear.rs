//! The linear classifier loss: `f(w) = sum_i c_i * phi(y_i * x_i^T w) + R(w)`.
//!
//! This is the one [`Objective`] implementation that matters for training
//! speed, so every cache described in `SPEC_FULL.md` §4.1/§4.3 lives here:
//! `X^T w` is recomputed only when the incoming [`HashedVector`]'s hash
//! changes, and the line-search fast path (`project_to_line` /
//! `lookup_on_line`) reuses `X^T w` and `X^T d` to evaluate `f(w + t d)` in
//! `O(N)` with no further matrix multiply.

use std::sync::Arc;

use crate::error::InvalidArgument;
use crate::feature::FeatureMatrix;
use crate::hashvec::HashedVector;
use crate::objective::margin::MarginFunction;
use crate::objective::regularizer::Regularizer;
use crate::objective::Objective;
use crate::types::{Real, VectorHash};

/// `f(w) = sum_i c_i * phi(y_i * x_i^T w) + R(w)`, for one label at a time.
///
/// A single instance is reused across all labels trained on one worker
/// thread: [`LinearClassifierLoss::retarget`] swaps in a new label column and
/// cost vector and invalidates every cache below it.
pub struct LinearClassifierLoss {
    features: Arc<FeatureMatrix>,
    margin: MarginFunction,
    regularizer: Regularizer,
    /// `y_i in {-1, +1}`, length N.
    labels: Vec<Real>,
    /// Per-instance loss weight `c_i`, length N.
    costs: Vec<Real>,

    // Xtw cache, keyed by hash of w.
    xtw_hash: Option<VectorHash>,
    xtw: Vec<Real>,
    // derivative/curvature vectors derived from xtw, same key.
    deriv: Vec<Real>,
    curv: Vec<Real>,

    // line-search cache: Xtw and Xtd at the point `project_to_line` was called.
    line_xtw: Vec<Real>,
    line_xtd: Vec<Real>,
    line_w_hash: Option<VectorHash>,
    // Regularizer contribution along the line: the closed-form `(w.w, w.d,
    // d.d)` triple when the regularizer supports it, otherwise a clone of `w`
    // and `d` to recompute `R(w + t d)` directly at each `t`.
    line_reg_closed: Option<(f64, f64, f64)>,
    line_w: Vec<Real>,
    line_d: Vec<Real>,
}

impl LinearClassifierLoss {
    /// Construct a loss over `features`, with an initial (possibly empty)
    /// label column and cost vector; callers typically follow up with
    /// [`retarget`](Self::retarget) before training each label.
    pub fn new(features: Arc<FeatureMatrix>, margin: MarginFunction, regularizer: Regularizer) -> Self {
        let n = features.rows();
        Self {
            features,
            margin,
            regularizer,
            labels: vec![0.0; n],
            costs: vec![0.0; n],
            xtw_hash: None,
            xtw: vec![0.0; n],
            deriv: vec![0.0; n],
            curv: vec![0.0; n],
            line_xtw: vec![0.0; n],
            line_xtd: vec![0.0; n],
            line_w_hash: None,
            line_reg_closed: None,
            line_w: Vec::new(),
            line_d: Vec::new(),
        }
    }

    /// Point this loss at a new label: new `{-1,+1}` column and per-instance
    /// costs. Invalidates every cache keyed by `w`'s hash.
    pub fn retarget(&mut self, labels: Vec<Real>, costs: Vec<Real>) -> Result<(), InvalidArgument> {
        let n = self.features.rows();
        if labels.len() != n || costs.len() != n {
            return Err(InvalidArgument::DimensionMismatch { expected: n, actual: labels.len().max(costs.len()) });
        }
        self.labels = labels;
        self.costs = costs;
        self.xtw_hash = None;
        self.line_w_hash = None;
        Ok(())
    }

    fn refresh_xtw(&mut self, w: &HashedVector) {
        if self.xtw_hash == Some(w.hash()) {
            return;
        }
        self.xtw = self.features.mat_vec_rows(w.as_slice());
        for i in 0..self.xtw.len() {
            let m = self.labels[i] * self.xtw[i];
            self.deriv[i] = self.costs[i] * self.labels[i] * self.margin.grad(m);
            self.curv[i] = self.costs[i] * self.margin.curvature(m);
        }
        self.xtw_hash = Some(w.hash());
    }

    fn data_value(&self) -> Real {
        let mut acc = 0.0f64;
        for i in 0..self.xtw.len() {
            let m = self.labels[i] * self.xtw[i];
            acc += f64::from(self.costs[i]) * f64::from(self.margin.value(m));
        }
        acc as Real
    }
}

impl Objective for LinearClassifierLoss {
    fn num_variables(&self) -> Option<usize> {
        Some(self.features.cols())
    }

    fn value(&mut self, w: &HashedVector) -> Real {
        self.refresh_xtw(w);
        self.data_value() + self.regularizer.value(w.as_slice())
    }

    fn gradient(&mut self, w: &HashedVector, out: &mut [Real]) {
        self.refresh_xtw(w);
        out.iter_mut().for_each(|x| *x = 0.0);
        self.features.weighted_row_sum(&self.deriv, out);
        self.regularizer.add_gradient(w.as_slice(), out);
    }

    fn gradient_at_zero(&mut self, out: &mut [Real]) {
        out.iter_mut().for_each(|x| *x = 0.0);
        let mut scales = vec![0.0; self.labels.len()];
        for i in 0..scales.len() {
            scales[i] = self.costs[i] * self.labels[i] * self.margin.grad(0.0);
        }
        self.features.weighted_row_sum(&scales, out);
        // regularizer gradient at w=0 is identically zero for every supported kind.
    }

    fn hessian_times_direction(&mut self, w: &HashedVector, d: &[Real], out: &mut [Real]) {
        self.refresh_xtw(w);
        let xtd = self.features.mat_vec_rows(d);
        let mut scales = vec![0.0; xtd.len()];
        for i in 0..xtd.len() {
            scales[i] = self.curv[i] * xtd[i];
        }
        out.iter_mut().for_each(|x| *x = 0.0);
        self.features.weighted_row_sum(&scales, out);
        self.regularizer.add_hessian_times_direction(w.as_slice(), d, out);
    }

    fn diag_preconditioner(&mut self, w: &HashedVector, out: &mut [Real]) {
        self.refresh_xtw(w);
        out.iter_mut().for_each(|x| *x = 0.0);
        self.features.weighted_row_sum_squared(&self.curv, out);
        self.regularizer.add_diag_curvature(w.as_slice(), out);
    }

    fn project_to_line(&mut self, w: &HashedVector, d: &[Real]) {
        self.refresh_xtw(w);
        self.line_xtw.copy_from_slice(&self.xtw);
        self.line_xtd = self.features.mat_vec_rows(d);
        self.line_w_hash = Some(w.hash());

        self.line_reg_closed = self.regularizer.project_to_line_closed_form(w.as_slice(), d);
        if self.line_reg_closed.is_none() {
            self.line_w.clear();
            self.line_w.extend_from_slice(w.as_slice());
            self.line_d.clear();
            self.line_d.extend_from_slice(d);
        }
    }

    fn lookup_on_line(&mut self, t: Real) -> Real {
        let mut acc = 0.0f64;
        for i in 0..self.line_xtw.len() {
            let score = self.line_xtw[i] + t * self.line_xtd[i];
            let m = self.labels[i] * score;
            acc += f64::from(self.costs[i]) * f64::from(self.margin.value(m));
        }

        let reg = match self.line_reg_closed {
            Some(coefficients) => self.regularizer.value_from_closed_form(coefficients, t),
            None => {
                let moved: Vec<Real> = self.line_w.iter().zip(&self.line_d).map(|(&wj, &dj)| wj + t * dj).collect();
                self.regularizer.value(&moved)
            }
        };

        acc as Real + reg
    }

    fn declare_vector_on_last_line(&mut self, w: &HashedVector, t: Real) {
        for i in 0..self.xtw.len() {
            self.xtw[i] = self.line_xtw[i] + t * self.line_xtd[i];
            let m = self.labels[i] * self.xtw[i];
            self.deriv[i] = self.costs[i] * self.labels[i] * self.margin.grad(m);
            self.curv[i] = self.costs[i] * self.margin.curvature(m);
        }
        self.xtw_hash = Some(w.hash());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::DenseMatrix;
    use crate::objective::regularizer::Regularizer;

    fn toy_objective() -> LinearClassifierLoss {
        // x0=(0,0,0,1,0), x1=(2,0,0,0,0), x2=(0,1,1,0,0); label 0 positive = {1}.
        let data = vec![
            0.0, 0.0, 0.0, 1.0, 0.0, //
            2.0, 0.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 1.0, 0.0, 0.0,
        ];
        let dm = DenseMatrix::from_row_major(data, 3, 5).unwrap();
        let features = Arc::new(FeatureMatrix::Dense(dm));
        let reg = Regularizer::squared(1.0, false).unwrap();
        let mut obj = LinearClassifierLoss::new(features, MarginFunction::SquaredHinge, reg);
        obj.retarget(vec![-1.0, 1.0, -1.0], vec![1.0, 1.0, 1.0]).unwrap();
        obj
    }

    #[test]
    fn e1_value_matches_worked_example() {
        let mut obj = toy_objective();
        let w = HashedVector::new(vec![1.0, 2.0, 0.0, -1.0, 2.0]);
        let v = obj.value(&w);
        assert!((v - 14.0).abs() < 1e-3, "got {v}");
    }

    #[test]
    fn finite_difference_gradient_check() {
        let mut obj = toy_objective();
        let w0 = vec![0.3, -0.2, 0.1, 0.5, -0.4];
        let w = HashedVector::new(w0.clone());
        let mut g = vec![0.0; 5];
        obj.gradient(&w, &mut g);

        let eps = 1e-3f32;
        for j in 0..5 {
            let mut wp = w0.clone();
            wp[j] += eps;
            let mut wm = w0.clone();
            wm[j] -= eps;
            let fp = obj.value(&HashedVector::new(wp));
            let fm = obj.value(&HashedVector::new(wm));
            let fd = (fp - fm) / (2.0 * eps);
            assert!((fd - g[j]).abs() < 5e-2, "coord {j}: fd={fd} analytic={}", g[j]);
        }
    }

    #[test]
    fn line_projection_matches_direct_value() {
        let mut obj = toy_objective();
        let w = HashedVector::new(vec![1.0, 2.0, 0.0, -1.0, 2.0]);
        let d = vec![0.1, -0.2, 0.05, 0.0, 0.3];
        obj.project_to_line(&w, &d);
        for &t in &[0.0f32, 0.25, 0.5, 1.0] {
            let via_line = obj.lookup_on_line(t);
            let moved: Vec<Real> = w.as_slice().iter().zip(&d).map(|(a, b)| a + t * b).collect();
            let direct = obj.value(&HashedVector::new(moved));
            assert!((via_line - direct).abs() <= 1e-4 * direct.abs().max(1.0));
        }
    }

    #[test]
    fn line_projection_matches_with_non_squared_regularizer() {
        let data = vec![
            0.0, 0.0, 0.0, 1.0, 0.0, //
            2.0, 0.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 1.0, 0.0, 0.0,
        ];
        let dm = DenseMatrix::from_row_major(data, 3, 5).unwrap();
        let features = Arc::new(FeatureMatrix::Dense(dm));
        let reg = Regularizer::huber(1.0, 0.1, false).unwrap();
        let mut obj = LinearClassifierLoss::new(features, MarginFunction::SquaredHinge, reg);
        obj.retarget(vec![-1.0, 1.0, -1.0], vec![1.0, 1.0, 1.0]).unwrap();

        let w = HashedVector::new(vec![1.0, 2.0, 0.0, -1.0, 2.0]);
        let d = vec![0.1, -0.2, 0.05, 0.0, 0.3];
        obj.project_to_line(&w, &d);
        for &t in &[0.0f32, 0.25, 0.5, 1.0] {
            let via_line = obj.lookup_on_line(t);
            let moved: Vec<Real> = w.as_slice().iter().zip(&d).map(|(a, b)| a + t * b).collect();
            let direct = obj.value(&HashedVector::new(moved));
            assert!((via_line - direct).abs() <= 1e-4 * direct.abs().max(1.0));
        }
    }
}
