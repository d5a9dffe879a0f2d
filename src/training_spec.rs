//! The per-label pipeline factory: everything a worker thread needs to train
//! one label, assembled once per thread and reused across the labels that
//! thread is handed.
//!
//! [`TrainingSpec::Objective`] is an associated type rather than a trait
//! object: `update_objective` needs the concrete objective's `retarget`,
//! which isn't part of the [`Objective`] contract itself (not every
//! objective has a notion of "label" to retarget onto). The initializer and
//! post-processor don't have that problem, so concrete specs build them from
//! a runtime-selectable `InitFactory`/`PostFactory` instead of baking one
//! choice into the type.

use std::sync::Arc;

use crate::dataset::Dataset;
use crate::error::InvalidArgument;
use crate::feature::FeatureMatrix;
use crate::init::WeightInitializer;
use crate::model::{Model, PartialModelSpec};
use crate::objective::linear::LinearClassifierLoss;
use crate::objective::margin::MarginFunction;
use crate::objective::regularizer::Regularizer;
use crate::objective::Objective;
use crate::postproc::PostProcessor;
use crate::solver::NewtonOptions;
use crate::stats::{Statistics, StatisticMetaData};
use crate::types::{LabelId, Real};
use crate::weighting::LabelWeighting;

/// Everything a worker thread needs, assembled once and reused across labels.
pub trait TrainingSpec {
    /// Concrete objective type this spec trains.
    type Objective: Objective + Send;
    /// Concrete initializer type.
    type Initializer: WeightInitializer + Send;
    /// Concrete post-processor type.
    type PostProcessor: PostProcessor + Send;

    /// Build a fresh objective, called once per worker thread.
    fn make_objective(&self) -> Self::Objective;
    /// Build the Newton solver's hyperparameters, called once per worker thread.
    fn make_minimizer(&self) -> NewtonOptions;
    /// Build a fresh initializer, called once per worker thread.
    fn make_initializer(&self) -> Self::Initializer;
    /// Build a post-processor, possibly inspecting the thread's objective.
    fn make_post_processor(&self, objective: &Self::Objective) -> Self::PostProcessor;
    /// Build the (empty) output model, called once by the driver.
    fn make_model(&self, num_features: usize, spec: PartialModelSpec) -> Model;
    /// Retarget `objective` at `label`: new label column, new cost vector,
    /// caches invalidated.
    fn update_objective(&self, objective: &mut Self::Objective, label: LabelId) -> Result<(), InvalidArgument>;
    /// Scale `opts.epsilon` by the minority-class fraction for `label`, so
    /// rare labels get a tighter relative stopping tolerance than common ones.
    fn update_minimizer(&self, opts: &mut NewtonOptions, label: LabelId);
    /// A fresh per-thread statistics collector, pre-declared with this spec's counters.
    fn get_statistics_gatherer(&self) -> Statistics;
    /// The `{-1, +1}` label column for `label`, handed to the initializer
    /// (which may also hold its own reference to the full feature matrix).
    fn label_column(&self, label: LabelId) -> Vec<Real>;
}

fn minority_fraction(num_positives: usize, num_examples: usize) -> Real {
    if num_examples == 0 {
        return 1.0;
    }
    let minority = num_positives.min(num_examples - num_positives).max(1);
    minority as Real / num_examples as Real
}

fn declare_statistics(stats: &mut Statistics) {
    stats.declare(StatisticMetaData { name: "labels_trained", unit: "#labels" });
    stats.declare(StatisticMetaData { name: "newton_iterations", unit: "#iterations" });
    stats.declare(StatisticMetaData { name: "solve_time_us", unit: "us" });
    stats.declare(StatisticMetaData { name: "labels_failed", unit: "#labels" });
}

/// Builds a fresh [`WeightInitializer`] for one worker thread.
pub type InitFactory = Arc<dyn Fn() -> Box<dyn WeightInitializer + Send> + Send + Sync>;
/// Builds a fresh [`PostProcessor`] for one worker thread.
pub type PostFactory = Arc<dyn Fn() -> Box<dyn PostProcessor + Send> + Send + Sync>;

fn zero_init_factory() -> InitFactory {
    Arc::new(|| Box::new(crate::init::Zero))
}

fn identity_post_factory() -> PostFactory {
    Arc::new(|| Box::new(crate::postproc::Identity))
}

/// The single-matrix DiSMEC-style spec: one loss/regularizer/weighting/init
/// pipeline shared by every label, differing only in label column and cost.
pub struct DismecTrainingSpec {
    dataset: Arc<Dataset>,
    margin: MarginFunction,
    regularizer: Regularizer,
    weighting: Arc<dyn LabelWeighting + Send + Sync>,
    newton: NewtonOptions,
    sparse_output: bool,
    init_factory: InitFactory,
    post_factory: PostFactory,
}

impl DismecTrainingSpec {
    /// Construct with the default (zero-init, no post-processing) pipeline.
    pub fn new(
        dataset: Arc<Dataset>,
        margin: MarginFunction,
        regularizer: Regularizer,
        weighting: Arc<dyn LabelWeighting + Send + Sync>,
        newton: NewtonOptions,
        sparse_output: bool,
    ) -> Self {
        Self::with_pipeline(dataset, margin, regularizer, weighting, newton, sparse_output, zero_init_factory(), identity_post_factory())
    }

    /// Construct with an explicit initializer/post-processor factory pair,
    /// e.g. the MSI initializer or weight culling selected by the CLI.
    pub fn with_pipeline(
        dataset: Arc<Dataset>,
        margin: MarginFunction,
        regularizer: Regularizer,
        weighting: Arc<dyn LabelWeighting + Send + Sync>,
        newton: NewtonOptions,
        sparse_output: bool,
        init_factory: InitFactory,
        post_factory: PostFactory,
    ) -> Self {
        Self { dataset, margin, regularizer, weighting, newton, sparse_output, init_factory, post_factory }
    }

    fn cost_vector(&self, label: LabelId, label_column: &[Real]) -> Result<Vec<Real>, InvalidArgument> {
        let pos = self.weighting.positive_weight(label)? as Real;
        let neg = self.weighting.negative_weight(label)? as Real;
        Ok(label_column.iter().map(|&y| if y > 0.0 { pos } else { neg }).collect())
    }
}

impl TrainingSpec for DismecTrainingSpec {
    type Objective = LinearClassifierLoss;
    type Initializer = Box<dyn WeightInitializer + Send>;
    type PostProcessor = Box<dyn PostProcessor + Send>;

    fn make_objective(&self) -> Self::Objective {
        LinearClassifierLoss::new(self.dataset.features(), self.margin.clone(), self.regularizer.clone())
    }

    fn make_minimizer(&self) -> NewtonOptions {
        self.newton.clone()
    }

    fn make_initializer(&self) -> Self::Initializer {
        (self.init_factory)()
    }

    fn make_post_processor(&self, _objective: &Self::Objective) -> Self::PostProcessor {
        (self.post_factory)()
    }

    fn make_model(&self, num_features: usize, spec: PartialModelSpec) -> Model {
        if self.sparse_output {
            Model::new_sparse(spec, num_features)
        } else {
            Model::new_dense(spec, num_features)
        }
    }

    fn update_objective(&self, objective: &mut Self::Objective, label: LabelId) -> Result<(), InvalidArgument> {
        let column = self.dataset.label_column(label);
        let costs = self.cost_vector(label, &column)?;
        objective.retarget(column, costs)
    }

    fn update_minimizer(&self, opts: &mut NewtonOptions, label: LabelId) {
        let n = self.dataset.num_examples();
        let pos = self.dataset.num_positives(label);
        opts.epsilon = self.newton.epsilon * minority_fraction(pos, n);
    }

    fn get_statistics_gatherer(&self) -> Statistics {
        let mut stats = Statistics::new();
        declare_statistics(&mut stats);
        stats
    }

    fn label_column(&self, label: LabelId) -> Vec<Real> {
        self.dataset.label_column(label)
    }
}

/// Sum of two block-separable [`LinearClassifierLoss`]es over disjoint
/// coordinate ranges: `f(w) = f_dense(w[..split]) + f_sparse(w[split..])`.
/// The two halves never interact, so every `Objective` method just splits the
/// incoming vector/direction and delegates.
pub struct CascadeObjective {
    dense: LinearClassifierLoss,
    sparse: LinearClassifierLoss,
    split: usize,
}

impl CascadeObjective {
    /// Construct from the dense-feature and sparse-feature sub-losses and the
    /// coordinate index where the dense block ends.
    pub fn new(dense: LinearClassifierLoss, sparse: LinearClassifierLoss, split: usize) -> Self {
        Self { dense, sparse, split }
    }

    /// Retarget both halves at a new label.
    pub fn retarget(&mut self, labels: Vec<Real>, costs: Vec<Real>) -> Result<(), InvalidArgument> {
        self.dense.retarget(labels.clone(), costs.clone())?;
        self.sparse.retarget(labels, costs)
    }
}

impl Objective for CascadeObjective {
    fn num_variables(&self) -> Option<usize> {
        match (self.dense.num_variables(), self.sparse.num_variables()) {
            (Some(a), Some(b)) => Some(a + b),
            _ => None,
        }
    }

    fn value(&mut self, w: &crate::hashvec::HashedVector) -> Real {
        let (lo, hi) = (crate::hashvec::HashedVector::new(w.as_slice()[..self.split].to_vec()), crate::hashvec::HashedVector::new(w.as_slice()[self.split..].to_vec()));
        self.dense.value(&lo) + self.sparse.value(&hi)
    }

    fn gradient(&mut self, w: &crate::hashvec::HashedVector, out: &mut [Real]) {
        let lo = crate::hashvec::HashedVector::new(w.as_slice()[..self.split].to_vec());
        let hi = crate::hashvec::HashedVector::new(w.as_slice()[self.split..].to_vec());
        let (left, right) = out.split_at_mut(self.split);
        self.dense.gradient(&lo, left);
        self.sparse.gradient(&hi, right);
    }

    fn gradient_at_zero(&mut self, out: &mut [Real]) {
        let (left, right) = out.split_at_mut(self.split);
        self.dense.gradient_at_zero(left);
        self.sparse.gradient_at_zero(right);
    }

    fn hessian_times_direction(&mut self, w: &crate::hashvec::HashedVector, d: &[Real], out: &mut [Real]) {
        let lo = crate::hashvec::HashedVector::new(w.as_slice()[..self.split].to_vec());
        let hi = crate::hashvec::HashedVector::new(w.as_slice()[self.split..].to_vec());
        let (dl, dh) = d.split_at(self.split);
        let (ol, oh) = out.split_at_mut(self.split);
        self.dense.hessian_times_direction(&lo, dl, ol);
        self.sparse.hessian_times_direction(&hi, dh, oh);
    }

    fn diag_preconditioner(&mut self, w: &crate::hashvec::HashedVector, out: &mut [Real]) {
        let lo = crate::hashvec::HashedVector::new(w.as_slice()[..self.split].to_vec());
        let hi = crate::hashvec::HashedVector::new(w.as_slice()[self.split..].to_vec());
        let (left, right) = out.split_at_mut(self.split);
        self.dense.diag_preconditioner(&lo, left);
        self.sparse.diag_preconditioner(&hi, right);
    }

    fn project_to_line(&mut self, w: &crate::hashvec::HashedVector, d: &[Real]) {
        let lo = crate::hashvec::HashedVector::new(w.as_slice()[..self.split].to_vec());
        let hi = crate::hashvec::HashedVector::new(w.as_slice()[self.split..].to_vec());
        let (dl, dh) = d.split_at(self.split);
        self.dense.project_to_line(&lo, dl);
        self.sparse.project_to_line(&hi, dh);
    }

    fn lookup_on_line(&mut self, t: Real) -> Real {
        self.dense.lookup_on_line(t) + self.sparse.lookup_on_line(t)
    }
}

/// The Cascade spec: dense and sparse feature halves, each with its own
/// regularizer, summed into a block-separable [`CascadeObjective`].
pub struct CascadeTrainingSpec {
    dataset: Arc<Dataset>,
    dense_features: Arc<FeatureMatrix>,
    sparse_features: Arc<FeatureMatrix>,
    margin: MarginFunction,
    dense_regularizer: Regularizer,
    sparse_regularizer: Regularizer,
    weighting: Arc<dyn LabelWeighting + Send + Sync>,
    newton: NewtonOptions,
    init_factory: InitFactory,
    post_factory: PostFactory,
}

impl CascadeTrainingSpec {
    /// Construct from separately-loaded dense and sparse feature halves that
    /// share the same row order and label set as `dataset`, with the default
    /// (zero-init, no post-processing) pipeline.
    pub fn new(
        dataset: Arc<Dataset>,
        dense_features: Arc<FeatureMatrix>,
        sparse_features: Arc<FeatureMatrix>,
        margin: MarginFunction,
        dense_regularizer: Regularizer,
        sparse_regularizer: Regularizer,
        weighting: Arc<dyn LabelWeighting + Send + Sync>,
        newton: NewtonOptions,
    ) -> Self {
        Self {
            dataset,
            dense_features,
            sparse_features,
            margin,
            dense_regularizer,
            sparse_regularizer,
            weighting,
            newton,
            init_factory: zero_init_factory(),
            post_factory: identity_post_factory(),
        }
    }

    fn cost_vector(&self, label: LabelId, label_column: &[Real]) -> Result<Vec<Real>, InvalidArgument> {
        let pos = self.weighting.positive_weight(label)? as Real;
        let neg = self.weighting.negative_weight(label)? as Real;
        Ok(label_column.iter().map(|&y| if y > 0.0 { pos } else { neg }).collect())
    }
}

impl TrainingSpec for CascadeTrainingSpec {
    type Objective = CascadeObjective;
    type Initializer = Box<dyn WeightInitializer + Send>;
    type PostProcessor = Box<dyn PostProcessor + Send>;

    fn make_objective(&self) -> Self::Objective {
        let dense = LinearClassifierLoss::new(self.dense_features.clone(), self.margin.clone(), self.dense_regularizer.clone());
        let sparse = LinearClassifierLoss::new(self.sparse_features.clone(), self.margin.clone(), self.sparse_regularizer.clone());
        CascadeObjective::new(dense, sparse, self.dense_features.cols())
    }

    fn make_minimizer(&self) -> NewtonOptions {
        self.newton.clone()
    }

    fn make_initializer(&self) -> Self::Initializer {
        (self.init_factory)()
    }

    fn make_post_processor(&self, _objective: &Self::Objective) -> Self::PostProcessor {
        (self.post_factory)()
    }

    fn make_model(&self, num_features: usize, spec: PartialModelSpec) -> Model {
        Model::new_dense(spec, num_features)
    }

    fn update_objective(&self, objective: &mut Self::Objective, label: LabelId) -> Result<(), InvalidArgument> {
        let column = self.dataset.label_column(label);
        let costs = self.cost_vector(label, &column)?;
        objective.retarget(column, costs)
    }

    fn update_minimizer(&self, opts: &mut NewtonOptions, label: LabelId) {
        let n = self.dataset.num_examples();
        let pos = self.dataset.num_positives(label);
        opts.epsilon = self.newton.epsilon * minority_fraction(pos, n);
    }

    fn get_statistics_gatherer(&self) -> Statistics {
        let mut stats = Statistics::new();
        declare_statistics(&mut stats);
        stats
    }

    fn label_column(&self, label: LabelId) -> Vec<Real> {
        self.dataset.label_column(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::DenseMatrix;
    use crate::weighting::ConstantWeighting;

    fn toy_dataset() -> Arc<Dataset> {
        let data = vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.5, 0.5];
        let fm = FeatureMatrix::Dense(DenseMatrix::from_row_major(data, 4, 2).unwrap());
        Arc::new(Dataset::new(fm, 2, vec![vec![0], vec![1], vec![0, 1], vec![]]).unwrap())
    }

    #[test]
    fn dismec_spec_update_objective_retargets_by_label() {
        let dataset = toy_dataset();
        let reg = Regularizer::squared(1.0, false).unwrap();
        let weighting: Arc<dyn LabelWeighting + Send + Sync> = Arc::new(ConstantWeighting::new(1.0, 1.0).unwrap());
        let spec = DismecTrainingSpec::new(dataset, MarginFunction::SquaredHinge, reg, weighting, NewtonOptions::default(), false);

        let mut objective = spec.make_objective();
        spec.update_objective(&mut objective, LabelId::new(0)).unwrap();
        let w = crate::hashvec::HashedVector::new(vec![0.0, 0.0]);
        let v0 = objective.value(&w);
        assert!(v0.is_finite());
    }

    #[test]
    fn update_minimizer_shrinks_epsilon_for_rare_labels() {
        let dataset = toy_dataset();
        let reg = Regularizer::squared(1.0, false).unwrap();
        let weighting: Arc<dyn LabelWeighting + Send + Sync> = Arc::new(ConstantWeighting::new(1.0, 1.0).unwrap());
        let mut opts = NewtonOptions::default();
        let base_epsilon = opts.epsilon;
        let spec = DismecTrainingSpec::new(dataset, MarginFunction::SquaredHinge, reg, weighting, opts.clone(), false);
        spec.update_minimizer(&mut opts, LabelId::new(0));
        assert!(opts.epsilon <= base_epsilon);
    }

    #[test]
    fn cascade_objective_sums_block_values() {
        let data = vec![1.0, 0.0, 1.0, 1.0];
        let dense = Arc::new(FeatureMatrix::Dense(DenseMatrix::from_row_major(data.clone(), 2, 2).unwrap()));
        let sparse = Arc::new(FeatureMatrix::Dense(DenseMatrix::from_row_major(data, 2, 2).unwrap()));
        let reg = Regularizer::squared(0.5, false).unwrap();
        let d_loss = LinearClassifierLoss::new(dense, MarginFunction::SquaredHinge, reg.clone());
        let s_loss = LinearClassifierLoss::new(sparse, MarginFunction::SquaredHinge, reg);
        let mut combined = CascadeObjective::new(d_loss, s_loss, 2);
        combined.retarget(vec![1.0, -1.0], vec![1.0, 1.0]).unwrap();

        let w = crate::hashvec::HashedVector::new(vec![0.5, -0.5, 0.2, 0.1]);
        let v = combined.value(&w);
        assert!(v.is_finite() && v >= 0.0);
    }
}
