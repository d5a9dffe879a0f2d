//! The OVA driver: batched training with overlapped asynchronous checkpointing.
//!
//! One [`TrainingTaskGenerator`] per batch feeds the [`crate::scheduler::TaskScheduler`];
//! the driver loop itself only ever holds one pending [`SaveFuture`] at a time,
//! joining it before issuing the next batch's save, per `SPEC_FULL.md` §4.14.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::error::{ConsistencyError, DismecError};
use crate::hashvec::HashedVector;
use crate::init::WeightInitializer;
use crate::io::saver::{PartialModelSaver, SaveFuture, SaveOptions};
use crate::model::{Model, PartialModelSpec};
use crate::objective::Objective;
use crate::postproc::PostProcessor;
use crate::scheduler::{SchedulerOptions, TaskGenerator, TaskScheduler};
use crate::solver::newton;
use crate::stats::{Statistics, StatisticsCollection};
use crate::training_spec::TrainingSpec;
use crate::types::LabelId;

struct ThreadState<S: TrainingSpec> {
    objective: S::Objective,
    initializer: S::Initializer,
    post_processor: Option<S::PostProcessor>,
    stats: Statistics,
}

/// A [`TaskGenerator`] that trains labels `[first_label, first_label + num_tasks)`
/// of `spec` into a freshly allocated [`Model`], one label per task.
struct TrainingTaskGenerator<'a, S: TrainingSpec> {
    spec: &'a S,
    first_label: u32,
    num_features: usize,
    threads: Vec<Mutex<Option<ThreadState<S>>>>,
    model: Mutex<Model>,
}

impl<'a, S: TrainingSpec> TrainingTaskGenerator<'a, S> {
    fn new(spec: &'a S, model_spec: PartialModelSpec, num_features: usize) -> Self {
        let model = spec.make_model(num_features, model_spec);
        Self {
            spec,
            first_label: model_spec.first_label,
            num_features,
            threads: Vec::new(),
            model: Mutex::new(model),
        }
    }

    fn into_model(self) -> Model {
        self.model.into_inner().expect("mutex never poisoned")
    }

    fn collect_stats(&self) -> StatisticsCollection {
        let mut collection = StatisticsCollection::new();
        for slot in &self.threads {
            if let Some(state) = slot.lock().expect("mutex never poisoned").take() {
                collection.push(state.stats);
            }
        }
        collection
    }
}

impl<'a, S: TrainingSpec + Sync> TaskGenerator for TrainingTaskGenerator<'a, S> {
    fn num_tasks(&self) -> usize {
        self.model.lock().expect("mutex never poisoned").spec().label_count as usize
    }

    fn prepare(&self, _num_threads: usize, _chunk_size: usize) {
        // `threads` is sized in `init_thread` on first touch; nothing to precompute.
    }

    fn init_thread(&self, thread_id: usize) {
        let objective = self.spec.make_objective();
        let initializer = self.spec.make_initializer();
        let post_processor = self.spec.make_post_processor(&objective);
        let stats = self.spec.get_statistics_gatherer();
        let state = ThreadState { objective, initializer, post_processor: Some(post_processor), stats };
        *self.threads[thread_id].lock().expect("mutex never poisoned") = Some(state);
    }

    fn run_tasks(&self, begin: usize, end: usize, thread_id: usize) {
        let mut guard = self.threads[thread_id].lock().expect("mutex never poisoned");
        let state = guard.as_mut().expect("init_thread runs before run_tasks");

        for offset in begin..end {
            let label = LabelId::new(self.first_label + offset as u32);

            if let Err(err) = self.spec.update_objective(&mut state.objective, label) {
                tracing::warn!(%label, error = %err, "failed to retarget objective, skipping label");
                state.stats.record("labels_failed", 1);
                continue;
            }

            let mut minimizer = self.spec.make_minimizer();
            self.spec.update_minimizer(&mut minimizer, label);

            let label_column = self.spec.label_column(label);
            let mut w0 = vec![0.0; self.num_features];
            if let Err(err) = state.initializer.initialize(label, &label_column, &mut w0) {
                tracing::warn!(%label, error = %err, "failed to initialize weights, skipping label");
                state.stats.record("labels_failed", 1);
                continue;
            }
            let mut w = HashedVector::new(w0);

            let start = Instant::now();
            let result = newton::minimize(&mut state.objective, &mut w, &minimizer);
            let elapsed_us = start.elapsed().as_micros() as i64;

            let minimization = match result {
                Ok(r) => r,
                Err(err) => {
                    tracing::warn!(%label, error = %err, "invalid newton configuration, skipping label");
                    state.stats.record("labels_failed", 1);
                    continue;
                }
            };

            if let Some(failure) = newton::status_to_numeric_failure(minimization.status, minimization.iterations) {
                tracing::warn!(%label, ?failure, iterations = minimization.iterations, "label did not converge");
                state.stats.record("labels_failed", 1);
            }

            state.stats.record("labels_trained", 1);
            state.stats.record("newton_iterations", minimization.iterations as i64);
            state.stats.record("solve_time_us", elapsed_us);

            let mut weights = w.into_vec();
            state.post_processor.as_mut().expect("just set").process(label, &mut weights, &mut state.objective);

            let mut model = self.model.lock().expect("mutex never poisoned");
            if let Err(err) = model.set_weights_for_label(label, &weights) {
                tracing::warn!(%label, error = %err, "failed to write trained weights into model");
            }
        }
    }

    fn finalize(&self) {
        // Per-thread statistics are pulled out by `collect_stats` after the
        // scheduler run returns; nothing to do on the shared generator itself.
    }
}

/// Hyperparameters for [`train`] that govern batching, threading, and the
/// output checkpoint format.
#[derive(Clone, Debug)]
pub struct DriverOptions {
    /// Labels trained per scheduler batch.
    pub batch_size: u32,
    /// Worker thread count; `None` auto-detects.
    pub threads: Option<usize>,
    /// Absolute wall-clock deadline for the whole run, if any.
    pub deadline: Option<Instant>,
    /// Output checkpoint format/precision.
    pub save_options: SaveOptions,
    /// Resume from an existing checkpoint at `output_path` if one exists.
    pub continue_training: bool,
}

/// Outcome of [`train`]: how many labels were actually trained before the
/// deadline (if any) cut the run short.
#[derive(Clone, Copy, Debug)]
pub struct TrainReport {
    /// First label actually trained.
    pub trained_begin: u32,
    /// One past the last label actually trained.
    pub trained_end: u32,
    /// Whether the full requested range `[label_begin, label_end)` completed.
    pub finished: bool,
}

/// Train labels `[label_begin, label_end)` of a `total_labels`-label model,
/// checkpointing to `output_path`, per the pseudocode in `SPEC_FULL.md` §4.14.
pub fn train<S>(
    spec: &S,
    output_path: &std::path::Path,
    num_features: usize,
    label_begin: u32,
    label_end: u32,
    total_labels: u32,
    opts: DriverOptions,
) -> Result<TrainReport, DismecError>
where
    S: TrainingSpec + Sync,
{
    let now = chrono::Utc::now().to_rfc3339();
    let mut saver = PartialModelSaver::new(output_path, total_labels, opts.continue_training, opts.save_options.clone(), now)?;

    let mut cur = label_begin;
    if opts.continue_training {
        let (missing_begin, _missing_end) = saver.get_missing_weights();
        cur = cur.max(missing_begin);
    }

    let num_threads = opts.threads.unwrap_or_else(num_cpus::get);
    let scheduler = TaskScheduler::new(SchedulerOptions { num_threads: Some(num_threads), chunk_size: 0, deadline: opts.deadline });

    let mut prev_save: Option<SaveFuture> = None;
    let mut finished_fully = true;
    let trained_begin = cur;
    let mut trained_end = cur;

    while cur < label_end {
        if let Some(deadline) = opts.deadline {
            if Instant::now() >= deadline {
                finished_fully = false;
                break;
            }
        }

        let batch = opts.batch_size.max(1);
        let mut nxt = (cur + batch).min(label_end);
        if nxt + batch / 2 > label_end {
            nxt = label_end;
        }

        let span = tracing::info_span!("batch", first = cur, count = nxt - cur);
        let _enter = span.enter();

        let model_spec = PartialModelSpec::new(cur, nxt - cur, total_labels)?;
        let mut generator = TrainingTaskGenerator::new(spec, model_spec, num_features);
        generator.threads = (0..num_threads).map(|_| Mutex::new(None)).collect();

        let result = scheduler.run(&generator)?;
        let stats = generator.collect_stats().finalize();
        tracing::debug!(?stats, "batch statistics");

        let model = generator.into_model();

        if let Some(future) = prev_save.take() {
            future.join()?;
            saver.update_meta_file()?;
        }
        prev_save = Some(saver.add_model(model, None)?);

        trained_end = cur + (result.next_task as u32);
        if !result.finished {
            finished_fully = false;
            break;
        }
        cur = nxt;
    }

    if let Some(future) = prev_save.take() {
        future.join()?;
    }
    if finished_fully && cur >= label_end {
        match saver.finalize() {
            Ok(()) => {}
            Err(ConsistencyError::IncompleteCoverage { .. }) => saver.update_meta_file()?,
            Err(other) => return Err(other.into()),
        }
    } else {
        saver.update_meta_file()?;
    }

    Ok(TrainReport { trained_begin, trained_end, finished: finished_fully })
}

/// Explicit, non-resuming form: aborts with a [`ConsistencyError`] if any part
/// of `[label_begin, label_end)` is already present in `output_path`'s
/// checkpoint, per the Open-Question resolution in `SPEC_FULL.md` §9.
pub fn train_exact_range<S>(
    spec: &S,
    output_path: &std::path::Path,
    num_features: usize,
    label_begin: u32,
    label_end: u32,
    total_labels: u32,
    mut opts: DriverOptions,
) -> Result<TrainReport, DismecError>
where
    S: TrainingSpec + Sync,
{
    opts.continue_training = false;
    train(spec, output_path, num_features, label_begin, label_end, total_labels, opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{DenseMatrix, FeatureMatrix};
    use crate::io::metadata::WeightFormat;
    use crate::objective::margin::MarginFunction;
    use crate::objective::regularizer::Regularizer;
    use crate::training_spec::DismecTrainingSpec;
    use crate::weighting::ConstantWeighting;
    use crate::dataset::Dataset;

    fn scratch_path(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("dismec-driver-test-{}-{}", std::process::id(), name));
        p
    }

    fn toy_dataset() -> Arc<Dataset> {
        let data = vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.5, 0.5];
        let fm = FeatureMatrix::Dense(DenseMatrix::from_row_major(data, 4, 2).unwrap());
        Arc::new(Dataset::new(fm, 3, vec![vec![0], vec![1], vec![0, 1], vec![2]]).unwrap())
    }

    #[test]
    fn trains_every_label_and_finalizes() {
        let dataset = toy_dataset();
        let reg = Regularizer::squared(1.0, false).unwrap();
        let weighting: Arc<dyn crate::weighting::LabelWeighting + Send + Sync> = Arc::new(ConstantWeighting::new(1.0, 1.0).unwrap());
        let spec = DismecTrainingSpec::new(dataset, MarginFunction::SquaredHinge, reg, weighting, crate::solver::NewtonOptions::default(), false);

        let path = scratch_path("meta.json");
        let _ = std::fs::remove_file(&path);

        let opts = DriverOptions {
            batch_size: 2,
            threads: Some(2),
            deadline: None,
            save_options: SaveOptions { precision: 6, format: WeightFormat::DenseText },
            continue_training: false,
        };

        let report = train(&spec, &path, 2, 0, 3, 3, opts).unwrap();
        assert!(report.finished);
        assert_eq!(report.trained_begin, 0);
        assert_eq!(report.trained_end, 3);

        let loader = crate::io::loader::PartialModelLoader::new(&path, crate::io::loader::SparseMode::MatchFile).unwrap();
        loader.validate(true).unwrap();

        let _ = std::fs::remove_file(&path);
        for entry in std::fs::read_dir(std::env::temp_dir()).unwrap().flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&format!("dismec-driver-test-{}-meta.json.weights", std::process::id())) {
                let _ = std::fs::remove_file(entry.path());
            }
        }
    }
}
