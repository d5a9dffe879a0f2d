//! Hyperparameter plumbing and the `Config` that assembles a training run.
//!
//! Each solver-ish component's tunables are exposed as name/value pairs, with
//! nested components prefixing their names (`cg.epsilon`, `search.alpha`),
//! so the same `HyperParameters` bag can seed an entire `NewtonOptions` tree
//! without a per-component CLI parser.

use std::collections::HashMap;

use crate::error::InvalidArgument;
use crate::solver::cg::CgOptions;
use crate::solver::line_search::LineSearchOptions;
use crate::solver::newton::NewtonOptions;

/// A single hyperparameter value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HyperValue {
    /// An integer-valued parameter (e.g. `max_steps`).
    Int(i64),
    /// A real-valued parameter (e.g. `epsilon`).
    Real(f64),
}

impl HyperValue {
    /// Read as `f64`, regardless of the stored variant.
    pub fn as_real(self) -> f64 {
        match self {
            HyperValue::Int(i) => i as f64,
            HyperValue::Real(r) => r,
        }
    }

    /// Read as `i64`, truncating a `Real` if necessary.
    pub fn as_int(self) -> i64 {
        match self {
            HyperValue::Int(i) => i,
            HyperValue::Real(r) => r as i64,
        }
    }
}

/// A string-keyed bag of hyperparameters, applied once at construction time.
#[derive(Clone, Debug, Default)]
pub struct HyperParameters {
    values: HashMap<String, HyperValue>,
}

impl HyperParameters {
    /// An empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, overwriting any prior value.
    pub fn set(&mut self, name: impl Into<String>, value: HyperValue) {
        self.values.insert(name.into(), value);
    }

    /// Get `name` as `f64`, failing if the key is missing.
    pub fn get_real(&self, name: &str) -> Result<f64, InvalidArgument> {
        self.values.get(name).map(|v| v.as_real()).ok_or_else(|| InvalidArgument::UnknownHyperParameter(name.to_string()))
    }

    /// Get `name` as `usize`, failing if the key is missing.
    pub fn get_usize(&self, name: &str) -> Result<usize, InvalidArgument> {
        self.values.get(name).map(|v| v.as_int() as usize).ok_or_else(|| InvalidArgument::UnknownHyperParameter(name.to_string()))
    }

    /// Get `name` as `f64`, falling back to `default` if absent.
    pub fn get_real_or(&self, name: &str, default: f64) -> f64 {
        self.values.get(name).map(|v| v.as_real()).unwrap_or(default)
    }

    /// Get `name` as `usize`, falling back to `default` if absent.
    pub fn get_usize_or(&self, name: &str, default: usize) -> usize {
        self.values.get(name).map(|v| v.as_int() as usize).unwrap_or(default)
    }
}

/// Apply the `cg.*`-prefixed keys in `params` onto `opts`.
pub fn apply_cg(opts: &mut CgOptions, params: &HyperParameters) {
    opts.epsilon = params.get_real_or("cg.epsilon", opts.epsilon as f64) as crate::types::Real;
    opts.max_iter = params.get_usize_or("cg.max_iter", opts.max_iter);
}

/// Apply the `search.*`-prefixed keys in `params` onto `opts`.
pub fn apply_line_search(opts: &mut LineSearchOptions, params: &HyperParameters) {
    opts.alpha0 = params.get_real_or("search.alpha0", opts.alpha0 as f64) as crate::types::Real;
    opts.rho = params.get_real_or("search.rho", opts.rho as f64) as crate::types::Real;
    opts.eta = params.get_real_or("search.eta", opts.eta as f64) as crate::types::Real;
    opts.max_steps = params.get_usize_or("search.max_steps", opts.max_steps);
}

/// Apply the `newton.*`/`cg.*`/`search.*`-prefixed keys in `params` onto `opts`.
pub fn apply_newton(opts: &mut NewtonOptions, params: &HyperParameters) {
    opts.epsilon = params.get_real_or("epsilon", opts.epsilon as f64) as crate::types::Real;
    opts.max_steps = params.get_usize_or("max_steps", opts.max_steps);
    opts.alpha_pcg = params.get_real_or("alpha_pcg", opts.alpha_pcg as f64) as crate::types::Real;
    apply_cg(&mut opts.cg, params);
    apply_line_search(&mut opts.search, params);
}

/// Supported margin loss selections (mirrors the `--loss` CLI flag).
#[derive(Clone, Copy, Debug)]
pub enum LossKind {
    /// Squared hinge.
    SquaredHinge,
    /// Huber-smoothed hinge.
    HuberHinge,
    /// Logistic.
    Logistic,
}

/// Supported regularizer selections (mirrors the `--regularizer` CLI flag).
#[derive(Clone, Copy, Debug)]
pub enum RegularizerKind {
    /// Pure L2.
    L2,
    /// Pure Huber.
    Huber,
    /// Elastic net, alpha = 0.5.
    Elastic5050,
    /// Elastic net, alpha = 0.9.
    Elastic9010,
}

/// Supported label weighting selections.
#[derive(Clone, Copy, Debug)]
pub enum WeightingKind {
    /// `(2/p - 1, 1)`.
    TwoOverPMinusOne,
    /// `(1, p/(2-p))`.
    POverTwoMinusP,
}

/// Supported initializer selections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitKind {
    /// All-zero.
    Zero,
    /// Bias-only constant.
    Bias,
    /// Feature-mean (MSI).
    Mean,
    /// Alias for `Mean`, matching the `--init-mode msi` CLI spelling.
    Msi,
    /// Multi-positive least squares.
    MultiPos,
    /// OVA-primal warm start.
    OvaPrimal,
}

/// Everything the OVA driver needs for one training run, typically built
/// from CLI flags by the reference binary in `src/bin/dismec_train.rs`.
#[derive(Clone, Debug)]
pub struct Config {
    /// Dataset path (XMC format).
    pub dataset_path: std::path::PathBuf,
    /// Output metadata path.
    pub output_path: std::path::PathBuf,
    /// First label to train (inclusive).
    pub first_label: u32,
    /// Number of labels to train.
    pub num_labels: u32,
    /// Resume from an existing partial model at `output_path`.
    pub continue_training: bool,
    /// Labels trained per scheduler batch.
    pub batch_size: u32,
    /// Worker thread count; `0` means auto-detect.
    pub threads: usize,
    /// Wall-clock deadline for the whole run, if any.
    pub timeout: Option<std::time::Duration>,
    /// Loss function.
    pub loss: LossKind,
    /// Regularizer.
    pub regularizer: RegularizerKind,
    /// Overall regularization strength.
    pub reg_scale: f32,
    /// Whether the bias column (if any) is excluded from regularization.
    pub reg_bias: bool,
    /// Label weighting scheme.
    pub weighting: WeightingKind,
    /// Propensity model parameter `a`.
    pub propensity_a: f64,
    /// Propensity model parameter `b`.
    pub propensity_b: f64,
    /// Weight initialization scheme.
    pub init: InitKind,
    /// Optional feedback-driven sparsification percentage.
    pub sparsify_percent: Option<f32>,
    /// Weight culling threshold for sparse output, if any.
    pub weight_culling: Option<f32>,
    /// Output weight format.
    pub output_format: crate::io::metadata::WeightFormat,
    /// Text output precision.
    pub save_precision: usize,
    /// Solver hyperparameters.
    pub newton: NewtonOptions,
}
