//! Reference training driver binary.
//!
//! Hand-rolled flag parsing, matching this crate's existing `prover`/`verifier`
//! binaries rather than pulling in an argument-parsing framework: argument
//! handling itself is out of scope for the core, this is just the one
//! reference entry point that wires `Config` -> `Dataset` -> `TrainingSpec` ->
//! the OVA driver.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dismec_rs::config::{InitKind, LossKind, RegularizerKind as ConfigRegularizerKind, WeightingKind};
use dismec_rs::dataset::{xmc::read_xmc, Dataset};
use dismec_rs::driver::{train, train_exact_range, DriverOptions};
use dismec_rs::hashvec::HashedVector;
use dismec_rs::init::{Constant, DatasetMeans, FeatureMean, MultiPositive, OvaPrimal, WeightInitializer};
use dismec_rs::io::metadata::WeightFormat;
use dismec_rs::io::saver::SaveOptions;
use dismec_rs::objective::linear::LinearClassifierLoss;
use dismec_rs::objective::margin::MarginFunction;
use dismec_rs::objective::regularizer::Regularizer;
use dismec_rs::postproc::{Combined, Cull, PostProcessor, Sparsify};
use dismec_rs::solver::{newton, NewtonOptions};
use dismec_rs::training_spec::{DismecTrainingSpec, InitFactory, PostFactory};
use dismec_rs::weighting::{ConstantWeighting, LabelWeighting, PropensityModel, PropensityWeighting};

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

fn parse_duration(s: &str) -> Option<Duration> {
    let (num, unit) = s.split_at(s.find(|c: char| c.is_alphabetic()).unwrap_or(s.len()));
    let value: u64 = num.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(value)),
        "s" | "" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value * 60)),
        "h" => Some(Duration::from_secs(value * 3600)),
        _ => None,
    }
}

fn parse_loss(s: &str) -> LossKind {
    match s {
        "hinge" | "squared-hinge" => LossKind::SquaredHinge,
        "huber-hinge" => LossKind::HuberHinge,
        "logistic" => LossKind::Logistic,
        other => {
            eprintln!("unknown --loss {other:?}, defaulting to squared-hinge");
            LossKind::SquaredHinge
        }
    }
}

fn parse_regularizer(s: &str) -> ConfigRegularizerKind {
    match s {
        "l2" => ConfigRegularizerKind::L2,
        "huber" | "l1-relaxed" => ConfigRegularizerKind::Huber,
        "elastic-50-50" => ConfigRegularizerKind::Elastic5050,
        "elastic-90-10" => ConfigRegularizerKind::Elastic9010,
        other => {
            eprintln!("unknown --regularizer {other:?}, defaulting to l2");
            ConfigRegularizerKind::L2
        }
    }
}

fn parse_weighting(s: &str) -> WeightingKind {
    match s {
        "2pm1" => WeightingKind::TwoOverPMinusOne,
        "p2mp" => WeightingKind::POverTwoMinusP,
        other => {
            eprintln!("unknown --weighting-mode {other:?}, defaulting to 2pm1");
            WeightingKind::TwoOverPMinusOne
        }
    }
}

fn parse_init(s: &str) -> InitKind {
    match s {
        "zero" => InitKind::Zero,
        "bias" => InitKind::Bias,
        "mean" => InitKind::Mean,
        "msi" => InitKind::Msi,
        "multi-pos" => InitKind::MultiPos,
        "ova-primal" => InitKind::OvaPrimal,
        other => {
            eprintln!("unknown --init-mode {other:?}, defaulting to zero");
            InitKind::Zero
        }
    }
}

fn build_regularizer(kind: ConfigRegularizerKind, scale: f32, ignore_bias: bool) -> anyhow::Result<Regularizer> {
    let reg = match kind {
        ConfigRegularizerKind::L2 => Regularizer::squared(scale, ignore_bias)?,
        ConfigRegularizerKind::Huber => Regularizer::huber(scale, 0.1, ignore_bias)?,
        ConfigRegularizerKind::Elastic5050 => Regularizer::elastic(scale, 0.1, 0.5, ignore_bias)?,
        ConfigRegularizerKind::Elastic9010 => Regularizer::elastic(scale, 0.1, 0.9, ignore_bias)?,
    };
    Ok(reg)
}

fn build_margin(kind: LossKind) -> anyhow::Result<MarginFunction> {
    let margin = match kind {
        LossKind::SquaredHinge => MarginFunction::SquaredHinge,
        LossKind::HuberHinge => MarginFunction::huber_hinge(0.1)?,
        LossKind::Logistic => MarginFunction::Logistic,
    };
    Ok(margin)
}

fn build_weighting(kind: WeightingKind, dataset: &Dataset, a: f64, b: f64) -> anyhow::Result<Arc<dyn LabelWeighting + Send + Sync>> {
    match kind {
        WeightingKind::TwoOverPMinusOne => {
            let model = PropensityModel::new(dataset.num_examples(), a, b);
            Ok(Arc::new(PropensityWeighting::new(dataset.positive_counts(), model)))
        }
        WeightingKind::POverTwoMinusP => Ok(Arc::new(ConstantWeighting::new(1.0, 1.0)?)),
    }
}

/// Solve the all-labels-negative problem once, for [`InitKind::OvaPrimal`]'s
/// warm start.
fn solve_ova_primal_warm_start(dataset: &Dataset, margin: MarginFunction, regularizer: Regularizer, newton_opts: &NewtonOptions) -> anyhow::Result<Vec<f32>> {
    let features = dataset.features();
    let n = features.rows();
    let d = features.cols();
    let mut objective = LinearClassifierLoss::new(features, margin, regularizer);
    objective.retarget(vec![-1.0; n], vec![1.0; n])?;
    let mut w = HashedVector::new(vec![0.0; d]);
    let result = newton::minimize(&mut objective, &mut w, newton_opts)?;
    tracing::info!(status = ?result.status, iterations = result.iterations, "ova-primal warm start solve");
    Ok(w.as_slice().to_vec())
}

fn build_init_factory(
    init_kind: InitKind,
    dataset: &Dataset,
    max_positives: usize,
    msi_pos: f32,
    msi_neg: f32,
    bias_init_value: f32,
    margin: MarginFunction,
    regularizer: Regularizer,
    newton_opts: &NewtonOptions,
) -> anyhow::Result<InitFactory> {
    let factory: InitFactory = match init_kind {
        InitKind::Zero => Arc::new(|| Box::new(dismec_rs::init::Zero) as Box<dyn WeightInitializer + Send>),
        InitKind::Bias => Arc::new(move || Box::new(Constant::new(bias_init_value)) as Box<dyn WeightInitializer + Send>),
        InitKind::Mean | InitKind::Msi => {
            let features = dataset.features();
            let means = DatasetMeans::compute(&features);
            Arc::new(move || Box::new(FeatureMean::new(features.clone(), means.clone(), msi_pos, msi_neg)) as Box<dyn WeightInitializer + Send>)
        }
        InitKind::MultiPos => {
            let features = dataset.features();
            let means = DatasetMeans::compute(&features);
            Arc::new(move || Box::new(MultiPositive::new(features.clone(), means.clone(), max_positives, msi_pos, msi_neg)) as Box<dyn WeightInitializer + Send>)
        }
        InitKind::OvaPrimal => {
            let warm_start = solve_ova_primal_warm_start(dataset, margin, regularizer, newton_opts)?;
            Arc::new(move || Box::new(OvaPrimal::new(warm_start.clone())) as Box<dyn WeightInitializer + Send>)
        }
    };
    Ok(factory)
}

fn build_post_factory(cull_epsilon: Option<f32>, sparsify_tau: Option<f32>) -> anyhow::Result<PostFactory> {
    let mut stages: Vec<PostFactory> = Vec::new();
    if let Some(eps) = cull_epsilon {
        Cull::new(eps)?;
        stages.push(Arc::new(move || Box::new(Cull::new(eps).expect("validated above")) as Box<dyn PostProcessor + Send>));
    }
    if let Some(tau) = sparsify_tau {
        Sparsify::new(tau)?;
        stages.push(Arc::new(move || Box::new(Sparsify::new(tau).expect("validated above")) as Box<dyn PostProcessor + Send>));
    }

    let factory: PostFactory = match stages.len() {
        0 => Arc::new(|| Box::new(dismec_rs::postproc::Identity) as Box<dyn PostProcessor + Send>),
        1 => stages.remove(0),
        _ => Arc::new(move || {
            let built: Vec<Box<dyn PostProcessor + Send>> = stages.iter().map(|f| f()).collect();
            Box::new(Combined::new(built)) as Box<dyn PostProcessor + Send>
        }),
    };
    Ok(factory)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args: Vec<String> = std::env::args().collect();
    let output_path = PathBuf::from(args.get(1).cloned().unwrap_or_else(|| {
        eprintln!("usage: dismec-train <output-path> --dataset <path> [options]");
        std::process::exit(2);
    }));

    let dataset_path = PathBuf::from(parse_flag(&args, "--dataset").expect("--dataset is required"));
    let first_label: u32 = parse_flag(&args, "--first-label").and_then(|s| s.parse().ok()).unwrap_or(0);
    let continue_training = has_flag(&args, "--continue");
    let batch_size: u32 = parse_flag(&args, "--batch-size").and_then(|s| s.parse().ok()).unwrap_or(256);
    let threads: Option<usize> = parse_flag(&args, "--threads").and_then(|s| s.parse().ok());
    let timeout = parse_flag(&args, "--timeout").and_then(|s| parse_duration(&s));

    let loss = parse_loss(&parse_flag(&args, "--loss").unwrap_or_else(|| "squared-hinge".into()));
    let regularizer_kind = parse_regularizer(&parse_flag(&args, "--regularizer").unwrap_or_else(|| "l2".into()));
    let reg_scale: f32 = parse_flag(&args, "--reg-scale").and_then(|s| s.parse().ok()).unwrap_or(1.0);
    let reg_bias = has_flag(&args, "--reg-bias");

    let weighting_kind = parse_weighting(&parse_flag(&args, "--weighting-mode").unwrap_or_else(|| "2pm1".into()));
    let propensity_a: f64 = parse_flag(&args, "--propensity-a").and_then(|s| s.parse().ok()).unwrap_or(0.55);
    let propensity_b: f64 = parse_flag(&args, "--propensity-b").and_then(|s| s.parse().ok()).unwrap_or(1.5);

    let init_kind = parse_init(&parse_flag(&args, "--init-mode").unwrap_or_else(|| "zero".into()));
    let max_positives: usize = parse_flag(&args, "--max-num-pos").and_then(|s| s.parse().ok()).unwrap_or(100);
    let msi_pos: f32 = parse_flag(&args, "--msi-pos").and_then(|s| s.parse().ok()).unwrap_or(1.0);
    let msi_neg: f32 = parse_flag(&args, "--msi-neg").and_then(|s| s.parse().ok()).unwrap_or(-1.0);
    let bias_init_value: f32 = parse_flag(&args, "--bias-init-value").and_then(|s| s.parse().ok()).unwrap_or(0.0);
    let cull_epsilon: Option<f32> = parse_flag(&args, "--weight-culling").and_then(|s| s.parse().ok());
    let sparsify_tau: Option<f32> = parse_flag(&args, "--sparsify").and_then(|s| s.parse::<f32>().ok()).map(|percent| percent / 100.0);

    let output_format = if has_flag(&args, "--save-sparse-txt") {
        WeightFormat::SparseText
    } else if has_flag(&args, "--save-dense-npy") {
        WeightFormat::DenseBinary
    } else {
        WeightFormat::DenseText
    };
    let sparse_output = output_format == WeightFormat::SparseText;
    let save_precision: usize = parse_flag(&args, "--save-precision").and_then(|s| s.parse().ok()).unwrap_or(6);

    let mut newton = NewtonOptions::default();
    newton.epsilon = parse_flag(&args, "--epsilon").and_then(|s| s.parse().ok()).unwrap_or(newton.epsilon);
    newton.alpha_pcg = parse_flag(&args, "--alpha-pcg").and_then(|s| s.parse().ok()).unwrap_or(newton.alpha_pcg);
    newton.max_steps = parse_flag(&args, "--max-steps").and_then(|s| s.parse().ok()).unwrap_or(newton.max_steps);
    newton.cg.epsilon = parse_flag(&args, "--cg-epsilon").and_then(|s| s.parse().ok()).unwrap_or(newton.cg.epsilon);
    newton.search.alpha0 = parse_flag(&args, "--line-search-alpha0").and_then(|s| s.parse().ok()).unwrap_or(newton.search.alpha0);
    newton.search.rho = parse_flag(&args, "--line-search-rho").and_then(|s| s.parse().ok()).unwrap_or(newton.search.rho);
    newton.search.eta = parse_flag(&args, "--line-search-eta").and_then(|s| s.parse().ok()).unwrap_or(newton.search.eta);
    newton.search.max_steps = parse_flag(&args, "--line-search-max-steps").and_then(|s| s.parse().ok()).unwrap_or(newton.search.max_steps);

    tracing::info!(dataset = %dataset_path.display(), "loading dataset");
    let one_based = has_flag(&args, "--one-based");
    let dataset = Arc::new(read_xmc(&dataset_path, one_based)?);
    let num_labels: u32 = parse_flag(&args, "--num-labels").and_then(|s| s.parse().ok()).unwrap_or(dataset.num_labels() - first_label);
    let num_features = dataset.num_features();
    let total_labels = dataset.num_labels();

    let margin = build_margin(loss)?;
    let regularizer = build_regularizer(regularizer_kind, reg_scale, !reg_bias)?;
    let weighting = build_weighting(weighting_kind, &dataset, propensity_a, propensity_b)?;

    let init_factory = build_init_factory(
        init_kind,
        &dataset,
        max_positives,
        msi_pos,
        msi_neg,
        bias_init_value,
        build_margin(loss)?,
        build_regularizer(regularizer_kind, reg_scale, !reg_bias)?,
        &newton,
    )?;
    let post_factory = build_post_factory(cull_epsilon, sparsify_tau)?;

    let spec = DismecTrainingSpec::with_pipeline(dataset, margin, regularizer, weighting, newton, sparse_output, init_factory, post_factory);

    let opts = DriverOptions {
        batch_size,
        threads,
        deadline: timeout.map(|d| std::time::Instant::now() + d),
        save_options: SaveOptions { precision: save_precision, format: output_format },
        continue_training,
    };

    let report = if continue_training {
        train(&spec, &output_path, num_features, first_label, first_label + num_labels, total_labels, opts)?
    } else {
        train_exact_range(&spec, &output_path, num_features, first_label, first_label + num_labels, total_labels, opts)?
    };

    tracing::info!(trained_begin = report.trained_begin, trained_end = report.trained_end, finished = report.finished, "training run complete");
    if !report.finished {
        eprintln!("deadline reached: trained [{}, {})", report.trained_begin, report.trained_end);
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_flag_finds_value_after_key() {
        let args = vec!["bin".to_string(), "--threads".to_string(), "4".to_string()];
        assert_eq!(parse_flag(&args, "--threads"), Some("4".to_string()));
        assert_eq!(parse_flag(&args, "--missing"), None);
    }

    #[test]
    fn parse_duration_reads_suffixes() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn has_flag_detects_bare_switches() {
        let args = vec!["bin".to_string(), "--continue".to_string()];
        assert!(has_flag(&args, "--continue"));
        assert!(!has_flag(&args, "--save-sparse-txt"));
    }

    #[test]
    fn parse_init_recognizes_every_mode() {
        assert_eq!(parse_init("zero"), InitKind::Zero);
        assert_eq!(parse_init("bias"), InitKind::Bias);
        assert_eq!(parse_init("mean"), InitKind::Mean);
        assert_eq!(parse_init("msi"), InitKind::Msi);
        assert_eq!(parse_init("multi-pos"), InitKind::MultiPos);
        assert_eq!(parse_init("ova-primal"), InitKind::OvaPrimal);
        assert_eq!(parse_init("unknown"), InitKind::Zero);
    }

    #[test]
    fn build_post_factory_defaults_to_identity() {
        let factory = build_post_factory(None, None).unwrap();
        let mut post = factory();
        let mut obj = toy_objective();
        let mut w = vec![0.2, 0.3];
        post.process(dismec_rs::types::LabelId::new(0), &mut w, &mut obj);
        assert_eq!(w, vec![0.2, 0.3]);
    }

    #[test]
    fn build_post_factory_combines_cull_and_sparsify() {
        let factory = build_post_factory(Some(0.05), Some(0.5)).unwrap();
        let mut post = factory();
        let mut obj = toy_objective();
        let mut w = vec![1.0, 0.01];
        post.process(dismec_rs::types::LabelId::new(0), &mut w, &mut obj);
        assert_eq!(w[1], 0.0);
    }

    fn toy_objective() -> LinearClassifierLoss {
        use dismec_rs::feature::{DenseMatrix, FeatureMatrix};
        let dm = DenseMatrix::from_row_major(vec![1.0, 0.0, 0.0, 1.0], 2, 2).unwrap();
        let features = Arc::new(FeatureMatrix::Dense(dm));
        let reg = Regularizer::squared(0.1, false).unwrap();
        let mut obj = LinearClassifierLoss::new(features, MarginFunction::SquaredHinge, reg);
        obj.retarget(vec![1.0, -1.0], vec![1.0, 1.0]).unwrap();
        obj
    }
}
