//! Reference prediction binary: scores a dataset against a trained model and
//! writes the top-k labels per instance.
//!
//! Scoring itself (ranking, top-k selection, output format) is a thin
//! wrapper around what the core already exposes (`FeatureMatrix::row_dot`,
//! `PartialModelLoader::load_range`) -- this binary is the one reference
//! entry point, not a second scoring engine.

#![forbid(unsafe_code)]

use std::io::Write;
use std::path::PathBuf;

use dismec_rs::dataset::xmc::read_xmc;
use dismec_rs::io::loader::{PartialModelLoader, SparseMode};
use dismec_rs::types::LabelId;

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args: Vec<String> = std::env::args().collect();
    let model_path = PathBuf::from(parse_flag(&args, "--model").expect("--model is required"));
    let dataset_path = PathBuf::from(parse_flag(&args, "--dataset").expect("--dataset is required"));
    let top_k: usize = parse_flag(&args, "--top-k").and_then(|s| s.parse().ok()).unwrap_or(5);
    let one_based = args.iter().any(|a| a == "--one-based");
    let output_path = parse_flag(&args, "--output").map(PathBuf::from);

    tracing::info!(model = %model_path.display(), "loading model metadata");
    let loader = PartialModelLoader::new(&model_path, SparseMode::MatchFile)?;
    loader.validate(true).map_err(|e| anyhow::anyhow!("model is not a complete, non-overlapping cover: {e}"))?;
    let num_labels = loader.num_labels();
    let model = loader.load_range(0, num_labels)?;

    tracing::info!(dataset = %dataset_path.display(), "loading evaluation dataset");
    let dataset = read_xmc(&dataset_path, one_based)?;
    if dataset.num_features() != model.num_features() {
        anyhow::bail!("dataset has {} features, model expects {}", dataset.num_features(), model.num_features());
    }
    let features = dataset.features();

    let weights: Vec<Vec<f32>> = (0..num_labels)
        .map(|label| model.weights_for_label(LabelId::new(label)).expect("label in range by construction"))
        .collect();

    let mut out: Box<dyn Write> = match &output_path {
        Some(path) => Box::new(std::io::BufWriter::new(std::fs::File::create(path)?)),
        None => Box::new(std::io::BufWriter::new(std::io::stdout())),
    };

    for row in 0..features.rows() {
        let mut scores: Vec<(u32, f32)> = weights.iter().enumerate().map(|(label, w)| (label as u32, features.row_dot(row, w))).collect();
        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scores.truncate(top_k);

        let rendered: Vec<String> = scores.iter().map(|(label, score)| format!("{label}:{score:.6}")).collect();
        writeln!(out, "{}", rendered.join(" "))?;
    }
    out.flush()?;

    tracing::info!(instances = features.rows(), labels = num_labels, "prediction complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_flag_reads_value() {
        let args = vec!["bin".to_string(), "--top-k".to_string(), "3".to_string()];
        assert_eq!(parse_flag(&args, "--top-k"), Some("3".to_string()));
    }
}
