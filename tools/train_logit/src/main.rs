/// Training tool: fits the logistic risk model on an exported training table,
/// writes raw-space weights as JSON and prints evaluation metrics.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use defrisk_core::metrics::{eval_probs, summarize_at_threshold, topk_report, DEFAULT_TOP_K};
use defrisk_core::table::YearList;
use defrisk_core::train::{feature_cols, train_from_table, FeatureTable, TrainConfig, TrainResult};
use defrisk_core::weights::WeightFile;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "train_logit", about = "Train the 66-feature logistic risk model")]
struct Args {
    /// Balanced training CSV
    #[arg(long = "train_csv")]
    train_csv: PathBuf,

    /// Optional unbiased forest-only CSV for evaluation
    #[arg(long = "unbiased_csv")]
    unbiased_csv: Option<PathBuf>,

    /// Comma list of training years, e.g. 2018,2019
    #[arg(long = "train_years")]
    train_years: YearList,

    /// Held-out year (evaluated, never trained on)
    #[arg(long = "test_year")]
    test_year: Option<i32>,

    #[arg(long = "out_json", default_value = "models/logit_weights.json")]
    out_json: PathBuf,

    /// Inverse L2 regularisation strength
    #[arg(long = "C", default_value = "1.0")]
    c: f64,

    #[arg(long = "max_iter", default_value = "5000")]
    max_iter: usize,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

/// Print probability metrics, the 0.5 confusion summary and top-K capture.
fn evaluate(res: &TrainResult, x: &[Vec<f64>], y: &[f64], name: &str) -> Result<()> {
    let p = res.model.predict_proba(x);
    println!("{name} metrics: {}", serde_json::to_string(&eval_probs(y, &p, name))?);
    println!(
        "{name} @0.5: {}",
        serde_json::to_string(&summarize_at_threshold(y, &p, 0.5, name))?
    );
    println!("TopK: {}", serde_json::to_string(&topk_report(y, &p, &DEFAULT_TOP_K))?);
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let cfg = TrainConfig {
        c: args.c,
        max_iter: args.max_iter,
        ..TrainConfig::default()
    };

    let table = FeatureTable::read_csv(&args.train_csv)
        .with_context(|| format!("Cannot read {}", args.train_csv.display()))?;
    let (res, info) = train_from_table(&table, &args.train_years.0, args.test_year, &cfg)
        .context("Training failed")?;
    println!("Train info: {}", serde_json::to_string(&info)?);

    let weights = WeightFile {
        w: res.w_raw.clone(),
        b: Some(res.b_raw),
        feature_cols: Some(feature_cols()),
    };
    weights
        .save(&args.out_json)
        .with_context(|| format!("Cannot write {}", args.out_json.display()))?;
    println!("Saved weights to: {}", args.out_json.display());

    if let Some(test_year) = args.test_year {
        let is_test: &dyn Fn(i32) -> bool = &|t| t == test_year;
        let (x, y) = table
            .xy(&feature_cols(), Some(is_test))
            .context("Cannot assemble held-out rows")?;
        if x.is_empty() {
            info!(test_year, "no held-out rows; skipping evaluation");
        } else {
            evaluate(&res, &x, &y, &format!("test_{test_year}"))?;
        }
    }

    if let Some(path) = &args.unbiased_csv {
        let unbiased = FeatureTable::read_csv(path).with_context(|| format!("Cannot read {}", path.display()))?;
        let (x, y) = unbiased
            .xy(&feature_cols(), None)
            .with_context(|| format!("Cannot assemble rows of {}", path.display()))?;
        evaluate(&res, &x, &y, "unbiased")?;
    }
    Ok(())
}
