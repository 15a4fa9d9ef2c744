//! NewsREEL Evaluator CLI
//!
//! Scores a prediction log against a ground-truth click log.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --bin newsreel_eval -- \
//!   predictions.log ground_truth.log 300000 \
//!   --config evaluator.toml \
//!   --json results.json
//! ```
//!
//! Environment Variables:
//!   EVALUATOR_CONFIG_PATH - TOML config file (same as --config)
//!   RUST_LOG              - log filter (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use newsreel_evaluator::evaluation::{EvaluatorConfig, GroundTruthMatcher, ItemId, Millis};
use newsreel_evaluator::Evaluator;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "newsreel_eval")]
#[command(about = "Score recommendation predictions against a ground-truth click log")]
struct Args {
    /// Prediction log (tab-separated, JSON recommendation payload)
    prediction_file: PathBuf,

    /// Ground-truth log (tab-separated, time-ordered)
    ground_truth_file: PathBuf,

    /// Window size in milliseconds (overrides the config file)
    window_size_ms: Option<Millis>,

    /// Path to TOML configuration file (default: $EVALUATOR_CONFIG_PATH)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the full report as JSON to this path
    #[arg(long)]
    json: Option<PathBuf>,

    /// Print the response-time histogram
    #[arg(long, default_value = "false")]
    histogram: bool,

    /// Recommendations evaluated per prediction record
    #[arg(long)]
    max_recommendations: Option<usize>,

    /// File of blacklisted item ids, one per line
    #[arg(long)]
    blacklist: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(args: &Args) -> Result<EvaluatorConfig> {
    let mut config = match &args.config {
        Some(path) => EvaluatorConfig::load(path)?,
        None => EvaluatorConfig::from_env()?,
    };
    if let Some(window) = args.window_size_ms {
        config.window_size_ms = window;
    }
    if let Some(max) = args.max_recommendations {
        config.max_recommendations = max;
    }
    if args.histogram {
        config.histogram = true;
    }
    config.validate()?;
    Ok(config)
}

fn load_blacklist(path: &Path) -> Result<Vec<ItemId>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read blacklist {}", path.display()))?;
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| {
            l.parse::<ItemId>()
                .with_context(|| format!("invalid item id in blacklist: {:?}", l))
        })
        .collect()
}

fn main() -> Result<()> {
    let _ = dotenv();
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = load_config(&args)?;

    println!("Evaluation is running ...");
    println!("predictions:  {}", args.prediction_file.display());
    println!("ground truth: {}", args.ground_truth_file.display());
    println!("window (ms):  {}", config.window_size_ms);

    let matcher =
        GroundTruthMatcher::initialize_with(&args.ground_truth_file, config.matcher_config())
            .with_context(|| {
                format!(
                    "failed to open ground truth {}",
                    args.ground_truth_file.display()
                )
            })?;

    let mut evaluator = Evaluator::new(config);
    if let Some(path) = &args.blacklist {
        let items = load_blacklist(path)?;
        info!(count = items.len(), "loaded blacklist");
        evaluator.extend_blacklist(items);
    }

    let report = evaluator
        .run(&args.prediction_file, matcher)
        .context("evaluation failed")?;

    print!("{}", report.render_text());

    if let Some(path) = &args.json {
        let json = report.to_json().context("failed to serialize report")?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "report written");
    }

    Ok(())
}
