//! prw-replay - push recorded load-test results to a remote-write endpoint
//!
//! Reads the newline-delimited JSON produced by k6's JSON output and feeds
//! it through the aggregating output, so a finished test run can be
//! replayed into Prometheus after the fact.
//!
//! Two line types are understood:
//!
//! ```text
//! {"type":"Metric","metric":"http_reqs","data":{"name":"http_reqs","type":"counter"}}
//! {"type":"Point","metric":"http_reqs","data":{"time":"2024-01-01T00:00:00Z","value":1,"tags":{"method":"GET"}}}
//! ```
//!
//! Points for metrics that were never declared are skipped.
//!
//! # Configuration
//!
//! Settings are consolidated from `--config` (JSON or TOML), the
//! `K6_PROMETHEUS_RW_*` environment variables and `--arg`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info, warn};

use prw_output::{Config, Metric, MetricType, Output, Sample, SampleContainer};

// =============================================================================
// CLI Definition
// =============================================================================

/// Replay k6 JSON results into a Prometheus remote-write endpoint
#[derive(Parser)]
#[command(name = "prw-replay")]
#[command(version)]
#[command(about = "Replay k6 JSON results into a Prometheus remote-write endpoint", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to a JSON or TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Extra options as key=value pairs (e.g. "url=http://prom:9090/api/v1/write,pushInterval=1s")
    #[arg(short, long, global = true)]
    arg: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a results file (default reads stdin)
    Replay {
        /// Results file, `-` for stdin
        #[arg(short, long, default_value = "-")]
        input: String,

        /// Number of points handed to the output at once
        #[arg(short, long, default_value = "1000")]
        batch_size: usize,
    },

    /// Validate the configuration and print it as TOML
    CheckConfig,
}

// =============================================================================
// Input Format
// =============================================================================

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Line {
    Metric { data: MetricData },
    Point { metric: String, data: PointData },
}

#[derive(Deserialize)]
struct MetricData {
    name: String,
    #[serde(rename = "type")]
    kind: MetricType,
}

#[derive(Deserialize)]
struct PointData {
    time: chrono::DateTime<chrono::Utc>,
    value: f64,
    #[serde(default)]
    tags: Option<HashMap<String, String>>,
}

/// Counters reported at the end of a replay
#[derive(Debug, Default)]
struct ReplayStats {
    lines: u64,
    points: u64,
    skipped: u64,
    malformed: u64,
}

// =============================================================================
// Commands
// =============================================================================

fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let env: HashMap<String, String> = std::env::vars().collect();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env_overrides(&env)?;
    if let Some(arg) = &cli.arg {
        config.apply_arg(arg)?;
    }
    config.validate()?;
    Ok(config)
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

async fn replay<R: AsyncRead + Unpin>(
    output: &Output,
    reader: R,
    batch_size: usize,
) -> Result<ReplayStats, Box<dyn std::error::Error>> {
    let mut stats = ReplayStats::default();
    let mut metrics: HashMap<String, Arc<Metric>> = HashMap::new();
    let mut batch: Vec<Sample> = Vec::with_capacity(batch_size);
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        stats.lines += 1;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Line>(&line) {
            Ok(Line::Metric { data }) => {
                debug!(metric = %data.name, kind = %data.kind, "Declared metric");
                metrics
                    .entry(data.name.clone())
                    .or_insert_with(|| Metric::shared(data.name, data.kind));
            },
            Ok(Line::Point { metric, data }) => {
                let Some(metric) = metrics.get(&metric) else {
                    stats.skipped += 1;
                    continue;
                };
                batch.push(Sample::at(
                    Arc::clone(metric),
                    data.tags.unwrap_or_default(),
                    data.value,
                    data.time.timestamp_millis(),
                ));
                stats.points += 1;

                if batch.len() >= batch_size {
                    let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                    output.add_metric_samples(vec![Box::new(full) as Box<dyn SampleContainer>]);
                }
            },
            Err(e) => {
                stats.malformed += 1;
                if stats.malformed <= 10 {
                    warn!(line = stats.lines, error = %e, "Skipping malformed line");
                }
            },
        }
    }

    if !batch.is_empty() {
        output.add_metric_samples(vec![Box::new(batch) as Box<dyn SampleContainer>]);
    }
    Ok(stats)
}

async fn cmd_replay(
    config: Config,
    input: &str,
    batch_size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = Output::from_config(config)?;
    info!("Replaying into {}", output.description());
    output.start()?;

    let batch_size = batch_size.max(1);
    let stats = if input == "-" {
        replay(&output, tokio::io::stdin(), batch_size).await?
    } else {
        let file = tokio::fs::File::open(input).await?;
        replay(&output, file, batch_size).await?
    };

    output.stop().await?;

    let pipeline = output.stats();
    info!(
        lines = stats.lines,
        points = stats.points,
        skipped = stats.skipped,
        malformed = stats.malformed,
        series = output.series_count(),
        flushes = pipeline.flushes_sent,
        failed_flushes = pipeline.flushes_failed,
        records = pipeline.records_sent,
        bytes = pipeline.bytes_sent,
        dropped_samples = pipeline.samples_dropped,
        "Replay finished"
    );
    Ok(())
}

fn cmd_check_config(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Configuration is valid!");
    println!();
    println!("{}", config.to_toml()?);
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match &cli.command {
        Some(Commands::CheckConfig) => cmd_check_config(&config),
        Some(Commands::Replay { input, batch_size }) => {
            init_tracing(&config.log_level);
            cmd_replay(config, input, *batch_size).await
        },
        None => {
            init_tracing(&config.log_level);
            cmd_replay(config, "-", 1000).await
        },
    }
}
