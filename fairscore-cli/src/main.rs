// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fairscore CLI
//!
//! Command-line interface for routing queries and scoring responses.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fairscore_core::{Domain, FairConfig};
use fairscore_evals::{CalibrationEvaluator, EvaluationRequest, Orchestrator};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "fairscore")]
#[command(about = "Fairscore - rule-based FAIR evaluation of generated answers", long_about = None)]
struct Cli {
    /// Configuration file (TOML); built-in tables when absent
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a query into a domain
    Route {
        query: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Score a single response
    Evaluate {
        #[arg(long)]
        query: String,

        #[arg(long)]
        response: String,

        /// Generator confidence in [0, 1]
        #[arg(long, default_value = "0.5")]
        confidence: f64,

        #[arg(long)]
        ground_truth: Option<String>,

        /// Skip routing and use this domain
        #[arg(long)]
        domain: Option<Domain>,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,

        /// Also print the text that would be shown to a user
        #[arg(long)]
        present: bool,
    },

    /// Score a JSONL file of requests
    Batch {
        /// One {query, response, confidence, ground_truth?, domain?} per line
        file: PathBuf,

        /// Print only the summary
        #[arg(long)]
        summary_only: bool,
    },

    /// Calibration metrics for a JSONL file of predictions
    Calibrate {
        /// One {prediction, ground_truth, confidence} per line
        file: PathBuf,

        /// Number of confidence bins
        #[arg(long)]
        bins: Option<usize>,
    },

    /// Configuration utilities
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Validate a configuration file
    Check { path: Option<PathBuf> },

    /// Print the effective configuration as TOML
    Show,
}

#[derive(Debug, Deserialize)]
struct CalibrationRecord {
    prediction: String,
    ground_truth: String,
    confidence: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command, cli.config.as_deref());
    }

    let config = FairConfig::load(cli.config.clone()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Config { .. } => unreachable!(), // Handled above

        Commands::Route { query, json } => {
            let orchestrator = Orchestrator::builder().with_config(config).build()?;
            let decision = orchestrator.route(&query, None);
            if json {
                println!("{}", serde_json::to_string_pretty(&decision)?);
            } else {
                println!("Domain: {}", decision.domain);
                println!("Rule:   {}", decision.rule);
                println!(
                    "Scores: finance={} medical={}",
                    decision.finance_score, decision.medical_score
                );
                println!("{}", decision.explanation);
            }
        }

        Commands::Evaluate {
            query,
            response,
            confidence,
            ground_truth,
            domain,
            pretty,
            present,
        } => {
            let orchestrator = Orchestrator::builder().with_config(config).build()?;

            let mut request = EvaluationRequest::new(query.clone(), response.clone(), confidence);
            if let Some(truth) = ground_truth {
                request = request.with_ground_truth(truth);
            }
            if let Some(domain) = domain {
                request = request.with_domain(domain);
            }

            let report = orchestrator.evaluate(request).await;
            let out = if pretty {
                report.to_json_pretty()?
            } else {
                report.to_json()?
            };
            println!("{}", out);

            if present {
                let shown = orchestrator.present(&query, &response, report.domain);
                eprintln!("\n{}", shown.text);
            }
        }

        Commands::Batch { file, summary_only } => {
            let requests: Vec<EvaluationRequest> = read_jsonl(&file)?;
            info!("Evaluating {} requests from {:?}", requests.len(), file);

            let orchestrator = Orchestrator::builder().with_config(config).build()?;
            let (reports, summary) = orchestrator.evaluate_batch(requests).await;

            if !summary_only {
                for report in &reports {
                    println!("{}", report.to_json()?);
                }
            }
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::Calibrate { file, bins } => {
            let records: Vec<CalibrationRecord> = read_jsonl(&file)?;
            if records.is_empty() {
                bail!("No predictions in {:?}", file);
            }

            let mut evaluator = CalibrationEvaluator::new(&config.calibration);
            if let Some(n) = bins {
                if n == 0 {
                    bail!("--bins must be at least 1");
                }
                evaluator = evaluator.with_bins(n);
            }

            let predictions: Vec<&str> = records.iter().map(|r| r.prediction.as_str()).collect();
            let truths: Vec<&str> = records.iter().map(|r| r.ground_truth.as_str()).collect();
            let confidences: Vec<f64> = records.iter().map(|r| r.confidence).collect();

            let score = evaluator
                .evaluate_predictions(&predictions, &truths, &confidences)
                .context("Calibration failed")?;
            println!("{}", serde_json::to_string_pretty(&score)?);
        }
    }

    Ok(())
}

fn handle_config_command(command: &ConfigCommands, global: Option<&Path>) -> Result<()> {
    match command {
        ConfigCommands::Check { path } => {
            let path = path.as_deref().or(global);
            let config = match path {
                Some(p) => FairConfig::from_file(p)
                    .with_context(|| format!("Invalid configuration {:?}", p))?,
                None => FairConfig::builtin().context("Built-in configuration is invalid")?,
            };

            for metric in config.fair.duplicate_metrics() {
                warn!(
                    metric = metric.as_str(),
                    "FAIR weight listed more than once, last entry wins"
                );
            }
            match path {
                Some(p) => println!("✓ Configuration {:?} is valid", p),
                None => println!("✓ Built-in configuration is valid"),
            }
        }

        ConfigCommands::Show => {
            let config = FairConfig::load(global.map(Path::to_path_buf))
                .context("Failed to load configuration")?;
            print!("{}", config.to_toml_string()?);
        }
    }
    Ok(())
}

fn read_jsonl<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{:?} line {}: invalid record", path, i + 1))
        })
        .collect()
}
