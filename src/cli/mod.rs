//! CLI command definitions and handlers

mod mining;
mod validate;

use crate::config::{load_config, BugtrailConfig};
use crate::ml::classifier::CLASSIFIER_NAMES;
use crate::ml::sampling::SAMPLING_NAMES;
use crate::ml::selection::SELECTION_NAMES;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

/// Bugtrail - defect datasets from commit history and issue trackers
#[derive(Parser, Debug)]
#[command(name = "bugtrail")]
#[command(
    version,
    about = "Label buggy methods per release with SZZ and validate defect predictors walk-forward",
    after_help = "\
Examples:
  bugtrail labels                          Buggy methods per release as JSON
  bugtrail dataset                         Method-per-release feature CSV
  bugtrail validate --dataset d.csv --classifier random-forest
  bugtrail experiment --dataset d.csv -o results.csv
  bugtrail correlate --dataset d.csv       Features ranked by Spearman with isBuggy"
)]
pub struct Cli {
    /// Config file (default: ./bugtrail.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run SZZ and write the buggy methods of every release as JSON
    Labels {
        /// Output file (default: <key>_labels.json)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Build the method-per-release feature dataset
    Dataset {
        /// Output file (default: [dataset].output or <key>_dataset.csv)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Walk-forward validation of one classifier configuration
    Validate {
        /// Dataset CSV produced by `bugtrail dataset`
        #[arg(long)]
        dataset: PathBuf,

        /// Classifier to train
        #[arg(long, value_parser = CLASSIFIER_NAMES)]
        classifier: String,

        /// Feature selection fit on each training fold
        #[arg(long, default_value = "none", value_parser = SELECTION_NAMES)]
        selection: String,

        /// Class balancing of each training fold
        #[arg(long, default_value = "none", value_parser = SAMPLING_NAMES)]
        sampling: String,

        /// Base seed (default: [validation].base_seed)
        #[arg(long)]
        seed: Option<u64>,

        /// Per-fold CSV (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Run the configured classifier × selection × sampling × runs grid
    Experiment {
        #[arg(long)]
        dataset: PathBuf,

        /// Result CSV (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Pearson and Spearman correlation of each feature with the label
    Correlate {
        #[arg(long)]
        dataset: PathBuf,

        /// Output CSV (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("Cannot determine working directory")?;
    let config = load_config(cli.config.as_deref(), &cwd)?;

    match cli.command {
        Commands::Labels { output } => mining::run_labels(&config, output),
        Commands::Dataset { output } => mining::run_dataset(&config, output),
        Commands::Validate {
            dataset,
            classifier,
            selection,
            sampling,
            seed,
            output,
        } => {
            let seed = seed.unwrap_or(config.validation.base_seed);
            let choice = validate::Choice {
                classifier,
                selection,
                sampling,
                seed,
            };
            validate::run_validate(&config, &dataset, choice, output.as_deref())
        }
        Commands::Experiment { dataset, output } => {
            validate::run_experiment(&config, &dataset, output.as_deref())
        }
        Commands::Correlate { dataset, output } => {
            validate::run_correlate(&config, &dataset, output.as_deref())
        }
    }
}

/// Project key from config, required by the mining commands.
fn project_key(config: &BugtrailConfig) -> Result<&str> {
    let key = config.project.key.trim();
    if key.is_empty() {
        anyhow::bail!("No project key: set [project].key in bugtrail.toml");
    }
    Ok(key)
}

/// Bar on stderr for `len` items of `what`.
fn progress_bar(len: usize, what: &str) -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|s| s.progress_chars("█▓▒░  "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let bar = ProgressBar::new(len as u64);
    bar.set_style(style);
    bar.set_message(what.to_string());
    bar
}

/// Create `path` for writing, or use stdout when absent.
fn open_output(path: Option<&Path>) -> Result<Box<dyn std::io::Write>> {
    match path {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Cannot create {}", path.display()))?;
            Ok(Box::new(std::io::BufWriter::new(file)))
        }
        None => Ok(Box::new(std::io::stdout().lock())),
    }
}
