//! `validate`, `experiment` and `correlate`: evaluation of a dataset

use super::{open_output, progress_bar};
use crate::config::BugtrailConfig;
use crate::dataset::Table;
use crate::ml::report::{write_correlations, write_experiment, write_folds};
use crate::ml::{
    classifier_by_name, correlate, sampler_by_name, selector_by_name, Experiment, FoldResult,
    ValidationSettings, WalkForwardValidator,
};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Strategy names and seed of a single validation.
#[derive(Debug, Clone)]
pub(super) struct Choice {
    pub classifier: String,
    pub selection: String,
    pub sampling: String,
    pub seed: u64,
}

fn load_table(path: &Path) -> Result<Table> {
    Table::read_csv(path).with_context(|| format!("Failed to read dataset {}", path.display()))
}

pub(super) fn run_validate(
    config: &BugtrailConfig,
    dataset: &Path,
    choice: Choice,
    output: Option<&Path>,
) -> Result<()> {
    let table = load_table(dataset)?;
    let classifier = classifier_by_name(&choice.classifier)?;
    let selector = selector_by_name(&choice.selection)?;
    let sampler = sampler_by_name(&choice.sampling)?;

    let validator = WalkForwardValidator::new(
        classifier.as_ref(),
        selector.as_ref(),
        sampler.as_ref(),
        ValidationSettings::from(&config.validation),
    );
    let run = validator.validate(&table, choice.seed)?;

    let folds: Vec<FoldResult> = run.evaluated().cloned().collect();
    info!(
        evaluated = folds.len(),
        skipped = run.skipped(),
        "Validation of {} complete",
        choice.classifier
    );
    write_folds(open_output(output)?, &folds)?;
    Ok(())
}

pub(super) fn run_experiment(
    config: &BugtrailConfig,
    dataset: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let table = load_table(dataset)?;
    let experiment = Experiment::from_config(&config.validation)?;
    let bar = progress_bar(experiment.size(), "validations");
    let rows = experiment.with_progress(bar).run(&table)?;
    write_experiment(open_output(output)?, &rows)?;
    Ok(())
}

pub(super) fn run_correlate(
    config: &BugtrailConfig,
    dataset: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let table = load_table(dataset)?;
    let rows = correlate(&table, &ValidationSettings::from(&config.validation))?;
    if let Some(top) = rows.first() {
        info!(
            features = rows.len(),
            "Strongest feature {} (spearman {:.3})",
            top.feature,
            top.spearman
        );
    }
    write_correlations(open_output(output)?, &rows)?;
    Ok(())
}
