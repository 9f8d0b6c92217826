//! Experiment grid: classifiers × feature selection × sampling × runs

use super::classifier::{classifier_by_name, Classifier, ClassifierError};
use super::sampling::{sampler_by_name, Sampler, SamplingError};
use super::selection::{selector_by_name, FeatureSelector, SelectionError};
use super::validation::{FoldResult, ValidationError, ValidationSettings, WalkForwardValidator};
use crate::config::ValidationConfig;
use crate::dataset::Table;
use indicatif::ProgressBar;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Sampling(#[from] SamplingError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// One fold of one configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentRow {
    pub classifier: String,
    pub feature_selection: String,
    pub sampling: String,
    pub run: u32,
    pub fold: FoldResult,
}

impl ExperimentRow {
    fn sort_key(&self) -> (&str, &str, &str, u32, i64) {
        (
            &self.classifier,
            &self.feature_selection,
            &self.sampling,
            self.run,
            self.fold.release_index,
        )
    }
}

pub struct Experiment {
    classifiers: Vec<Box<dyn Classifier>>,
    selectors: Vec<Box<dyn FeatureSelector>>,
    samplers: Vec<Box<dyn Sampler>>,
    runs: u32,
    base_seed: u64,
    settings: ValidationSettings,
    progress: Option<ProgressBar>,
}

impl Experiment {
    /// Resolve every configured strategy name. Any unknown name fails.
    pub fn from_config(config: &ValidationConfig) -> Result<Self, ExperimentError> {
        let classifiers = config
            .classifiers
            .iter()
            .map(|name| classifier_by_name(name))
            .collect::<Result<Vec<_>, _>>()?;
        let selectors = config
            .feature_selection
            .iter()
            .map(|name| selector_by_name(name))
            .collect::<Result<Vec<_>, _>>()?;
        let samplers = config
            .sampling
            .iter()
            .map(|name| sampler_by_name(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            classifiers,
            selectors,
            samplers,
            runs: config.runs,
            base_seed: config.base_seed,
            settings: ValidationSettings::from(config),
            progress: None,
        })
    }

    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    /// Number of validations the grid performs.
    pub fn size(&self) -> usize {
        self.classifiers.len() * self.selectors.len() * self.samplers.len() * self.runs as usize
    }

    pub fn run(&self, table: &Table) -> Result<Vec<ExperimentRow>, ExperimentError> {
        info!(validations = self.size(), "Running experiment grid");
        let mut rows = Vec::new();

        for classifier in &self.classifiers {
            for selector in &self.selectors {
                for sampler in &self.samplers {
                    let validator = WalkForwardValidator::new(
                        classifier.as_ref(),
                        selector.as_ref(),
                        sampler.as_ref(),
                        self.settings.clone(),
                    );
                    for run in 0..self.runs {
                        let seed = self.base_seed.wrapping_add(u64::from(run));
                        let outcome = validator.validate(table, seed)?;
                        rows.extend(outcome.evaluated().map(|fold| ExperimentRow {
                            classifier: classifier.name().to_string(),
                            feature_selection: selector.name().to_string(),
                            sampling: sampler.name().to_string(),
                            run,
                            fold: fold.clone(),
                        }));
                        if let Some(bar) = &self.progress {
                            bar.inc(1);
                        }
                    }
                }
            }
        }

        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }
        rows.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        info!(rows = rows.len(), "Experiment complete");
        Ok(rows)
    }
}
