//! Walk-forward validation
//!
//! Fold `i` trains on every row whose release index is below `i` and tests
//! on the rows of release `i` exactly, for `i` from 2 to the last release
//! index. Metadata columns are stripped before anything is fit. Feature
//! selection and class balancing are fit on the training rows only; the
//! test rows keep their natural class distribution.

use super::classifier::{Classifier, ClassifierError};
use super::evaluation::EvaluationMetrics;
use super::sampling::{Sampler, SamplingError};
use super::selection::{FeatureSelector, SelectionError};
use crate::config::ValidationConfig;
use crate::dataset::{DatasetError, Matrix, Table};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// First release index that can be a test fold.
pub const FIRST_TEST_RELEASE: i64 = 2;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("dataset has no rows")]
    EmptyDataset,
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Column layout of the dataset being validated.
#[derive(Debug, Clone)]
pub struct ValidationSettings {
    pub release_index_column: String,
    pub label_column: String,
    pub loc_column: String,
    pub buggy_label: String,
    pub metadata_columns: Vec<String>,
    pub parallel_folds: bool,
}

impl From<&ValidationConfig> for ValidationSettings {
    fn from(config: &ValidationConfig) -> Self {
        Self {
            release_index_column: config.release_index_column.clone(),
            label_column: config.label_column.clone(),
            loc_column: config.loc_column.clone(),
            buggy_label: config.buggy_label.clone(),
            metadata_columns: config.metadata_columns.clone(),
            parallel_folds: config.parallel_folds,
        }
    }
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self::from(&ValidationConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoldResult {
    pub release_index: i64,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Training rows after balancing
    pub resampled_train_rows: usize,
    pub test_buggy: usize,
    pub metrics: EvaluationMetrics,
    pub selected_features: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FoldSkip {
    EmptyTrain,
    EmptyTest,
    /// A strategy failed on this fold's data
    Failed(String),
}

impl std::fmt::Display for FoldSkip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FoldSkip::EmptyTrain => write!(f, "empty training set"),
            FoldSkip::EmptyTest => write!(f, "empty test set"),
            FoldSkip::Failed(e) => write!(f, "{}", e),
        }
    }
}

impl From<SelectionError> for FoldSkip {
    fn from(e: SelectionError) -> Self {
        FoldSkip::Failed(format!("feature selection: {}", e))
    }
}

impl From<SamplingError> for FoldSkip {
    fn from(e: SamplingError) -> Self {
        FoldSkip::Failed(format!("sampling: {}", e))
    }
}

impl From<ClassifierError> for FoldSkip {
    fn from(e: ClassifierError) -> Self {
        FoldSkip::Failed(format!("classifier: {}", e))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FoldOutcome {
    Evaluated(FoldResult),
    Skipped { release_index: i64, reason: FoldSkip },
}

impl FoldOutcome {
    pub fn release_index(&self) -> i64 {
        match self {
            FoldOutcome::Evaluated(r) => r.release_index,
            FoldOutcome::Skipped { release_index, .. } => *release_index,
        }
    }
}

/// All folds of one validation, ordered by release index.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationRun {
    pub folds: Vec<FoldOutcome>,
}

impl ValidationRun {
    pub fn evaluated(&self) -> impl Iterator<Item = &FoldResult> {
        self.folds.iter().filter_map(|f| match f {
            FoldOutcome::Evaluated(r) => Some(r),
            FoldOutcome::Skipped { .. } => None,
        })
    }

    pub fn skipped(&self) -> usize {
        self.folds.len() - self.evaluated().count()
    }
}

/// Dataset prepared once for every fold.
struct PreparedDataset {
    release_index: Vec<i64>,
    labels: Vec<bool>,
    loc: Vec<f64>,
    features: Matrix,
}

impl PreparedDataset {
    fn new(table: &Table, settings: &ValidationSettings) -> ValidationResult<Self> {
        if table.is_empty() {
            return Err(ValidationError::EmptyDataset);
        }
        let release_index = table
            .numeric_column(&settings.release_index_column)?
            .into_iter()
            .map(|v| v.round() as i64)
            .collect();
        let labels = table.binary_column(&settings.label_column, &settings.buggy_label)?;
        // read from the raw rows so selection cannot drop it
        let loc = table.numeric_column(&settings.loc_column)?;

        let mut excluded = settings.metadata_columns.clone();
        excluded.push(settings.release_index_column.clone());
        excluded.push(settings.label_column.clone());
        let features = table.drop_columns(&excluded).to_matrix()?;

        Ok(Self {
            release_index,
            labels,
            loc,
            features,
        })
    }

    fn rows_where<F: Fn(i64) -> bool>(&self, keep: F) -> Vec<usize> {
        (0..self.release_index.len())
            .filter(|&i| keep(self.release_index[i]))
            .collect()
    }

    fn slice(&self, rows: &[usize]) -> (Matrix, Vec<bool>, Vec<f64>) {
        let x = Matrix::new(
            self.features.columns.clone(),
            rows.iter().map(|&i| self.features.rows[i].clone()).collect(),
        );
        let y = rows.iter().map(|&i| self.labels[i]).collect();
        let loc = rows.iter().map(|&i| self.loc[i]).collect();
        (x, y, loc)
    }
}

/// Seed for one fold, derived from the run seed.
pub fn fold_seed(seed: u64, release_index: i64) -> u64 {
    seed ^ (release_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

pub struct WalkForwardValidator<'a> {
    classifier: &'a dyn Classifier,
    selector: &'a dyn FeatureSelector,
    sampler: &'a dyn Sampler,
    settings: ValidationSettings,
}

impl<'a> WalkForwardValidator<'a> {
    pub fn new(
        classifier: &'a dyn Classifier,
        selector: &'a dyn FeatureSelector,
        sampler: &'a dyn Sampler,
        settings: ValidationSettings,
    ) -> Self {
        Self {
            classifier,
            selector,
            sampler,
            settings,
        }
    }

    /// Run every fold of `table`. Missing columns and non-numeric features
    /// are fatal; problems confined to one fold skip that fold.
    pub fn validate(&self, table: &Table, seed: u64) -> ValidationResult<ValidationRun> {
        let data = PreparedDataset::new(table, &self.settings)?;
        let max_index = data.release_index.iter().copied().max().unwrap_or(0);
        let folds: Vec<i64> = (FIRST_TEST_RELEASE..=max_index).collect();

        info!(
            classifier = self.classifier.name(),
            selection = self.selector.name(),
            sampling = self.sampler.name(),
            folds = folds.len(),
            "Walk-forward validation"
        );

        let run_fold = |&i: &i64| match self.fold(&data, i, fold_seed(seed, i)) {
            Ok(result) => FoldOutcome::Evaluated(result),
            Err(reason) => {
                warn!("Skipping fold {}: {}", i, reason);
                FoldOutcome::Skipped {
                    release_index: i,
                    reason,
                }
            }
        };
        let outcomes: Vec<FoldOutcome> = if self.settings.parallel_folds {
            folds.par_iter().map(run_fold).collect()
        } else {
            folds.iter().map(run_fold).collect()
        };

        Ok(ValidationRun { folds: outcomes })
    }

    fn fold(&self, data: &PreparedDataset, i: i64, seed: u64) -> Result<FoldResult, FoldSkip> {
        let train_rows = data.rows_where(|r| r < i);
        let test_rows = data.rows_where(|r| r == i);
        if train_rows.is_empty() {
            return Err(FoldSkip::EmptyTrain);
        }
        if test_rows.is_empty() {
            return Err(FoldSkip::EmptyTest);
        }

        let (train_x, train_y, _) = data.slice(&train_rows);
        let (test_x, test_y, test_loc) = data.slice(&test_rows);

        let kept = self.selector.fit(&train_x, &train_y)?;
        let train_x = train_x.select_columns(&kept);
        let test_x = test_x.select_columns(&kept);

        let (train_x, train_y_resampled) = self.sampler.resample(&train_x, &train_y, seed)?;

        let model = self.classifier.fit(&train_x, &train_y_resampled, seed)?;
        let probabilities: Vec<f64> = test_x.rows.iter().map(|r| model.predict_proba(r)).collect();
        let metrics = EvaluationMetrics::compute(&probabilities, &test_y, &test_loc);

        debug!(
            fold = i,
            train = train_rows.len(),
            test = test_rows.len(),
            features = test_x.n_features(),
            "Fold evaluated"
        );

        Ok(FoldResult {
            release_index: i,
            train_rows: train_rows.len(),
            test_rows: test_rows.len(),
            resampled_train_rows: train_y_resampled.len(),
            test_buggy: test_y.iter().filter(|&&b| b).count(),
            metrics,
            selected_features: test_x.columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::classifier::NaiveBayes;
    use crate::ml::sampling::NoSampling;
    use crate::ml::selection::NoSelection;

    fn table(csv: &str) -> Table {
        Table::from_reader(csv.as_bytes()).unwrap()
    }

    const DATA: &str = "\
Version,ReleaseIndex,Signature,LOC,NR,isBuggy
R1,1,a.f(),10,1,False
R1,1,a.g(),50,5,True
R2,2,a.f(),10,1,False
R2,2,a.g(),50,6,True
R4,4,a.f(),12,0,False
R4,4,a.g(),55,7,True
";

    fn validator<'a>(
        classifier: &'a NaiveBayes,
        selector: &'a NoSelection,
        sampler: &'a NoSampling,
    ) -> WalkForwardValidator<'a> {
        WalkForwardValidator::new(classifier, selector, sampler, ValidationSettings::default())
    }

    #[test]
    fn test_folds_and_empty_release_skip() {
        let (c, s, r) = (NaiveBayes::default(), NoSelection, NoSampling);
        let run = validator(&c, &s, &r).validate(&table(DATA), 1).unwrap();

        let indices: Vec<i64> = run.folds.iter().map(FoldOutcome::release_index).collect();
        assert_eq!(indices, vec![2, 3, 4]);
        assert_eq!(run.skipped(), 1);
        assert!(matches!(
            run.folds[1],
            FoldOutcome::Skipped { release_index: 3, reason: FoldSkip::EmptyTest }
        ));

        let fold4 = run.evaluated().find(|f| f.release_index == 4).unwrap();
        assert_eq!(fold4.train_rows, 4);
        assert_eq!(fold4.test_rows, 2);
        assert_eq!(fold4.selected_features, vec!["LOC", "NR"]);
    }

    #[test]
    fn test_metadata_is_stripped() {
        let (c, s, r) = (NaiveBayes::default(), NoSelection, NoSampling);
        let run = validator(&c, &s, &r).validate(&table(DATA), 1).unwrap();
        for fold in run.evaluated() {
            assert!(!fold.selected_features.iter().any(|f| f == "ReleaseIndex" || f == "Signature"));
        }
    }

    #[test]
    fn test_missing_release_column_is_fatal() {
        let (c, s, r) = (NaiveBayes::default(), NoSelection, NoSampling);
        let data = "LOC,isBuggy\n1,True\n";
        let err = validator(&c, &s, &r).validate(&table(data), 1).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::Dataset(DatasetError::MissingColumn(ref c)) if c == "ReleaseIndex"
        ));
    }

    #[test]
    fn test_nan_feature_cell_is_fatal() {
        let (c, s, r) = (NaiveBayes::default(), NoSelection, NoSampling);
        let data = "ReleaseIndex,LOC,NR,isBuggy\n1,10,1,False\n1,50,5,True\n2,10,NaN,False\n2,50,6,True\n";
        let err = validator(&c, &s, &r).validate(&table(data), 1).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::Dataset(DatasetError::NonNumeric { ref column, row: 2, .. }) if column == "NR"
        ));
    }

    #[test]
    fn test_parallel_folds_match_sequential() {
        let (c, s, r) = (NaiveBayes::default(), NoSelection, NoSampling);
        let sequential = validator(&c, &s, &r).validate(&table(DATA), 5).unwrap();
        let settings = ValidationSettings {
            parallel_folds: true,
            ..ValidationSettings::default()
        };
        let parallel = WalkForwardValidator::new(&c, &s, &r, settings)
            .validate(&table(DATA), 5)
            .unwrap();
        assert_eq!(sequential.folds, parallel.folds);
    }

    #[test]
    fn test_fold_seed_differs_per_fold() {
        assert_ne!(fold_seed(42, 2), fold_seed(42, 3));
        assert_eq!(fold_seed(42, 2), fold_seed(42, 2));
    }
}
