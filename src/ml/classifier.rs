//! Classifiers
//!
//! Every classifier scales its inputs to `[0, 1]` with a min-max scaler fit
//! on the training rows only, then trains on the scaled rows. The fitted
//! [`Model`] applies the same scaling at prediction time.
//!
//! - [`RandomForest`]: aprender random forest
//! - [`NaiveBayes`]: aprender Gaussian naive Bayes
//! - [`KNearest`]: aprender k-nearest neighbours (IBk, k = 1)
//! - [`GbdtClassifier`]: gradient-boosted trees from the `gbdt` crate

use crate::dataset::Matrix;
use aprender::classification::{GaussianNB, KNearestNeighbors};
use aprender::tree::RandomForestClassifier;
use aprender::Matrix as DenseMatrix;
use gbdt::config::Config;
use gbdt::decision_tree::Data;
use gbdt::gradient_boost::GBDT;
use thiserror::Error;
use tracing::debug;

/// Names accepted by [`classifier_by_name`].
pub const CLASSIFIER_NAMES: [&str; 4] = ["random-forest", "naive-bayes", "knn", "gbdt"];

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("unknown classifier '{0}'")]
    Unknown(String),

    #[error("training failed: {0}")]
    Backend(String),

    #[error("no training rows")]
    EmptyTrainingSet,

    #[error("{rows} rows but {labels} labels")]
    LengthMismatch { rows: usize, labels: usize },
}

pub type ClassifierResult<T> = Result<T, ClassifierError>;

/// A trained model.
pub trait Model: Send + Sync {
    /// Probability that `row` is buggy.
    fn predict_proba(&self, row: &[f64]) -> f64;
}

/// A learning algorithm.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    fn fit(&self, x: &Matrix, y: &[bool], seed: u64) -> ClassifierResult<Box<dyn Model>>;
}

/// Map a config name to a classifier.
pub fn classifier_by_name(name: &str) -> ClassifierResult<Box<dyn Classifier>> {
    match name.to_ascii_lowercase().as_str() {
        "random-forest" | "randomforest" | "rf" => Ok(Box::new(RandomForest::default())),
        "gbdt" => Ok(Box::new(GbdtClassifier::default())),
        "naive-bayes" | "naivebayes" => Ok(Box::new(NaiveBayes)),
        "knn" | "ibk" => Ok(Box::new(KNearest::default())),
        _ => Err(ClassifierError::Unknown(name.to_string())),
    }
}

fn check_shape(x: &Matrix, y: &[bool]) -> ClassifierResult<()> {
    if x.n_rows() != y.len() {
        return Err(ClassifierError::LengthMismatch {
            rows: x.n_rows(),
            labels: y.len(),
        });
    }
    if x.is_empty() {
        return Err(ClassifierError::EmptyTrainingSet);
    }
    Ok(())
}

/// Per-column min-max scaling.
#[derive(Debug, Clone, PartialEq)]
pub struct MinMaxScaler {
    mins: Vec<f64>,
    ranges: Vec<f64>,
}

impl MinMaxScaler {
    pub fn fit(x: &Matrix) -> Self {
        let mut mins = vec![f64::INFINITY; x.n_features()];
        let mut maxs = vec![f64::NEG_INFINITY; x.n_features()];
        for row in &x.rows {
            for (j, &v) in row.iter().enumerate() {
                mins[j] = mins[j].min(v);
                maxs[j] = maxs[j].max(v);
            }
        }
        let ranges = mins.iter().zip(&maxs).map(|(lo, hi)| hi - lo).collect();
        Self { mins, ranges }
    }

    /// Scaled copy of `row`. Constant training columns map to 0.
    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mins.iter().zip(&self.ranges))
            .map(|(&v, (&min, &range))| {
                if range > 0.0 && range.is_finite() {
                    (v - min) / range
                } else {
                    0.0
                }
            })
            .collect()
    }

    pub fn transform_all(&self, x: &Matrix) -> Vec<Vec<f64>> {
        x.rows.iter().map(|r| self.transform(r)).collect()
    }
}

/// Same answer for every row; used when training has a single class.
struct ConstantModel(f64);

impl Model for ConstantModel {
    fn predict_proba(&self, _row: &[f64]) -> f64 {
        self.0
    }
}

fn single_class(y: &[bool]) -> Option<f64> {
    let buggy = y.iter().filter(|&&b| b).count();
    if buggy == 0 {
        Some(0.0)
    } else if buggy == y.len() {
        Some(1.0)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Gradient-boosted trees
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GbdtClassifier {
    pub trees: usize,
    pub max_depth: u32,
    pub shrinkage: f32,
}

impl Default for GbdtClassifier {
    fn default() -> Self {
        Self {
            trees: 100,
            max_depth: 6,
            shrinkage: 0.1,
        }
    }
}

struct GbdtModel {
    scaler: MinMaxScaler,
    model: GBDT,
}

impl Model for GbdtModel {
    fn predict_proba(&self, row: &[f64]) -> f64 {
        let features = to_f32(&self.scaler.transform(row));
        let preds = self.model.predict(&vec![Data::new_test_data(features, None)]);
        preds.first().copied().map_or(0.0, f64::from)
    }
}

fn to_f32(row: &[f64]) -> Vec<f32> {
    row.iter().map(|&v| v as f32).collect()
}

impl Classifier for GbdtClassifier {
    fn name(&self) -> &str {
        "gbdt"
    }

    // Sampling ratios stay at 1.0, so training is deterministic and the
    // seed is not needed.
    fn fit(&self, x: &Matrix, y: &[bool], _seed: u64) -> ClassifierResult<Box<dyn Model>> {
        check_shape(x, y)?;
        if let Some(p) = single_class(y) {
            return Ok(Box::new(ConstantModel(p)));
        }
        if x.n_features() == 0 {
            let prior = y.iter().filter(|&&b| b).count() as f64 / y.len() as f64;
            return Ok(Box::new(ConstantModel(prior)));
        }

        let scaler = MinMaxScaler::fit(x);

        let mut cfg = Config::new();
        cfg.set_feature_size(x.n_features());
        cfg.set_max_depth(self.max_depth);
        cfg.set_iterations(self.trees);
        cfg.set_shrinkage(self.shrinkage);
        cfg.set_loss("LogLikelyhood");
        cfg.set_debug(false);
        cfg.set_training_optimization_level(2);
        cfg.set_min_leaf_size(1);

        let mut model = GBDT::new(&cfg);
        let mut training: Vec<Data> = scaler
            .transform_all(x)
            .iter()
            .zip(y)
            .map(|(row, &buggy)| {
                let label = if buggy { 1.0 } else { -1.0 };
                Data::new_training_data(to_f32(row), 1.0, label, None)
            })
            .collect();
        model.fit(&mut training);

        Ok(Box::new(GbdtModel { scaler, model }))
    }
}

// ---------------------------------------------------------------------------
// aprender models
// ---------------------------------------------------------------------------

/// Dense `f32` copy of scaled rows, the input aprender estimators take.
fn dense(rows: &[Vec<f64>], n_features: usize) -> ClassifierResult<DenseMatrix<f32>> {
    let data: Vec<f32> = rows.iter().flatten().map(|&v| v as f32).collect();
    DenseMatrix::from_vec(rows.len(), n_features, data)
        .map_err(|e| ClassifierError::Backend(format!("cannot build matrix: {}", e)))
}

fn class_labels(y: &[bool]) -> Vec<usize> {
    y.iter().map(|&b| usize::from(b)).collect()
}

/// Scale one row and wrap it as a 1×d matrix.
fn single_row(scaler: &MinMaxScaler, row: &[f64]) -> Option<DenseMatrix<f32>> {
    let scaled = scaler.transform(row);
    let width = scaled.len();
    dense(&[scaled], width).ok()
}

/// Random forest (aprender), the tree ensemble the defect literature uses.
#[derive(Debug, Clone)]
pub struct RandomForest {
    pub trees: usize,
    pub max_depth: usize,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self {
            trees: 100,
            max_depth: 10,
        }
    }
}

struct RandomForestModel {
    scaler: MinMaxScaler,
    forest: RandomForestClassifier,
}

impl Model for RandomForestModel {
    // The forest answers with the majority class, so this is 0 or 1.
    fn predict_proba(&self, row: &[f64]) -> f64 {
        let Some(x) = single_row(&self.scaler, row) else {
            return 0.0;
        };
        self.forest.predict(&x).first().map_or(0.0, |&class| class as f64)
    }
}

impl Classifier for RandomForest {
    fn name(&self) -> &str {
        "random-forest"
    }

    fn fit(&self, x: &Matrix, y: &[bool], seed: u64) -> ClassifierResult<Box<dyn Model>> {
        check_shape(x, y)?;
        if let Some(p) = single_class(y) {
            return Ok(Box::new(ConstantModel(p)));
        }
        let scaler = MinMaxScaler::fit(x);
        let train = dense(&scaler.transform_all(x), x.n_features())?;

        let mut forest = RandomForestClassifier::new(self.trees)
            .with_max_depth(self.max_depth)
            .with_random_state(seed);
        forest
            .fit(&train, &class_labels(y))
            .map_err(|e| ClassifierError::Backend(format!("random forest: {}", e)))?;

        Ok(Box::new(RandomForestModel { scaler, forest }))
    }
}

/// Gaussian naive Bayes (aprender).
#[derive(Debug, Clone, Default)]
pub struct NaiveBayes;

struct NaiveBayesModel {
    scaler: MinMaxScaler,
    model: GaussianNB,
}

impl Model for NaiveBayesModel {
    fn predict_proba(&self, row: &[f64]) -> f64 {
        let Some(x) = single_row(&self.scaler, row) else {
            return 0.0;
        };
        match self.model.predict_proba(&x) {
            // classes are 0 (clean) and 1 (buggy), in that order
            Ok(probabilities) => probabilities
                .first()
                .and_then(|p| p.get(1))
                .map_or(0.0, |&p| f64::from(p)),
            Err(e) => {
                debug!("naive Bayes prediction failed: {}", e);
                0.0
            }
        }
    }
}

impl Classifier for NaiveBayes {
    fn name(&self) -> &str {
        "naive-bayes"
    }

    fn fit(&self, x: &Matrix, y: &[bool], _seed: u64) -> ClassifierResult<Box<dyn Model>> {
        check_shape(x, y)?;
        if let Some(p) = single_class(y) {
            return Ok(Box::new(ConstantModel(p)));
        }
        let scaler = MinMaxScaler::fit(x);
        let train = dense(&scaler.transform_all(x), x.n_features())?;

        let mut model = GaussianNB::new();
        model
            .fit(&train, &class_labels(y))
            .map_err(|e| ClassifierError::Backend(format!("naive Bayes: {}", e)))?;

        Ok(Box::new(NaiveBayesModel { scaler, model }))
    }
}

/// k-nearest neighbours (aprender), k = 1 like IBk.
#[derive(Debug, Clone)]
pub struct KNearest {
    pub k: usize,
}

impl Default for KNearest {
    fn default() -> Self {
        Self { k: 1 }
    }
}

struct KNearestModel {
    scaler: MinMaxScaler,
    model: KNearestNeighbors,
}

impl Model for KNearestModel {
    fn predict_proba(&self, row: &[f64]) -> f64 {
        let Some(x) = single_row(&self.scaler, row) else {
            return 0.0;
        };
        match self.model.predict(&x) {
            Ok(classes) => classes.first().map_or(0.0, |&class| class as f64),
            Err(e) => {
                debug!("kNN prediction failed: {}", e);
                0.0
            }
        }
    }
}

impl Classifier for KNearest {
    fn name(&self) -> &str {
        "knn"
    }

    fn fit(&self, x: &Matrix, y: &[bool], _seed: u64) -> ClassifierResult<Box<dyn Model>> {
        check_shape(x, y)?;
        if let Some(p) = single_class(y) {
            return Ok(Box::new(ConstantModel(p)));
        }
        let scaler = MinMaxScaler::fit(x);
        let train = dense(&scaler.transform_all(x), x.n_features())?;

        let mut model = KNearestNeighbors::new(self.k.clamp(1, x.n_rows()));
        model
            .fit(&train, &class_labels(y))
            .map_err(|e| ClassifierError::Backend(format!("kNN: {}", e)))?;

        Ok(Box::new(KNearestModel { scaler, model }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Buggy rows have a large first feature.
    fn separable() -> (Matrix, Vec<bool>) {
        let rows = vec![
            vec![1.0, 5.0],
            vec![2.0, 3.0],
            vec![3.0, 4.0],
            vec![20.0, 4.0],
            vec![22.0, 5.0],
            vec![25.0, 3.0],
        ];
        let y = vec![false, false, false, true, true, true];
        (Matrix::new(vec!["a".into(), "b".into()], rows), y)
    }

    #[test]
    fn test_scaler_uses_training_range() {
        let (x, _) = separable();
        let scaler = MinMaxScaler::fit(&x);
        assert_eq!(scaler.transform(&[1.0, 3.0]), vec![0.0, 0.0]);
        assert_eq!(scaler.transform(&[25.0, 5.0]), vec![1.0, 1.0]);
        // outside the training range is not clamped
        assert!(scaler.transform(&[49.0, 4.0])[0] > 1.9);
    }

    #[test]
    fn test_constant_column_scales_to_zero() {
        let x = Matrix::new(vec!["c".into()], vec![vec![7.0], vec![7.0]]);
        assert_eq!(MinMaxScaler::fit(&x).transform(&[9.0]), vec![0.0]);
    }

    #[test]
    fn test_classifiers_separate_easy_data() {
        let (x, y) = separable();
        for name in CLASSIFIER_NAMES {
            let model = classifier_by_name(name).unwrap().fit(&x, &y, 7).unwrap();
            assert!(model.predict_proba(&[24.0, 4.0]) > 0.5, "{} buggy", name);
            assert!(model.predict_proba(&[1.5, 4.0]) < 0.5, "{} clean", name);
        }
    }

    #[test]
    fn test_knn_follows_the_nearest_row() {
        let x = Matrix::new(vec!["a".into()], vec![vec![0.0], vec![10.0], vec![11.0]]);
        let y = vec![true, false, false];
        let model = KNearest::default().fit(&x, &y, 0).unwrap();
        assert_eq!(model.predict_proba(&[1.0]), 1.0);
        assert_eq!(model.predict_proba(&[9.0]), 0.0);
    }

    #[test]
    fn test_predictions_are_probabilities() {
        let (x, y) = separable();
        for name in CLASSIFIER_NAMES {
            let model = classifier_by_name(name).unwrap().fit(&x, &y, 3).unwrap();
            for point in [[0.0, 0.0], [13.0, 4.0], [40.0, 9.0]] {
                let p = model.predict_proba(&point);
                assert!((0.0..=1.0).contains(&p), "{} gave {}", name, p);
            }
        }
    }

    #[test]
    fn test_forest_is_seeded() {
        let (x, y) = separable();
        let a = RandomForest::default().fit(&x, &y, 11).unwrap();
        let b = RandomForest::default().fit(&x, &y, 11).unwrap();
        for v in [0.0, 8.0, 12.0, 16.0, 30.0] {
            assert_eq!(a.predict_proba(&[v, 4.0]), b.predict_proba(&[v, 4.0]));
        }
    }

    #[test]
    fn test_single_class_training() {
        let x = Matrix::new(vec!["a".into()], vec![vec![1.0], vec![2.0]]);
        for name in CLASSIFIER_NAMES {
            let model = classifier_by_name(name).unwrap().fit(&x, &[false, false], 0).unwrap();
            assert_eq!(model.predict_proba(&[3.0]), 0.0, "{}", name);
        }
    }

    #[test]
    fn test_unknown_classifier_is_an_error() {
        assert!(matches!(
            classifier_by_name("svm"),
            Err(ClassifierError::Unknown(name)) if name == "svm"
        ));
    }

    #[test]
    fn test_shape_mismatch() {
        let (x, _) = separable();
        assert!(matches!(
            NaiveBayes.fit(&x, &[true], 0),
            Err(ClassifierError::LengthMismatch { rows: 6, labels: 1 })
        ));
    }
}
