//! Class balancing for training folds
//!
//! Samplers only ever see training rows. A single-class or already
//! balanced training set is returned unchanged.

use crate::dataset::Matrix;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::debug;

/// Names accepted by [`sampler_by_name`].
pub const SAMPLING_NAMES: [&str; 3] = ["none", "undersampling", "smote"];

#[derive(Error, Debug)]
pub enum SamplingError {
    #[error("unknown sampling '{0}'")]
    Unknown(String),

    #[error("{rows} rows but {labels} labels")]
    LengthMismatch { rows: usize, labels: usize },
}

pub type SamplingResult<T> = Result<T, SamplingError>;

pub trait Sampler: Send + Sync {
    fn name(&self) -> &str;

    fn resample(&self, x: &Matrix, y: &[bool], seed: u64) -> SamplingResult<(Matrix, Vec<bool>)>;
}

/// Map a config name to a sampler.
pub fn sampler_by_name(name: &str) -> SamplingResult<Box<dyn Sampler>> {
    match name.to_ascii_lowercase().as_str() {
        "none" | "" => Ok(Box::new(NoSampling)),
        "undersampling" | "spread-subsample" => Ok(Box::new(Undersampling)),
        "smote" => Ok(Box::new(Smote::default())),
        _ => Err(SamplingError::Unknown(name.to_string())),
    }
}

/// Row indices of the minority and majority class, or `None` when there
/// is nothing to balance.
fn classes(y: &[bool]) -> Option<(Vec<usize>, Vec<usize>)> {
    let (buggy, clean): (Vec<usize>, Vec<usize>) = (0..y.len()).partition(|&i| y[i]);
    if buggy.is_empty() || clean.is_empty() || buggy.len() == clean.len() {
        return None;
    }
    if buggy.len() < clean.len() {
        Some((buggy, clean))
    } else {
        Some((clean, buggy))
    }
}

fn check_shape(x: &Matrix, y: &[bool]) -> SamplingResult<()> {
    if x.n_rows() != y.len() {
        return Err(SamplingError::LengthMismatch {
            rows: x.n_rows(),
            labels: y.len(),
        });
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct NoSampling;

impl Sampler for NoSampling {
    fn name(&self) -> &str {
        "none"
    }

    fn resample(&self, x: &Matrix, y: &[bool], _seed: u64) -> SamplingResult<(Matrix, Vec<bool>)> {
        check_shape(x, y)?;
        Ok((x.clone(), y.to_vec()))
    }
}

/// Random 1:1 subsample of the majority class.
#[derive(Debug, Default)]
pub struct Undersampling;

impl Sampler for Undersampling {
    fn name(&self) -> &str {
        "undersampling"
    }

    fn resample(&self, x: &Matrix, y: &[bool], seed: u64) -> SamplingResult<(Matrix, Vec<bool>)> {
        check_shape(x, y)?;
        let Some((minority, mut majority)) = classes(y) else {
            return Ok((x.clone(), y.to_vec()));
        };

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        majority.shuffle(&mut rng);
        majority.truncate(minority.len());

        let mut keep: Vec<usize> = minority.into_iter().chain(majority).collect();
        keep.sort_unstable();
        debug!(before = y.len(), after = keep.len(), "Undersampled training fold");

        let rows = keep.iter().map(|&i| x.rows[i].clone()).collect();
        let labels = keep.iter().map(|&i| y[i]).collect();
        Ok((Matrix::new(x.columns.clone(), rows), labels))
    }
}

/// Synthetic minority over-sampling up to balance.
#[derive(Debug, Clone)]
pub struct Smote {
    pub k: usize,
}

impl Default for Smote {
    fn default() -> Self {
        Self { k: 5 }
    }
}

impl Smote {
    /// Up to `k` nearest other minority rows of `row`, closest first.
    fn neighbours(&self, x: &Matrix, minority: &[usize], row: usize) -> Vec<usize> {
        let mut distances: Vec<(f64, usize)> = minority
            .iter()
            .filter(|&&i| i != row)
            .map(|&i| {
                let d: f64 = x.rows[i]
                    .iter()
                    .zip(&x.rows[row])
                    .map(|(a, b)| (a - b).powi(2))
                    .sum();
                (d, i)
            })
            .collect();
        distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        distances.into_iter().take(self.k).map(|(_, i)| i).collect()
    }
}

impl Sampler for Smote {
    fn name(&self) -> &str {
        "smote"
    }

    fn resample(&self, x: &Matrix, y: &[bool], seed: u64) -> SamplingResult<(Matrix, Vec<bool>)> {
        check_shape(x, y)?;
        let Some((minority, majority)) = classes(y) else {
            return Ok((x.clone(), y.to_vec()));
        };
        if minority.len() < 2 {
            debug!("Single minority row, nothing to interpolate");
            return Ok((x.clone(), y.to_vec()));
        }

        let minority_label = y[minority[0]];
        let needed = majority.len() - minority.len();
        let neighbours: Vec<Vec<usize>> = minority
            .iter()
            .map(|&i| self.neighbours(x, &minority, i))
            .collect();

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut rows = x.rows.clone();
        let mut labels = y.to_vec();
        for n in 0..needed {
            // walk the minority rows round-robin
            let slot = n % minority.len();
            let base = &x.rows[minority[slot]];
            let candidates = &neighbours[slot];
            let Some(&other) = candidates.get(rng.random_range(0..candidates.len())) else {
                continue;
            };
            let gap: f64 = rng.random();
            let synthetic = base
                .iter()
                .zip(&x.rows[other])
                .map(|(a, b)| a + gap * (b - a))
                .collect();
            rows.push(synthetic);
            labels.push(minority_label);
        }
        debug!(before = y.len(), after = labels.len(), "SMOTE training fold");
        Ok((Matrix::new(x.columns.clone(), rows), labels))
    }
}
