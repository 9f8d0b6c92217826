//! Feature selection
//!
//! A selector is fit on training rows only and returns the indices of the
//! columns to keep, ascending. The caller applies the same indices to the
//! test rows.

use crate::dataset::Matrix;
use std::collections::HashSet;
use thiserror::Error;

/// Names accepted by [`selector_by_name`].
pub const SELECTION_NAMES: [&str; 3] = ["none", "info-gain", "best-first"];

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("unknown feature selection '{0}'")]
    Unknown(String),

    #[error("no training rows")]
    EmptyTrainingSet,

    #[error("{rows} rows but {labels} labels")]
    LengthMismatch { rows: usize, labels: usize },
}

pub type SelectionResult<T> = Result<T, SelectionError>;

pub trait FeatureSelector: Send + Sync {
    fn name(&self) -> &str;

    fn fit(&self, x: &Matrix, y: &[bool]) -> SelectionResult<Vec<usize>>;
}

/// Map a config name to a selector.
pub fn selector_by_name(name: &str) -> SelectionResult<Box<dyn FeatureSelector>> {
    match name.to_ascii_lowercase().as_str() {
        "none" | "" => Ok(Box::new(NoSelection)),
        "info-gain" | "infogain" => Ok(Box::new(InfoGain::default())),
        "best-first" | "bestfirst" | "cfs" => Ok(Box::new(BestFirstCfs::default())),
        _ => Err(SelectionError::Unknown(name.to_string())),
    }
}

fn check_shape(x: &Matrix, y: &[bool]) -> SelectionResult<()> {
    if x.n_rows() != y.len() {
        return Err(SelectionError::LengthMismatch {
            rows: x.n_rows(),
            labels: y.len(),
        });
    }
    if x.is_empty() {
        return Err(SelectionError::EmptyTrainingSet);
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct NoSelection;

impl FeatureSelector for NoSelection {
    fn name(&self) -> &str {
        "none"
    }

    fn fit(&self, x: &Matrix, _y: &[bool]) -> SelectionResult<Vec<usize>> {
        Ok((0..x.n_features()).collect())
    }
}

fn entropy(buggy: usize, total: usize) -> f64 {
    if total == 0 || buggy == 0 || buggy == total {
        return 0.0;
    }
    let p = buggy as f64 / total as f64;
    -(p * p.log2() + (1.0 - p) * (1.0 - p).log2())
}

/// Equal-frequency cut points for `values`.
fn cut_points(values: &[f64], bins: usize) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut cuts: Vec<f64> = (1..bins)
        .map(|b| sorted[(b * sorted.len() / bins).min(sorted.len() - 1)])
        .collect();
    cuts.dedup();
    cuts
}

/// Ranks columns by information gain with respect to the label.
#[derive(Debug, Clone)]
pub struct InfoGain {
    pub bins: usize,
    pub top: usize,
}

impl Default for InfoGain {
    fn default() -> Self {
        Self { bins: 10, top: 10 }
    }
}

impl InfoGain {
    pub fn gain(&self, values: &[f64], y: &[bool]) -> f64 {
        let total = y.len();
        let buggy = y.iter().filter(|&&b| b).count();
        let cuts = cut_points(values, self.bins.max(1));

        // (rows, buggy rows) per bin
        let mut counts = vec![(0usize, 0usize); cuts.len() + 1];
        for (&v, &label) in values.iter().zip(y) {
            let bin = cuts.partition_point(|&c| c <= v);
            counts[bin].0 += 1;
            if label {
                counts[bin].1 += 1;
            }
        }

        let conditional: f64 = counts
            .iter()
            .map(|&(n, b)| n as f64 / total as f64 * entropy(b, n))
            .sum();
        entropy(buggy, total) - conditional
    }
}

impl FeatureSelector for InfoGain {
    fn name(&self) -> &str {
        "info-gain"
    }

    fn fit(&self, x: &Matrix, y: &[bool]) -> SelectionResult<Vec<usize>> {
        check_shape(x, y)?;
        let mut ranked: Vec<(usize, f64)> = (0..x.n_features())
            .map(|j| {
                let column: Vec<f64> = x.column(j).collect();
                (j, self.gain(&column, y))
            })
            .filter(|(_, g)| *g > 1e-12)
            .collect();
        if ranked.is_empty() {
            return Ok((0..x.n_features()).collect());
        }
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        let mut kept: Vec<usize> = ranked.into_iter().take(self.top).map(|(j, _)| j).collect();
        kept.sort_unstable();
        Ok(kept)
    }
}

/// Pearson correlation; 0 when either side is constant.
pub(crate) fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return 0.0;
    }
    cov / (var_a * var_b).sqrt()
}

/// Correlation-based subset evaluation searched best-first, forward.
#[derive(Debug, Clone)]
pub struct BestFirstCfs {
    /// Consecutive non-improving expansions before the search stops
    pub max_stale: usize,
}

impl Default for BestFirstCfs {
    fn default() -> Self {
        Self { max_stale: 5 }
    }
}

struct Correlations {
    class: Vec<f64>,
    features: Vec<Vec<f64>>,
}

impl Correlations {
    fn new(x: &Matrix, y: &[bool]) -> Self {
        let label: Vec<f64> = y.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect();
        let columns: Vec<Vec<f64>> = (0..x.n_features()).map(|j| x.column(j).collect()).collect();
        let class = columns.iter().map(|c| pearson(c, &label).abs()).collect();
        let features = columns
            .iter()
            .map(|a| columns.iter().map(|b| pearson(a, b).abs()).collect())
            .collect();
        Self { class, features }
    }

    fn merit(&self, subset: &[usize]) -> f64 {
        let k = subset.len() as f64;
        if subset.is_empty() {
            return 0.0;
        }
        let rcf: f64 = subset.iter().map(|&j| self.class[j]).sum();
        let mut rff = 0.0;
        for (pos, &a) in subset.iter().enumerate() {
            for &b in &subset[pos + 1..] {
                rff += self.features[a][b];
            }
        }
        let denominator = (k + 2.0 * rff).sqrt();
        if denominator == 0.0 {
            0.0
        } else {
            rcf / denominator
        }
    }
}

impl FeatureSelector for BestFirstCfs {
    fn name(&self) -> &str {
        "best-first"
    }

    fn fit(&self, x: &Matrix, y: &[bool]) -> SelectionResult<Vec<usize>> {
        check_shape(x, y)?;
        let n = x.n_features();
        let correlations = Correlations::new(x, y);

        let mut open: Vec<(f64, Vec<usize>)> = vec![(0.0, Vec::new())];
        let mut visited: HashSet<Vec<usize>> = HashSet::new();
        let mut best: (f64, Vec<usize>) = (0.0, Vec::new());
        let mut stale = 0;

        while stale < self.max_stale {
            // highest merit first, smaller subsets win ties
            let Some(pos) = open
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.0.total_cmp(&b.0).then(b.1.len().cmp(&a.1.len())))
                .map(|(i, _)| i)
            else {
                break;
            };
            let (_, subset) = open.swap_remove(pos);

            let mut improved = false;
            for j in 0..n {
                if subset.contains(&j) {
                    continue;
                }
                let mut child = subset.clone();
                child.push(j);
                child.sort_unstable();
                if !visited.insert(child.clone()) {
                    continue;
                }
                let merit = correlations.merit(&child);
                if merit > best.0 + 1e-12 {
                    best = (merit, child.clone());
                    improved = true;
                }
                open.push((merit, child));
            }
            stale = if improved { 0 } else { stale + 1 };
        }

        if best.1.is_empty() {
            return Ok((0..n).collect());
        }
        Ok(best.1)
    }
}
