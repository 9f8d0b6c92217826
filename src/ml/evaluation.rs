//! Fold evaluation metrics
//!
//! Hard predictions use a 0.5 threshold on P(buggy). Precision, recall and
//! F-measure are reported as 0 when their denominator is 0. AUC is NaN when
//! the fold holds a single class.

use serde::Serialize;

pub const DECISION_THRESHOLD: f64 = 0.5;

/// Share of total LOC inspected for NPofB20.
pub const EFFORT_BUDGET: f64 = 0.2;

/// Confusion matrix for the buggy class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    pub r#fn: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(predictions: &[bool], ground_truth: &[bool]) -> Self {
        let mut matrix = Self::default();
        for (pred, truth) in predictions.iter().zip(ground_truth) {
            match (pred, truth) {
                (true, true) => matrix.tp += 1,
                (false, false) => matrix.tn += 1,
                (true, false) => matrix.fp += 1,
                (false, true) => matrix.r#fn += 1,
            }
        }
        matrix
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.r#fn
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.r#fn)
    }

    pub fn f_measure(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            return 0.0;
        }
        2.0 * p * r / (p + r)
    }

    /// Cohen's kappa. Complete chance agreement counts as 1.
    pub fn kappa(&self) -> f64 {
        let n = self.total() as f64;
        if n == 0.0 {
            return 0.0;
        }
        let observed = (self.tp + self.tn) as f64 / n;
        let predicted_pos = (self.tp + self.fp) as f64;
        let actual_pos = (self.tp + self.r#fn) as f64;
        let chance = (predicted_pos * actual_pos + (n - predicted_pos) * (n - actual_pos)) / (n * n);
        if chance < 1.0 {
            (observed - chance) / (1.0 - chance)
        } else {
            1.0
        }
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

/// ROC AUC by the trapezoid rule over distinct score thresholds.
pub fn roc_auc(scores: &[f64], ground_truth: &[bool]) -> f64 {
    let positives = ground_truth.iter().filter(|&&t| t).count();
    let negatives = ground_truth.len() - positives;
    if positives == 0 || negatives == 0 {
        return f64::NAN;
    }

    let mut ranked: Vec<(f64, bool)> = scores.iter().copied().zip(ground_truth.iter().copied()).collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    let (mut tp, mut fp) = (0usize, 0usize);
    let (mut prev_tpr, mut prev_fpr) = (0.0, 0.0);
    let mut area = 0.0;
    let mut i = 0;
    while i < ranked.len() {
        // consume every row sharing this score, at least one
        let score = ranked[i].0;
        let start = i;
        while i < ranked.len() && (i == start || ranked[i].0.total_cmp(&score).is_eq()) {
            if ranked[i].1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        let tpr = tp as f64 / positives as f64;
        let fpr = fp as f64 / negatives as f64;
        area += (fpr - prev_fpr) * (tpr + prev_tpr) / 2.0;
        prev_tpr = tpr;
        prev_fpr = fpr;
    }
    area
}

/// Normalized share of bugs found within 20% of the fold's LOC.
///
/// Rows are ranked by probability, descending, ties in input order. A row is
/// inspected while the LOC inspected before it is below the budget. A fold
/// without bugs scores 0.
pub fn npofb20(probabilities: &[f64], loc: &[f64], ground_truth: &[bool]) -> f64 {
    let total_bugs = ground_truth.iter().filter(|&&t| t).count();
    if total_bugs == 0 {
        return 0.0;
    }
    let budget = loc.iter().sum::<f64>() * EFFORT_BUDGET;

    let mut order: Vec<usize> = (0..probabilities.len()).collect();
    order.sort_by(|&a, &b| probabilities[b].total_cmp(&probabilities[a]));

    let mut inspected = 0.0;
    let mut found = 0;
    for i in order {
        if inspected >= budget {
            break;
        }
        inspected += loc[i];
        if ground_truth[i] {
            found += 1;
        }
    }
    found as f64 / total_bugs as f64
}

/// Everything reported for one evaluated fold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvaluationMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f_measure: f64,
    pub auc: f64,
    pub kappa: f64,
    pub npofb20: f64,
}

impl EvaluationMetrics {
    pub fn compute(probabilities: &[f64], ground_truth: &[bool], loc: &[f64]) -> Self {
        let predictions: Vec<bool> = probabilities.iter().map(|&p| p >= DECISION_THRESHOLD).collect();
        let confusion = ConfusionMatrix::from_predictions(&predictions, ground_truth);
        Self {
            precision: confusion.precision(),
            recall: confusion.recall(),
            f_measure: confusion.f_measure(),
            auc: roc_auc(probabilities, ground_truth),
            kappa: confusion.kappa(),
            npofb20: npofb20(probabilities, loc, ground_truth),
        }
    }
}
