//! Feature-to-label correlation of a dataset
//!
//! Each feature column is compared with the 0/1 label using Pearson's r on
//! the raw values and Spearman's rho on their ranks. Tied values share the
//! average of the ranks they span.

use super::selection::pearson;
use super::validation::{ValidationError, ValidationResult, ValidationSettings};
use crate::dataset::Table;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCorrelation {
    pub feature: String,
    pub pearson: f64,
    pub spearman: f64,
}

/// 1-based ranks of `values`, ties averaged.
pub fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut out = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end hold ranks start+1..=end
        let rank = (start + end + 1) as f64 / 2.0;
        for &i in &order[start..end] {
            out[i] = rank;
        }
        start = end;
    }
    out
}

pub fn spearman(a: &[f64], b: &[f64]) -> f64 {
    pearson(&ranks(a), &ranks(b))
}

/// Correlation of every feature column with the label, strongest
/// |Spearman| first. Columns the validator ignores are left out.
pub fn correlate(
    table: &Table,
    settings: &ValidationSettings,
) -> ValidationResult<Vec<FeatureCorrelation>> {
    if table.is_empty() {
        return Err(ValidationError::EmptyDataset);
    }
    let label: Vec<f64> = table
        .binary_column(&settings.label_column, &settings.buggy_label)?
        .into_iter()
        .map(|b| if b { 1.0 } else { 0.0 })
        .collect();

    let mut excluded = settings.metadata_columns.clone();
    excluded.push(settings.release_index_column.clone());
    excluded.push(settings.label_column.clone());
    let features = table.drop_columns(&excluded).to_matrix()?;

    let mut rows: Vec<FeatureCorrelation> = features
        .columns
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let column: Vec<f64> = features.column(j).collect();
            FeatureCorrelation {
                feature: name.clone(),
                pearson: pearson(&column, &label),
                spearman: spearman(&column, &label),
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.spearman
            .abs()
            .total_cmp(&a.spearman.abs())
            .then_with(|| a.feature.cmp(&b.feature))
    });
    debug!(features = rows.len(), "Correlated features with label");
    Ok(rows)
}
