//! CSV output of fold results
//!
//! NaN metrics are written as empty cells.

use super::correlation::FeatureCorrelation;
use super::experiment::ExperimentRow;
use super::validation::FoldResult;
use crate::dataset::DatasetResult;
use std::io::Write;

const FOLD_HEADERS: [&str; 8] = [
    "ReleaseIndex",
    "Precision",
    "Recall",
    "FMeasure",
    "AUC",
    "Kappa",
    "NPofB20",
    "SelectedFeatures",
];

const CONFIG_HEADERS: [&str; 4] = ["Classifier", "FeatureSelection", "Sampling", "Run"];

fn metric(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        format!("{:.6}", value)
    }
}

fn fold_cells(fold: &FoldResult) -> Vec<String> {
    let m = &fold.metrics;
    vec![
        fold.release_index.to_string(),
        metric(m.precision),
        metric(m.recall),
        metric(m.f_measure),
        metric(m.auc),
        metric(m.kappa),
        metric(m.npofb20),
        fold.selected_features.join(";"),
    ]
}

pub fn write_folds<W: Write>(writer: W, folds: &[FoldResult]) -> DatasetResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(FOLD_HEADERS)?;
    for fold in folds {
        csv_writer.write_record(fold_cells(fold))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_experiment<W: Write>(writer: W, rows: &[ExperimentRow]) -> DatasetResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CONFIG_HEADERS.iter().chain(FOLD_HEADERS.iter()))?;
    for row in rows {
        let mut record = vec![
            row.classifier.clone(),
            row.feature_selection.clone(),
            row.sampling.clone(),
            row.run.to_string(),
        ];
        record.extend(fold_cells(&row.fold));
        csv_writer.write_record(record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_correlations<W: Write>(writer: W, rows: &[FeatureCorrelation]) -> DatasetResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["Feature", "Pearson", "Spearman"])?;
    for row in rows {
        csv_writer.write_record([row.feature.clone(), metric(row.pearson), metric(row.spearman)])?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::evaluation::EvaluationMetrics;

    fn fold(auc: f64) -> FoldResult {
        FoldResult {
            release_index: 3,
            train_rows: 10,
            test_rows: 4,
            resampled_train_rows: 10,
            test_buggy: 0,
            metrics: EvaluationMetrics {
                precision: 0.0,
                recall: 0.0,
                f_measure: 0.0,
                auc,
                kappa: 1.0,
                npofb20: 0.0,
            },
            selected_features: vec!["LOC".into(), "NR".into()],
        }
    }

    #[test]
    fn test_nan_auc_is_an_empty_cell() {
        let mut out = Vec::new();
        write_folds(&mut out, &[fold(f64::NAN)]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let line = text.lines().nth(1).unwrap();
        assert_eq!(line, "3,0.000000,0.000000,0.000000,,1.000000,0.000000,LOC;NR");
    }

    #[test]
    fn test_experiment_headers() {
        let row = ExperimentRow {
            classifier: "gbdt".into(),
            feature_selection: "none".into(),
            sampling: "smote".into(),
            run: 1,
            fold: fold(0.75),
        };
        let mut out = Vec::new();
        write_experiment(&mut out, &[row]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Classifier,FeatureSelection,Sampling,Run,ReleaseIndex,Precision,Recall,FMeasure,AUC,Kappa,NPofB20,SelectedFeatures"
        );
        assert!(lines.next().unwrap().starts_with("gbdt,none,smote,1,3,"));
    }

    #[test]
    fn test_correlation_report() {
        let rows = vec![FeatureCorrelation {
            feature: "LOC".to_string(),
            pearson: 0.5,
            spearman: -0.25,
        }];
        let mut out = Vec::new();
        write_correlations(&mut out, &rows).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Feature,Pearson,Spearman\nLOC,0.500000,-0.250000\n"
        );
    }
}
