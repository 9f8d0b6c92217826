//! Tabular datasets
//!
//! A [`Table`] is the row/column view of a CSV file with string cells. The
//! validator reads the method-per-release dataset into one, slices it by
//! release index and converts the feature columns into a numeric
//! [`Matrix`].

pub mod builder;
pub mod snoring;

pub use builder::{DatasetBuilder, DatasetSummary};
pub use snoring::SnoringControl;

use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("missing required column '{0}'")]
    MissingColumn(String),

    #[error("non-numeric value '{value}' in column '{column}' at row {row}")]
    NonNumeric {
        column: String,
        row: usize,
        value: String,
    },

    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("label column '{column}' has {classes} classes, expected two")]
    NotBinary { column: String, classes: usize },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DatasetResult<T> = Result<T, DatasetError>;

/// Dense numeric rows with named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Matrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl Matrix {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        Self { columns, rows }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, idx: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(move |r| r[idx])
    }

    /// Keep only `indices`, in that order.
    pub fn select_columns(&self, indices: &[usize]) -> Matrix {
        Matrix {
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| indices.iter().map(|&i| r[i]).collect())
                .collect(),
        }
    }
}

/// String-celled table as read from CSV.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<String>) -> DatasetResult<()> {
        if row.len() != self.headers.len() {
            return Err(DatasetError::RaggedRow {
                row: self.rows.len(),
                found: row.len(),
                expected: self.headers.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn from_reader<R: Read>(reader: R) -> DatasetResult<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let headers = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut table = Table::new(headers);
        for record in csv_reader.records() {
            let record = record?;
            table.push_row(record.iter().map(str::to_string).collect())?;
        }
        Ok(table)
    }

    pub fn read_csv(path: &Path) -> DatasetResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> DatasetResult<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(&self.headers)?;
        for row in &self.rows {
            csv_writer.write_record(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn write_csv(&self, path: &Path) -> DatasetResult<()> {
        let file = std::fs::File::create(path)?;
        self.to_writer(std::io::BufWriter::new(file))
    }

    pub fn column_index(&self, name: &str) -> DatasetResult<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| DatasetError::MissingColumn(name.to_string()))
    }

    pub fn numeric_column(&self, name: &str) -> DatasetResult<Vec<f64>> {
        let idx = self.column_index(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row, cells)| parse_cell(name, row, &cells[idx]))
            .collect()
    }

    /// Boolean view of `name`: true where the cell equals `positive`.
    ///
    /// Fails when the column holds more than two distinct values, compared
    /// case-insensitively like the match itself.
    pub fn binary_column(&self, name: &str, positive: &str) -> DatasetResult<Vec<bool>> {
        let idx = self.column_index(name)?;
        let mut distinct: Vec<String> = self
            .rows
            .iter()
            .map(|r| r[idx].trim().to_ascii_lowercase())
            .collect();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() > 2 {
            return Err(DatasetError::NotBinary {
                column: name.to_string(),
                classes: distinct.len(),
            });
        }
        Ok(self
            .rows
            .iter()
            .map(|r| r[idx].trim().eq_ignore_ascii_case(positive))
            .collect())
    }

    /// Rows for which `keep(row_index)` holds.
    pub fn select_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(usize) -> bool,
    {
        Table {
            headers: self.headers.clone(),
            rows: self
                .rows
                .iter()
                .enumerate()
                .filter(|(i, _)| keep(*i))
                .map(|(_, r)| r.clone())
                .collect(),
        }
    }

    /// Table without the named columns; unknown names are ignored.
    pub fn drop_columns(&self, names: &[String]) -> Table {
        let keep: Vec<usize> = (0..self.headers.len())
            .filter(|&i| !names.contains(&self.headers[i]))
            .collect();
        Table {
            headers: keep.iter().map(|&i| self.headers[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| keep.iter().map(|&i| r[i].clone()).collect())
                .collect(),
        }
    }

    /// Every column as numbers.
    pub fn to_matrix(&self) -> DatasetResult<Matrix> {
        let rows = self
            .rows
            .iter()
            .enumerate()
            .map(|(row, cells)| {
                cells
                    .iter()
                    .zip(&self.headers)
                    .map(|(cell, column)| parse_cell(column, row, cell))
                    .collect::<DatasetResult<Vec<f64>>>()
            })
            .collect::<DatasetResult<Vec<_>>>()?;
        Ok(Matrix::new(self.headers.clone(), rows))
    }
}

/// Finite number in `cell`; `NaN` and infinities count as non-numeric.
fn parse_cell(column: &str, row: usize, cell: &str) -> DatasetResult<f64> {
    match cell.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(DatasetError::NonNumeric {
            column: column.to_string(),
            row,
            value: cell.to_string(),
        }),
    }
}
