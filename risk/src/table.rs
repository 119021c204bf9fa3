//! Wide tables and labelled matrices
//!
//! - [`SeriesTable`]: one row per trading date, one column per instrument.
//!   Used for both prices and returns; missing observations are `NaN`.
//! - [`LabeledMatrix`]: square matrix with the same labels on both axes.
//!   Used for covariance and correlation matrices.
//!
//! Both types are immutable: every transform returns a new value.

use crate::error::{Result, RiskError};
use chrono::NaiveDate;
use nalgebra::DMatrix;
use std::collections::{HashMap, HashSet};

/// Wide date × instrument table
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesTable {
    dates: Vec<NaiveDate>,
    columns: Vec<String>,
    /// rows = dates, columns = instruments
    values: DMatrix<f64>,
}

/// Prices keyed by (date, instrument)
pub type PriceTable = SeriesTable;

/// Returns keyed by (date, instrument)
pub type ReturnTable = SeriesTable;

impl SeriesTable {
    /// Create a table from a value matrix
    ///
    /// Dates must be strictly increasing and column names unique.
    pub fn new(dates: Vec<NaiveDate>, columns: Vec<String>, values: DMatrix<f64>) -> Result<Self> {
        if values.nrows() != dates.len() || values.ncols() != columns.len() {
            return Err(RiskError::MatrixError(format!(
                "table values are {}x{}, expected {}x{}",
                values.nrows(),
                values.ncols(),
                dates.len(),
                columns.len()
            )));
        }

        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(RiskError::InvalidParameter(
                "dates must be strictly increasing".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let duplicates: Vec<String> = columns
            .iter()
            .filter(|c| !seen.insert(c.as_str()))
            .cloned()
            .collect();
        if !duplicates.is_empty() {
            return Err(RiskError::InvalidParameter(format!(
                "duplicate columns: {}",
                duplicates.join(", ")
            )));
        }

        Ok(Self {
            dates,
            columns,
            values,
        })
    }

    /// Create a table from named column vectors
    pub fn from_columns<S: Into<String>>(
        dates: Vec<NaiveDate>,
        columns: Vec<(S, Vec<f64>)>,
    ) -> Result<Self> {
        let n_rows = dates.len();
        let mut names = Vec::with_capacity(columns.len());
        let mut data = Vec::with_capacity(n_rows * columns.len());

        for (name, series) in columns {
            let name = name.into();
            if series.len() != n_rows {
                return Err(RiskError::MatrixError(format!(
                    "column {} has {} rows, expected {}",
                    name,
                    series.len(),
                    n_rows
                )));
            }
            data.extend(series);
            names.push(name);
        }

        // nalgebra storage is column-major, which matches the push order above
        let values = DMatrix::from_vec(n_rows, names.len(), data);
        Self::new(dates, names, values)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.dates.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Values of the column at `idx`, oldest first
    pub fn column_at(&self, idx: usize) -> Vec<f64> {
        self.values.column(idx).iter().copied().collect()
    }

    /// Values of the named column, oldest first
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        self.column_index(name).map(|idx| self.column_at(idx))
    }

    /// Names from `names` that are not columns of this table
    pub fn missing_columns<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        names
            .iter()
            .map(|n| n.as_ref())
            .filter(|name| !self.has_column(name))
            .map(str::to_string)
            .collect()
    }

    /// New table holding only the named columns, in the order given
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let missing = self.missing_columns(names);
        if !missing.is_empty() {
            return Err(RiskError::UnknownColumns(missing));
        }

        let columns: Vec<(String, Vec<f64>)> = names
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                self.column(name).map(|values| (name.to_string(), values))
            })
            .collect();

        Self::from_columns(self.dates.clone(), columns)
    }

    /// New table without the named columns; unknown names are ignored
    pub fn without_columns<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let drop: HashSet<&str> = names.iter().map(|n| n.as_ref()).collect();
        let keep: Vec<&str> = self
            .columns
            .iter()
            .map(String::as_str)
            .filter(|c| !drop.contains(c))
            .collect();

        let indices: Vec<usize> = keep.iter().filter_map(|c| self.column_index(c)).collect();
        let values = self.values.select_columns(indices.iter());

        Self {
            dates: self.dates.clone(),
            columns: keep.into_iter().map(str::to_string).collect(),
            values,
        }
    }

    /// New table with `values` appended as column `name`
    pub fn with_column(&self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        let mut columns: Vec<(String, Vec<f64>)> = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, c)| (c.clone(), self.column_at(idx)))
            .collect();
        columns.push((name.into(), values));
        Self::from_columns(self.dates.clone(), columns)
    }

    /// New table with every row multiplied by the matching weight
    pub fn scale_rows(&self, weights: &[f64]) -> Result<Self> {
        if weights.len() != self.n_rows() {
            return Err(RiskError::MatrixError(format!(
                "{} row weights for a table with {} rows",
                weights.len(),
                self.n_rows()
            )));
        }

        let values = DMatrix::from_fn(self.n_rows(), self.n_cols(), |i, j| {
            self.values[(i, j)] * weights[i]
        });

        Ok(Self {
            dates: self.dates.clone(),
            columns: self.columns.clone(),
            values,
        })
    }

    /// Restrict two tables to the dates they have in common
    pub fn align(&self, other: &Self) -> (Self, Self) {
        let other_rows: HashMap<NaiveDate, usize> = other
            .dates
            .iter()
            .enumerate()
            .map(|(idx, d)| (*d, idx))
            .collect();

        let (left, right): (Vec<usize>, Vec<usize>) = self
            .dates
            .iter()
            .enumerate()
            .filter_map(|(idx, d)| other_rows.get(d).map(|o| (idx, *o)))
            .unzip();

        (self.select_rows(&left), other.select_rows(&right))
    }

    fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            dates: rows.iter().map(|r| self.dates[*r]).collect(),
            columns: self.columns.clone(),
            values: self.values.select_rows(rows.iter()),
        }
    }
}

/// Square matrix labelled by instrument or factor on both axes
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledMatrix {
    labels: Vec<String>,
    index: HashMap<String, usize>,
    values: DMatrix<f64>,
}

/// Sample covariance of returns
pub type CovarianceMatrix = LabeledMatrix;

/// Pearson correlation of returns
pub type CorrelationMatrix = LabeledMatrix;

impl LabeledMatrix {
    pub fn new(labels: Vec<String>, values: DMatrix<f64>) -> Result<Self> {
        if !values.is_square() || values.nrows() != labels.len() {
            return Err(RiskError::MatrixError(format!(
                "{}x{} matrix does not match {} labels",
                values.nrows(),
                values.ncols(),
                labels.len()
            )));
        }

        let index: HashMap<String, usize> = labels
            .iter()
            .enumerate()
            .map(|(idx, l)| (l.clone(), idx))
            .collect();
        if index.len() != labels.len() {
            return Err(RiskError::InvalidParameter(
                "matrix labels must be unique".to_string(),
            ));
        }

        Ok(Self {
            labels,
            index,
            values,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    pub fn get(&self, row: &str, col: &str) -> Option<f64> {
        Some(self.values[(self.index_of(row)?, self.index_of(col)?)])
    }

    /// Matrix restricted to `labels`, in the order given
    pub fn submatrix<S: AsRef<str>>(&self, labels: &[S]) -> Result<Self> {
        let indices = self.indices_of(labels)?;
        let values = DMatrix::from_fn(indices.len(), indices.len(), |i, j| {
            self.values[(indices[i], indices[j])]
        });
        Self::new(labels.iter().map(|l| l.as_ref().to_string()).collect(), values)
    }

    /// Positions of `labels` along the axes
    pub fn indices_of<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>> {
        let mut indices = Vec::with_capacity(labels.len());
        let mut missing = Vec::new();
        for label in labels {
            match self.index_of(label.as_ref()) {
                Some(idx) => indices.push(idx),
                None => missing.push(label.as_ref().to_string()),
            }
        }

        if missing.is_empty() {
            Ok(indices)
        } else {
            Err(RiskError::UnknownColumns(missing))
        }
    }

    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        let n = self.len();
        (0..n).all(|i| {
            (0..i).all(|j| {
                let (a, b) = (self.values[(i, j)], self.values[(j, i)]);
                (a.is_nan() && b.is_nan()) || (a - b).abs() <= tolerance
            })
        })
    }

    /// Rows as (label, values) pairs, for handing to a report writer
    pub fn rows(&self) -> Vec<(String, Vec<f64>)> {
        self.labels
            .iter()
            .enumerate()
            .map(|(i, label)| (label.clone(), self.values.row(i).iter().copied().collect()))
            .collect()
    }
}

#[cfg(test)]
pub(crate) fn test_dates(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    (0..n as u64)
        .map(|i| start.checked_add_days(chrono::Days::new(i)).unwrap())
        .collect()
}
