//! Labeled tabular containers.
//!
//! [`DataTable`] is the typed input: named columns that are either numeric or
//! categorical, plus row labels. [`LabeledMatrix`] is the dense numeric output
//! used for the global table, factor scores and correlation tables.
//!
//! ```
//! use efficient_mfa::table::{Column, DataTable};
//!
//! let table = DataTable::from_columns(vec![
//!     ("height".to_string(), Column::numeric(vec![1.6, 1.8, 1.7])),
//!     ("colour".to_string(), Column::categorical(["red", "blue", "red"])),
//! ])
//! .unwrap();
//! assert_eq!(table.n_rows(), 3);
//! assert_eq!(table.n_cols(), 2);
//! ```

use std::fmt;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::MfaError;

/// Coarse type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric => write!(f, "numeric"),
            Self::Categorical => write!(f, "categorical"),
        }
    }
}

/// A single typed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

impl Column {
    pub fn numeric(values: Vec<f64>) -> Self {
        Self::Numeric(values)
    }

    pub fn categorical<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Categorical(values.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Self::Numeric(_) => ColumnKind::Numeric,
            Self::Categorical(_) => ColumnKind::Categorical,
        }
    }

    fn subset(&self, rows: &[usize]) -> Self {
        match self {
            Self::Numeric(v) => Self::Numeric(rows.iter().map(|&r| v[r]).collect()),
            Self::Categorical(v) => Self::Categorical(rows.iter().map(|&r| v[r].clone()).collect()),
        }
    }
}

/// Column-oriented table with row labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    names: Vec<String>,
    columns: Vec<Column>,
    index: Option<Vec<String>>,
    n_rows: usize,
}

impl DataTable {
    /// Creates an empty table with no rows or columns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from `(name, column)` pairs, in order.
    pub fn from_columns(columns: Vec<(String, Column)>) -> Result<Self, MfaError> {
        let mut table = Self::new();
        for (name, column) in columns {
            table.add_column(name, column)?;
        }
        Ok(table)
    }

    /// Appends a column.
    ///
    /// The first column fixes the row count; later columns must match it and
    /// column names must be unique.
    pub fn add_column(&mut self, name: impl Into<String>, column: Column) -> Result<(), MfaError> {
        let name = name.into();
        if self.names.iter().any(|n| *n == name) {
            return Err(MfaError::InvalidTable {
                reason: format!("duplicate column name '{name}'"),
            });
        }
        let has_shape = !self.columns.is_empty() || self.index.is_some();
        if has_shape && column.len() != self.n_rows {
            return Err(MfaError::InvalidTable {
                reason: format!(
                    "column '{name}' has {} rows but the table has {}",
                    column.len(),
                    self.n_rows
                ),
            });
        }
        self.n_rows = column.len();
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    /// Attaches row labels. Their count must match the row count when the
    /// table already has columns.
    pub fn with_index(mut self, index: Vec<String>) -> Result<Self, MfaError> {
        if !self.columns.is_empty() && index.len() != self.n_rows {
            return Err(MfaError::InvalidTable {
                reason: format!(
                    "index has {} labels but the table has {} rows",
                    index.len(),
                    self.n_rows
                ),
            });
        }
        self.n_rows = index.len();
        self.index = Some(index);
        Ok(self)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i])
    }

    pub fn kind_of(&self, name: &str) -> Option<ColumnKind> {
        self.column(name).map(Column::kind)
    }

    /// Row labels; positional labels `"0".."n-1"` when none were attached.
    pub fn row_labels(&self) -> Vec<String> {
        match &self.index {
            Some(index) => index.clone(),
            None => (0..self.n_rows).map(|i| i.to_string()).collect(),
        }
    }

    /// Returns a new table holding only `rows`, in the given order, with
    /// their row labels.
    pub fn select_rows(&self, rows: &[usize]) -> Result<Self, MfaError> {
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.n_rows) {
            return Err(MfaError::DimensionMismatch {
                expected: self.n_rows,
                actual: bad + 1,
            });
        }
        let labels = self.row_labels();
        Ok(Self {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.subset(rows)).collect(),
            index: Some(rows.iter().map(|&r| labels[r].clone()).collect()),
            n_rows: rows.len(),
        })
    }

    /// Gathers numeric columns into a dense `(n_rows, columns.len())` matrix.
    pub fn numeric_block(&self, columns: &[String]) -> Result<Array2<f64>, MfaError> {
        let mut block = Array2::<f64>::zeros((self.n_rows, columns.len()));
        for (j, name) in columns.iter().enumerate() {
            match self.column(name) {
                Some(Column::Numeric(values)) => {
                    block
                        .column_mut(j)
                        .assign(&ArrayView1::from(values.as_slice()));
                }
                Some(Column::Categorical(_)) => {
                    return Err(MfaError::ColumnTypeMismatch {
                        column: name.clone(),
                        expected: ColumnKind::Numeric,
                    })
                }
                None => return Err(MfaError::ColumnNotFound { name: name.clone() }),
            }
        }
        Ok(block)
    }

    /// Borrows categorical columns in the given order.
    pub fn categorical_block(&self, columns: &[String]) -> Result<Vec<&[String]>, MfaError> {
        columns
            .iter()
            .map(|name| match self.column(name) {
                Some(Column::Categorical(values)) => Ok(values.as_slice()),
                Some(Column::Numeric(_)) => Err(MfaError::ColumnTypeMismatch {
                    column: name.clone(),
                    expected: ColumnKind::Categorical,
                }),
                None => Err(MfaError::ColumnNotFound { name: name.clone() }),
            })
            .collect()
    }
}

/// Dense numeric matrix with row and column labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledMatrix {
    index: Vec<String>,
    columns: Vec<String>,
    values: Array2<f64>,
}

impl LabeledMatrix {
    pub fn new(
        index: Vec<String>,
        columns: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, MfaError> {
        if values.nrows() != index.len() {
            return Err(MfaError::DimensionMismatch {
                expected: index.len(),
                actual: values.nrows(),
            });
        }
        if values.ncols() != columns.len() {
            return Err(MfaError::DimensionMismatch {
                expected: columns.len(),
                actual: values.ncols(),
            });
        }
        Ok(Self {
            index,
            columns,
            values,
        })
    }

    /// Concatenates `parts` column-wise. All parts must carry identical row
    /// labels in identical order.
    pub fn hconcat(parts: &[LabeledMatrix]) -> Result<Self, MfaError> {
        let first = parts.first().ok_or_else(|| MfaError::InvalidTable {
            reason: "nothing to concatenate".to_string(),
        })?;
        if let Some(misaligned) = parts.iter().find(|p| p.index != first.index) {
            return Err(MfaError::InvalidTable {
                reason: format!(
                    "row labels are not aligned ({} rows vs {} rows)",
                    first.index.len(),
                    misaligned.index.len()
                ),
            });
        }
        let views: Vec<ArrayView2<f64>> = parts.iter().map(|p| p.values.view()).collect();
        let values = ndarray::concatenate(Axis(1), &views)?;
        let columns = parts.iter().flat_map(|p| p.columns.iter().cloned()).collect();
        Self::new(first.index.clone(), columns, values)
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn into_values(self) -> Array2<f64> {
        self.values
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|j| self.values.column(j))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> DataTable {
        DataTable::from_columns(vec![
            ("a".to_string(), Column::numeric(vec![1.0, 2.0, 3.0])),
            ("b".to_string(), Column::numeric(vec![4.0, 5.0, 6.0])),
            ("c".to_string(), Column::categorical(["x", "y", "x"])),
        ])
        .unwrap()
    }

    #[test]
    fn rejects_ragged_columns() {
        let mut table = sample();
        let err = table
            .add_column("d", Column::numeric(vec![1.0]))
            .unwrap_err();
        assert!(matches!(err, MfaError::InvalidTable { .. }));
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut table = sample();
        let err = table
            .add_column("a", Column::numeric(vec![0.0; 3]))
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn numeric_block_follows_requested_order() {
        let table = sample();
        let block = table
            .numeric_block(&["b".to_string(), "a".to_string()])
            .unwrap();
        assert_eq!(block, array![[4.0, 1.0], [5.0, 2.0], [6.0, 3.0]]);
    }

    #[test]
    fn blocks_report_type_and_missing_columns() {
        let table = sample();
        assert!(matches!(
            table.numeric_block(&["c".to_string()]),
            Err(MfaError::ColumnTypeMismatch { .. })
        ));
        assert!(matches!(
            table.categorical_block(&["zzz".to_string()]),
            Err(MfaError::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn default_row_labels_are_positional() {
        assert_eq!(sample().row_labels(), vec!["0", "1", "2"]);
    }

    #[test]
    fn select_rows_keeps_labels() {
        let table = sample().select_rows(&[2, 0]).unwrap();
        assert_eq!(table.row_labels(), vec!["2", "0"]);
        assert_eq!(table.column("a"), Some(&Column::numeric(vec![3.0, 1.0])));
    }

    #[test]
    fn hconcat_requires_aligned_rows() {
        let left = LabeledMatrix::new(
            vec!["r0".into(), "r1".into()],
            vec!["x".into()],
            array![[1.0], [2.0]],
        )
        .unwrap();
        let right = LabeledMatrix::new(
            vec!["r0".into(), "r1".into()],
            vec!["y".into(), "z".into()],
            array![[3.0, 4.0], [5.0, 6.0]],
        )
        .unwrap();
        let joined = LabeledMatrix::hconcat(&[left.clone(), right]).unwrap();
        assert_eq!(joined.columns(), &["x", "y", "z"]);
        assert_eq!(joined.values(), &array![[1.0, 3.0, 4.0], [2.0, 5.0, 6.0]]);

        let shuffled = LabeledMatrix::new(
            vec!["r1".into(), "r0".into()],
            vec!["w".into()],
            array![[0.0], [0.0]],
        )
        .unwrap();
        assert!(LabeledMatrix::hconcat(&[left, shuffled]).is_err());
    }
}
