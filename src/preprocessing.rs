//! Scaling and encoding applied to a group before its decomposition.

use std::collections::BTreeSet;

use log::warn;
use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::error::MfaError;

/// Standard deviations below this are treated as constant columns.
const SCALE_SANITIZATION_THRESHOLD: f64 = 1e-9;

/// Column centering with optional unit-variance scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    with_std: bool,
    mean: Option<Array1<f64>>,
    /// Population standard deviations, sanitized to be positive.
    /// All ones when `with_std` is false.
    scale: Option<Array1<f64>>,
}

impl StandardScaler {
    pub fn new(with_std: bool) -> Self {
        Self {
            with_std,
            mean: None,
            scale: None,
        }
    }

    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }

    pub fn scale(&self) -> Option<&Array1<f64>> {
        self.scale.as_ref()
    }

    /// Learns the column means (and standard deviations) of `x`.
    ///
    /// # Errors
    /// Returns an error for an input with no rows or with non-finite values.
    pub fn fit(&mut self, x: ArrayView2<f64>) -> Result<&mut Self, MfaError> {
        if x.nrows() == 0 {
            return Err(MfaError::InsufficientData {
                min_required: 1,
                actual: 0,
            });
        }
        ensure_finite(x)?;
        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| MfaError::Decomposition("Failed to compute column means.".into()))?;
        let scale = if self.with_std {
            x.map_axis(Axis(0), |column| column.std(0.0))
                .mapv(|s| if s.is_finite() && s > SCALE_SANITIZATION_THRESHOLD { s } else { 1.0 })
        } else {
            Array1::ones(x.ncols())
        };
        self.mean = Some(mean);
        self.scale = Some(scale);
        Ok(self)
    }

    /// Applies `(x - mean) / scale` column-wise.
    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, MfaError> {
        let (mean, scale) = self.parameters()?;
        if x.ncols() != mean.len() {
            return Err(MfaError::DimensionMismatch {
                expected: mean.len(),
                actual: x.ncols(),
            });
        }
        ensure_finite(x)?;
        let mut out = x.to_owned();
        for mut row in out.axis_iter_mut(Axis(0)) {
            Zip::from(row.view_mut())
                .and(mean.view())
                .and(scale.view())
                .for_each(|v, &m, &s| *v = (*v - m) / s);
        }
        Ok(out)
    }

    /// Maps scaled values back to the original units.
    pub fn inverse_transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, MfaError> {
        let (mean, scale) = self.parameters()?;
        if x.ncols() != mean.len() {
            return Err(MfaError::DimensionMismatch {
                expected: mean.len(),
                actual: x.ncols(),
            });
        }
        let mut out = x.to_owned();
        for mut row in out.axis_iter_mut(Axis(0)) {
            Zip::from(row.view_mut())
                .and(mean.view())
                .and(scale.view())
                .for_each(|v, &m, &s| *v = *v * s + m);
        }
        Ok(out)
    }

    fn parameters(&self) -> Result<(&Array1<f64>, &Array1<f64>), MfaError> {
        match (&self.mean, &self.scale) {
            (Some(mean), Some(scale)) => Ok((mean, scale)),
            _ => Err(MfaError::NotFitted),
        }
    }
}

/// One-hot (indicator) encoding of categorical columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    columns: Vec<String>,
    /// Sorted categories per column.
    categories: Vec<Vec<String>>,
}

impl OneHotEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        !self.columns.is_empty()
    }

    pub fn categories(&self) -> &[Vec<String>] {
        &self.categories
    }

    pub fn n_variables(&self) -> usize {
        self.columns.len()
    }

    /// Total number of indicator columns.
    pub fn n_features(&self) -> usize {
        self.categories.iter().map(Vec::len).sum()
    }

    /// Indicator column names, `column_category`.
    pub fn feature_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .zip(&self.categories)
            .flat_map(|(col, cats)| cats.iter().map(move |cat| format!("{col}_{cat}")))
            .collect()
    }

    pub fn fit(&mut self, columns: &[String], data: &[&[String]]) -> Result<&mut Self, MfaError> {
        if columns.is_empty() {
            return Err(MfaError::InvalidConfig {
                reason: "one-hot encoding needs at least one column".to_string(),
            });
        }
        check_categorical_shape(columns.len(), data)?;
        self.categories = data
            .iter()
            .map(|values| {
                values
                    .iter()
                    .cloned()
                    .collect::<BTreeSet<String>>()
                    .into_iter()
                    .collect()
            })
            .collect();
        self.columns = columns.to_vec();
        Ok(self)
    }

    /// Encodes rows into a `(n_rows, n_features)` 0/1 matrix. A category not
    /// seen during `fit` leaves that column's indicator block at zero.
    pub fn transform(&self, data: &[&[String]]) -> Result<Array2<f64>, MfaError> {
        if !self.is_fitted() {
            return Err(MfaError::NotFitted);
        }
        let n_rows = check_categorical_shape(self.columns.len(), data)?;
        let mut encoded = Array2::<f64>::zeros((n_rows, self.n_features()));
        let mut offset = 0;
        for ((name, cats), values) in self.columns.iter().zip(&self.categories).zip(data) {
            let mut unseen = 0usize;
            for (i, value) in values.iter().enumerate() {
                match cats.binary_search(value) {
                    Ok(pos) => encoded[[i, offset + pos]] = 1.0,
                    Err(_) => unseen += 1,
                }
            }
            if unseen > 0 {
                warn!(
                    "Column '{}': {} value(s) with categories unseen during fit encoded as all-zero.",
                    name, unseen
                );
            }
            offset += cats.len();
        }
        Ok(encoded)
    }
}

/// Checks column count and equal column lengths; returns the row count.
fn check_categorical_shape(n_columns: usize, data: &[&[String]]) -> Result<usize, MfaError> {
    if data.len() != n_columns {
        return Err(MfaError::DimensionMismatch {
            expected: n_columns,
            actual: data.len(),
        });
    }
    let n_rows = data.first().map_or(0, |c| c.len());
    if let Some(ragged) = data.iter().find(|c| c.len() != n_rows) {
        return Err(MfaError::DimensionMismatch {
            expected: n_rows,
            actual: ragged.len(),
        });
    }
    Ok(n_rows)
}

pub(crate) fn ensure_finite(x: ArrayView2<f64>) -> Result<(), MfaError> {
    if x.iter().any(|v| !v.is_finite()) {
        return Err(MfaError::InvalidTable {
            reason: "input contains NaN or infinite values".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn scaler_standardizes_and_inverts() {
        let x = array![[1.0, 10.0], [2.0, 10.0], [3.0, 10.0], [6.0, 10.0]];
        let mut scaler = StandardScaler::new(true);
        scaler.fit(x.view()).unwrap();
        let z = scaler.transform(x.view()).unwrap();
        // constant column: std sanitized to 1, so values are just centered
        assert!(z.column(1).iter().all(|v| v.abs() < 1e-12));
        assert_abs_diff_eq!(z.column(0).mean().unwrap(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(z.column(0).std(0.0), 1.0, epsilon = 1e-12);
        let back = scaler.inverse_transform(z.view()).unwrap();
        for (a, b) in back.iter().zip(x.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn scaler_without_std_only_centers() {
        let x = array![[1.0], [3.0]];
        let mut scaler = StandardScaler::new(false);
        scaler.fit(x.view()).unwrap();
        assert_eq!(scaler.transform(x.view()).unwrap(), array![[-1.0], [1.0]]);
    }

    #[test]
    fn scaler_rejects_nan_and_unfitted_use() {
        let x = array![[1.0], [f64::NAN]];
        assert!(matches!(
            StandardScaler::new(true).fit(x.view()),
            Err(MfaError::InvalidTable { .. })
        ));
        assert_eq!(
            StandardScaler::new(true).transform(x.view()).unwrap_err(),
            MfaError::NotFitted
        );
    }

    #[test]
    fn one_hot_encodes_sorted_categories() {
        let colour = strings(&["red", "blue", "red"]);
        let size = strings(&["s", "s", "l"]);
        let mut encoder = OneHotEncoder::new();
        encoder
            .fit(&strings(&["colour", "size"]), &[colour.as_slice(), size.as_slice()])
            .unwrap();
        assert_eq!(
            encoder.feature_names(),
            strings(&["colour_blue", "colour_red", "size_l", "size_s"])
        );
        let z = encoder.transform(&[colour.as_slice(), size.as_slice()]).unwrap();
        assert_eq!(
            z,
            array![
                [0.0, 1.0, 0.0, 1.0],
                [1.0, 0.0, 0.0, 1.0],
                [0.0, 1.0, 1.0, 0.0]
            ]
        );
    }

    #[test]
    fn one_hot_unseen_category_is_zero_block() {
        let colour = strings(&["red", "blue"]);
        let mut encoder = OneHotEncoder::new();
        encoder.fit(&strings(&["colour"]), &[colour.as_slice()]).unwrap();
        let fresh = strings(&["green", "red"]);
        let z = encoder.transform(&[fresh.as_slice()]).unwrap();
        assert_eq!(z, array![[0.0, 0.0], [0.0, 1.0]]);
    }
}
