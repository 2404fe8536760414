//! Multiple correspondence analysis (MCA).
//!
//! Categorical columns are one-hot encoded into an indicator matrix `Z`
//! (n rows, J indicators, Q variables). With correspondence matrix
//! `P = Z / (nQ)`, row masses `r = 1/n` and column masses `c`, the
//! standardized residuals
//!
//! ```text
//! S = D_r^{-1/2} (P - r c^T) D_c^{-1/2}
//! ```
//!
//! are decomposed with the same truncated SVD as [`crate::pca::Pca`]. Row
//! principal coordinates are `(Z/Q - c) D_c^{-1/2} V`, which serves both
//! the training rows and new rows.

use log::debug;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::config::DecompositionParams;
use crate::error::MfaError;
use crate::pca::{pearson_matrix, truncated_svd, TruncatedSvd};
use crate::preprocessing::OneHotEncoder;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Mca {
    params: DecompositionParams,
    encoder: OneHotEncoder,
    /// Indicator column masses `c`. Shape: (J)
    column_masses: Option<Array1<f64>>,
    /// Right singular vectors of `S`. Shape: (J, k)
    rotation: Option<Array2<f64>>,
    singular_values: Option<Array1<f64>>,
    /// Sum of squares of `S` (all principal inertias).
    total_inertia: Option<f64>,
    fit_scores: Option<Array2<f64>>,
}

impl Mca {
    pub fn new(params: DecompositionParams) -> Self {
        Self {
            params,
            encoder: OneHotEncoder::new(),
            column_masses: None,
            rotation: None,
            singular_values: None,
            total_inertia: None,
            fit_scores: None,
        }
    }

    pub fn params(&self) -> &DecompositionParams {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        self.rotation.is_some()
    }

    /// The one-hot encoder learned at fit time.
    pub fn encoder(&self) -> &OneHotEncoder {
        &self.encoder
    }

    pub fn column_masses(&self) -> Option<&Array1<f64>> {
        self.column_masses.as_ref()
    }

    pub fn rotation(&self) -> Option<&Array2<f64>> {
        self.rotation.as_ref()
    }

    pub fn singular_values(&self) -> Option<&Array1<f64>> {
        self.singular_values.as_ref()
    }

    /// Principal inertias (squared singular values) of the kept components.
    pub fn eigenvalues(&self) -> Option<Array1<f64>> {
        self.singular_values.as_ref().map(|s| s.mapv(|v| v * v))
    }

    pub fn total_inertia(&self) -> Option<f64> {
        self.total_inertia
    }

    pub fn explained_inertia_ratio(&self) -> Option<Array1<f64>> {
        let total = self.total_inertia?;
        let eigenvalues = self.eigenvalues()?;
        if total > 0.0 {
            Some(eigenvalues.mapv(|v| v / total))
        } else {
            Some(Array1::zeros(eigenvalues.len()))
        }
    }

    pub fn fit_scores(&self) -> Option<&Array2<f64>> {
        self.fit_scores.as_ref()
    }

    pub fn n_components(&self) -> usize {
        self.rotation.as_ref().map_or(0, |r| r.ncols())
    }

    /// Fits the correspondence analysis of the categorical `data`
    /// (one slice per column in `columns`, all of equal length).
    ///
    /// # Errors
    /// Returns an error for fewer than 2 rows, ragged columns, or a failing
    /// decomposition.
    pub fn fit(&mut self, columns: &[String], data: &[&[String]]) -> Result<&mut Self, MfaError> {
        let mut encoder = OneHotEncoder::new();
        encoder.fit(columns, data)?;
        let indicator = encoder.transform(data)?;
        let n_rows = indicator.nrows();
        if n_rows < 2 {
            return Err(MfaError::InsufficientData {
                min_required: 2,
                actual: n_rows,
            });
        }
        let n_variables = encoder.n_variables() as f64;
        let grand_total = n_rows as f64 * n_variables;
        let column_masses = indicator.sum_axis(Axis(0)) / grand_total;

        // S_ij = (z_ij/Q - c_j) / sqrt(n c_j)
        let residuals = row_coordinates_basis(&indicator, n_variables, &column_masses)
            / (n_rows as f64).sqrt();
        let total_inertia = residuals.iter().map(|v| v * v).sum::<f64>();

        let TruncatedSvd {
            singular_values,
            components,
        } = truncated_svd(&residuals, &self.params)?;
        debug!(
            "MCA on {} indicators: kept {} components, total inertia {:.6}",
            indicator.ncols(),
            singular_values.len(),
            total_inertia
        );

        let scores = residuals.dot(&components) * (n_rows as f64).sqrt();

        self.encoder = encoder;
        self.column_masses = Some(column_masses);
        self.rotation = Some(components);
        self.singular_values = Some(singular_values);
        self.total_inertia = Some(total_inertia);
        self.fit_scores = Some(scores);
        Ok(self)
    }

    /// Row principal coordinates of `data`.
    pub fn transform(&self, data: &[&[String]]) -> Result<Array2<f64>, MfaError> {
        let (column_masses, rotation) = match (&self.column_masses, &self.rotation) {
            (Some(c), Some(r)) => (c, r),
            _ => return Err(MfaError::NotFitted),
        };
        let indicator = self.encoder.transform(data)?;
        let n_variables = self.encoder.n_variables() as f64;
        Ok(row_coordinates_basis(&indicator, n_variables, column_masses).dot(rotation))
    }

    /// Pearson correlation of each indicator column of `data` with each
    /// component. See [`crate::pca::Pca::column_correlation`] for `same_input`.
    pub fn column_correlation(
        &self,
        data: &[&[String]],
        same_input: bool,
    ) -> Result<Array2<f64>, MfaError> {
        let indicator = self.encoder.transform(data)?;
        let scores = if same_input {
            let scores = self.fit_scores.as_ref().ok_or(MfaError::NotFitted)?;
            if scores.nrows() != indicator.nrows() {
                return Err(MfaError::DimensionMismatch {
                    expected: scores.nrows(),
                    actual: indicator.nrows(),
                });
            }
            scores.clone()
        } else {
            self.transform(data)?
        };
        Ok(pearson_matrix(indicator.view(), scores.view()))
    }
}

/// `(Z/Q - c) D_c^{-1/2}`: row profiles centered on the column masses and
/// weighted by the inverse square root of the masses.
fn row_coordinates_basis(
    indicator: &Array2<f64>,
    n_variables: f64,
    column_masses: &Array1<f64>,
) -> Array2<f64> {
    let inv_sqrt_masses = column_masses.mapv(|c| if c > 0.0 { 1.0 / c.sqrt() } else { 0.0 });
    let mut profiles = indicator / n_variables;
    profiles -= column_masses;
    profiles *= &inv_sqrt_masses;
    profiles
}
