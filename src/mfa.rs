//! Multiple factor analysis (MFA).
//!
//! Every group of columns is analysed on its own (PCA for numeric groups,
//! MCA for categorical groups). Each group's pre-decomposition representation
//! is divided by the group's leading singular value so that no group dominates
//! the first global axis, the weighted blocks are concatenated into the global
//! table, and a final PCA is fitted on that table.
//!
//! ```
//! use efficient_mfa::config::{Groups, MfaConfig};
//! use efficient_mfa::mfa::Mfa;
//! use efficient_mfa::table::{Column, DataTable};
//!
//! let table = DataTable::from_columns(vec![
//!     ("height".to_string(), Column::numeric(vec![1.6, 1.8, 1.7, 1.5])),
//!     ("weight".to_string(), Column::numeric(vec![60.0, 80.0, 72.0, 51.0])),
//!     ("colour".to_string(), Column::categorical(["red", "blue", "red", "green"])),
//! ])
//! .unwrap();
//! let groups = Groups::new()
//!     .with_group("body", ["height", "weight"])
//!     .with_group("taste", ["colour"]);
//!
//! let mut mfa = Mfa::new(MfaConfig::new(groups).n_components(2));
//! let scores = mfa.fit(&table).unwrap().transform(&table).unwrap();
//! assert_eq!(scores.values().dim(), (4, 2));
//! ```

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::{debug, info};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::config::MfaConfig;
use crate::error::MfaError;
use crate::group::{classify_group, component_labels, GroupModel};
use crate::pca::Pca;
use crate::table::{DataTable, LabeledMatrix};

/// State produced by a successful [`Mfa::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FittedMfa {
    /// One model per group, in grouping order.
    partial_models: Vec<(String, GroupModel)>,
    /// PCA of the global table (centering only).
    global: Pca,
    /// `group/feature` labels of the global table columns.
    global_columns: Vec<String>,
}

/// Multiple factor analysis model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mfa {
    config: MfaConfig,
    fitted: Option<FittedMfa>,
}

impl Mfa {
    pub fn new(config: MfaConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn config(&self) -> &MfaConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Fits the per-group models and the global PCA on `table`.
    ///
    /// Every group is validated before anything is fitted. The model is only
    /// updated when all steps succeed; on error the previous state is kept.
    ///
    /// # Errors
    /// - `MissingGroups` / `InvalidConfig` for an unusable configuration.
    /// - `MixedGroup` when a group mixes numeric and categorical columns.
    /// - `ColumnNotFound` for a grouped column absent from `table`.
    /// - `ZeroSingularValue` when a group carries no variance.
    /// - `InvalidTable` when two group columns map to the same global label.
    /// - Any error of the underlying decompositions.
    pub fn fit(&mut self, table: &DataTable) -> Result<&mut Self, MfaError> {
        let groups = self.config.validate()?;
        let kinds = groups
            .iter()
            .map(|(name, columns)| classify_group(table, name, columns))
            .collect::<Result<Vec<_>, _>>()?;

        let params = &self.config.decomposition;
        let mut partial_models = Vec::with_capacity(groups.len());
        for ((name, columns), kind) in groups.iter().zip(kinds) {
            let model = GroupModel::fit(table, columns, kind, self.config.standardize, params)?;
            partial_models.push((name.to_string(), model));
        }
        info!(
            "Fitted {} group models on {} rows.",
            partial_models.len(),
            table.n_rows()
        );

        let global_table = build_global_table(&partial_models, table)?;
        info!(
            "Global table: {} rows x {} columns.",
            global_table.nrows(),
            global_table.ncols()
        );
        let global_columns = global_table.columns().to_vec();
        let mut global = Pca::new(params.clone());
        global.fit(global_table.into_values())?;
        info!(
            "Global PCA kept {} components (explained variance ratio {:?}).",
            global.n_components(),
            global.explained_variance_ratio().map(|r| r.to_vec())
        );

        self.fitted = Some(FittedMfa {
            partial_models,
            global,
            global_columns,
        });
        Ok(self)
    }

    /// Row factor scores of `table`: the global PCA scores of its global
    /// table, multiplied by `sqrt(n_rows)`.
    pub fn transform(&self, table: &DataTable) -> Result<LabeledMatrix, MfaError> {
        let fitted = self.fitted()?;
        let global_table = build_global_table(&fitted.partial_models, table)?;
        let n_rows = global_table.nrows();
        let scores = fitted.global.transform(global_table.values().view())? * (n_rows as f64).sqrt();
        LabeledMatrix::new(
            global_table.index().to_vec(),
            component_labels(scores.ncols()),
            scores,
        )
    }

    /// `fit` followed by `transform` on the same table.
    pub fn fit_transform(&mut self, table: &DataTable) -> Result<LabeledMatrix, MfaError> {
        self.fit(table)?;
        self.transform(table)
    }

    /// Weighted, concatenated group representations of `table`, computed with
    /// the fitted group models.
    pub fn global_table(&self, table: &DataTable) -> Result<LabeledMatrix, MfaError> {
        build_global_table(&self.fitted()?.partial_models, table)
    }

    /// Correlation of every global-table column with every global component.
    ///
    /// `same_input` declares that `table` is the table the model was fitted
    /// on, so the cached fit scores are reused instead of projecting again.
    /// Rows are global columns (`group/feature`), columns are components.
    pub fn column_correlation(
        &self,
        table: &DataTable,
        same_input: bool,
    ) -> Result<LabeledMatrix, MfaError> {
        let fitted = self.fitted()?;
        let global_table = build_global_table(&fitted.partial_models, table)?;
        let correlations = fitted
            .global
            .column_correlation(global_table.values().view(), same_input)?;
        LabeledMatrix::new(
            global_table.columns().to_vec(),
            component_labels(correlations.ncols()),
            correlations,
        )
    }

    /// Fitted group models in grouping order.
    pub fn partial_models(&self) -> Option<&[(String, GroupModel)]> {
        self.fitted.as_ref().map(|f| f.partial_models.as_slice())
    }

    pub fn partial_model(&self, name: &str) -> Option<&GroupModel> {
        self.fitted
            .as_ref()?
            .partial_models
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, model)| model)
    }

    /// The PCA fitted on the global table.
    pub fn global_decomposition(&self) -> Option<&Pca> {
        self.fitted.as_ref().map(|f| &f.global)
    }

    pub fn global_columns(&self) -> Option<&[String]> {
        self.fitted.as_ref().map(|f| f.global_columns.as_slice())
    }

    /// Variances of the global components.
    pub fn eigenvalues(&self) -> Option<&Array1<f64>> {
        self.global_decomposition()?.explained_variance()
    }

    pub fn explained_variance_ratio(&self) -> Option<&Array1<f64>> {
        self.global_decomposition()?.explained_variance_ratio()
    }

    /// Saves the fitted model to a file using bincode.
    ///
    /// # Errors
    /// `NotFitted` for an unfitted model, `Persistence` when the file cannot
    /// be written or the model cannot be encoded.
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<(), MfaError> {
        self.fitted()?;
        let file = File::create(path.as_ref()).map_err(|e| {
            MfaError::Persistence(format!("Failed to create file at {:?}: {}", path.as_ref(), e))
        })?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| MfaError::Persistence(format!("Failed to serialize MFA model: {}", e)))?;
        debug!("Saved MFA model to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads a model previously written by [`Mfa::save_model`].
    ///
    /// # Errors
    /// `Persistence` when the file cannot be read or decoded, or when the
    /// decoded model is incomplete or inconsistent.
    pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Self, MfaError> {
        let file = File::open(path.as_ref()).map_err(|e| {
            MfaError::Persistence(format!("Failed to open file at {:?}: {}", path.as_ref(), e))
        })?;
        let mut reader = BufReader::new(file);
        let model: Mfa =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|e| {
                    MfaError::Persistence(format!("Failed to deserialize MFA model: {}", e))
                })?;

        let fitted = model
            .fitted
            .as_ref()
            .ok_or_else(|| MfaError::Persistence("Loaded MFA model is not fitted.".into()))?;
        let n_global_features = fitted.global.mean().map_or(0, |m| m.len());
        if n_global_features != fitted.global_columns.len() {
            return Err(MfaError::Persistence(format!(
                "Loaded MFA model has {} global columns but its global PCA expects {}.",
                fitted.global_columns.len(),
                n_global_features
            )));
        }
        let n_groups = model.config.groups.as_ref().map_or(0, |g| g.len());
        if n_groups != fitted.partial_models.len() {
            return Err(MfaError::Persistence(format!(
                "Loaded MFA model has {} group models for {} configured groups.",
                fitted.partial_models.len(),
                n_groups
            )));
        }
        Ok(model)
    }

    fn fitted(&self) -> Result<&FittedMfa, MfaError> {
        self.fitted.as_ref().ok_or(MfaError::NotFitted)
    }
}

/// Divides each group's representation of `table` by the group's dominant
/// singular value and concatenates the blocks in grouping order. Columns are
/// labelled `group/feature` and must be unique across the whole table.
fn build_global_table(
    partial_models: &[(String, GroupModel)],
    table: &DataTable,
) -> Result<LabeledMatrix, MfaError> {
    let mut parts = Vec::with_capacity(partial_models.len());
    let mut seen = HashSet::new();
    for (name, model) in partial_models {
        let weight = match model.dominant_singular_value() {
            Some(s) if s.is_finite() && s > 0.0 => s,
            _ => {
                return Err(MfaError::ZeroSingularValue {
                    group: name.clone(),
                })
            }
        };
        let representation = model.representation(table)?;
        let mut columns = Vec::with_capacity(representation.ncols());
        for feature in representation.columns() {
            let label = format!("{name}/{feature}");
            if !seen.insert(label.clone()) {
                return Err(MfaError::InvalidTable {
                    reason: format!("global column label '{label}' is produced more than once"),
                });
            }
            columns.push(label);
        }
        let index = representation.index().to_vec();
        let weighted = representation.into_values() / weight;
        parts.push(LabeledMatrix::new(index, columns, weighted)?);
    }
    LabeledMatrix::hconcat(&parts)
}
