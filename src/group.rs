//! Per-group validation and factor analysis.
//!
//! Each group of columns is classified as numeric or categorical and gets its
//! own decomposition: a [`Pca`] on scaled values for numeric groups and an
//! [`Mca`] on the indicator matrix for categorical groups.

use log::debug;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::DecompositionParams;
use crate::error::MfaError;
use crate::mca::Mca;
use crate::pca::Pca;
use crate::preprocessing::StandardScaler;
use crate::table::{ColumnKind, DataTable, LabeledMatrix};

/// Determines whether every column of group `name` is numeric or every column
/// is categorical.
///
/// # Errors
/// `ColumnNotFound` for a column missing from `table`, `MixedGroup` when the
/// group holds both kinds.
pub fn classify_group(
    table: &DataTable,
    name: &str,
    columns: &[String],
) -> Result<ColumnKind, MfaError> {
    let mut kinds = Vec::with_capacity(columns.len());
    for column in columns {
        let kind = table
            .kind_of(column)
            .ok_or_else(|| MfaError::ColumnNotFound {
                name: column.clone(),
            })?;
        kinds.push(kind);
    }
    let all_numeric = kinds.iter().all(|k| *k == ColumnKind::Numeric);
    let all_categorical = kinds.iter().all(|k| *k == ColumnKind::Categorical);
    match (all_numeric, all_categorical) {
        (true, _) => Ok(ColumnKind::Numeric),
        (_, true) => Ok(ColumnKind::Categorical),
        _ => Err(MfaError::MixedGroup {
            group: name.to_string(),
        }),
    }
}

/// Numeric group: scaler followed by PCA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericGroupModel {
    columns: Vec<String>,
    scaler: StandardScaler,
    pca: Pca,
}

impl NumericGroupModel {
    pub fn fit(
        table: &DataTable,
        columns: &[String],
        standardize: bool,
        params: &DecompositionParams,
    ) -> Result<Self, MfaError> {
        let block = table.numeric_block(columns)?;
        let mut scaler = StandardScaler::new(standardize);
        scaler.fit(block.view())?;
        let scaled = scaler.transform(block.view())?;
        let mut pca = Pca::new(params.clone());
        pca.fit(scaled)?;
        Ok(Self {
            columns: columns.to_vec(),
            scaler,
            pca,
        })
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn pca(&self) -> &Pca {
        &self.pca
    }

    fn representation(&self, table: &DataTable) -> Result<Array2<f64>, MfaError> {
        let block = table.numeric_block(&self.columns)?;
        self.scaler.transform(block.view())
    }
}

/// Categorical group: MCA (which owns the one-hot encoder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalGroupModel {
    columns: Vec<String>,
    mca: Mca,
}

impl CategoricalGroupModel {
    pub fn fit(
        table: &DataTable,
        columns: &[String],
        params: &DecompositionParams,
    ) -> Result<Self, MfaError> {
        let block = table.categorical_block(columns)?;
        let mut mca = Mca::new(params.clone());
        mca.fit(columns, &block)?;
        Ok(Self {
            columns: columns.to_vec(),
            mca,
        })
    }

    pub fn mca(&self) -> &Mca {
        &self.mca
    }

    fn representation(&self, table: &DataTable) -> Result<Array2<f64>, MfaError> {
        let block = table.categorical_block(&self.columns)?;
        self.mca.encoder().transform(&block)
    }
}

/// Fitted factor analysis of one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroupModel {
    Numeric(NumericGroupModel),
    Categorical(CategoricalGroupModel),
}

impl GroupModel {
    /// Fits the decomposition matching `kind` on the group's columns.
    pub fn fit(
        table: &DataTable,
        columns: &[String],
        kind: ColumnKind,
        standardize: bool,
        params: &DecompositionParams,
    ) -> Result<Self, MfaError> {
        let model = match kind {
            ColumnKind::Numeric => {
                Self::Numeric(NumericGroupModel::fit(table, columns, standardize, params)?)
            }
            ColumnKind::Categorical => {
                Self::Categorical(CategoricalGroupModel::fit(table, columns, params)?)
            }
        };
        debug!(
            "Fitted {} group over {:?}: leading singular value {:?}",
            model.kind(),
            columns,
            model.dominant_singular_value()
        );
        Ok(model)
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Self::Numeric(_) => ColumnKind::Numeric,
            Self::Categorical(_) => ColumnKind::Categorical,
        }
    }

    pub fn columns(&self) -> &[String] {
        match self {
            Self::Numeric(m) => &m.columns,
            Self::Categorical(m) => &m.columns,
        }
    }

    /// Column labels of [`GroupModel::representation`].
    pub fn feature_names(&self) -> Vec<String> {
        match self {
            Self::Numeric(m) => m.columns.clone(),
            Self::Categorical(m) => m.mca.encoder().feature_names(),
        }
    }

    /// Largest singular value of the group's decomposition, if any
    /// component was kept.
    pub fn dominant_singular_value(&self) -> Option<f64> {
        let singular_values = match self {
            Self::Numeric(m) => m.pca.singular_values(),
            Self::Categorical(m) => m.mca.singular_values(),
        };
        singular_values.and_then(|s| s.first().copied())
    }

    /// Pre-decomposition row representation of `table`: scaled values for a
    /// numeric group, one-hot indicators for a categorical group.
    pub fn representation(&self, table: &DataTable) -> Result<LabeledMatrix, MfaError> {
        let values = match self {
            Self::Numeric(m) => m.representation(table)?,
            Self::Categorical(m) => m.representation(table)?,
        };
        LabeledMatrix::new(table.row_labels(), self.feature_names(), values)
    }

    /// The group's own factor scores for `table`.
    pub fn transform(&self, table: &DataTable) -> Result<LabeledMatrix, MfaError> {
        let scores = match self {
            Self::Numeric(m) => m.pca.transform(m.representation(table)?.view())?,
            Self::Categorical(m) => {
                let block = table.categorical_block(&m.columns)?;
                m.mca.transform(&block)?
            }
        };
        let labels = component_labels(scores.ncols());
        LabeledMatrix::new(table.row_labels(), labels, scores)
    }
}

/// `component_0`, `component_1`, ...
pub(crate) fn component_labels(k: usize) -> Vec<String> {
    (0..k).map(|i| format!("component_{}", i)).collect()
}

