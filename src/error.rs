//! Error types for efficient_mfa.

use std::fmt;

use crate::table::ColumnKind;

/// Coarse classification of an [`MfaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The model configuration is missing something or is out of range.
    Configuration,
    /// A declared group mixes numeric and categorical columns.
    Validation,
    /// The input is not a usable labeled table for the request.
    Type,
    /// A fitted model was required.
    NotFitted,
    /// A numerically unusable intermediate (e.g. a zero singular value).
    Numerical,
    /// Failure reported by a PCA/MCA decomposition.
    Decomposition,
    /// Reading or writing a model file failed.
    Persistence,
}

/// All errors produced by efficient_mfa operations.
#[derive(Debug, Clone, PartialEq)]
pub enum MfaError {
    /// No grouping was configured (or the grouping is empty).
    MissingGroups,
    /// A configuration value is invalid.
    InvalidConfig { reason: String },
    /// The columns of a group are neither all numeric nor all categorical.
    MixedGroup { group: String },
    /// The input cannot be used as a labeled table.
    InvalidTable { reason: String },
    /// Column not found in the table.
    ColumnNotFound { name: String },
    /// Column exists but holds the other coarse type.
    ColumnTypeMismatch { column: String, expected: ColumnKind },
    /// Dimension mismatch.
    DimensionMismatch { expected: usize, actual: usize },
    /// `transform`-like call on a model that has not been fitted.
    NotFitted,
    /// A group's dominant singular value is zero or not finite.
    ZeroSingularValue { group: String },
    /// Solver name could not be parsed.
    UnknownSolver { name: String },
    /// Insufficient data for the decomposition.
    InsufficientData { min_required: usize, actual: usize },
    /// Linear-algebra failure inside a decomposition.
    Decomposition(String),
    /// Model file I/O or codec failure.
    Persistence(String),
}

impl MfaError {
    /// Returns the coarse class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingGroups | Self::InvalidConfig { .. } => ErrorKind::Configuration,
            Self::MixedGroup { .. } => ErrorKind::Validation,
            Self::InvalidTable { .. }
            | Self::ColumnNotFound { .. }
            | Self::ColumnTypeMismatch { .. }
            | Self::DimensionMismatch { .. } => ErrorKind::Type,
            Self::NotFitted => ErrorKind::NotFitted,
            Self::ZeroSingularValue { .. } => ErrorKind::Numerical,
            Self::UnknownSolver { .. } | Self::InsufficientData { .. } | Self::Decomposition(_) => {
                ErrorKind::Decomposition
            }
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

impl fmt::Display for MfaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingGroups => write!(f, "MFA requires at least one group of columns"),
            Self::InvalidConfig { reason } => write!(f, "invalid configuration: {reason}"),
            Self::MixedGroup { group } => {
                write!(f, "not all columns in \"{group}\" group are of the same type")
            }
            Self::InvalidTable { reason } => write!(f, "invalid table: {reason}"),
            Self::ColumnNotFound { name } => write!(f, "column '{name}' not found"),
            Self::ColumnTypeMismatch { column, expected } => {
                write!(f, "column '{column}' is not {expected}")
            }
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "expected {expected} elements, got {actual}")
            }
            Self::NotFitted => write!(f, "model is not fitted; call fit first"),
            Self::ZeroSingularValue { group } => {
                write!(f, "dominant singular value of group \"{group}\" is zero")
            }
            Self::UnknownSolver { name } => write!(f, "unknown SVD solver '{name}'"),
            Self::InsufficientData {
                min_required,
                actual,
            } => {
                write!(f, "need at least {min_required} rows, got {actual}")
            }
            Self::Decomposition(msg) => write!(f, "decomposition failed: {msg}"),
            Self::Persistence(msg) => write!(f, "model persistence failed: {msg}"),
        }
    }
}

impl std::error::Error for MfaError {}

impl From<ndarray::ShapeError> for MfaError {
    fn from(e: ndarray::ShapeError) -> Self {
        Self::Decomposition(e.to_string())
    }
}

impl From<std::io::Error> for MfaError {
    fn from(e: std::io::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
