// Multiple factor analysis (MFA)

#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod group;
pub mod linalg_backends;
pub mod mca;
pub mod mfa;
pub mod pca;
pub mod preprocessing;
pub mod table;

pub use config::{DecompositionParams, Groups, MfaConfig, ResolvedSolver, SvdSolver};
pub use error::{ErrorKind, MfaError};
pub use group::GroupModel;
pub use mca::Mca;
pub use mfa::Mfa;
pub use pca::Pca;
pub use table::{Column, ColumnKind, DataTable, LabeledMatrix};
