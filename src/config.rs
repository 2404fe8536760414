//! Model configuration.
//!
//! [`DecompositionParams`] is the hyperparameter set shared by every PCA/MCA
//! the model fits (per group and global). [`MfaConfig`] adds the grouping and
//! the standardization switch for numeric groups.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MfaError;

/// Number of samples/features above which `Auto` considers the randomized solver.
const AUTO_RANDOMIZED_MIN_DIM: usize = 500;

/// SVD strategy for the truncated decompositions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SvdSolver {
    /// Pick a concrete solver from the data shape.
    #[default]
    Auto,
    /// Exact LAPACK SVD of the centered matrix.
    Full,
    /// Eigen-decomposition of the (batched) scatter or Gram matrix.
    Covariance,
    /// Randomized range finder with power iterations.
    Randomized,
}

/// A concrete solver, as chosen by [`SvdSolver::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedSolver {
    Full,
    Covariance,
    Randomized,
}

impl fmt::Display for ResolvedSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Full => "full",
            Self::Covariance => "covariance",
            Self::Randomized => "randomized",
        };
        f.write_str(name)
    }
}

impl SvdSolver {
    /// Picks the concrete solver for an `n_samples x n_features` problem
    /// keeping `n_components`.
    pub fn resolve(
        self,
        n_samples: usize,
        n_features: usize,
        n_components: usize,
        batch_size: Option<usize>,
    ) -> ResolvedSolver {
        match self {
            Self::Auto => {
                if batch_size.is_some() {
                    ResolvedSolver::Covariance
                } else if n_samples.max(n_features) > AUTO_RANDOMIZED_MIN_DIM
                    && (n_components as f64) < 0.8 * n_samples.min(n_features) as f64
                {
                    ResolvedSolver::Randomized
                } else {
                    ResolvedSolver::Full
                }
            }
            Self::Full => ResolvedSolver::Full,
            Self::Covariance => ResolvedSolver::Covariance,
            Self::Randomized => ResolvedSolver::Randomized,
        }
    }
}

impl fmt::Display for SvdSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::Full => "full",
            Self::Covariance => "covariance",
            Self::Randomized => "randomized",
        };
        f.write_str(name)
    }
}

impl FromStr for SvdSolver {
    type Err = MfaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "full" => Ok(Self::Full),
            "covariance" => Ok(Self::Covariance),
            "randomized" => Ok(Self::Randomized),
            _ => Err(MfaError::UnknownSolver { name: s.to_string() }),
        }
    }
}

/// Hyperparameters shared by the per-group and global decompositions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionParams {
    /// Number of components to keep.
    pub n_components: usize,
    pub solver: SvdSolver,
    /// Divide PCA scores by the square root of their explained variance.
    pub whiten: bool,
    /// Has no effect: inputs are borrowed or cloned, never mutated.
    pub copy: bool,
    /// Keep components whose singular value exceeds `tolerance * s_max`.
    /// Must lie in `[0, 1)`.
    pub tolerance: Option<f64>,
    /// Power iterations of the randomized solver.
    pub iterated_power: usize,
    /// Row batch size for accumulating the scatter matrix.
    pub batch_size: Option<usize>,
    /// Seed for the randomized solver; `None` draws from the thread RNG.
    pub random_seed: Option<u64>,
}

impl Default for DecompositionParams {
    fn default() -> Self {
        Self {
            n_components: 2,
            solver: SvdSolver::Auto,
            whiten: false,
            copy: true,
            tolerance: None,
            iterated_power: 2,
            batch_size: None,
            random_seed: None,
        }
    }
}

impl DecompositionParams {
    pub fn validate(&self) -> Result<(), MfaError> {
        if self.n_components == 0 {
            return Err(MfaError::InvalidConfig {
                reason: "n_components must be greater than 0".to_string(),
            });
        }
        if let Some(tol) = self.tolerance {
            if !(0.0..1.0).contains(&tol) {
                return Err(MfaError::InvalidConfig {
                    reason: format!("tolerance must lie in [0, 1), got {tol}"),
                });
            }
        }
        if self.batch_size == Some(0) {
            return Err(MfaError::InvalidConfig {
                reason: "batch_size must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Ordered mapping from group name to its column names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Groups {
    entries: Vec<(String, Vec<String>)>,
}

impl Groups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Groups::insert`].
    pub fn with_group<I, S>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(name, columns);
        self
    }

    /// Adds a group; an existing group of the same name keeps its position
    /// and has its columns replaced.
    pub fn insert<I, S>(&mut self, name: impl Into<String>, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = columns,
            None => self.entries.push((name, columns)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, cols)| cols.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, cols)| (name.as_str(), cols.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N, I, S> FromIterator<(N, I)> for Groups
where
    N: Into<String>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (N, I)>>(iter: T) -> Self {
        let mut groups = Groups::new();
        for (name, columns) in iter {
            groups.insert(name, columns);
        }
        groups
    }
}

/// Configuration of a [`crate::mfa::Mfa`] model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MfaConfig {
    /// Scale numeric groups to unit variance before their PCA.
    pub standardize: bool,
    pub decomposition: DecompositionParams,
    pub groups: Option<Groups>,
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self {
            standardize: true,
            decomposition: DecompositionParams::default(),
            groups: None,
        }
    }
}

impl MfaConfig {
    pub fn new(groups: Groups) -> Self {
        Self::default().with_groups(groups)
    }

    pub fn with_groups(mut self, groups: Groups) -> Self {
        self.groups = Some(groups);
        self
    }

    pub fn standardize(mut self, standardize: bool) -> Self {
        self.standardize = standardize;
        self
    }

    pub fn n_components(mut self, n_components: usize) -> Self {
        self.decomposition.n_components = n_components;
        self
    }

    pub fn solver(mut self, solver: SvdSolver) -> Self {
        self.decomposition.solver = solver;
        self
    }

    pub fn whiten(mut self, whiten: bool) -> Self {
        self.decomposition.whiten = whiten;
        self
    }

    pub fn copy(mut self, copy: bool) -> Self {
        self.decomposition.copy = copy;
        self
    }

    pub fn tolerance(mut self, tolerance: Option<f64>) -> Self {
        self.decomposition.tolerance = tolerance;
        self
    }

    pub fn iterated_power(mut self, iterated_power: usize) -> Self {
        self.decomposition.iterated_power = iterated_power;
        self
    }

    pub fn batch_size(mut self, batch_size: Option<usize>) -> Self {
        self.decomposition.batch_size = batch_size;
        self
    }

    pub fn random_seed(mut self, random_seed: Option<u64>) -> Self {
        self.decomposition.random_seed = random_seed;
        self
    }

    /// Checks the configuration and returns the grouping.
    pub fn validate(&self) -> Result<&Groups, MfaError> {
        let groups = match &self.groups {
            Some(groups) if !groups.is_empty() => groups,
            _ => return Err(MfaError::MissingGroups),
        };
        if let Some((name, _)) = groups.iter().find(|(_, cols)| cols.is_empty()) {
            return Err(MfaError::InvalidConfig {
                reason: format!("group \"{name}\" has no columns"),
            });
        }
        self.decomposition.validate()?;
        Ok(groups)
    }
}
