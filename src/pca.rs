// Principal component analysis (PCA)

use log::{debug, trace, warn};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use rand::SeedableRng; // For ChaCha8Rng::seed_from_u64
use rand_chacha::ChaCha8Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::config::{DecompositionParams, ResolvedSolver};
use crate::error::MfaError;
use crate::linalg_backends::{BackendEigh, BackendQR, BackendSVD, NdarrayLinAlgBackend};
use crate::preprocessing::ensure_finite;

/// Norms/eigenvalues below this are treated as zero.
const NORMALIZATION_THRESHOLD: f64 = 1e-9;

// Adaptive oversampling for the randomized solver (Halko et al. recommendations).
const RANDOMIZED_P_LOWER_BOUND: usize = 5;
const RANDOMIZED_P_UPPER_BOUND: usize = 20;

/// Principal component analysis.
///
/// Centers the input (no scaling; see [`crate::preprocessing::StandardScaler`])
/// and keeps the leading right singular vectors of the centered matrix,
/// computed with the solver chosen in [`DecompositionParams`].
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use efficient_mfa::config::DecompositionParams;
/// use efficient_mfa::pca::Pca;
///
/// let data = array![
///     [1.0, 2.0],
///     [3.0, 4.1],
///     [5.0, 5.9],
/// ];
///
/// let mut pca = Pca::new(DecompositionParams::default());
/// pca.fit(data.clone()).unwrap();
/// let scores = pca.transform(data.view()).unwrap();
/// assert_eq!(scores.nrows(), 3);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Pca {
    params: DecompositionParams,
    /// Mean vector of the training data. Shape: (n_features)
    mean: Option<Array1<f64>>,
    /// Principal axes as unit columns. Shape: (n_features, k_components)
    rotation: Option<Array2<f64>>,
    /// Singular values of the centered training matrix, descending.
    singular_values: Option<Array1<f64>>,
    /// `s^2 / (n_samples - 1)` for each kept component.
    explained_variance: Option<Array1<f64>>,
    explained_variance_ratio: Option<Array1<f64>>,
    /// Scores of the training rows, as `transform` would return them.
    fit_scores: Option<Array2<f64>>,
}

impl Pca {
    /// Creates an unfitted PCA with the given hyperparameters.
    pub fn new(params: DecompositionParams) -> Self {
        Self {
            params,
            mean: None,
            rotation: None,
            singular_values: None,
            explained_variance: None,
            explained_variance_ratio: None,
            fit_scores: None,
        }
    }

    pub fn params(&self) -> &DecompositionParams {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        self.rotation.is_some()
    }

    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }

    /// The rotation matrix (principal axes), shape (n_features, k_components).
    pub fn rotation(&self) -> Option<&Array2<f64>> {
        self.rotation.as_ref()
    }

    pub fn singular_values(&self) -> Option<&Array1<f64>> {
        self.singular_values.as_ref()
    }

    /// Eigenvalues of the covariance matrix for the kept components.
    pub fn explained_variance(&self) -> Option<&Array1<f64>> {
        self.explained_variance.as_ref()
    }

    pub fn explained_variance_ratio(&self) -> Option<&Array1<f64>> {
        self.explained_variance_ratio.as_ref()
    }

    pub fn fit_scores(&self) -> Option<&Array2<f64>> {
        self.fit_scores.as_ref()
    }

    /// Number of components actually kept (0 before fitting).
    pub fn n_components(&self) -> usize {
        self.rotation.as_ref().map_or(0, |r| r.ncols())
    }

    /// Fits the principal axes to `data_matrix` (n_samples, n_features).
    ///
    /// The matrix is consumed and centered in place.
    ///
    /// # Errors
    /// Returns an error if the input has zero features, fewer than 2 samples,
    /// non-finite values, or if the underlying SVD/eigen/QR routine fails.
    pub fn fit(&mut self, mut data_matrix: Array2<f64>) -> Result<&mut Self, MfaError> {
        let (n_samples, n_features) = data_matrix.dim();
        if n_features == 0 {
            return Err(MfaError::InvalidTable {
                reason: "input matrix has zero features".to_string(),
            });
        }
        if n_samples < 2 {
            return Err(MfaError::InsufficientData {
                min_required: 2,
                actual: n_samples,
            });
        }
        ensure_finite(data_matrix.view())?;

        let mean_vector = data_matrix
            .mean_axis(Axis(0))
            .ok_or_else(|| MfaError::Decomposition("Failed to compute mean of the data.".into()))?;
        data_matrix -= &mean_vector;

        let dof = (n_samples - 1) as f64;
        let total_variance = data_matrix.iter().map(|v| v * v).sum::<f64>() / dof;

        let TruncatedSvd {
            singular_values,
            components,
        } = truncated_svd(&data_matrix, &self.params)?;

        let explained_variance = singular_values.mapv(|s_val| s_val.powi(2) / dof);
        let explained_variance_ratio = if total_variance > NORMALIZATION_THRESHOLD {
            explained_variance.mapv(|v| v / total_variance)
        } else {
            Array1::zeros(explained_variance.len())
        };

        let mut scores = data_matrix.dot(&components);
        if self.params.whiten {
            whiten_in_place(&mut scores, &explained_variance);
        }

        self.mean = Some(mean_vector);
        self.rotation = Some(components);
        self.singular_values = Some(singular_values);
        self.explained_variance = Some(explained_variance);
        self.explained_variance_ratio = Some(explained_variance_ratio);
        self.fit_scores = Some(scores);
        Ok(self)
    }

    /// Projects `x` (m_samples, n_features) onto the principal axes.
    ///
    /// The data is centered with the training mean; scores are whitened when
    /// the model was configured with `whiten`.
    ///
    /// # Errors
    /// Returns an error if the model is not fitted, if the feature count does
    /// not match, or if `x` contains non-finite values.
    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, MfaError> {
        let (mean_vector, rotation_matrix, explained_variance) =
            match (&self.mean, &self.rotation, &self.explained_variance) {
                (Some(m), Some(r), Some(ev)) => (m, r, ev),
                _ => return Err(MfaError::NotFitted),
            };
        if x.ncols() != mean_vector.len() {
            return Err(MfaError::DimensionMismatch {
                expected: mean_vector.len(),
                actual: x.ncols(),
            });
        }
        if x.nrows() == 0 {
            return Ok(Array2::zeros((0, rotation_matrix.ncols())));
        }
        ensure_finite(x)?;

        let mut centered = x.to_owned();
        centered -= mean_vector;
        let mut scores = centered.dot(rotation_matrix);
        if self.params.whiten {
            whiten_in_place(&mut scores, explained_variance);
        }
        Ok(scores)
    }

    /// Pearson correlation of every column of `x` with every component.
    ///
    /// With `same_input`, `x` is taken to be the training data and the scores
    /// cached at fit time are used; otherwise `x` is projected first.
    /// Returns a (n_features, k_components) matrix; constant columns give NaN.
    pub fn column_correlation(
        &self,
        x: ArrayView2<f64>,
        same_input: bool,
    ) -> Result<Array2<f64>, MfaError> {
        if same_input {
            let scores = self.fit_scores.as_ref().ok_or(MfaError::NotFitted)?;
            if scores.nrows() != x.nrows() {
                return Err(MfaError::DimensionMismatch {
                    expected: scores.nrows(),
                    actual: x.nrows(),
                });
            }
            Ok(pearson_matrix(x, scores.view()))
        } else {
            let scores = self.transform(x)?;
            Ok(pearson_matrix(x, scores.view()))
        }
    }
}

fn whiten_in_place(scores: &mut Array2<f64>, explained_variance: &Array1<f64>) {
    for (mut column, &variance) in scores.columns_mut().into_iter().zip(explained_variance) {
        if variance > NORMALIZATION_THRESHOLD {
            let sd = variance.sqrt();
            column.mapv_inplace(|v| v / sd);
        }
    }
}

/// Pearson correlation between each column of `x` and each column of `y`.
/// Shape: (x.ncols(), y.ncols()). Pairs involving a constant column are NaN.
pub(crate) fn pearson_matrix(x: ArrayView2<f64>, y: ArrayView2<f64>) -> Array2<f64> {
    fn center(m: ArrayView2<f64>) -> (Array2<f64>, Array1<f64>) {
        let mut c = m.to_owned();
        if let Some(mean) = m.mean_axis(Axis(0)) {
            c -= &mean;
        }
        let norms = c.map_axis(Axis(0), |col: ArrayView1<f64>| col.dot(&col).sqrt());
        (c, norms)
    }
    let (xc, x_norms) = center(x);
    let (yc, y_norms) = center(y);
    let mut corr = xc.t().dot(&yc);
    for ((i, j), value) in corr.indexed_iter_mut() {
        let denom = x_norms[i] * y_norms[j];
        *value = if denom > NORMALIZATION_THRESHOLD {
            (*value / denom).clamp(-1.0, 1.0)
        } else {
            f64::NAN
        };
    }
    corr
}

/// Leading singular values and right singular vectors of a centered matrix.
#[derive(Debug)]
pub(crate) struct TruncatedSvd {
    /// Descending. Shape: (k)
    pub singular_values: Array1<f64>,
    /// Unit right singular vectors as columns. Shape: (n_features, k)
    pub components: Array2<f64>,
}

/// Computes the truncated SVD of `matrix` (already centered) with the solver,
/// component count, tolerance and seed from `params`.
///
/// The number of components is `min(n_components, n_samples, n_features)`,
/// further reduced by `tolerance`. Every axis is normalized and its sign fixed
/// so that its largest-magnitude loading is positive.
pub(crate) fn truncated_svd(
    matrix: &Array2<f64>,
    params: &DecompositionParams,
) -> Result<TruncatedSvd, MfaError> {
    let (n_samples, n_features) = matrix.dim();
    if n_samples == 0 || n_features == 0 {
        return Err(MfaError::InvalidTable {
            reason: "matrix has zero samples or zero features".to_string(),
        });
    }
    params.validate()?;
    let max_possible_rank = n_samples.min(n_features);
    let k_requested = params.n_components.min(max_possible_rank);
    let solver = params
        .solver
        .resolve(n_samples, n_features, k_requested, params.batch_size);
    debug!(
        "Truncated SVD of {}x{} matrix: solver={}, k={}",
        n_samples, n_features, solver, k_requested
    );

    let (singular_values, components) = match solver {
        ResolvedSolver::Full => full_svd(matrix, k_requested)?,
        ResolvedSolver::Covariance => covariance_svd(matrix, k_requested, params.batch_size)?,
        ResolvedSolver::Randomized => randomized_svd(
            matrix,
            k_requested,
            params.iterated_power,
            params.random_seed,
        )?,
    };

    let mut n_components_to_keep = singular_values.len().min(components.ncols());
    if let Some(tolerance_value) = params.tolerance {
        let largest_singular_value = singular_values.get(0).copied().unwrap_or(0.0);
        let rank_by_tolerance = if largest_singular_value > NORMALIZATION_THRESHOLD {
            let threshold = tolerance_value * largest_singular_value;
            singular_values
                .iter()
                .take_while(|&&s_val| s_val > threshold)
                .count()
        } else {
            0
        };
        if rank_by_tolerance < n_components_to_keep {
            warn!(
                "Tolerance {} keeps {} of {} components.",
                tolerance_value, rank_by_tolerance, n_components_to_keep
            );
        }
        n_components_to_keep = n_components_to_keep.min(rank_by_tolerance);
    }

    let singular_values = singular_values.slice(s![..n_components_to_keep]).to_owned();
    let mut components = components
        .slice(s![.., ..n_components_to_keep])
        .to_owned();
    for mut column_vec in components.columns_mut() {
        let norm_value = column_vec.dot(&column_vec).sqrt();
        if norm_value > NORMALIZATION_THRESHOLD {
            column_vec.mapv_inplace(|val| val / norm_value);
        } else {
            column_vec.fill(0.0);
        }
        let pivot = column_vec
            .iter()
            .copied()
            .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
        if pivot < 0.0 {
            column_vec.mapv_inplace(|val| -val);
        }
    }

    Ok(TruncatedSvd {
        singular_values,
        components,
    })
}

/// Exact SVD of the whole matrix; keeps the first `k` right singular vectors.
fn full_svd(matrix: &Array2<f64>, k: usize) -> Result<(Array1<f64>, Array2<f64>), MfaError> {
    let svd = NdarrayLinAlgBackend
        .svd_into(matrix.clone(), false, true)
        .map_err(|e| MfaError::Decomposition(format!("SVD of centered matrix failed: {}", e)))?;
    let vt = svd
        .vt
        .ok_or_else(|| MfaError::Decomposition("SVD V^T not computed.".into()))?;
    let k = k.min(svd.s.len()).min(vt.nrows());
    let singular_values = svd.s.slice(s![..k]).mapv(|v| v.max(0.0));
    let components = vt.slice(s![..k, ..]).t().to_owned();
    Ok((singular_values, components))
}

/// Eigen-decomposition route.
///
/// - If p <= n, eigendecompose the p x p scatter matrix `X^T X`, accumulated
///   over row batches of `batch_size`.
/// - If p > n, eigendecompose the n x n Gram matrix `X X^T` and map the
///   eigenvectors back to feature space ("Gram trick").
fn covariance_svd(
    matrix: &Array2<f64>,
    k: usize,
    batch_size: Option<usize>,
) -> Result<(Array1<f64>, Array2<f64>), MfaError> {
    let (n_samples, n_features) = matrix.dim();

    if n_features <= n_samples {
        let batch = batch_size.unwrap_or(n_samples).max(1);
        let mut scatter = Array2::<f64>::zeros((n_features, n_features));
        for (batch_idx, chunk) in matrix.axis_chunks_iter(Axis(0), batch).enumerate() {
            trace!("Accumulating scatter batch {} ({} rows)", batch_idx, chunk.nrows());
            scatter += &chunk.t().dot(&chunk);
        }
        let eig = NdarrayLinAlgBackend
            .eigh_upper(&scatter)
            .map_err(|e| MfaError::Decomposition(format!("Eigen decomposition of scatter matrix failed: {}", e)))?;
        let eig_pairs = sorted_eigenpairs(eig.eigenvalues, eig.eigenvectors);

        let k = k.min(eig_pairs.len());
        let mut singular_values = Array1::<f64>::zeros(k);
        let mut components = Array2::<f64>::zeros((n_features, k));
        for (i, (eigval, eigvec)) in eig_pairs.into_iter().take(k).enumerate() {
            singular_values[i] = eigval.max(0.0).sqrt();
            components.column_mut(i).assign(&eigvec);
        }
        Ok((singular_values, components))
    } else {
        if batch_size.is_some() {
            debug!("batch_size is ignored on the Gram path (n_features > n_samples).");
        }
        let gram_matrix = matrix.dot(&matrix.t());
        let eig = NdarrayLinAlgBackend
            .eigh_upper(&gram_matrix)
            .map_err(|e| MfaError::Decomposition(format!("Eigen decomposition of Gram matrix failed: {}", e)))?;
        let eig_pairs = sorted_eigenpairs(eig.eigenvalues, eig.eigenvectors);

        let k = k.min(eig_pairs.len());
        let mut singular_values = Array1::<f64>::zeros(k);
        let mut components = Array2::<f64>::zeros((n_features, k));
        for (i, (eigval, u_col)) in eig_pairs.into_iter().take(k).enumerate() {
            let sigma = eigval.max(0.0).sqrt();
            singular_values[i] = sigma;
            // v_i = X^T u_i / sigma_i
            if sigma > NORMALIZATION_THRESHOLD {
                let axis_i = matrix.t().dot(&u_col) / sigma;
                components.column_mut(i).assign(&axis_i);
            }
        }
        Ok((singular_values, components))
    }
}

/// Pairs eigenvalues with their eigenvectors, sorted by descending eigenvalue.
fn sorted_eigenpairs(values: Array1<f64>, vectors: Array2<f64>) -> Vec<(f64, Array1<f64>)> {
    let mut eig_pairs: Vec<(f64, Array1<f64>)> = values
        .iter()
        .copied()
        .zip(vectors.columns().into_iter().map(|col| col.to_owned()))
        .collect();
    eig_pairs.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    eig_pairs
}

/// Randomized SVD (Halko, Martinsson, Tropp, 2011).
///
/// - If p <= n, sketch `A` directly: `Y = A Omega'` (n x l), orthonormalize,
///   refine with power iterations, SVD `B = Q^T A` (l x p) and take `V`.
/// - If p > n, sketch `A^T`: `Y = A^T Omega` (p x l), orthonormalize,
///   refine, SVD `B = (A Q)^T` (l x n) and take `Q U`.
fn randomized_svd(
    a: &Array2<f64>,
    k: usize,
    n_power_iterations: usize,
    seed: Option<u64>,
) -> Result<(Array1<f64>, Array2<f64>), MfaError> {
    let (n_samples, n_features) = a.dim();
    let max_possible_rank = n_samples.min(n_features);

    let p_oversamples = ((k as f64 * 0.1).ceil() as usize)
        .clamp(RANDOMIZED_P_LOWER_BOUND, RANDOMIZED_P_UPPER_BOUND);
    let l_sketch_components = (k + p_oversamples)
        .min(max_possible_rank)
        .max(k.min(max_possible_rank))
        .max(1);

    let mut rng = match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_rng(rand::thread_rng())
            .map_err(|e| MfaError::Decomposition(format!("Failed to initialize RNG: {}", e)))?,
    };
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| MfaError::Decomposition(format!("Failed to create Normal distribution: {}", e)))?;

    let orthonormal = |m: Array2<f64>, what: &str| -> Result<Array2<f64>, MfaError> {
        NdarrayLinAlgBackend
            .qr_q_factor(&m)
            .map_err(|e| MfaError::Decomposition(format!("QR decomposition of {} failed: {}", what, e)))
    };

    let (singular_values, rotation_sketch) = if n_features <= n_samples {
        let omega = Array2::from_shape_fn((n_features, l_sketch_components), |_| rng.sample(&normal));
        let mut q_basis = orthonormal(a.dot(&omega), "initial sketch of A")?;
        for i in 0..n_power_iterations {
            let w_basis = orthonormal(a.t().dot(&q_basis), &format!("A^T Q (power iteration {})", i))?;
            q_basis = orthonormal(a.dot(&w_basis), &format!("A W (power iteration {})", i))?;
        }
        let b_projected = q_basis.t().dot(a); // l x p
        let svd = NdarrayLinAlgBackend
            .svd_into(b_projected, false, true)
            .map_err(|e| MfaError::Decomposition(format!("SVD of projected sketch failed: {}", e)))?;
        let vt = svd
            .vt
            .ok_or_else(|| MfaError::Decomposition("SVD V^T not computed from projected sketch.".into()))?;
        let rank = svd.s.len();
        (svd.s, vt.slice(s![..rank, ..]).t().to_owned())
    } else {
        let omega = Array2::from_shape_fn((n_samples, l_sketch_components), |_| rng.sample(&normal));
        let mut q_basis = orthonormal(a.t().dot(&omega), "initial sketch of A^T")?;
        for i in 0..n_power_iterations {
            let w_basis = orthonormal(a.dot(&q_basis), &format!("A Q (power iteration {})", i))?;
            q_basis = orthonormal(a.t().dot(&w_basis), &format!("A^T W (power iteration {})", i))?;
        }
        let b_projected = a.dot(&q_basis).t().to_owned(); // l x n
        let svd = NdarrayLinAlgBackend
            .svd_into(b_projected, true, false)
            .map_err(|e| MfaError::Decomposition(format!("SVD of projected sketch failed: {}", e)))?;
        let u_b = svd
            .u
            .ok_or_else(|| MfaError::Decomposition("SVD U not computed from projected sketch.".into()))?;
        let rank = svd.s.len();
        (svd.s, q_basis.dot(&u_b.slice(s![.., ..rank])))
    };

    let k = k.min(singular_values.len());
    Ok((
        singular_values.slice(s![..k]).to_owned(),
        rotation_sketch.slice(s![.., ..k]).to_owned(),
    ))
}
