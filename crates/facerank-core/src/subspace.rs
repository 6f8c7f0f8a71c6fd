//! Subspace reducer: whitened principal component projection.
//!
//! `fit` learns a mean face, an orthonormal basis of maximal-variance
//! directions and one whitening scale per direction. The resulting
//! [`SubspaceModel`] is immutable and only used through `project`.

use crate::config::{SubspaceConfig, SvdSolver};
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use thiserror::Error;

/// Components whose variance is below this fraction of the largest one carry
/// no training signal and cannot be whitened.
const NULL_VARIANCE_RATIO: f64 = 1e-10;

#[derive(Error, Debug)]
pub enum SubspaceError {
    #[error("n_components must be at least 1")]
    ZeroComponents,
    #[error("training matrix has no pixel columns")]
    NoFeatures,
    #[error("need at least 2 samples to estimate variance, got {0}")]
    TooFewSamples(usize),
    #[error("training data has no variance: every sample is identical")]
    Degenerate,
    #[error("sample has {actual} values, subspace was fitted on {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Learned projection: mean, k×pixels orthonormal basis, per-component scale.
#[derive(Debug, Clone)]
pub struct SubspaceModel {
    mean: Array1<f64>,
    basis: Array2<f64>,
    scale: Array1<f64>,
    explained_variance: Array1<f64>,
    total_variance: f64,
}

/// Singular values (descending) and the matching right singular vectors as rows.
struct Decomposition {
    singular_values: Array1<f64>,
    components: Array2<f64>,
}

/// Fit a subspace model on a training matrix (rows = samples).
pub fn fit(
    x: ArrayView2<'_, f64>,
    config: &SubspaceConfig,
) -> Result<SubspaceModel, SubspaceError> {
    let (n_samples, n_features) = x.dim();
    if config.n_components == 0 {
        return Err(SubspaceError::ZeroComponents);
    }
    if n_features == 0 {
        return Err(SubspaceError::NoFeatures);
    }
    if n_samples < 2 {
        return Err(SubspaceError::TooFewSamples(n_samples));
    }

    let max_rank = n_samples.min(n_features);
    let requested = if config.n_components > max_rank {
        tracing::warn!(
            requested = config.n_components,
            clamped_to = max_rank,
            n_samples,
            n_features,
            "n_components exceeds min(n_samples, n_features); clamping"
        );
        max_rank
    } else {
        config.n_components
    };

    let mean = x
        .mean_axis(Axis(0))
        .ok_or(SubspaceError::TooFewSamples(n_samples))?;
    let centered = &x - &mean;
    let dof = (n_samples - 1) as f64;
    let total_variance = centered.iter().map(|v| v * v).sum::<f64>() / dof;

    let decomposition = match config.solver {
        SvdSolver::Full => full_svd(&centered, requested),
        SvdSolver::Randomized => randomized_svd(&centered, requested, config),
    };

    let variance = decomposition.singular_values.mapv(|s| s * s / dof);
    let largest = variance.first().copied().unwrap_or(0.0);
    if !(largest > 0.0) {
        return Err(SubspaceError::Degenerate);
    }

    let keep = variance
        .iter()
        .take_while(|&&v| v > largest * NULL_VARIANCE_RATIO)
        .count();
    if keep < requested {
        tracing::warn!(
            requested,
            retained = keep,
            "dropping components with no training variance"
        );
    }

    let basis = decomposition.components.slice(s![..keep, ..]).to_owned();
    let explained_variance = variance.slice(s![..keep]).to_owned();
    let scale = if config.whiten {
        explained_variance.mapv(|v| 1.0 / v.sqrt())
    } else {
        Array1::ones(keep)
    };

    tracing::info!(
        solver = ?config.solver,
        components = keep,
        n_samples,
        n_features,
        explained = explained_variance.sum() / total_variance,
        whiten = config.whiten,
        "subspace fitted"
    );

    Ok(SubspaceModel {
        mean,
        basis,
        scale,
        explained_variance,
        total_variance,
    })
}

impl SubspaceModel {
    /// Project every row of `x` into the reduced space.
    pub fn project(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, SubspaceError> {
        if x.ncols() != self.mean.len() {
            return Err(SubspaceError::DimensionMismatch {
                expected: self.mean.len(),
                actual: x.ncols(),
            });
        }
        let centered = &x - &self.mean;
        let mut projected = centered.dot(&self.basis.t());
        projected *= &self.scale;
        Ok(projected)
    }

    /// Project a single sample; identical to the matching row of [`project`](Self::project).
    pub fn project_one(&self, sample: ArrayView1<'_, f64>) -> Result<Array1<f64>, SubspaceError> {
        let projected = self.project(sample.insert_axis(Axis(0)))?;
        Ok(projected.row(0).to_owned())
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Orthonormal basis, one component per row.
    pub fn basis(&self) -> &Array2<f64> {
        &self.basis
    }

    /// Per-component multiplier applied after projection (1.0 without whitening).
    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    /// Training variance along each retained component.
    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }

    /// Fraction of total training variance captured by each component.
    pub fn explained_variance_ratio(&self) -> Array1<f64> {
        &self.explained_variance / self.total_variance
    }

    /// Dimensionality of the reduced space.
    pub fn n_components(&self) -> usize {
        self.basis.nrows()
    }

    /// Expected length of an input sample.
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }
}

/// Exact decomposition through the smaller of X·Xᵗ (n×n) and Xᵗ·X (p×p).
fn full_svd(centered: &Array2<f64>, k: usize) -> Decomposition {
    let (n, p) = centered.dim();
    if n <= p {
        let gram = centered.dot(&centered.t());
        right_vectors_from_gram(centered, &gram, k)
    } else {
        let cov = centered.t().dot(centered);
        let (values, vectors) = sorted_eigen(&cov);
        let k = k.min(p);
        let singular_values = values.iter().take(k).map(|&l| l.max(0.0).sqrt()).collect();
        let mut components = vectors.slice(s![.., ..k]).t().to_owned();
        flip_signs(&mut components);
        Decomposition {
            singular_values,
            components,
        }
    }
}

/// Randomized range finder (Halko, Martinsson, Tropp 2011).
///
/// Sketches the row space of X with a seeded Gaussian matrix, sharpens it
/// with QR-orthonormalized power iterations, then solves exactly inside the
/// sketch. When `k + oversamples` reaches the data rank the result is exact.
fn randomized_svd(centered: &Array2<f64>, k: usize, config: &SubspaceConfig) -> Decomposition {
    let (n, p) = centered.dim();
    let sketch = (k + config.oversamples).min(n.min(p));

    let mut rng = StdRng::seed_from_u64(config.seed);
    let omega = Array2::from_shape_fn((p, sketch), |_| rng.sample::<f64, _>(StandardNormal));

    let mut q = orthonormalize(&centered.dot(&omega)); // n × sketch
    for _ in 0..config.power_iterations {
        let z = orthonormalize(&centered.t().dot(&q)); // p × sketch
        q = orthonormalize(&centered.dot(&z));
    }

    // B = Qᵗ X has the same leading right singular vectors as X.
    let b = q.t().dot(centered);
    let gram = b.dot(&b.t());
    right_vectors_from_gram(&b, &gram, k)
}

/// Given A and its Gram matrix A·Aᵗ = U Σ² Uᵗ, recover the top-k rows of Vᵗ
/// as Aᵗ u / σ.
fn right_vectors_from_gram(a: &Array2<f64>, gram: &Array2<f64>, k: usize) -> Decomposition {
    let (values, vectors) = sorted_eigen(gram);
    let k = k.min(values.len());
    let mut singular_values = Array1::zeros(k);
    let mut components = Array2::zeros((k, a.ncols()));

    for i in 0..k {
        let sigma = values[i].max(0.0).sqrt();
        singular_values[i] = sigma;
        if sigma > 0.0 {
            let v = a.t().dot(&vectors.column(i)) / sigma;
            components.row_mut(i).assign(&v);
        }
    }

    flip_signs(&mut components);
    Decomposition {
        singular_values,
        components,
    }
}

/// Symmetric eigendecomposition, eigenpairs sorted by descending eigenvalue.
/// Eigenvectors are returned as columns.
fn sorted_eigen(m: &Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let n = m.nrows();
    // Average with the transpose; products like X·Xᵗ are only symmetric up to rounding.
    let sym = DMatrix::from_fn(n, n, |i, j| 0.5 * (m[[i, j]] + m[[j, i]]));
    let eigen = SymmetricEigen::new(sym);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let values = order.iter().map(|&i| eigen.eigenvalues[i]).collect();
    let vectors = Array2::from_shape_fn((n, n), |(r, c)| eigen.eigenvectors[(r, order[c])]);
    (values, vectors)
}

/// Orthonormal basis for the column space of a tall matrix (Householder QR).
fn orthonormalize(a: &Array2<f64>) -> Array2<f64> {
    let (rows, cols) = a.dim();
    let m = DMatrix::from_fn(rows, cols, |i, j| a[[i, j]]);
    let q = m.qr().q();
    Array2::from_shape_fn((rows, q.ncols()), |(i, j)| q[(i, j)])
}

/// Make the largest-magnitude loading of every component positive, so the
/// basis does not depend on the solver's sign convention.
fn flip_signs(components: &mut Array2<f64>) {
    for mut row in components.rows_mut() {
        let pivot = row
            .iter()
            .copied()
            .fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
        if pivot < 0.0 {
            row.mapv_inplace(|v| -v);
        }
    }
}
