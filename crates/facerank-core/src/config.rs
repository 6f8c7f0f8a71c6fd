//! Model hyperparameters.
//!
//! Defaults reproduce the reference sizing: 300 whitened components from a
//! randomized decomposition, RBF kernel with C=1000 and gamma=0.001,
//! balanced class weights, 5-fold Platt calibration.

use serde::{Deserialize, Serialize};

/// Full set of training parameters for a recognition model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub subspace: SubspaceConfig,
    pub classifier: ClassifierConfig,
}

/// Decomposition strategy for the subspace reducer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SvdSolver {
    /// Exact eigendecomposition of the smaller Gram/covariance matrix.
    Full,
    /// Gaussian sketch + power iterations, then an exact solve in the sketch.
    #[default]
    Randomized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubspaceConfig {
    /// Requested number of retained components (clamped to the data rank).
    pub n_components: usize,
    /// Rescale projected coordinates to unit training variance.
    pub whiten: bool,
    pub solver: SvdSolver,
    /// Extra sketch columns for the randomized solver.
    pub oversamples: usize,
    /// Power iterations for the randomized solver.
    pub power_iterations: usize,
    /// Seed of the Gaussian sketch.
    pub seed: u64,
}

impl Default for SubspaceConfig {
    fn default() -> Self {
        Self {
            n_components: 300,
            whiten: true,
            solver: SvdSolver::Randomized,
            oversamples: 10,
            power_iterations: 7,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelKind {
    /// exp(-gamma * |a - b|^2)
    #[default]
    Rbf,
    /// a · b
    Linear,
}

/// Per-class multiplier applied to the regularization strength.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassWeight {
    /// n_samples / (n_classes * class_count)
    #[default]
    Balanced,
    /// 1.0 for every class.
    Uniform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierConfig {
    pub kernel: KernelKind,
    /// Soft-margin regularization strength.
    pub c: f64,
    /// RBF kernel width; ignored by the linear kernel.
    pub gamma: f64,
    pub class_weight: ClassWeight,
    /// KKT violation tolerance of the dual solver.
    pub tolerance: f64,
    /// Cross-validation folds used to fit the probability sigmoids.
    pub probability_folds: usize,
    /// Seed of the cross-validation shuffle.
    pub seed: u64,
    /// Iteration cap of the dual solver; `None` means max(10_000_000, 100 * n).
    pub max_iterations: Option<usize>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            kernel: KernelKind::Rbf,
            c: 1000.0,
            gamma: 0.001,
            class_weight: ClassWeight::Balanced,
            tolerance: 1e-3,
            probability_folds: 5,
            seed: 0,
            max_iterations: None,
        }
    }
}
