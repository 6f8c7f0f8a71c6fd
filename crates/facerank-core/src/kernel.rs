//! Kernel functions of the soft-margin classifier.
//!
//! A kernel fills the training Gram matrix once per fit and a kernel row
//! against the stored support vectors for every scored sample.

use crate::config::{ClassifierConfig, KernelKind};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

/// Kernel function of the soft-margin classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    Rbf { gamma: f64 },
    Linear,
}

impl Kernel {
    pub fn from_config(config: &ClassifierConfig) -> Self {
        match config.kernel {
            KernelKind::Rbf => Kernel::Rbf { gamma: config.gamma },
            KernelKind::Linear => Kernel::Linear,
        }
    }

    pub fn compute(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        match *self {
            Kernel::Rbf { gamma } => {
                let dist2: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
                (-gamma * dist2).exp()
            }
            Kernel::Linear => a.dot(&b),
        }
    }

    /// Full n×n kernel matrix over the rows of `x`.
    pub fn matrix(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let dots = x.dot(&x.t());
        match *self {
            Kernel::Rbf { gamma } => {
                let norms = dots.diag().to_owned();
                let mut k = dots;
                for ((i, j), v) in k.indexed_iter_mut() {
                    let dist2 = (norms[i] + norms[j] - 2.0 * *v).max(0.0);
                    *v = (-gamma * dist2).exp();
                }
                k
            }
            Kernel::Linear => dots,
        }
    }

    /// Kernel values between `sample` and every row of `rows`.
    pub fn against_rows(&self, rows: ArrayView2<'_, f64>, sample: ArrayView1<'_, f64>) -> Vec<f64> {
        rows.axis_iter(Axis(0))
            .map(|row| self.compute(row, sample))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_rbf_identical_is_one() {
        let k = Kernel::Rbf { gamma: 0.5 };
        let a = array![1.0, -2.0, 3.0];
        assert!((k.compute(a.view(), a.view()) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rbf_value() {
        let k = Kernel::Rbf { gamma: 0.1 };
        let a = array![0.0, 0.0];
        let b = array![3.0, 4.0];
        let expected = (-0.1f64 * 25.0).exp();
        assert!((k.compute(a.view(), b.view()) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_linear_value() {
        let a = array![1.0, 2.0];
        let b = array![3.0, -1.0];
        assert_eq!(Kernel::Linear.compute(a.view(), b.view()), 1.0);
    }

    #[test]
    fn test_matrix_matches_pairwise() {
        let x = array![[0.0, 1.0], [2.0, -1.0], [0.5, 0.5]];
        for kernel in [Kernel::Rbf { gamma: 0.3 }, Kernel::Linear] {
            let m = kernel.matrix(x.view());
            for i in 0..3 {
                for j in 0..3 {
                    let direct = kernel.compute(x.row(i), x.row(j));
                    assert!((m[[i, j]] - direct).abs() < 1e-12, "{kernel:?} ({i}, {j})");
                }
            }
        }
    }

    #[test]
    fn test_from_config() {
        let config = ClassifierConfig::default();
        assert_eq!(Kernel::from_config(&config), Kernel::Rbf { gamma: 0.001 });
        let linear = ClassifierConfig {
            kernel: KernelKind::Linear,
            ..ClassifierConfig::default()
        };
        assert_eq!(Kernel::from_config(&linear), Kernel::Linear);
    }
}
