//! Binary soft-margin dual solver.
//!
//! Sequential minimal optimization with second-order working set
//! selection (Fan, Chen, Lin 2005), as used by libsvm:
//!
//! ```text
//! min  ½ αᵗQα − eᵗα   s.t.  yᵗα = 0,  0 ≤ αᵢ ≤ Cᵢ,   Qᵢⱼ = yᵢyⱼK(xᵢ, xⱼ)
//! ```
//!
//! The per-sample bound `Cᵢ` carries the class weight.

use ndarray::Array2;

/// Floor for the curvature along the update direction.
const TAU: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
pub(crate) struct SolverParams {
    /// Stop once the maximal KKT violation drops below this.
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl SolverParams {
    /// libsvm's cap: max(10_000_000, 100 * l).
    pub fn default_max_iterations(l: usize) -> usize {
        l.saturating_mul(100).max(10_000_000)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct BinarySolution {
    /// One multiplier per training point, same order as the input indices.
    pub alpha: Vec<f64>,
    /// Offset: f(x) = Σ αᵢyᵢK(xᵢ, x) − rho.
    pub rho: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// A two-class subproblem drawn from a precomputed kernel matrix.
pub(crate) struct BinaryProblem<'a> {
    /// Kernel matrix over the whole training set.
    pub gram: &'a Array2<f64>,
    /// Rows of `gram` that take part in this subproblem.
    pub indices: &'a [usize],
    /// +1.0 / −1.0 per point.
    pub y: &'a [f64],
    /// Box bound Cᵢ per point.
    pub upper: &'a [f64],
}

impl BinaryProblem<'_> {
    fn kernel(&self, i: usize, j: usize) -> f64 {
        self.gram[[self.indices[i], self.indices[j]]]
    }

    fn q(&self, i: usize, j: usize) -> f64 {
        self.y[i] * self.y[j] * self.kernel(i, j)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Solve the dual.
    pub fn solve(&self, params: &SolverParams) -> BinarySolution {
        let l = self.len();
        let mut alpha = vec![0.0; l];
        // ∇f(α) = Qα − e, starting from α = 0
        let mut grad = vec![-1.0; l];
        let mut iterations = 0;
        let mut converged = false;

        while iterations < params.max_iterations {
            let Some((i, j)) = self.select_working_set(&alpha, &grad, params.tolerance) else {
                converged = true;
                break;
            };
            iterations += 1;

            let (old_i, old_j) = (alpha[i], alpha[j]);
            self.update_pair(i, j, &mut alpha, &grad);

            let (delta_i, delta_j) = (alpha[i] - old_i, alpha[j] - old_j);
            for (t, g) in grad.iter_mut().enumerate() {
                *g += self.q(t, i) * delta_i + self.q(t, j) * delta_j;
            }
        }

        let rho = self.calculate_rho(&alpha, &grad);
        BinarySolution {
            alpha,
            rho,
            iterations,
            converged,
        }
    }

    fn is_upper(&self, alpha: &[f64], t: usize) -> bool {
        alpha[t] >= self.upper[t]
    }

    fn is_lower(alpha: &[f64], t: usize) -> bool {
        alpha[t] <= 0.0
    }

    /// Returns `None` when the KKT conditions hold within `tolerance`.
    fn select_working_set(
        &self,
        alpha: &[f64],
        grad: &[f64],
        tolerance: f64,
    ) -> Option<(usize, usize)> {
        let l = self.len();

        // i maximizes −yₜ∇f(α)ₜ over the points that can still move up
        let mut g_max = f64::NEG_INFINITY;
        let mut best_i = None;
        for t in 0..l {
            let movable = if self.y[t] > 0.0 {
                !self.is_upper(alpha, t)
            } else {
                !Self::is_lower(alpha, t)
            };
            let score = -self.y[t] * grad[t];
            if movable && score >= g_max {
                g_max = score;
                best_i = Some(t);
            }
        }
        let i = best_i?;

        // j minimizes the second-order decrease of the objective
        let mut g_max2 = f64::NEG_INFINITY;
        let mut obj_min = f64::INFINITY;
        let mut best_j = None;
        let k_ii = self.kernel(i, i);
        for t in 0..l {
            let movable = if self.y[t] > 0.0 {
                !Self::is_lower(alpha, t)
            } else {
                !self.is_upper(alpha, t)
            };
            if !movable {
                continue;
            }
            let score = self.y[t] * grad[t];
            if score >= g_max2 {
                g_max2 = score;
            }
            let grad_diff = g_max + score;
            if grad_diff > 0.0 {
                let quad = (k_ii + self.kernel(t, t) - 2.0 * self.kernel(i, t)).max(TAU);
                let obj = -(grad_diff * grad_diff) / quad;
                if obj <= obj_min {
                    obj_min = obj;
                    best_j = Some(t);
                }
            }
        }

        if g_max + g_max2 < tolerance {
            return None;
        }
        best_j.map(|j| (i, j))
    }

    /// Analytic two-variable update, clipped to the feasible box.
    fn update_pair(&self, i: usize, j: usize, alpha: &mut [f64], grad: &[f64]) {
        let (c_i, c_j) = (self.upper[i], self.upper[j]);
        let quad = (self.kernel(i, i) + self.kernel(j, j) - 2.0 * self.kernel(i, j)).max(TAU);

        if self.y[i] != self.y[j] {
            let delta = (-grad[i] - grad[j]) / quad;
            let diff = alpha[i] - alpha[j];
            alpha[i] += delta;
            alpha[j] += delta;

            if diff > 0.0 {
                if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = diff;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = -diff;
            }
            if diff > c_i - c_j {
                if alpha[i] > c_i {
                    alpha[i] = c_i;
                    alpha[j] = c_i - diff;
                }
            } else if alpha[j] > c_j {
                alpha[j] = c_j;
                alpha[i] = c_j + diff;
            }
        } else {
            let delta = (grad[i] - grad[j]) / quad;
            let sum = alpha[i] + alpha[j];
            alpha[i] -= delta;
            alpha[j] += delta;

            if sum > c_i {
                if alpha[i] > c_i {
                    alpha[i] = c_i;
                    alpha[j] = sum - c_i;
                }
            } else if alpha[j] < 0.0 {
                alpha[j] = 0.0;
                alpha[i] = sum;
            }
            if sum > c_j {
                if alpha[j] > c_j {
                    alpha[j] = c_j;
                    alpha[i] = sum - c_j;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = sum;
            }
        }
    }

    /// Offset from free support vectors, or the midpoint of the feasible
    /// interval when every multiplier sits on a bound.
    fn calculate_rho(&self, alpha: &[f64], grad: &[f64]) -> f64 {
        let mut upper_bound = f64::INFINITY;
        let mut lower_bound = f64::NEG_INFINITY;
        let mut free_count = 0usize;
        let mut free_sum = 0.0;

        for t in 0..self.len() {
            let yg = self.y[t] * grad[t];
            let positive = self.y[t] > 0.0;
            if self.is_upper(alpha, t) {
                if positive {
                    lower_bound = lower_bound.max(yg);
                } else {
                    upper_bound = upper_bound.min(yg);
                }
            } else if Self::is_lower(alpha, t) {
                if positive {
                    upper_bound = upper_bound.min(yg);
                } else {
                    lower_bound = lower_bound.max(yg);
                }
            } else {
                free_count += 1;
                free_sum += yg;
            }
        }

        if free_count > 0 {
            free_sum / free_count as f64
        } else {
            (upper_bound + lower_bound) / 2.0
        }
    }
}

impl BinarySolution {
    /// Decision value for a point given its kernel values against the
    /// subproblem's training points.
    pub fn decision(&self, y: &[f64], kernel_values: impl Iterator<Item = f64>) -> f64 {
        self.alpha
            .iter()
            .zip(y)
            .zip(kernel_values)
            .map(|((a, y), k)| a * y * k)
            .sum::<f64>()
            - self.rho
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Kernel;
    use ndarray::{array, Array2};

    fn params() -> SolverParams {
        SolverParams {
            tolerance: 1e-3,
            max_iterations: 100_000,
        }
    }

    fn decision_at(
        gram: &Array2<f64>,
        indices: &[usize],
        y: &[f64],
        solution: &BinarySolution,
        row: usize,
    ) -> f64 {
        solution.decision(y, indices.iter().map(|&i| gram[[i, row]]))
    }

    #[test]
    fn test_linear_separable_1d() {
        let x = array![[-2.0], [-1.0], [1.0], [2.0]];
        let gram = Kernel::Linear.matrix(x.view());
        let indices = [0, 1, 2, 3];
        let y = [-1.0, -1.0, 1.0, 1.0];
        let upper = [1000.0; 4];
        let problem = BinaryProblem {
            gram: &gram,
            indices: &indices,
            y: &y,
            upper: &upper,
        };

        let solution = problem.solve(&params());
        assert!(solution.converged);

        // Maximum margin: w = 1, b = 0, support vectors at ±1
        assert!(solution.alpha[0].abs() < 1e-6);
        assert!(solution.alpha[3].abs() < 1e-6);
        assert!((solution.alpha[1] - 0.5).abs() < 1e-2);
        assert!((solution.alpha[2] - 0.5).abs() < 1e-2);
        assert!(solution.rho.abs() < 1e-2);

        for (row, expected) in [(0, -2.0), (1, -1.0), (2, 1.0), (3, 2.0)] {
            let f = decision_at(&gram, &indices, &y, &solution, row);
            assert!((f - expected).abs() < 2e-2, "f(x{row}) = {f}, expected {expected}");
        }
    }

    #[test]
    fn test_equality_constraint_and_box_hold() {
        // Overlapping classes force bounded multipliers
        let x = array![[0.0, 0.0], [1.0, 0.2], [0.2, 1.0], [0.9, 0.9], [0.5, 0.4], [0.4, 0.6]];
        let gram = Kernel::Rbf { gamma: 1.0 }.matrix(x.view());
        let indices = [0, 1, 2, 3, 4, 5];
        let y = [1.0, 1.0, 1.0, -1.0, -1.0, -1.0];
        let upper = [0.5, 0.5, 0.5, 2.0, 2.0, 2.0];
        let problem = BinaryProblem {
            gram: &gram,
            indices: &indices,
            y: &y,
            upper: &upper,
        };

        let solution = problem.solve(&params());
        assert!(solution.converged);
        let balance: f64 = solution.alpha.iter().zip(&y).map(|(a, y)| a * y).sum();
        assert!(balance.abs() < 1e-9, "yᵗα = {balance}");
        for (a, c) in solution.alpha.iter().zip(&upper) {
            assert!(*a >= 0.0 && *a <= *c + 1e-12, "alpha {a} outside [0, {c}]");
        }
    }

    #[test]
    fn test_subset_indices() {
        // Solve on rows 1 and 3 only of a larger kernel matrix
        let x = array![[100.0], [-1.0], [55.0], [1.0]];
        let gram = Kernel::Linear.matrix(x.view());
        let indices = [1, 3];
        let y = [-1.0, 1.0];
        let upper = [10.0, 10.0];
        let problem = BinaryProblem {
            gram: &gram,
            indices: &indices,
            y: &y,
            upper: &upper,
        };

        let solution = problem.solve(&params());
        let f_neg = decision_at(&gram, &indices, &y, &solution, 1);
        let f_pos = decision_at(&gram, &indices, &y, &solution, 3);
        assert!(f_neg < 0.0 && f_pos > 0.0);
    }

    #[test]
    fn test_iteration_cap() {
        let x = array![[-2.0], [-1.0], [1.0], [2.0]];
        let gram = Kernel::Linear.matrix(x.view());
        let indices = [0, 1, 2, 3];
        let y = [-1.0, -1.0, 1.0, 1.0];
        let upper = [1000.0; 4];
        let problem = BinaryProblem {
            gram: &gram,
            indices: &indices,
            y: &y,
            upper: &upper,
        };

        let solution = problem.solve(&SolverParams { tolerance: 1e-3, max_iterations: 0 });
        assert!(!solution.converged);
        assert_eq!(solution.iterations, 0);
        assert!(solution.alpha.iter().all(|&a| a == 0.0));
    }

    #[test]
    fn test_default_max_iterations() {
        assert_eq!(SolverParams::default_max_iterations(10), 10_000_000);
        assert_eq!(SolverParams::default_max_iterations(1_000_000), 100_000_000);
    }
}
