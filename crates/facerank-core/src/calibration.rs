//! Probability calibration.
//!
//! Binary decision values are mapped to probabilities with a Platt sigmoid
//! (fitted by the Newton method of Lin, Lin and Weng 2007), and the
//! pairwise probabilities of a one-vs-one machine are coupled into one
//! distribution over classes (Wu, Lin and Weng 2004, method 2).

use ndarray::Array2;

/// Pairwise probabilities are kept away from 0 and 1 before coupling.
pub const MIN_PAIRWISE_PROBABILITY: f64 = 1e-7;

const SIGMOID_MAX_ITERATIONS: usize = 100;
const SIGMOID_MIN_STEP: f64 = 1e-10;
const SIGMOID_HESSIAN_RIDGE: f64 = 1e-12;
const SIGMOID_EPS: f64 = 1e-5;

/// P(positive | f) = 1 / (1 + exp(a·f + b))
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlattSigmoid {
    pub a: f64,
    pub b: f64,
}

impl PlattSigmoid {
    /// Fit on decision values and their true sides (`> 0` means positive).
    ///
    /// Targets are the regularized (N₊+1)/(N₊+2) and 1/(N₋+2) rather than
    /// 1 and 0, so a perfectly separated fold does not drive `a` to infinity.
    pub fn fit(decision_values: &[f64], labels: &[f64]) -> Self {
        let prior1 = labels.iter().filter(|&&y| y > 0.0).count() as f64;
        let prior0 = labels.len() as f64 - prior1;

        let hi_target = (prior1 + 1.0) / (prior1 + 2.0);
        let lo_target = 1.0 / (prior0 + 2.0);
        let targets: Vec<f64> = labels
            .iter()
            .map(|&y| if y > 0.0 { hi_target } else { lo_target })
            .collect();

        let mut a = 0.0;
        let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
        let mut fval = objective(decision_values, &targets, a, b);

        let mut iteration = 0;
        while iteration < SIGMOID_MAX_ITERATIONS {
            // Gradient and Hessian of the cross-entropy
            let (mut h11, mut h22, mut h21) = (SIGMOID_HESSIAN_RIDGE, SIGMOID_HESSIAN_RIDGE, 0.0);
            let (mut g1, mut g2) = (0.0, 0.0);
            for (&f, &t) in decision_values.iter().zip(&targets) {
                let f_apb = f * a + b;
                let (p, q) = if f_apb >= 0.0 {
                    let e = (-f_apb).exp();
                    (e / (1.0 + e), 1.0 / (1.0 + e))
                } else {
                    let e = f_apb.exp();
                    (1.0 / (1.0 + e), e / (1.0 + e))
                };
                let d2 = p * q;
                h11 += f * f * d2;
                h22 += d2;
                h21 += f * d2;
                let d1 = t - p;
                g1 += f * d1;
                g2 += d1;
            }

            if g1.abs() < SIGMOID_EPS && g2.abs() < SIGMOID_EPS {
                break;
            }

            // Newton direction
            let det = h11 * h22 - h21 * h21;
            let d_a = -(h22 * g1 - h21 * g2) / det;
            let d_b = -(-h21 * g1 + h11 * g2) / det;
            let gd = g1 * d_a + g2 * d_b;

            // Backtracking line search
            let mut step = 1.0;
            while step >= SIGMOID_MIN_STEP {
                let new_a = a + step * d_a;
                let new_b = b + step * d_b;
                let new_f = objective(decision_values, &targets, new_a, new_b);
                if new_f < fval + 0.0001 * step * gd {
                    a = new_a;
                    b = new_b;
                    fval = new_f;
                    break;
                }
                step /= 2.0;
            }

            if step < SIGMOID_MIN_STEP {
                tracing::warn!(iteration, "Platt sigmoid line search failed");
                break;
            }
            iteration += 1;
        }

        if iteration >= SIGMOID_MAX_ITERATIONS {
            tracing::warn!("Platt sigmoid reached maximal iterations");
        }

        Self { a, b }
    }

    /// Probability of the positive side for decision value `f`.
    pub fn predict(&self, f: f64) -> f64 {
        let f_apb = f * self.a + self.b;
        if f_apb >= 0.0 {
            let e = (-f_apb).exp();
            e / (1.0 + e)
        } else {
            1.0 / (1.0 + f_apb.exp())
        }
    }
}

/// Cross-entropy of the sigmoid against the soft targets, written to avoid
/// overflow in `exp` for either sign of `a·f + b`.
fn objective(decision_values: &[f64], targets: &[f64], a: f64, b: f64) -> f64 {
    decision_values
        .iter()
        .zip(targets)
        .map(|(&f, &t)| {
            let f_apb = f * a + b;
            if f_apb >= 0.0 {
                t * f_apb + (1.0 + (-f_apb).exp()).ln()
            } else {
                (t - 1.0) * f_apb + (1.0 + f_apb.exp()).ln()
            }
        })
        .sum()
}

/// Couple pairwise probabilities into class probabilities.
///
/// `r[[i, j]]` is P(class i | class i or j) and `r[[j, i]] = 1 − r[[i, j]]`.
/// The result sums to 1.
pub fn couple_pairwise(r: &Array2<f64>) -> Vec<f64> {
    let k = r.nrows();
    if k == 0 {
        return Vec::new();
    }
    let max_iterations = k.max(100);
    let eps = 0.005 / k as f64;

    let mut q = Array2::<f64>::zeros((k, k));
    for t in 0..k {
        for j in 0..k {
            if j == t {
                continue;
            }
            q[[t, t]] += r[[j, t]] * r[[j, t]];
            q[[t, j]] = -r[[j, t]] * r[[t, j]];
        }
    }

    let mut p = vec![1.0 / k as f64; k];
    let mut qp = vec![0.0; k];
    let mut iteration = 0;
    while iteration < max_iterations {
        let mut pqp = 0.0;
        for t in 0..k {
            qp[t] = (0..k).map(|j| q[[t, j]] * p[j]).sum();
            pqp += p[t] * qp[t];
        }
        let max_error = qp
            .iter()
            .map(|&v| (v - pqp).abs())
            .fold(0.0f64, f64::max);
        if max_error < eps {
            break;
        }

        for t in 0..k {
            let diff = (-qp[t] + pqp) / q[[t, t]];
            p[t] += diff;
            pqp = (pqp + diff * (diff * q[[t, t]] + 2.0 * qp[t])) / (1.0 + diff) / (1.0 + diff);
            for j in 0..k {
                qp[j] = (qp[j] + diff * q[[t, j]]) / (1.0 + diff);
                p[j] /= 1.0 + diff;
            }
        }
        iteration += 1;
    }
    if iteration >= max_iterations {
        tracing::warn!(classes = k, "pairwise coupling reached maximal iterations");
    }

    let total: f64 = p.iter().sum();
    if total > 0.0 {
        p.iter_mut().for_each(|v| *v /= total);
    }
    p
}
