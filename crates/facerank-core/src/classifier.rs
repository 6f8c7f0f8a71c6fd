//! Probabilistic kernel classifier.
//!
//! One binary soft-margin machine is trained per unordered pair of classes.
//! Each machine carries a Platt sigmoid fitted on cross-validated decision
//! values, or on its own training decisions when the held-out ones do not
//! separate the pair. Scoring couples the pairwise probabilities into one
//! distribution over all classes.

use crate::calibration::{couple_pairwise, PlattSigmoid, MIN_PAIRWISE_PROBABILITY};
use crate::config::{ClassWeight, ClassifierConfig};
use crate::kernel::Kernel;
use crate::smo::{BinaryProblem, BinarySolution, SolverParams};
use crate::types::ClassProbability;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("need at least 2 distinct classes, got {0}")]
    TooFewClasses(usize),
    #[error("{samples} samples but {labels} labels")]
    LengthMismatch { samples: usize, labels: usize },
    #[error("training matrix has no feature columns")]
    NoFeatures,
    #[error("sample has {actual} features, classifier was fitted on {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("invalid classifier parameter: {0}")]
    InvalidParameter(String),
}

/// Binary machine separating `classes[positive]` (+1) from `classes[negative]` (−1).
#[derive(Debug, Clone)]
struct PairwiseMachine {
    positive: usize,
    negative: usize,
    /// (row in the support vector matrix, αᵢyᵢ)
    coefficients: Vec<(usize, f64)>,
    rho: f64,
    sigmoid: PlattSigmoid,
}

impl PairwiseMachine {
    fn decision(&self, kernel_values: &[f64]) -> f64 {
        self.coefficients
            .iter()
            .map(|&(row, coef)| coef * kernel_values[row])
            .sum::<f64>()
            - self.rho
    }
}

/// Trained one-vs-one classifier with calibrated probabilities.
#[derive(Debug, Clone)]
pub struct ClassifierModel {
    classes: Vec<String>,
    kernel: Kernel,
    support_vectors: Array2<f64>,
    machines: Vec<PairwiseMachine>,
    n_features: usize,
}

/// Fit a classifier on feature rows `x` with one label per row.
pub fn fit(
    x: ArrayView2<'_, f64>,
    labels: &[String],
    config: &ClassifierConfig,
) -> Result<ClassifierModel, ClassifierError> {
    validate(config)?;
    let (n_samples, n_features) = x.dim();
    if n_samples != labels.len() {
        return Err(ClassifierError::LengthMismatch {
            samples: n_samples,
            labels: labels.len(),
        });
    }
    if n_features == 0 {
        return Err(ClassifierError::NoFeatures);
    }

    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        groups.entry(label.as_str()).or_default().push(i);
    }
    if groups.len() < 2 {
        return Err(ClassifierError::TooFewClasses(groups.len()));
    }
    let classes: Vec<String> = groups.keys().map(|c| c.to_string()).collect();
    let members: Vec<Vec<usize>> = groups.into_values().collect();
    let weights = class_weights(&members, n_samples, config.class_weight);

    let kernel = Kernel::from_config(config);
    let gram = kernel.matrix(x);
    let mut rng = StdRng::seed_from_u64(config.seed);

    // Machines first address training rows; they are remapped onto the
    // support vector union afterwards.
    let mut machines = Vec::with_capacity(classes.len() * (classes.len() - 1) / 2);
    let mut support_rows = vec![None; n_samples];

    for positive in 0..classes.len() {
        for negative in positive + 1..classes.len() {
            let indices: Vec<usize> = members[positive]
                .iter()
                .chain(&members[negative])
                .copied()
                .collect();
            let split = members[positive].len();
            let y: Vec<f64> = (0..indices.len())
                .map(|t| if t < split { 1.0 } else { -1.0 })
                .collect();
            let upper: Vec<f64> = y
                .iter()
                .map(|&s| config.c * if s > 0.0 { weights[positive] } else { weights[negative] })
                .collect();
            let params = SolverParams {
                tolerance: config.tolerance,
                max_iterations: config
                    .max_iterations
                    .unwrap_or_else(|| SolverParams::default_max_iterations(indices.len())),
            };

            let problem = BinaryProblem {
                gram: &gram,
                indices: &indices,
                y: &y,
                upper: &upper,
            };
            let solution = problem.solve(&params);
            let mut sigmoid =
                cross_validated_sigmoid(&problem, &params, config.probability_folds, &mut rng);
            if sigmoid.a >= 0.0 {
                // Held-out decisions carry no signal when every training point is
                // equidistant from the others (whitened full-rank data).
                tracing::warn!(
                    positive = %classes[positive],
                    negative = %classes[negative],
                    a = sigmoid.a,
                    "cross-validated sigmoid is not decreasing; refitting on training decisions"
                );
                sigmoid = training_sigmoid(&problem, &solution);
            }
            if !solution.converged {
                tracing::warn!(
                    positive = %classes[positive],
                    negative = %classes[negative],
                    iterations = solution.iterations,
                    "dual solver stopped at the iteration cap"
                );
            }

            let coefficients: Vec<(usize, f64)> = solution
                .alpha
                .iter()
                .zip(&y)
                .zip(&indices)
                .filter(|((&a, _), _)| a > 0.0)
                .map(|((&a, &s), &row)| (row, a * s))
                .collect();
            for &(row, _) in &coefficients {
                support_rows[row] = Some(0);
            }
            tracing::debug!(
                positive = %classes[positive],
                negative = %classes[negative],
                support_vectors = coefficients.len(),
                iterations = solution.iterations,
                a = sigmoid.a,
                b = sigmoid.b,
                "pairwise machine trained"
            );

            machines.push(PairwiseMachine {
                positive,
                negative,
                coefficients,
                rho: solution.rho,
                sigmoid,
            });
        }
    }

    // Compact the support vectors shared between machines
    let mut kept = Vec::new();
    for (row, slot) in support_rows.iter_mut().enumerate() {
        if slot.is_some() {
            *slot = Some(kept.len());
            kept.push(row);
        }
    }
    for machine in &mut machines {
        for (row, _) in &mut machine.coefficients {
            if let Some(compact) = support_rows[*row] {
                *row = compact;
            }
        }
    }
    let support_vectors = x.select(Axis(0), &kept);

    tracing::info!(
        classes = classes.len(),
        samples = n_samples,
        support_vectors = kept.len(),
        machines = machines.len(),
        "classifier trained"
    );

    Ok(ClassifierModel {
        classes,
        kernel,
        support_vectors,
        machines,
        n_features,
    })
}

fn validate(config: &ClassifierConfig) -> Result<(), ClassifierError> {
    if !(config.c > 0.0) {
        return Err(ClassifierError::InvalidParameter(format!(
            "c must be positive, got {}",
            config.c
        )));
    }
    if matches!(Kernel::from_config(config), Kernel::Rbf { .. }) && !(config.gamma > 0.0) {
        return Err(ClassifierError::InvalidParameter(format!(
            "gamma must be positive, got {}",
            config.gamma
        )));
    }
    if !(config.tolerance > 0.0) {
        return Err(ClassifierError::InvalidParameter(format!(
            "tolerance must be positive, got {}",
            config.tolerance
        )));
    }
    if config.probability_folds < 2 {
        return Err(ClassifierError::InvalidParameter(format!(
            "probability_folds must be at least 2, got {}",
            config.probability_folds
        )));
    }
    Ok(())
}

/// Per-class multiplier of `c`. Balanced weights are n / (k · count).
fn class_weights(members: &[Vec<usize>], n_samples: usize, policy: ClassWeight) -> Vec<f64> {
    match policy {
        ClassWeight::Uniform => vec![1.0; members.len()],
        ClassWeight::Balanced => {
            let k = members.len() as f64;
            members
                .iter()
                .map(|m| n_samples as f64 / (k * m.len() as f64))
                .collect()
        }
    }
}

/// Fit the Platt sigmoid of one pair on decision values predicted for
/// points held out of the machine that scored them.
fn cross_validated_sigmoid(
    problem: &BinaryProblem<'_>,
    params: &SolverParams,
    folds: usize,
    rng: &mut StdRng,
) -> PlattSigmoid {
    let l = problem.len();
    let mut order: Vec<usize> = (0..l).collect();
    order.shuffle(rng);

    let mut decisions = vec![0.0; l];
    for fold in 0..folds {
        let begin = fold * l / folds;
        let end = (fold + 1) * l / folds;
        if begin == end {
            continue;
        }
        let held_out = &order[begin..end];
        let train: Vec<usize> = order[..begin].iter().chain(&order[end..]).copied().collect();

        let positives = train.iter().filter(|&&t| problem.y[t] > 0.0).count();
        let negatives = train.len() - positives;
        if positives == 0 || negatives == 0 {
            let constant = match (positives, negatives) {
                (0, 0) => 0.0,
                (_, 0) => 1.0,
                _ => -1.0,
            };
            for &t in held_out {
                decisions[t] = constant;
            }
            continue;
        }

        let indices: Vec<usize> = train.iter().map(|&t| problem.indices[t]).collect();
        let y: Vec<f64> = train.iter().map(|&t| problem.y[t]).collect();
        let upper: Vec<f64> = train.iter().map(|&t| problem.upper[t]).collect();
        let sub = BinaryProblem {
            gram: problem.gram,
            indices: &indices,
            y: &y,
            upper: &upper,
        };
        let solution: BinarySolution = sub.solve(params);
        for &t in held_out {
            let row = problem.indices[t];
            decisions[t] = solution.decision(&y, indices.iter().map(|&i| problem.gram[[i, row]]));
        }
    }

    PlattSigmoid::fit(&decisions, problem.y)
}

/// Platt sigmoid fitted on the decision values of the machine's own
/// training points.
fn training_sigmoid(problem: &BinaryProblem<'_>, solution: &BinarySolution) -> PlattSigmoid {
    let decisions: Vec<f64> = problem
        .indices
        .iter()
        .map(|&row| {
            solution.decision(
                problem.y,
                problem.indices.iter().map(|&i| problem.gram[[i, row]]),
            )
        })
        .collect();
    PlattSigmoid::fit(&decisions, problem.y)
}

impl ClassifierModel {
    /// Calibrated probability for every trained class, in sorted label order.
    pub fn score_all(
        &self,
        sample: ArrayView1<'_, f64>,
    ) -> Result<Vec<ClassProbability>, ClassifierError> {
        let decisions = self.decision_values(sample)?;
        let k = self.classes.len();

        let mut pairwise = Array2::<f64>::zeros((k, k));
        for (machine, &f) in self.machines.iter().zip(&decisions) {
            let p = machine
                .sigmoid
                .predict(f)
                .clamp(MIN_PAIRWISE_PROBABILITY, 1.0 - MIN_PAIRWISE_PROBABILITY);
            pairwise[[machine.positive, machine.negative]] = p;
            pairwise[[machine.negative, machine.positive]] = 1.0 - p;
        }

        let probabilities = if k == 2 {
            vec![pairwise[[0, 1]], pairwise[[1, 0]]]
        } else {
            couple_pairwise(&pairwise)
        };

        Ok(self
            .classes
            .iter()
            .zip(probabilities)
            .map(|(label, probability)| ClassProbability {
                label: label.clone(),
                probability,
            })
            .collect())
    }

    /// Raw decision value of every pairwise machine, ordered (0,1), (0,2) … (k−2,k−1).
    pub fn decision_values(
        &self,
        sample: ArrayView1<'_, f64>,
    ) -> Result<Vec<f64>, ClassifierError> {
        if sample.len() != self.n_features {
            return Err(ClassifierError::DimensionMismatch {
                expected: self.n_features,
                actual: sample.len(),
            });
        }
        let kernel_values = self.kernel.against_rows(self.support_vectors.view(), sample);
        Ok(self
            .machines
            .iter()
            .map(|machine| machine.decision(&kernel_values))
            .collect())
    }

    /// Majority vote of the pairwise machines; ties go to the lower class.
    pub fn predict(&self, sample: ArrayView1<'_, f64>) -> Result<&str, ClassifierError> {
        let decisions = self.decision_values(sample)?;
        let mut votes = vec![0usize; self.classes.len()];
        for (machine, f) in self.machines.iter().zip(decisions) {
            if f > 0.0 {
                votes[machine.positive] += 1;
            } else {
                votes[machine.negative] += 1;
            }
        }
        let mut best = 0;
        for (i, &v) in votes.iter().enumerate() {
            if v > votes[best] {
                best = i;
            }
        }
        Ok(&self.classes[best])
    }

    /// Trained labels, sorted.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_support_vectors(&self) -> usize {
        self.support_vectors.nrows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn config() -> ClassifierConfig {
        ClassifierConfig {
            c: 10.0,
            gamma: 0.5,
            ..ClassifierConfig::default()
        }
    }

    /// `per_class` points per center, jittered deterministically.
    fn clusters(centers: &[(&str, [f64; 2])], per_class: usize) -> (Array2<f64>, Vec<String>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for (label, center) in centers {
            for i in 0..per_class {
                let dx = ((i % 3) as f64 - 1.0) * 0.2;
                let dy = ((i / 3) as f64 - 1.0) * 0.2;
                rows.push([center[0] + dx, center[1] + dy]);
                labels.push(label.to_string());
            }
        }
        let x = Array2::from_shape_fn((rows.len(), 2), |(i, j)| rows[i][j]);
        (x, labels)
    }

    fn probability(scores: &[ClassProbability], label: &str) -> f64 {
        scores
            .iter()
            .find(|s| s.label == label)
            .map(|s| s.probability)
            .unwrap()
    }

    #[test]
    fn test_scores_align_with_labels() {
        // Input order is zed first, sorted order puts amy first.
        let (x, labels) = clusters(&[("zed", [3.0, 0.0]), ("amy", [-3.0, 0.0])], 9);
        let model = fit(x.view(), &labels, &config()).unwrap();
        assert_eq!(model.classes(), &["amy".to_string(), "zed".to_string()]);

        let scores = model.score_all(array![3.0, 0.1].view()).unwrap();
        assert_eq!(scores[0].label, "amy");
        assert_eq!(scores[1].label, "zed");
        assert!(probability(&scores, "zed") > probability(&scores, "amy"));
        assert_eq!(model.predict(array![3.0, 0.1].view()).unwrap(), "zed");

        let scores = model.score_all(array![-3.0, 0.0].view()).unwrap();
        assert!(probability(&scores, "amy") > 0.5);
        assert_eq!(model.predict(array![-3.0, 0.0].view()).unwrap(), "amy");
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, labels) = clusters(&[("a", [0.0, 0.0]), ("b", [4.0, 0.0])], 9);
        let model = fit(x.view(), &labels, &config()).unwrap();
        for probe in [array![0.0, 0.0], array![2.0, 0.0], array![10.0, -3.0]] {
            let scores = model.score_all(probe.view()).unwrap();
            let total: f64 = scores.iter().map(|s| s.probability).sum();
            assert!((total - 1.0).abs() < 1e-9);
            for s in &scores {
                assert!((0.0..=1.0).contains(&s.probability));
            }
        }
    }

    #[test]
    fn test_three_classes() {
        let (x, labels) = clusters(
            &[("a", [0.0, 4.0]), ("b", [-4.0, -2.0]), ("c", [4.0, -2.0])],
            9,
        );
        let model = fit(x.view(), &labels, &config()).unwrap();
        assert_eq!(model.decision_values(array![0.0, 0.0].view()).unwrap().len(), 3);

        let probes = [
            ("a", array![0.0, 4.0]),
            ("b", array![-4.0, -2.0]),
            ("c", array![4.0, -2.0]),
        ];
        for (label, probe) in probes {
            let scores = model.score_all(probe.view()).unwrap();
            let total: f64 = scores.iter().map(|s| s.probability).sum();
            assert!((total - 1.0).abs() < 1e-9);
            let best = scores
                .iter()
                .max_by(|l, r| l.probability.total_cmp(&r.probability))
                .unwrap();
            assert_eq!(best.label, label);
            assert_eq!(model.predict(probe.view()).unwrap(), label);
        }
    }

    #[test]
    fn test_equidistant_training_points_rank_own_class_first() {
        // Every pair of rows is the same distance apart, so held-out
        // decision values say nothing about the class.
        let x = Array2::from_diag_elem(10, 3.0);
        let labels: Vec<String> = (0..10)
            .map(|i| if i < 5 { "alice" } else { "bob" }.to_string())
            .collect();
        let model = fit(x.view(), &labels, &ClassifierConfig::default()).unwrap();

        for (row, label) in x.rows().into_iter().zip(&labels) {
            let scores = model.score_all(row).unwrap();
            assert!(probability(&scores, label) > 0.5, "{label}: {scores:?}");
        }
    }

    #[test]
    fn test_linear_kernel() {
        let (x, labels) = clusters(&[("left", [-2.0, 0.0]), ("right", [2.0, 0.0])], 9);
        let config = ClassifierConfig {
            kernel: crate::config::KernelKind::Linear,
            c: 1.0,
            ..ClassifierConfig::default()
        };
        let model = fit(x.view(), &labels, &config).unwrap();
        let decisions = model.decision_values(array![5.0, 0.0].view()).unwrap();
        // "left" is the positive side of the only machine
        assert!(decisions[0] < 0.0);
        assert_eq!(model.predict(array![5.0, 0.0].view()).unwrap(), "right");
    }

    #[test]
    fn test_single_class_rejected() {
        let (x, labels) = clusters(&[("only", [0.0, 0.0])], 6);
        let err = fit(x.view(), &labels, &config()).unwrap_err();
        assert!(matches!(err, ClassifierError::TooFewClasses(1)));
    }

    #[test]
    fn test_length_mismatch() {
        let (x, mut labels) = clusters(&[("a", [0.0, 0.0]), ("b", [4.0, 0.0])], 3);
        labels.pop();
        let err = fit(x.view(), &labels, &config()).unwrap_err();
        assert!(matches!(err, ClassifierError::LengthMismatch { samples: 6, labels: 5 }));
    }

    #[test]
    fn test_wrong_dimension_probe() {
        let (x, labels) = clusters(&[("a", [0.0, 0.0]), ("b", [4.0, 0.0])], 6);
        let model = fit(x.view(), &labels, &config()).unwrap();
        let err = model.score_all(array![1.0, 2.0, 3.0].view()).unwrap_err();
        assert!(matches!(err, ClassifierError::DimensionMismatch { expected: 2, actual: 3 }));
    }

    #[test]
    fn test_invalid_parameters() {
        let (x, labels) = clusters(&[("a", [0.0, 0.0]), ("b", [4.0, 0.0])], 3);
        for bad in [
            ClassifierConfig { c: 0.0, ..config() },
            ClassifierConfig { gamma: -1.0, ..config() },
            ClassifierConfig { probability_folds: 1, ..config() },
        ] {
            let err = fit(x.view(), &labels, &bad).unwrap_err();
            assert!(matches!(err, ClassifierError::InvalidParameter(_)));
        }
    }

    #[test]
    fn test_balanced_weights() {
        let members = vec![vec![0, 1, 2, 3, 4, 5], vec![6, 7]];
        let w = class_weights(&members, 8, ClassWeight::Balanced);
        assert!((w[0] - 8.0 / 12.0).abs() < 1e-12);
        assert!((w[1] - 2.0).abs() < 1e-12);
        assert_eq!(class_weights(&members, 8, ClassWeight::Uniform), vec![1.0, 1.0]);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let (x, labels) = clusters(&[("a", [0.0, 0.0]), ("b", [1.5, 0.0])], 9);
        let first = fit(x.view(), &labels, &config()).unwrap();
        let second = fit(x.view(), &labels, &config()).unwrap();
        let probe = array![0.7, 0.1];
        assert_eq!(
            first.score_all(probe.view()).unwrap(),
            second.score_all(probe.view()).unwrap()
        );
    }
}
