//! Ranking engine: turns per-class probabilities into a sorted result.

use crate::types::{ClassProbability, RankedIdentity, Ranking};

/// Sort class probabilities in descending order.
///
/// The sort is stable: equal probabilities keep the order in which the
/// classifier reported them (its sorted class order). Every class is kept,
/// however small its probability.
pub fn rank(scores: Vec<ClassProbability>) -> Ranking {
    let mut entries: Vec<RankedIdentity> = scores
        .into_iter()
        .map(|s| RankedIdentity {
            label: s.label,
            probability: s.probability,
        })
        .collect();

    entries.sort_by(|a, b| b.probability.total_cmp(&a.probability));

    Ranking::from_sorted(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(label: &str, probability: f64) -> ClassProbability {
        ClassProbability { label: label.into(), probability }
    }

    #[test]
    fn test_rank_sorts_descending() {
        let ranking = rank(vec![score("a", 0.1), score("b", 0.6), score("c", 0.3)]);
        let labels: Vec<&str> = ranking.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["b", "c", "a"]);
        for pair in ranking.as_slice().windows(2) {
            assert!(pair[0].probability >= pair[1].probability);
        }
    }

    #[test]
    fn test_rank_ties_keep_input_order() {
        let ranking = rank(vec![
            score("amy", 0.25),
            score("bea", 0.5),
            score("cal", 0.25),
            score("dan", 0.0),
        ]);
        let labels: Vec<&str> = ranking.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["bea", "amy", "cal", "dan"]);

        // Deterministic across repeated runs
        for _ in 0..10 {
            let again = rank(vec![
                score("amy", 0.25),
                score("bea", 0.5),
                score("cal", 0.25),
                score("dan", 0.0),
            ]);
            assert_eq!(again, ranking);
        }
    }

    #[test]
    fn test_rank_keeps_every_class() {
        let ranking = rank(vec![score("a", 1.0 - 2e-9), score("b", 1e-9), score("c", 1e-9)]);
        assert_eq!(ranking.len(), 3);
        assert_eq!(ranking.top().map(|e| e.label.as_str()), Some("a"));
    }

    #[test]
    fn test_rank_empty() {
        assert!(rank(vec![]).is_empty());
    }
}
