use serde::{Deserialize, Serialize};

/// Probability that a sample belongs to one known class.
///
/// The label travels with its score so that no consumer has to rely on
/// positional agreement between a label list and a probability vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassProbability {
    pub label: String,
    pub probability: f64,
}

/// One entry of a recognition result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedIdentity {
    pub label: String,
    /// Calibrated probability in [0, 1].
    pub probability: f64,
}

/// Identities sorted by descending probability, one entry per trained class.
///
/// Only serialized. A deserialized list would skip the ordering that
/// [`crate::ranking::rank`] establishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Ranking {
    entries: Vec<RankedIdentity>,
}

impl Ranking {
    /// Callers outside the ranking engine go through [`crate::ranking::rank`],
    /// which establishes the ordering.
    pub(crate) fn from_sorted(entries: Vec<RankedIdentity>) -> Self {
        Self { entries }
    }

    /// Most probable identity, if any class was trained.
    pub fn top(&self) -> Option<&RankedIdentity> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RankedIdentity> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[RankedIdentity] {
        &self.entries
    }

    /// Probability assigned to `label`, if it is a known class.
    pub fn probability_of(&self, label: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.label == label)
            .map(|e| e.probability)
    }

    pub fn into_vec(self) -> Vec<RankedIdentity> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a Ranking {
    type Item = &'a RankedIdentity;
    type IntoIter = std::slice::Iter<'a, RankedIdentity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
