use facerank_core::{Corpus, RankedIdentity, Ranking};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

/// The first `top` entries, or all of them.
pub fn head(ranking: &Ranking, top: Option<usize>) -> &[RankedIdentity] {
    let entries = ranking.as_slice();
    &entries[..top.unwrap_or(entries.len()).min(entries.len())]
}

/// One `<label> | <probability>%` line per identity.
pub fn render_ranking(entries: &[RankedIdentity]) -> String {
    let mut out = String::from("--- Prediction ranking ---\n");
    for entry in entries {
        let _ = writeln!(out, "{} | {:.2}%", entry.label, entry.probability * 100.0);
    }
    out
}

pub fn ranking_json(entries: &[RankedIdentity]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(entries)
}

/// Shape of an assembled corpus, as printed by `inspect`.
#[derive(Debug, Serialize)]
pub struct CorpusSummary<'a> {
    pub width: u32,
    pub height: u32,
    pub samples: usize,
    pub classes: BTreeMap<&'a str, usize>,
}

impl<'a> CorpusSummary<'a> {
    pub fn new(corpus: &'a Corpus) -> Self {
        let (width, height) = corpus.dimensions();
        Self {
            width,
            height,
            samples: corpus.len(),
            classes: corpus.class_counts(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "{} samples, {} classes, {}x{} pixels\n",
            self.samples,
            self.classes.len(),
            self.width,
            self.height
        );
        for (label, count) in &self.classes {
            let _ = writeln!(out, "  {label}: {count}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facerank_core::Raster;

    fn ranking() -> Ranking {
        let corpus = Corpus::from_rasters([
            ("a".to_string(), Raster::new(vec![0, 10, 20, 30], 2, 2).unwrap()),
            ("a".to_string(), Raster::new(vec![5, 10, 25, 30], 2, 2).unwrap()),
            ("b".to_string(), Raster::new(vec![200, 190, 180, 170], 2, 2).unwrap()),
            ("b".to_string(), Raster::new(vec![210, 190, 170, 170], 2, 2).unwrap()),
        ])
        .unwrap();
        let mut model = facerank_core::RecognitionModel::default();
        model.train_corpus(&corpus).unwrap();
        model.identify(corpus.sample(0)).unwrap()
    }

    #[test]
    fn test_head_limits_entries() {
        let ranking = ranking();
        assert_eq!(head(&ranking, None).len(), 2);
        assert_eq!(head(&ranking, Some(1)).len(), 1);
        assert_eq!(head(&ranking, Some(10)).len(), 2);
        assert!(head(&ranking, Some(0)).is_empty());
    }

    #[test]
    fn test_render_ranking() {
        let entries = vec![
            RankedIdentity {
                label: "alice".into(),
                probability: 0.87654,
            },
            RankedIdentity {
                label: "bob".into(),
                probability: 0.12346,
            },
        ];
        let text = render_ranking(&entries);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, ["--- Prediction ranking ---", "alice | 87.65%", "bob | 12.35%"]);
    }

    #[test]
    fn test_ranking_json() {
        let entries = vec![RankedIdentity {
            label: "alice".into(),
            probability: 0.5,
        }];
        let json = ranking_json(&entries).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["label"], "alice");
        assert_eq!(parsed[0]["probability"], 0.5);

        let ranking = ranking();
        let json = ranking_json(ranking.as_slice()).unwrap();
        let parsed: Vec<RankedIdentity> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        for (got, want) in parsed.iter().zip(ranking.iter()) {
            assert_eq!(got.label, want.label);
            assert!((got.probability - want.probability).abs() < 1e-12);
        }
    }

    #[test]
    fn test_corpus_summary() {
        let corpus = Corpus::from_rasters([
            ("x".to_string(), Raster::new(vec![1; 6], 3, 2).unwrap()),
            ("y".to_string(), Raster::new(vec![2; 6], 3, 2).unwrap()),
            ("y".to_string(), Raster::new(vec![3; 6], 3, 2).unwrap()),
        ])
        .unwrap();
        let summary = CorpusSummary::new(&corpus);
        assert_eq!(summary.samples, 3);
        assert_eq!(summary.classes["y"], 2);
        assert_eq!(
            summary.render(),
            "3 samples, 2 classes, 3x2 pixels\n  x: 1\n  y: 2\n"
        );

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["width"], 3);
        assert_eq!(json["classes"]["x"], 1);
    }
}
