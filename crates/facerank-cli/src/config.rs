use anyhow::{Context, Result};
use facerank_core::{ModelConfig, SvdSolver};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// CLI configuration: an optional TOML file, then `FACERANK_*` overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Corpus root used when `--corpus` is not given.
    pub corpus: Option<PathBuf>,
    pub model: ModelConfig,
}

impl Config {
    /// Load from `path`, else from `$FACERANK_CONFIG`, else defaults, then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    fn load_with(path: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| lookup("FACERANK_CONFIG").map(PathBuf::from));

        let mut config = match file {
            Some(file) => Self::from_file(&file)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Unparsable values keep the current setting.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let subspace = &mut self.model.subspace;
        let classifier = &mut self.model.classifier;

        subspace.n_components = env_or(&lookup, "FACERANK_COMPONENTS", subspace.n_components);
        if let Some(solver) = lookup("FACERANK_SOLVER").and_then(|v| parse_solver(&v)) {
            subspace.solver = solver;
        }
        classifier.c = env_or(&lookup, "FACERANK_C", classifier.c);
        classifier.gamma = env_or(&lookup, "FACERANK_GAMMA", classifier.gamma);

        // One seed drives both the sketch and the cross-validation shuffle
        if let Some(seed) = lookup("FACERANK_SEED").and_then(|v| v.trim().parse().ok()) {
            subspace.seed = seed;
            classifier.seed = seed;
        }

        if let Some(corpus) = lookup("FACERANK_CORPUS") {
            self.corpus = Some(PathBuf::from(corpus));
        }
    }
}

fn parse_solver(value: &str) -> Option<SvdSolver> {
    match value.trim().to_ascii_lowercase().as_str() {
        "full" => Some(SvdSolver::Full),
        "randomized" => Some(SvdSolver::Randomized),
        _ => None,
    }
}

fn env_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
