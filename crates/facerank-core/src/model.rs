//! Recognition model: subspace reducer and classifier trained together.
//!
//! [`TrainedModel`] is the immutable pair produced by training and is safe
//! to share across threads for concurrent `identify` calls.
//! [`RecognitionModel`] wraps it with the train-once lifecycle.

use crate::classifier::{self, ClassifierError, ClassifierModel};
use crate::config::ModelConfig;
use crate::corpus::{self, Corpus, CorpusError};
use crate::ranking;
use crate::raster::Raster;
use crate::subspace::{self, SubspaceError, SubspaceModel};
use crate::types::Ranking;
use ndarray::ArrayView1;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("corpus: {0}")]
    Corpus(#[from] CorpusError),
    #[error("subspace: {0}")]
    Subspace(#[from] SubspaceError),
    #[error("classifier: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("training needs at least 2 distinct labels, corpus has {0}")]
    TooFewClasses(usize),
    #[error("sample has {actual} values, model was trained on {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error(
        "image is {}x{}, model was trained on {}x{}",
        .actual.0, .actual.1, .expected.0, .expected.1
    )]
    GeometryMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("model has not been trained")]
    NotTrained,
    #[error("model is already trained; build a new one to retrain")]
    AlreadyTrained,
}

/// Fitted subspace and classifier for one corpus.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    subspace: SubspaceModel,
    classifier: ClassifierModel,
    width: u32,
    height: u32,
}

impl TrainedModel {
    /// Fit the reducer on the corpus, then the classifier on its projection.
    pub fn fit(corpus: &Corpus, config: &ModelConfig) -> Result<Self, ModelError> {
        let classes = corpus.classes().len();
        if classes < 2 {
            return Err(ModelError::TooFewClasses(classes));
        }

        let subspace = subspace::fit(corpus.samples(), &config.subspace)?;
        let projected = subspace.project(corpus.samples())?;
        let classifier = classifier::fit(projected.view(), corpus.labels(), &config.classifier)?;

        let (width, height) = corpus.dimensions();
        tracing::info!(
            samples = corpus.len(),
            classes,
            components = subspace.n_components(),
            support_vectors = classifier.n_support_vectors(),
            "recognition model trained"
        );

        Ok(Self {
            subspace,
            classifier,
            width,
            height,
        })
    }

    /// Rank every trained identity for one flattened sample.
    pub fn identify(&self, sample: ArrayView1<'_, f64>) -> Result<Ranking, ModelError> {
        if sample.len() != self.n_features() {
            return Err(ModelError::DimensionMismatch {
                expected: self.n_features(),
                actual: sample.len(),
            });
        }
        let reduced = self.subspace.project_one(sample)?;
        let scores = self.classifier.score_all(reduced.view())?;
        Ok(ranking::rank(scores))
    }

    /// Rank identities for a decoded image with the training geometry.
    pub fn identify_raster(&self, raster: &Raster) -> Result<Ranking, ModelError> {
        if (raster.width, raster.height) != self.dimensions() {
            return Err(ModelError::GeometryMismatch {
                expected: self.dimensions(),
                actual: (raster.width, raster.height),
            });
        }
        self.identify(raster.flatten().view())
    }

    pub fn classes(&self) -> &[String] {
        self.classifier.classes()
    }

    /// Pixel count of the training images.
    pub fn n_features(&self) -> usize {
        self.subspace.n_features()
    }

    /// (width, height) of the training images.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn subspace(&self) -> &SubspaceModel {
        &self.subspace
    }

    pub fn classifier(&self) -> &ClassifierModel {
        &self.classifier
    }
}

/// Train-once wrapper around [`TrainedModel`].
#[derive(Debug, Default)]
pub struct RecognitionModel {
    config: ModelConfig,
    trained: Option<TrainedModel>,
}

impl RecognitionModel {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            trained: None,
        }
    }

    /// Assemble the corpus under `root` and train on it.
    pub fn train(&mut self, root: &Path) -> Result<(), ModelError> {
        if self.trained.is_some() {
            return Err(ModelError::AlreadyTrained);
        }
        let corpus = corpus::assemble(root)?;
        self.train_corpus(&corpus)
    }

    /// Train on an already assembled corpus.
    pub fn train_corpus(&mut self, corpus: &Corpus) -> Result<(), ModelError> {
        if self.trained.is_some() {
            return Err(ModelError::AlreadyTrained);
        }
        self.trained = Some(TrainedModel::fit(corpus, &self.config)?);
        Ok(())
    }

    pub fn identify(&self, sample: ArrayView1<'_, f64>) -> Result<Ranking, ModelError> {
        self.trained()?.identify(sample)
    }

    pub fn identify_raster(&self, raster: &Raster) -> Result<Ranking, ModelError> {
        self.trained()?.identify_raster(raster)
    }

    pub fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    pub fn trained(&self) -> Result<&TrainedModel, ModelError> {
        self.trained.as_ref().ok_or(ModelError::NotTrained)
    }

    /// Hand over the trained pair for shared read-only use.
    pub fn into_trained(self) -> Result<TrainedModel, ModelError> {
        self.trained.ok_or(ModelError::NotTrained)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}
