//! facerank-core: Appearance-based face identification.
//!
//! Builds a whitened principal component subspace from a labeled corpus of
//! grayscale face images, trains a one-vs-one RBF soft-margin classifier
//! with calibrated probabilities in that subspace, and ranks every known
//! identity for a new face.

pub mod calibration;
pub mod classifier;
pub mod config;
pub mod corpus;
pub mod kernel;
pub mod model;
pub mod ranking;
pub mod raster;
mod smo;
pub mod subspace;
pub mod types;

pub use config::{ClassWeight, ClassifierConfig, KernelKind, ModelConfig, SubspaceConfig, SvdSolver};
pub use corpus::{Corpus, CorpusError};
pub use model::{ModelError, RecognitionModel, TrainedModel};
pub use raster::{Raster, RasterError};
pub use types::{ClassProbability, RankedIdentity, Ranking};
