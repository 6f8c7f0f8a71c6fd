//! Corpus assembler: labeled image directory → training matrix.
//!
//! Expected layout: one subdirectory per identity, image files directly
//! inside it. Files that fail to decode are skipped; everything else about
//! the corpus (missing root, mixed image geometry, nothing decodable) is
//! fatal.

use crate::raster::Raster;
use ndarray::{Array2, ArrayView1, ArrayView2};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Accepted image extensions, compared case-insensitively.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "pgm"];

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("corpus root not found: {}", .0.display())]
    RootNotFound(PathBuf),
    #[error("corpus root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no decodable images found under {}", .0.display())]
    Empty(PathBuf),
    #[error(
        "{origin}: image is {}x{}, corpus images are {}x{}",
        .actual.0, .actual.1, .expected.0, .expected.1
    )]
    DimensionMismatch {
        origin: String,
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

/// Labeled training data: one flattened image per row, paired with its label.
#[derive(Debug, Clone)]
pub struct Corpus {
    samples: Array2<f64>,
    labels: Vec<String>,
    width: u32,
    height: u32,
}

impl Corpus {
    /// Build a corpus from in-memory `(label, raster)` pairs.
    ///
    /// All rasters must share one geometry; at least one pair is required.
    pub fn from_rasters<I>(items: I) -> Result<Self, CorpusError>
    where
        I: IntoIterator<Item = (String, Raster)>,
    {
        let mut builder = CorpusBuilder::default();
        for (i, (label, raster)) in items.into_iter().enumerate() {
            let origin = format!("{label}[{i}]");
            builder.push(label, raster, origin)?;
        }
        builder.finish(Path::new("<memory>"))
    }

    /// Training matrix, rows = samples, columns = pixels.
    pub fn samples(&self) -> ArrayView2<'_, f64> {
        self.samples.view()
    }

    /// Row `i` of the training matrix.
    pub fn sample(&self, i: usize) -> ArrayView1<'_, f64> {
        self.samples.row(i)
    }

    /// Labels, `labels()[i]` belongs to `samples().row(i)`.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Image geometry shared by every sample, as (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Length of each flattened sample.
    pub fn pixel_count(&self) -> usize {
        self.samples.ncols()
    }

    /// Number of samples per label, in label order.
    pub fn class_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for label in &self.labels {
            *counts.entry(label.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Distinct labels in sorted order.
    pub fn classes(&self) -> Vec<&str> {
        self.class_counts().into_keys().collect()
    }
}

/// Accumulates decoded samples while enforcing a single image geometry.
#[derive(Default)]
struct CorpusBuilder {
    rasters: Vec<Raster>,
    labels: Vec<String>,
}

impl CorpusBuilder {
    fn push(&mut self, label: String, raster: Raster, origin: String) -> Result<(), CorpusError> {
        if let Some(first) = self.rasters.first() {
            if (first.width, first.height) != (raster.width, raster.height) {
                return Err(CorpusError::DimensionMismatch {
                    origin,
                    expected: (first.width, first.height),
                    actual: (raster.width, raster.height),
                });
            }
        }
        self.rasters.push(raster);
        self.labels.push(label);
        Ok(())
    }

    fn finish(self, root: &Path) -> Result<Corpus, CorpusError> {
        let Some(first) = self.rasters.first() else {
            return Err(CorpusError::Empty(root.to_path_buf()));
        };
        let (width, height) = (first.width, first.height);
        let pixels = first.pixel_count();

        let rasters = &self.rasters;
        let samples = Array2::from_shape_fn((rasters.len(), pixels), |(i, j)| {
            rasters[i].data[j] as f64
        });

        Ok(Corpus {
            samples,
            labels: self.labels,
            width,
            height,
        })
    }
}

/// Scan `root` and build the training matrix.
///
/// Subdirectories are visited in name order and files within each in name
/// order, so the same directory tree always yields the same row order.
pub fn assemble(root: &Path) -> Result<Corpus, CorpusError> {
    if !root.exists() {
        return Err(CorpusError::RootNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(CorpusError::NotADirectory(root.to_path_buf()));
    }

    let mut builder = CorpusBuilder::default();
    let mut skipped = 0usize;

    for class_dir in sorted_entries(root)? {
        if !class_dir.is_dir() {
            continue;
        }
        let label = match class_dir.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => continue,
        };

        for path in sorted_entries(&class_dir)? {
            if !path.is_file() || !is_supported_image(&path) {
                continue;
            }
            match load_sample(&path) {
                Some(raster) => {
                    builder.push(label.clone(), raster, path.display().to_string())?;
                }
                None => skipped += 1,
            }
        }
    }

    let corpus = builder.finish(root)?;
    tracing::info!(
        root = %root.display(),
        samples = corpus.len(),
        classes = corpus.class_counts().len(),
        width = corpus.width,
        height = corpus.height,
        skipped,
        "corpus assembled"
    );
    Ok(corpus)
}

/// Decode one candidate file; `None` means the file is skipped.
fn load_sample(path: &Path) -> Option<Raster> {
    match Raster::open(path) {
        Ok(raster) => Some(raster),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping undecodable image");
            None
        }
    }
}

/// Whether `path` carries one of [`SUPPORTED_EXTENSIONS`] (any case).
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, CorpusError> {
    let io_err = |source| CorpusError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    paths.sort();
    Ok(paths)
}
