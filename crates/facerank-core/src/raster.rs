//! Grayscale raster type: decoding, flattening, bilinear resize.

use ndarray::Array1;
use std::path::Path;

/// A decoded single-channel image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    /// Grayscale pixel data (width * height bytes, row-major).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Raster {
    /// Wrap an existing grayscale buffer, checking its length against the geometry.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, RasterError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(RasterError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, width, height })
    }

    /// Decode an image file as grayscale. Color input is converted to luma.
    pub fn open(path: &Path) -> Result<Self, RasterError> {
        let decoded = image::open(path).map_err(|source| RasterError::Decode {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from(decoded.to_luma8()))
    }

    /// Number of pixels, i.e. the length of the flattened sample.
    pub fn pixel_count(&self) -> usize {
        self.data.len()
    }

    /// Row-major flattening into a sample vector.
    pub fn flatten(&self) -> Array1<f64> {
        self.data.iter().map(|&p| p as f64).collect()
    }

    /// Resize to `width` × `height` with bilinear interpolation.
    ///
    /// Uses pixel-center alignment so that a uniform image stays uniform.
    pub fn resize(&self, width: u32, height: u32) -> Raster {
        let (src_w, src_h) = (self.width as usize, self.height as usize);
        let (new_w, new_h) = (width as usize, height as usize);
        if src_w == 0 || src_h == 0 || new_w == 0 || new_h == 0 {
            return Raster {
                data: vec![0u8; new_w * new_h],
                width,
                height,
            };
        }
        if src_w == new_w && src_h == new_h {
            return self.clone();
        }

        let scale_x = src_w as f32 / new_w as f32;
        let scale_y = src_h as f32 / new_h as f32;
        let mut resized = vec![0u8; new_w * new_h];

        for y in 0..new_h {
            let src_y = (y as f32 + 0.5) * scale_y - 0.5;
            let y0 = (src_y.floor() as i32).clamp(0, src_h as i32 - 1) as usize;
            let y1 = (y0 + 1).min(src_h - 1);
            let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

            for x in 0..new_w {
                let src_x = (x as f32 + 0.5) * scale_x - 0.5;
                let x0 = (src_x.floor() as i32).clamp(0, src_w as i32 - 1) as usize;
                let x1 = (x0 + 1).min(src_w - 1);
                let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

                let tl = self.data[y0 * src_w + x0] as f32;
                let tr = self.data[y0 * src_w + x1] as f32;
                let bl = self.data[y1 * src_w + x0] as f32;
                let br = self.data[y1 * src_w + x1] as f32;

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                resized[y * new_w + x] = val.round().clamp(0.0, 255.0) as u8;
            }
        }

        Raster {
            data: resized,
            width,
            height,
        }
    }
}

impl From<image::GrayImage> for Raster {
    fn from(img: image::GrayImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            data: img.into_raw(),
            width,
            height,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("invalid raster length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
}
