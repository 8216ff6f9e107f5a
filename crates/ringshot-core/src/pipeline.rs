//! One-shot pipeline: headshot file in, ringed PNG out.

use crate::compositor::compose;
use crate::cropper::{crop_square, crop_to_region};
use crate::detector::FaceDetector;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageDecoder, ImageEncoder, RgbaImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const OUTPUT_SUFFIX: &str = "_with-ring.png";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to decode image {path}: {message}")]
    Decode { path: String, message: String },
    #[error("failed to encode output: {0}")]
    Encode(String),
    #[error("failed to write {path}: {source}")]
    Save {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Decode an image file, upright according to its EXIF orientation.
///
/// The file is only held open for the duration of the call.
pub fn load_image(path: &Path) -> Result<DynamicImage, PipelineError> {
    let decode_err = |message: String| PipelineError::Decode {
        path: path.display().to_string(),
        message,
    };

    let mut decoder = image::ImageReader::open(path)
        .map_err(|e| decode_err(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| decode_err(e.to_string()))?
        .into_decoder()
        .map_err(|e| decode_err(e.to_string()))?;
    let orientation = decoder
        .orientation()
        .map_err(|e| decode_err(e.to_string()))?;

    let mut decoded = DynamicImage::from_decoder(decoder).map_err(|e| decode_err(e.to_string()))?;
    decoded.apply_orientation(orientation);
    tracing::trace!(path = %path.display(), ?orientation, "decoded image");
    Ok(decoded)
}

/// `<stem>_with-ring.png`, relative to the current working directory.
pub fn output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    PathBuf::from(format!("{stem}{OUTPUT_SUFFIX}"))
}

/// Encode an RGBA image as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, PipelineError> {
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| PipelineError::Encode(e.to_string()))?;
    Ok(buffer)
}

/// Crop-and-composite pipeline over a fixed detector and ring overlay.
pub struct Pipeline<'a> {
    detector: &'a dyn FaceDetector,
    ring_path: PathBuf,
}

impl<'a> Pipeline<'a> {
    pub fn new(detector: &'a dyn FaceDetector, ring_path: impl Into<PathBuf>) -> Self {
        Self {
            detector,
            ring_path: ring_path.into(),
        }
    }

    /// Produce the composited image for `headshot` without touching the filesystem output.
    pub fn render(&self, headshot: &Path) -> Result<RgbaImage, PipelineError> {
        let source = load_image(headshot)?;
        tracing::info!(
            path = %headshot.display(),
            width = source.width(),
            height = source.height(),
            "loaded headshot"
        );

        let region = crop_square(&source, self.detector);
        let square = crop_to_region(&source, region);

        let ring = load_image(&self.ring_path)?.to_rgba8();
        tracing::debug!(path = %self.ring_path.display(), size = ring.width(), "loaded ring overlay");

        Ok(compose(&square, &ring))
    }

    /// Render `headshot` and write it to [`output_path`], overwriting any existing file.
    pub fn run(&self, headshot: &Path) -> Result<PathBuf, PipelineError> {
        let composed = self.render(headshot)?;
        let bytes = encode_png(&composed)?;

        let out = output_path(headshot);
        std::fs::write(&out, bytes).map_err(|source| PipelineError::Save {
            path: out.display().to_string(),
            source,
        })?;

        tracing::info!(path = %out.display(), "wrote composited image");
        Ok(out)
    }
}
