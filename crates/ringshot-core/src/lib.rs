//! ringshot-core — Face-anchored square crop and gold-ring compositing.
//!
//! Finds the most prominent face with a Haar cascade, cuts the largest square
//! around it that fits the image, masks it to a circle and layers it beneath
//! a decorative ring overlay.

pub mod cascade;
pub mod compositor;
pub mod cropper;
pub mod detector;
pub mod pipeline;
pub mod types;

pub use cascade::{CascadeDetector, CascadeError, HaarCascade};
pub use detector::{DetectionParams, FaceDetector};
pub use pipeline::{Pipeline, PipelineError};
pub use types::{Detection, SquareRegion};

use std::path::PathBuf;

/// Package-relative directory holding the bundled cascade models.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models")
}
