//! Face-anchored square crop selection.

use crate::detector::FaceDetector;
use crate::types::{Detection, SquareRegion};
use image::{DynamicImage, GrayImage, Luma, RgbImage};

/// Rec. 601 luma from 8-bit RGB, integer weights scaled by 1000.
pub fn luminance(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000;
        Luma([luma as u8])
    })
}

/// The candidate with the largest area; the first one wins a tie.
pub fn select_largest(detections: &[Detection]) -> Option<&Detection> {
    detections
        .iter()
        .reduce(|best, d| if d.area() > best.area() { d } else { best })
}

/// Center of the largest detection, or the image center when there is none.
pub fn anchor_center(detections: &[Detection], width: u32, height: u32) -> (u32, u32) {
    match select_largest(detections) {
        Some(face) => face.center(),
        None => (width / 2, height / 2),
    }
}

/// Square of side `min(width, height)` centered on `center`, clamped inside the image.
pub fn square_region(width: u32, height: u32, center: (u32, u32)) -> SquareRegion {
    let side = width.min(height);
    let half = (side / 2) as i64;
    let (cx, cy) = (center.0 as i64, center.1 as i64);

    let left = (cx - half).min((width - side) as i64).max(0);
    let top = (cy - half).min((height - side) as i64).max(0);

    SquareRegion {
        left: left as u32,
        top: top as u32,
        side,
    }
}

/// Pick the square crop for `image`, anchored on its most prominent face.
pub fn crop_square(image: &DynamicImage, detector: &dyn FaceDetector) -> SquareRegion {
    let (width, height) = (image.width(), image.height());
    let gray = luminance(&image.to_rgb8());
    let faces = detector.detect(&gray);

    match select_largest(&faces) {
        Some(face) => tracing::info!(faces = faces.len(), ?face, "anchoring crop on largest face"),
        None => tracing::info!(width, height, "no face detected, falling back to center crop"),
    }

    let region = square_region(width, height, anchor_center(&faces, width, height));
    tracing::debug!(?region, "selected square region");
    region
}

/// Cut `region` out of the full-color image.
pub fn crop_to_region(image: &DynamicImage, region: SquareRegion) -> RgbImage {
    image
        .crop_imm(region.left, region.top, region.side, region.side)
        .to_rgb8()
}
