//! Ring compositing: resize, circular mask, layer under the ring overlay.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage, Rgba, RgbaImage};

const OPAQUE: u8 = 255;
const TRANSPARENT: u8 = 0;

/// Mask of the circle inscribed in a `side` × `side` square.
///
/// A pixel is opaque when its center lies within `side / 2` of the square's
/// center. Computed on doubled integer coordinates, so there is no rounding.
pub fn circular_mask(side: u32) -> GrayImage {
    let s = side as i64;
    GrayImage::from_fn(side, side, |x, y| {
        let dx = 2 * x as i64 + 1 - s;
        let dy = 2 * y as i64 + 1 - s;
        Luma([if dx * dx + dy * dy <= s * s { OPAQUE } else { TRANSPARENT }])
    })
}

/// Attach `mask` as the alpha channel of `rgb`.
///
/// The output has `rgb`'s dimensions; pixels the mask does not cover are transparent.
pub fn apply_mask(rgb: &RgbImage, mask: &GrayImage) -> RgbaImage {
    if rgb.dimensions() != mask.dimensions() {
        tracing::warn!(image = ?rgb.dimensions(), mask = ?mask.dimensions(), "mask size differs from image");
    }
    RgbaImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let alpha = mask.get_pixel_checked(x, y).map_or(TRANSPARENT, |m| m.0[0]);
        Rgba([r, g, b, alpha])
    })
}

/// `over * m + base * (255 - m)`, divided by 255 with rounding.
fn blend(base: u8, over: u8, m: u8) -> u8 {
    let t = over as u32 * m as u32 + base as u32 * (255 - m as u32) + 128;
    (((t >> 8) + t) >> 8) as u8
}

/// Paint `layer` onto `canvas` at the origin, masked by the layer's own alpha.
///
/// All four channels are blended, so a fully opaque layer pixel replaces the
/// canvas pixel and a fully transparent one leaves it untouched.
pub fn paste_masked(canvas: &mut RgbaImage, layer: &RgbaImage) {
    let width = canvas.width().min(layer.width());
    let height = canvas.height().min(layer.height());

    for y in 0..height {
        for x in 0..width {
            let over = layer.get_pixel(x, y).0;
            let m = over[3];
            let base = canvas.get_pixel_mut(x, y);
            for c in 0..4 {
                base.0[c] = blend(base.0[c], over[c], m);
            }
        }
    }
}

/// Frame a square headshot inside `ring`; the output takes the ring's width as its side.
pub fn compose(headshot: &RgbImage, ring: &RgbaImage) -> RgbaImage {
    let size = ring.width();
    if ring.height() != size {
        tracing::warn!(width = ring.width(), height = ring.height(), "ring overlay is not square");
    }

    let resized = imageops::resize(headshot, size, size, FilterType::Lanczos3);
    let masked = apply_mask(&resized, &circular_mask(size));

    let mut canvas = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, TRANSPARENT]));
    paste_masked(&mut canvas, &masked);
    paste_masked(&mut canvas, ring);

    tracing::debug!(from = headshot.width(), to = size, "composited headshot under ring");
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOLD: Rgba<u8> = Rgba([212, 175, 55, 255]);
    const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

    /// Ring with an opaque one-pixel border and a transparent interior.
    fn border_ring(size: u32) -> RgbaImage {
        RgbaImage::from_fn(size, size, |x, y| {
            if x == 0 || y == 0 || x == size - 1 || y == size - 1 {
                GOLD
            } else {
                CLEAR
            }
        })
    }

    #[test]
    fn test_mask_center_opaque_corners_clear() {
        for side in [1u32, 2, 100, 801] {
            let mask = circular_mask(side);
            assert_eq!(mask.dimensions(), (side, side));
            assert_eq!(mask.get_pixel(side / 2, side / 2).0, [OPAQUE], "center, side {side}");
        }
        // Sides 1-3 are too small for the corners to fall outside the circle.
        for side in [4u32, 100, 801] {
            let mask = circular_mask(side);
            let last = side - 1;
            for (x, y) in [(0, 0), (last, 0), (0, last), (last, last)] {
                assert_eq!(mask.get_pixel(x, y).0, [TRANSPARENT], "corner ({x},{y}), side {side}");
            }
        }
    }

    #[test]
    fn test_mask_is_symmetric() {
        let side = 37;
        let mask = circular_mask(side);
        for y in 0..side {
            for x in 0..side {
                let v = mask.get_pixel(x, y).0;
                assert_eq!(v, mask.get_pixel(side - 1 - x, y).0);
                assert_eq!(v, mask.get_pixel(x, side - 1 - y).0);
                assert_eq!(v, mask.get_pixel(y, x).0);
            }
        }
    }

    #[test]
    fn test_mask_edge_midpoints_opaque() {
        let mask = circular_mask(100);
        assert_eq!(mask.get_pixel(0, 50).0, [OPAQUE]);
        assert_eq!(mask.get_pixel(50, 0).0, [OPAQUE]);
        assert_eq!(mask.get_pixel(99, 49).0, [OPAQUE]);
    }

    #[test]
    fn test_apply_mask_overwrites_alpha() {
        let rgb = RgbImage::from_pixel(4, 4, image::Rgb([9, 8, 7]));
        let out = apply_mask(&rgb, &circular_mask(4));
        assert_eq!(out.get_pixel(2, 2).0, [9, 8, 7, 255]);
        assert_eq!(out.get_pixel(0, 0).0, [9, 8, 7, 0]);
    }

    #[test]
    fn test_apply_mask_size_mismatch_clears_uncovered() {
        let rgb = RgbImage::from_pixel(6, 3, image::Rgb([9, 8, 7]));
        let mask = GrayImage::from_pixel(4, 4, Luma([OPAQUE]));
        let out = apply_mask(&rgb, &mask);
        assert_eq!(out.dimensions(), (6, 3));
        assert_eq!(out.get_pixel(3, 2).0, [9, 8, 7, 255]);
        assert_eq!(out.get_pixel(4, 0).0, [9, 8, 7, 0]);
        assert_eq!(out.get_pixel(5, 2).0, [9, 8, 7, 0]);
    }

    #[test]
    fn test_blend_extremes_are_exact() {
        for base in [0u8, 1, 127, 128, 254, 255] {
            for over in [0u8, 3, 200, 255] {
                assert_eq!(blend(base, over, 255), over);
                assert_eq!(blend(base, over, 0), base);
            }
        }
        assert_eq!(blend(0, 255, 128), 128);
    }

    #[test]
    fn test_paste_respects_layer_alpha() {
        let mut canvas = RgbaImage::from_pixel(2, 1, Rgba([10, 20, 30, 255]));
        let layer = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([200, 100, 50, 255])
            } else {
                Rgba([200, 100, 50, 0])
            }
        });
        paste_masked(&mut canvas, &layer);
        assert_eq!(canvas.get_pixel(0, 0).0, [200, 100, 50, 255]);
        assert_eq!(canvas.get_pixel(1, 0).0, [10, 20, 30, 255]);
    }

    #[test]
    fn test_ring_occludes_band_and_reveals_center() {
        let headshot = RgbImage::from_pixel(4, 4, image::Rgb([200, 100, 50]));
        let out = compose(&headshot, &border_ring(4));

        assert_eq!(out.dimensions(), (4, 4));
        // Transparent ring center shows the masked headshot
        assert_eq!(out.get_pixel(2, 2).0, [200, 100, 50, 255]);
        assert_eq!(out.get_pixel(1, 1).0, [200, 100, 50, 255]);
        // Opaque band shows the ring, whether or not the headshot was there
        assert_eq!(*out.get_pixel(0, 1), GOLD);
        assert_eq!(*out.get_pixel(0, 0), GOLD);
        assert_eq!(*out.get_pixel(3, 2), GOLD);
    }

    #[test]
    fn test_clear_ring_leaves_corners_transparent() {
        let headshot = RgbImage::from_pixel(8, 8, image::Rgb([1, 2, 3]));
        let ring = RgbaImage::from_pixel(8, 8, CLEAR);
        let out = compose(&headshot, &ring);
        assert_eq!(*out.get_pixel(0, 0), CLEAR);
        assert_eq!(*out.get_pixel(7, 7), CLEAR);
        assert_eq!(out.get_pixel(4, 4).0, [1, 2, 3, 255]);
    }

    #[test]
    fn test_output_takes_ring_size() {
        let headshot = RgbImage::from_pixel(50, 50, image::Rgb([90, 90, 90]));
        let out = compose(&headshot, &border_ring(16));
        assert_eq!(out.dimensions(), (16, 16));
        assert_eq!(out.get_pixel(8, 8).0, [90, 90, 90, 255]);
    }

    #[test]
    fn test_compose_is_deterministic() {
        let headshot = RgbImage::from_fn(40, 40, |x, y| image::Rgb([x as u8 * 6, y as u8 * 6, 77]));
        let ring = border_ring(24);
        assert_eq!(compose(&headshot, &ring), compose(&headshot, &ring));
    }
}
