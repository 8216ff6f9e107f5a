//! Face detection capability and raw-hit grouping.
//!
//! The cropper only depends on [`FaceDetector`], so any detector that yields
//! rectangles in source-image coordinates can stand in for the bundled
//! Haar cascade.

use crate::types::Detection;
use image::GrayImage;

// --- Fixed detection policy ---
pub const DEFAULT_SCALE_FACTOR: f64 = 1.1;
pub const DEFAULT_MIN_NEIGHBORS: u32 = 5;
pub const DEFAULT_MIN_SIZE: u32 = 30;

/// Relative tolerance used when clustering raw window hits.
pub const GROUP_EPS: f64 = 0.2;

/// Pluggable face detector.
pub trait FaceDetector {
    /// Detect faces in a luminance image. An empty result is not an error.
    fn detect(&self, gray: &GrayImage) -> Vec<Detection>;
}

/// Multi-scale search knobs shared by window-based detectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    /// Growth of the search window between passes.
    pub scale_factor: f64,
    /// Raw hits that must agree with a candidate before it is kept.
    pub min_neighbors: u32,
    /// Smallest face edge, in source pixels.
    pub min_size: u32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_size: DEFAULT_MIN_SIZE,
        }
    }
}

/// Two hits belong together when every edge lies within `delta` of the other's.
fn similar(a: &Detection, b: &Detection, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) as f64 + a.height.min(b.height) as f64) * 0.5;
    let close = |p: u32, q: u32| (p as f64 - q as f64).abs() <= delta;

    close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.x + a.width, b.x + b.width)
        && close(a.y + a.height, b.y + b.height)
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Cluster overlapping raw hits into face candidates.
///
/// A cluster of `n` hits survives when `n - 1 >= min_neighbors`. Surviving
/// clusters are averaged, then any cluster nested inside a stronger one is
/// dropped. Output order follows the first hit of each cluster.
pub fn group_rectangles(raw: &[Detection], min_neighbors: u32, eps: f64) -> Vec<Detection> {
    if min_neighbors == 0 || raw.is_empty() {
        return raw.to_vec();
    }

    let mut parent: Vec<usize> = (0..raw.len()).collect();
    for i in 0..raw.len() {
        for j in (i + 1)..raw.len() {
            if similar(&raw[i], &raw[j], eps) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    // Label clusters in order of first appearance.
    let mut label_of_root = vec![usize::MAX; raw.len()];
    let mut sums: Vec<[u64; 4]> = Vec::new();
    let mut weights: Vec<u32> = Vec::new();
    for (i, r) in raw.iter().enumerate() {
        let root = find(&mut parent, i);
        if label_of_root[root] == usize::MAX {
            label_of_root[root] = sums.len();
            sums.push([0; 4]);
            weights.push(0);
        }
        let cls = label_of_root[root];
        sums[cls][0] += r.x as u64;
        sums[cls][1] += r.y as u64;
        sums[cls][2] += r.width as u64;
        sums[cls][3] += r.height as u64;
        weights[cls] += 1;
    }

    let averaged: Vec<Detection> = sums
        .iter()
        .zip(&weights)
        .map(|(s, &n)| {
            let avg = |v: u64| (v as f64 / n as f64).round() as u32;
            Detection::new(avg(s[0]), avg(s[1]), avg(s[2]), avg(s[3]))
        })
        .collect();

    let mut kept = Vec::new();
    for (i, r1) in averaged.iter().enumerate() {
        let n1 = weights[i];
        if n1 <= min_neighbors {
            continue;
        }

        let nested = averaged.iter().enumerate().any(|(j, r2)| {
            let n2 = weights[j];
            if j == i || n2 <= min_neighbors {
                return false;
            }
            let dx = (r2.width as f64 * eps).round() as i64;
            let dy = (r2.height as f64 * eps).round() as i64;
            let (x1, y1) = (r1.x as i64, r1.y as i64);
            let (x2, y2) = (r2.x as i64, r2.y as i64);

            x1 >= x2 - dx
                && y1 >= y2 - dy
                && x1 + r1.width as i64 <= x2 + r2.width as i64 + dx
                && y1 + r1.height as i64 <= y2 + r2.height as i64 + dy
                && (n2 > n1.max(3) || n1 < 3)
        });

        if !nested {
            kept.push(*r1);
        }
    }

    tracing::debug!(raw = raw.len(), clusters = averaged.len(), kept = kept.len(), "grouped raw hits");
    kept
}
