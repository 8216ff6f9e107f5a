//! Haar-cascade face detector.
//!
//! Evaluates OpenCV boosted Haar cascades (the `haarcascade_frontalface_*.xml`
//! family) directly: an image pyramid is scanned with the model's base window,
//! each window is variance-normalised through integral images, and the stage
//! chain decides acceptance. Raw hits are clustered with
//! [`group_rectangles`](crate::detector::group_rectangles).

use crate::detector::{group_rectangles, DetectionParams, FaceDetector, GROUP_EPS};
use crate::types::Detection;
use image::imageops::{self, FilterType};
use image::GrayImage;
use roxmltree::{Document, Node};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_CASCADE_FILE: &str = "haarcascade_frontalface_default.xml";

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("cascade model not found: {0} — copy haarcascade_frontalface_default.xml from OpenCV into models/")]
    ModelNotFound(String),
    #[error("failed to read cascade model {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid cascade model: {0}")]
    InvalidModel(String),
    #[error("scale factor must be greater than 1.0, got {0}")]
    InvalidScaleFactor(f64),
}

fn invalid(msg: impl Into<String>) -> CascadeError {
    CascadeError::InvalidModel(msg.into())
}

#[derive(Debug, Clone)]
struct WeightedRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f64,
}

#[derive(Debug, Clone)]
struct Feature {
    rects: Vec<WeightedRect>,
}

/// Split node; non-positive child indices point into the tree's leaves.
#[derive(Debug, Clone)]
struct TreeNode {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f64,
}

#[derive(Debug, Clone)]
struct WeakClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<f64>,
}

#[derive(Debug, Clone)]
struct Stage {
    threshold: f64,
    classifiers: Vec<WeakClassifier>,
}

/// A boosted Haar cascade loaded from an OpenCV XML model.
#[derive(Debug, Clone)]
pub struct HaarCascade {
    window_width: u32,
    window_height: u32,
    stages: Vec<Stage>,
    features: Vec<Feature>,
}

fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Result<Node<'a, 'i>, CascadeError> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .ok_or_else(|| invalid(format!("missing <{name}> in <{}>", node.tag_name().name())))
}

fn text<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, CascadeError> {
    Ok(child(node, name)?.text().unwrap_or("").trim())
}

fn number<T: FromStr>(token: &str) -> Result<T, CascadeError> {
    token
        .parse()
        .map_err(|_| invalid(format!("bad number {token:?}")))
}

/// OpenCV serialises sequences as repeated `<_>` elements.
fn items<'a, 'i>(node: Node<'a, 'i>) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children()
        .filter(|n| n.is_element() && n.tag_name().name() == "_")
}

fn parse_classifier(node: Node) -> Result<WeakClassifier, CascadeError> {
    let raw: Vec<&str> = text(node, "internalNodes")?.split_whitespace().collect();
    if raw.is_empty() || raw.len() % 4 != 0 {
        return Err(invalid(format!(
            "internalNodes must hold groups of 4 values, got {}",
            raw.len()
        )));
    }

    let nodes = raw
        .chunks(4)
        .map(|c| {
            Ok(TreeNode {
                left: number(c[0])?,
                right: number(c[1])?,
                feature: number(c[2])?,
                threshold: number(c[3])?,
            })
        })
        .collect::<Result<Vec<_>, CascadeError>>()?;

    let leaves = text(node, "leafValues")?
        .split_whitespace()
        .map(number)
        .collect::<Result<Vec<f64>, _>>()?;

    for n in &nodes {
        for idx in [n.left, n.right] {
            let in_range = if idx > 0 {
                (idx as usize) < nodes.len()
            } else {
                (idx.unsigned_abs() as usize) < leaves.len()
            };
            if !in_range {
                return Err(invalid(format!("tree child index {idx} out of range")));
            }
        }
    }

    Ok(WeakClassifier { nodes, leaves })
}

fn parse_feature(node: Node) -> Result<Feature, CascadeError> {
    if let Ok(tilted) = text(node, "tilted") {
        if tilted != "0" {
            return Err(invalid("tilted Haar features are not supported"));
        }
    }

    let rects = items(child(node, "rects")?)
        .map(|r| {
            let v: Vec<&str> = r.text().unwrap_or("").split_whitespace().collect();
            if v.len() != 5 {
                return Err(invalid(format!("feature rect needs 5 values, got {}", v.len())));
            }
            Ok(WeightedRect {
                x: number(v[0])?,
                y: number(v[1])?,
                width: number(v[2])?,
                height: number(v[3])?,
                weight: number(v[4])?,
            })
        })
        .collect::<Result<Vec<_>, CascadeError>>()?;

    if rects.is_empty() {
        return Err(invalid("feature without rects"));
    }
    Ok(Feature { rects })
}

/// Summed-area tables over a luminance image, one row/column of zero padding.
struct Integral {
    stride: usize,
    sum: Vec<i64>,
    sq_sum: Vec<i64>,
}

impl Integral {
    fn new(gray: &GrayImage) -> Self {
        let (w, h) = (gray.width() as usize, gray.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0i64; stride * (h + 1)];
        let mut sq_sum = vec![0i64; stride * (h + 1)];
        let pixels = gray.as_raw();

        for y in 0..h {
            let mut row = 0i64;
            let mut row_sq = 0i64;
            for x in 0..w {
                let p = pixels[y * w + x] as i64;
                row += p;
                row_sq += p * p;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row;
                sq_sum[idx] = sq_sum[idx - stride] + row_sq;
            }
        }

        Self { stride, sum, sq_sum }
    }

    fn rect(table: &[i64], stride: usize, x: usize, y: usize, w: usize, h: usize) -> i64 {
        let tl = y * stride + x;
        let bl = (y + h) * stride + x;
        table[bl + w] - table[bl] - table[tl + w] + table[tl]
    }

    fn sum(&self, x: usize, y: usize, w: usize, h: usize) -> i64 {
        Self::rect(&self.sum, self.stride, x, y, w, h)
    }

    fn sq_sum(&self, x: usize, y: usize, w: usize, h: usize) -> i64 {
        Self::rect(&self.sq_sum, self.stride, x, y, w, h)
    }
}

impl HaarCascade {
    /// Load a cascade from an OpenCV XML file.
    pub fn load(path: &Path) -> Result<Self, CascadeError> {
        if !path.exists() {
            return Err(CascadeError::ModelNotFound(path.display().to_string()));
        }

        let xml = std::fs::read_to_string(path).map_err(|source| CascadeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let cascade = Self::parse(&xml)?;

        tracing::info!(
            path = %path.display(),
            window = ?cascade.window_size(),
            stages = cascade.stage_count(),
            features = cascade.features.len(),
            "loaded Haar cascade"
        );

        Ok(cascade)
    }

    /// Parse a cascade from XML text.
    pub fn parse(xml: &str) -> Result<Self, CascadeError> {
        let doc = Document::parse(xml).map_err(|e| invalid(e.to_string()))?;
        let root = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "cascade")
            .ok_or_else(|| invalid("no <cascade> element (old-format cascades are not supported)"))?;

        let stage_type = text(root, "stageType")?;
        let feature_type = text(root, "featureType")?;
        if stage_type != "BOOST" || feature_type != "HAAR" {
            return Err(invalid(format!(
                "expected BOOST/HAAR cascade, got {stage_type}/{feature_type}"
            )));
        }

        let window_width: u32 = number(text(root, "width")?)?;
        let window_height: u32 = number(text(root, "height")?)?;
        if window_width < 3 || window_height < 3 {
            return Err(invalid(format!(
                "window {window_width}x{window_height} is too small"
            )));
        }

        let stages = items(child(root, "stages")?)
            .map(|s| {
                let classifiers = items(child(s, "weakClassifiers")?)
                    .map(parse_classifier)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Stage {
                    threshold: number(text(s, "stageThreshold")?)?,
                    classifiers,
                })
            })
            .collect::<Result<Vec<_>, CascadeError>>()?;

        let features = items(child(root, "features")?)
            .map(parse_feature)
            .collect::<Result<Vec<_>, _>>()?;

        if stages.is_empty() {
            return Err(invalid("cascade has no stages"));
        }

        for feature in &features {
            for r in &feature.rects {
                if r.x + r.width > window_width || r.y + r.height > window_height {
                    return Err(invalid("feature rect exceeds the detection window"));
                }
            }
        }
        for stage in &stages {
            for node in stage.classifiers.iter().flat_map(|c| &c.nodes) {
                if node.feature >= features.len() {
                    return Err(invalid(format!(
                        "feature index {} out of range ({} features)",
                        node.feature,
                        features.len()
                    )));
                }
            }
        }

        Ok(Self {
            window_width,
            window_height,
            stages,
            features,
        })
    }

    /// Base detection window (width, height).
    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    fn feature_value(&self, integral: &Integral, feature: usize, x: usize, y: usize) -> f64 {
        self.features[feature]
            .rects
            .iter()
            .map(|r| {
                r.weight
                    * integral.sum(
                        x + r.x as usize,
                        y + r.y as usize,
                        r.width as usize,
                        r.height as usize,
                    ) as f64
            })
            .sum()
    }

    /// Run the stage chain on the window whose top-left corner is (x, y).
    fn accepts(&self, integral: &Integral, x: usize, y: usize) -> bool {
        let (w, h) = (self.window_width as usize, self.window_height as usize);

        // Normalise by the standard deviation of the inner window.
        let area = ((w - 2) * (h - 2)) as f64;
        let s = integral.sum(x + 1, y + 1, w - 2, h - 2) as f64;
        let sq = integral.sq_sum(x + 1, y + 1, w - 2, h - 2) as f64;
        let nf = area * sq - s * s;
        let nf = if nf > 0.0 { nf.sqrt() } else { 1.0 };
        let inv_norm = 1.0 / nf;

        for stage in &self.stages {
            let mut total = 0.0;
            for classifier in &stage.classifiers {
                let mut idx = 0usize;
                loop {
                    let node = &classifier.nodes[idx];
                    let value = self.feature_value(integral, node.feature, x, y) * inv_norm;
                    let next = if value < node.threshold { node.left } else { node.right };
                    if next <= 0 {
                        total += classifier.leaves[next.unsigned_abs() as usize];
                        break;
                    }
                    idx = next as usize;
                }
            }
            if total < stage.threshold {
                return false;
            }
        }
        true
    }

    /// Scan an image pyramid and return raw (ungrouped) window hits.
    pub fn scan(&self, gray: &GrayImage, params: &DetectionParams) -> Vec<Detection> {
        let (img_w, img_h) = gray.dimensions();
        let mut hits = Vec::new();
        if !(params.scale_factor > 1.0) {
            tracing::warn!(scale_factor = params.scale_factor, "pyramid would not shrink, skipping scan");
            return hits;
        }
        let mut factor = 1.0f64;

        loop {
            let scaled_w = (img_w as f64 / factor).round() as u32;
            let scaled_h = (img_h as f64 / factor).round() as u32;
            if scaled_w <= self.window_width || scaled_h <= self.window_height {
                break;
            }

            let win_w = (self.window_width as f64 * factor).round() as u32;
            let win_h = (self.window_height as f64 * factor).round() as u32;
            if win_w >= params.min_size && win_h >= params.min_size {
                let scaled;
                let level = if scaled_w == img_w && scaled_h == img_h {
                    gray
                } else {
                    scaled = imageops::resize(gray, scaled_w, scaled_h, FilterType::Triangle);
                    &scaled
                };
                let integral = Integral::new(level);
                let step = if factor > 2.0 { 1 } else { 2 };
                let before = hits.len();

                for y in (0..(scaled_h - self.window_height) as usize).step_by(step) {
                    for x in (0..(scaled_w - self.window_width) as usize).step_by(step) {
                        if self.accepts(&integral, x, y) {
                            hits.push(Detection::new(
                                (x as f64 * factor).round() as u32,
                                (y as f64 * factor).round() as u32,
                                win_w,
                                win_h,
                            ));
                        }
                    }
                }

                tracing::trace!(factor, scaled_w, scaled_h, hits = hits.len() - before, "scanned pyramid level");
            }

            factor *= params.scale_factor;
        }

        hits
    }
}

/// [`FaceDetector`] backed by a [`HaarCascade`] and fixed search parameters.
pub struct CascadeDetector {
    cascade: HaarCascade,
    params: DetectionParams,
}

impl CascadeDetector {
    pub fn new(cascade: HaarCascade, params: DetectionParams) -> Result<Self, CascadeError> {
        if !(params.scale_factor > 1.0) {
            return Err(CascadeError::InvalidScaleFactor(params.scale_factor));
        }
        Ok(Self { cascade, params })
    }

    /// Load the model at `path` with the default detection policy.
    pub fn from_file(path: &Path) -> Result<Self, CascadeError> {
        Self::new(HaarCascade::load(path)?, DetectionParams::default())
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }
}

impl FaceDetector for CascadeDetector {
    fn detect(&self, gray: &GrayImage) -> Vec<Detection> {
        let raw = self.cascade.scan(gray, &self.params);
        let faces = group_rectangles(&raw, self.params.min_neighbors, GROUP_EPS);
        tracing::debug!(raw = raw.len(), faces = faces.len(), "cascade detection finished");
        faces
    }
}
