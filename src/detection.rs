//! # Detection Normalizer Module
//!
//! Object detectors report boxes in different conventions. This module absorbs
//! that variability: every supported convention is one variant of
//! [`RawDetection`], and each variant has an explicit adapter into the canonical
//! corner-pair [`Detection`] used by the rest of the pipeline.
//!
//! ## Supported conventions
//!
//! - `corners`: `[x_min, y_min, x_max, y_max]` in pixels (YOLO `xyxy`)
//! - `center_size`: center and size in pixels (YOLO `xywh`)
//! - `normalized_center_size`: center and size relative to the image (YOLO label files)
//!
//! Malformed records are dropped, never reported as errors.

use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Build a box from its center point and size
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        let half_w = width * 0.5;
        let half_h = height * 0.5;
        Self::new(cx - half_w, cy - half_h, cx + half_w, cy + half_h)
    }

    pub fn width(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y_max - self.y_min).max(0.0)
    }

    /// Area in square pixels, computed in f64 so huge finite boxes stay finite
    pub fn area(&self) -> f64 {
        let width = (f64::from(self.x_max) - f64::from(self.x_min)).max(0.0);
        let height = (f64::from(self.y_max) - f64::from(self.y_min)).max(0.0);
        width * height
    }

    /// True when all coordinates are finite and the box has positive width and height
    pub fn is_well_formed(&self) -> bool {
        let finite = [self.x_min, self.y_min, self.x_max, self.y_max]
            .iter()
            .all(|v| v.is_finite());
        finite && self.x_max > self.x_min && self.y_max > self.y_min
    }

    pub fn intersection_area(&self, other: &Self) -> f64 {
        let inter = BoundingBox::new(
            self.x_min.max(other.x_min),
            self.y_min.max(other.y_min),
            self.x_max.min(other.x_max),
            self.y_max.min(other.y_max),
        );
        inter.area()
    }

    /// Intersection-over-Union, 0.0 for disjoint or degenerate boxes
    pub fn iou(&self, other: &Self) -> f32 {
        let inter_area = self.intersection_area(other);
        let union = self.area() + other.area() - inter_area;
        if union <= 0.0 {
            0.0
        } else {
            (inter_area / union) as f32
        }
    }
}

/// Pixel dimensions of the analysed image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> f64 {
        f64::from(self.width) * f64::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One candidate object found in an image, in canonical corner-pair form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Food category label as reported by the detector
    pub class_name: String,
    /// Detector confidence in [0, 1]
    pub confidence: f32,
    /// Box in pixel coordinates
    pub bounding_box: BoundingBox,
}

impl Detection {
    pub fn new(class_name: &str, confidence: f32, bounding_box: BoundingBox) -> Self {
        Self {
            class_name: class_name.to_string(),
            confidence,
            bounding_box,
        }
    }
}

/// Raw detector output, one variant per upstream box convention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum RawDetection {
    /// `[x_min, y_min, x_max, y_max]` in pixels
    Corners {
        #[serde(alias = "class_name")]
        label: String,
        #[serde(alias = "confidence")]
        score: f32,
        bbox: [f32; 4],
    },
    /// Center `[cx, cy]` and size `[width, height]` in pixels
    CenterSize {
        #[serde(alias = "class_name")]
        label: String,
        #[serde(alias = "confidence")]
        score: f32,
        center: [f32; 2],
        size: [f32; 2],
    },
    /// Center and size as fractions of the image dimensions
    NormalizedCenterSize {
        #[serde(alias = "class_name")]
        label: String,
        #[serde(alias = "confidence")]
        score: f32,
        center: [f32; 2],
        size: [f32; 2],
    },
}

impl RawDetection {
    pub fn corners(label: &str, score: f32, bbox: [f32; 4]) -> Self {
        RawDetection::Corners {
            label: label.to_string(),
            score,
            bbox,
        }
    }

    pub fn center_size(label: &str, score: f32, center: [f32; 2], size: [f32; 2]) -> Self {
        RawDetection::CenterSize {
            label: label.to_string(),
            score,
            center,
            size,
        }
    }

    pub fn normalized_center_size(
        label: &str,
        score: f32,
        center: [f32; 2],
        size: [f32; 2],
    ) -> Self {
        RawDetection::NormalizedCenterSize {
            label: label.to_string(),
            score,
            center,
            size,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            RawDetection::Corners { label, .. }
            | RawDetection::CenterSize { label, .. }
            | RawDetection::NormalizedCenterSize { label, .. } => label,
        }
    }

    pub fn score(&self) -> f32 {
        match self {
            RawDetection::Corners { score, .. }
            | RawDetection::CenterSize { score, .. }
            | RawDetection::NormalizedCenterSize { score, .. } => *score,
        }
    }

    /// Convert into a canonical detection, `None` when the box is malformed
    pub fn to_detection(&self, image: ImageSize) -> Option<Detection> {
        let bounding_box = match self {
            RawDetection::Corners { bbox, .. } => from_corners(*bbox),
            RawDetection::CenterSize { center, size, .. } => from_center_size(*center, *size),
            RawDetection::NormalizedCenterSize { center, size, .. } => {
                from_normalized_center_size(*center, *size, image)
            }
        };

        if !bounding_box.is_well_formed() {
            return None;
        }

        Some(Detection::new(self.label(), self.score(), bounding_box))
    }
}

fn from_corners(bbox: [f32; 4]) -> BoundingBox {
    BoundingBox::new(bbox[0], bbox[1], bbox[2], bbox[3])
}

fn from_center_size(center: [f32; 2], size: [f32; 2]) -> BoundingBox {
    BoundingBox::from_center(center[0], center[1], size[0], size[1])
}

fn from_normalized_center_size(center: [f32; 2], size: [f32; 2], image: ImageSize) -> BoundingBox {
    let w = image.width as f32;
    let h = image.height as f32;
    BoundingBox::from_center(center[0] * w, center[1] * h, size[0] * w, size[1] * h)
}

/// Normalize raw detector output into canonical detections
///
/// Records scoring below `confidence_threshold` or above 1, with a non-finite
/// score, or with a box of non-positive width or height are dropped. Labels pass
/// through verbatim.
///
/// # Examples
///
/// ```rust
/// use fridge_vision::detection::{normalize_detections, ImageSize, RawDetection};
///
/// let raw = vec![
///     RawDetection::corners("tomato", 0.9, [0.0, 0.0, 10.0, 10.0]),
///     RawDetection::corners("tomato", 0.2, [0.0, 0.0, 10.0, 10.0]),
///     RawDetection::corners("onion", 0.8, [5.0, 5.0, 5.0, 9.0]),
/// ];
/// let detections = normalize_detections(&raw, ImageSize::new(640, 480), 0.5);
///
/// assert_eq!(detections.len(), 1);
/// assert_eq!(detections[0].class_name, "tomato");
/// ```
pub fn normalize_detections(
    raw: &[RawDetection],
    image: ImageSize,
    confidence_threshold: f32,
) -> Vec<Detection> {
    let mut detections = Vec::with_capacity(raw.len());

    for (index, record) in raw.iter().enumerate() {
        let score = record.score();
        if !score.is_finite() || score > 1.0 {
            debug!(
                "Dropping raw detection {} ('{}'): score {} outside [0, 1]",
                index,
                record.label(),
                score
            );
            continue;
        }
        if score < confidence_threshold {
            trace!(
                "Dropping raw detection {} ('{}'): score {} below threshold {}",
                index,
                record.label(),
                score,
                confidence_threshold
            );
            continue;
        }

        match record.to_detection(image) {
            Some(detection) => detections.push(detection),
            None => debug!(
                "Dropping raw detection {} ('{}'): malformed bounding box",
                index,
                record.label()
            ),
        }
    }

    info!(
        "Normalized {} of {} raw detections",
        detections.len(),
        raw.len()
    );
    detections
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGE: ImageSize = ImageSize {
        width: 640,
        height: 480,
    };

    #[test]
    fn test_iou_identity_and_disjoint() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(50.0, 50.0, 60.0, 60.0);
        assert_eq!(a.iou(&a), 1.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        assert!((a.iou(&b) - 25.0 / 175.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), b.iou(&a));
    }

    #[test]
    fn test_iou_of_huge_boxes_stays_finite() {
        let a = BoundingBox::new(0.0, 0.0, 1e20, 1e20);
        let b = BoundingBox::new(0.0, 0.0, 5e19, 1e20);
        assert!(a.area().is_finite());
        assert_eq!(a.iou(&a), 1.0);
        assert!((a.iou(&b) - 0.5).abs() < 1e-6);

        let wide = BoundingBox::new(-3e38, -3e38, 3e38, 3e38);
        assert_eq!(wide.iou(&wide), 1.0);
    }

    #[test]
    fn test_iou_touching_edges_is_zero() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(10.0, 0.0, 20.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_center_size_adapter() {
        let raw = RawDetection::center_size("egg", 0.9, [50.0, 40.0], [20.0, 10.0]);
        let detection = raw.to_detection(IMAGE).unwrap();
        assert_eq!(detection.bounding_box, BoundingBox::new(40.0, 35.0, 60.0, 45.0));
    }

    #[test]
    fn test_normalized_center_size_adapter() {
        let raw = RawDetection::normalized_center_size("milk", 0.7, [0.5, 0.5], [0.25, 0.5]);
        let detection = raw.to_detection(IMAGE).unwrap();
        assert_eq!(detection.bounding_box, BoundingBox::new(240.0, 120.0, 400.0, 360.0));
    }

    #[test]
    fn test_malformed_boxes_are_dropped() {
        let raw = vec![
            RawDetection::corners("apple", 0.9, [10.0, 10.0, 5.0, 20.0]),
            RawDetection::corners("apple", 0.9, [10.0, 10.0, 20.0, 10.0]),
            RawDetection::corners("apple", 0.9, [f32::NAN, 0.0, 5.0, 5.0]),
            RawDetection::center_size("apple", 0.9, [10.0, 10.0], [0.0, 5.0]),
        ];
        assert!(normalize_detections(&raw, IMAGE, 0.5).is_empty());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let raw = vec![
            RawDetection::corners("apple", 0.5, [0.0, 0.0, 5.0, 5.0]),
            RawDetection::corners("pear", 0.49, [0.0, 0.0, 5.0, 5.0]),
            RawDetection::corners("plum", f32::NAN, [0.0, 0.0, 5.0, 5.0]),
        ];
        let detections = normalize_detections(&raw, IMAGE, 0.5);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_name, "apple");
    }

    #[test]
    fn test_scores_above_one_are_dropped() {
        let raw = vec![
            RawDetection::corners("apple", 1.7, [0.0, 0.0, 5.0, 5.0]),
            RawDetection::corners("pear", 1.0, [0.0, 0.0, 5.0, 5.0]),
        ];
        let detections = normalize_detections(&raw, IMAGE, 0.0);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_name, "pear");
        assert_eq!(detections[0].confidence, 1.0);
    }

    #[test]
    fn test_unknown_label_passes_through() {
        let raw = vec![RawDetection::corners("Dragon Fruit ", 0.9, [0.0, 0.0, 5.0, 5.0])];
        let detections = normalize_detections(&raw, IMAGE, 0.5);
        assert_eq!(detections[0].class_name, "Dragon Fruit ");
    }

    #[test]
    fn test_empty_input() {
        assert!(normalize_detections(&[], IMAGE, 0.5).is_empty());
    }

    #[test]
    fn test_deserialize_tagged_formats() {
        let json = r#"[
            {
                "format": "corners", "class_name": "tomato", "confidence": 0.91,
                "bbox": [0, 0, 10, 10]
            },
            {
                "format": "center_size", "label": "egg", "score": 0.8,
                "center": [5, 5], "size": [2, 2]
            }
        ]"#;
        let raw: Vec<RawDetection> = serde_json::from_str(json).unwrap();
        assert_eq!(raw[0].label(), "tomato");
        assert_eq!(raw[1].score(), 0.8);
        assert_eq!(normalize_detections(&raw, IMAGE, 0.5).len(), 2);
    }
}
