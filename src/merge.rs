//! # Deduplicator / Merger Module
//!
//! Detectors frequently report the same physical object several times with
//! slightly shifted boxes, while a photo can also contain several genuine
//! instances of the same food. This module separates the two cases.
//!
//! Detections are grouped by class name. Inside a group, two detections are the
//! same instance when their IoU exceeds the merge threshold, and instances are
//! the connected components of that relation. The relation is transitive: a
//! chain A-B-C collapses into one instance even when A and C do not overlap,
//! so duplicate boxes are under-counted rather than over-counted.
//!
//! Detections of different classes are never merged.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::detection::{Detection, ImageSize};

/// One or more detections of a class collapsed into counted instances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedIngredient {
    pub class_name: String,
    /// Number of distinct physical instances (connected components)
    pub count: usize,
    /// Highest confidence of the strongest instance
    pub representative_confidence: f32,
    /// Area of the strongest instance's box over the image area, in [0, 1]
    pub aggregate_area_fraction: f32,
    /// Representative detection of each instance, strongest first
    pub instances: Vec<Detection>,
}

/// Minimal union-find over detection indices
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            self.parent[node] = self.parent[self.parent[node]];
            node = self.parent[node];
        }
        node
    }

    fn union(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        match self.rank[root_a].cmp(&self.rank[root_b]) {
            std::cmp::Ordering::Less => self.parent[root_a] = root_b,
            std::cmp::Ordering::Greater => self.parent[root_b] = root_a,
            std::cmp::Ordering::Equal => {
                self.parent[root_b] = root_a;
                self.rank[root_a] += 1;
            }
        }
    }
}

/// Partition detections into connected components of the "IoU above threshold" relation
///
/// Components are returned in order of their first member; members keep
/// input order.
pub fn connected_components(detections: &[&Detection], iou_threshold: f32) -> Vec<Vec<usize>> {
    let mut sets = DisjointSet::new(detections.len());

    for i in 0..detections.len() {
        for j in (i + 1)..detections.len() {
            let iou = detections[i].bounding_box.iou(&detections[j].bounding_box);
            if iou > iou_threshold {
                sets.union(i, j);
            }
        }
    }

    let mut components: Vec<Vec<usize>> = Vec::new();
    let mut root_slot: BTreeMap<usize, usize> = BTreeMap::new();
    for i in 0..detections.len() {
        let root = sets.find(i);
        let slot = *root_slot.entry(root).or_insert_with(|| {
            components.push(Vec::new());
            components.len() - 1
        });
        components[slot].push(i);
    }
    components
}

/// Index of the highest-confidence member, earliest wins ties
fn strongest_member(detections: &[&Detection], members: &[usize]) -> usize {
    let mut best = members[0];
    for &idx in &members[1..] {
        if detections[idx].confidence > detections[best].confidence {
            best = idx;
        }
    }
    best
}

fn merge_class(
    class_name: &str,
    detections: &[&Detection],
    image: ImageSize,
    iou_threshold: f32,
) -> MergedIngredient {
    let components = connected_components(detections, iou_threshold);

    let mut instances: Vec<Detection> = components
        .iter()
        .map(|members| detections[strongest_member(detections, members)].clone())
        .collect();
    // Stable sort keeps first-seen order among equally confident instances
    instances.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let representative = &instances[0];
    let image_area = image.area();
    let aggregate_area_fraction = if image_area > 0.0 {
        (representative.bounding_box.area() / image_area).clamp(0.0, 1.0) as f32
    } else {
        0.0
    };

    debug!(
        "Class '{}': {} detections merged into {} instances",
        class_name,
        detections.len(),
        instances.len()
    );

    MergedIngredient {
        class_name: class_name.to_string(),
        count: instances.len(),
        representative_confidence: representative.confidence,
        aggregate_area_fraction,
        instances,
    }
}

/// Collapse overlapping detections into one counted entry per class
///
/// Output is ordered by descending representative confidence, ties by class
/// name.
///
/// # Examples
///
/// ```rust
/// use fridge_vision::detection::{BoundingBox, Detection, ImageSize};
/// use fridge_vision::merge::merge_detections;
///
/// let detections = vec![
///     Detection::new("tomato", 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
///     Detection::new("tomato", 0.8, BoundingBox::new(1.0, 1.0, 11.0, 11.0)),
///     Detection::new("tomato", 0.7, BoundingBox::new(50.0, 50.0, 60.0, 60.0)),
/// ];
/// let merged = merge_detections(&detections, ImageSize::new(640, 480), 0.45);
///
/// assert_eq!(merged.len(), 1);
/// assert_eq!(merged[0].count, 2);
/// ```
pub fn merge_detections(
    detections: &[Detection],
    image: ImageSize,
    iou_threshold: f32,
) -> Vec<MergedIngredient> {
    let mut groups: BTreeMap<&str, Vec<&Detection>> = BTreeMap::new();
    for detection in detections {
        groups
            .entry(detection.class_name.as_str())
            .or_default()
            .push(detection);
    }

    let mut merged: Vec<MergedIngredient> = groups
        .into_iter()
        .map(|(class_name, group)| merge_class(class_name, &group, image, iou_threshold))
        .collect();

    merged.sort_by(|a, b| {
        b.representative_confidence
            .total_cmp(&a.representative_confidence)
            .then_with(|| a.class_name.cmp(&b.class_name))
    });

    info!(
        "Merged {} detections into {} ingredient classes",
        detections.len(),
        merged.len()
    );
    merged
}

/// Flatten merged ingredients back into one detection per instance
pub fn instance_detections(merged: &[MergedIngredient]) -> Vec<Detection> {
    merged
        .iter()
        .flat_map(|ingredient| ingredient.instances.iter().cloned())
        .collect()
}
