//! # Quantity Estimator Module
//!
//! Turns merged ingredients into human-readable quantities using two static
//! policy tables:
//!
//! - [`SizeThresholds`] maps the fraction of the image covered by an
//!   ingredient to a [`SizeBucket`]
//! - [`UnitTable`] maps a class name to a unit (`ml`, `pcs` or `g`)
//!
//! The estimator only adds descriptive fields. It never changes the instance
//! count produced by the merger.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::merge::MergedIngredient;

/// Discrete size category derived from the area fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeBucket {
    VerySmall,
    Small,
    Medium,
    Large,
    VeryLarge,
}

impl SizeBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeBucket::VerySmall => "very_small",
            SizeBucket::Small => "small",
            SizeBucket::Medium => "medium",
            SizeBucket::Large => "large",
            SizeBucket::VeryLarge => "very_large",
        }
    }

    /// Approximate share of a whole item or bulk package
    pub fn portion_value(&self) -> f32 {
        match self {
            SizeBucket::VerySmall => 0.1,
            SizeBucket::Small => 0.25,
            SizeBucket::Medium => 0.5,
            SizeBucket::Large => 0.75,
            SizeBucket::VeryLarge => 1.0,
        }
    }
}

impl fmt::Display for SizeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str().replace('_', " "))
    }
}

/// Unit proposed for an ingredient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatedUnit {
    /// Discrete pieces
    Pcs,
    /// Grams
    G,
    /// Millilitres
    Ml,
}

impl EstimatedUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstimatedUnit::Pcs => "pcs",
            EstimatedUnit::G => "g",
            EstimatedUnit::Ml => "ml",
        }
    }
}

impl fmt::Display for EstimatedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper bounds (exclusive) of each bucket as a fraction of the image area
///
/// Anything at or above `large_max` is `very_large`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeThresholds {
    pub very_small_max: f32,
    pub small_max: f32,
    pub medium_max: f32,
    pub large_max: f32,
}

impl Default for SizeThresholds {
    fn default() -> Self {
        Self {
            very_small_max: 0.02,
            small_max: 0.05,
            medium_max: 0.12,
            large_max: 0.25,
        }
    }
}

impl SizeThresholds {
    /// Thresholds must be finite and strictly increasing within (0, 1]
    pub fn is_valid(&self) -> bool {
        let bounds = [
            self.very_small_max,
            self.small_max,
            self.medium_max,
            self.large_max,
        ];
        bounds.iter().all(|b| b.is_finite() && *b > 0.0 && *b <= 1.0)
            && bounds.windows(2).all(|pair| pair[0] < pair[1])
    }

    /// Classify an area fraction; zero and non-finite fractions are `very_small`
    pub fn classify(&self, area_fraction: f32) -> SizeBucket {
        if !area_fraction.is_finite() || area_fraction < self.very_small_max {
            SizeBucket::VerySmall
        } else if area_fraction < self.small_max {
            SizeBucket::Small
        } else if area_fraction < self.medium_max {
            SizeBucket::Medium
        } else if area_fraction < self.large_max {
            SizeBucket::Large
        } else {
            SizeBucket::VeryLarge
        }
    }
}

/// Category lookup from class name to unit
///
/// Keywords are compared against whole words of the lowercased class name, and
/// simple plurals ("eggs", "peaches") match their singular keyword. Liquids are
/// checked before countables; everything else is weighed in grams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitTable {
    pub liquids: Vec<String>,
    pub countables: Vec<String>,
}

const DEFAULT_LIQUIDS: &[&str] = &[
    "milk", "oil", "sauce", "yogurt", "juice", "water", "cream", "vinegar", "broth", "wine",
    "syrup",
];

const DEFAULT_COUNTABLES: &[&str] = &[
    "egg", "apple", "banana", "orange", "lemon", "lime", "avocado", "peach", "pear", "kiwi",
    "mango", "plum",
];

impl Default for UnitTable {
    fn default() -> Self {
        Self {
            liquids: DEFAULT_LIQUIDS.iter().map(|s| s.to_string()).collect(),
            countables: DEFAULT_COUNTABLES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl UnitTable {
    pub fn unit_for(&self, class_name: &str) -> EstimatedUnit {
        let lowered = class_name.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        if contains_keyword(&words, &self.liquids) {
            EstimatedUnit::Ml
        } else if contains_keyword(&words, &self.countables) {
            EstimatedUnit::Pcs
        } else {
            EstimatedUnit::G
        }
    }
}

fn contains_keyword(words: &[&str], keywords: &[String]) -> bool {
    words.iter().any(|word| {
        keywords.iter().any(|keyword| {
            *word == keyword.as_str()
                || word
                    .strip_prefix(keyword.as_str())
                    .is_some_and(|rest| rest == "s" || rest == "es")
        })
    })
}

/// Where the evidence for an ingredient came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngredientSource {
    Detection,
    DetectionAndOcr,
}

/// A merged ingredient enriched with a human-readable quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantifiedIngredient {
    pub class_name: String,
    pub count: usize,
    pub representative_confidence: f32,
    pub aggregate_area_fraction: f32,
    pub size_bucket: SizeBucket,
    pub estimated_unit: EstimatedUnit,
    /// e.g. "medium portion" or "3 pcs"
    pub quantity_label: String,
    /// Bucket portion value multiplied by the instance count
    pub quantity_value: f32,
    pub source: IngredientSource,
}

impl QuantifiedIngredient {
    /// Copy of this ingredient with a different evidence source
    pub fn with_source(mut self, source: IngredientSource) -> Self {
        self.source = source;
        self
    }
}

impl fmt::Display for QuantifiedIngredient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({}, {:.0}% confidence)",
            self.class_name,
            self.quantity_label,
            self.estimated_unit,
            self.representative_confidence * 100.0
        )
    }
}

/// Render the quantity label for a bucket, unit and count
///
/// # Examples
///
/// ```rust
/// use fridge_vision::quantity::{quantity_label, EstimatedUnit, SizeBucket};
///
/// assert_eq!(quantity_label(SizeBucket::Medium, EstimatedUnit::G, 1), "medium portion");
/// assert_eq!(quantity_label(SizeBucket::Small, EstimatedUnit::Pcs, 3), "3 pcs");
/// assert_eq!(quantity_label(SizeBucket::VeryLarge, EstimatedUnit::Pcs, 1), "very large portion");
/// ```
pub fn quantity_label(bucket: SizeBucket, unit: EstimatedUnit, count: usize) -> String {
    if unit == EstimatedUnit::Pcs && count > 1 {
        format!("{count} pcs")
    } else {
        format!("{bucket} portion")
    }
}

/// Quantify a single merged ingredient
pub fn estimate_quantity(
    merged: &MergedIngredient,
    thresholds: &SizeThresholds,
    units: &UnitTable,
) -> QuantifiedIngredient {
    let size_bucket = thresholds.classify(merged.aggregate_area_fraction);
    let estimated_unit = units.unit_for(&merged.class_name);
    let label = quantity_label(size_bucket, estimated_unit, merged.count);

    debug!(
        "Quantified '{}': fraction={:.4} bucket={} unit={} label='{}'",
        merged.class_name,
        merged.aggregate_area_fraction,
        size_bucket.as_str(),
        estimated_unit,
        label
    );

    QuantifiedIngredient {
        class_name: merged.class_name.clone(),
        count: merged.count,
        representative_confidence: merged.representative_confidence,
        aggregate_area_fraction: merged.aggregate_area_fraction,
        size_bucket,
        estimated_unit,
        quantity_label: label,
        quantity_value: size_bucket.portion_value() * merged.count as f32,
        source: IngredientSource::Detection,
    }
}

/// Quantify every merged ingredient, preserving order
pub fn estimate_quantities(
    merged: &[MergedIngredient],
    thresholds: &SizeThresholds,
    units: &UnitTable,
) -> Vec<QuantifiedIngredient> {
    let quantified: Vec<QuantifiedIngredient> = merged
        .iter()
        .map(|m| estimate_quantity(m, thresholds, units))
        .collect();
    info!("Estimated quantities for {} ingredients", quantified.len());
    quantified
}
