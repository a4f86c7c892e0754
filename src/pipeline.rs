//! # Pipeline Orchestrator Module
//!
//! Sequences the stages of a request:
//!
//! raw detections → [`normalize_detections`] → [`merge_detections`] →
//! [`estimate_quantities`] → ingredient names → recipe ranking
//!
//! All state a request needs lives in an explicitly constructed
//! [`PipelineContext`]: the validated [`PipelineConfig`], the shared
//! [`RecipeCatalog`] and the ingredient matcher. Nothing here is global, so two
//! contexts with different configurations can run side by side.
//!
//! Recommendation goes through a [`RecipeRanker`]. The catalog scorer is one
//! implementation, an already-resolved LLM response is another; when the
//! selected ranker fails or finds nothing, the catalog scorer answers instead.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::catalog::{Recipe, RecipeCatalog};
use crate::config::{validate_unit_interval, PipelineConfig};
use crate::detection::{normalize_detections, ImageSize, RawDetection};
use crate::errors::VisionError;
use crate::merge::merge_detections;
use crate::ocr_text::{detect_expiry_date, harvest_ingredient_names, mark_ocr_confirmed};
use crate::quantity::{estimate_quantities, QuantifiedIngredient};
use crate::scoring::{
    normalize_ingredient_set, rank_recipes_with, IngredientMatcher, RankedRecipe, RankingOptions,
    RecipeSource,
};

/// A strategy producing ranked recipes for a set of ingredient names
pub trait RecipeRanker {
    /// Where the ranked recipes come from
    fn source(&self) -> RecipeSource;

    /// Rank recipes for normalized, deduplicated ingredient names
    ///
    /// `matcher` decides whether an available name satisfies a required one, so
    /// every ranker applies the same matching rules.
    fn rank(
        &self,
        ingredients: &[String],
        options: &RankingOptions,
        matcher: &dyn IngredientMatcher,
    ) -> Result<Vec<RankedRecipe>, VisionError>;
}

/// Ranks recipes of a catalog snapshot
#[derive(Debug, Clone)]
pub struct CatalogRanker {
    catalog: Arc<RecipeCatalog>,
}

impl CatalogRanker {
    pub fn new(catalog: Arc<RecipeCatalog>) -> Self {
        Self { catalog }
    }
}

impl RecipeRanker for CatalogRanker {
    fn source(&self) -> RecipeSource {
        RecipeSource::Catalog
    }

    fn rank(
        &self,
        ingredients: &[String],
        options: &RankingOptions,
        matcher: &dyn IngredientMatcher,
    ) -> Result<Vec<RankedRecipe>, VisionError> {
        let snapshot = self.catalog.snapshot();
        Ok(rank_recipes_with(ingredients, &snapshot, options, matcher))
    }
}

/// Input of one analysis request, as read from JSON
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionRequest {
    #[serde(default)]
    pub image_width: Option<u32>,
    #[serde(default)]
    pub image_height: Option<u32>,
    /// Image file whose dimensions are used when width/height are absent
    #[serde(default)]
    pub image_path: Option<PathBuf>,
    #[serde(default)]
    pub detections: Vec<RawDetection>,
    #[serde(default)]
    pub ocr_text: Option<String>,
    /// Extra ingredient names typed by the user
    #[serde(default)]
    pub ingredients: Vec<String>,
}

impl DetectionRequest {
    /// Explicit image dimensions, when both are given
    pub fn image_size(&self) -> Option<ImageSize> {
        match (self.image_width, self.image_height) {
            (Some(width), Some(height)) => Some(ImageSize::new(width, height)),
            _ => None,
        }
    }
}

/// Result of analyzing one image's detections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub detected_ingredients: Vec<QuantifiedIngredient>,
    /// Sum of instance counts over all ingredients
    pub total_items: usize,
    pub raw_detections: usize,
    /// Detections left after confidence and geometry filtering
    pub kept_detections: usize,
    /// Detected class names followed by OCR-only names
    pub unique_ingredients: Vec<String>,
    pub ocr_ingredients: Vec<String>,
    /// Expiry date read from packaging text, as written
    #[serde(default)]
    pub expiry_date: Option<String>,
    pub image: ImageSize,
    pub timestamp: DateTime<Utc>,
}

/// Ranked recipes for a set of ingredient names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationReport {
    pub ingredients_provided: Vec<String>,
    pub recipes: Vec<RankedRecipe>,
    pub source: RecipeSource,
    /// Whether the catalog answered after the selected ranker failed
    pub fallback_used: bool,
    pub timestamp: DateTime<Utc>,
}

impl RecommendationReport {
    fn new(
        ingredients_provided: Vec<String>,
        recipes: Vec<RankedRecipe>,
        source: RecipeSource,
        fallback_used: bool,
    ) -> Self {
        Self {
            ingredients_provided,
            recipes,
            source,
            fallback_used,
            timestamp: Utc::now(),
        }
    }
}

fn validate_image(image: ImageSize) -> Result<(), VisionError> {
    if image.is_empty() {
        return Err(VisionError::Configuration(format!(
            "image dimensions must be positive, got {}x{}",
            image.width, image.height
        )));
    }
    Ok(())
}

/// Normalize, merge and quantify; returns the quantified ingredients and the
/// number of detections kept by normalization
fn run_stages(
    detections: &[RawDetection],
    image: ImageSize,
    config: &PipelineConfig,
) -> Result<(Vec<QuantifiedIngredient>, usize), VisionError> {
    validate_image(image)?;

    let normalized = normalize_detections(detections, image, config.confidence_threshold);
    let merged = merge_detections(&normalized, image, config.iou_merge_threshold);
    let quantified = estimate_quantities(&merged, &config.size_thresholds, &config.units);

    Ok((quantified, normalized.len()))
}

/// Turn raw detections into quantified ingredients
///
/// Uses the default size thresholds and unit table.
///
/// # Errors
///
/// Returns [`VisionError::Configuration`] when a threshold is outside [0, 1]
/// or an image dimension is zero. Nothing is processed in that case.
///
/// # Examples
///
/// ```rust
/// use fridge_vision::detection::RawDetection;
/// use fridge_vision::pipeline::quantify;
/// use fridge_vision::quantity::{EstimatedUnit, SizeBucket};
///
/// let detections = vec![RawDetection::corners("tomato", 0.92, [0.0, 0.0, 320.0, 288.0])];
/// let quantified = quantify(&detections, 640, 480, 0.5, 0.45).unwrap();
///
/// assert_eq!(quantified[0].size_bucket, SizeBucket::VeryLarge);
/// assert_eq!(quantified[0].estimated_unit, EstimatedUnit::G);
/// assert_eq!(quantified[0].quantity_label, "very large portion");
/// ```
pub fn quantify(
    detections: &[RawDetection],
    image_width: u32,
    image_height: u32,
    confidence_threshold: f32,
    iou_merge_threshold: f32,
) -> Result<Vec<QuantifiedIngredient>, VisionError> {
    validate_unit_interval("confidence_threshold", confidence_threshold)?;
    validate_unit_interval("iou_merge_threshold", iou_merge_threshold)?;

    let config = PipelineConfig {
        confidence_threshold,
        iou_merge_threshold,
        ..Default::default()
    };
    let (quantified, _) = run_stages(
        detections,
        ImageSize::new(image_width, image_height),
        &config,
    )?;
    Ok(quantified)
}

/// Everything one pipeline run needs
#[derive(Clone)]
pub struct PipelineContext {
    config: PipelineConfig,
    catalog: Arc<RecipeCatalog>,
    matcher: Arc<dyn IngredientMatcher>,
}

impl PipelineContext {
    /// Build a context with the matcher selected in `config`
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::Configuration`] when `config` does not validate.
    pub fn new(config: PipelineConfig, catalog: Arc<RecipeCatalog>) -> Result<Self, VisionError> {
        config.validate()?;
        Ok(Self {
            matcher: config.matcher.build(),
            config,
            catalog,
        })
    }

    /// Replace the ingredient matcher used for catalog ranking
    pub fn with_matcher(mut self, matcher: Arc<dyn IngredientMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<RecipeCatalog> {
        &self.catalog
    }

    pub fn catalog_ranker(&self) -> CatalogRanker {
        CatalogRanker::new(Arc::clone(&self.catalog))
    }

    /// Quantify raw detections with this context's thresholds and tables
    pub fn quantify(
        &self,
        detections: &[RawDetection],
        image: ImageSize,
    ) -> Result<Vec<QuantifiedIngredient>, VisionError> {
        run_stages(detections, image, &self.config).map(|(quantified, _)| quantified)
    }

    /// Quantify detections and gather every ingredient name for ranking
    ///
    /// When OCR text is given, catalog ingredient names found in it are added
    /// to the name list and detected ingredients it mentions are marked as
    /// OCR-confirmed. An expiry date in the text is reported as well.
    pub fn analyze(
        &self,
        detections: &[RawDetection],
        image: ImageSize,
        ocr_text: Option<&str>,
    ) -> Result<DetectionReport, VisionError> {
        let (mut quantified, kept_detections) = run_stages(detections, image, &self.config)?;

        let (ocr_ingredients, expiry_date) = match ocr_text {
            Some(text) if !text.trim().is_empty() => {
                quantified = mark_ocr_confirmed(quantified, text);
                (
                    harvest_ingredient_names(text, &self.catalog.all_ingredients()),
                    detect_expiry_date(text),
                )
            }
            _ => (Vec::new(), None),
        };

        let mut unique_ingredients: Vec<String> =
            quantified.iter().map(|q| q.class_name.clone()).collect();
        for name in &ocr_ingredients {
            if !unique_ingredients.contains(name) {
                unique_ingredients.push(name.clone());
            }
        }

        let total_items = quantified.iter().map(|q| q.count).sum();
        info!(
            "Analyzed {} raw detections: {} kept, {} ingredients, {} OCR names",
            detections.len(),
            kept_detections,
            quantified.len(),
            ocr_ingredients.len()
        );

        Ok(DetectionReport {
            detected_ingredients: quantified,
            total_items,
            raw_detections: detections.len(),
            kept_detections,
            unique_ingredients,
            ocr_ingredients,
            expiry_date,
            image,
            timestamp: Utc::now(),
        })
    }

    /// Rank catalog recipes for ingredient names
    pub fn rank<S: AsRef<str>>(&self, ingredient_names: &[S]) -> Vec<RankedRecipe> {
        let snapshot = self.catalog.snapshot();
        rank_recipes_with(
            ingredient_names,
            &snapshot,
            &self.config.ranking,
            self.matcher.as_ref(),
        )
    }

    /// Recommend catalog recipes for ingredient names
    pub fn recommend<S: AsRef<str>>(&self, ingredient_names: &[S]) -> RecommendationReport {
        let names = normalize_ingredient_set(ingredient_names);
        let recipes = self.rank(&names);
        RecommendationReport::new(names, recipes, RecipeSource::Catalog, false)
    }

    /// Recommend through `ranker`, falling back to the catalog scorer when it
    /// fails or returns nothing
    pub fn recommend_with<S: AsRef<str>>(
        &self,
        ranker: &dyn RecipeRanker,
        ingredient_names: &[S],
    ) -> RecommendationReport {
        let names = normalize_ingredient_set(ingredient_names);
        let source = ranker.source();
        if names.is_empty() || source == RecipeSource::Catalog {
            let recipes = self.rank(&names);
            return RecommendationReport::new(names, recipes, RecipeSource::Catalog, false);
        }

        match ranker.rank(&names, &self.config.ranking, self.matcher.as_ref()) {
            Ok(recipes) if !recipes.is_empty() => {
                debug!("{:?} ranker returned {} recipes", source, recipes.len());
                RecommendationReport::new(names, recipes, source, false)
            }
            Ok(_) => {
                warn!("{:?} ranker returned no recipes, falling back to catalog", source);
                let recipes = self.rank(&names);
                RecommendationReport::new(names, recipes, RecipeSource::Catalog, true)
            }
            Err(e) => {
                warn!("{:?} ranker failed ({}), falling back to catalog", source, e);
                let recipes = self.rank(&names);
                RecommendationReport::new(names, recipes, RecipeSource::Catalog, true)
            }
        }
    }

    /// Look up one catalog recipe
    pub fn find_recipe(&self, recipe_id: i64) -> Result<Recipe, VisionError> {
        self.catalog.find(recipe_id)
    }
}
