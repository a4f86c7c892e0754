//! # Fridge Vision
//!
//! Turns object detections from a fridge photo into counted, quantified
//! ingredients and ranks recipes that can be cooked with them.
//!
//! Model inference and OCR happen upstream; this crate consumes their
//! already-resolved output. An optional LLM endpoint can suggest recipes
//! beyond the static catalog, with the catalog scorer as fallback.

pub mod catalog;
pub mod circuit_breaker;
pub mod config;
pub mod detection;
pub mod errors;
pub mod llm;
pub mod merge;
pub mod ocr_text;
pub mod pipeline;
pub mod quantity;
pub mod scoring;

pub use catalog::{Recipe, RecipeCatalog};
pub use config::{AppConfig, PipelineConfig};
pub use detection::{BoundingBox, Detection, ImageSize, RawDetection};
pub use errors::VisionError;
pub use merge::MergedIngredient;
pub use pipeline::{quantify, PipelineContext, RecipeRanker};
pub use quantity::QuantifiedIngredient;
pub use scoring::{rank_recipes, IngredientMatcher, MatcherKind, RankedRecipe};
