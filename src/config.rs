//! # Configuration Module
//!
//! This module defines configuration structures for the ingredient pipeline,
//! the LLM recommendation client and the surrounding application, including
//! thresholds, recovery settings and feature flags.
//!
//! Every structure has a `Default` matching the service defaults. Values read
//! from the environment are validated before any processing begins; invalid
//! values are reported as [`VisionError::Configuration`].

use std::path::PathBuf;

use crate::errors::VisionError;
use crate::quantity::{SizeThresholds, UnitTable};
use crate::scoring::{MatcherKind, RankingOptions};

// Constants for pipeline configuration
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_IOU_MERGE_THRESHOLD: f32 = 0.45;
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "mistral";

/// Reject values outside [0, 1], including NaN
pub fn validate_unit_interval(name: &str, value: f32) -> Result<(), VisionError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(VisionError::Configuration(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

/// Thresholds and policy tables used by the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Detections scoring below this are dropped
    pub confidence_threshold: f32,
    /// IoU above which two detections of a class are the same instance
    pub iou_merge_threshold: f32,
    /// Area-fraction thresholds for size buckets
    pub size_thresholds: SizeThresholds,
    /// Class name to unit lookup
    pub units: UnitTable,
    /// Recipe ranking options
    pub ranking: RankingOptions,
    /// How available ingredient names are compared with recipe ingredients
    pub matcher: MatcherKind,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_merge_threshold: DEFAULT_IOU_MERGE_THRESHOLD,
            size_thresholds: SizeThresholds::default(),
            units: UnitTable::default(),
            ranking: RankingOptions::default(),
            matcher: MatcherKind::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), VisionError> {
        validate_unit_interval("confidence_threshold", self.confidence_threshold)?;
        validate_unit_interval("iou_merge_threshold", self.iou_merge_threshold)?;
        if !self.size_thresholds.is_valid() {
            return Err(VisionError::Configuration(format!(
                "size thresholds must be strictly increasing within (0, 1]: {:?}",
                self.size_thresholds
            )));
        }
        Ok(())
    }
}

/// Recovery configuration for calls to the LLM endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Timeout for a single request in seconds
    pub operation_timeout_secs: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_retry_delay_ms: 500,
            max_retry_delay_ms: 5000,
            operation_timeout_secs: 60, // local models are slow
            circuit_breaker_threshold: 3,
            circuit_breaker_reset_secs: 60,
        }
    }
}

/// Configuration for the Ollama recipe generation endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub enabled: bool,
    /// Base URL, e.g. `http://localhost:11434`
    pub host: String,
    pub model: String,
    pub recovery: RecoveryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: DEFAULT_OLLAMA_HOST.to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            recovery: RecoveryConfig::default(),
        }
    }
}

/// Optional stages of the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    pub enable_ocr: bool,
    pub enable_recipe_recommendations: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_ocr: true,
            enable_recipe_recommendations: true,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub llm: LlmConfig,
    pub features: FeatureFlags,
    /// JSON recipe file; built-in recipes are used when unset
    pub recipes_file: Option<PathBuf>,
}

impl AppConfig {
    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self, VisionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    ///
    /// Unset keys keep their defaults. The resulting pipeline configuration is
    /// validated before it is returned.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, VisionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        if let Some(value) = lookup("CONF_THRESHOLD") {
            config.pipeline.confidence_threshold = parse_float("CONF_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("IOU_THRESHOLD") {
            config.pipeline.iou_merge_threshold = parse_float("IOU_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("DEFAULT_TOP_K") {
            config.pipeline.ranking.top_k = parse_count("DEFAULT_TOP_K", &value)? as usize;
        }
        if let Some(value) = lookup("MIN_MATCH") {
            config.pipeline.ranking.min_match = parse_count("MIN_MATCH", &value)? as usize;
        }
        if let Some(value) = lookup("INGREDIENT_MATCHER") {
            config.pipeline.matcher = MatcherKind::parse(&value).ok_or_else(|| {
                VisionError::Configuration(format!(
                    "INGREDIENT_MATCHER must be exact, plural, synonym or similarity, got '{value}'"
                ))
            })?;
        }
        if let Some(value) = lookup("RECIPES_FILE") {
            if !value.trim().is_empty() {
                config.recipes_file = Some(PathBuf::from(value.trim()));
            }
        }

        if let Some(value) = lookup("ENABLE_OCR") {
            config.features.enable_ocr = parse_flag(&value);
        }
        if let Some(value) = lookup("ENABLE_RECIPE_RECOMMENDATIONS") {
            config.features.enable_recipe_recommendations = parse_flag(&value);
        }

        if let Some(value) = lookup("ENABLE_LLM") {
            config.llm.enabled = parse_flag(&value);
        }
        if let Some(value) = lookup("OLLAMA_HOST") {
            config.llm.host = value.trim().trim_end_matches('/').to_string();
        }
        if let Some(value) = lookup("OLLAMA_MODEL") {
            config.llm.model = value.trim().to_string();
        }
        if let Some(value) = lookup("LLM_TIMEOUT_SECS") {
            config.llm.recovery.operation_timeout_secs = parse_count("LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("LLM_MAX_RETRIES") {
            config.llm.recovery.max_retries = parse_count("LLM_MAX_RETRIES", &value)? as u32;
        }

        config.pipeline.validate()?;
        Ok(config)
    }
}

fn parse_float(key: &str, value: &str) -> Result<f32, VisionError> {
    value.trim().parse::<f32>().map_err(|e| {
        VisionError::Configuration(format!("{key} must be a number, got '{value}': {e}"))
    })
}

/// Parse a non-negative integer, rejecting negative values explicitly
fn parse_count(key: &str, value: &str) -> Result<u64, VisionError> {
    let parsed = value.trim().parse::<i64>().map_err(|e| {
        VisionError::Configuration(format!("{key} must be an integer, got '{value}': {e}"))
    })?;
    u64::try_from(parsed).map_err(|_| {
        VisionError::Configuration(format!("{key} must not be negative, got {parsed}"))
    })
}

fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.confidence_threshold, 0.5);
        assert_eq!(config.iou_merge_threshold, 0.45);
        assert_eq!(config.ranking.top_k, 5);
        assert_eq!(config.ranking.min_match, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_recovery_config_defaults() {
        let recovery = RecoveryConfig::default();
        assert_eq!(recovery.max_retries, 2);
        assert_eq!(recovery.circuit_breaker_threshold, 3);
        assert!(recovery.base_retry_delay_ms <= recovery.max_retry_delay_ms);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let config = PipelineConfig {
            confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().is_configuration());

        let config = PipelineConfig {
            iou_merge_threshold: f32::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("CONF_THRESHOLD", "0.3"),
            ("DEFAULT_TOP_K", "3"),
            ("ENABLE_LLM", "TRUE"),
            ("OLLAMA_HOST", "http://ollama:11434/"),
            ("RECIPES_FILE", "data/recipes.json"),
        ]))
        .unwrap();

        assert_eq!(config.pipeline.confidence_threshold, 0.3);
        assert_eq!(config.pipeline.ranking.top_k, 3);
        assert!(config.llm.enabled);
        assert_eq!(config.llm.host, "http://ollama:11434");
        assert_eq!(config.recipes_file, Some(PathBuf::from("data/recipes.json")));
    }

    #[test]
    fn test_from_lookup_defaults_when_unset() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_negative_top_k_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[("DEFAULT_TOP_K", "-1")])).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("negative"));
    }

    #[test]
    fn test_ingredient_matcher_from_lookup() {
        let config =
            AppConfig::from_lookup(lookup_from(&[("INGREDIENT_MATCHER", "Similarity")])).unwrap();
        assert_eq!(config.pipeline.matcher, MatcherKind::Similarity);

        let err =
            AppConfig::from_lookup(lookup_from(&[("INGREDIENT_MATCHER", "fuzzy")])).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_out_of_range_confidence_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[("CONF_THRESHOLD", "2")])).unwrap_err();
        assert!(err.is_configuration());
        let err = AppConfig::from_lookup(lookup_from(&[("IOU_THRESHOLD", "abc")])).unwrap_err();
        assert!(err.is_configuration());
    }
}
