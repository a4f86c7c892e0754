//! # LLM Recipe Recommendation Module
//!
//! An LLM can suggest recipes beyond the static catalog. Its output is free-form
//! text that is expected to contain a JSON array of recipe objects; this module
//! coerces that text into the same [`RankedRecipe`] shape the catalog scorer
//! produces, so callers never see a different contract.
//!
//! The HTTP client targets an Ollama-style `/api/generate` endpoint. It is the
//! only async code in the crate and it is never called from inside the
//! pipeline: callers resolve the response first and hand it to [`LlmRanker`].
//!
//! ## Failure handling
//!
//! - Requests time out after `operation_timeout_secs`
//! - Failed requests are retried with exponential backoff plus random jitter
//! - Repeated failures open a [`CircuitBreaker`] so later calls fail fast
//! - Unparseable output is an error, which makes the orchestrator fall back to
//!   the catalog scorer

use std::time::Duration;

use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::Recipe;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::{LlmConfig, RecoveryConfig};
use crate::errors::VisionError;
use crate::pipeline::RecipeRanker;
use crate::scoring::{
    normalize_ingredient_set, sort_and_truncate, IngredientMatcher, RankedRecipe, RankingOptions,
    RecipeSource,
};

lazy_static! {
    // Outermost JSON array, the model often wraps it in prose or code fences
    static ref JSON_ARRAY_REGEX: Regex =
        Regex::new(r"(?s)\[.*\]").expect("JSON array pattern should be valid");
    static ref LEADING_NUMBER_REGEX: Regex =
        Regex::new(r"^\s*(\d+)").expect("Leading number pattern should be valid");
}

const DEFAULT_DRAFT_PREP_TIME: u32 = 30;
const DEFAULT_DRAFT_SERVINGS: u32 = 4;

/// Extract the outermost JSON array from free-form text
pub fn extract_json_array(output: &str) -> Option<&str> {
    JSON_ARRAY_REGEX.find(output).map(|m| m.as_str())
}

/// One recipe suggested by the LLM, read leniently
#[derive(Debug, Clone, PartialEq)]
struct LlmRecipeDraft {
    name: String,
    description: String,
    difficulty: String,
    prep_time_mins: u32,
    servings: u32,
    ingredients: Vec<String>,
    additional_items: Vec<String>,
}

impl LlmRecipeDraft {
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::trim);

        Some(Self {
            name: text("name")
                .filter(|s| !s.is_empty())
                .unwrap_or("Unknown Recipe")
                .to_string(),
            description: text("description").unwrap_or_default().to_string(),
            difficulty: text("difficulty").unwrap_or("medium").to_lowercase(),
            prep_time_mins: lenient_u32(object.get("prep_time_mins"))
                .unwrap_or(DEFAULT_DRAFT_PREP_TIME),
            servings: lenient_u32(object.get("servings")).unwrap_or(DEFAULT_DRAFT_SERVINGS),
            ingredients: string_list(object.get("ingredients")),
            additional_items: string_list(object.get("additional_items")),
        })
    }
}

/// Accept `30`, `30.0` and `"30 minutes"`
fn lenient_u32(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => LEADING_NUMBER_REGEX
            .captures(s)
            .and_then(|caps| caps[1].parse().ok()),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn coerce_draft(
    index: usize,
    draft: LlmRecipeDraft,
    available: &[String],
    matcher: &dyn IngredientMatcher,
) -> Option<RankedRecipe> {
    let draft_ingredients = normalize_ingredient_set(&draft.ingredients);

    let (matched, mut missing): (Vec<String>, Vec<String>) = if draft_ingredients.is_empty() {
        (available.to_vec(), Vec::new())
    } else {
        draft_ingredients
            .into_iter()
            .partition(|ing| available.iter().any(|have| matcher.matches(have, ing)))
    };

    for item in normalize_ingredient_set(&draft.additional_items) {
        if !matched.contains(&item) && !missing.contains(&item) {
            missing.push(item);
        }
    }

    if matched.is_empty() && missing.is_empty() {
        return None;
    }

    let recipe = Recipe::new(index as i64 + 1, &draft.name, &[])
        .with_description(&draft.description)
        .with_difficulty(&draft.difficulty)
        .with_prep_time(draft.prep_time_mins)
        .with_servings(draft.servings);

    Some(RankedRecipe::from_breakdown(
        &recipe,
        matched,
        missing,
        RecipeSource::Llm,
    ))
}

/// Coerce LLM output into ranked recipes
///
/// Recipes are numbered 1..n in output order, scored against the available
/// ingredients with `matcher`, filtered by `min_match` and ranked like catalog
/// recipes.
///
/// # Errors
///
/// Returns [`VisionError::LlmResponse`] when the output holds no JSON array,
/// the array does not parse, or no usable recipe remains.
pub fn parse_llm_recipes<S: AsRef<str>>(
    output: &str,
    available: &[S],
    options: &RankingOptions,
    matcher: &dyn IngredientMatcher,
) -> Result<Vec<RankedRecipe>, VisionError> {
    let available = normalize_ingredient_set(available);
    if available.is_empty() || options.top_k == 0 {
        return Ok(Vec::new());
    }

    let json = extract_json_array(output)
        .ok_or_else(|| VisionError::LlmResponse("no JSON array in LLM output".to_string()))?;
    let values: Vec<Value> = serde_json::from_str(json)
        .map_err(|e| VisionError::LlmResponse(format!("invalid JSON from LLM: {e}")))?;

    let min_match = options.effective_min_match();
    let ranked: Vec<RankedRecipe> = values
        .iter()
        .filter_map(LlmRecipeDraft::from_value)
        .enumerate()
        .filter_map(|(index, draft)| coerce_draft(index, draft, &available, matcher))
        .filter(|recipe| recipe.match_count() >= min_match)
        .collect();

    if ranked.is_empty() {
        return Err(VisionError::LlmResponse(
            "LLM output contained no usable recipes".to_string(),
        ));
    }

    debug!(count = ranked.len(), "Coerced LLM recipes");
    Ok(sort_and_truncate(ranked, options.top_k))
}

/// Prompt asking for recipes as a JSON array
pub fn build_recipe_prompt<S: AsRef<str>>(ingredients: &[S], count: usize) -> String {
    let names = normalize_ingredient_set(ingredients).join(", ");
    format!(
        "Suggest {count} recipes using these ingredients: {names}.\n\
         Respond only with a JSON array. Each element must have the fields \
         \"name\", \"description\", \"difficulty\" (easy, medium or hard), \
         \"prep_time_mins\", \"servings\", \"ingredients\" (the listed ingredients used) \
         and \"additional_items\" (anything else needed)."
    )
}

/// Ranker over an already-resolved LLM response
#[derive(Debug, Clone)]
pub struct LlmRanker {
    response: Result<String, VisionError>,
}

impl LlmRanker {
    /// Wrap the outcome of an LLM call, successful or not
    pub fn new(response: Result<String, VisionError>) -> Self {
        Self { response }
    }

    pub fn from_output(output: &str) -> Self {
        Self::new(Ok(output.to_string()))
    }
}

impl RecipeRanker for LlmRanker {
    fn source(&self) -> RecipeSource {
        RecipeSource::Llm
    }

    fn rank(
        &self,
        ingredients: &[String],
        options: &RankingOptions,
        matcher: &dyn IngredientMatcher,
    ) -> Result<Vec<RankedRecipe>, VisionError> {
        match &self.response {
            Ok(output) => parse_llm_recipes(output, ingredients, options, matcher),
            Err(e) => Err(e.clone()),
        }
    }
}

/// Exponential backoff with up to 25% random jitter, capped at the maximum delay
pub fn calculate_retry_delay(attempt: u32, recovery: &RecoveryConfig) -> Duration {
    let exponential = recovery
        .base_retry_delay_ms
        .saturating_mul(1u64 << attempt.min(16));
    let capped = exponential.min(recovery.max_retry_delay_ms);
    let jitter = if capped >= 4 {
        rand::thread_rng().gen_range(0..=capped / 4)
    } else {
        0
    };
    Duration::from_millis(capped.saturating_add(jitter).min(recovery.max_retry_delay_ms))
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Async client for an Ollama `/api/generate` endpoint
#[derive(Debug)]
pub struct OllamaClient {
    http: reqwest::Client,
    config: LlmConfig,
    circuit_breaker: CircuitBreaker,
}

impl OllamaClient {
    pub fn new(config: LlmConfig) -> Result<Self, VisionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.recovery.operation_timeout_secs))
            .build()?;
        let circuit_breaker = CircuitBreaker::new(config.recovery.clone());
        Ok(Self {
            http,
            config,
            circuit_breaker,
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Whether the endpoint answers its model listing
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.config.host);
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "LLM endpoint not reachable");
                false
            }
        }
    }

    /// Run a prompt through the model with retries and circuit breaking
    pub async fn generate(&self, prompt: &str) -> Result<String, VisionError> {
        if self.circuit_breaker.is_open() {
            warn!("LLM circuit breaker is open, skipping request");
            return Err(VisionError::CircuitOpen(
                "too many recent LLM failures".to_string(),
            ));
        }

        let max_retries = self.config.recovery.max_retries;
        let mut attempt = 0;
        loop {
            match self.send_generate(prompt).await {
                Ok(text) => {
                    self.circuit_breaker.record_success();
                    info!(attempt, chars = text.len(), "LLM generation succeeded");
                    return Ok(text);
                }
                Err(e) => {
                    self.circuit_breaker.record_failure();
                    if attempt >= max_retries || self.circuit_breaker.is_open() {
                        warn!(attempt, error = %e, "LLM generation failed, giving up");
                        return Err(e);
                    }
                    let delay = calculate_retry_delay(attempt, &self.config.recovery);
                    warn!(
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "LLM generation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Ask the model for `count` recipes using the given ingredients
    pub async fn generate_recipes<S: AsRef<str>>(
        &self,
        ingredients: &[S],
        count: usize,
    ) -> Result<String, VisionError> {
        let prompt = build_recipe_prompt(ingredients, count);
        self.generate(&prompt).await
    }

    async fn send_generate(&self, prompt: &str) -> Result<String, VisionError> {
        let url = format!("{}/api/generate", self.config.host);
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
        };

        let response = self.http.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VisionError::LlmRequest(format!("{url} returned {status}")));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| VisionError::LlmResponse(format!("unexpected response body: {e}")))?;
        Ok(body.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{ExactMatcher, PluralInsensitiveMatcher};

    fn available() -> Vec<String> {
        vec!["tomato".to_string(), "pasta".to_string(), "garlic".to_string()]
    }

    #[test]
    fn test_extract_json_array_from_prose() {
        let output = "Sure! Here you go:\n```json\n[{\"name\": \"A\"}]\n```\nEnjoy.";
        assert_eq!(extract_json_array(output), Some("[{\"name\": \"A\"}]"));
        assert_eq!(extract_json_array("no json here"), None);
    }

    #[test]
    fn test_parse_matches_against_available() {
        let output = r#"Here are recipes:
        [
          {
            "name": "Garlic Pasta",
            "ingredients": ["pasta", "garlic"],
            "additional_items": ["parmesan"],
            "prep_time_mins": "20 minutes",
            "difficulty": "Easy"
          },
          {"name": "Tomato Soup", "ingredients": ["Tomato", "onion", "cream", "basil"]}
        ]"#;
        let ranked =
            parse_llm_recipes(output, &available(), &RankingOptions::default(), &ExactMatcher)
                .unwrap();

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].name, "Garlic Pasta");
        assert_eq!(ranked[0].recipe_id, 1);
        assert_eq!(ranked[0].matched_ingredients, vec!["pasta", "garlic"]);
        assert_eq!(ranked[0].missing_ingredients, vec!["parmesan"]);
        assert_eq!(ranked[0].prep_time_mins, 20);
        assert_eq!(ranked[0].difficulty, "easy");
        assert_eq!(ranked[0].source, RecipeSource::Llm);

        assert_eq!(ranked[1].recipe_id, 2);
        assert_eq!(ranked[1].match_percentage, 25.0);
        assert_eq!(ranked[1].servings, DEFAULT_DRAFT_SERVINGS);
    }

    #[test]
    fn test_parse_without_ingredient_list_uses_available() {
        let output = r#"[{"name": "Bruschetta", "additional_items": ["bread"]}]"#;
        let ranked =
            parse_llm_recipes(output, &available(), &RankingOptions::default(), &ExactMatcher)
                .unwrap();
        assert_eq!(ranked[0].matched_ingredients, available());
        assert_eq!(ranked[0].missing_ingredients, vec!["bread"]);
        assert_eq!(ranked[0].match_percentage, 75.0);
    }

    #[test]
    fn test_parse_errors() {
        let options = RankingOptions::default();
        assert!(matches!(
            parse_llm_recipes("I cannot help with that", &available(), &options, &ExactMatcher),
            Err(VisionError::LlmResponse(_))
        ));
        assert!(matches!(
            parse_llm_recipes("[{name: broken}]", &available(), &options, &ExactMatcher),
            Err(VisionError::LlmResponse(_))
        ));
        assert!(matches!(
            parse_llm_recipes("[]", &available(), &options, &ExactMatcher),
            Err(VisionError::LlmResponse(_))
        ));
        // Nothing the user has is used
        let steak = r#"[{"name": "Steak", "ingredients": ["beef"]}]"#;
        assert!(matches!(
            parse_llm_recipes(steak, &available(), &options, &ExactMatcher),
            Err(VisionError::LlmResponse(_))
        ));
    }

    #[test]
    fn test_parse_uses_matcher() {
        let output = r#"[{"name": "Tomato Pasta", "ingredients": ["tomatoes", "pasta"]}]"#;
        let options = RankingOptions::default();

        let exact = parse_llm_recipes(output, &available(), &options, &ExactMatcher).unwrap();
        assert_eq!(exact[0].matched_ingredients, vec!["pasta"]);
        assert_eq!(exact[0].missing_ingredients, vec!["tomatoes"]);

        let plural =
            parse_llm_recipes(output, &available(), &options, &PluralInsensitiveMatcher).unwrap();
        assert_eq!(plural[0].matched_ingredients, vec!["tomatoes", "pasta"]);
        assert!(plural[0].missing_ingredients.is_empty());
        assert_eq!(plural[0].match_percentage, 100.0);
    }

    #[test]
    fn test_parse_empty_query_is_empty_result() {
        let empty: Vec<String> = Vec::new();
        let ranked =
            parse_llm_recipes("garbage", &empty, &RankingOptions::default(), &ExactMatcher)
                .unwrap();
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_lenient_numbers() {
        assert_eq!(lenient_u32(Some(&Value::from(15))), Some(15));
        assert_eq!(lenient_u32(Some(&Value::from(12.6))), Some(13));
        assert_eq!(lenient_u32(Some(&Value::from("45 min"))), Some(45));
        assert_eq!(lenient_u32(Some(&Value::from("about an hour"))), None);
        assert_eq!(lenient_u32(Some(&Value::from(-3))), None);
        assert_eq!(lenient_u32(None), None);
    }

    #[test]
    fn test_llm_ranker_propagates_call_error() {
        let ranker = LlmRanker::new(Err(VisionError::LlmRequest("timeout".to_string())));
        let result = ranker.rank(&available(), &RankingOptions::default(), &ExactMatcher);
        assert_eq!(result, Err(VisionError::LlmRequest("timeout".to_string())));
    }

    #[test]
    fn test_retry_delay_is_bounded() {
        let recovery = RecoveryConfig {
            base_retry_delay_ms: 100,
            max_retry_delay_ms: 1000,
            ..Default::default()
        };
        for attempt in 0..40 {
            let delay = calculate_retry_delay(attempt, &recovery);
            assert!(delay <= Duration::from_millis(1000));
            assert!(delay >= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_prompt_lists_normalized_ingredients() {
        let prompt = build_recipe_prompt(&["Tomato ", "tomato", "Basil"], 3);
        assert!(prompt.contains("Suggest 3 recipes"));
        assert!(prompt.contains("tomato, basil"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_opens_circuit() {
        let config = LlmConfig {
            enabled: true,
            host: "http://127.0.0.1:9".to_string(),
            model: "test".to_string(),
            recovery: RecoveryConfig {
                max_retries: 0,
                operation_timeout_secs: 2,
                circuit_breaker_threshold: 1,
                ..Default::default()
            },
        };
        let client = OllamaClient::new(config).unwrap();

        let first = client.generate("hello").await;
        assert!(matches!(first, Err(VisionError::LlmRequest(_))));

        let second = client.generate("hello").await;
        assert!(matches!(second, Err(VisionError::CircuitOpen(_))));
    }
}
