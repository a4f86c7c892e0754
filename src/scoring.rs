//! # Recipe Scorer Module
//!
//! Scores every recipe of a catalog snapshot against a set of available
//! ingredient names and returns the best matches.
//!
//! ## Matching
//!
//! Names are trimmed, lowercased and whitespace-collapsed on both sides before
//! comparison. The comparison itself goes through an [`IngredientMatcher`], the
//! extension point for fuzzy matching. [`ExactMatcher`] is the default; the
//! plural, synonym and similarity matchers trade precision for recall.
//!
//! ## Ranking
//!
//! Recipes are sorted by descending score, then descending match percentage,
//! then ascending id. Truncation to `top_k` happens only after sorting.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;

use crate::catalog::Recipe;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_MIN_MATCH: usize = 1;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

lazy_static! {
    // "2 cups", "1/2 tsp", "250g", "3x"
    static ref QUANTITY_PREFIX_REGEX: Regex = Regex::new(
        r"^\d+(?:[./]\d+)?\s*(?:(?:cups?|tbsp|tsp|ml|l|oz|lbs?|g|kg|x)\b\.?)?\s*"
    )
    .expect("Quantity prefix pattern should be valid");
}

/// Words dropped before synonym lookup
const FILLER_WORDS: &[&str] = &[
    "of", "the", "a", "and", "or", "finely", "chopped", "diced", "sliced", "grated", "minced",
    "whole", "fresh", "dried", "ground", "powder",
];

/// Kitchen synonyms, canonical name first
const KITCHEN_SYNONYMS: &[(&str, &[&str])] = &[
    ("tomato", &["tomatoes", "cherry tomato", "roma tomato", "beefsteak tomato"]),
    ("carrot", &["carrots", "grated carrot"]),
    ("potato", &["potatoes", "mashed potato"]),
    ("onion", &["onions", "red onion", "yellow onion", "white onion"]),
    ("garlic", &["garlic cloves", "minced garlic", "garlic powder"]),
    ("egg", &["eggs", "egg yolk", "egg white"]),
    ("milk", &["whole milk", "skim milk", "evaporated milk"]),
    ("cheese", &["cheddar", "mozzarella", "parmesan", "cream cheese", "feta"]),
    ("chicken", &["chicken breast", "chicken thigh", "ground chicken"]),
    ("meat", &["beef", "pork", "lamb", "ground meat"]),
    ("bread", &["white bread", "wheat bread", "whole grain bread"]),
    ("butter", &["unsalted butter", "salted butter"]),
    ("flour", &["all-purpose flour", "wheat flour", "rice flour"]),
    ("green beans", &["string beans", "snap beans"]),
    ("cucumber", &["cucumbers", "english cucumber"]),
    ("mushroom", &["mushrooms", "button mushroom", "cremini"]),
    ("lemon", &["lemons", "lemon juice", "lemon zest"]),
    ("corn", &["sweet corn", "corn kernels"]),
    ("fresh cream", &["heavy cream", "whipped cream", "sour cream"]),
];

/// Options controlling which ranked recipes are returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingOptions {
    /// Maximum number of recipes returned
    pub top_k: usize,
    /// Minimum number of matched ingredients, never lower than 1
    pub min_match: usize,
}

impl Default for RankingOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_match: DEFAULT_MIN_MATCH,
        }
    }
}

impl RankingOptions {
    pub fn new(top_k: usize, min_match: usize) -> Self {
        Self { top_k, min_match }
    }

    /// A recipe sharing no ingredient with the query is never shown
    pub fn effective_min_match(&self) -> usize {
        self.min_match.max(1)
    }
}

/// Comparator deciding whether an available ingredient satisfies a required one
///
/// Both arguments are already normalized with [`normalize_ingredient_name`].
pub trait IngredientMatcher: Send + Sync {
    fn matches(&self, available: &str, required: &str) -> bool;
}

/// Exact equality after normalization
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatcher;

impl IngredientMatcher for ExactMatcher {
    fn matches(&self, available: &str, required: &str) -> bool {
        available == required
    }
}

/// Treats simple English plurals ("tomatoes", "eggs") as their singular form
#[derive(Debug, Clone, Copy, Default)]
pub struct PluralInsensitiveMatcher;

impl PluralInsensitiveMatcher {
    fn singular(word: &str) -> &str {
        if let Some(stem) = word.strip_suffix("oes") {
            if !stem.is_empty() {
                return &word[..word.len() - 2];
            }
        }
        match word.strip_suffix('s') {
            Some(stem) if !stem.is_empty() && !stem.ends_with('s') => stem,
            _ => word,
        }
    }
}

impl IngredientMatcher for PluralInsensitiveMatcher {
    fn matches(&self, available: &str, required: &str) -> bool {
        available == required || Self::singular(available) == Self::singular(required)
    }
}

/// Maps cleaned ingredient phrases to a canonical name
///
/// Both sides are cleaned with [`clean_ingredient_name`] and looked up in the
/// synonym table, so "2 cups grated carrot" and "carrots" both become "carrot".
/// The default table covers common kitchen variants.
#[derive(Debug, Clone, Default)]
pub struct SynonymMatcher {
    canonical: HashMap<String, String>,
}

impl SynonymMatcher {
    /// A matcher with no synonyms, comparing cleaned names only
    pub fn empty() -> Self {
        Self::default()
    }

    /// A matcher preloaded with the kitchen synonym table
    pub fn kitchen() -> Self {
        KITCHEN_SYNONYMS
            .iter()
            .fold(Self::empty(), |matcher, &(canonical, variants)| {
                matcher.with_synonyms(canonical, variants)
            })
    }

    /// Map every variant to `canonical`; later entries override earlier ones
    pub fn with_synonyms<S: AsRef<str>>(mut self, canonical: &str, variants: &[S]) -> Self {
        let target = clean_ingredient_name(canonical);
        for variant in variants {
            let key = clean_ingredient_name(variant.as_ref());
            if !key.is_empty() && key != target {
                self.canonical.insert(key, target.clone());
            }
        }
        self
    }

    /// Canonical form of an ingredient phrase
    pub fn canonicalize(&self, name: &str) -> String {
        let cleaned = clean_ingredient_name(name);
        match self.canonical.get(&cleaned) {
            Some(canonical) => canonical.clone(),
            None => cleaned,
        }
    }
}

impl IngredientMatcher for SynonymMatcher {
    fn matches(&self, available: &str, required: &str) -> bool {
        available == required || self.canonicalize(available) == self.canonicalize(required)
    }
}

/// Matches names whose normalized Levenshtein similarity exceeds a threshold
///
/// At the default 0.7, "tomatoes" matches "tomato" (0.75) while "onion" does
/// not match "lemon". Short names that differ in one letter ("rice", "mice")
/// also match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityMatcher {
    threshold: f64,
}

impl SimilarityMatcher {
    /// A non-finite threshold falls back to the default; others are clamped to [0, 1]
    pub fn new(threshold: f64) -> Self {
        let threshold = if threshold.is_finite() {
            threshold.clamp(0.0, 1.0)
        } else {
            DEFAULT_SIMILARITY_THRESHOLD
        };
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for SimilarityMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl IngredientMatcher for SimilarityMatcher {
    fn matches(&self, available: &str, required: &str) -> bool {
        available == required || normalized_levenshtein(available, required) > self.threshold
    }
}

/// Selectable ingredient matching strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
    #[default]
    Exact,
    Plural,
    Synonym,
    Similarity,
}

impl MatcherKind {
    /// Parse a matcher name, case-insensitively
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "exact" => Some(Self::Exact),
            "plural" => Some(Self::Plural),
            "synonym" => Some(Self::Synonym),
            "similarity" => Some(Self::Similarity),
            _ => None,
        }
    }

    pub fn build(self) -> Arc<dyn IngredientMatcher> {
        match self {
            Self::Exact => Arc::new(ExactMatcher),
            Self::Plural => Arc::new(PluralInsensitiveMatcher),
            Self::Synonym => Arc::new(SynonymMatcher::kitchen()),
            Self::Similarity => Arc::new(SimilarityMatcher::default()),
        }
    }
}

/// Strip a leading quantity, filler words and one-letter words
///
/// Falls back to the normalized name when nothing would remain.
pub fn clean_ingredient_name(name: &str) -> String {
    let normalized = normalize_ingredient_name(name);
    let cleaned = QUANTITY_PREFIX_REGEX
        .replace(&normalized, "")
        .split_whitespace()
        .filter(|word| word.chars().count() > 1 && !FILLER_WORDS.contains(word))
        .collect::<Vec<&str>>()
        .join(" ");
    if cleaned.is_empty() {
        normalized
    } else {
        cleaned
    }
}

/// Trim, lowercase and collapse internal whitespace
pub fn normalize_ingredient_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .to_lowercase()
}

/// Normalize a list of names into a deduplicated, order-preserving set
pub fn normalize_ingredient_set<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let name = normalize_ingredient_name(name.as_ref());
        if !name.is_empty() && !normalized.contains(&name) {
            normalized.push(name);
        }
    }
    normalized
}

/// Where a ranked recipe came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeSource {
    Catalog,
    Llm,
}

/// A recipe joined with its scoring output for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRecipe {
    pub recipe_id: i64,
    pub name: String,
    pub description: String,
    pub difficulty: String,
    pub prep_time_mins: u32,
    pub servings: u32,
    pub matched_ingredients: Vec<String>,
    pub missing_ingredients: Vec<String>,
    /// Share of the recipe's own ingredients that were matched, 0 to 100
    pub match_percentage: f64,
    /// Ranking key
    pub score: f64,
    pub source: RecipeSource,
}

impl RankedRecipe {
    /// Build a ranked entry from a matched/missing breakdown
    pub fn from_breakdown(
        recipe: &Recipe,
        matched_ingredients: Vec<String>,
        missing_ingredients: Vec<String>,
        source: RecipeSource,
    ) -> Self {
        let matched = matched_ingredients.len();
        let missing = missing_ingredients.len();
        let match_percentage = match_percentage(matched, matched + missing);
        Self {
            recipe_id: recipe.id,
            name: recipe.name.clone(),
            description: recipe.description.clone(),
            difficulty: recipe.difficulty.clone(),
            prep_time_mins: recipe.prep_time_mins,
            servings: recipe.servings,
            score: compute_score(match_percentage, matched, missing),
            matched_ingredients,
            missing_ingredients,
            match_percentage,
            source,
        }
    }

    pub fn match_count(&self) -> usize {
        self.matched_ingredients.len()
    }
}

/// `100 * matched / total`, 0 when the recipe declares no ingredients
pub fn match_percentage(matched: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * matched as f64 / total as f64
    }
}

/// Blend of match breadth and match completeness
///
/// Since `matched + missing` is the recipe's ingredient count, both halves
/// are equal and the score equals `match_percentage`.
pub fn compute_score(match_percentage: f64, matched: usize, missing: usize) -> f64 {
    let completeness = 100.0 * matched as f64 / (matched + missing).max(1) as f64;
    0.5 * match_percentage + 0.5 * completeness
}

/// Score one recipe, `None` when it declares no ingredients
pub fn score_recipe(
    recipe: &Recipe,
    available: &[String],
    matcher: &dyn IngredientMatcher,
) -> Option<RankedRecipe> {
    let required = normalize_ingredient_set(&recipe.ingredients);
    if required.is_empty() {
        debug!("Recipe {} declares no ingredients, skipping", recipe.id);
        return None;
    }

    let (matched, missing): (Vec<String>, Vec<String>) = required
        .into_iter()
        .partition(|req| available.iter().any(|a| matcher.matches(a, req)));

    Some(RankedRecipe::from_breakdown(
        recipe,
        matched,
        missing,
        RecipeSource::Catalog,
    ))
}

/// Ranking order: score desc, match percentage desc, id asc
pub fn ranking_order(a: &RankedRecipe, b: &RankedRecipe) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.match_percentage.total_cmp(&a.match_percentage))
        .then_with(|| a.recipe_id.cmp(&b.recipe_id))
}

/// Sort into ranking order, then keep the first `top_k`
pub fn sort_and_truncate(mut ranked: Vec<RankedRecipe>, top_k: usize) -> Vec<RankedRecipe> {
    ranked.sort_by(ranking_order);
    ranked.truncate(top_k);
    ranked
}

/// Rank a recipe collection against ingredient names with the default matcher
///
/// # Examples
///
/// ```rust
/// use fridge_vision::catalog::Recipe;
/// use fridge_vision::scoring::rank_recipes;
///
/// let catalog = vec![Recipe::new(
///     3,
///     "Tomato Pasta",
///     &["tomato", "pasta", "garlic", "onion", "oil"],
/// )];
/// let ranked = rank_recipes(&["Tomato", "pasta", "garlic "], &catalog, 5, 1);
///
/// assert_eq!(ranked.len(), 1);
/// assert_eq!(ranked[0].matched_ingredients, vec!["tomato", "pasta", "garlic"]);
/// assert_eq!(ranked[0].missing_ingredients, vec!["onion", "oil"]);
/// assert_eq!(ranked[0].match_percentage, 60.0);
/// ```
pub fn rank_recipes<S: AsRef<str>>(
    ingredient_names: &[S],
    recipe_catalog: &[Recipe],
    top_k: usize,
    min_match: usize,
) -> Vec<RankedRecipe> {
    rank_recipes_with(
        ingredient_names,
        recipe_catalog,
        &RankingOptions::new(top_k, min_match),
        &ExactMatcher,
    )
}

/// Rank a recipe collection with explicit options and matcher
pub fn rank_recipes_with<S: AsRef<str>>(
    ingredient_names: &[S],
    recipe_catalog: &[Recipe],
    options: &RankingOptions,
    matcher: &dyn IngredientMatcher,
) -> Vec<RankedRecipe> {
    let available = normalize_ingredient_set(ingredient_names);
    if available.is_empty() || options.top_k == 0 {
        info!(
            "Nothing to rank ({} ingredients, top_k={})",
            available.len(),
            options.top_k
        );
        return Vec::new();
    }

    let min_match = options.effective_min_match();
    let ranked: Vec<RankedRecipe> = recipe_catalog
        .iter()
        .filter_map(|recipe| score_recipe(recipe, &available, matcher))
        .filter(|ranked| ranked.match_count() >= min_match)
        .collect();
    let candidates = ranked.len();

    let ranked = sort_and_truncate(ranked, options.top_k);
    info!(
        "Found {} recipes matching {} ingredients, returning {}",
        candidates,
        available.len(),
        ranked.len()
    );
    ranked
}
