//! # Recipe Catalog Module
//!
//! The catalog is the only long-lived shared state next to the pipeline. It is
//! loaded once at start-up (from a JSON file or the built-in defaults) and read
//! by every scoring request.
//!
//! Readers take an immutable snapshot (`Arc<Vec<Recipe>>`) and score against it.
//! Administrative operations build a new collection and swap the whole snapshot
//! under a writer lock, so an in-flight request sees either the old or the new
//! catalog, never a partial update.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::errors::VisionError;

/// Maximum number of recipes returned by [`RecipeCatalog::list`]
pub const MAX_LIST_LIMIT: usize = 100;

/// A static catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub name: String,
    /// Canonical ingredient names required by the recipe
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default)]
    pub prep_time_mins: u32,
    #[serde(default)]
    pub servings: u32,
    #[serde(default)]
    pub description: String,
}

fn default_difficulty() -> String {
    "unknown".to_string()
}

impl Recipe {
    pub fn new(id: i64, name: &str, ingredients: &[&str]) -> Self {
        Self {
            id,
            name: name.to_string(),
            ingredients: ingredients.iter().map(|s| s.to_string()).collect(),
            difficulty: default_difficulty(),
            prep_time_mins: 0,
            servings: 0,
            description: String::new(),
        }
    }

    pub fn with_difficulty(mut self, difficulty: &str) -> Self {
        self.difficulty = difficulty.to_string();
        self
    }

    pub fn with_prep_time(mut self, prep_time_mins: u32) -> Self {
        self.prep_time_mins = prep_time_mins;
        self
    }

    pub fn with_servings(mut self, servings: u32) -> Self {
        self.servings = servings;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

fn easy(
    id: i64,
    name: &str,
    ingredients: &[&str],
    prep_time_mins: u32,
    servings: u32,
    description: &str,
) -> Recipe {
    Recipe::new(id, name, ingredients)
        .with_difficulty("easy")
        .with_prep_time(prep_time_mins)
        .with_servings(servings)
        .with_description(description)
}

/// Built-in recipes used when no recipe file is configured
pub fn default_recipes() -> Vec<Recipe> {
    vec![
        easy(
            1,
            "Simple Salad",
            &["lettuce", "tomato", "cucumber", "onion"],
            10,
            2,
            "Fresh green salad with vegetables",
        ),
        easy(
            2,
            "Vegetable Stir Fry",
            &["broccoli", "carrot", "onion", "bell pepper", "oil"],
            20,
            3,
            "Quick and healthy stir fry",
        ),
        easy(
            3,
            "Tomato Pasta",
            &["pasta", "tomato", "garlic", "onion", "oil"],
            25,
            4,
            "Classic Italian pasta sauce",
        ),
        easy(
            4,
            "Vegetable Soup",
            &["carrot", "onion", "potato", "tomato", "celery"],
            30,
            4,
            "Hearty vegetable soup",
        ),
        easy(
            5,
            "Fruit Smoothie",
            &["banana", "strawberry", "yogurt", "milk"],
            5,
            2,
            "Refreshing fruit smoothie",
        ),
        easy(
            6,
            "Grilled Vegetables",
            &["bell pepper", "zucchini", "onion", "tomato", "oil"],
            20,
            3,
            "Seasoned grilled vegetables",
        ),
        easy(
            7,
            "Garlic Bread",
            &["bread", "butter", "garlic"],
            15,
            4,
            "Crispy garlic bread",
        ),
        easy(
            8,
            "Avocado Toast",
            &["bread", "avocado", "tomato", "salt", "pepper"],
            5,
            1,
            "Avocado toast breakfast",
        ),
        easy(
            9,
            "Carrot Salad",
            &["carrot", "lettuce", "onion"],
            10,
            2,
            "Crunchy carrot and lettuce salad",
        ),
        easy(
            10,
            "Lemon Rice",
            &["rice", "lemon", "oil", "onion"],
            20,
            3,
            "Fragrant lemon-flavored rice",
        ),
        easy(
            11,
            "Scrambled Eggs",
            &["egg", "butter", "milk", "salt", "pepper"],
            10,
            2,
            "Soft scrambled eggs",
        ),
        easy(
            12,
            "Banana Pancakes",
            &["banana", "egg", "flour", "milk", "butter"],
            20,
            3,
            "Fluffy pancakes with mashed banana",
        ),
        Recipe::new(
            13,
            "Chicken Rice Bowl",
            &["chicken", "rice", "broccoli", "carrot", "soy sauce"],
        )
        .with_difficulty("medium")
        .with_prep_time(35)
        .with_servings(2)
        .with_description("Rice bowl with seared chicken and vegetables"),
        easy(
            14,
            "Caprese Salad",
            &["tomato", "mozzarella", "basil", "oil", "salt"],
            10,
            2,
            "Tomato and mozzarella salad",
        ),
        easy(
            15,
            "Guacamole",
            &["avocado", "lime", "onion", "tomato", "salt"],
            10,
            4,
            "Chunky avocado dip",
        ),
    ]
}

fn check_unique_ids(recipes: &[Recipe]) -> Result<(), VisionError> {
    let mut seen = HashSet::new();
    for recipe in recipes {
        if !seen.insert(recipe.id) {
            return Err(VisionError::CatalogLoad(format!(
                "duplicate recipe id {}",
                recipe.id
            )));
        }
    }
    Ok(())
}

/// Thread-safe recipe catalog with snapshot reads
#[derive(Debug)]
pub struct RecipeCatalog {
    recipes: RwLock<Arc<Vec<Recipe>>>,
}

impl RecipeCatalog {
    /// Create a catalog, rejecting duplicate recipe ids
    pub fn new(recipes: Vec<Recipe>) -> Result<Self, VisionError> {
        check_unique_ids(&recipes)?;
        Ok(Self {
            recipes: RwLock::new(Arc::new(recipes)),
        })
    }

    /// Catalog holding the built-in recipes
    pub fn with_defaults() -> Self {
        Self {
            recipes: RwLock::new(Arc::new(default_recipes())),
        }
    }

    /// Parse a JSON array of recipes
    pub fn from_json_str(json: &str) -> Result<Self, VisionError> {
        let recipes: Vec<Recipe> = serde_json::from_str(json)?;
        Self::new(recipes)
    }

    /// Load recipes from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, VisionError> {
        let content = fs::read_to_string(path).map_err(|e| {
            VisionError::CatalogLoad(format!("cannot read {}: {e}", path.display()))
        })?;
        let catalog = Self::from_json_str(&content)?;
        info!("Loaded {} recipes from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Load recipes from `path` when given and valid, otherwise use the defaults
    pub fn load_or_default(path: Option<&Path>) -> Self {
        if let Some(path) = path {
            if path.exists() {
                match Self::from_file(path) {
                    Ok(catalog) => return catalog,
                    Err(e) => warn!("Could not load recipes from {}: {e}", path.display()),
                }
            } else {
                warn!("Recipe file {} does not exist", path.display());
            }
        }

        let catalog = Self::with_defaults();
        info!("Using {} default recipes", catalog.len());
        catalog
    }

    /// Immutable view of the current catalog
    pub fn snapshot(&self) -> Arc<Vec<Recipe>> {
        let guard = self.recipes.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Look up a recipe by id
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::NotFound`] when no recipe has this id.
    pub fn find(&self, recipe_id: i64) -> Result<Recipe, VisionError> {
        debug!("Looking up recipe {}", recipe_id);
        self.snapshot()
            .iter()
            .find(|r| r.id == recipe_id)
            .cloned()
            .ok_or(VisionError::NotFound(recipe_id))
    }

    /// Case-insensitive substring search on names, then on ingredients
    pub fn search(&self, query: &str) -> Vec<Recipe> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        let results: Vec<Recipe> = self
            .snapshot()
            .iter()
            .filter(|recipe| {
                recipe.name.to_lowercase().contains(&query)
                    || recipe
                        .ingredients
                        .iter()
                        .any(|ing| ing.to_lowercase().contains(&query))
            })
            .cloned()
            .collect();

        info!("Recipe search '{}' returned {} results", query, results.len());
        results
    }

    /// First `limit` recipes in catalog order, `limit` clamped to 1..=100
    pub fn list(&self, limit: usize) -> Vec<Recipe> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        self.snapshot().iter().take(limit).cloned().collect()
    }

    /// Sorted, lowercased set of every ingredient used by the catalog
    pub fn all_ingredients(&self) -> Vec<String> {
        let ingredients: BTreeSet<String> = self
            .snapshot()
            .iter()
            .flat_map(|r| r.ingredients.iter())
            .map(|ing| ing.trim().to_lowercase())
            .filter(|ing| !ing.is_empty())
            .collect();
        ingredients.into_iter().collect()
    }

    /// Add a recipe, rejecting an id that is already present
    pub fn insert(&self, recipe: Recipe) -> Result<(), VisionError> {
        let mut guard = self.recipes.write().unwrap_or_else(|e| e.into_inner());
        if guard.iter().any(|r| r.id == recipe.id) {
            return Err(VisionError::Configuration(format!(
                "recipe id {} already exists",
                recipe.id
            )));
        }

        info!("Adding recipe {} ('{}')", recipe.id, recipe.name);
        let mut next: Vec<Recipe> = (**guard).clone();
        next.push(recipe);
        *guard = Arc::new(next);
        Ok(())
    }

    /// Remove a recipe by id and return it
    pub fn remove(&self, recipe_id: i64) -> Result<Recipe, VisionError> {
        let mut guard = self.recipes.write().unwrap_or_else(|e| e.into_inner());
        let position = guard
            .iter()
            .position(|r| r.id == recipe_id)
            .ok_or(VisionError::NotFound(recipe_id))?;

        let mut next: Vec<Recipe> = (**guard).clone();
        let removed = next.remove(position);
        *guard = Arc::new(next);
        info!("Removed recipe {} ('{}')", removed.id, removed.name);
        Ok(removed)
    }

    /// Replace the whole catalog in one swap
    pub fn replace_all(&self, recipes: Vec<Recipe>) -> Result<(), VisionError> {
        check_unique_ids(&recipes)?;
        let mut guard = self.recipes.write().unwrap_or_else(|e| e.into_inner());
        info!("Replacing catalog: {} -> {} recipes", guard.len(), recipes.len());
        *guard = Arc::new(recipes);
        Ok(())
    }
}

impl Default for RecipeCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_ids_are_unique() {
        let recipes = default_recipes();
        assert_eq!(recipes.len(), 15);
        assert!(check_unique_ids(&recipes).is_ok());
        let ids: Vec<i64> = recipes.iter().map(|r| r.id).collect();
        assert_eq!(ids, (1..=15).collect::<Vec<i64>>());
    }

    #[test]
    fn test_find_missing_is_not_found() {
        let catalog = RecipeCatalog::with_defaults();
        assert_eq!(catalog.find(999), Err(VisionError::NotFound(999)));
        assert_eq!(catalog.find(3).unwrap().name, "Tomato Pasta");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let recipes = vec![Recipe::new(1, "A", &["x"]), Recipe::new(1, "B", &["y"])];
        assert!(matches!(
            RecipeCatalog::new(recipes),
            Err(VisionError::CatalogLoad(_))
        ));
    }

    #[test]
    fn test_json_defaults_for_metadata() {
        let json = r#"[{"id": 7, "name": "Toast", "ingredients": ["bread"]}]"#;
        let catalog = RecipeCatalog::from_json_str(json).unwrap();
        let recipe = catalog.find(7).unwrap();
        assert_eq!(recipe.difficulty, "unknown");
        assert_eq!(recipe.prep_time_mins, 0);
        assert!(recipe.description.is_empty());
    }

    #[test]
    fn test_search_by_name_and_ingredient() {
        let catalog = RecipeCatalog::with_defaults();
        let by_name = catalog.search("SALAD");
        assert!(by_name.iter().any(|r| r.name == "Simple Salad"));
        let by_ingredient = catalog.search("zucchini");
        assert_eq!(by_ingredient.len(), 1);
        assert_eq!(by_ingredient[0].id, 6);
        assert!(catalog.search("   ").is_empty());
    }

    #[test]
    fn test_list_limit_is_clamped() {
        let catalog = RecipeCatalog::with_defaults();
        assert_eq!(catalog.list(0).len(), 1);
        assert_eq!(catalog.list(3).len(), 3);
        assert_eq!(catalog.list(1000).len(), 15);
    }

    #[test]
    fn test_all_ingredients_sorted_unique() {
        let catalog = RecipeCatalog::new(vec![
            Recipe::new(1, "A", &["Onion", "garlic"]),
            Recipe::new(2, "B", &["onion ", "basil"]),
        ])
        .unwrap();
        assert_eq!(catalog.all_ingredients(), vec!["basil", "garlic", "onion"]);
    }

    #[test]
    fn test_snapshot_survives_mutation() {
        let catalog = RecipeCatalog::with_defaults();
        let before = catalog.snapshot();

        catalog.insert(Recipe::new(16, "Omelette", &["egg"])).unwrap();
        catalog.remove(1).unwrap();

        assert_eq!(before.len(), 15);
        assert!(before.iter().any(|r| r.id == 1));
        let after = catalog.snapshot();
        assert_eq!(after.len(), 15);
        assert!(after.iter().all(|r| r.id != 1));
        assert!(after.iter().any(|r| r.id == 16));
    }

    #[test]
    fn test_insert_duplicate_and_remove_missing() {
        let catalog = RecipeCatalog::with_defaults();
        assert!(catalog.insert(Recipe::new(2, "Again", &["x"])).is_err());
        assert_eq!(catalog.remove(999), Err(VisionError::NotFound(999)));
    }
}
