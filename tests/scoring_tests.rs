//! # Recipe Scoring Tests
//!
//! Ranking properties over the built-in catalog and small hand-made ones.

use fridge_vision::catalog::{default_recipes, Recipe};
use fridge_vision::scoring::{
    rank_recipes, rank_recipes_with, PluralInsensitiveMatcher, RankingOptions,
};
use fridge_vision::RecipeCatalog;

const QUERIES: &[&[&str]] = &[
    &["tomato"],
    &["onion", "carrot"],
    &["egg", "milk", "butter", "banana"],
    &["tomato", "pasta", "garlic", "onion", "oil"],
    &["rice", "chicken", "broccoli", "lemon", "salt", "pepper"],
];

#[test]
fn test_scoring_example() {
    let catalog = vec![Recipe::new(
        3,
        "Tomato Pasta",
        &["pasta", "tomato", "garlic", "onion", "oil"],
    )];
    let ranked = rank_recipes(&["tomato", "pasta", "garlic"], &catalog, 5, 1);

    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].recipe_id, 3);
    assert_eq!(ranked[0].match_percentage, 60.0);
    assert_eq!(ranked[0].score, 60.0);
    assert_eq!(ranked[0].matched_ingredients.len(), 3);
    assert_eq!(ranked[0].missing_ingredients.len(), 2);
}

#[test]
fn test_match_percentage_bounds_and_breakdown() {
    let catalog = default_recipes();
    for query in QUERIES {
        for ranked in rank_recipes(query, &catalog, 100, 1) {
            assert!(ranked.match_percentage > 0.0);
            assert!(ranked.match_percentage <= 100.0);

            let recipe = catalog.iter().find(|r| r.id == ranked.recipe_id).unwrap();
            assert_eq!(
                ranked.matched_ingredients.len() + ranked.missing_ingredients.len(),
                recipe.ingredients.len()
            );
        }
    }
}

#[test]
fn test_scores_are_non_increasing() {
    let catalog = default_recipes();
    for query in QUERIES {
        let ranked = rank_recipes(query, &catalog, 100, 1);
        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
            if pair[0].score == pair[1].score {
                assert!(
                    pair[0].match_percentage > pair[1].match_percentage
                        || pair[0].recipe_id < pair[1].recipe_id
                );
            }
        }
    }
}

#[test]
fn test_top_k_is_a_prefix_of_full_ranking() {
    let catalog = default_recipes();
    for query in QUERIES {
        let full = rank_recipes(query, &catalog, 100, 1);
        for k in 0..=full.len() + 1 {
            let truncated = rank_recipes(query, &catalog, k, 1);
            assert_eq!(truncated.len(), k.min(full.len()));
            assert_eq!(truncated[..], full[..truncated.len()]);
        }
    }
}

#[test]
fn test_empty_query_and_zero_top_k() {
    let catalog = default_recipes();
    let empty: Vec<String> = Vec::new();
    assert!(rank_recipes(&empty, &catalog, 5, 1).is_empty());
    assert!(rank_recipes(&["  "], &catalog, 5, 1).is_empty());
    assert!(rank_recipes(&["tomato"], &catalog, 0, 1).is_empty());
}

#[test]
fn test_min_match_filters_and_never_below_one() {
    let catalog = default_recipes();

    let with_zero = rank_recipes(&["zucchini"], &catalog, 100, 0);
    assert_eq!(with_zero.len(), 1);
    assert_eq!(with_zero[0].recipe_id, 6);

    let strict = rank_recipes(&["tomato", "onion"], &catalog, 100, 2);
    assert!(!strict.is_empty());
    assert!(strict.iter().all(|r| r.matched_ingredients.len() >= 2));

    assert!(rank_recipes(&["dragonfruit"], &catalog, 100, 0).is_empty());
}

#[test]
fn test_unknown_recipe_is_not_found_not_empty() {
    let catalog = RecipeCatalog::with_defaults();
    let err = catalog.find(424242).unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "Recipe 424242 not found");
}

#[test]
fn test_plural_matcher_extension_point() {
    let catalog = default_recipes();
    let options = RankingOptions::new(20, 1);

    let ranked = rank_recipes_with(
        &["Eggs", "tomatoes"],
        &catalog,
        &options,
        &PluralInsensitiveMatcher,
    );
    assert!(ranked
        .iter()
        .any(|r| r.matched_ingredients.contains(&"tomato".to_string())));
    assert!(ranked.iter().any(|r| r.recipe_id == 11));
}
