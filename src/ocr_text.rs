//! # OCR Text Harvesting Module
//!
//! OCR over a fridge photo mostly picks up packaging labels ("MILK", "Greek
//! Yogurt", "Tomatoes"). This module looks for known ingredient names in that
//! text so they can join the query set, and flags detected ingredients that the
//! text confirms.
//!
//! Matching is whole-word and case-insensitive; simple plurals of a vocabulary
//! term ("tomatoes" for "tomato") count as a hit, and multi-word terms tolerate
//! any whitespace between words, including line breaks.
//!
//! Packaging text also carries expiry dates, which [`detect_expiry_date`] picks
//! out of the same text.

use lazy_static::lazy_static;
use log::{debug, info, trace};
use regex::Regex;

use crate::quantity::{IngredientSource, QuantifiedIngredient};
use crate::scoring::normalize_ingredient_name;

lazy_static! {
    // "EXP 12/05/25", "Best before: 3-4-2025", "use by 01/02/26"
    static ref LABELLED_DATE_REGEX: Regex = Regex::new(
        r"(?i)\b(?:exp|expiry|best\s+before|use\s+by)[:\s]*(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})\b"
    )
    .expect("Labelled date pattern should be valid");
    static ref NUMERIC_DATE_REGEX: Regex = Regex::new(r"\b(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})\b")
        .expect("Numeric date pattern should be valid");
    static ref MONTH_YEAR_REGEX: Regex = Regex::new(
        r"(?i)\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{4}\b"
    )
    .expect("Month-year pattern should be valid");
}

/// Find an expiry date in OCR text
///
/// A date introduced by "exp", "expiry", "best before" or "use by" wins over a
/// bare `dd/mm/yy` date anywhere in the text, which wins over a "month year"
/// date. The matched date is returned lowercased, as written.
///
/// # Examples
///
/// ```rust
/// use fridge_vision::ocr_text::detect_expiry_date;
///
/// let text = "Packed 01/03/2025\nBEST BEFORE: 15/03/2025";
/// assert_eq!(detect_expiry_date(text), Some("15/03/2025".to_string()));
/// assert_eq!(detect_expiry_date("Greek yogurt 500g"), None);
/// ```
pub fn detect_expiry_date(text: &str) -> Option<String> {
    let date = LABELLED_DATE_REGEX
        .captures(text)
        .or_else(|| NUMERIC_DATE_REGEX.captures(text))
        .and_then(|caps| caps.get(1))
        .or_else(|| MONTH_YEAR_REGEX.find(text))
        .map(|m| m.as_str().to_lowercase());

    if let Some(date) = &date {
        debug!("Detected expiry date '{}'", date);
    }
    date
}

/// Build a whole-word pattern for one vocabulary term
fn term_pattern(term: &str) -> Option<Regex> {
    let words: Vec<String> = term.split_whitespace().map(regex::escape).collect();
    if words.is_empty() {
        return None;
    }
    let pattern = format!(r"(?i)\b{}(?:s|es)?\b", words.join(r"\s+"));
    match Regex::new(&pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            debug!("Skipping vocabulary term '{}': {}", term, e);
            None
        }
    }
}

/// Whether `term` occurs in `text` as a whole word (or simple plural)
pub fn mentions(text: &str, term: &str) -> bool {
    term_pattern(term).is_some_and(|regex| regex.is_match(text))
}

/// Find vocabulary terms mentioned in OCR text
///
/// Returns normalized terms in vocabulary order without duplicates.
///
/// # Examples
///
/// ```rust
/// use fridge_vision::ocr_text::harvest_ingredient_names;
///
/// let vocabulary = vec!["milk".to_string(), "bell pepper".to_string(), "egg".to_string()];
/// let text = "ORGANIC WHOLE MILK\n2% fat\nRed Bell\nPepper";
///
/// assert_eq!(harvest_ingredient_names(text, &vocabulary), vec!["milk", "bell pepper"]);
/// ```
pub fn harvest_ingredient_names(text: &str, vocabulary: &[String]) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut found: Vec<String> = Vec::new();
    for term in vocabulary {
        let term = normalize_ingredient_name(term);
        if term.is_empty() || found.contains(&term) {
            continue;
        }
        if mentions(text, &term) {
            trace!("OCR text mentions '{}'", term);
            found.push(term);
        }
    }

    info!(
        "Harvested {} ingredient names from {} characters of OCR text",
        found.len(),
        text.len()
    );
    found
}

/// Mark ingredients whose class name also appears in the OCR text
pub fn mark_ocr_confirmed(
    ingredients: Vec<QuantifiedIngredient>,
    text: &str,
) -> Vec<QuantifiedIngredient> {
    ingredients
        .into_iter()
        .map(|ingredient| {
            if mentions(text, &ingredient.class_name) {
                debug!("'{}' confirmed by OCR text", ingredient.class_name);
                ingredient.with_source(IngredientSource::DetectionAndOcr)
            } else {
                ingredient
            }
        })
        .collect()
}
