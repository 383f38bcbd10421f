//! Ingredient identification: request shape and completion normalization.
//!
//! The model has answered in two shapes over time: the original prompt
//! returned `ingredients: []`, newer prompts return `newIngredients` plus
//! `duplicates` / `guesses` / `uncertain`. Both normalize to
//! [`IdentifiedIngredients`], with a permissive "first array of strings"
//! sweep as the last resort.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::error::DomainError;

/// Body of `POST /api/identify`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    /// Base64 data URI of the photo to analyze.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_data_uri: Option<String>,
    /// Ingredients the caller already has: an array of strings or a
    /// comma-separated string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredients: Option<Value>,
}

impl IdentifyRequest {
    pub fn current_ingredients(&self) -> Vec<String> {
        ingredient_list(self.ingredients.as_ref())
    }
}

/// Accept an array of strings or a comma-separated string; anything else is
/// an empty list.
pub fn ingredient_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(csv)) => csv
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// The normalized identify result stored in the cache and returned to
/// callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifiedIngredients {
    pub ingredients: Vec<String>,
    pub duplicates: Vec<String>,
    pub guesses: Vec<String>,
    pub uncertain: bool,
}

impl IdentifiedIngredients {
    /// Normalize a raw completion payload.
    ///
    /// Prefers `ingredients`, then `newIngredients`, then the first array of
    /// strings found anywhere in the payload.
    pub fn from_completion(payload: &Value) -> Result<Self, DomainError> {
        let ingredients = string_array(payload.get("ingredients"))
            .or_else(|| string_array(payload.get("newIngredients")))
            .or_else(|| {
                let found = find_string_array(payload);
                if found.is_some() {
                    warn!(
                        target: "sorso::domain",
                        preview = %preview(payload),
                        "extracted ingredients from an unexpected payload shape"
                    );
                }
                found
            })
            .ok_or_else(|| {
                warn!(
                    target: "sorso::domain",
                    preview = %preview(payload),
                    "identify completion had no recognizable ingredient list"
                );
                DomainError::validation("completion did not contain an ingredient list")
            })?;

        Ok(Self {
            ingredients,
            duplicates: string_array(payload.get("duplicates")).unwrap_or_default(),
            guesses: string_array(payload.get("guesses")).unwrap_or_default(),
            uncertain: truthy(payload.get("uncertain")),
        })
    }
}

fn string_array(value: Option<&Value>) -> Option<Vec<String>> {
    let items = value?.as_array()?;
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

/// Depth-first sweep for any array whose elements are all strings.
fn find_string_array(value: &Value) -> Option<Vec<String>> {
    let fields: Box<dyn Iterator<Item = &Value> + '_> = match value {
        Value::Object(map) => Box::new(map.values()),
        Value::Array(items) => Box::new(items.iter()),
        _ => return None,
    };

    for field in fields {
        if let Some(found) = string_array(Some(field)) {
            return Some(found);
        }
        if let Some(nested) = find_string_array(field) {
            return Some(nested);
        }
    }
    None
}

/// JavaScript-style truthiness: absent, null, false, 0, and "" are false.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn preview(payload: &Value) -> String {
    let mut rendered = payload.to_string();
    if let Some((limit, _)) = rendered.char_indices().nth(500) {
        rendered.truncate(limit);
    }
    rendered
}
