//! Recipe generation: request shape and completion validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::DomainError;
use super::ingredients::ingredient_list;

/// Body of `POST /api/recipes`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeRequest {
    /// Available ingredients: an array of strings or a comma-separated
    /// string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredients: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<RecipeFilters>,
    /// Recipes the caller already has; excluded from the generated set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipes: Option<Value>,
}

impl RecipeRequest {
    pub fn ingredient_names(&self) -> Vec<String> {
        ingredient_list(self.ingredients.as_ref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_alcoholic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeIngredient {
    pub name: String,
    pub amount: f64,
    pub unit: String,
}

/// A single validated recipe. Optional fields the model omitted serialize as
/// explicit nulls, so cached results have one stable shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub name: String,
    pub ingredients: Vec<RecipeIngredient>,
    pub instructions: Vec<String>,
    pub suggested_glass: String,
    #[serde(default)]
    pub garnish: Option<String>,
    #[serde(default)]
    pub alcohol_type: Option<String>,
    #[serde(default)]
    pub drink_colour: Option<String>,
    #[serde(default)]
    pub abv: Option<f64>,
    #[serde(default)]
    pub missing_ingredients: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// The validated recipe result stored in the cache and returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeSet {
    pub recipes: Vec<Recipe>,
    /// Supplied by the model when `recipes` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl RecipeSet {
    /// Validate a raw completion payload.
    ///
    /// Shape errors anywhere in the set reject the whole payload; a valid
    /// but empty set is fine as long as it carries an explanation or was
    /// explicitly empty.
    pub fn from_completion(payload: &Value) -> Result<Self, DomainError> {
        if !payload
            .get("recipes")
            .is_some_and(|recipes| recipes.is_array())
        {
            return Err(DomainError::validation(
                "completion did not contain a recipes array",
            ));
        }

        let set: Self = serde_json::from_value(payload.clone())
            .map_err(|err| DomainError::validation(format!("recipe payload rejected: {err}")))?;

        for recipe in &set.recipes {
            if recipe.name.trim().is_empty() {
                return Err(DomainError::validation("recipe name must not be empty"));
            }
            if recipe.suggested_glass.trim().is_empty() {
                return Err(DomainError::validation(
                    "recipe suggested glass must not be empty",
                ));
            }
        }

        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn mojito() -> Value {
        json!({
            "name": "Classic Mojito",
            "ingredients": [
                {"name": "white rum", "amount": 2.0, "unit": "oz"},
                {"name": "lime juice", "amount": 1.0, "unit": "oz"},
            ],
            "instructions": ["Muddle mint with lime and syrup", "Add rum and ice"],
            "suggestedGlass": "Highball",
            "garnish": "Mint Sprig",
            "alcoholType": "Rum",
            "abv": 12.5,
        })
    }

    #[test]
    fn valid_payload_passes() {
        let payload = json!({"recipes": [mojito()]});
        let set = RecipeSet::from_completion(&payload).expect("valid set");
        assert_eq!(set.recipes.len(), 1);
        assert_eq!(set.recipes[0].name, "Classic Mojito");
        assert_eq!(set.recipes[0].abv, Some(12.5));
    }

    #[test]
    fn omitted_optional_fields_default() {
        let mut recipe = mojito();
        let fields = recipe.as_object_mut().expect("object");
        fields.remove("garnish");
        fields.remove("alcoholType");
        fields.remove("abv");

        let set = RecipeSet::from_completion(&json!({"recipes": [recipe]})).expect("valid set");
        assert_eq!(set.recipes[0].garnish, None);
        assert_eq!(set.recipes[0].alcohol_type, None);
        assert_eq!(set.recipes[0].abv, None);
        assert!(set.recipes[0].missing_ingredients.is_empty());

        // The normalized serialization carries the defaults as explicit
        // nulls.
        let rendered = serde_json::to_value(&set).expect("serialize");
        assert!(rendered["recipes"][0]["garnish"].is_null());
    }

    #[test]
    fn missing_recipes_array_is_rejected() {
        assert!(RecipeSet::from_completion(&json!({"drinks": []})).is_err());
        assert!(RecipeSet::from_completion(&json!("mojito")).is_err());
    }

    #[test]
    fn malformed_ingredient_entries_are_rejected() {
        let payload = json!({
            "recipes": [{
                "name": "Broken",
                "ingredients": [{"name": "rum", "amount": "two", "unit": "oz"}],
                "instructions": ["Pour"],
                "suggestedGlass": "Rocks",
            }],
        });
        assert!(RecipeSet::from_completion(&payload).is_err());
    }

    #[test]
    fn blank_name_is_rejected() {
        let mut recipe = mojito();
        recipe["name"] = json!("  ");
        assert!(RecipeSet::from_completion(&json!({"recipes": [recipe]})).is_err());
    }

    #[test]
    fn empty_set_with_explanation_passes() {
        let payload = json!({"recipes": [], "explanation": "nothing can be mixed from water alone"});
        let set = RecipeSet::from_completion(&payload).expect("valid set");
        assert!(set.recipes.is_empty());
        assert!(set.explanation.is_some());
    }

    #[test]
    fn request_accepts_csv_ingredients() {
        let request: RecipeRequest =
            serde_json::from_value(json!({"ingredients": "rum, lime"})).expect("request");
        assert_eq!(request.ingredient_names(), vec!["rum", "lime"]);
    }
}
