//! Prompt construction for the two completion operations.
//!
//! The text mirrors what the completion model was tuned against in
//! production; changing the wording changes the answer shapes downstream
//! normalization expects.

use serde_json::Value;

use crate::domain::recipes::RecipeFilters;

/// Up to this many recipes are requested when more than two ingredients are
/// available; with one or two ingredients the model is asked for a single
/// recipe.
const MAX_RECIPES: usize = 5;

pub fn identify(current_ingredients: &[String]) -> String {
    let existing = json_string_list(current_ingredients);

    format!(
        r#"You are an expert at identifying cocktail ingredients from images.

A user has provided you with a photo and the user's current ingredient list: {existing}

Task:
- Identify ingredients visible in the photo.
- Do NOT repeat any ingredient already present in the user's current ingredient list above.
- If an item in the photo matches an item in the current list, include it under "duplicates".
- If unsure about an item, include it under "guesses" and set "uncertain": true.

IMPORTANT: Respond with ONLY valid JSON and nothing else.

Return this exact JSON structure (use these exact property names):
{{
  "ingredients": ["ingredientA", "ingredientB"],
  "duplicates": ["ingredientX"],
  "guesses": ["possible1"],
  "uncertain": false
}}

Notes:
- The top-level field MUST be named "ingredients" (an array of strings). Do not return "newIngredients".
- Only include ingredients you can see. Do not invent ingredients.
- If nothing is detected, return {{ "ingredients": [], "duplicates": [], "guesses": [], "uncertain": false }}.

Example valid response:
{{
  "ingredients": ["vodka", "mint"],
  "duplicates": ["lime"],
  "guesses": [],
  "uncertain": false
}}"#
    )
}

pub fn recipes(
    ingredients: &[String],
    filters: Option<&RecipeFilters>,
    excluded: Option<&Value>,
) -> String {
    let kind = match filters.and_then(|f| f.is_alcoholic) {
        Some(false) => "non-alcoholic",
        _ => "cocktail",
    };
    let units = match filters.and_then(|f| f.measurement_type.as_deref()) {
        Some("metric") => "metric",
        _ => "imperial",
    };
    let max_recipes = if ingredients.len() <= 2 {
        1
    } else {
        MAX_RECIPES
    };
    let available = ingredients.join(", ");
    let excluded = excluded
        .map(Value::to_string)
        .unwrap_or_else(|| "[]".to_string());

    format!(
        r#"You are a professional mixologist. Given these available ingredients: {available}

Return up to {max_recipes} {kind} recipes.

Rules (strict):
- Do NOT invent ingredients or amounts. If a recipe requires items not in the provided list, list them in "missingIngredients".
- Order recipes so those with empty "missingIngredients" come first.
- Use {units} units.
- Exclude any recipes that appear on this list {excluded}. Match by the recipe object's "ingredients" property.

For each recipe include these exact fields:
- name
- ingredients: array of {{ name, amount (number), unit }}
- instructions: array of short steps
- suggestedGlass
- garnish
- alcoholType
- drinkColour (hex)
- abv (number)
- missingIngredients: array of strings
- confidence: number between 0 and 1

If no valid recipes can be produced without inventing items, return {{ "recipes": [], "explanation": "..." }}.

IMPORTANT: Respond with ONLY valid JSON in this exact schema and nothing else.
"#
    )
}

fn json_string_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn identify_prompt_embeds_the_current_list() {
        let prompt = identify(&["lime".to_string(), "mint".to_string()]);
        assert!(prompt.contains(r#"["lime","mint"]"#));
        assert!(prompt.contains("ONLY valid JSON"));
    }

    #[test]
    fn recipe_prompt_scales_with_ingredient_count() {
        let few = recipes(&["rum".to_string()], None, None);
        assert!(few.contains("Return up to 1 cocktail recipes"));

        let many: Vec<String> = ["rum", "lime", "mint", "soda"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let prompt = recipes(&many, None, None);
        assert!(prompt.contains("Return up to 5 cocktail recipes"));
        assert!(prompt.contains("rum, lime, mint, soda"));
    }

    #[test]
    fn recipe_prompt_honours_filters() {
        let filters = RecipeFilters {
            is_alcoholic: Some(false),
            measurement_type: Some("metric".to_string()),
        };
        let prompt = recipes(&["lime".to_string()], Some(&filters), None);
        assert!(prompt.contains("non-alcoholic recipes"));
        assert!(prompt.contains("Use metric units"));
    }

    #[test]
    fn recipe_prompt_embeds_the_exclusion_list() {
        let excluded = json!([{"name": "Mojito"}]);
        let prompt = recipes(&["rum".to_string()], None, Some(&excluded));
        assert!(prompt.contains(r#"[{"name":"Mojito"}]"#));
    }
}
