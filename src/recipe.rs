use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api_connection::candidate::parse_candidate_json;
use crate::api_connection::endpoints::{GenerateContentRequest, Part};
use crate::api_connection::{ApiConnectionError, GeminiClient, Sleeper};
use crate::store::{sort_newest_first, CollectionPath, DocumentStore, StoreError};

const RECIPE_SYSTEM_PROMPT: &str = "You write recipes for a hospital kitchen. \
Answer with JSON only, shaped as: \
{ \"title\": \"...\", \"servings\": 1, \"ingredients\": [\"...\"], \"steps\": [\"...\"], \"notes\": \"...\" }. \
Ingredients carry quantities for the stated servings. Keep sodium low.";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Recipe {
    #[serde(alias = "recipe_title")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servings: Option<u32>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default, alias = "instructions")]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Recipe {
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&needle)
            || self
                .ingredients
                .iter()
                .any(|ingredient| ingredient.to_lowercase().contains(&needle))
    }
}

pub async fn generate_recipe<S: Sleeper>(
    client: &GeminiClient<S>,
    dish: &str,
) -> Result<Recipe, ApiConnectionError> {
    let prompt = format!("Write the recipe for: {}", dish.trim());
    let request = GenerateContentRequest::json_prompt(RECIPE_SYSTEM_PROMPT, vec![Part::text(prompt)]);
    let response = client.generate_content(&request).await?;
    let recipe: Recipe = parse_candidate_json(&response)?;
    info!(title = %recipe.title, ingredients = recipe.ingredients.len(), "recipe generated");
    Ok(recipe)
}

pub fn save_recipe(
    store: &mut dyn DocumentStore,
    namespace: &str,
    recipe: &Recipe,
) -> Result<String, StoreError> {
    let collection = CollectionPath::recipes(namespace);
    let data = serde_json::to_value(recipe).map_err(|source| StoreError::Corrupt {
        path: collection.as_str().into(),
        source,
    })?;
    store.add(&collection, data)
}

/// Saved recipes, newest first.
pub fn load_recipes(store: &dyn DocumentStore, namespace: &str) -> Result<Vec<Recipe>, StoreError> {
    let mut documents = store.list(&CollectionPath::recipes(namespace))?;
    sort_newest_first(&mut documents);
    Ok(documents
        .into_iter()
        .filter_map(|doc| {
            serde_json::from_value(doc.data)
                .map_err(|e| warn!(id = %doc.id, error = %e, "skipping unreadable recipe"))
                .ok()
        })
        .collect())
}

/// Case-insensitive match on title or any ingredient. A blank query matches all.
pub fn search_recipes<'a>(recipes: &'a [Recipe], query: &str) -> Vec<&'a Recipe> {
    recipes.iter().filter(|recipe| recipe.matches(query)).collect()
}

pub fn render_recipe(recipe: &Recipe) -> String {
    let mut out = format!("# {}\n", recipe.title);
    if let Some(servings) = recipe.servings {
        out.push_str(&format!("Servings: {}\n", servings));
    }
    out.push_str("\nIngredients:\n");
    for ingredient in &recipe.ingredients {
        out.push_str(&format!("  - {}\n", ingredient));
    }
    out.push_str("\nSteps:\n");
    for (index, step) in recipe.steps.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", index + 1, step));
    }
    if let Some(notes) = &recipe.notes {
        out.push_str(&format!("\nNotes: {}\n", notes));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn recipe(title: &str, ingredients: &[&str]) -> Recipe {
        Recipe {
            title: title.to_string(),
            servings: None,
            ingredients: ingredients.iter().map(|s| s.to_string()).collect(),
            steps: vec!["Cook.".to_string()],
            notes: None,
        }
    }

    #[test]
    fn accepts_alternate_field_names() {
        let parsed: Recipe = serde_json::from_value(json!({
            "recipe_title": "Bulgogi",
            "ingredients": ["beef 300g"],
            "instructions": ["Marinate", "Grill"]
        }))
        .unwrap();
        assert_eq!(parsed.title, "Bulgogi");
        assert_eq!(parsed.steps, vec!["Marinate", "Grill"]);
    }

    #[test]
    fn search_matches_title_and_ingredients_case_insensitively() {
        let recipes = vec![
            recipe("Beef Bulgogi", &["beef", "soy sauce"]),
            recipe("Seaweed Soup", &["Dried SEAWEED", "sesame oil"]),
            recipe("Steamed Egg", &["egg", "salt"]),
        ];
        let titles = |query: &str| -> Vec<String> {
            search_recipes(&recipes, query)
                .into_iter()
                .map(|r| r.title.clone())
                .collect()
        };

        assert_eq!(titles("BULGOGI"), vec!["Beef Bulgogi"]);
        assert_eq!(titles("seaweed"), vec!["Seaweed Soup"]);
        assert_eq!(titles("sesame"), vec!["Seaweed Soup"]);
        assert!(titles("kimchi").is_empty());
        assert_eq!(titles("  ").len(), 3);
    }

    #[test]
    fn saved_recipes_load_back() {
        let mut store = InMemoryStore::new();
        let bulgogi = recipe("Bulgogi", &["beef"]);
        save_recipe(&mut store, "ns", &bulgogi).unwrap();
        store
            .add(&CollectionPath::recipes("ns"), json!({"no_title": 1}))
            .unwrap();

        let loaded = load_recipes(&store, "ns").unwrap();
        assert_eq!(loaded, vec![bulgogi]);
        assert!(load_recipes(&store, "other").unwrap().is_empty());
    }

    #[test]
    fn render_numbers_steps() {
        let mut r = recipe("Porridge", &["rice"]);
        r.steps = vec!["Soak".to_string(), "Simmer".to_string()];
        r.servings = Some(2);
        let text = render_recipe(&r);
        assert!(text.starts_with("# Porridge\n"));
        assert!(text.contains("Servings: 2"));
        assert!(text.contains("  2. Simmer"));
    }
}
