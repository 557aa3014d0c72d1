//! Client side of the external nutrition-recommendation engine.
//!
//! The engine itself is a separate service; this module defines the wire
//! types, the [`Recommender`] seam, and an HTTP implementation.

pub mod http;

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use dietcycle_db::models::{Cycle, Gender, Goal};

pub use http::HttpRecommender;

/// Errors from a recommendation call.
#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error("recommendation request timed out")]
    Timeout,

    #[error("recommendation request failed: {0}")]
    Request(String),

    #[error("recommendation engine returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse recommendation response: {0}")]
    Parse(String),

    #[error("recommendation response is missing {0}")]
    Incomplete(&'static str),
}

impl From<reqwest::Error> for RecommendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Profile sent to the engine, plus every meal name it must not return.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationRequest {
    /// 1 for male, 0 otherwise.
    pub gender: u8,
    pub age: i32,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub goal: Goal,
    #[serde(rename = "Type")]
    pub preferences: String,
    pub meal_type: String,
    pub meal_frequency: i32,
    pub health_conditions: Vec<String>,
    pub activity_type: String,
    pub exclude_recipe_names: Vec<String>,
}

impl RecommendationRequest {
    /// Build a request from a stored cycle, overriding its weight.
    pub fn for_cycle(cycle: &Cycle, weight_kg: f64, exclude: &BTreeSet<String>) -> Self {
        Self {
            gender: u8::from(cycle.gender == Gender::Male),
            age: cycle.age,
            height_cm: cycle.height_cm,
            weight_kg,
            goal: cycle.goal,
            preferences: cycle.preferences.clone(),
            meal_type: cycle.meal_type.clone(),
            meal_frequency: cycle.meal_frequency,
            health_conditions: cycle.health_conditions.clone(),
            activity_type: cycle.activity_type.clone(),
            exclude_recipe_names: exclude.iter().cloned().collect(),
        }
    }
}

/// The engine's answer. Metrics may be absent when the catalog had nothing
/// to offer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Recommendation {
    #[serde(default)]
    pub bmr: Option<f64>,
    #[serde(default)]
    pub tdee: Option<f64>,
    #[serde(default)]
    pub bmi: Option<f64>,
    #[serde(default)]
    pub calorie_target: Option<f64>,
    #[serde(default, alias = "diet_plan")]
    pub meals: Vec<RecommendedMeal>,
}

/// One meal as returned by the engine. Accepts both snake_case keys and the
/// engine's display keys (`"Calories (kcal)"`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedMeal {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(default, alias = "Calories (kcal)")]
    pub calories: f64,
    #[serde(default, alias = "Protein (g)")]
    pub protein_g: f64,
    #[serde(default, alias = "Carbs (g)")]
    pub carbs_g: f64,
    #[serde(default, alias = "Fat (g)")]
    pub fat_g: f64,
    #[serde(default, alias = "Fiber (g)")]
    pub fiber_g: f64,
    #[serde(default, alias = "Sugar (g)")]
    pub sugar_g: f64,
    #[serde(default, alias = "Sodium (mg)")]
    pub sodium_mg: f64,
    #[serde(default, alias = "Instructions", deserialize_with = "instruction_steps")]
    pub instructions: Vec<String>,
    #[serde(default = "empty_object", alias = "Ingredients")]
    pub ingredients: serde_json::Value,
    #[serde(default, alias = "Image")]
    pub image_url: Option<String>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Instructions arrive either as a list of steps or as one newline-separated
/// string.
fn instruction_steps<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Steps {
        Text(String),
        List(Vec<String>),
        Missing(()),
    }

    let steps = match Steps::deserialize(deserializer)? {
        Steps::Text(text) => text.lines().map(str::to_owned).collect(),
        Steps::List(list) => list,
        Steps::Missing(()) => Vec::new(),
    };
    Ok(steps
        .into_iter()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Canonical dedup key for a meal name: trimmed and lower-cased.
pub fn normalize_meal_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// The external recommendation engine.
#[async_trait]
pub trait Recommender: Send + Sync {
    async fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> Result<Recommendation, RecommendError>;
}

// Compile-time check that Recommender is object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Recommender) {}
};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_display_keys_from_diet_plan() {
        let body = json!({
            "bmr": 1650.25,
            "bmi": 22.86,
            "calorie_target": 1480.3,
            "diet_plan": [{
                "Name": "Lentil Soup",
                "Calories (kcal)": 320.5,
                "Fat (g)": 6.1,
                "Carbs (g)": 48.0,
                "Protein (g)": 18.2,
                "Fiber (g)": 11.0,
                "Sugar (g)": 4.4,
                "Sodium (mg)": 380.0,
                "Image": "https://img.example/lentil.jpg",
                "Instructions": "Rinse lentils.\n\nSimmer 30 minutes.\n"
            }]
        });

        let rec: Recommendation = serde_json::from_value(body).unwrap();
        assert_eq!(rec.tdee, None);
        assert_eq!(rec.calorie_target, Some(1480.3));
        assert_eq!(rec.meals.len(), 1);

        let meal = &rec.meals[0];
        assert_eq!(meal.name, "Lentil Soup");
        assert_eq!(meal.calories, 320.5);
        assert_eq!(meal.sodium_mg, 380.0);
        assert_eq!(meal.instructions, vec!["Rinse lentils.", "Simmer 30 minutes."]);
        assert_eq!(meal.ingredients, json!({}));
        assert_eq!(meal.image_url.as_deref(), Some("https://img.example/lentil.jpg"));
    }

    #[test]
    fn parses_snake_case_meals() {
        let body = json!({
            "bmr": 1500.0,
            "tdee": 1800.0,
            "bmi": 21.0,
            "calorie_target": 1300.0,
            "meals": [{
                "name": "Oat Bowl",
                "calories": 410.0,
                "instructions": ["Boil milk", "Add oats"],
                "ingredients": {"oats": "80 g"},
                "image_url": null
            }]
        });

        let rec: Recommendation = serde_json::from_value(body).unwrap();
        assert_eq!(rec.tdee, Some(1800.0));
        assert_eq!(rec.meals[0].instructions, vec!["Boil milk", "Add oats"]);
        assert_eq!(rec.meals[0].ingredients["oats"], "80 g");
        assert_eq!(rec.meals[0].protein_g, 0.0);
    }

    #[test]
    fn empty_plan_has_no_metrics() {
        let rec: Recommendation = serde_json::from_value(json!({
            "bmr": null, "bmi": null, "calorie_target": null, "diet_plan": []
        }))
        .unwrap();
        assert!(rec.meals.is_empty());
        assert!(rec.bmr.is_none());
    }

    #[test]
    fn request_uses_engine_field_names() {
        let req = RecommendationRequest {
            gender: 1,
            age: 40,
            height_cm: 180.0,
            weight_kg: 88.0,
            goal: Goal::WeightLoss,
            preferences: "non-vegetarian".into(),
            meal_type: "general".into(),
            meal_frequency: 3,
            health_conditions: vec!["hypertension".into()],
            activity_type: "cycling".into(),
            exclude_recipe_names: vec!["oat bowl".into()],
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["Type"], "non-vegetarian");
        assert_eq!(value["goal"], "weight_loss");
        assert_eq!(value["exclude_recipe_names"], json!(["oat bowl"]));
        assert!(value.get("preferences").is_none());
    }

    #[test]
    fn meal_names_normalize_for_dedup() {
        assert_eq!(normalize_meal_name("  Chicken TIKKA "), "chicken tikka");
    }
}
