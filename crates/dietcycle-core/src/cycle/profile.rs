//! Health-profile input and its validation rules.

use std::collections::HashSet;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use dietcycle_db::models::{Gender, Goal};

use crate::error::{CycleError, CycleResult};

pub const HEIGHT_CM: RangeInclusive<f64> = 50.0..=300.0;
pub const WEIGHT_KG: RangeInclusive<f64> = 10.0..=500.0;
pub const AGE_YEARS: RangeInclusive<i32> = 10..=120;
pub const MEALS_PER_DAY: RangeInclusive<i32> = 1..=4;

fn default_meal_type() -> String {
    "general".to_owned()
}

/// Everything a user submits to start a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleProfile {
    pub height_cm: f64,
    pub weight_kg: f64,
    pub age: i32,
    pub gender: Gender,
    pub goal: Goal,
    pub activity_type: String,
    pub preferences: String,
    #[serde(default)]
    pub health_conditions: Vec<String>,
    #[serde(default = "default_meal_type")]
    pub meal_type: String,
    pub meal_frequency: i32,
}

impl CycleProfile {
    /// Trim free-text fields, lower-case the categorical ones, and drop
    /// blank health conditions.
    pub fn normalized(&self) -> Self {
        let mut seen = HashSet::new();
        let conditions: Vec<String> = self
            .health_conditions
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty() && seen.insert(c.clone()))
            .collect();

        let meal_type = self.meal_type.trim().to_lowercase();
        Self {
            activity_type: self.activity_type.trim().to_lowercase(),
            preferences: self.preferences.trim().to_lowercase(),
            health_conditions: conditions,
            meal_type: if meal_type.is_empty() {
                default_meal_type()
            } else {
                meal_type
            },
            ..self.clone()
        }
    }

    /// Check every field against its declared range. Reports the first
    /// offending field.
    pub fn validate(&self) -> CycleResult<()> {
        check_range("height_cm", self.height_cm, &HEIGHT_CM)?;
        validate_weight("weight_kg", self.weight_kg)?;
        if !AGE_YEARS.contains(&self.age) {
            return Err(CycleError::validation(
                "age",
                format!("must be between {} and {}", AGE_YEARS.start(), AGE_YEARS.end()),
            ));
        }
        if !MEALS_PER_DAY.contains(&self.meal_frequency) {
            return Err(CycleError::validation(
                "meal_frequency",
                format!(
                    "must be between {} and {}",
                    MEALS_PER_DAY.start(),
                    MEALS_PER_DAY.end()
                ),
            ));
        }
        if self.activity_type.trim().is_empty() {
            return Err(CycleError::validation("activity_type", "is required"));
        }
        if self.preferences.trim().is_empty() {
            return Err(CycleError::validation("preferences", "is required"));
        }
        Ok(())
    }
}

/// Validate a body weight in kg, reporting failures against `field`.
pub fn validate_weight(field: &'static str, weight_kg: f64) -> CycleResult<()> {
    check_range(field, weight_kg, &WEIGHT_KG)
}

fn check_range(field: &'static str, value: f64, range: &RangeInclusive<f64>) -> CycleResult<()> {
    // NaN fails `contains`.
    if range.contains(&value) {
        Ok(())
    } else {
        Err(CycleError::validation(
            field,
            format!("must be between {} and {}, got {value}", range.start(), range.end()),
        ))
    }
}
