//! Energy-balance arithmetic: expected weight at the end of a cycle, plus
//! the fallbacks used when the recommendation engine omits TDEE or BMI.

use serde::Serialize;

/// Length of a diet cycle in days. Drives both the projection horizon and
/// `end_date = start_date + CYCLE_LENGTH_DAYS` unless configured otherwise.
pub const CYCLE_LENGTH_DAYS: i64 = 15;

/// Energy content of one kilogram of body mass, in kcal.
pub const KCAL_PER_KG: f64 = 7700.0;

/// Result of [`project_weight`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Projection {
    /// Weight expected at the end of the cycle, kg, 2 decimals.
    pub expected_weight: f64,
    /// Signed change over the cycle, kg, 2 decimals.
    pub weight_change_kg: f64,
}

/// Project body weight after `cycle_length_days` of eating `calorie_target`
/// against a maintenance burn of `tdee`.
///
/// The expected weight is computed from the unrounded change; both outputs
/// are rounded to 2 decimals independently.
pub fn project_weight(
    weight_kg: f64,
    tdee: f64,
    calorie_target: f64,
    cycle_length_days: i64,
) -> Projection {
    let calorie_diff_per_day = calorie_target - tdee;
    let total_calorie_change = calorie_diff_per_day * cycle_length_days as f64;
    let weight_change_kg = total_calorie_change / KCAL_PER_KG;

    Projection {
        expected_weight: round2(weight_kg + weight_change_kg),
        weight_change_kg: round2(weight_change_kg),
    }
}

/// Round half away from zero to 2 decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Physical-activity multiplier applied to BMR to estimate TDEE.
/// Unknown activities count as sedentary.
pub fn activity_multiplier(activity_type: &str) -> f64 {
    match activity_type.trim().to_lowercase().as_str() {
        "walking" => 1.2,
        "yoga" => 1.3,
        "dancing" => 1.45,
        "weight training" | "weight_training" => 1.55,
        "cycling" => 1.6,
        "basketball" => 1.7,
        "swimming" | "tennis" => 1.75,
        "running" => 1.8,
        "hiit" => 1.9,
        _ => 1.2,
    }
}

/// Body-mass index, 2 decimals.
pub fn body_mass_index(weight_kg: f64, height_cm: f64) -> f64 {
    let height_m = height_cm / 100.0;
    round2(weight_kg / (height_m * height_m))
}
