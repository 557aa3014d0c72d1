use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Gender recorded on a cycle profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

impl FromStr for Gender {
    type Err = GenderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            "other" | "others" => Ok(Self::Other),
            other => Err(GenderParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Gender`] string.
#[derive(Debug, Clone)]
pub struct GenderParseError(pub String);

impl fmt::Display for GenderParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid gender: {:?}", self.0)
    }
}

impl std::error::Error for GenderParseError {}

// ---------------------------------------------------------------------------

/// What the user wants the cycle to achieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    WeightLoss,
    WeightGain,
    Maintain,
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::WeightLoss => "weight_loss",
            Self::WeightGain => "weight_gain",
            Self::Maintain => "maintain",
        };
        f.write_str(s)
    }
}

impl FromStr for Goal {
    type Err = GoalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weight_loss" => Ok(Self::WeightLoss),
            "weight_gain" => Ok(Self::WeightGain),
            "maintain" => Ok(Self::Maintain),
            other => Err(GoalParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Goal`] string.
#[derive(Debug, Clone)]
pub struct GoalParseError(pub String);

impl fmt::Display for GoalParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid goal: {:?}", self.0)
    }
}

impl std::error::Error for GoalParseError {}

// ---------------------------------------------------------------------------

/// Type of an in-app notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    DietPlanGenerated,
    FeedbackReminder,
    WeightAboveExpected,
    WeightBelowExpected,
    WeightAtTarget,
}

impl NotificationKind {
    /// Whether notifications of this kind are also delivered by email.
    pub fn sends_email(self) -> bool {
        !matches!(self, Self::DietPlanGenerated)
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DietPlanGenerated => "DIET_PLAN_GENERATED",
            Self::FeedbackReminder => "FEEDBACK_REMINDER",
            Self::WeightAboveExpected => "WEIGHT_ABOVE_EXPECTED",
            Self::WeightBelowExpected => "WEIGHT_BELOW_EXPECTED",
            Self::WeightAtTarget => "WEIGHT_AT_TARGET",
        };
        f.write_str(s)
    }
}

impl FromStr for NotificationKind {
    type Err = NotificationKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DIET_PLAN_GENERATED" => Ok(Self::DietPlanGenerated),
            "FEEDBACK_REMINDER" => Ok(Self::FeedbackReminder),
            "WEIGHT_ABOVE_EXPECTED" => Ok(Self::WeightAboveExpected),
            "WEIGHT_BELOW_EXPECTED" => Ok(Self::WeightBelowExpected),
            "WEIGHT_AT_TARGET" => Ok(Self::WeightAtTarget),
            other => Err(NotificationKindParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`NotificationKind`] string.
#[derive(Debug, Clone)]
pub struct NotificationKindParseError(pub String);

impl fmt::Display for NotificationKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid notification kind: {:?}", self.0)
    }
}

impl std::error::Error for NotificationKindParseError {}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// An account holder.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub current_weight: Option<f64>,
    pub last_weight_update: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One health-profile submission and its validity window.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Cycle {
    pub id: Uuid,
    pub user_id: Uuid,
    pub cycle_number: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub age: i32,
    pub gender: Gender,
    pub goal: Goal,
    pub activity_type: String,
    pub preferences: String,
    pub health_conditions: Vec<String>,
    pub meal_type: String,
    pub meal_frequency: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A computed diet plan attached to a cycle.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Prediction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub cycle_id: Uuid,
    pub bmr: f64,
    pub tdee: f64,
    pub bmi: f64,
    pub calorie_target: f64,
    pub expected_weight: f64,
    pub weight_change: f64,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
}

/// One recommended meal inside a prediction.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Meal {
    pub id: Uuid,
    pub prediction_id: Uuid,
    pub position: i32,
    pub name: String,
    pub name_key: String,
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub fiber_g: f64,
    pub sugar_g: f64,
    pub sodium_mg: f64,
    pub instructions: Vec<String>,
    pub ingredients: serde_json::Value,
    pub image_url: Option<String>,
}

/// User-reported outcome for a cycle. At most one row per cycle.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Feedback {
    pub id: Uuid,
    pub cycle_id: Uuid,
    pub user_id: Uuid,
    /// Body weight reported at the end of the cycle, in kg.
    pub reported_weight: Option<f64>,
    pub achieved: Option<bool>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A message delivered to a user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub sent_at: DateTime<Utc>,
    pub related_id: Option<Uuid>,
    pub has_feedback: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gender_display_roundtrip() {
        for v in [Gender::Male, Gender::Female, Gender::Other] {
            let parsed: Gender = v.to_string().parse().expect("should parse");
            assert_eq!(v, parsed);
        }
    }

    #[test]
    fn gender_accepts_legacy_plural() {
        assert_eq!("others".parse::<Gender>().unwrap(), Gender::Other);
        assert!("robot".parse::<Gender>().is_err());
    }

    #[test]
    fn goal_display_roundtrip() {
        for v in [Goal::WeightLoss, Goal::WeightGain, Goal::Maintain] {
            let parsed: Goal = v.to_string().parse().expect("should parse");
            assert_eq!(v, parsed);
        }
    }

    #[test]
    fn goal_invalid() {
        assert!("bulk".parse::<Goal>().is_err());
    }

    #[test]
    fn notification_kind_display_roundtrip() {
        let variants = [
            NotificationKind::DietPlanGenerated,
            NotificationKind::FeedbackReminder,
            NotificationKind::WeightAboveExpected,
            NotificationKind::WeightBelowExpected,
            NotificationKind::WeightAtTarget,
        ];
        for v in &variants {
            let parsed: NotificationKind = v.to_string().parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn notification_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&NotificationKind::WeightAtTarget).unwrap();
        assert_eq!(json, "\"WEIGHT_AT_TARGET\"");
    }

    #[test]
    fn only_plan_notifications_skip_email() {
        assert!(!NotificationKind::DietPlanGenerated.sends_email());
        assert!(NotificationKind::FeedbackReminder.sends_email());
        assert!(NotificationKind::WeightAboveExpected.sends_email());
        assert!(NotificationKind::WeightBelowExpected.sends_email());
        assert!(NotificationKind::WeightAtTarget.sends_email());
    }
}
