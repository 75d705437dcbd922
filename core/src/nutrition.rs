//! Harris-Benedict energy estimate and macro split.

use serde::Serialize;

use crate::models::{ActivityLevel, GoalType, NutritionTargets, Sex};

const KCAL_PER_G_PROTEIN: f64 = 4.0;
const KCAL_PER_G_CARBS: f64 = 4.0;
const KCAL_PER_G_FAT: f64 = 9.0;

const WEIGHT_LOSS_DEFICIT: f64 = 500.0;
const WEIGHT_GAIN_SURPLUS: f64 = 300.0;

/// Biometrics fed to the calculator. Sex, activity level and goal are optional
/// because extracted input may not name them; each has a documented fallback.
#[derive(Debug, Clone, Copy)]
pub struct BodyMetrics {
    pub age: f64,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub sex: Option<Sex>,
    pub activity_level: Option<ActivityLevel>,
    pub goal: Option<GoalType>,
}

/// Calculator output with the intermediate energy figures kept for display.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TargetBreakdown {
    pub bmr: f64,
    pub tdee: f64,
    pub targets: NutritionTargets,
}

/// Basal metabolic rate in kcal/day. Anything other than male uses the female equation.
#[must_use]
pub fn bmr(age: f64, weight_kg: f64, height_cm: f64, sex: Option<Sex>) -> f64 {
    if sex == Some(Sex::Male) {
        88.362 + 13.397 * weight_kg + 4.799 * height_cm - 5.677 * age
    } else {
        447.593 + 9.247 * weight_kg + 3.098 * height_cm - 4.330 * age
    }
}

#[must_use]
pub fn activity_multiplier(level: Option<ActivityLevel>) -> f64 {
    match level {
        Some(ActivityLevel::Sedentary) => 1.2,
        Some(ActivityLevel::Light) => 1.375,
        Some(ActivityLevel::Moderate) | None => 1.55,
        Some(ActivityLevel::Active) => 1.725,
        Some(ActivityLevel::VeryActive) => 1.9,
    }
}

/// Total daily energy expenditure in kcal/day.
#[must_use]
pub fn tdee(metrics: &BodyMetrics) -> f64 {
    bmr(
        metrics.age,
        metrics.weight_kg,
        metrics.height_cm,
        metrics.sex,
    ) * activity_multiplier(metrics.activity_level)
}

/// Calorie adjustment and (protein, carbs, fat) shares of total energy for a goal.
fn goal_split(goal: Option<GoalType>) -> (f64, (f64, f64, f64)) {
    match goal {
        Some(GoalType::LoseWeight) => (-WEIGHT_LOSS_DEFICIT, (0.30, 0.35, 0.35)),
        Some(GoalType::GainWeight | GoalType::MuscleGain) => {
            (WEIGHT_GAIN_SURPLUS, (0.30, 0.45, 0.25))
        }
        Some(GoalType::Maintain | GoalType::HealthManagement) | None => (0.0, (0.25, 0.45, 0.30)),
    }
}

/// Compute daily targets. Every figure is truncated toward zero, and the gram
/// values are derived from the untruncated calorie total.
#[must_use]
pub fn calculate_targets(metrics: &BodyMetrics) -> TargetBreakdown {
    let bmr = bmr(
        metrics.age,
        metrics.weight_kg,
        metrics.height_cm,
        metrics.sex,
    );
    let tdee = bmr * activity_multiplier(metrics.activity_level);
    let (adjustment, (protein_ratio, carbs_ratio, fat_ratio)) = goal_split(metrics.goal);
    let calories = tdee + adjustment;

    TargetBreakdown {
        bmr,
        tdee,
        targets: NutritionTargets {
            calories: calories as i64,
            protein: (calories * protein_ratio / KCAL_PER_G_PROTEIN) as i64,
            carbs: (calories * carbs_ratio / KCAL_PER_G_CARBS) as i64,
            fat: (calories * fat_ratio / KCAL_PER_G_FAT) as i64,
        },
    }
}
