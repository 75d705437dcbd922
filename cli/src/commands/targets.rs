use anyhow::{Result, bail};

use nutrifit_core::models::{ActivityLevel, GoalType, Sex, parse_choice};
use nutrifit_core::nutrition::{BodyMetrics, TargetBreakdown, calculate_targets};

pub(crate) fn compute_targets(
    age: f64,
    weight: f64,
    height: f64,
    sex: Option<&str>,
    activity: Option<&str>,
    goal: Option<&str>,
) -> Result<TargetBreakdown> {
    if age <= 0.0 || weight <= 0.0 || height <= 0.0 {
        bail!("Age, weight and height must be greater than 0");
    }
    let metrics = BodyMetrics {
        age,
        weight_kg: weight,
        height_cm: height,
        sex: sex.map(|s| parse_choice::<Sex>("sex", s)).transpose()?,
        activity_level: activity
            .map(|a| parse_choice::<ActivityLevel>("activity level", a))
            .transpose()?,
        goal: goal
            .map(|g| parse_choice::<GoalType>("goal", g))
            .transpose()?,
    };
    Ok(calculate_targets(&metrics))
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_targets(
    age: f64,
    weight: f64,
    height: f64,
    sex: Option<&str>,
    activity: Option<&str>,
    goal: Option<&str>,
    json: bool,
) -> Result<()> {
    let breakdown = compute_targets(age, weight, height, sex, activity, goal)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&breakdown)?);
    } else {
        let TargetBreakdown { bmr, tdee, targets } = breakdown;
        println!("BMR:      {bmr:.0} kcal/day");
        println!("TDEE:     {tdee:.0} kcal/day");
        println!("Calories: {} kcal/day", targets.calories);
        println!("Protein:  {}g", targets.protein);
        println!("Carbs:    {}g", targets.carbs);
        println!("Fat:      {}g", targets.fat);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_profile() {
        let b = compute_targets(
            30.0,
            70.0,
            175.0,
            Some("male"),
            Some("moderate"),
            Some("maintain"),
        )
        .unwrap();
        assert_eq!(b.targets.calories, 2628);
        assert_eq!(b.targets.protein, 164);
        assert_eq!(b.targets.carbs, 295);
        assert_eq!(b.targets.fat, 87);
    }

    #[test]
    fn test_invalid_choice() {
        let err = compute_targets(30.0, 70.0, 175.0, Some("robot"), None, None).unwrap_err();
        assert!(err.to_string().starts_with("Invalid sex 'robot'"));
    }

    #[test]
    fn test_non_positive_metrics() {
        assert!(compute_targets(0.0, 70.0, 175.0, None, None, None).is_err());
        assert!(compute_targets(30.0, -1.0, 175.0, None, None, None).is_err());
    }
}
