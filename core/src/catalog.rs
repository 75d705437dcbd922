use crate::models::{DietaryType, Ingredient, IngredientCategory, NewIngredient};

/// Maximum number of ingredients handed to the plan prompt.
pub const PROMPT_INGREDIENT_LIMIT: usize = 100;

/// Narrow the catalog to ingredients compatible with a diet and allergy list.
///
/// `catalog` is expected in its natural name order; that order is preserved and
/// the result is capped at [`PROMPT_INGREDIENT_LIMIT`]. Allergies match allergen
/// tags by case-sensitive substring.
#[must_use]
pub fn filter_ingredients(
    catalog: &[Ingredient],
    dietary_type: Option<DietaryType>,
    allergies: &[String],
) -> Vec<Ingredient> {
    let allergies: Vec<&str> = allergies
        .iter()
        .map(String::as_str)
        .filter(|a| !a.is_empty())
        .collect();

    catalog
        .iter()
        .filter(|ing| match dietary_type {
            Some(DietaryType::Vegetarian) => ing.is_vegetarian,
            Some(DietaryType::Vegan) => ing.is_vegan,
            _ => true,
        })
        .filter(|ing| {
            !allergies.iter().any(|allergy| {
                ing.common_allergens
                    .iter()
                    .any(|tag| tag.contains(allergy))
            })
        })
        .take(PROMPT_INGREDIENT_LIMIT)
        .cloned()
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn seed(
    name: &str,
    category: IngredientCategory,
    calories: f64,
    protein: f64,
    carbs: f64,
    fat: f64,
    fiber: f64,
    vegetarian: bool,
    vegan: bool,
    allergens: &[&str],
) -> NewIngredient {
    NewIngredient {
        name: name.to_string(),
        category,
        calories_per_100g: calories,
        protein_per_100g: protein,
        carbs_per_100g: carbs,
        fat_per_100g: fat,
        fiber_per_100g: fiber,
        image_url: String::new(),
        is_vegetarian: vegetarian,
        is_vegan: vegan,
        common_allergens: allergens.iter().map(ToString::to_string).collect(),
    }
}

/// Built-in starter catalog loaded by `nutrifit seed`.
#[must_use]
pub fn default_ingredients() -> Vec<NewIngredient> {
    use IngredientCategory::{Carbs, Dairy, Fats, Fruits, Grains, Nuts, Protein, Vegetables};

    vec![
        seed("Chicken Breast", Protein, 165.0, 31.0, 0.0, 3.6, 0.0, false, false, &[]),
        seed("Salmon", Protein, 208.0, 20.0, 0.0, 13.0, 0.0, false, false, &["shellfish"]),
        seed("Eggs", Protein, 155.0, 13.0, 1.1, 11.0, 0.0, true, false, &["eggs"]),
        seed("Tofu", Protein, 76.0, 8.0, 1.9, 4.8, 0.3, true, true, &[]),
        seed("Greek Yogurt", Dairy, 59.0, 10.0, 3.6, 0.4, 0.0, true, false, &["dairy"]),
        seed("Brown Rice", Grains, 111.0, 2.6, 23.0, 0.9, 1.8, true, true, &[]),
        seed("Quinoa", Grains, 120.0, 4.4, 21.0, 1.9, 2.8, true, true, &[]),
        seed("Sweet Potato", Carbs, 86.0, 1.6, 20.0, 0.1, 3.0, true, true, &[]),
        seed("Oats", Grains, 389.0, 16.9, 66.0, 6.9, 10.6, true, true, &["gluten"]),
        seed("Whole Wheat Bread", Grains, 247.0, 13.0, 41.0, 3.4, 7.0, true, true, &["gluten"]),
        seed("Broccoli", Vegetables, 34.0, 2.8, 7.0, 0.4, 2.6, true, true, &[]),
        seed("Spinach", Vegetables, 23.0, 2.9, 3.6, 0.4, 2.2, true, true, &[]),
        seed("Carrots", Vegetables, 41.0, 0.9, 10.0, 0.2, 2.8, true, true, &[]),
        seed("Bell Peppers", Vegetables, 31.0, 1.0, 6.0, 0.3, 2.1, true, true, &[]),
        seed("Tomatoes", Vegetables, 18.0, 0.9, 3.9, 0.2, 1.2, true, true, &[]),
        seed("Banana", Fruits, 89.0, 1.1, 23.0, 0.3, 2.6, true, true, &[]),
        seed("Apple", Fruits, 52.0, 0.3, 14.0, 0.2, 2.4, true, true, &[]),
        seed("Blueberries", Fruits, 57.0, 0.7, 14.0, 0.3, 2.4, true, true, &[]),
        seed("Strawberries", Fruits, 32.0, 0.7, 7.7, 0.3, 2.0, true, true, &[]),
        seed("Almonds", Nuts, 579.0, 21.0, 22.0, 50.0, 12.5, true, true, &["tree nuts"]),
        seed("Peanut Butter", Nuts, 588.0, 25.0, 20.0, 50.0, 6.0, true, true, &["tree nuts"]),
        seed("Chia Seeds", Nuts, 486.0, 17.0, 42.0, 31.0, 34.0, true, true, &[]),
        seed("Avocado", Fats, 160.0, 2.0, 9.0, 15.0, 7.0, true, true, &[]),
        seed("Olive Oil", Fats, 884.0, 0.0, 0.0, 100.0, 0.0, true, true, &[]),
        seed("Milk", Dairy, 42.0, 3.4, 5.0, 1.0, 0.0, true, false, &["dairy"]),
        seed("Cheese", Dairy, 402.0, 25.0, 1.3, 33.0, 0.0, true, false, &["dairy"]),
    ]
}
