use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nutrifit_core::models::Ingredient;

pub(crate) fn print_ingredient_table(ingredients: &[Ingredient]) {
    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Cal/100g")]
        calories: String,
        #[tabled(rename = "P/100g")]
        protein: String,
        #[tabled(rename = "C/100g")]
        carbs: String,
        #[tabled(rename = "F/100g")]
        fat: String,
        #[tabled(rename = "Diet")]
        diet: &'static str,
        #[tabled(rename = "Allergens")]
        allergens: String,
    }

    let rows: Vec<IngredientRow> = ingredients
        .iter()
        .map(|i| IngredientRow {
            id: i.id,
            name: truncate(&i.name, 30),
            category: i.category.to_string(),
            calories: format!("{:.0}", i.calories_per_100g),
            protein: format!("{:.1}", i.protein_per_100g),
            carbs: format!("{:.1}", i.carbs_per_100g),
            fat: format!("{:.1}", i.fat_per_100g),
            diet: diet_label(i),
            allergens: truncate(&i.common_allergens.join(", "), 25),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

fn diet_label(ingredient: &Ingredient) -> &'static str {
    if ingredient.is_vegan {
        "vegan"
    } else if ingredient.is_vegetarian {
        "vegetarian"
    } else {
        "-"
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
