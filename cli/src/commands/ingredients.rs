use anyhow::Result;
use std::process;

use nutrifit_core::db::Database;
use nutrifit_core::models::{IngredientCategory, parse_choice};

use super::helpers::print_ingredient_table;

pub(crate) fn cmd_ingredients(
    db: &Database,
    search: Option<&str>,
    category: Option<&str>,
    json: bool,
) -> Result<()> {
    let category = category
        .map(|c| parse_choice::<IngredientCategory>("category", c))
        .transpose()?;
    let ingredients = db.list_ingredients(search, category)?;

    if ingredients.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No ingredients found. Run `nutrifit seed` to load the built-in catalog.");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredients)?);
    } else {
        print_ingredient_table(&ingredients);
    }

    Ok(())
}
