use anyhow::{Context, Result};
use serde::Serialize;

use nutrifit_core::catalog::default_ingredients;
use nutrifit_core::db::Database;
use nutrifit_core::models::validate_ingredient;

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub(crate) struct SeedSummary {
    pub created: usize,
    pub existing: usize,
}

/// Load the built-in catalog; ingredients already present by name are left as-is.
pub(crate) fn seed_catalog(db: &Database) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();
    for ingredient in default_ingredients() {
        validate_ingredient(&ingredient)?;
        let (_, created) = db
            .upsert_ingredient_by_name(&ingredient)
            .with_context(|| format!("Failed to seed '{}'", ingredient.name))?;
        if created {
            summary.created += 1;
        } else {
            summary.existing += 1;
        }
    }
    tracing::info!(
        created = summary.created,
        existing = summary.existing,
        "ingredient catalog seeded"
    );
    Ok(summary)
}

pub(crate) fn cmd_seed(db: &Database, json: bool) -> Result<()> {
    let summary = seed_catalog(db)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        let created = summary.created;
        let existing = summary.existing;
        println!("Seeded {created} ingredients ({existing} already present)");
    }

    Ok(())
}
