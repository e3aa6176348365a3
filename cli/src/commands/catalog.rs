use anyhow::{Context, Result};
use std::path::Path;
use tabled::{Table, Tabled, settings::Style};

use thali_core::catalog::{self, Category, CatalogEntry};
use thali_core::models::MealRecord;
use thali_core::service::Planner;

pub(crate) fn cmd_catalog_show(category: Option<&str>, json: bool) -> Result<()> {
    let category = category.map(Category::parse).transpose()?;
    let entries: Vec<CatalogEntry> = catalog::entries()
        .filter(|e| category.is_none_or(|c| e.category == c))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "Category")]
        category: &'static str,
        #[tabled(rename = "Ingredient")]
        name: &'static str,
        #[tabled(rename = "Unit")]
        unit: &'static str,
    }

    let rows: Vec<EntryRow> = entries
        .iter()
        .map(|e| EntryRow {
            category: e.category.label(),
            name: e.name,
            unit: e.unit.suffix(),
        })
        .collect();
    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_catalog_refresh(planner: &Planner, json: bool) -> Result<()> {
    let summary = planner.db().refresh_catalog()?;
    let ingredients = planner.db().catalog_ingredients()?;
    let tags = planner.db().catalog_tags()?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "added": summary,
                "ingredients": ingredients,
                "tags": tags,
            }))?
        );
    } else {
        println!(
            "Catalog refreshed: {} new ingredients, {} new tags ({} ingredients, {} tags recorded)",
            summary.ingredients_added,
            summary.tags_added,
            ingredients.len(),
            tags.len()
        );
    }
    Ok(())
}

pub(crate) fn cmd_catalog_import(
    planner: &Planner,
    file: &Path,
    replace: bool,
    json: bool,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let records: Vec<MealRecord> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a list of meal records", file.display()))?;
    let summary = planner.db().import_meals(&records, replace)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Imported {} new meals, updated {}, skipped {}",
            summary.meals_inserted, summary.meals_updated, summary.meals_skipped
        );
    }
    Ok(())
}

pub(crate) fn cmd_catalog_export(planner: &Planner, output: Option<&Path>, json: bool) -> Result<()> {
    let records = planner.db().export_meals()?;
    let text = serde_json::to_string_pretty(&records)?;

    let Some(path) = output else {
        println!("{text}");
        return Ok(());
    };
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "exported": records.len(), "path": path.display().to_string() })
        );
    } else {
        println!("Exported {} meals to {}", records.len(), path.display());
    }
    Ok(())
}
