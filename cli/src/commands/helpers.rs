use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use thali_core::catalog;
use thali_core::models::Quantity;
use thali_core::service::{COMBINED_SECTION, CategoryLines, PlanView};

/// Parse `NAME=QTY` as given to `--fresh`, `--tinned`, `--dry` and `--dairy`.
/// Numeric quantities are stored as numbers, anything else as text.
pub(crate) fn parse_ingredient(s: &str) -> Result<(String, Quantity)> {
    let Some((name, qty)) = s.rsplit_once('=') else {
        bail!("Invalid ingredient '{s}'. Use NAME=QTY (e.g. 'Tomatoes=250')");
    };
    let name = name.trim();
    let qty = qty.trim();
    if name.is_empty() || qty.is_empty() {
        bail!("Invalid ingredient '{s}'. Use NAME=QTY (e.g. 'Tomatoes=250')");
    }
    if catalog::lookup(name).is_none() {
        tracing::warn!(ingredient = %name, "ingredient is not in the catalog");
    }
    let quantity = match qty.parse::<f64>() {
        Ok(v) if v.is_finite() => Quantity::Number(v),
        _ => Quantity::Text(qty.to_string()),
    };
    Ok((name.to_string(), quantity))
}

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday")),
        },
    }
}

/// Report a missing meal or plan and exit with status 2.
pub(crate) fn exit_not_found(message: &str, json: bool) -> ! {
    if json {
        println!("{}", json_error(message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

pub(crate) fn print_category_table(categories: &[CategoryLines]) {
    #[derive(Tabled)]
    struct LineRow {
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Ingredient")]
        ingredient: String,
        #[tabled(rename = "Amount")]
        amount: String,
    }

    let rows: Vec<LineRow> = categories
        .iter()
        .flat_map(|c| {
            c.lines.iter().map(|line| LineRow {
                category: c.category.label().to_string(),
                ingredient: truncate(&line.ingredient, 35),
                amount: line.amount.clone(),
            })
        })
        .collect();

    if rows.is_empty() {
        println!("  (no ingredients)");
        return;
    }

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_plan_view(view: &PlanView) {
    for section in &view.sections {
        if section.source.is_empty() {
            println!("\n{}", section.name);
        } else {
            println!("\n{} ({})", section.name, section.source);
        }
        print_category_table(&section.categories);
    }

    let combined = view.sections.len() == 1 && view.sections[0].name == COMBINED_SECTION;
    if !combined && !view.totals.is_empty() {
        println!("\nShopping list");
        print_category_table(&view.totals);
    }

    if !view.extras.is_empty() {
        println!("\nExtras: {}", view.extras.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ingredient_number_and_text() {
        let (name, qty) = parse_ingredient("Tomatoes=250").unwrap();
        assert_eq!(name, "Tomatoes");
        assert_eq!(qty, Quantity::Number(250.0));

        let (name, qty) = parse_ingredient(" Coriander = a bunch ").unwrap();
        assert_eq!(name, "Coriander");
        assert_eq!(qty, Quantity::Text("a bunch".to_string()));
    }

    #[test]
    fn test_parse_ingredient_splits_on_last_equals() {
        let (name, qty) = parse_ingredient("Odd=Name=2").unwrap();
        assert_eq!(name, "Odd=Name");
        assert_eq!(qty, Quantity::Number(2.0));
    }

    #[test]
    fn test_parse_ingredient_invalid() {
        assert!(parse_ingredient("Tomatoes").is_err());
        assert!(parse_ingredient("=250").is_err());
        assert!(parse_ingredient("Tomatoes=").is_err());
    }

    #[test]
    fn test_parse_date() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(None).unwrap(), today);
        assert_eq!(
            parse_date(Some("yesterday".to_string())).unwrap(),
            today - chrono::Duration::days(1)
        );
        assert_eq!(
            parse_date(Some("2024-01-15".to_string())).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert!(parse_date(Some("nope".to_string())).is_err());
    }

    #[test]
    fn test_json_error() {
        assert_eq!(json_error("Meal 'x' not found"), r#"{"error":"Meal 'x' not found"}"#);
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("Paneer", 10), "Paneer");
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
    }
}
