use anyhow::Result;

use thali_core::models::Selection;
use thali_core::service::{LoadTarget, Planner};

use super::helpers::{exit_not_found, parse_date, print_plan_view};

pub(crate) fn cmd_plan_create(
    planner: &Planner,
    meals: &[String],
    quantities: &[String],
    extras: &[String],
    save_as: Option<Option<String>>,
    json: bool,
) -> Result<()> {
    let quantities: Vec<Option<String>> = quantities.iter().cloned().map(Some).collect();
    let selection = Selection::from_form(meals, &quantities);
    let plan = planner.create_plan(&selection, extras)?;

    if plan.meals.len() < selection.meals.len() {
        let missing: Vec<&str> = selection
            .meals
            .iter()
            .map(|m| m.name.as_str())
            .filter(|name| !plan.meals.iter().any(|p| p == name))
            .collect();
        eprintln!("Skipped unknown meals: {}", missing.join(", "));
    }

    let saved = save_as
        .map(|name| planner.save_plan(&plan, name.as_deref()))
        .transpose()?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "plan": plan,
                "saved": saved,
            }))?
        );
        return Ok(());
    }

    print_plan_view(&planner.plan_view(&plan)?);
    if let Some(saved) = saved {
        println!("\nSaved plan '{}' to {}", saved.name, saved.path.display());
    }
    Ok(())
}

pub(crate) fn cmd_plan_show(planner: &Planner, name: &str, json: bool) -> Result<()> {
    let Some((target, plan)) = planner.load(name)? else {
        exit_not_found(&format!("No saved plan or meal named '{name}'"), json);
    };
    let view = planner.plan_view(&plan)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "source": target,
                "plan": plan,
                "view": view,
            }))?
        );
        return Ok(());
    }

    match &target {
        LoadTarget::Plan(n) => println!("Saved plan: {n}"),
        LoadTarget::Meal(n) => println!("Meal: {n}"),
    }
    print_plan_view(&view);
    Ok(())
}

pub(crate) fn cmd_plan_saved(planner: &Planner, json: bool) -> Result<()> {
    let names = planner.list_saved_plans()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else if names.is_empty() {
        eprintln!("No saved plans. Use `thali plan create ... --save` to save one.");
    } else {
        for name in &names {
            println!("{name}");
        }
    }
    Ok(())
}

pub(crate) fn cmd_plan_delete(planner: &Planner, names: &[String], json: bool) -> Result<()> {
    let removed = planner.delete_plans(names)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": removed }));
    } else {
        println!("Deleted {removed} of {} plans", names.len());
    }
    Ok(())
}

pub(crate) fn cmd_plan_made(
    planner: &Planner,
    name: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let Some((_, plan)) = planner.load(name)? else {
        exit_not_found(&format!("No saved plan or meal named '{name}'"), json);
    };
    let updated = planner.mark_made(&plan, date)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "updated": updated, "date": date.format("%Y-%m-%d").to_string() })
        );
    } else {
        println!("Marked {updated} meals as made on {date}");
    }
    Ok(())
}
