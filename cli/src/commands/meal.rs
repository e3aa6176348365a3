use anyhow::Result;
use clap::Args;
use tabled::{Table, Tabled, settings::Style};

use thali_core::catalog::Category;
use thali_core::models::{Bucket, IngredientChoice, Meal, NewMeal, Tag};
use thali_core::service::Planner;

use super::helpers::{exit_not_found, parse_ingredient, print_category_table, truncate};

/// Meal fields shared by `meal add` and `meal edit`.
#[derive(Args, Debug, Default)]
pub(crate) struct IngredientArgs {
    /// Staple eaten with the meal (e.g. Rice, Bread)
    #[arg(long)]
    pub staple: Option<String>,
    /// Recipe book
    #[arg(long)]
    pub book: Option<String>,
    /// Page in the recipe book
    #[arg(long)]
    pub page: Option<String>,
    /// Recipe web page (shown instead of book and page)
    #[arg(long)]
    pub website: Option<String>,
    /// Fresh ingredient as NAME=QTY (repeatable)
    #[arg(long, value_name = "NAME=QTY")]
    pub fresh: Vec<String>,
    /// Tinned ingredient as NAME=QTY (repeatable)
    #[arg(long, value_name = "NAME=QTY")]
    pub tinned: Vec<String>,
    /// Dry ingredient as NAME=QTY (repeatable)
    #[arg(long, value_name = "NAME=QTY")]
    pub dry: Vec<String>,
    /// Dairy ingredient as NAME=QTY (repeatable)
    #[arg(long, value_name = "NAME=QTY")]
    pub dairy: Vec<String>,
    /// Tag (repeatable): Spring/Summer, Autumn/Winter, Quick/Easy, Special
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
    /// Remove every tag
    #[arg(long, conflicts_with = "tags")]
    pub clear_tags: bool,
}

impl IngredientArgs {
    fn raw(&self, category: Category) -> &[String] {
        match category {
            Category::Fresh => &self.fresh,
            Category::Tinned => &self.tinned,
            Category::Dry => &self.dry,
            Category::Dairy => &self.dairy,
        }
    }

    /// `None` when no flag was given for the category.
    fn bucket(&self, category: Category) -> Result<Option<Bucket>> {
        let raw = self.raw(category);
        if raw.is_empty() {
            return Ok(None);
        }
        let bucket = raw
            .iter()
            .map(|s| parse_ingredient(s))
            .collect::<Result<Bucket>>()?;
        Ok(Some(bucket))
    }

    fn tags(&self) -> Result<Option<Vec<Tag>>> {
        if self.clear_tags {
            return Ok(Some(Vec::new()));
        }
        if self.tags.is_empty() {
            return Ok(None);
        }
        let mut tags = Vec::new();
        for raw in &self.tags {
            let tag = Tag::parse(raw)?;
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        Ok(Some(tags))
    }

    /// Overlay the given flags onto `meal`.
    fn apply(&self, meal: &mut NewMeal) -> Result<()> {
        let non_empty = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .map(|v| (!v.is_empty()).then(|| v.to_string()))
        };
        if let Some(staple) = non_empty(&self.staple) {
            meal.staple = staple;
        }
        if let Some(book) = non_empty(&self.book) {
            meal.book = book;
        }
        if let Some(page) = non_empty(&self.page) {
            meal.page = page;
        }
        if let Some(website) = non_empty(&self.website) {
            meal.website = website;
        }
        for category in Category::ALL {
            if let Some(bucket) = self.bucket(category)? {
                *meal.ingredients.get_mut(category) = bucket;
            }
        }
        if let Some(tags) = self.tags()? {
            meal.tags = tags;
        }
        Ok(())
    }
}

fn editable(meal: &Meal) -> NewMeal {
    NewMeal {
        name: meal.name.clone(),
        staple: meal.staple.clone(),
        book: meal.book.clone(),
        page: meal.page.clone(),
        website: meal.website.clone(),
        ingredients: meal.ingredients.clone(),
        tags: meal.tags.clone(),
    }
}

fn tag_list(meal: &Meal) -> String {
    meal.tags
        .iter()
        .map(|t| t.label())
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn cmd_meal_add(
    planner: &Planner,
    name: &str,
    fields: &IngredientArgs,
    json: bool,
) -> Result<()> {
    let mut meal = NewMeal {
        name: name.to_string(),
        ..NewMeal::default()
    };
    fields.apply(&mut meal)?;
    let meal = planner.db().insert_meal(&meal)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
    } else {
        let count: usize = Category::ALL
            .iter()
            .map(|&c| meal.ingredients.get(c).len())
            .sum();
        println!("Added meal '{}' with {count} ingredients", meal.name);
    }
    Ok(())
}

pub(crate) fn cmd_meal_edit(
    planner: &Planner,
    name: &str,
    rename: Option<String>,
    fields: &IngredientArgs,
    json: bool,
) -> Result<()> {
    let Some(existing) = planner.db().get_meal(name)? else {
        exit_not_found(&format!("Meal '{name}' not found"), json);
    };
    let mut meal = editable(&existing);
    if let Some(new_name) = rename {
        meal.name = new_name;
    }
    fields.apply(&mut meal)?;

    let Some(updated) = planner.db().update_meal(name, &meal)? else {
        exit_not_found(&format!("Meal '{name}' not found"), json);
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&updated)?);
    } else if updated.name == name {
        println!("Updated meal '{name}'");
    } else {
        println!("Updated meal '{name}' (now '{}')", updated.name);
    }
    Ok(())
}

pub(crate) fn cmd_meal_show(planner: &Planner, name: &str, json: bool) -> Result<()> {
    let Some(view) = planner.meal_view(name)? else {
        exit_not_found(&format!("Meal '{name}' not found"), json);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("{}", view.name);
    if let Some(staple) = &view.staple {
        println!("  Staple:    {staple}");
    }
    let source = view.source.label();
    if !source.is_empty() {
        println!("  Source:    {source}");
    }
    if !view.tags.is_empty() {
        println!("  Tags:      {}", view.tags.join(", "));
    }
    match view.last_made {
        Some(date) => println!("  Last made: {date}"),
        None => println!("  Last made: never"),
    }
    print_category_table(&view.categories);
    Ok(())
}

pub(crate) fn cmd_meal_list(planner: &Planner, by_staple: bool, json: bool) -> Result<()> {
    if by_staple {
        let grouped = planner.db().meals_by_staple()?;
        if json {
            println!("{}", serde_json::to_string_pretty(&grouped)?);
        } else if grouped.is_empty() {
            eprintln!("No meals yet. Use `thali meal add` or `thali catalog import`.");
        } else {
            for (staple, names) in &grouped {
                println!("{staple}");
                for name in names {
                    println!("  {name}");
                }
            }
        }
        return Ok(());
    }

    let meals = planner.db().list_meals()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
    } else if meals.is_empty() {
        eprintln!("No meals yet. Use `thali meal add` or `thali catalog import`.");
    } else {
        print_meal_table(&meals);
    }
    Ok(())
}

fn print_meal_table(meals: &[Meal]) {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Staple")]
        staple: String,
        #[tabled(rename = "Source")]
        source: String,
        #[tabled(rename = "Tags")]
        tags: String,
        #[tabled(rename = "Last made")]
        last_made: String,
    }

    let rows: Vec<MealRow> = meals
        .iter()
        .map(|m| MealRow {
            name: truncate(&m.name, 35),
            staple: m.staple.clone().unwrap_or_default(),
            source: truncate(&m.source().label(), 40),
            tags: tag_list(m),
            last_made: m
                .last_made
                .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d").to_string()),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn cmd_meal_delete(planner: &Planner, names: &[String], json: bool) -> Result<()> {
    let removed = planner.db().delete_meals(names)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": removed }));
    } else {
        println!("Deleted {removed} of {} meals", names.len());
    }
    Ok(())
}

pub(crate) fn cmd_meal_search(
    planner: &Planner,
    ingredient: &str,
    category: Option<&str>,
    json: bool,
) -> Result<()> {
    let names = match category {
        Some(c) => {
            let choice = IngredientChoice::new(Category::parse(c)?, ingredient.trim());
            planner.db().search_by_ingredient(&choice)?
        }
        None => planner.db().search_any_category(ingredient.trim())?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else if names.is_empty() {
        eprintln!("No meals use '{ingredient}'");
    } else {
        for name in &names {
            println!("{name}");
        }
    }
    Ok(())
}

pub(crate) fn cmd_meal_inspire(planner: &Planner, tag: &str, json: bool) -> Result<()> {
    let tag = Tag::parse(tag)?;
    let meals = planner.db().meals_with_tag(tag)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
    } else if meals.is_empty() {
        eprintln!("No meals tagged {}", tag.label());
    } else {
        print_meal_table(&meals);
    }
    Ok(())
}
