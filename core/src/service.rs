use std::path::Path;

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;

use crate::catalog::Category;
use crate::db::Database;
use crate::error::{PlanError, QuantityPolicy};
use crate::models::{Ingredients, Selection, Source};
use crate::plan::{self, MealPlan, PlanInput};
use crate::store::{MemoryPlanStore, PlanStore, SavedPlan};
use crate::units;

/// Heading of the single section shown when a plan has no per-meal breakdown.
pub const COMBINED_SECTION: &str = "Meal Plan";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewLine {
    pub ingredient: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryLines {
    pub category: Category,
    pub lines: Vec<ViewLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanSection {
    pub name: String,
    pub source: String,
    pub categories: Vec<CategoryLines>,
}

/// A plan ready for display: quantities carry their units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanView {
    pub sections: Vec<PlanSection>,
    pub totals: Vec<CategoryLines>,
    pub extras: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MealView {
    pub name: String,
    pub staple: Option<String>,
    pub source: Source,
    pub tags: Vec<String>,
    pub last_made: Option<NaiveDate>,
    pub categories: Vec<CategoryLines>,
}

/// What a user picked from the combined plan/meal chooser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum LoadTarget {
    Plan(String),
    Meal(String),
}

impl LoadTarget {
    /// `plan:<name>` and `meal:<name>` are explicit. A bare name is a saved
    /// plan if one exists with that name, otherwise a meal.
    pub fn parse(selected: &str, saved_plans: &[String]) -> Option<Self> {
        let selected = selected.trim();
        if let Some(name) = selected.strip_prefix("plan:") {
            return Some(LoadTarget::Plan(name.trim().to_string()));
        }
        if let Some(name) = selected.strip_prefix("meal:") {
            return Some(LoadTarget::Meal(name.trim().to_string()));
        }
        if selected.is_empty() {
            return None;
        }
        if saved_plans.iter().any(|p| p == selected) {
            Some(LoadTarget::Plan(selected.to_string()))
        } else {
            Some(LoadTarget::Meal(selected.to_string()))
        }
    }

    pub fn name(&self) -> &str {
        match self {
            LoadTarget::Plan(n) | LoadTarget::Meal(n) => n,
        }
    }
}

fn shopping_lines(ingredients: &Ingredients) -> Vec<CategoryLines> {
    Category::ALL
        .into_iter()
        .filter(|&c| !ingredients.get(c).is_empty())
        .map(|category| CategoryLines {
            category,
            lines: units::format_bucket(category, ingredients.get(category))
                .into_iter()
                .map(|(ingredient, amount)| ViewLine { ingredient, amount })
                .collect(),
        })
        .collect()
}

/// Like [`shopping_lines`] but with each ingredient's catalog unit.
fn catalog_unit_lines(ingredients: &Ingredients) -> Vec<CategoryLines> {
    Category::ALL
        .into_iter()
        .filter(|&c| !ingredients.get(c).is_empty())
        .map(|category| CategoryLines {
            category,
            lines: ingredients
                .get(category)
                .iter()
                .map(|(name, quantity)| ViewLine {
                    ingredient: name.clone(),
                    amount: units::format_with_catalog_unit(name, quantity),
                })
                .collect(),
        })
        .collect()
}

pub struct Planner {
    db: Database,
    plans: Box<dyn PlanStore>,
    policy: QuantityPolicy,
}

impl Planner {
    pub fn new(db: Database, plans: Box<dyn PlanStore>) -> Self {
        Self {
            db,
            plans,
            policy: QuantityPolicy::default(),
        }
    }

    pub fn open(db_path: &Path, plans: Box<dyn PlanStore>) -> Result<Self> {
        Ok(Self::new(Database::open(db_path)?, plans))
    }

    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::new(
            Database::open_in_memory()?,
            Box::new(MemoryPlanStore::new()),
        ))
    }

    #[must_use]
    pub fn with_policy(mut self, policy: QuantityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    // --- Plans ---

    /// Scale and merge the selected meals. Names not in the store are skipped.
    pub fn create_plan(&self, selection: &Selection, extras: &[String]) -> Result<MealPlan> {
        if selection.is_empty() {
            return Err(PlanError::EmptySelection.into());
        }
        let mut inputs = Vec::with_capacity(selection.meals.len());
        for selected in &selection.meals {
            match self.db.get_meal_ingredients(&selected.name)? {
                Some(ingredients) => inputs.push(PlanInput {
                    name: selected.name.clone(),
                    ingredients,
                    multiplier: selected.multiplier,
                }),
                None => tracing::debug!(meal = %selected.name, "skipping unknown meal"),
            }
        }
        let plan = plan::build_plan(&inputs, extras, self.policy)?;
        tracing::debug!(meals = plan.meals.len(), "built meal plan");
        Ok(plan)
    }

    pub fn plan_for_meal(&self, name: &str) -> Result<Option<MealPlan>> {
        Ok(self
            .db
            .get_meal_ingredients(name)?
            .map(|ingredients| plan::plan_for_meal(name, &ingredients)))
    }

    pub fn save_plan(&self, plan: &MealPlan, name: Option<&str>) -> Result<SavedPlan> {
        self.plans.put(plan, name)
    }

    pub fn list_saved_plans(&self) -> Result<Vec<String>> {
        self.plans.list()
    }

    pub fn load_plan(&self, name: &str) -> Result<Option<MealPlan>> {
        self.plans.get(name)
    }

    pub fn delete_plans(&self, names: &[String]) -> Result<usize> {
        self.plans.delete(names)
    }

    /// Resolve a chooser selection and load whatever it names.
    pub fn load(&self, selected: &str) -> Result<Option<(LoadTarget, MealPlan)>> {
        let saved = self.list_saved_plans()?;
        let Some(target) = LoadTarget::parse(selected, &saved) else {
            return Ok(None);
        };
        let plan = match &target {
            LoadTarget::Plan(name) => self.load_plan(name)?,
            LoadTarget::Meal(name) => self.plan_for_meal(name)?,
        };
        Ok(plan.map(|p| (target, p)))
    }

    /// Record `date` as the last time each meal in the plan was made.
    pub fn mark_made(&self, plan: &MealPlan, date: NaiveDate) -> Result<usize> {
        self.db.update_last_made(&plan.meals, date)
    }

    // --- Views ---

    /// One section per meal in meal-list order. Meals missing from the
    /// breakdown are left out; if none remain, the totals are shown as one
    /// combined section instead.
    pub fn plan_view(&self, plan: &MealPlan) -> Result<PlanView> {
        let mut sections = Vec::new();
        for name in &plan.meals {
            let Some(breakdown) = plan.breakdown(name) else {
                continue;
            };
            let source = self
                .db
                .get_meal(name)?
                .map(|m| m.source().label())
                .unwrap_or_default();
            sections.push(PlanSection {
                name: name.clone(),
                source,
                categories: shopping_lines(&breakdown.ingredients),
            });
        }
        let totals = shopping_lines(&plan.totals);
        if sections.is_empty() {
            sections.push(PlanSection {
                name: COMBINED_SECTION.to_string(),
                source: String::new(),
                categories: totals.clone(),
            });
        }
        Ok(PlanView {
            sections,
            totals,
            extras: plan.extras.clone(),
        })
    }

    pub fn meal_view(&self, name: &str) -> Result<Option<MealView>> {
        let Some(meal) = self.db.get_meal(name)? else {
            return Ok(None);
        };
        Ok(Some(MealView {
            source: meal.source(),
            tags: meal.tags.iter().map(|t| t.label().to_string()).collect(),
            categories: catalog_unit_lines(&meal.ingredients),
            name: meal.name,
            staple: meal.staple,
            last_made: meal.last_made,
        }))
    }
}
