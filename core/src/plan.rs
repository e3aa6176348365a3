//! Quantity scaling and shopping-list aggregation.
//!
//! A plan is built in two passes: every selected meal's buckets are scaled by
//! its serving multiplier (kept as the per-meal breakdown), then the scaled
//! buckets are merged into per-category totals.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

use crate::catalog::Category;
use crate::error::{PlanError, QuantityPolicy};
use crate::models::{Bucket, Ingredients, Quantity};

/// One meal's scaled ingredients inside a plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MealBreakdown {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(flatten)]
    pub ingredients: Ingredients,
}

/// An aggregated shopping list. This is also the saved plan document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MealPlan {
    #[serde(flatten)]
    pub totals: Ingredients,
    #[serde(rename = "Extra_Ingredients")]
    pub extras: Vec<String>,
    #[serde(rename = "Meal_List")]
    pub meals: Vec<String>,
    #[serde(rename = "Per_Meal_Ingredients")]
    pub per_meal: Vec<MealBreakdown>,
}

impl MealPlan {
    /// Rebuild a plan from any JSON value without validating it.
    ///
    /// Missing or wrong-typed keys come back as empty collections, so legacy
    /// files without a breakdown and foreign documents both load.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let per_meal = value
            .get("Per_Meal_Ingredients")
            .and_then(serde_json::Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.is_object())
                    .map(|e| MealBreakdown {
                        name: e
                            .get("Name")
                            .and_then(serde_json::Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        ingredients: Ingredients::from_json(e),
                    })
                    .collect()
            })
            .unwrap_or_default();

        MealPlan {
            totals: Ingredients::from_json(value),
            extras: string_list(value.get("Extra_Ingredients")),
            meals: string_list(value.get("Meal_List")),
            per_meal,
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(text).context("Saved plan is not valid JSON")?;
        Ok(Self::from_json(&value))
    }

    pub fn breakdown(&self, meal: &str) -> Option<&MealBreakdown> {
        self.per_meal.iter().find(|m| m.name == meal)
    }

    pub fn is_empty(&self) -> bool {
        self.meals.is_empty() && self.totals.is_empty() && self.extras.is_empty()
    }
}

impl<'de> Deserialize<'de> for MealPlan {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(MealPlan::from_json(&value))
    }
}

fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(serde_json::Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(serde_json::Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// --- Scaling ---

/// Multiply every quantity in `bucket` by `multiplier` (0 counts as 1).
pub fn scale_bucket(
    bucket: &Bucket,
    multiplier: u32,
    policy: QuantityPolicy,
) -> Result<Bucket, PlanError> {
    let factor = f64::from(multiplier.max(1));
    let mut scaled = Bucket::new();
    for (name, quantity) in bucket {
        if let Some(v) = quantity.as_f64() {
            scaled.insert(name.clone(), Quantity::Number(v * factor));
            continue;
        }
        match policy {
            QuantityPolicy::Drop => {
                tracing::debug!(ingredient = %name, value = %quantity, "dropping non-numeric quantity");
            }
            QuantityPolicy::Reject => {
                return Err(PlanError::MalformedQuantity {
                    ingredient: name.clone(),
                    value: quantity.to_string(),
                });
            }
        }
    }
    Ok(scaled)
}

pub fn scale_ingredients(
    ingredients: &Ingredients,
    multiplier: u32,
    policy: QuantityPolicy,
) -> Result<Ingredients, PlanError> {
    let mut scaled = Ingredients::default();
    for category in Category::ALL {
        *scaled.get_mut(category) = scale_bucket(ingredients.get(category), multiplier, policy)?;
    }
    Ok(scaled)
}

// --- Aggregation ---

/// Round to two decimal places, halves away from zero.
pub fn round2(v: f64) -> f64 {
    let r = (v * 100.0).round() / 100.0;
    if r == 0.0 { 0.0 } else { r }
}

/// Sum quantities per category and ingredient name across `buckets`.
pub fn aggregate<'a, I>(buckets: I) -> Ingredients
where
    I: IntoIterator<Item = &'a Ingredients>,
{
    let mut sums: BTreeMap<Category, BTreeMap<String, f64>> = BTreeMap::new();
    for ingredients in buckets {
        for category in Category::ALL {
            let totals = sums.entry(category).or_default();
            for (name, quantity) in ingredients.get(category) {
                let Some(v) = quantity.as_f64() else {
                    tracing::debug!(ingredient = %name, value = %quantity, "skipping non-numeric quantity");
                    continue;
                };
                *totals.entry(name.clone()).or_insert(0.0) += v;
            }
        }
    }

    let mut merged = Ingredients::default();
    for (category, totals) in sums {
        *merged.get_mut(category) = totals
            .into_iter()
            .map(|(name, sum)| (name, Quantity::Number(round2(sum))))
            .collect();
    }
    merged
}

/// One selected meal as fetched from the store.
#[derive(Debug, Clone)]
pub struct PlanInput {
    pub name: String,
    pub ingredients: Ingredients,
    pub multiplier: u32,
}

/// Scale each meal, keep the scaled buckets as the breakdown, and merge them.
pub fn build_plan(
    meals: &[PlanInput],
    extras: &[String],
    policy: QuantityPolicy,
) -> Result<MealPlan, PlanError> {
    let per_meal = meals
        .iter()
        .map(|m| {
            Ok(MealBreakdown {
                name: m.name.clone(),
                ingredients: scale_ingredients(&m.ingredients, m.multiplier, policy)?,
            })
        })
        .collect::<Result<Vec<_>, PlanError>>()?;

    let totals = aggregate(per_meal.iter().map(|m| &m.ingredients));

    Ok(MealPlan {
        totals,
        extras: clean_extras(extras),
        meals: meals.iter().map(|m| m.name.clone()).collect(),
        per_meal,
    })
}

fn clean_extras(extras: &[String]) -> Vec<String> {
    extras
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty() && !e.eq_ignore_ascii_case("null"))
        .map(str::to_string)
        .collect()
}

/// A single meal shown through the plan display path, unscaled.
pub fn plan_for_meal(name: &str, ingredients: &Ingredients) -> MealPlan {
    MealPlan {
        totals: ingredients.clone(),
        extras: Vec::new(),
        meals: vec![name.to_string()],
        per_meal: vec![MealBreakdown {
            name: name.to_string(),
            ingredients: ingredients.clone(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(pairs: &[(&str, Quantity)]) -> Bucket {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn fresh(pairs: &[(&str, Quantity)]) -> Ingredients {
        Ingredients {
            fresh: bucket(pairs),
            ..Ingredients::default()
        }
    }

    fn input(name: &str, ingredients: Ingredients, multiplier: u32) -> PlanInput {
        PlanInput {
            name: name.to_string(),
            ingredients,
            multiplier,
        }
    }

    #[test]
    fn test_scale_by_one_is_identity_minus_non_numeric() {
        let b = bucket(&[
            ("Tomatoes", Quantity::Number(100.0)),
            ("Peas", Quantity::from("75")),
            ("Mint", Quantity::from("a handful")),
        ]);
        let scaled = scale_bucket(&b, 1, QuantityPolicy::Drop).unwrap();
        assert_eq!(scaled.len(), 2);
        assert_eq!(scaled["Tomatoes"], Quantity::Number(100.0));
        assert_eq!(scaled["Peas"], Quantity::Number(75.0));
        assert!(!scaled.contains_key("Mint"));
    }

    #[test]
    fn test_scaling_is_multiplicatively_consistent() {
        let b = bucket(&[("Ginger", Quantity::Number(12.5)), ("Garlic", Quantity::from("3"))]);
        let direct = scale_bucket(&b, 3, QuantityPolicy::Drop).unwrap();
        let twice = scale_bucket(&direct, 1, QuantityPolicy::Drop).unwrap();
        assert_eq!(direct, twice);
        assert_eq!(direct["Ginger"], Quantity::Number(37.5));
        assert_eq!(direct["Garlic"], Quantity::Number(9.0));
    }

    #[test]
    fn test_zero_multiplier_counts_as_one() {
        let b = bucket(&[("Spinach", Quantity::Number(200.0))]);
        let scaled = scale_bucket(&b, 0, QuantityPolicy::Drop).unwrap();
        assert_eq!(scaled["Spinach"], Quantity::Number(200.0));
    }

    #[test]
    fn test_reject_policy_reports_malformed_quantity() {
        let b = bucket(&[("Lemon", Quantity::from("half"))]);
        let err = scale_bucket(&b, 2, QuantityPolicy::Reject).unwrap_err();
        assert_eq!(
            err,
            PlanError::MalformedQuantity {
                ingredient: "Lemon".to_string(),
                value: "half".to_string(),
            }
        );
    }

    #[test]
    fn test_tomato_scenario() {
        let meals = [
            input("A", fresh(&[("Tomatoes", Quantity::Number(100.0))]), 2),
            input("B", fresh(&[("Tomatoes", Quantity::Number(50.0))]), 1),
        ];
        let plan = build_plan(&meals, &[], QuantityPolicy::Drop).unwrap();
        assert_eq!(plan.totals.fresh["Tomatoes"], Quantity::Number(250.0));
        assert_eq!(plan.meals, vec!["A", "B"]);
        // Breakdown keeps each meal's own scaled amounts.
        assert_eq!(
            plan.breakdown("A").unwrap().ingredients.fresh["Tomatoes"],
            Quantity::Number(200.0)
        );
        assert_eq!(
            plan.breakdown("B").unwrap().ingredients.fresh["Tomatoes"],
            Quantity::Number(50.0)
        );
    }

    #[test]
    fn test_aggregate_sums_match_contributions() {
        let a = Ingredients {
            fresh: bucket(&[("Carrots", Quantity::Number(120.0))]),
            dry: bucket(&[("Turmeric", Quantity::Number(0.5))]),
            ..Ingredients::default()
        };
        let b = Ingredients {
            fresh: bucket(&[("Carrots", Quantity::Number(80.0)), ("Peas", Quantity::Number(40.0))]),
            dry: bucket(&[("Turmeric", Quantity::Number(1.25))]),
            ..Ingredients::default()
        };
        let forward = aggregate([&a, &b]);
        let backward = aggregate([&b, &a]);
        assert_eq!(forward, backward);
        assert_eq!(forward.fresh["Carrots"], Quantity::Number(200.0));
        assert_eq!(forward.fresh["Peas"], Quantity::Number(40.0));
        assert_eq!(forward.dry["Turmeric"], Quantity::Number(1.75));
        assert!(forward.dairy.is_empty());
    }

    #[test]
    fn test_aggregate_skips_non_numeric_entries() {
        let a = fresh(&[("Cilantro", Quantity::from("some")), ("Mint", Quantity::from("10"))]);
        let merged = aggregate([&a]);
        assert_eq!(merged.fresh.len(), 1);
        assert_eq!(merged.fresh["Mint"], Quantity::Number(10.0));
    }

    #[test]
    fn test_rounding_is_half_away_from_zero() {
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(-0.125), -0.13);
        assert_eq!(round2(0.1 + 0.2), 0.3);
        assert_eq!(round2(1.0 / 3.0), 0.33);
        assert_eq!(round2(-0.001), 0.0);
    }

    #[test]
    fn test_whole_totals_serialize_as_integers() {
        let a = fresh(&[("Lemon", Quantity::Number(0.5))]);
        let b = fresh(&[("Lemon", Quantity::Number(0.5))]);
        let merged = aggregate([&a, &b]);
        let json = serde_json::to_value(&merged).unwrap();
        assert_eq!(json["Fresh_Ingredients"]["Lemon"], serde_json::json!(1));
        assert!(json["Fresh_Ingredients"]["Lemon"].is_i64());
    }

    #[test]
    fn test_zero_meals_yield_empty_plan() {
        let plan = build_plan(&[], &[], QuantityPolicy::Drop).unwrap();
        assert!(plan.totals.is_empty());
        assert!(plan.meals.is_empty());
        assert!(plan.per_meal.is_empty());
    }

    #[test]
    fn test_extras_are_cleaned_not_scaled() {
        let meals = [input("A", Ingredients::default(), 4)];
        let extras = vec![" Salt ".to_string(), "null".to_string(), String::new(), "Sugar".to_string()];
        let plan = build_plan(&meals, &extras, QuantityPolicy::Drop).unwrap();
        assert_eq!(plan.extras, vec!["Salt", "Sugar"]);
    }

    #[test]
    fn test_plan_for_meal_keeps_raw_quantities() {
        let ingredients = Ingredients {
            tinned: bucket(&[("Chickpeas", Quantity::from("1"))]),
            ..Ingredients::default()
        };
        let plan = plan_for_meal("Chana Masala", &ingredients);
        assert_eq!(plan.meals, vec!["Chana Masala"]);
        assert!(plan.extras.is_empty());
        assert_eq!(plan.totals, ingredients);
        assert_eq!(plan.per_meal[0].ingredients, ingredients);
    }

    #[test]
    fn test_plan_document_keys() {
        let meals = [input("A", fresh(&[("Tomatoes", Quantity::Number(100.0))]), 1)];
        let plan = build_plan(&meals, &["Salt".to_string()], QuantityPolicy::Drop).unwrap();
        let json = serde_json::to_value(&plan).unwrap();
        for key in [
            "Fresh_Ingredients",
            "Tinned_Ingredients",
            "Dry_Ingredients",
            "Dairy_Ingredients",
            "Extra_Ingredients",
            "Meal_List",
            "Per_Meal_Ingredients",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["Per_Meal_Ingredients"][0]["Name"], "A");
        assert_eq!(json["Per_Meal_Ingredients"][0]["Fresh_Ingredients"]["Tomatoes"], 100);
    }

    #[test]
    fn test_from_json_defaults_missing_and_wrong_typed_keys() {
        let value = serde_json::json!({
            "Fresh_Ingredients": {"Tomatoes": 250, "Mint": "10", "Bad": null},
            "Tinned_Ingredients": [1, 2, 3],
            "Meal_List": "not a list",
            "Per_Meal_Ingredients": [42, {"Name": "A", "Dry_Ingredients": {"Peanuts": 50}}]
        });
        let plan = MealPlan::from_json(&value);
        assert_eq!(plan.totals.fresh.len(), 2);
        assert!(plan.totals.tinned.is_empty());
        assert!(plan.meals.is_empty());
        assert!(plan.extras.is_empty());
        assert_eq!(plan.per_meal.len(), 1);
        assert_eq!(plan.per_meal[0].ingredients.dry["Peanuts"], Quantity::Number(50.0));
    }

    #[test]
    fn test_from_json_str_rejects_non_json() {
        assert!(MealPlan::from_json_str("not json at all").is_err());
        let plan = MealPlan::from_json_str("{}").unwrap();
        assert!(plan.is_empty());
    }
}
