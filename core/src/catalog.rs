//! Static ingredient reference data.
//!
//! Everything here is immutable and shared by reference: the per-category
//! ingredient tables with their display units, the gram-measured set used by
//! the shopping-list formatter, and the pick lists offered when adding meals.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Fresh,
    Tinned,
    Dry,
    Dairy,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Fresh,
        Category::Tinned,
        Category::Dry,
        Category::Dairy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Fresh => "fresh",
            Category::Tinned => "tinned",
            Category::Dry => "dry",
            Category::Dairy => "dairy",
        }
    }

    /// Column holding this bucket in the `meals` table.
    pub fn column(self) -> &'static str {
        match self {
            Category::Fresh => "fresh_ingredients",
            Category::Tinned => "tinned_ingredients",
            Category::Dry => "dry_ingredients",
            Category::Dairy => "dairy_ingredients",
        }
    }

    /// Key used for this bucket in saved plan documents and sample data.
    pub fn document_key(self) -> &'static str {
        match self {
            Category::Fresh => "Fresh_Ingredients",
            Category::Tinned => "Tinned_Ingredients",
            Category::Dry => "Dry_Ingredients",
            Category::Dairy => "Dairy_Ingredients",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Fresh => "Fresh",
            Category::Tinned => "Tinned",
            Category::Dry => "Dry",
            Category::Dairy => "Dairy",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fresh" => Ok(Category::Fresh),
            "tinned" | "tin" | "tins" => Ok(Category::Tinned),
            "dry" => Ok(Category::Dry),
            "dairy" => Ok(Category::Dairy),
            _ => bail!("Invalid category '{s}'. Must be one of: fresh, tinned, dry, dairy"),
        }
    }

    pub fn entries(self) -> &'static [(&'static str, Unit)] {
        match self {
            Category::Fresh => FRESH,
            Category::Tinned => TINNED,
            Category::Dry => DRY,
            Category::Dairy => DAIRY,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Grams,
    Millilitres,
    Tins,
    Teaspoons,
    Tablespoons,
    Pieces,
    Cloves,
    Bulbs,
}

impl Unit {
    pub fn suffix(self) -> &'static str {
        match self {
            Unit::Grams => "g",
            Unit::Millilitres => "ml",
            Unit::Tins => "tins",
            Unit::Teaspoons => "tsp",
            Unit::Tablespoons => "tbsp",
            Unit::Pieces => "pcs",
            Unit::Cloves => "cloves",
            Unit::Bulbs => "bulbs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub category: Category,
    pub unit: Unit,
}

pub const FRESH: &[(&str, Unit)] = &[
    ("Beans (Green)", Unit::Grams),
    ("Carrots", Unit::Grams),
    ("Cauliflower", Unit::Grams),
    ("Cilantro", Unit::Grams),
    ("Curry Leaves", Unit::Grams),
    ("Drumstick (Moringa)", Unit::Pieces),
    ("Garlic", Unit::Cloves),
    ("Ginger", Unit::Grams),
    ("Green Chilies", Unit::Pieces),
    ("Lemon", Unit::Pieces),
    ("Mint", Unit::Grams),
    ("Onions (Red)", Unit::Bulbs),
    ("Onions (White)", Unit::Bulbs),
    ("Peas", Unit::Grams),
    ("Peppers (Green)", Unit::Grams),
    ("Potatoes (Baking)", Unit::Grams),
    ("Potatoes (New)", Unit::Grams),
    ("Spinach", Unit::Grams),
    ("Tomatoes", Unit::Grams),
];

pub const TINNED: &[(&str, Unit)] = &[
    ("Chickpeas", Unit::Tins),
    ("Coconut Milk", Unit::Tins),
    ("Kidney Beans", Unit::Tins),
    ("Plum Tomatoes", Unit::Tins),
    ("Tamarind Paste", Unit::Tablespoons),
    ("Tomato Puree", Unit::Tablespoons),
];

pub const DRY: &[(&str, Unit)] = &[
    ("Basmati Rice", Unit::Grams),
    ("Biryani Masala", Unit::Teaspoons),
    ("Bread Rolls", Unit::Pieces),
    ("Cashew Nuts", Unit::Grams),
    ("Chole Masala", Unit::Teaspoons),
    ("Coriander Powder", Unit::Teaspoons),
    ("Cumin Seeds", Unit::Teaspoons),
    ("Flour (Maida)", Unit::Grams),
    ("Gram Flour (Besan)", Unit::Grams),
    ("Idli Rava", Unit::Grams),
    ("Masoor Dal", Unit::Grams),
    ("Mustard Seeds", Unit::Teaspoons),
    ("Peanuts", Unit::Grams),
    ("Poha (Flattened Rice)", Unit::Grams),
    ("Rajma Masala", Unit::Teaspoons),
    ("Sambar Powder", Unit::Teaspoons),
    ("Semolina", Unit::Grams),
    ("Toor Dal", Unit::Grams),
    ("Turmeric", Unit::Teaspoons),
    ("Whole Spices (Pulao Mix)", Unit::Teaspoons),
    ("Whole Wheat Flour", Unit::Grams),
];

pub const DAIRY: &[(&str, Unit)] = &[
    ("Butter", Unit::Grams),
    ("Cream", Unit::Millilitres),
    ("Ghee", Unit::Grams),
    ("Paneer", Unit::Grams),
    ("Yogurt", Unit::Millilitres),
];

/// Ingredients the shopping list always shows in grams, whatever the category.
pub const GRAM_MEASURED: &[&str] = &[
    "Basmati Rice",
    "Beans (Green)",
    "Butter",
    "Carrots",
    "Cashew Nuts",
    "Cauliflower",
    "Cilantro",
    "Curry Leaves",
    "Flour (Maida)",
    "Ghee",
    "Ginger",
    "Gram Flour (Besan)",
    "Masoor Dal",
    "Mint",
    "Paneer",
    "Peanuts",
    "Peas",
    "Peppers (Green)",
    "Poha (Flattened Rice)",
    "Potatoes (Baking)",
    "Potatoes (New)",
    "Semolina",
    "Spinach",
    "Tomatoes",
    "Toor Dal",
    "Whole Wheat Flour",
];

pub const ONIONS: &[&str] = &["Onions (Red)", "Onions (White)"];

/// Pantry staples that can ride along with a plan without belonging to a meal.
pub const EXTRAS: &[&str] = &[
    "Bay Leaves",
    "Black Pepper",
    "Cardamom Pods",
    "Chaat Masala",
    "Cinnamon Sticks",
    "Cloves",
    "Coffee",
    "Cooking Oil",
    "Coriander Powder",
    "Corn Flour",
    "Cumin Powder",
    "Curry Powder",
    "Fenugreek Leaves (Kasuri Methi)",
    "Fenugreek Seeds",
    "Garam Masala",
    "Jaggery",
    "Papad",
    "Pickle",
    "Red Chilli Powder",
    "Rice Flour",
    "Salt",
    "Sugar",
    "Tamarind",
    "Tea Leaves",
];

pub const STAPLES: &[&str] = &["Bread", "Cereal", "Rice"];

pub const BOOKS: &[&str] = &["Home", "Sanjeev Kapoor", "Tarla Dalal"];

pub fn is_gram_measured(name: &str) -> bool {
    GRAM_MEASURED.contains(&name)
}

pub fn is_onion(name: &str) -> bool {
    ONIONS.contains(&name)
}

/// Find an ingredient in any category. Names are matched exactly.
pub fn lookup(name: &str) -> Option<CatalogEntry> {
    Category::ALL.iter().find_map(|&category| {
        category
            .entries()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|&(name, unit)| CatalogEntry {
                name,
                category,
                unit,
            })
    })
}

pub fn unit_for(name: &str) -> Option<Unit> {
    lookup(name).map(|e| e.unit)
}

pub fn entries() -> impl Iterator<Item = CatalogEntry> {
    Category::ALL.into_iter().flat_map(|category| {
        category.entries().iter().map(move |&(name, unit)| CatalogEntry {
            name,
            category,
            unit,
        })
    })
}
