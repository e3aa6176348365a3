use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::catalog::Category;

/// One ingredient amount as stored in a bucket.
///
/// Meals entered through older forms carry quantities as text ("100"), so a
/// bucket value is either a number or the raw string it was saved as.
#[derive(Debug, Clone, PartialEq)]
pub enum Quantity {
    Number(f64),
    Text(String),
}

impl Quantity {
    /// Numeric value, parsing text the way a float literal would be parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Quantity::Number(v) => Some(*v),
            Quantity::Text(s) => s.trim().parse::<f64>().ok(),
        }
        .filter(|v| v.is_finite())
    }

    /// Build from an arbitrary JSON value. Only numbers and strings survive.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_f64().map(Quantity::Number),
            serde_json::Value::String(s) => Some(Quantity::Text(s.clone())),
            _ => None,
        }
    }
}

/// Whole values render without a fractional part: `250`, `0.5`, `2.35`.
pub fn format_number(v: f64) -> String {
    if is_whole(v) {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

pub(crate) fn is_whole(v: f64) -> bool {
    v.is_finite() && v.fract() == 0.0 && v.abs() < 9.0e15
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Number(v) => f.write_str(&format_number(*v)),
            Quantity::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Quantity::Number(v) if is_whole(*v) => serializer.serialize_i64(*v as i64),
            Quantity::Number(v) => serializer.serialize_f64(*v),
            Quantity::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(v) => Quantity::Number(v),
            Raw::Text(s) => Quantity::Text(s),
        })
    }
}

impl From<f64> for Quantity {
    fn from(v: f64) -> Self {
        Quantity::Number(v)
    }
}

impl From<&str> for Quantity {
    fn from(s: &str) -> Self {
        Quantity::Text(s.to_string())
    }
}

/// Ingredient name → quantity for one category.
pub type Bucket = BTreeMap<String, Quantity>;

/// Parse a bucket column. Null, empty and the literal `"null"` are an empty
/// bucket; so is anything that is not a JSON object.
pub fn parse_bucket(raw: Option<&str>) -> Bucket {
    let Some(text) = raw.map(str::trim) else {
        return Bucket::new();
    };
    if text.is_empty() || text == "null" {
        return Bucket::new();
    }
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => bucket_from_json(&value),
        Err(e) => {
            tracing::warn!("ignoring malformed ingredient column: {e}");
            Bucket::new()
        }
    }
}

/// Lenient conversion used for stored columns and saved plan documents.
pub fn bucket_from_json(value: &serde_json::Value) -> Bucket {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| Quantity::from_json(v).map(|q| (k.clone(), q)))
                .collect()
        })
        .unwrap_or_default()
}

/// The four ingredient buckets of a meal or a plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ingredients {
    #[serde(rename = "Fresh_Ingredients", default)]
    pub fresh: Bucket,
    #[serde(rename = "Tinned_Ingredients", default)]
    pub tinned: Bucket,
    #[serde(rename = "Dry_Ingredients", default)]
    pub dry: Bucket,
    #[serde(rename = "Dairy_Ingredients", default)]
    pub dairy: Bucket,
}

impl Ingredients {
    pub fn get(&self, category: Category) -> &Bucket {
        match category {
            Category::Fresh => &self.fresh,
            Category::Tinned => &self.tinned,
            Category::Dry => &self.dry,
            Category::Dairy => &self.dairy,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut Bucket {
        match category {
            Category::Fresh => &mut self.fresh,
            Category::Tinned => &mut self.tinned,
            Category::Dry => &mut self.dry,
            Category::Dairy => &mut self.dairy,
        }
    }

    pub fn is_empty(&self) -> bool {
        Category::ALL.iter().all(|&c| self.get(c).is_empty())
    }

    pub fn contains(&self, category: Category, name: &str) -> bool {
        self.get(category).contains_key(name)
    }

    /// Read the four document keys out of a JSON object, defaulting each one.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let mut ingredients = Ingredients::default();
        for category in Category::ALL {
            if let Some(v) = value.get(category.document_key()) {
                *ingredients.get_mut(category) = bucket_from_json(v);
            }
        }
        ingredients
    }
}

// --- Tags ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    #[serde(rename = "Spring/Summer")]
    SpringSummer,
    #[serde(rename = "Autumn/Winter")]
    AutumnWinter,
    #[serde(rename = "Quick/Easy")]
    QuickEasy,
    #[serde(rename = "Special")]
    Special,
}

impl Tag {
    pub const ALL: [Tag; 4] = [
        Tag::SpringSummer,
        Tag::AutumnWinter,
        Tag::QuickEasy,
        Tag::Special,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Tag::SpringSummer => "Spring/Summer",
            Tag::AutumnWinter => "Autumn/Winter",
            Tag::QuickEasy => "Quick/Easy",
            Tag::Special => "Special",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Tag::SpringSummer => "spring_summer",
            Tag::AutumnWinter => "autumn_winter",
            Tag::QuickEasy => "quick_easy",
            Tag::Special => "special",
        }
    }

    /// Accepts the display label or the column-style spelling.
    pub fn parse(s: &str) -> Result<Self> {
        let norm = s.trim().to_lowercase().replace(['/', '-', ' '], "_");
        match norm.as_str() {
            "spring_summer" | "spring" | "summer" => Ok(Tag::SpringSummer),
            "autumn_winter" | "autumn" | "winter" => Ok(Tag::AutumnWinter),
            "quick_easy" | "quick" | "easy" => Ok(Tag::QuickEasy),
            "special" => Ok(Tag::Special),
            _ => bail!(
                "Invalid tag '{s}'. Must be one of: {}",
                Tag::ALL.map(Tag::label).join(", ")
            ),
        }
    }
}

// --- Meals ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Source {
    Website { url: String },
    Book { book: String, page: String },
    Unknown,
}

impl Source {
    /// Website wins when present; otherwise `"<book>, page <page>"`.
    pub fn from_parts(book: Option<&str>, page: Option<&str>, website: Option<&str>) -> Self {
        match website.map(str::trim).filter(|w| !w.is_empty()) {
            Some(url) => Source::Website {
                url: url.to_string(),
            },
            None => {
                let book = book.map(str::trim).unwrap_or_default();
                let page = page.map(str::trim).unwrap_or_default();
                if book.is_empty() && page.is_empty() {
                    Source::Unknown
                } else {
                    Source::Book {
                        book: book.to_string(),
                        page: page.to_string(),
                    }
                }
            }
        }
    }

    pub fn label(&self) -> String {
        match self {
            Source::Website { url } => url.clone(),
            Source::Book { book, page } => format!("{book}, page {page}"),
            Source::Unknown => String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Meal {
    pub id: i64,
    pub name: String,
    pub staple: Option<String>,
    pub book: Option<String>,
    pub page: Option<String>,
    pub website: Option<String>,
    pub ingredients: Ingredients,
    pub last_made: Option<NaiveDate>,
    pub tags: Vec<Tag>,
    pub created_at: String,
    pub updated_at: String,
}

impl Meal {
    pub fn source(&self) -> Source {
        Source::from_parts(
            self.book.as_deref(),
            self.page.as_deref(),
            self.website.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMeal {
    pub name: String,
    #[serde(default)]
    pub staple: Option<String>,
    #[serde(default)]
    pub book: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default, flatten)]
    pub ingredients: Ingredients,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

pub fn validate_meal_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bail!("Meal name must not be empty");
    }
    if trimmed.eq_ignore_ascii_case("null") {
        bail!("'{trimmed}' is not a usable meal name");
    }
    Ok(trimmed.to_string())
}

/// Meal shape used by the sample-data file and `catalog export`.
///
/// Reading is lenient: text fields may be null or numbers, and a bucket may
/// be null, a JSON object, or that object encoded as a string.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MealRecord {
    pub name: String,
    pub staple: String,
    pub book: String,
    pub page: String,
    pub website: String,
    #[serde(flatten)]
    pub ingredients: Ingredients,
}

fn record_text(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn record_bucket(value: Option<&serde_json::Value>) -> Bucket {
    match value {
        Some(serde_json::Value::String(s)) => parse_bucket(Some(s.as_str())),
        Some(v) => bucket_from_json(v),
        None => Bucket::new(),
    }
}

impl<'de> Deserialize<'de> for MealRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let Some(obj) = value.as_object() else {
            return Err(serde::de::Error::custom("meal record must be a JSON object"));
        };
        let mut ingredients = Ingredients::default();
        for category in Category::ALL {
            *ingredients.get_mut(category) = record_bucket(obj.get(category.document_key()));
        }
        Ok(MealRecord {
            name: record_text(obj.get("Name")),
            staple: record_text(obj.get("Staple")),
            book: record_text(obj.get("Book")),
            page: record_text(obj.get("Page")),
            website: record_text(obj.get("Website")),
            ingredients,
        })
    }
}

impl From<MealRecord> for NewMeal {
    fn from(r: MealRecord) -> Self {
        let non_empty = |s: String| if s.trim().is_empty() { None } else { Some(s) };
        NewMeal {
            name: r.name,
            staple: non_empty(r.staple),
            book: non_empty(r.book),
            page: non_empty(r.page),
            website: non_empty(r.website),
            ingredients: r.ingredients,
            tags: Vec::new(),
        }
    }
}

impl From<&Meal> for MealRecord {
    fn from(m: &Meal) -> Self {
        MealRecord {
            name: m.name.clone(),
            staple: m.staple.clone().unwrap_or_default(),
            book: m.book.clone().unwrap_or_default(),
            page: m.page.clone().unwrap_or_default(),
            website: m.website.clone().unwrap_or_default(),
            ingredients: m.ingredients.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub meals_inserted: usize,
    pub meals_updated: usize,
    pub meals_skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogRefresh {
    pub ingredients_added: usize,
    pub tags_added: usize,
}

// --- Search ---

/// The single ingredient a user searches by, tagged with its category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", content = "name", rename_all = "lowercase")]
pub enum IngredientChoice {
    Fresh(String),
    Tinned(String),
    Dry(String),
    Dairy(String),
}

impl IngredientChoice {
    pub fn new(category: Category, name: impl Into<String>) -> Self {
        let name = name.into();
        match category {
            Category::Fresh => IngredientChoice::Fresh(name),
            Category::Tinned => IngredientChoice::Tinned(name),
            Category::Dry => IngredientChoice::Dry(name),
            Category::Dairy => IngredientChoice::Dairy(name),
        }
    }

    pub fn category(&self) -> Category {
        match self {
            IngredientChoice::Fresh(_) => Category::Fresh,
            IngredientChoice::Tinned(_) => Category::Tinned,
            IngredientChoice::Dry(_) => Category::Dry,
            IngredientChoice::Dairy(_) => Category::Dairy,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            IngredientChoice::Fresh(n)
            | IngredientChoice::Tinned(n)
            | IngredientChoice::Dry(n)
            | IngredientChoice::Dairy(n) => n,
        }
    }
}

// --- Plan selection ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedMeal {
    pub name: String,
    pub multiplier: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub meals: Vec<SelectedMeal>,
}

/// Serving multiplier from user input. Missing, blank, non-integer and zero
/// all mean one serving.
pub fn parse_multiplier(raw: Option<&str>) -> u32 {
    raw.map(str::trim)
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(1)
}

impl Selection {
    /// Build from parallel name/quantity lists as a form submits them.
    ///
    /// Blank names and the placeholder `"null"` are dropped; missing
    /// quantities are padded with 1.
    pub fn from_form<S: AsRef<str>>(names: &[S], quantities: &[Option<S>]) -> Self {
        let names: Vec<&str> = names
            .iter()
            .map(|n| n.as_ref().trim())
            .filter(|n| !n.is_empty() && !n.eq_ignore_ascii_case("null"))
            .collect();
        let meals = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| SelectedMeal {
                name: name.to_string(),
                multiplier: parse_multiplier(
                    quantities
                        .get(idx)
                        .and_then(|q| q.as_ref().map(AsRef::<str>::as_ref)),
                ),
            })
            .collect();
        Selection { meals }
    }

    pub fn push(&mut self, name: impl Into<String>, multiplier: u32) {
        self.meals.push(SelectedMeal {
            name: name.into(),
            multiplier: multiplier.max(1),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.meals.is_empty()
    }
}
