use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use rusqlite::{Connection, OptionalExtension, params};

use crate::catalog::Category;
use crate::models::{
    Bucket, CatalogRefresh, ImportSummary, IngredientChoice, Ingredients, Meal, MealRecord,
    NewMeal, Tag, parse_bucket, validate_meal_name,
};

const MEAL_COLUMNS: &str = "id, name, staple, book, page, website,
    fresh_ingredients, tinned_ingredients, dry_ingredients, dairy_ingredients,
    last_made, spring_summer, autumn_winter, quick_easy, special,
    created_at, updated_at";

/// Meals with no staple are grouped under this key.
pub const NO_STAPLE: &str = "Other";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS meals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    staple TEXT,
                    book TEXT,
                    page TEXT,
                    website TEXT,
                    fresh_ingredients TEXT,
                    tinned_ingredients TEXT,
                    dry_ingredients TEXT,
                    dairy_ingredients TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_meals_staple ON meals(staple);

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            self.conn.execute_batch(
                "ALTER TABLE meals ADD COLUMN last_made TEXT;
                 ALTER TABLE meals ADD COLUMN spring_summer INTEGER NOT NULL DEFAULT 0;
                 ALTER TABLE meals ADD COLUMN autumn_winter INTEGER NOT NULL DEFAULT 0;
                 ALTER TABLE meals ADD COLUMN quick_easy INTEGER NOT NULL DEFAULT 0;
                 ALTER TABLE meals ADD COLUMN special INTEGER NOT NULL DEFAULT 0;
                 PRAGMA user_version = 2;",
            )?;
        }

        if version < 3 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS ingredients (
                    name TEXT PRIMARY KEY NOT NULL
                );

                CREATE TABLE IF NOT EXISTS tags (
                    name TEXT PRIMARY KEY NOT NULL
                );

                PRAGMA user_version = 3;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    // Expects MEAL_COLUMNS order.
    fn meal_from_row(row: &rusqlite::Row) -> rusqlite::Result<Meal> {
        let name: String = row.get(1)?;
        let mut ingredients = Ingredients::default();
        for (idx, category) in (6usize..).zip(Category::ALL) {
            let raw: Option<String> = row.get(idx)?;
            *ingredients.get_mut(category) = parse_bucket(raw.as_deref());
        }
        let last_made = row
            .get::<_, Option<String>>(10)?
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok());
        let mut tags = Vec::new();
        for (idx, tag) in (11usize..).zip(Tag::ALL) {
            if row.get::<_, Option<i64>>(idx)?.unwrap_or(0) != 0 {
                tags.push(tag);
            }
        }
        Ok(Meal {
            id: row.get(0)?,
            name,
            staple: row.get(2)?,
            book: row.get(3)?,
            page: row.get(4)?,
            website: row.get(5)?,
            ingredients,
            last_made,
            tags,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }

    fn bucket_json(bucket: &Bucket) -> Result<String> {
        serde_json::to_string(bucket).context("Failed to serialize ingredients")
    }

    fn tag_flags(tags: &[Tag]) -> [i64; 4] {
        Tag::ALL.map(|t| i64::from(tags.contains(&t)))
    }

    // --- Meals ---

    pub fn insert_meal(&self, meal: &NewMeal) -> Result<Meal> {
        let name = validate_meal_name(&meal.name)?;
        if self.meal_exists(&name)? {
            bail!("A meal named '{name}' already exists");
        }
        let now = Local::now().to_rfc3339();
        let [spring_summer, autumn_winter, quick_easy, special] = Self::tag_flags(&meal.tags);
        self.conn.execute(
            "INSERT INTO meals (name, staple, book, page, website,
                fresh_ingredients, tinned_ingredients, dry_ingredients, dairy_ingredients,
                spring_summer, autumn_winter, quick_easy, special, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                name,
                meal.staple,
                meal.book,
                meal.page,
                meal.website,
                Self::bucket_json(&meal.ingredients.fresh)?,
                Self::bucket_json(&meal.ingredients.tinned)?,
                Self::bucket_json(&meal.ingredients.dry)?,
                Self::bucket_json(&meal.ingredients.dairy)?,
                spring_summer,
                autumn_winter,
                quick_easy,
                special,
                now,
                now,
            ],
        )?;
        tracing::info!(meal = %name, "added meal");
        self.get_meal(&name)?
            .context("Meal disappeared after insert")
    }

    /// Replace every field of `original_name`, including its name.
    /// `last_made` is preserved. Returns `None` if the meal does not exist.
    pub fn update_meal(&self, original_name: &str, meal: &NewMeal) -> Result<Option<Meal>> {
        let name = validate_meal_name(&meal.name)?;
        if !self.meal_exists(original_name)? {
            return Ok(None);
        }
        if name != original_name && self.meal_exists(&name)? {
            bail!("A meal named '{name}' already exists");
        }
        let now = Local::now().to_rfc3339();
        let [spring_summer, autumn_winter, quick_easy, special] = Self::tag_flags(&meal.tags);
        self.conn.execute(
            "UPDATE meals SET name = ?1, staple = ?2, book = ?3, page = ?4, website = ?5,
                fresh_ingredients = ?6, tinned_ingredients = ?7, dry_ingredients = ?8,
                dairy_ingredients = ?9, spring_summer = ?10, autumn_winter = ?11,
                quick_easy = ?12, special = ?13, updated_at = ?14
             WHERE name = ?15",
            params![
                name,
                meal.staple,
                meal.book,
                meal.page,
                meal.website,
                Self::bucket_json(&meal.ingredients.fresh)?,
                Self::bucket_json(&meal.ingredients.tinned)?,
                Self::bucket_json(&meal.ingredients.dry)?,
                Self::bucket_json(&meal.ingredients.dairy)?,
                spring_summer,
                autumn_winter,
                quick_easy,
                special,
                now,
                original_name,
            ],
        )?;
        tracing::info!(meal = %name, previous = %original_name, "updated meal");
        self.get_meal(&name)
    }

    pub fn meal_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM meals WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_meal(&self, name: &str) -> Result<Option<Meal>> {
        let meal = self
            .conn
            .query_row(
                &format!("SELECT {MEAL_COLUMNS} FROM meals WHERE name = ?1"),
                params![name],
                Self::meal_from_row,
            )
            .optional()?;
        Ok(meal)
    }

    /// The four buckets of one meal, with malformed columns read as empty.
    pub fn get_meal_ingredients(&self, name: &str) -> Result<Option<Ingredients>> {
        Ok(self.get_meal(name)?.map(|m| m.ingredients))
    }

    /// All meals ordered by book, then page number, then name.
    pub fn list_meals(&self) -> Result<Vec<Meal>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals
             ORDER BY book IS NULL, book, CAST(page AS INTEGER), page, name"
        ))?;
        let meals = stmt
            .query_map([], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    pub fn meal_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM meals ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Meal names grouped by staple. Meals without one land under [`NO_STAPLE`].
    pub fn meals_by_staple(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT staple, name FROM meals ORDER BY name")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (staple, name) in rows {
            let staple = staple
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| NO_STAPLE.to_string());
            grouped.entry(staple).or_default().push(name);
        }
        Ok(grouped)
    }

    pub fn meals_with_tag(&self, tag: Tag) -> Result<Vec<Meal>> {
        // Column name comes from a closed enum, never from input.
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals WHERE {} != 0 ORDER BY name",
            tag.column()
        ))?;
        let meals = stmt
            .query_map([], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    fn bucket_column(&self, category: Category) -> Result<Vec<(String, Bucket)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT name, {} FROM meals ORDER BY name",
            category.column()
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .map(|(name, raw)| (name, parse_bucket(raw.as_deref())))
            .collect())
    }

    /// Names of meals whose bucket for the chosen category lists the ingredient.
    pub fn search_by_ingredient(&self, choice: &IngredientChoice) -> Result<Vec<String>> {
        Ok(self
            .bucket_column(choice.category())?
            .into_iter()
            .filter(|(_, bucket)| bucket.contains_key(choice.name()))
            .map(|(name, _)| name)
            .collect())
    }

    /// Like [`Database::search_by_ingredient`] but across every category.
    pub fn search_any_category(&self, ingredient: &str) -> Result<Vec<String>> {
        let mut names = BTreeSet::new();
        for category in Category::ALL {
            names.extend(self.search_by_ingredient(&IngredientChoice::new(category, ingredient))?);
        }
        Ok(names.into_iter().collect())
    }

    /// Every ingredient name some meal uses, per category.
    pub fn used_ingredients(&self) -> Result<BTreeMap<Category, BTreeSet<String>>> {
        let mut used = BTreeMap::new();
        for category in Category::ALL {
            let names: BTreeSet<String> = self
                .bucket_column(category)?
                .into_iter()
                .flat_map(|(_, bucket)| bucket.into_keys())
                .collect();
            used.insert(category, names);
        }
        Ok(used)
    }

    /// Set `last_made` on each named meal in one transaction. Unknown names
    /// are ignored; returns how many rows changed.
    pub fn update_last_made(&self, names: &[String], date: NaiveDate) -> Result<usize> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let now = Local::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        let mut touched = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE meals SET last_made = ?1, updated_at = ?2 WHERE name = ?3",
            )?;
            for name in names {
                touched += stmt.execute(params![date_str, now, name])?;
            }
        }
        tx.commit()?;
        tracing::info!(meals = touched, date = %date_str, "updated last made dates");
        Ok(touched)
    }

    pub fn delete_meals(&self, names: &[String]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM meals WHERE name = ?1")?;
            for name in names {
                removed += stmt.execute(params![name])?;
            }
        }
        tx.commit()?;
        if removed > 0 {
            tracing::info!(meals = removed, "deleted meals");
        }
        Ok(removed)
    }

    // --- Catalog tables ---

    /// Record the tag set and every ingredient used by a meal in the
    /// `tags`/`ingredients` tables. Existing rows are left alone.
    pub fn refresh_catalog(&self) -> Result<CatalogRefresh> {
        let used = self.used_ingredients()?;
        let tx = self.conn.unchecked_transaction()?;
        let mut summary = CatalogRefresh::default();
        {
            let mut insert_tag = tx.prepare("INSERT OR IGNORE INTO tags (name) VALUES (?1)")?;
            for tag in Tag::ALL {
                summary.tags_added += insert_tag.execute(params![tag.label()])?;
            }
            let mut insert_ingredient =
                tx.prepare("INSERT OR IGNORE INTO ingredients (name) VALUES (?1)")?;
            for name in used.values().flatten() {
                summary.ingredients_added += insert_ingredient.execute(params![name])?;
            }
        }
        tx.commit()?;
        tracing::info!(
            ingredients = summary.ingredients_added,
            tags = summary.tags_added,
            "refreshed catalog tables"
        );
        Ok(summary)
    }

    pub fn catalog_ingredients(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM ingredients ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    pub fn catalog_tags(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM tags ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    // --- Import / Export ---

    /// Load sample-data records, upserting by name. With `replace`, the meals
    /// table is emptied first. Runs in a single transaction.
    pub fn import_meals(&self, records: &[MealRecord], replace: bool) -> Result<ImportSummary> {
        let tx = self.conn.unchecked_transaction()?;
        if replace {
            tx.execute("DELETE FROM meals", [])?;
        }
        let mut summary = ImportSummary::default();
        for record in records {
            let meal = NewMeal::from(record.clone());
            let Ok(name) = validate_meal_name(&meal.name) else {
                tracing::warn!(name = %record.name, "skipping record with unusable name");
                summary.meals_skipped += 1;
                continue;
            };
            let now = Local::now().to_rfc3339();
            let updated = tx.execute(
                "UPDATE meals SET staple = ?1, book = ?2, page = ?3, website = ?4,
                    fresh_ingredients = ?5, tinned_ingredients = ?6, dry_ingredients = ?7,
                    dairy_ingredients = ?8, updated_at = ?9
                 WHERE name = ?10",
                params![
                    meal.staple,
                    meal.book,
                    meal.page,
                    meal.website,
                    Self::bucket_json(&meal.ingredients.fresh)?,
                    Self::bucket_json(&meal.ingredients.tinned)?,
                    Self::bucket_json(&meal.ingredients.dry)?,
                    Self::bucket_json(&meal.ingredients.dairy)?,
                    now,
                    name,
                ],
            )?;
            if updated > 0 {
                summary.meals_updated += 1;
                continue;
            }
            tx.execute(
                "INSERT INTO meals (name, staple, book, page, website,
                    fresh_ingredients, tinned_ingredients, dry_ingredients, dairy_ingredients,
                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    name,
                    meal.staple,
                    meal.book,
                    meal.page,
                    meal.website,
                    Self::bucket_json(&meal.ingredients.fresh)?,
                    Self::bucket_json(&meal.ingredients.tinned)?,
                    Self::bucket_json(&meal.ingredients.dry)?,
                    Self::bucket_json(&meal.ingredients.dairy)?,
                    now,
                    now,
                ],
            )?;
            summary.meals_inserted += 1;
        }
        tx.commit()?;
        tracing::info!(
            inserted = summary.meals_inserted,
            updated = summary.meals_updated,
            skipped = summary.meals_skipped,
            replace,
            "imported meals"
        );
        Ok(summary)
    }

    pub fn export_meals(&self) -> Result<Vec<MealRecord>> {
        Ok(self.list_meals()?.iter().map(MealRecord::from).collect())
    }
}
