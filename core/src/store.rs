//! Saved meal plans.
//!
//! Plans are JSON documents addressed by name. [`DirPlanStore`] keeps them as
//! files in a directory (plus read-only fallback directories, so a plan saved
//! from a different working directory is still found); anything else that
//! can list/get/put/delete by name can stand in through [`PlanStore`].

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;

use crate::plan::MealPlan;

pub const PLAN_EXTENSION: &str = "json";
pub const DEFAULT_PLAN_NAME: &str = "Meal_Plan";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedPlan {
    pub name: String,
    pub path: PathBuf,
}

pub trait PlanStore: Send + Sync {
    /// Sorted, deduplicated plan names.
    fn list(&self) -> Result<Vec<String>>;
    /// `Ok(None)` when no plan has that name.
    fn get(&self, name: &str) -> Result<Option<MealPlan>>;
    /// Store under a name derived from `name` (or a timestamp), never
    /// replacing an existing plan.
    fn put(&self, plan: &MealPlan, name: Option<&str>) -> Result<SavedPlan>;
    /// Remove the named plans, ignoring ones that do not exist. Returns how
    /// many were removed.
    fn delete(&self, names: &[String]) -> Result<usize>;
}

/// Replace each run of characters outside `[A-Za-z0-9 _-]` with one `_`.
pub fn sanitize_plan_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-') {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    let trimmed = out.trim();
    if trimmed.is_empty() {
        DEFAULT_PLAN_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Base name for a save: the sanitized user name, or a timestamp when none
/// was given. The timestamp has no colons so it is valid on every platform.
pub fn plan_base_name(name: Option<&str>) -> String {
    match name.filter(|n| !n.is_empty()) {
        Some(n) => sanitize_plan_name(n),
        None => Local::now().format("%Y-%m-%d_%H-%M-%S").to_string(),
    }
}

fn collision_suffix() -> String {
    Local::now().format("_%Y%m%d_%H%M%S").to_string()
}

/// Candidate stems for a save, tried in order until one is free.
fn candidate_stem(base: &str, suffix: &str, attempt: u32) -> String {
    match attempt {
        0 => base.to_string(),
        1 => format!("{base}{suffix}"),
        n => format!("{base}{suffix}-{n}"),
    }
}

fn is_addressable(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}

pub struct DirPlanStore {
    dirs: Vec<PathBuf>,
}

impl DirPlanStore {
    /// Saves go to `primary`; it is also the first place looked in.
    pub fn new(primary: impl Into<PathBuf>) -> Self {
        Self {
            dirs: vec![primary.into()],
        }
    }

    /// Add a directory that is searched (after the primary) but never written.
    #[must_use]
    pub fn with_fallback(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if !self.dirs.contains(&dir) {
            self.dirs.push(dir);
        }
        self
    }

    pub fn primary(&self) -> &Path {
        &self.dirs[0]
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// `<name>.json`, then bare `<name>`, in each directory in turn.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if !is_addressable(name) {
            return None;
        }
        self.dirs.iter().find_map(|dir| Self::resolve_in(dir, name))
    }

    fn resolve_in(dir: &Path, name: &str) -> Option<PathBuf> {
        let with_ext = dir.join(format!("{name}.{PLAN_EXTENSION}"));
        if with_ext.is_file() {
            return Some(with_ext);
        }
        let bare = dir.join(name);
        bare.is_file().then_some(bare)
    }

    fn plan_name(path: &Path) -> Option<String> {
        let file_name = path.file_name()?.to_str()?;
        if file_name.starts_with('.') {
            return None;
        }
        match path.extension() {
            Some(ext) if ext == PLAN_EXTENSION => {
                path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            }
            Some(_) => None,
            None => Some(file_name.to_string()),
        }
    }
}

impl PlanStore for DirPlanStore {
    fn list(&self) -> Result<Vec<String>> {
        let mut names = BTreeSet::new();
        for dir in &self.dirs {
            if !dir.is_dir() {
                continue;
            }
            let entries = fs::read_dir(dir)
                .with_context(|| format!("Failed to read plan directory: {}", dir.display()))?;
            for entry in entries {
                let entry = entry?;
                let meta = entry.metadata()?;
                if !meta.is_file() || meta.len() == 0 {
                    continue;
                }
                if let Some(name) = Self::plan_name(&entry.path()) {
                    names.insert(name);
                }
            }
        }
        Ok(names.into_iter().collect())
    }

    fn get(&self, name: &str) -> Result<Option<MealPlan>> {
        let Some(path) = self.resolve(name) else {
            return Ok(None);
        };
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read saved plan: {}", path.display()))?;
        let plan = MealPlan::from_json_str(&text)
            .with_context(|| format!("Failed to load saved plan: {}", path.display()))?;
        Ok(Some(plan))
    }

    fn put(&self, plan: &MealPlan, name: Option<&str>) -> Result<SavedPlan> {
        let dir = self.primary();
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create plan directory: {}", dir.display()))?;
        let json = serde_json::to_string_pretty(plan).context("Failed to serialize plan")?;

        let base = plan_base_name(name);
        let suffix = collision_suffix();
        let mut attempt = 0;
        loop {
            let stem = candidate_stem(&base, &suffix, attempt);
            attempt += 1;
            if self.resolve(&stem).is_some() {
                continue;
            }
            let path = dir.join(format!("{stem}.{PLAN_EXTENSION}"));
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to create plan file: {}", path.display()));
                }
            };
            file.write_all(json.as_bytes())
                .with_context(|| format!("Failed to write plan file: {}", path.display()))?;
            let path = fs::canonicalize(&path).unwrap_or(path);
            tracing::info!(plan = %stem, path = %path.display(), "saved meal plan");
            return Ok(SavedPlan { name: stem, path });
        }
    }

    /// Only the primary directory is touched; plans found in a fallback
    /// directory stay where they are.
    fn delete(&self, names: &[String]) -> Result<usize> {
        let mut removed = 0;
        for name in names {
            if !is_addressable(name) {
                continue;
            }
            let Some(path) = Self::resolve_in(self.primary(), name) else {
                continue;
            };
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!(plan = %name, "deleted saved plan");
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to delete plan: {}", path.display()));
                }
            }
        }
        Ok(removed)
    }
}

/// Plans held in memory, keyed by name. Used where nothing should touch disk.
#[derive(Default)]
pub struct MemoryPlanStore {
    plans: Mutex<BTreeMap<String, String>>,
}

impl MemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlanStore for MemoryPlanStore {
    fn list(&self) -> Result<Vec<String>> {
        let plans = self
            .plans
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(plans.keys().cloned().collect())
    }

    fn get(&self, name: &str) -> Result<Option<MealPlan>> {
        let plans = self
            .plans
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        plans
            .get(name)
            .map(String::as_str)
            .map(MealPlan::from_json_str)
            .transpose()
    }

    fn put(&self, plan: &MealPlan, name: Option<&str>) -> Result<SavedPlan> {
        let json = serde_json::to_string_pretty(plan).context("Failed to serialize plan")?;
        let mut plans = self
            .plans
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let base = plan_base_name(name);
        let suffix = collision_suffix();
        let stem = (0..)
            .map(|attempt| candidate_stem(&base, &suffix, attempt))
            .find(|stem| !plans.contains_key(stem))
            .unwrap_or(base);
        plans.insert(stem.clone(), json);
        Ok(SavedPlan {
            path: PathBuf::from(&stem),
            name: stem,
        })
    }

    fn delete(&self, names: &[String]) -> Result<usize> {
        let mut plans = self
            .plans
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(names.iter().filter(|n| plans.remove(*n).is_some()).count())
    }
}
