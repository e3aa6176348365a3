//! Per-session scratch space for the most recently built plan.
//!
//! Each client session sees only its own plan. It stays there while the
//! user looks at it and is cleared once saved or discarded.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::plan::MealPlan;

/// Sessions kept by [`MemoryScratch::new`] before the oldest is evicted.
pub const DEFAULT_SESSION_LIMIT: usize = 1024;

pub trait PlanScratch: Send + Sync {
    fn get(&self, session: &str) -> Option<MealPlan>;
    fn set(&self, session: &str, plan: MealPlan);
    /// Take the plan out, leaving nothing behind for that session.
    fn pop(&self, session: &str) -> Option<MealPlan>;
}

pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Default)]
struct Slots {
    next_seq: u64,
    plans: HashMap<String, (u64, MealPlan)>,
}

pub struct MemoryScratch {
    slots: Mutex<Slots>,
    limit: usize,
}

impl Default for MemoryScratch {
    fn default() -> Self {
        Self::with_limit(DEFAULT_SESSION_LIMIT)
    }
}

impl MemoryScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` sessions; writing a new one past that drops the
    /// session written least recently.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            limit: limit.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .plans
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PlanScratch for MemoryScratch {
    fn get(&self, session: &str) -> Option<MealPlan> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.plans.get(session).map(|(_, plan)| plan.clone())
    }

    fn set(&self, session: &str, plan: MealPlan) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if !slots.plans.contains_key(session) && slots.plans.len() >= self.limit {
            let oldest = slots
                .plans
                .iter()
                .min_by_key(|(_, (seq, _))| *seq)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                tracing::debug!(session = %oldest, "evicting session plan");
                slots.plans.remove(&oldest);
            }
        }
        let seq = slots.next_seq;
        slots.next_seq += 1;
        slots.plans.insert(session.to_string(), (seq, plan));
    }

    fn pop(&self, session: &str) -> Option<MealPlan> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.plans.remove(session).map(|(_, plan)| plan)
    }
}
