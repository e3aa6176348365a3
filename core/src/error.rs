use thiserror::Error;

/// Recoverable planning conditions the front ends react to.
///
/// These travel inside `anyhow::Error`; callers use `downcast_ref::<PlanError>()`
/// to tell them apart from storage failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanError {
    #[error("No meals selected. Choose at least one meal to build a plan")]
    EmptySelection,

    #[error("Quantity '{value}' for {ingredient} is not a number")]
    MalformedQuantity { ingredient: String, value: String },
}

/// What to do with a bucket entry whose quantity does not parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QuantityPolicy {
    /// Remove the entry and carry on.
    #[default]
    Drop,
    /// Fail with [`PlanError::MalformedQuantity`].
    Reject,
}
