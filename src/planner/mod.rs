//! Planning and execution.
//!
//! This module compares declarations against recorded state, builds an
//! ordered change-set, and applies it through a provider.

mod cancel;
mod diff;
mod executor;
mod plan;

pub use cancel::{CancelHandle, CancelSignal, cancellation};
pub use diff::{DiffDetail, DiffEngine, DiffType, ResourceDiff};
pub use executor::{
    AppliedChange, ApplyReport, ChangeSetExecutor, DEFAULT_PARALLELISM, FailedChange,
    SkippedChange,
};
pub use plan::{Action, ChangeEntry, ChangeSet, PlanOptions, Planner};
