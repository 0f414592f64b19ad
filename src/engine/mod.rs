//! The metric execution engine
//!
//! A [`RunContext`] owns the live fetchers and publishers of one run. The [`Evaluator`] turns
//! definitions into results, the [`Scheduler`] drives iterations, batching and the run deadline,
//! and [`reconcile_boards`] is the alternate run mode that only updates dashboards.

mod context;
mod evaluator;
mod reconciler;
mod scheduler;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::RunContext;
pub use evaluator::{EvaluationError, EvaluationErrorKind, Evaluator};
pub use reconciler::{BoardsSummary, reconcile_boards};
pub use scheduler::{RunSummary, Scheduler, SchedulerState};
