//! Execution metrics
//!
//! Every call through the executor ends in exactly one [`ExecutionRecord`].
//! Records accumulate in a [`SessionMetrics`] value owned by that executor;
//! nothing is shared between executors, and only an explicit `reset`
//! clears the log.

mod export;
mod record;
mod session;

#[cfg(test)]
mod tests;

pub use export::{MetricsTable, TABLE_COLUMNS};
pub use record::ExecutionRecord;
pub use session::{MetricsSummary, SessionMetrics};
