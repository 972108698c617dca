//! Session-level aggregation of execution records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::export::MetricsTable;
use super::record::ExecutionRecord;

/// Append-only record log for one executor
#[derive(Debug, Clone)]
pub struct SessionMetrics {
    session_id: Uuid,
    started_at: DateTime<Utc>,
    clock: Instant,
    records: Vec<ExecutionRecord>,
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMetrics {
    /// Start a new session now
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            clock: Instant::now(),
            records: Vec::new(),
        }
    }

    /// Append a record
    pub fn record(&mut self, record: ExecutionRecord) {
        self.records.push(record);
    }

    /// All records in completion order
    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    /// Most recent record
    pub fn last(&self) -> Option<&ExecutionRecord> {
        self.records.last()
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn total_operations(&self) -> usize {
        self.records.len()
    }

    pub fn successful_operations(&self) -> usize {
        self.records.iter().filter(|r| r.success).count()
    }

    pub fn failed_operations(&self) -> usize {
        self.records.iter().filter(|r| !r.success).count()
    }

    /// Calls that needed at least one retry
    pub fn retried_operations(&self) -> usize {
        self.records.iter().filter(|r| r.retries > 0).count()
    }

    /// Retries summed over all calls
    pub fn total_retries(&self) -> u64 {
        self.records.iter().map(|r| r.retries as u64).sum()
    }

    /// Wall time since the session started or was last reset
    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    /// Snapshot of the running totals
    pub fn summary(&self) -> MetricsSummary {
        let total = self.total_operations();
        let successful = self.successful_operations();
        MetricsSummary {
            session_id: self.session_id,
            started_at: self.started_at,
            total_operations: total,
            successful_operations: successful,
            failed_operations: self.failed_operations(),
            retried_operations: self.retried_operations(),
            total_retries: self.total_retries(),
            success_rate: if total == 0 {
                0.0
            } else {
                successful as f64 / total as f64
            },
            elapsed_ms: self.elapsed().as_millis() as u64,
        }
    }

    /// Render the record log as a CSV table
    pub fn to_table(&self) -> String {
        MetricsTable::new().render(&self.records)
    }

    /// Drop all records and restart the session clock
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Serializable snapshot of session totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub total_operations: usize,
    pub successful_operations: usize,
    pub failed_operations: usize,
    pub retried_operations: usize,
    pub total_retries: u64,
    pub success_rate: f64,
    pub elapsed_ms: u64,
}
