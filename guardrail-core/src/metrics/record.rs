//! Per-call execution record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final outcome of one call, including all of its retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Operation id as requested
    pub operation_id: String,

    /// When the call started
    pub started_at: DateTime<Utc>,

    /// When the call reached its terminal state
    pub finished_at: DateTime<Utc>,

    /// Wall time of the call in milliseconds
    pub duration_ms: u64,

    /// Status of the last response, if any was received
    pub status: Option<u16>,

    /// Retries spent
    pub retries: u32,

    /// Whether the call succeeded
    pub success: bool,

    /// Error code on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    /// Error message on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExecutionRecord {
    /// Record for a successful call
    pub fn success(
        operation_id: impl Into<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        status: u16,
        retries: u32,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            started_at,
            finished_at,
            duration_ms: duration_ms(started_at, finished_at),
            status: Some(status),
            retries,
            success: true,
            error_code: None,
            error_message: None,
        }
    }

    /// Record for a failed call
    pub fn failure(
        operation_id: impl Into<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        status: Option<u16>,
        retries: u32,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            started_at,
            finished_at,
            duration_ms: duration_ms(started_at, finished_at),
            status,
            retries,
            success: false,
            error_code: Some(error_code.into()),
            error_message: Some(error_message.into()),
        }
    }
}

fn duration_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    end.signed_duration_since(start).num_milliseconds().max(0) as u64
}
