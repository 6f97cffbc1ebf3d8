//! Core data types and timestamp conventions.
//!
//! Timestamps are stored as local-time `%Y-%m-%d %H:%M:%S` strings and
//! reformatted to `%d-%m-%Y %H:%M:%S` at the response edge.

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;

/// Storage timestamp format.
pub const STORE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Display timestamp format used in API responses.
pub const DISPLAY_TIME_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Current local time in the storage format.
pub fn now_store_time() -> String {
    chrono::Local::now().format(STORE_TIME_FORMAT).to_string()
}

/// Reformats a stored timestamp for display. Values that do not parse as
/// the storage format pass through unchanged.
pub fn to_display_time(stored: &str) -> String {
    NaiveDateTime::parse_from_str(stored, STORE_TIME_FORMAT)
        .map(|dt| dt.format(DISPLAY_TIME_FORMAT).to_string())
        .unwrap_or_else(|_| stored.to_string())
}

/// A persisted document row with its current flat data and last diff.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub file_name: String,
    pub file_id: String,
    pub json_data: Value,
    pub update_count: i64,
    pub diff_data: Value,
    pub request_id: String,
    pub upload_date_time: Option<String>,
}

impl DocumentRecord {
    /// Converts the stored timestamp to the display format.
    pub fn with_display_time(mut self) -> Self {
        self.upload_date_time = self.upload_date_time.as_deref().map(to_display_time);
        self
    }
}

/// Per-batch aggregate across documents and ingestion tasks.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub request_id: String,
    pub file_count: i64,
    pub upload_date_time: Option<String>,
    pub total_update_count: i64,
    pub pending_count: i64,
    pub succeeded_count: i64,
    pub failed_count: i64,
}

impl BatchSummary {
    pub fn with_display_time(mut self) -> Self {
        self.upload_date_time = self.upload_date_time.as_deref().map(to_display_time);
        self
    }
}

/// Lifecycle state of one file's background ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
        }
    }
}

/// One file's ingestion status row.
#[derive(Debug, Clone, Serialize)]
pub struct IngestTask {
    pub file_id: String,
    pub request_id: String,
    pub file_name: String,
    pub state: String,
    pub error: Option<String>,
    pub uploaded_at: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reformats_stored_timestamps() {
        assert_eq!(to_display_time("2026-08-23 14:05:09"), "23-08-2026 14:05:09");
    }

    #[test]
    fn unparseable_timestamps_pass_through() {
        assert_eq!(to_display_time("not a time"), "not a time");
    }

    #[test]
    fn now_store_time_round_trips_through_display() {
        let stored = now_store_time();
        let display = to_display_time(&stored);
        assert_ne!(stored, display);
        assert_eq!(display.len(), stored.len());
    }

    #[test]
    fn task_state_names() {
        assert_eq!(TaskState::Pending.as_str(), "pending");
        assert_eq!(TaskState::Succeeded.as_str(), "succeeded");
        assert_eq!(TaskState::Failed.as_str(), "failed");
    }
}
