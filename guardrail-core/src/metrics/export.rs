//! Tabular export of execution records

use chrono::SecondsFormat;

use super::record::ExecutionRecord;

/// Column order of the exported table
pub const TABLE_COLUMNS: [&str; 9] = [
    "operation_id",
    "started_at",
    "finished_at",
    "duration_ms",
    "status",
    "retries",
    "success",
    "error_code",
    "error_message",
];

/// Delimited-text renderer for execution records
///
/// Output is a pure function of the records, so exporting twice without new
/// calls yields identical text.
#[derive(Debug, Clone)]
pub struct MetricsTable {
    delimiter: char,
}

impl Default for MetricsTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsTable {
    /// Comma-delimited table
    pub fn new() -> Self {
        Self { delimiter: ',' }
    }

    /// Use a different field delimiter
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Header line plus one row per record, newline-terminated
    pub fn render(&self, records: &[ExecutionRecord]) -> String {
        let mut out = String::new();
        self.push_row(&mut out, TABLE_COLUMNS.iter().map(|c| c.to_string()));
        for record in records {
            self.push_row(&mut out, row(record).into_iter());
        }
        out
    }

    fn push_row(&self, out: &mut String, fields: impl Iterator<Item = String>) {
        let line = fields
            .map(|f| self.escape(&f))
            .collect::<Vec<_>>()
            .join(&self.delimiter.to_string());
        out.push_str(&line);
        out.push('\n');
    }

    fn escape(&self, field: &str) -> String {
        if field.contains(self.delimiter)
            || field.contains('"')
            || field.contains('\n')
            || field.contains('\r')
        {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }
}

fn row(record: &ExecutionRecord) -> [String; 9] {
    [
        record.operation_id.clone(),
        record.started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        record.finished_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        record.duration_ms.to_string(),
        record.status.map(|s| s.to_string()).unwrap_or_default(),
        record.retries.to_string(),
        record.success.to_string(),
        record.error_code.clone().unwrap_or_default(),
        record.error_message.clone().unwrap_or_default(),
    ]
}
