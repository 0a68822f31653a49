//! JSON Output Envelope Types
//!
//! Every `sprocket` command prints exactly one envelope to stdout.
//!
//! # Output Contract
//! - Success: `{"ok": true, "engine": "...", "command": "...", "data": {...}, "meta": {...}}`
//! - Error: `{"ok": false, "engine": "...", "command": "...", "error": {"code": "...", "message": "..."}}`
//!
//! Error codes are the stable codes of [`SprocketError::error_code`].

use serde::{Deserialize, Serialize};

use crate::driver::{DataSet, DataTable};
use crate::error::SprocketError;
use crate::value::DbValue;

/// Success envelope for operation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Database engine used (postgres, mysql, sqlite; empty for config commands)
    pub engine: String,

    /// Command that was executed (exec, connect, connections, define)
    pub command: String,

    pub data: T,

    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(engine: impl Into<String>, command: impl Into<String>, data: T, meta: Metadata) -> Self {
        Self { ok: true, engine: engine.into(), command: command.into(), data, meta }
    }
}

/// Error envelope for operation failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    pub engine: String,

    pub command: String,

    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    pub fn new(engine: impl Into<String>, command: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, engine: engine.into(), command: command.into(), error }
    }

    pub fn from_error(engine: impl Into<String>, command: impl Into<String>, err: &SprocketError) -> Self {
        Self::new(engine, command, ErrorInfo { code: err.error_code().to_string(), message: err.message() })
    }
}

/// Error information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "SCALAR_CAST", "CONNECTION_FAILED")
    pub code: String,

    /// Human-readable message; never contains a connection string
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub execution_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_returned: Option<usize>,
}

impl Metadata {
    #[must_use]
    pub const fn new(execution_ms: u64) -> Self {
        Self { execution_ms, rows_affected: None, rows_returned: None }
    }

    #[must_use]
    pub const fn with_rows(execution_ms: u64, rows_returned: usize) -> Self {
        Self { execution_ms, rows_affected: None, rows_returned: Some(rows_returned) }
    }

    #[must_use]
    pub const fn with_affected(execution_ms: u64, rows_affected: u64) -> Self {
        Self { execution_ms, rows_affected: Some(rows_affected), rows_returned: None }
    }
}

/// Result of `sprocket exec`, tagged with the execution mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExecOutput {
    NonQuery { rows_affected: u64 },
    Scalar { value: DbValue },
    /// Rows streamed from a reader, one JSON object per row, per result set
    Reader { result_sets: Vec<Vec<serde_json::Map<String, serde_json::Value>>> },
    Table { table: DataTable },
    Dataset { dataset: DataSet },
}

impl ExecOutput {
    /// Rows the procedure returned, for [`Metadata::rows_returned`]
    #[must_use]
    pub fn rows_returned(&self) -> Option<usize> {
        match self {
            Self::NonQuery { .. } => None,
            Self::Scalar { value } => Some(usize::from(!value.is_null())),
            Self::Reader { result_sets } => Some(result_sets.iter().map(Vec::len).sum()),
            Self::Table { table } => Some(table.row_count()),
            Self::Dataset { dataset } => Some(dataset.tables.iter().map(DataTable::row_count).sum()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_serialization() {
        let envelope = SuccessEnvelope::new(
            "sqlite",
            "exec",
            ExecOutput::NonQuery { rows_affected: 3 },
            Metadata::with_affected(42, 3),
        );

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""ok":true"#));
        assert!(json.contains(r#""engine":"sqlite"#));
        assert!(json.contains(r#""mode":"non_query""#));
        assert!(json.contains(r#""rows_affected":3"#));
        assert!(!json.contains("rows_returned"));
    }

    #[test]
    fn test_error_envelope_from_error() {
        let err = SprocketError::ScalarCast { expected: "i32", actual: "Text" };
        let envelope = ErrorEnvelope::from_error("postgres", "exec", &err);

        assert!(!envelope.ok);
        assert_eq!(envelope.error.code, "SCALAR_CAST");
        assert!(envelope.error.message.contains("i32"));
    }

    #[test]
    fn test_scalar_output_shape() {
        insta::assert_json_snapshot!(ExecOutput::Scalar { value: DbValue::Int(7) }, @r###"
        {
          "mode": "scalar",
          "value": 7
        }
        "###);
    }

    #[test]
    fn test_rows_returned() {
        let mut table = DataTable::new("Table", vec!["A".into()]);
        table.rows.push(vec![DbValue::Int(1)]);
        table.rows.push(vec![DbValue::Null]);

        assert_eq!(ExecOutput::Table { table }.rows_returned(), Some(2));
        assert_eq!(ExecOutput::Scalar { value: DbValue::Null }.rows_returned(), Some(0));
        assert_eq!(ExecOutput::NonQuery { rows_affected: 9 }.rows_returned(), None);
    }
}
