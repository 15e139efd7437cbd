//! Audit record of a validation submission.

use chrono::{DateTime, SecondsFormat, Utc};
use fse_eds::OutcomeBody;
use serde::Serialize;
use std::path::Path;

/// Verdict of the validation service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EdsResult {
    Accepted { payload: OutcomeBody },
    /// Non-success HTTP status; the body is kept verbatim.
    Rejected { status_code: u16, body: String },
}

impl EdsResult {
    pub fn is_rejected(&self) -> bool {
        matches!(self, EdsResult::Rejected { .. })
    }
}

/// One submission, stamped once and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    /// UTC, RFC 3339 with milliseconds and a `Z` suffix.
    pub timestamp: String,
    /// Signed artifact that was submitted.
    pub pdf: String,
    pub eds_result: EdsResult,
}

impl AuditRecord {
    pub fn new(at: DateTime<Utc>, pdf: &Path, eds_result: EdsResult) -> Self {
        Self {
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            pdf: pdf.display().to_string(),
            eds_result,
        }
    }

    /// Indented JSON as written to the log file.
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
