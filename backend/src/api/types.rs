//! JSON envelopes for the HTTP API and the CLI.
//!
//! Pipeline outcomes carry typed errors; these types flatten them into the
//! `{ ..., logs, error }` shape clients consume.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::logs::{LogLevel, RunLog};
use crate::models::{Activity, Organisation};
use crate::transform::pipeline::{ActivitiesOutcome, XmlOutcome};

/// Status derived from a run's outcome and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// No warnings or row errors.
    Ready,
    /// Output produced, but some rows were skipped or fields dropped.
    Warning,
    /// No usable output.
    Error,
}

impl RunStatus {
    fn from_logs(failed: bool, logs: &RunLog) -> Self {
        if failed {
            Self::Error
        } else if logs.count(LogLevel::Error) + logs.count(LogLevel::Warning) > 0 {
            Self::Warning
        } else {
            Self::Ready
        }
    }
}

/// Response of `POST /api/convert` and of `iati-generator convert --json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    /// Unique job identifier
    pub job_id: String,
    pub status: RunStatus,
    /// Suggested name of the generated file
    pub file_name: String,
    /// The generated document, absent on failure
    pub xml: Option<String>,
    /// `LEVEL: message` lines, in order
    pub logs: Vec<String>,
    pub error: Option<String>,
}

impl From<XmlOutcome> for ConvertResponse {
    fn from(outcome: XmlOutcome) -> Self {
        let failed = !outcome.is_success();
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: RunStatus::from_logs(failed, &outcome.logs),
            file_name: outcome.file_name,
            xml: outcome.xml,
            logs: outcome.logs.lines(),
            error: outcome.error.map(|e| e.to_string()),
        }
    }
}

/// Stage 1 outcome as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitiesResponse {
    pub resource_name: String,
    pub status: RunStatus,
    pub activities: Vec<Activity>,
    pub organisations: Vec<Organisation>,
    pub logs: Vec<String>,
    pub error: Option<String>,
}

impl From<ActivitiesOutcome> for ActivitiesResponse {
    fn from(outcome: ActivitiesOutcome) -> Self {
        let failed = !outcome.is_success();
        Self {
            resource_name: outcome.resource_name,
            status: RunStatus::from_logs(failed, &outcome.logs),
            activities: outcome.activities,
            organisations: outcome.organisations,
            logs: outcome.logs.lines(),
            error: outcome.error.map(|e| e.to_string()),
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "fileName": "",
        "xml": null,
        "logs": [format!("ERROR: {}", error)],
        "error": error,
    })
}
