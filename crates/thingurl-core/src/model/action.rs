// ── Action requests ──

use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle status of an action request.
///
/// The protocol allows devices to report statuses beyond the common ones;
/// those are kept verbatim in [`Other`](Self::Other).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionStatus {
    Created,
    Pending,
    Completed,
    Error,
    Other(String),
}

impl ActionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ActionStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "created" => Self::Created,
            "pending" => Self::Pending,
            "completed" => Self::Completed,
            "error" => Self::Error,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for ActionStatus {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<ActionStatus> for String {
    fn from(status: ActionStatus) -> Self {
        status.as_str().to_owned()
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action invocation tracked by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: Option<Value>,
    pub status: ActionStatus,
    #[serde(default)]
    pub time_requested: Option<String>,
    #[serde(default)]
    pub time_completed: Option<String>,
    /// Resource href returned by the device once the request was accepted.
    #[serde(default)]
    pub href: Option<String>,
}

impl Action {
    pub fn new(name: impl Into<String>, input: Option<Value>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            name: name.into(),
            input,
            status: ActionStatus::Created,
            time_requested: None,
            time_completed: None,
            href: None,
        }
    }

    /// Mark the request as started.
    pub fn start(&mut self) {
        self.status = ActionStatus::Pending;
        self.time_requested = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
    }

    /// Apply a status report from the device.
    ///
    /// Returns `true` if the status changed.
    pub fn apply_report(&mut self, report: &thingurl_api::ActionReport) -> bool {
        let status = report
            .status
            .as_deref()
            .map_or_else(|| self.status.clone(), ActionStatus::from);
        let changed = status != self.status;
        self.status = status;
        self.time_requested.clone_from(&report.time_requested);
        self.time_completed.clone_from(&report.time_completed);
        changed
    }
}
