// ── Device events ──

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use thingurl_api::EventReport;

/// An event occurrence delivered to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub data: Option<Value>,
    pub timestamp: String,
}

impl Event {
    /// Identity used for deduplication: the payload's `data.id` when
    /// present, else `{name}-{timestamp}` using the timestamp exactly as
    /// reported (absent timestamps collapse onto one identity per name).
    pub fn dedup_id(name: &str, report: &EventReport) -> String {
        if let Some(id) = report
            .data
            .as_ref()
            .and_then(|d| d.as_object())
            .and_then(|d| d.get("id"))
        {
            return match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
        }

        format!(
            "{name}-{}",
            report.timestamp.as_deref().unwrap_or_default()
        )
    }

    /// Build the delivered event, stamping "now" when the report has no
    /// timestamp.
    pub fn from_report(name: &str, report: EventReport) -> Self {
        Self {
            name: name.to_owned(),
            data: report.data,
            timestamp: report
                .timestamp
                .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}
