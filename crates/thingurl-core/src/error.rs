// ── Core error types ──
//
// Errors surfaced by adapter and device operations. Wire-level failures
// from `thingurl-api` are translated through `From<thingurl_api::Error>`
// so callers never match on reqwest or tungstenite details.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Registry errors ──────────────────────────────────────────────
    #[error("Device already exists: {id}")]
    DeviceExists { id: String },

    #[error("Device not found: {id}")]
    DeviceNotFound { id: String },

    #[error("Property not found: {device}/{name}")]
    PropertyNotFound { device: String, name: String },

    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Device API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Invalid thing description: {message}")]
    InvalidDescription { message: String },

    // ── Collaborator errors ──────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Discovery source '{source_name}' failed: {message}")]
    Discovery { source_name: String, message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<thingurl_api::Error> for CoreError {
    fn from(err: thingurl_api::Error) -> Self {
        match err {
            thingurl_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            thingurl_api::Error::InvalidUrl(e) => CoreError::InvalidDescription {
                message: format!("invalid URL: {e}"),
            },
            thingurl_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            thingurl_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket: {reason}"),
            },
            thingurl_api::Error::Deserialization { message, body: _ } => {
                CoreError::InvalidDescription { message }
            }
            thingurl_api::Error::UnexpectedPayload(message) => CoreError::Api {
                message,
                status: None,
            },
        }
    }
}
