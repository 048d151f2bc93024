//! Daemon error types with miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use thingurl_config::ConfigError;
use thingurl_core::CoreError;

/// Exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("Could not load configuration from {path}")]
    #[diagnostic(
        code(thingurl::config),
        help(
            "Check the TOML syntax of the file and any THINGURL_* environment variables.\n\
             Expected entries look like: urls = [{{ href = \"http://lamp.local\" }}]"
        )
    )]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(thingurl::validation))]
    Validation { field: String, reason: String },

    #[error("URL '{url}' is not in the configuration")]
    #[diagnostic(code(thingurl::not_found), help("Run: thingurl list"))]
    UrlNotFound { url: String },

    #[error("Could not reach {url}")]
    #[diagnostic(
        code(thingurl::connection_failed),
        help("Check that the device is powered and reachable, or pass --insecure for self-signed certificates.")
    )]
    ConnectionFailed { url: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(thingurl::core))]
    Core(CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config(path: &std::path::Path, source: ConfigError) -> Self {
        Self::Config {
            path: path.display().to_string(),
            source,
        }
    }

    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } | Self::UrlNotFound { .. } => exit_code::USAGE,
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed { url, reason },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            other => Self::Core(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn connection_failures_use_connection_exit_code() {
        let err = CliError::from(CoreError::ConnectionFailed {
            url: "http://lamp.local".into(),
            reason: "refused".into(),
        });
        assert_eq!(err.exit_code(), exit_code::CONNECTION);
    }

    #[test]
    fn other_core_errors_are_general() {
        let err = CliError::from(CoreError::Timeout);
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }
}
