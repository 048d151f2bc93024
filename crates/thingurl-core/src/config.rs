// ── Runtime adapter configuration ──
//
// Timing and transport tuning for the adapter and every device it owns.
// These types never touch disk: `thingurl-config` (or any other host)
// builds an `AdapterConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use thingurl_api::transport::{TlsMode, TransportConfig};
use thingurl_api::websocket::ReconnectConfig;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed devices).
    DangerAcceptInvalid,
}

/// Retry policy for fetching a description during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadRetry {
    /// Retries after the first failed attempt. Default: 5.
    pub max_retries: u32,
    /// Delay between attempts. Default: 2s.
    pub delay: Duration,
}

impl Default for LoadRetry {
    fn default() -> Self {
        Self {
            max_retries: 5,
            delay: Duration::from_secs(2),
        }
    }
}

/// Configuration shared by the adapter and all of its devices.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Interval between poll cycles for devices without a push channel.
    pub poll_interval: Duration,
    /// Keepalive ping interval on open push channels.
    pub ping_interval: Duration,
    /// Push channel reconnect backoff.
    pub reconnect: ReconnectConfig,
    /// Description fetch retry policy.
    pub load_retry: LoadRetry,
    /// A URL fetched successfully within this window is not fetched again.
    pub rate_limit: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// Event identities remembered per device for deduplication.
    pub event_history: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            ping_interval: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
            load_retry: LoadRetry::default(),
            rate_limit: Duration::from_secs(5),
            timeout: Duration::from_secs(10),
            tls: TlsVerification::default(),
            event_history: 1024,
        }
    }
}

impl AdapterConfig {
    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: tls_to_transport(&self.tls),
            timeout: self.timeout,
        }
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}
