// ── Device identity ──
//
// A device id is derived from the thing URL alone, so the same thing
// rediscovered from any source maps to the same registry entry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a device: its thing URL with `:` and `/`
/// replaced by `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Derive the id for a thing URL.
    pub fn from_url(url: &str) -> Self {
        Self(url.replace([':', '/'], "-"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_url_with_separators_replaced() {
        let id = DeviceId::from_url("http://192.168.1.20:8888/things/0");
        assert_eq!(id.as_str(), "http---192.168.1.20-8888-things-0");
    }

    #[test]
    fn id_is_deterministic() {
        assert_eq!(
            DeviceId::from_url("https://lamp.local"),
            DeviceId::from_url("https://lamp.local")
        );
        assert_ne!(
            DeviceId::from_url("https://lamp.local/things/0"),
            DeviceId::from_url("https://lamp.local/things/1")
        );
    }
}
