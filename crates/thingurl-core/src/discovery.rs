// ── Discovery sources ──
//
// The adapter does not speak mDNS itself. A source turns whatever service
// browser the host uses into Up/Down events; the adapter derives a thing
// URL from each and loads or unloads it.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::error::CoreError;

/// Which advertisement a service was seen under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// `_webthing._tcp`: URL built from host, port and the `path` record.
    WebThing,
    /// `_http._tcp` with the `_webthing` subtype: URL in the `url` record.
    LegacySubtype,
    /// Plain `_http._tcp`: only services with a `webthing` record count.
    Http,
}

/// A resolved service advertisement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredService {
    pub host: String,
    pub port: u16,
    /// Decoded TXT record.
    pub txt: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceChange {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryEvent {
    pub kind: ServiceKind,
    pub change: ServiceChange,
    pub service: DiscoveredService,
}

impl DiscoveryEvent {
    pub fn up(kind: ServiceKind, service: DiscoveredService) -> Self {
        Self {
            kind,
            change: ServiceChange::Up,
            service,
        }
    }

    pub fn down(kind: ServiceKind, service: DiscoveredService) -> Self {
        Self {
            kind,
            change: ServiceChange::Down,
            service,
        }
    }

    /// Thing URL advertised by this service, if it is a Web Thing at all.
    pub fn thing_url(&self) -> Option<String> {
        let txt = &self.service.txt;
        match self.kind {
            ServiceKind::WebThing => {
                let scheme = if txt.get("tls").map(String::as_str) == Some("1") {
                    "https"
                } else {
                    "http"
                };
                let host = self.service.host.strip_suffix('.').unwrap_or(&self.service.host);
                let path = txt.get("path").map_or("/", String::as_str);
                Some(format!("{scheme}://{host}:{}{path}", self.service.port))
            }
            ServiceKind::LegacySubtype => txt.get("url").cloned(),
            ServiceKind::Http => {
                if txt.contains_key("webthing") {
                    txt.get("url").cloned()
                } else {
                    None
                }
            }
        }
    }
}

/// A producer of discovery events, owned and driven by the adapter.
pub trait DiscoverySource: Send + Sync {
    fn name(&self) -> &str;

    /// Begin browsing. Events arrive on the returned channel until
    /// [`stop`](Self::stop) is called or the source ends.
    fn start(&self) -> Result<mpsc::Receiver<DiscoveryEvent>, CoreError>;

    fn stop(&self);
}

/// A source fed by the host through an `mpsc::Sender`.
///
/// Lets any service browser be plugged in without the adapter depending
/// on it.
#[derive(Debug)]
pub struct ChannelSource {
    name: String,
    rx: Mutex<Option<mpsc::Receiver<DiscoveryEvent>>>,
}

impl ChannelSource {
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Sender<DiscoveryEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                name: name.into(),
                rx: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

impl DiscoverySource for ChannelSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Result<mpsc::Receiver<DiscoveryEvent>, CoreError> {
        let mut slot = self.rx.lock().map_err(|_| CoreError::Discovery {
            source_name: self.name.clone(),
            message: "source lock poisoned".into(),
        })?;
        slot.take().ok_or_else(|| CoreError::Discovery {
            source_name: self.name.clone(),
            message: "already started".into(),
        })
    }

    fn stop(&self) {}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn service(host: &str, port: u16, txt: &[(&str, &str)]) -> DiscoveredService {
        DiscoveredService {
            host: host.into(),
            port,
            txt: txt
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        }
    }

    #[test]
    fn webthing_url_from_host_port_and_path() {
        let ev = DiscoveryEvent::up(
            ServiceKind::WebThing,
            service("lamp.local.", 8888, &[("path", "/things/0")]),
        );
        assert_eq!(ev.thing_url().unwrap(), "http://lamp.local:8888/things/0");

        let tls = DiscoveryEvent::up(
            ServiceKind::WebThing,
            service("lamp.local", 443, &[("path", "/"), ("tls", "1")]),
        );
        assert_eq!(tls.thing_url().unwrap(), "https://lamp.local:443/");
    }

    #[test]
    fn http_service_requires_webthing_record() {
        let plain = DiscoveryEvent::up(
            ServiceKind::Http,
            service("printer.local", 80, &[("url", "http://printer.local/")]),
        );
        assert!(plain.thing_url().is_none());

        let thing = DiscoveryEvent::up(
            ServiceKind::Http,
            service(
                "plug.local",
                80,
                &[("url", "http://plug.local/"), ("webthing", "true")],
            ),
        );
        assert_eq!(thing.thing_url().unwrap(), "http://plug.local/");
    }

    #[test]
    fn legacy_subtype_uses_url_record() {
        let ev = DiscoveryEvent::down(
            ServiceKind::LegacySubtype,
            service("x.local", 80, &[("url", "http://x.local/thing")]),
        );
        assert_eq!(ev.thing_url().unwrap(), "http://x.local/thing");
    }

    #[test]
    fn channel_source_starts_once() {
        let (source, _tx) = ChannelSource::new("mdns", 8);
        assert!(source.start().is_ok());
        assert!(matches!(source.start(), Err(CoreError::Discovery { .. })));
    }
}
