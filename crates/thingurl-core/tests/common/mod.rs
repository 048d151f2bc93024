#![allow(clippy::unwrap_used, dead_code)]
// Shared fixtures for adapter integration tests.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use thingurl_core::{
    Adapter, AdapterConfig, AdapterEvent, LoadRetry, MemoryUrlStore, ReconnectConfig, ThingUrl,
};

/// Timings short enough for tests.
pub fn fast_config() -> AdapterConfig {
    AdapterConfig {
        poll_interval: Duration::from_millis(50),
        ping_interval: Duration::from_secs(30),
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        },
        load_retry: LoadRetry {
            max_retries: 1,
            delay: Duration::from_millis(10),
        },
        timeout: Duration::from_secs(2),
        ..AdapterConfig::default()
    }
}

pub fn adapter(config: AdapterConfig) -> Adapter {
    Adapter::new(config, Arc::new(MemoryUrlStore::default())).unwrap()
}

pub fn adapter_with_store(config: AdapterConfig, store: Arc<MemoryUrlStore>) -> Adapter {
    Adapter::new(config, store).unwrap()
}

/// A description with one boolean property `on` and the given top-level
/// links.
pub fn lamp_description(links: Value) -> Value {
    json!({
        "title": "Lamp",
        "@type": ["Light", "OnOffSwitch"],
        "properties": {
            "on": {
                "type": "boolean",
                "links": [{"rel": "property", "href": "/properties/on"}]
            }
        },
        "actions": {
            "fade": {"links": [{"href": "/actions/fade"}]}
        },
        "events": {
            "alarm": {"links": [{"href": "/events/alarm"}]}
        },
        "links": links
    })
}

pub async fn mount_description(server: &MockServer, body: &Value) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

pub async fn mount_property(server: &MockServer, name: &str, value: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/properties/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(keyed(name, value)))
        .mount(server)
        .await;
}

/// `{name: value}`
pub fn keyed(name: &str, value: Value) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(name.to_owned(), value);
    Value::Object(map)
}

pub fn thing_url(server: &MockServer) -> ThingUrl {
    ThingUrl::new(server.uri())
}

/// Wait for the first notification matching `pred`.
pub async fn next_matching<F>(rx: &mut broadcast::Receiver<AdapterEvent>, pred: F) -> AdapterEvent
where
    F: Fn(&AdapterEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for notification")
}

/// Drain every notification currently queued.
pub fn drain(rx: &mut broadcast::Receiver<AdapterEvent>) -> Vec<AdapterEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}
