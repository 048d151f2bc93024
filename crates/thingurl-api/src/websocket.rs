//! Push channel codec and connection helpers.
//!
//! A thing that advertises a `ws://` / `wss://` alternate link accepts a
//! WebSocket carrying JSON messages tagged by `messageType`. This module
//! decodes the three inbound kinds into [`InboundMessage`], encodes the two
//! outbound kinds from [`OutboundMessage`], and owns the reconnect
//! [`Backoff`] arithmetic. The connection lifecycle itself lives in
//! `thingurl-core`, which knows what to do with each message.
//!
//! # Example
//!
//! ```rust,ignore
//! use thingurl_api::websocket::{self, InboundMessage};
//!
//! let url = websocket::push_url(&ws_url, &auth)?;
//! let stream = websocket::connect(&url).await?;
//! ```

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::auth::Authentication;
use crate::client::{ActionReport, EventReport};
use crate::error::Error;

pub const PROPERTY_STATUS: &str = "propertyStatus";
pub const ACTION_STATUS: &str = "actionStatus";
pub const EVENT: &str = "event";
pub const SET_PROPERTY: &str = "setProperty";
pub const ADD_EVENT_SUBSCRIPTION: &str = "addEventSubscription";

/// An open push channel.
pub type PushStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

// ── Inbound ──────────────────────────────────────────────────────────

/// A decoded message received from a thing.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// `{messageType: propertyStatus, data: {name: value, ...}}`
    PropertyStatus(Map<String, Value>),
    /// `{messageType: actionStatus, data: {actionName: {href, status, ...}}}`
    ActionStatus(Vec<(String, ActionReport)>),
    /// `{messageType: event, data: {eventName: {data?, timestamp?}}}`
    Event(Vec<(String, EventReport)>),
    /// Any other message type, kept so the caller can log it.
    Unrecognized { message_type: String, data: Value },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "messageType", alias = "type")]
    message_type: String,
    #[serde(default)]
    data: Value,
}

impl InboundMessage {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, Error> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: text.to_owned(),
            })?;

        match envelope.message_type.as_str() {
            PROPERTY_STATUS => Ok(Self::PropertyStatus(into_object(envelope.data)?)),
            ACTION_STATUS => Ok(Self::ActionStatus(named_entries(envelope.data)?)),
            EVENT => Ok(Self::Event(named_entries(envelope.data)?)),
            _ => Ok(Self::Unrecognized {
                message_type: envelope.message_type,
                data: envelope.data,
            }),
        }
    }
}

fn into_object(data: Value) -> Result<Map<String, Value>, Error> {
    match data {
        Value::Object(map) => Ok(map),
        other => Err(Error::UnexpectedPayload(format!(
            "expected an object, got {other}"
        ))),
    }
}

fn named_entries<T: serde::de::DeserializeOwned>(data: Value) -> Result<Vec<(String, T)>, Error> {
    into_object(data)?
        .into_iter()
        .map(|(name, payload)| {
            serde_json::from_value(payload)
                .map(|p| (name.clone(), p))
                .map_err(|e| Error::UnexpectedPayload(format!("`{name}` entry: {e}")))
        })
        .collect()
}

// ── Outbound ─────────────────────────────────────────────────────────

/// A message sent to a thing.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Subscribe to every listed event in one message.
    AddEventSubscription(Vec<String>),
    /// Request a property change.
    SetProperty { name: String, value: Value },
}

impl OutboundMessage {
    pub fn to_json(&self) -> Value {
        match self {
            Self::AddEventSubscription(names) => {
                let data: Map<String, Value> =
                    names.iter().map(|n| (n.clone(), json!({}))).collect();
                json!({ "messageType": ADD_EVENT_SUBSCRIPTION, "data": data })
            }
            Self::SetProperty { name, value } => {
                let mut data = Map::new();
                data.insert(name.clone(), value.clone());
                json!({ "messageType": SET_PROPERTY, "data": data })
            }
        }
    }

    /// Encode as a WebSocket text frame.
    pub fn to_frame(&self) -> Message {
        Message::text(self.to_json().to_string())
    }
}

// ── Connection ───────────────────────────────────────────────────────

/// Build the push channel URL, appending `jwt={token}` for bearer auth.
///
/// Other authentication methods are not applied to the push channel.
pub fn push_url(ws_url: &str, auth: &Authentication) -> Result<Url, Error> {
    let mut url = Url::parse(ws_url)?;
    if let Some(token) = auth.bearer_token() {
        url.query_pairs_mut().append_pair("jwt", token);
    }
    Ok(url)
}

/// Open a WebSocket to a thing.
pub async fn connect(url: &Url) -> Result<PushStream, Error> {
    tracing::debug!(url = %url, "Connecting to push channel");
    let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
    Ok(stream)
}

// ── Backoff ──────────────────────────────────────────────────────────

/// Exponential backoff configuration for push channel reconnection.
///
/// Reconnection is never abandoned while the device is registered, so
/// there is no retry limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Reconnect delay state for one push channel.
///
/// `delay = min(initial * 2^failures, max)`; a successful open resets it.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            current: config.initial_delay,
            config,
        }
    }

    /// Delay to wait before the next connection attempt.
    pub fn delay(&self) -> Duration {
        self.current
    }

    /// Double the delay after an unsuccessful attempt, capped at the max.
    pub fn record_failure(&mut self) {
        self.current = self
            .current
            .saturating_mul(2)
            .min(self.config.max_delay);
    }

    /// Return to the initial delay after a successful open.
    pub fn reset(&mut self) {
        self.current = self.config.initial_delay;
    }
}

// ── Tests ────────────────────────────────────────────────────────────
