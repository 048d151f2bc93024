// thingurl-api: Async Rust client for the Web Thing HTTP/WebSocket protocol

pub mod auth;
pub mod client;
pub mod description;
pub mod error;
pub mod transport;
pub mod websocket;

pub use auth::{Authentication, headers};
pub use client::{ActionReport, EventReport, ThingClient};
pub use description::{
    InteractionDescription, Link, PropertyDescription, ThingDescription, parse_descriptions,
};
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{Backoff, InboundMessage, OutboundMessage, ReconnectConfig};
