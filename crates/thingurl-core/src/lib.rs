//! Discovery, device registry and sync engine for Web Thing devices.
//!
//! - **[`Adapter`]**: owns the known-URL table and the device registry.
//!   [`load_thing()`](Adapter::load_thing) fetches a description, compares
//!   its content digest with the last fetch, and creates, replaces or keeps
//!   the matching devices. Discovery sources feed it Up/Down events.
//!
//! - **[`Device`]**: one per thing. Picks push mode (WebSocket, reconnect
//!   with exponential backoff) when the description advertises a push
//!   endpoint, else polls over HTTP. Mirrors properties, tracks issued
//!   actions, and delivers events through a dedup gate.
//!
//! - **[`AdapterEvent`]**: everything the host mirrors arrives on one
//!   broadcast channel from [`Adapter::subscribe()`].

pub mod adapter;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod model;
pub mod notify;
pub mod property;
pub(crate) mod registry;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use adapter::{Adapter, LoadOutcome};
pub use config::{AdapterConfig, LoadRetry, TlsVerification};
pub use device::{Device, DeviceInfo, SyncMode};
pub use discovery::{
    ChannelSource, DiscoveredService, DiscoveryEvent, DiscoverySource, ServiceChange, ServiceKind,
};
pub use error::CoreError;
pub use model::{Action, ActionStatus, DeviceId, Event, KnownUrl, ThingUrl};
pub use notify::{AdapterEvent, ConnectionState};
pub use property::Property;
pub use store::{MemoryUrlStore, UrlStore};

pub use thingurl_api::{Authentication, ReconnectConfig, ThingDescription};
