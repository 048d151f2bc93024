// ── Device ──
//
// One device per loaded thing description. A device owns its cached
// property values, the action requests it issued, the event dedup gate,
// and a single sync task that keeps all of them current.

mod dedup;
mod links;
mod poll;
mod push;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use thingurl_api::{
    ActionReport, Authentication, EventReport, InteractionDescription, Link, OutboundMessage,
    ThingClient, ThingDescription,
};

use crate::config::AdapterConfig;
use crate::error::CoreError;
use crate::model::{Action, ActionStatus, DeviceId, Event};
use crate::notify::{AdapterEvent, ConnectionState, Notifier};
use crate::property::Property;

use self::dedup::EventDedup;

const OUTBOUND_CHANNEL_SIZE: usize = 64;

/// How a device is kept in sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMode {
    /// Server push over a WebSocket at this URL.
    Push { url: String },
    /// Periodic HTTP polling.
    Pull,
}

/// Descriptive metadata copied from the thing description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
    pub title: Option<String>,
    pub thing_type: Option<Value>,
    pub context: Option<Value>,
    pub semantic_types: Vec<String>,
    pub description: Option<String>,
}

/// Everything a device borrows from its adapter.
#[derive(Clone)]
pub(crate) struct DeviceContext {
    pub http: reqwest::Client,
    pub settings: Arc<AdapterConfig>,
    pub notifier: Notifier,
}

/// A loaded thing. Cheap to clone.
#[derive(Clone)]
pub struct Device {
    pub(crate) inner: Arc<DeviceInner>,
}

pub(crate) struct DeviceInner {
    id: DeviceId,
    info: DeviceInfo,
    /// Absolute URL of the thing.
    url: Url,
    /// Normalized discovery URL this device was loaded from.
    discovery_url: String,
    /// Origin of `url`; relative hrefs resolve against it.
    base: Url,
    mode: SyncMode,
    actions_url: Option<Url>,
    events_url: Option<Url>,
    links: Vec<Link>,
    actions: BTreeMap<String, InteractionDescription>,
    events: BTreeMap<String, InteractionDescription>,
    pub(crate) client: ThingClient,
    pub(crate) settings: Arc<AdapterConfig>,
    notifier: Notifier,
    pub(crate) properties: DashMap<String, Property>,
    /// Issued action requests keyed by the href the device assigned.
    requested_actions: DashMap<String, Action>,
    dedup: Mutex<EventDedup>,
    /// Sender into the open push connection, if any.
    pub(crate) push_tx: ArcSwapOption<mpsc::Sender<OutboundMessage>>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    started: AtomicBool,
    /// Last announced connectivity.
    connected: AtomicBool,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Device {
    /// Build a device from its description and fetch initial property
    /// values.
    ///
    /// A property whose initial read fails is logged and left out.
    pub(crate) async fn build(
        ctx: DeviceContext,
        id: DeviceId,
        url: Url,
        authentication: Authentication,
        mut description: ThingDescription,
        discovery_url: String,
    ) -> Result<Self, CoreError> {
        let base = origin_of(&url)?;
        let client = ThingClient::new(ctx.http, authentication);

        for interaction in description
            .actions
            .values_mut()
            .chain(description.events.values_mut())
        {
            thingurl_api::description::flag_proxy_links(&mut interaction.links);
        }

        let classified = links::classify(&description.links, &base);
        let mode = match classified.ws_url {
            Some(url) => SyncMode::Push { url },
            None => SyncMode::Pull,
        };

        let properties = fetch_initial_properties(&client, &base, &id, &description).await;

        let info = DeviceInfo {
            title: description.display_title().map(str::to_owned),
            thing_type: description.thing_type,
            context: Some(
                description
                    .context
                    .unwrap_or_else(|| Value::String(thingurl_api::description::DEFAULT_CONTEXT.into())),
            ),
            semantic_types: description.semantic_types,
            description: description.description,
        };

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let event_history = ctx.settings.event_history;

        debug!(
            device = %id,
            properties = properties.len(),
            push = matches!(mode, SyncMode::Push { .. }),
            "device built"
        );

        Ok(Self {
            inner: Arc::new(DeviceInner {
                id,
                info,
                url,
                discovery_url,
                base,
                mode,
                actions_url: classified.actions_url,
                events_url: classified.events_url,
                links: classified.links,
                actions: description.actions,
                events: description.events,
                client,
                settings: ctx.settings,
                notifier: ctx.notifier,
                properties: properties
                    .into_iter()
                    .map(|p| (p.name.clone(), p))
                    .collect(),
                requested_actions: DashMap::new(),
                dedup: Mutex::new(EventDedup::new(event_history)),
                push_tx: ArcSwapOption::empty(),
                state,
                cancel: CancellationToken::new(),
                started: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                task: tokio::sync::Mutex::new(None),
            }),
        })
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn id(&self) -> &DeviceId {
        &self.inner.id
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.inner.info
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn discovery_url(&self) -> &str {
        &self.inner.discovery_url
    }

    pub fn sync_mode(&self) -> &SyncMode {
        &self.inner.mode
    }

    pub fn actions_url(&self) -> Option<&Url> {
        self.inner.actions_url.as_ref()
    }

    pub fn events_url(&self) -> Option<&Url> {
        self.inner.events_url.as_ref()
    }

    /// Host-visible links (proxy-flagged where not absolute http).
    pub fn links(&self) -> &[Link] {
        &self.inner.links
    }

    pub fn action_descriptions(&self) -> &BTreeMap<String, InteractionDescription> {
        &self.inner.actions
    }

    pub fn event_descriptions(&self) -> &BTreeMap<String, InteractionDescription> {
        &self.inner.events
    }

    pub fn property(&self, name: &str) -> Option<Property> {
        self.inner.properties.get(name).map(|p| p.clone())
    }

    /// Snapshot of all properties, sorted by name.
    pub fn properties(&self) -> Vec<Property> {
        let mut all: Vec<Property> = self.inner.properties.iter().map(|p| p.clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Action requests currently tracked, keyed by device-assigned href.
    pub fn requested_actions(&self) -> Vec<(String, Action)> {
        self.inner
            .requested_actions
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// `true` if both handles refer to the same device instance.
    pub fn ptr_eq(&self, other: &Device) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_closing(&self) -> bool {
        *self.inner.state.borrow() == ConnectionState::Closing
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start the sync task. Idempotent; a no-op once closing.
    pub async fn start_reading(&self) {
        if self.is_closing() || self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let device = self.clone();
        let handle = match self.inner.mode.clone() {
            SyncMode::Push { url } => tokio::spawn(device.run_push(url)),
            SyncMode::Pull => tokio::spawn(device.run_poll()),
        };
        *self.inner.task.lock().await = Some(handle);
        info!(device = %self.id(), mode = ?self.inner.mode, "started reading");
    }

    /// Stop syncing for good: no further reconnects or polls.
    pub async fn close(&self) {
        self.inner.state.send_replace(ConnectionState::Closing);
        self.inner.cancel.cancel();
        self.inner.push_tx.store(None);

        if let Some(handle) = self.inner.task.lock().await.take() {
            let _ = handle.await;
        }
        debug!(device = %self.id(), "device closed");
    }

    // ── Actions ──────────────────────────────────────────────────────

    /// Issue an action request.
    ///
    /// The action is started and announced before the request is sent.
    /// On success it is tracked under the href the device returned; on
    /// failure its status becomes `error`. Never retried.
    pub async fn perform_action(&self, mut action: Action) -> Action {
        action.start();
        self.notify_action(&action);

        let result = match &self.inner.actions_url {
            Some(url) => self
                .inner
                .client
                .request_action(url, &action.name, action.input.as_ref())
                .await
                .map_err(CoreError::from),
            None => Err(CoreError::Api {
                message: "device has no actions endpoint".into(),
                status: None,
            }),
        };

        match result {
            Ok(href) => {
                debug!(device = %self.id(), action = %action.name, href = %href, "action accepted");
                action.href = Some(href.clone());
                self.inner.requested_actions.insert(href, action.clone());
            }
            Err(e) => {
                warn!(device = %self.id(), action = %action.name, error = %e, "Failed to perform action");
                action.status = ActionStatus::Error;
                self.notify_action(&action);
            }
        }

        action
    }

    /// Cancel a tracked action request.
    ///
    /// The DELETE is best-effort; matching requests stop being tracked
    /// regardless. Returns `true` if any request matched.
    pub async fn cancel_action(&self, action_id: &str, name: &str) -> bool {
        let hrefs: Vec<String> = self
            .inner
            .requested_actions
            .iter()
            .filter(|e| e.id == action_id && e.name == name)
            .map(|e| e.key().clone())
            .collect();

        for href in &hrefs {
            if let Some(url) = links::resolve(&self.inner.base, href) {
                if let Err(e) = self.inner.client.cancel_action(&url).await {
                    warn!(device = %self.id(), href = %href, error = %e, "Failed to cancel action");
                }
            }
            self.inner.requested_actions.remove(href);
        }

        !hrefs.is_empty()
    }

    // ── Inbound updates (shared by push and pull) ────────────────────

    /// Update a cached property value, notifying on change.
    ///
    /// Unknown property names are ignored.
    pub(crate) fn update_property(&self, name: &str, value: Value) {
        let changed = match self.inner.properties.get_mut(name) {
            Some(mut property) => property.set_cached_value(value.clone()),
            None => {
                debug!(device = %self.id(), property = name, "ignoring update for unknown property");
                return;
            }
        };
        if changed {
            self.notify_property(name, &value);
        }
    }

    /// Overwrite a cached value without comparing.
    pub(crate) fn store_property(&self, name: &str, value: Value) {
        if let Some(mut property) = self.inner.properties.get_mut(name) {
            property.set_cached_value(value);
        }
    }

    /// Apply a status report to the tracked request with the same href.
    ///
    /// With `only_on_change`, reports that leave the status as-is are not
    /// announced.
    pub(crate) fn apply_action_report(&self, report: &ActionReport, only_on_change: bool) {
        let Some(href) = report.href.as_deref() else {
            return;
        };
        let updated = match self.inner.requested_actions.get_mut(href) {
            Some(mut action) => {
                let changed = action.apply_report(report);
                (changed || !only_on_change).then(|| action.clone())
            }
            None => return,
        };
        if let Some(action) = updated {
            self.notify_action(&action);
        }
    }

    /// Deliver an event unless its identity was already seen.
    pub(crate) fn handle_event(&self, name: &str, report: EventReport) {
        let id = Event::dedup_id(name, &report);
        let fresh = self
            .inner
            .dedup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(&id);
        if !fresh {
            debug!(device = %self.id(), event = name, id = %id, "dropping duplicate event");
            return;
        }
        self.inner.notifier.send(AdapterEvent::Event {
            id: self.id().clone(),
            event: Event::from_report(name, report),
        });
    }

    // ── Notifications ────────────────────────────────────────────────

    pub(crate) fn notify_property(&self, name: &str, value: &Value) {
        self.inner.notifier.send(AdapterEvent::PropertyChanged {
            id: self.id().clone(),
            name: name.to_owned(),
            value: value.clone(),
        });
    }

    fn notify_action(&self, action: &Action) {
        self.inner.notifier.send(AdapterEvent::ActionStatus {
            id: self.id().clone(),
            action: action.clone(),
        });
    }

    /// Record connectivity. Announced on transitions only; a closing
    /// device still announces loss of connectivity but stays closing.
    pub(crate) fn set_connected(&self, connected: bool) {
        let next = if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        self.inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Closing || *state == next {
                return false;
            }
            *state = next;
            true
        });
        if self.inner.connected.swap(connected, Ordering::SeqCst) != connected {
            self.inner.notifier.send(AdapterEvent::ConnectivityChanged {
                id: self.id().clone(),
                connected,
            });
        }
    }

    pub(crate) fn set_connecting(&self) {
        self.inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn event_names(&self) -> Vec<String> {
        self.inner.events.keys().cloned().collect()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.inner.id)
            .field("url", &self.inner.url.as_str())
            .field("mode", &self.inner.mode)
            .finish_non_exhaustive()
    }
}

/// `scheme://host[:port]` of a URL, as a base for relative hrefs.
pub(crate) fn origin_of(url: &Url) -> Result<Url, CoreError> {
    let origin = url.origin().ascii_serialization();
    Url::parse(&origin).map_err(|e| CoreError::InvalidDescription {
        message: format!("thing URL {url} has no usable origin: {e}"),
    })
}

async fn fetch_initial_properties(
    client: &ThingClient,
    base: &Url,
    id: &DeviceId,
    description: &ThingDescription,
) -> Vec<Property> {
    let reads = description.properties.iter().map(|(name, prop)| async move {
        let Some(href) = prop.resource_href() else {
            warn!(device = %id, property = %name, "property has no href, skipping");
            return None;
        };
        let url = links::resolve(base, href)?;
        match client.get_property(&url, name).await {
            Ok(value) => Some(Property::new(name.clone(), url, prop.clone(), value)),
            Err(e) => {
                warn!(device = %id, property = %name, error = %e, "Failed to read initial property value");
                None
            }
        }
    });

    join_all(reads).await.into_iter().flatten().collect()
}
