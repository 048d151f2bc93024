// ── Adapter ──
//
// Owns the known-URL table and the device registry, drives discovery
// sources, and creates, replaces and removes devices.
//
// Mutations are serialized per key: a URL lock around every load/unload
// of that URL, a device lock around every add/remove of that id. When both
// are held, the URL lock is taken first.

mod load;
mod locks;

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use thingurl_api::{Authentication, ThingDescription};

use crate::config::AdapterConfig;
use crate::device::{Device, DeviceContext};
use crate::discovery::{DiscoveryEvent, DiscoverySource, ServiceChange};
use crate::error::CoreError;
use crate::model::{DeviceId, KnownUrl, ThingUrl, normalize_href};
use crate::notify::{AdapterEvent, Notifier};
use crate::registry::Registry;
use crate::store::UrlStore;

pub use self::load::LoadOutcome;
use self::locks::KeyedLocks;

const EVENT_CHANNEL_SIZE: usize = 1024;

/// The discovery manager and device registry. Cheap to clone.
#[derive(Clone)]
pub struct Adapter {
    inner: Arc<AdapterInner>,
}

struct AdapterInner {
    settings: Arc<AdapterConfig>,
    http: reqwest::Client,
    known_urls: DashMap<String, KnownUrl>,
    /// Cancelled when the URL is unloaded so retrying loads stop.
    pending_loads: DashMap<String, CancellationToken>,
    devices: Registry<Device>,
    /// Ids the user has opted in to; only these sync actively.
    saved: DashSet<DeviceId>,
    url_locks: KeyedLocks,
    device_locks: KeyedLocks,
    notifier: Notifier,
    store: Arc<dyn UrlStore>,
    sources: Mutex<Vec<Arc<dyn DiscoverySource>>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Adapter {
    /// Create an adapter. Nothing is loaded until [`start`](Self::start)
    /// or [`load_thing`](Self::load_thing) is called.
    pub fn new(config: AdapterConfig, store: Arc<dyn UrlStore>) -> Result<Self, CoreError> {
        let http = config.transport().build_client()?;

        Ok(Self {
            inner: Arc::new(AdapterInner {
                settings: Arc::new(config),
                http,
                known_urls: DashMap::new(),
                pending_loads: DashMap::new(),
                devices: Registry::new(),
                saved: DashSet::new(),
                url_locks: KeyedLocks::new(),
                device_locks: KeyedLocks::new(),
                notifier: Notifier::new(EVENT_CHANNEL_SIZE),
                store,
                sources: Mutex::new(Vec::new()),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.inner.settings
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Load every saved URL, then start discovery.
    ///
    /// URLs that fail to load are only logged.
    pub async fn start(&self) -> Result<(), CoreError> {
        let urls = self.inner.store.saved_urls()?;
        info!(count = urls.len(), "loading configured URLs");

        let loads = urls.into_iter().map(|url| self.load_thing(url));
        for outcome in join_all(loads).await {
            debug!(?outcome, "configured URL loaded");
        }

        self.start_discovery().await
    }

    /// Register a discovery source. Takes effect on the next
    /// [`start_discovery`](Self::start_discovery).
    pub async fn add_source(&self, source: Arc<dyn DiscoverySource>) {
        self.inner.sources.lock().await.push(source);
    }

    /// Start every registered source and dispatch its events.
    ///
    /// Events from one source are handled in order.
    pub async fn start_discovery(&self) -> Result<(), CoreError> {
        let sources = self.inner.sources.lock().await.clone();
        let mut handles = self.inner.task_handles.lock().await;

        for source in sources {
            let mut rx = source.start()?;
            let adapter = self.clone();
            let cancel = self.inner.cancel.clone();
            let name = source.name().to_owned();
            info!(source = %name, "discovery source started");

            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        event = rx.recv() => match event {
                            Some(event) => adapter.handle_discovery(event).await,
                            None => break,
                        },
                    }
                }
                debug!(source = %name, "discovery dispatcher exited");
            }));
        }

        Ok(())
    }

    /// Apply one discovery event: Up loads the advertised URL, Down
    /// unloads it.
    pub async fn handle_discovery(&self, event: DiscoveryEvent) {
        let Some(href) = event.thing_url() else {
            debug!(kind = ?event.kind, host = %event.service.host, "service is not a web thing");
            return;
        };

        match event.change {
            ServiceChange::Up => {
                let outcome = self.load_thing(ThingUrl::new(href)).await;
                debug!(?outcome, "discovered URL loaded");
            }
            ServiceChange::Down => self.unload_thing(&href).await,
        }
    }

    /// Stop discovery and close every device's connection.
    pub async fn unload(&self) {
        self.inner.cancel.cancel();

        for source in self.inner.sources.lock().await.iter() {
            source.stop();
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        for device in self.inner.devices.snapshot().iter() {
            device.close().await;
        }
        info!("adapter unloaded");
    }

    // ── Device registry ──────────────────────────────────────────────

    /// Create and register a device.
    ///
    /// Fails if `id` is already registered. Properties whose initial read
    /// fails are left out rather than failing the whole device.
    pub async fn add_device(
        &self,
        id: DeviceId,
        url: &str,
        authentication: Authentication,
        description: ThingDescription,
        discovery_url: &str,
    ) -> Result<Device, CoreError> {
        let _guard = self.inner.device_locks.lock(id.as_str()).await;
        self.add_device_locked(id, url, authentication, description, discovery_url)
            .await
    }

    async fn add_device_locked(
        &self,
        id: DeviceId,
        url: &str,
        authentication: Authentication,
        description: ThingDescription,
        discovery_url: &str,
    ) -> Result<Device, CoreError> {
        if self.inner.devices.contains(&id) {
            return Err(CoreError::DeviceExists { id: id.to_string() });
        }

        let url = Url::parse(url).map_err(|e| CoreError::InvalidDescription {
            message: format!("invalid thing URL {url}: {e}"),
        })?;
        let ctx = DeviceContext {
            http: self.inner.http.clone(),
            settings: Arc::clone(&self.inner.settings),
            notifier: self.inner.notifier.clone(),
        };
        let device = Device::build(
            ctx,
            id.clone(),
            url,
            authentication,
            description,
            normalize_href(discovery_url).to_owned(),
        )
        .await?;

        if !self.inner.devices.insert(id.clone(), device.clone()) {
            return Err(CoreError::DeviceExists { id: id.to_string() });
        }
        info!(device = %id, title = ?device.info().title, "device added");
        self.inner
            .notifier
            .send(AdapterEvent::DeviceAdded { id: id.clone() });

        if self.inner.saved.contains(&id) {
            device.start_reading().await;
        }

        Ok(device)
    }

    /// Remove a registered device and close its connection.
    ///
    /// The device's URL is always dropped from the persisted list;
    /// persistence failures are logged only. A user removal
    /// (`internal == false`) also forgets the saved flag.
    pub async fn remove_thing(&self, id: &DeviceId, internal: bool) -> Result<Device, CoreError> {
        let _guard = self.inner.device_locks.lock(id.as_str()).await;
        self.remove_locked(id, internal).await
    }

    async fn remove_locked(&self, id: &DeviceId, internal: bool) -> Result<Device, CoreError> {
        let Some(device) = self.inner.devices.get(id) else {
            return Err(CoreError::DeviceNotFound { id: id.to_string() });
        };

        self.remove_from_store(&device, !internal);
        if !internal {
            self.inner.saved.remove(id);
        }

        self.inner.devices.remove(id);
        self.inner
            .notifier
            .send(AdapterEvent::DeviceRemoved { id: id.clone() });
        device.close().await;
        info!(device = %id, internal, "device removed");

        Ok(device)
    }

    /// Drop the device's URLs from the persisted list. `forget_known` also
    /// clears the matching fetch record; a replacement keeps the one it just
    /// wrote.
    fn remove_from_store(&self, device: &Device, forget_known: bool) {
        for href in [device.url().as_str(), device.discovery_url()] {
            match self.inner.store.remove_url(href) {
                Ok(true) => {
                    let href = normalize_href(href);
                    if forget_known {
                        self.inner.known_urls.remove(href);
                    }
                    debug!(device = %device.id(), href, "removed URL from saved list");
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(device = %device.id(), error = %e, "Failed to remove device from config");
                }
            }
        }
    }

    /// Close and remove every device loaded from `discovery_url`, and
    /// forget the URL.
    pub async fn unload_thing(&self, discovery_url: &str) {
        let href = normalize_href(discovery_url).to_owned();
        if let Some((_, pending)) = self.inner.pending_loads.remove(&href) {
            pending.cancel();
        }
        let _url_guard = self.inner.url_locks.lock(&href).await;

        let matching: Vec<DeviceId> = self
            .inner
            .devices
            .snapshot()
            .iter()
            .filter(|d| d.discovery_url() == href)
            .map(|d| d.id().clone())
            .collect();

        for id in matching {
            let _guard = self.inner.device_locks.lock(id.as_str()).await;
            // Already gone if a concurrent removal won the lock first.
            if let Err(e) = self.remove_locked(&id, true).await {
                debug!(device = %id, error = %e, "device already removed");
            }
        }

        self.inner.known_urls.remove(&href);
        info!(href = %href, "unloaded URL");
    }

    /// Mark a device as saved by the user and start syncing it if loaded.
    pub async fn handle_device_saved(&self, id: &DeviceId) {
        self.inner.saved.insert(id.clone());
        if let Some(device) = self.inner.devices.get(id) {
            device.start_reading().await;
        }
    }

    /// Reload every known URL.
    pub async fn start_pairing(&self) {
        let urls: Vec<ThingUrl> = self
            .inner
            .known_urls
            .iter()
            .map(|k| k.to_thing_url())
            .collect();
        debug!(count = urls.len(), "pairing: reloading known URLs");
        join_all(urls.into_iter().map(|url| self.load_thing(url))).await;
    }

    // ── Device operations ────────────────────────────────────────────

    /// Set a property on a registered device.
    pub async fn set_property(
        &self,
        id: &DeviceId,
        name: &str,
        value: Value,
    ) -> Result<Value, CoreError> {
        self.require_device(id)?.set_property(name, value).await
    }

    fn require_device(&self, id: &DeviceId) -> Result<Device, CoreError> {
        self.inner
            .devices
            .get(id)
            .ok_or_else(|| CoreError::DeviceNotFound { id: id.to_string() })
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.inner.notifier.subscribe()
    }

    pub fn device(&self, id: &DeviceId) -> Option<Device> {
        self.inner.devices.get(id)
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.inner.devices.ids()
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Device>> {
        self.inner.devices.snapshot()
    }

    pub fn devices(&self) -> watch::Receiver<Arc<Vec<Device>>> {
        self.inner.devices.subscribe()
    }

    pub fn known_url(&self, href: &str) -> Option<KnownUrl> {
        self.inner
            .known_urls
            .get(normalize_href(href))
            .map(|k| k.clone())
    }

    pub fn is_saved(&self, id: &DeviceId) -> bool {
        self.inner.saved.contains(id)
    }
}
