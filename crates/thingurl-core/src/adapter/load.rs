// ── Loading descriptions ──

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use thingurl_api::{Authentication, ThingClient, parse_descriptions};

use super::Adapter;
use crate::device::origin_of;
use crate::error::CoreError;
use crate::model::{DeviceId, KnownUrl, ThingUrl, content_digest, normalize_href};

/// What a [`load_thing`](Adapter::load_thing) call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Fetched successfully within the rate-limit window; nothing done.
    RateLimited,
    /// Every fetch attempt failed.
    Unreachable,
    /// The URL or the fetched body was unusable.
    Invalid,
    /// The URL was unloaded, or the adapter shut down, while the load was
    /// pending.
    Cancelled,
    Loaded {
        /// Devices created or replaced.
        added: Vec<DeviceId>,
        /// Devices left alone because the description is unchanged.
        unchanged: Vec<DeviceId>,
    },
}

enum Attempt {
    Done(LoadOutcome),
    Failed(CoreError),
}

impl Adapter {
    /// Fetch the description(s) at a URL and create, replace or keep the
    /// matching devices.
    ///
    /// Fetch failures are retried a bounded number of times; nothing here
    /// fails hard.
    pub async fn load_thing(&self, url: ThingUrl) -> LoadOutcome {
        let href = normalize_href(&url.href).to_owned();
        let retry = self.inner.settings.load_retry;
        let pending = self.pending_load(&href);
        let mut attempt = 0;

        loop {
            match self.try_load(&href, &url.authentication, &pending).await {
                Attempt::Done(outcome) => return outcome,
                Attempt::Failed(e) if attempt >= retry.max_retries => {
                    error!(href = %href, error = %e, "Failed to connect, giving up");
                    return LoadOutcome::Unreachable;
                }
                Attempt::Failed(e) => {
                    attempt += 1;
                    warn!(href = %href, attempt, error = %e, "description fetch failed, retrying");
                    tokio::select! {
                        biased;
                        () = pending.cancelled() => {
                            debug!(href = %href, "load cancelled while waiting to retry");
                            return LoadOutcome::Cancelled;
                        }
                        () = tokio::time::sleep(retry.delay) => {}
                    }
                }
            }
        }
    }

    /// Token shared by every load of `href` until the URL is unloaded.
    fn pending_load(&self, href: &str) -> CancellationToken {
        self.inner
            .pending_loads
            .entry(href.to_owned())
            .or_insert_with(|| self.inner.cancel.child_token())
            .clone()
    }

    async fn try_load(
        &self,
        href: &str,
        authentication: &Authentication,
        pending: &CancellationToken,
    ) -> Attempt {
        let _url_guard = self.inner.url_locks.lock(href).await;
        if pending.is_cancelled() {
            return Attempt::Done(LoadOutcome::Cancelled);
        }

        let previous_digest = {
            let entry = self
                .inner
                .known_urls
                .entry(href.to_owned())
                .or_insert_with(|| KnownUrl::new(href.to_owned(), authentication.clone()));
            if entry
                .last_fetched_at
                .is_some_and(|at| at.elapsed() < self.inner.settings.rate_limit)
            {
                debug!(href, "fetched recently, skipping");
                return Attempt::Done(LoadOutcome::RateLimited);
            }
            entry.content_digest.clone()
        };

        let fetch_url = match Url::parse(href) {
            Ok(u) => u,
            Err(e) => {
                warn!(href, error = %e, "invalid thing URL");
                return Attempt::Done(LoadOutcome::Invalid);
            }
        };

        let client = ThingClient::new(self.inner.http.clone(), authentication.clone());
        let body = match client.fetch_description(&fetch_url).await {
            Ok(body) => body,
            Err(e) => return Attempt::Failed(e.into()),
        };

        let digest = content_digest(&body);
        let unchanged = previous_digest.as_deref() == Some(digest.as_str());
        self.inner.known_urls.insert(
            href.to_owned(),
            KnownUrl {
                href: href.to_owned(),
                authentication: authentication.clone(),
                content_digest: Some(digest),
                last_fetched_at: Some(Instant::now()),
            },
        );

        let descriptions = match parse_descriptions(&body) {
            Ok(d) => d,
            Err(e) => {
                warn!(href, error = %e, "Failed to parse description");
                return Attempt::Done(LoadOutcome::Invalid);
            }
        };

        let mut added = Vec::new();
        let mut kept = Vec::new();

        for (index, parsed) in descriptions.into_iter().enumerate() {
            let description = match parsed {
                Ok(d) => d,
                Err(e) => {
                    warn!(href, index, error = %e, "skipping malformed description");
                    continue;
                }
            };
            let thing_url = match description.href.as_deref() {
                Some(rel) => match origin_of(&fetch_url).and_then(|base| {
                    base.join(rel).map_err(|e| CoreError::InvalidDescription {
                        message: format!("bad thing href {rel}: {e}"),
                    })
                }) {
                    Ok(u) => u.to_string(),
                    Err(e) => {
                        warn!(href, error = %e, "skipping thing with unusable href");
                        continue;
                    }
                },
                None => href.to_owned(),
            };
            let id = DeviceId::from_url(&thing_url);

            let _guard = self.inner.device_locks.lock(id.as_str()).await;
            if self.inner.devices.contains(&id) {
                if unchanged {
                    kept.push(id);
                    continue;
                }
                info!(device = %id, "description changed, replacing device");
                if let Err(e) = self.remove_locked(&id, true).await {
                    warn!(device = %id, error = %e, "failed to remove outdated device");
                }
            }

            match self
                .add_device_locked(id.clone(), &thing_url, authentication.clone(), description, href)
                .await
            {
                Ok(_) => added.push(id),
                Err(e) => warn!(device = %id, error = %e, "Failed to add device"),
            }
        }

        Attempt::Done(LoadOutcome::Loaded {
            added,
            unchanged: kept,
        })
    }
}
