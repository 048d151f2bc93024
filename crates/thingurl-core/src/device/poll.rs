// ── Pull-mode sync ──

use futures_util::future::try_join_all;
use tracing::{debug, warn};

use super::Device;
use crate::error::CoreError;

impl Device {
    pub(crate) async fn run_poll(self) {
        let cancel = self.cancel_token().clone();
        let interval = self.inner.settings.poll_interval;
        self.set_connecting();

        loop {
            if self.is_closing() {
                break;
            }

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                r = self.poll_once() => r,
            };

            match result {
                Ok(()) => self.set_connected(true),
                Err(e) => {
                    warn!(device = %self.id(), error = %e, "poll cycle failed");
                    self.set_connected(false);
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }

        debug!(device = %self.id(), "poll loop exited");
    }

    /// Run one poll cycle: every property concurrently, then the actions
    /// listing, then the events listing. Stops at the first failure.
    pub async fn poll_once(&self) -> Result<(), CoreError> {
        let targets: Vec<(String, url::Url)> = self
            .inner
            .properties
            .iter()
            .map(|p| (p.name.clone(), p.url.clone()))
            .collect();

        let client = &self.inner.client;
        let values = try_join_all(targets.iter().map(|(name, url)| async move {
            client
                .get_property(url, name)
                .await
                .map(|value| (name.as_str(), value))
        }))
        .await?;

        for (name, value) in values {
            self.update_property(name, value);
        }

        if let Some(url) = self.actions_url() {
            for (_, report) in client.list_actions(url).await? {
                self.apply_action_report(&report, true);
            }
        }

        if let Some(url) = self.events_url() {
            for (name, report) in client.list_events(url).await? {
                self.handle_event(&name, report);
            }
        }

        Ok(())
    }
}
