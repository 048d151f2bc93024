// ── Push-mode sync ──
//
// One WebSocket per device. Reconnects with exponential backoff until the
// device is closed; a successful open resets the backoff.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use thingurl_api::websocket::{self, PushStream};
use thingurl_api::{Backoff, InboundMessage, OutboundMessage};

use super::{Device, OUTBOUND_CHANNEL_SIZE};

impl Device {
    pub(crate) async fn run_push(self, ws_url: String) {
        let url = match websocket::push_url(&ws_url, self.inner.client.authentication()) {
            Ok(url) => url,
            Err(e) => {
                warn!(device = %self.id(), url = %ws_url, error = %e, "invalid push channel URL");
                return;
            }
        };
        let cancel = self.cancel_token().clone();
        let mut backoff = Backoff::new(self.inner.settings.reconnect);

        loop {
            if self.is_closing() {
                break;
            }
            self.set_connecting();

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                r = websocket::connect(&url) => r,
            };

            match result {
                Ok(stream) => {
                    backoff.reset();
                    info!(device = %self.id(), "push channel open");
                    self.run_connection(stream).await;
                }
                Err(e) if e.is_transient() => {
                    debug!(device = %self.id(), error = %e, "push channel unreachable");
                }
                Err(e) => {
                    warn!(device = %self.id(), error = %e, "push channel connect failed");
                }
            }

            self.inner.push_tx.store(None);
            self.set_connected(false);

            if self.is_closing() {
                break;
            }

            let delay = backoff.delay();
            debug!(device = %self.id(), delay_ms = delay.as_millis(), "reconnecting push channel");
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
            backoff.record_failure();
        }

        self.inner.push_tx.store(None);
        debug!(device = %self.id(), "push loop exited");
    }

    /// Drive one open connection until it closes, fails, or the device is
    /// closed.
    async fn run_connection(&self, stream: PushStream) {
        let (mut write, mut read) = stream.split();
        let (tx, mut rx) = mpsc::channel(OUTBOUND_CHANNEL_SIZE);
        self.inner.push_tx.store(Some(Arc::new(tx)));
        self.set_connected(true);

        let events = self.event_names();
        if !events.is_empty() {
            let subscribe = OutboundMessage::AddEventSubscription(events);
            if let Err(e) = write.send(subscribe.to_frame()).await {
                warn!(device = %self.id(), error = %e, "failed to subscribe to events");
                return;
            }
        }

        let period = self.inner.settings.ping_interval;
        let mut ping = interval_at(Instant::now() + period, period);
        let cancel = self.cancel_token();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let close = write.send(Message::Close(None));
                    if tokio::time::timeout(self.inner.settings.timeout, close).await.is_err() {
                        debug!(device = %self.id(), "close frame timed out");
                    }
                    return;
                }
                _ = ping.tick() => {
                    if let Err(e) = write.send(Message::Ping(Default::default())).await {
                        warn!(device = %self.id(), error = %e, "keepalive ping failed");
                        return;
                    }
                }
                Some(outbound) = rx.recv() => {
                    if let Err(e) = write.send(outbound.to_frame()).await {
                        warn!(device = %self.id(), error = %e, "push channel send failed");
                        return;
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_push_message(text.as_str()),
                    Some(Ok(Message::Close(frame))) => {
                        info!(device = %self.id(), ?frame, "push channel closed by device");
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(device = %self.id(), error = %e, "push channel error");
                        return;
                    }
                    None => {
                        info!(device = %self.id(), "push channel stream ended");
                        return;
                    }
                },
            }
        }
    }

    fn handle_push_message(&self, text: &str) {
        let message = match InboundMessage::decode(text) {
            Ok(m) => m,
            Err(e) => {
                warn!(device = %self.id(), error = %e, "undecodable push message");
                return;
            }
        };

        match message {
            InboundMessage::PropertyStatus(values) => {
                for (name, value) in values {
                    self.update_property(&name, value);
                }
            }
            InboundMessage::ActionStatus(reports) => {
                for (_, report) in &reports {
                    self.apply_action_report(report, false);
                }
            }
            InboundMessage::Event(events) => {
                for (name, report) in events {
                    self.handle_event(&name, report);
                }
            }
            InboundMessage::Unrecognized { message_type, .. } => {
                debug!(device = %self.id(), message_type = %message_type, "ignoring push message");
            }
        }
    }
}
