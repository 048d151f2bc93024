// ── Host notifications ──
//
// Everything the host needs to mirror is pushed through one broadcast
// channel owned by the adapter. Devices hold a sender clone.

use serde_json::Value;
use tokio::sync::broadcast;

use crate::model::{Action, DeviceId, Event};

/// Connection state of a single device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal: entered on removal, no further reconnects or polls.
    Closing,
}

/// A change the host should observe.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    DeviceAdded { id: DeviceId },
    DeviceRemoved { id: DeviceId },
    PropertyChanged {
        id: DeviceId,
        name: String,
        value: Value,
    },
    ActionStatus { id: DeviceId, action: Action },
    Event { id: DeviceId, event: Event },
    ConnectivityChanged { id: DeviceId, connected: bool },
}

impl AdapterEvent {
    pub fn device_id(&self) -> &DeviceId {
        match self {
            Self::DeviceAdded { id }
            | Self::DeviceRemoved { id }
            | Self::PropertyChanged { id, .. }
            | Self::ActionStatus { id, .. }
            | Self::Event { id, .. }
            | Self::ConnectivityChanged { id, .. } => id,
        }
    }
}

/// Sender half of the notification bus.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<AdapterEvent>,
}

impl Notifier {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub(crate) fn send(&self, event: AdapterEvent) {
        // Ignore send errors -- just means no active subscribers right now
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.tx.subscribe()
    }
}
