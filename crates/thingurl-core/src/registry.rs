// ── Device registry ──
//
// Concurrent id -> device map with a watch-published snapshot, so hosts
// can observe the device list without polling.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

use crate::model::DeviceId;

/// Registered devices keyed by id.
pub(crate) struct Registry<T: Clone + Send + Sync + 'static> {
    by_id: DashMap<DeviceId, T>,
    /// Full snapshot, rebuilt on mutation.
    snapshot: watch::Sender<Arc<Vec<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Registry<T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_id: DashMap::new(),
            snapshot,
        }
    }

    /// Insert under a fresh id. Returns `false` (and leaves the map as-is)
    /// if the id is taken.
    pub(crate) fn insert(&self, id: DeviceId, item: T) -> bool {
        let inserted = match self.by_id.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(item);
                true
            }
        };
        if inserted {
            self.rebuild_snapshot();
        }
        inserted
    }

    pub(crate) fn remove(&self, id: &DeviceId) -> Option<T> {
        let removed = self.by_id.remove(id).map(|(_, v)| v);
        if removed.is_some() {
            self.rebuild_snapshot();
        }
        removed
    }

    pub(crate) fn get(&self, id: &DeviceId) -> Option<T> {
        self.by_id.get(id).map(|r| r.value().clone())
    }

    pub(crate) fn contains(&self, id: &DeviceId) -> bool {
        self.by_id.contains_key(id)
    }

    pub(crate) fn ids(&self) -> Vec<DeviceId> {
        self.by_id.iter().map(|r| r.key().clone()).collect()
    }

    pub(crate) fn snapshot(&self) -> Arc<Vec<T>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<T>>> {
        self.snapshot.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    fn rebuild_snapshot(&self) {
        let values: Vec<T> = self.by_id.iter().map(|r| r.value().clone()).collect();
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
