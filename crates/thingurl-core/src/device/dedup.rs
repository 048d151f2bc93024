// Event dedup gate.

use std::collections::{HashSet, VecDeque};

/// Remembers which event identities were already delivered.
///
/// Bounded: once `capacity` identities are held, the oldest is forgotten
/// to make room.
#[derive(Debug)]
pub(crate) struct EventDedup {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl EventDedup {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record an identity. Returns `true` if it had not been seen.
    pub(crate) fn insert(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }

        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }

        self.seen.insert(id.to_owned());
        self.order.push_back(id.to_owned());
        true
    }
}
