// ── Domain model ──
//
// Canonical types shared by the adapter, the device sync engine and the
// host: identities, action requests, events and URL bookkeeping.

mod action;
mod device_id;
mod event;
mod known_url;

pub use action::{Action, ActionStatus};
pub use device_id::DeviceId;
pub use event::Event;
pub use known_url::{KnownUrl, ThingUrl, content_digest, normalize_href};
