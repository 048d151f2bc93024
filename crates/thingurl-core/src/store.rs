// ── Persisted URL list ──
//
// The adapter reads the saved URL list and drops entries when a device is
// removed by the user. Where the list lives is up to the host.

use std::sync::Mutex;

use crate::error::CoreError;
use crate::model::{ThingUrl, normalize_href};

/// Storage for the user's configured thing URLs.
pub trait UrlStore: Send + Sync {
    /// URLs to load at startup.
    fn saved_urls(&self) -> Result<Vec<ThingUrl>, CoreError>;

    /// Drop the entry for `href` (compared after normalization).
    ///
    /// Returns `true` if an entry was removed.
    fn remove_url(&self, href: &str) -> Result<bool, CoreError>;
}

/// In-memory store, for hosts that do not persist anything.
#[derive(Debug, Default)]
pub struct MemoryUrlStore {
    urls: Mutex<Vec<ThingUrl>>,
}

impl MemoryUrlStore {
    pub fn new(urls: Vec<ThingUrl>) -> Self {
        Self {
            urls: Mutex::new(urls),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<ThingUrl>>, CoreError> {
        self.urls
            .lock()
            .map_err(|_| CoreError::Internal("url store lock poisoned".into()))
    }
}

impl UrlStore for MemoryUrlStore {
    fn saved_urls(&self) -> Result<Vec<ThingUrl>, CoreError> {
        Ok(self.lock()?.clone())
    }

    fn remove_url(&self, href: &str) -> Result<bool, CoreError> {
        let target = normalize_href(href);
        let mut urls = self.lock()?;
        let before = urls.len();
        urls.retain(|u| normalize_href(&u.href) != target);
        Ok(urls.len() != before)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn remove_compares_normalized_hrefs() {
        let store = MemoryUrlStore::new(vec![
            ThingUrl::new("http://lamp.local/"),
            ThingUrl::new("http://plug.local"),
        ]);

        assert!(store.remove_url("http://lamp.local").unwrap());
        assert!(!store.remove_url("http://lamp.local").unwrap());

        let left: Vec<String> = store
            .saved_urls()
            .unwrap()
            .into_iter()
            .map(|u| u.href)
            .collect();
        assert_eq!(left, vec!["http://plug.local".to_owned()]);
    }
}
