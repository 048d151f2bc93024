// ── Discovered URL bookkeeping ──

use std::time::Instant;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use thingurl_api::Authentication;

/// A URL to load things from, with the credentials to use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThingUrl {
    pub href: String,
    #[serde(default)]
    pub authentication: Authentication,
}

impl ThingUrl {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            authentication: Authentication::None,
        }
    }

    pub fn with_authentication(mut self, authentication: Authentication) -> Self {
        self.authentication = authentication;
        self
    }
}

/// Adapter-level record of a previously observed discovery URL.
#[derive(Debug, Clone)]
pub struct KnownUrl {
    /// Normalized href (no trailing slash).
    pub href: String,
    pub authentication: Authentication,
    /// Digest of the last successfully fetched description body.
    pub content_digest: Option<String>,
    /// When the description was last fetched successfully.
    pub last_fetched_at: Option<Instant>,
}

impl KnownUrl {
    pub fn new(href: String, authentication: Authentication) -> Self {
        Self {
            href,
            authentication,
            content_digest: None,
            last_fetched_at: None,
        }
    }

    pub fn to_thing_url(&self) -> ThingUrl {
        ThingUrl {
            href: self.href.clone(),
            authentication: self.authentication.clone(),
        }
    }
}

/// Strip one trailing slash.
pub fn normalize_href(href: &str) -> &str {
    href.strip_suffix('/').unwrap_or(href)
}

/// Hex digest of a description body.
pub fn content_digest(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}
