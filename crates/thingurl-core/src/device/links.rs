// Top-level link classification.

use thingurl_api::Link;
use tracing::warn;
use url::Url;

/// Result of sorting a description's top-level links.
#[derive(Debug, Default)]
pub(crate) struct ClassifiedLinks {
    /// Links kept for the host (browsable pages and anything unrecognized).
    pub links: Vec<Link>,
    pub actions_url: Option<Url>,
    pub events_url: Option<Url>,
    /// Push channel endpoint (`ws://` / `wss://` alternate link).
    pub ws_url: Option<String>,
}

/// Sort top-level links into endpoints and host-visible links.
///
/// `properties` is implicit and dropped; `actions` / `events` set the
/// endpoint URLs; an `alternate` with a WebSocket scheme becomes the push
/// endpoint. Everything else is kept, proxy-flagged when not absolute http(s).
pub(crate) fn classify(links: &[Link], base: &Url) -> ClassifiedLinks {
    let mut out = ClassifiedLinks::default();

    for link in links {
        match link.rel.as_deref() {
            Some("properties") => {}
            Some("actions") => out.actions_url = resolve(base, &link.href),
            Some("events") => out.events_url = resolve(base, &link.href),
            Some("alternate")
                if link.media_type.as_deref() != Some("text/html") && link.is_websocket() =>
            {
                out.ws_url = Some(link.href.clone());
            }
            _ => {
                let mut link = link.clone();
                link.flag_proxy();
                out.links.push(link);
            }
        }
    }

    out
}

/// Resolve an href against the device origin; absolute hrefs pass through.
pub(crate) fn resolve(base: &Url, href: &str) -> Option<Url> {
    match base.join(href) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(href, error = %e, "ignoring unresolvable link");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn link(rel: Option<&str>, href: &str, media_type: Option<&str>) -> Link {
        Link {
            rel: rel.map(Into::into),
            href: href.into(),
            media_type: media_type.map(Into::into),
            proxy: false,
        }
    }

    #[test]
    fn sorts_links_by_relation() {
        let base = Url::parse("http://lamp.local:8888").unwrap();
        let links = vec![
            link(Some("properties"), "/properties", None),
            link(Some("actions"), "/actions", None),
            link(Some("events"), "/events", None),
            link(Some("alternate"), "ws://lamp.local:8888/", None),
            link(Some("alternate"), "/ui", Some("text/html")),
            link(Some("alternate"), "https://cloud.example/lamp", None),
            link(Some("icon"), "/icon.png", None),
        ];

        let out = classify(&links, &base);
        assert_eq!(out.actions_url.unwrap().as_str(), "http://lamp.local:8888/actions");
        assert_eq!(out.events_url.unwrap().as_str(), "http://lamp.local:8888/events");
        assert_eq!(out.ws_url.as_deref(), Some("ws://lamp.local:8888/"));

        let kept: Vec<(&str, bool)> = out.links.iter().map(|l| (l.href.as_str(), l.proxy)).collect();
        assert_eq!(
            kept,
            vec![
                ("/ui", true),
                ("https://cloud.example/lamp", false),
                ("/icon.png", true),
            ]
        );
    }

    #[test]
    fn no_websocket_link_means_no_push_endpoint() {
        let base = Url::parse("http://lamp.local").unwrap();
        let out = classify(&[link(Some("alternate"), "/ui", Some("text/html"))], &base);
        assert!(out.ws_url.is_none());
    }
}
