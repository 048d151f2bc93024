// Thing description wire types.
//
// Only the fields the adapter acts on are typed; everything else a
// description carries is kept in `extra` so it can be surfaced unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Default `@context` for descriptions that omit one.
pub const DEFAULT_CONTEXT: &str = "https://iot.mozilla.org/schemas";

/// A link entry from a description's `links` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel: Option<String>,
    #[serde(default)]
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Set when `href` is not an absolute http(s) URL and the host has to
    /// proxy it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub proxy: bool,
}

impl Link {
    pub fn rel_is(&self, rel: &str) -> bool {
        self.rel.as_deref() == Some(rel)
    }

    /// `true` for absolute `http://` / `https://` hrefs.
    pub fn is_absolute_http(&self) -> bool {
        self.href.starts_with("http://") || self.href.starts_with("https://")
    }

    /// `true` for `ws://` / `wss://` hrefs.
    pub fn is_websocket(&self) -> bool {
        self.href.starts_with("ws://") || self.href.starts_with("wss://")
    }

    /// Flag the link for host-side proxying when it is not absolute http(s).
    pub fn flag_proxy(&mut self) {
        if !self.is_absolute_http() {
            self.proxy = true;
        }
    }
}

/// Flag every non-absolute link in a list for proxying.
pub fn flag_proxy_links(links: &mut [Link]) {
    for link in links {
        link.flag_proxy();
    }
}

/// A property entry from a description's `properties` map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(
        default,
        deserialize_with = "links_with_href",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub links: Vec<Link>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PropertyDescription {
    /// The href the property is read and written through: the first link
    /// whose `rel` is absent or `property`, else the description's own `href`.
    pub fn resource_href(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel.is_none() || l.rel_is("property"))
            .map(|l| l.href.as_str())
            .or(self.href.as_deref())
    }
}

/// An action or event entry. Both are opaque apart from their links.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionDescription {
    #[serde(
        default,
        deserialize_with = "links_with_href",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub links: Vec<Link>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A Thing description as served by a device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThingDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub thing_type: Option<serde_json::Value>,
    #[serde(default, rename = "@context", skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    /// `@type`, as a single tag or a list.
    #[serde(
        default,
        rename = "@type",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub semantic_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Relative href of this thing on a multi-thing endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDescription>,
    #[serde(default)]
    pub actions: BTreeMap<String, InteractionDescription>,
    #[serde(default)]
    pub events: BTreeMap<String, InteractionDescription>,
    #[serde(default, deserialize_with = "links_with_href")]
    pub links: Vec<Link>,
}

impl ThingDescription {
    /// Display title: `title`, falling back to `name`.
    pub fn display_title(&self) -> Option<&str> {
        self.title.as_deref().or(self.name.as_deref())
    }
}

/// Parse a description endpoint body: either one description or an array
/// of them (multi-thing endpoint).
///
/// Only a body that is not JSON fails as a whole. Each description is
/// decoded on its own, so one malformed entry does not hide its siblings.
pub fn parse_descriptions(
    body: &str,
) -> Result<Vec<Result<ThingDescription, crate::Error>>, crate::Error> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| crate::Error::Deserialization {
            message: e.to_string(),
            body: body.to_owned(),
        })?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };

    Ok(items
        .into_iter()
        .map(|item| {
            let raw = item.to_string();
            serde_json::from_value(item).map_err(|e| crate::Error::Deserialization {
                message: e.to_string(),
                body: raw,
            })
        })
        .collect())
}

// ── Lenient field decoders ──

/// Accepts `"Light"`, `["Light", "OnOffSwitch"]` or `null`.
fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(tag)) => vec![tag],
        Some(OneOrMany::Many(tags)) => tags,
        None => Vec::new(),
    })
}

/// Drops links without an `href`; they cannot be followed or proxied.
fn links_with_href<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Link>, D::Error> {
    let links = Option::<Vec<Link>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(links.into_iter().filter(|l| !l.href.is_empty()).collect())
}
