// Web Thing HTTP client
//
// Wraps `reqwest::Client` with the per-thing authentication descriptor
// and the request/response shapes of the property, action and event
// resources. Every method is a single request; retry and polling policy
// belong to the caller.

use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::auth::{Authentication, headers};
use crate::error::Error;

/// Status report for one action, as listed by an actions endpoint or
/// returned from an invocation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReport {
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub time_requested: Option<String>,
    #[serde(default)]
    pub time_completed: Option<String>,
}

/// One event occurrence as listed by an events endpoint or pushed over
/// the WebSocket.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventReport {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// HTTP client bound to one authentication descriptor.
///
/// Cheap to clone: the inner `reqwest::Client` is reference counted.
#[derive(Debug, Clone)]
pub struct ThingClient {
    http: reqwest::Client,
    auth: Authentication,
}

impl ThingClient {
    pub fn new(http: reqwest::Client, auth: Authentication) -> Self {
        Self { http, auth }
    }

    pub fn authentication(&self) -> &Authentication {
        &self.auth
    }

    // ── Descriptions ─────────────────────────────────────────────────

    /// Fetch a description endpoint and return the raw body.
    ///
    /// The body is returned unparsed so the caller can digest it before
    /// deciding whether to decode it.
    pub async fn fetch_description(&self, url: &Url) -> Result<String, Error> {
        debug!("GET {}", url);
        let resp = self
            .request(Method::GET, url.clone(), false)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.text().await?)
    }

    // ── Properties ───────────────────────────────────────────────────

    /// Read a property: `GET {url}` → `{name: value}`.
    ///
    /// A response without the property's key yields `Value::Null`.
    pub async fn get_property(&self, url: &Url, name: &str) -> Result<Value, Error> {
        let mut body: Map<String, Value> = self.get_json(url).await?;
        Ok(body.remove(name).unwrap_or(Value::Null))
    }

    /// Write a property: `PUT {url}` with `{name: value}`.
    ///
    /// Returns the value the device reports back, which is authoritative
    /// and may differ from the one requested.
    pub async fn put_property(&self, url: &Url, name: &str, value: &Value) -> Result<Value, Error> {
        debug!("PUT {}", url);
        let mut payload = Map::new();
        payload.insert(name.to_owned(), value.clone());

        let resp = self
            .request(Method::PUT, url.clone(), true)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let mut body: Map<String, Value> = decode(resp).await?;
        Ok(body.remove(name).unwrap_or(Value::Null))
    }

    // ── Actions ──────────────────────────────────────────────────────

    /// List action requests: `GET {actions_url}` → `[{name: report}, ...]`.
    pub async fn list_actions(&self, url: &Url) -> Result<Vec<(String, ActionReport)>, Error> {
        let items: Vec<Map<String, Value>> = self.get_json(url).await?;
        items.into_iter().map(single_key).collect()
    }

    /// Invoke an action: `POST {actions_url}` with `{name: {input}}`.
    ///
    /// Returns the href of the created action resource.
    pub async fn request_action(
        &self,
        url: &Url,
        name: &str,
        input: Option<&Value>,
    ) -> Result<String, Error> {
        debug!("POST {}", url);
        let mut inner = Map::new();
        if let Some(input) = input {
            inner.insert("input".into(), input.clone());
        }
        let mut payload = Map::new();
        payload.insert(name.to_owned(), Value::Object(inner));

        let resp = self
            .request(Method::POST, url.clone(), true)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let mut body: Map<String, Value> = decode(resp).await?;
        let report = body
            .remove(name)
            .ok_or_else(|| Error::UnexpectedPayload(format!("response has no `{name}` entry")))?;
        let report: ActionReport = serde_json::from_value(report)
            .map_err(|e| Error::UnexpectedPayload(e.to_string()))?;
        report
            .href
            .ok_or_else(|| Error::UnexpectedPayload(format!("`{name}` response has no href")))
    }

    /// Cancel an action request: `DELETE {action_href}`.
    pub async fn cancel_action(&self, url: &Url) -> Result<(), Error> {
        debug!("DELETE {}", url);
        self.request(Method::DELETE, url.clone(), false)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    // ── Events ───────────────────────────────────────────────────────

    /// List events: `GET {events_url}` → `[{name: {data?, timestamp?}}, ...]`.
    pub async fn list_events(&self, url: &Url) -> Result<Vec<(String, EventReport)>, Error> {
        let items: Vec<Map<String, Value>> = self.get_json(url).await?;
        items.into_iter().map(single_key).collect()
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn request(&self, method: Method, url: Url, with_body: bool) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .headers(headers(&self.auth, with_body))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, Error> {
        debug!("GET {}", url);
        let resp = self
            .request(Method::GET, url.clone(), false)
            .send()
            .await?
            .error_for_status()?;
        decode(resp).await
    }
}

/// Read a response body and decode it, keeping the raw text on failure.
async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })
}

/// Unwrap a `{name: payload}` list entry.
fn single_key<T: DeserializeOwned>(entry: Map<String, Value>) -> Result<(String, T), Error> {
    let (name, payload) = entry
        .into_iter()
        .next()
        .ok_or_else(|| Error::UnexpectedPayload("empty list entry".into()))?;
    let payload = serde_json::from_value(payload)
        .map_err(|e| Error::UnexpectedPayload(format!("`{name}` entry: {e}")))?;
    Ok((name, payload))
}
