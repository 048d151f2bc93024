// ── Properties ──
//
// A property's cached value is owned by its device. Writes go over the
// push channel when one is open, otherwise over HTTP.

use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use thingurl_api::{OutboundMessage, PropertyDescription};

use crate::device::Device;
use crate::error::CoreError;

/// A readable/writable value exposed by a device.
#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    /// Absolute URL the value is read from and written to.
    pub url: Url,
    pub description: PropertyDescription,
    value: Value,
}

impl Property {
    pub(crate) fn new(
        name: String,
        url: Url,
        description: PropertyDescription,
        value: Value,
    ) -> Self {
        Self {
            name,
            url,
            description,
            value,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Replace the cached value. Returns `true` if it differed.
    pub(crate) fn set_cached_value(&mut self, value: Value) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        true
    }
}

impl Device {
    /// Request a property change.
    ///
    /// With an open push channel the request is sent as a `setProperty`
    /// message and the requested value is returned without waiting; the
    /// device's `propertyStatus` echo updates the cache. Without one, the
    /// value is PUT and the device's reported value is adopted.
    ///
    /// Transport failures are logged and resolve with the unchanged cached
    /// value. The only error is an unknown property name.
    pub async fn set_property(&self, name: &str, value: Value) -> Result<Value, CoreError> {
        let (url, current) = {
            let property = self.inner.properties.get(name).ok_or_else(|| {
                CoreError::PropertyNotFound {
                    device: self.id().to_string(),
                    name: name.to_owned(),
                }
            })?;
            (property.url.clone(), property.value.clone())
        };

        if let Some(tx) = self.inner.push_tx.load_full() {
            let message = OutboundMessage::SetProperty {
                name: name.to_owned(),
                value: value.clone(),
            };
            if tx.send(message).await.is_ok() {
                debug!(device = %self.id(), property = name, "setProperty sent over push channel");
                // No echo arrives for a no-op change; confirm it directly.
                if current == value {
                    self.notify_property(name, &value);
                }
                return Ok(value);
            }
            debug!(device = %self.id(), "push channel closed, falling back to HTTP");
        }

        match self.inner.client.put_property(&url, name, &value).await {
            Ok(reported) => {
                self.store_property(name, reported.clone());
                self.notify_property(name, &reported);
                Ok(reported)
            }
            Err(e) => {
                warn!(device = %self.id(), property = name, error = %e, "Failed to set property");
                Ok(current)
            }
        }
    }
}
