// Authentication descriptors and request header construction.
//
// Only bearer-token (`jwt`) authentication is wired through to requests.
// Basic and digest descriptors round-trip through config untouched but
// contribute no headers.

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};

const JSON: &str = "application/json";

/// How a thing URL expects to be authenticated.
///
/// Serialized with a `method` tag, matching the persisted config format:
/// `{"method": "none"}`, `{"method": "jwt", "token": "..."}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum Authentication {
    #[default]
    None,
    /// Bearer token, sent as `Authorization: Bearer {token}` and as a
    /// `jwt` query parameter on the push channel URL.
    Jwt {
        #[serde(serialize_with = "expose")]
        token: SecretString,
    },
    /// Not implemented: carried for config compatibility only.
    Basic {
        user: String,
        #[serde(serialize_with = "expose")]
        password: SecretString,
    },
    /// Not implemented: carried for config compatibility only.
    Digest {
        user: String,
        #[serde(serialize_with = "expose")]
        password: SecretString,
    },
}

impl Authentication {
    /// Bearer-token constructor.
    pub fn jwt(token: impl Into<String>) -> Self {
        Self::Jwt {
            token: SecretString::from(token.into()),
        }
    }

    /// The bearer token, if this descriptor carries one.
    pub fn bearer_token(&self) -> Option<&str> {
        match self {
            Self::Jwt { token } => Some(token.expose_secret()),
            Self::None | Self::Basic { .. } | Self::Digest { .. } => None,
        }
    }

    /// Method name as it appears in config (`none`, `jwt`, ...).
    pub fn method(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Jwt { .. } => "jwt",
            Self::Basic { .. } => "basic",
            Self::Digest { .. } => "digest",
        }
    }
}

fn expose<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// Build the header set for a request to a thing.
///
/// Always carries `Accept: application/json`; adds a JSON `Content-Type`
/// when `include_content_type` is set, and `Authorization` only for
/// bearer tokens. A token that is not a valid header value is dropped.
pub fn headers(auth: &Authentication, include_content_type: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(JSON));

    if include_content_type {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
    }

    match auth {
        Authentication::Jwt { token } => {
            match HeaderValue::from_str(&format!("Bearer {}", token.expose_secret())) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => tracing::warn!("bearer token is not a valid header value, omitting"),
            }
        }
        // not implemented
        Authentication::None | Authentication::Basic { .. } | Authentication::Digest { .. } => {}
    }

    headers
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn none_has_accept_only() {
        let h = headers(&Authentication::None, false);
        assert_eq!(h.len(), 1);
        assert_eq!(h[ACCEPT], JSON);
    }

    #[test]
    fn content_type_is_optional() {
        let h = headers(&Authentication::None, true);
        assert_eq!(h[CONTENT_TYPE], JSON);
        assert!(h.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn jwt_adds_bearer_authorization() {
        let h = headers(&Authentication::jwt("abc.def"), false);
        assert_eq!(h[AUTHORIZATION], "Bearer abc.def");
        assert!(h.get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn basic_and_digest_are_pass_through() {
        let basic: Authentication =
            serde_json::from_str(r#"{"method":"basic","user":"u","password":"p"}"#).unwrap();
        let digest: Authentication =
            serde_json::from_str(r#"{"method":"digest","user":"u","password":"p"}"#).unwrap();

        for auth in [basic, digest] {
            let h = headers(&auth, true);
            assert!(h.get(AUTHORIZATION).is_none(), "{} should not authorize", auth.method());
            assert_eq!(h.len(), 2);
        }
    }

    #[test]
    fn descriptor_round_trips_through_json() {
        let auth: Authentication =
            serde_json::from_str(r#"{"method":"jwt","token":"t0k"}"#).unwrap();
        assert_eq!(auth.bearer_token(), Some("t0k"));

        let json = serde_json::to_value(&auth).unwrap();
        assert_eq!(json, serde_json::json!({"method": "jwt", "token": "t0k"}));

        let none: Authentication = serde_json::from_str(r#"{"method":"none"}"#).unwrap();
        assert_eq!(none.method(), "none");
    }
}
