//! Property names reserved for the backend's `httpRequest` object.
//!
//! Request metadata normally arrives as a typed [`HttpRequest`] passed next
//! to the event. Properties named after one of the four address and client
//! keys (`referer`, `remoteIp`, `serverIp`, `userAgent`) are still routed
//! into `httpRequest` and never emitted at top level. `requestMethod`,
//! `status` and `protocol` only come from the typed struct, so a property
//! such as `status = "shipped"` stays an ordinary property.

use crate::value::PropertyValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedKey {
    RequestMethod,
    Status,
    Protocol,
    Referer,
    RemoteIp,
    ServerIp,
    UserAgent,
}

impl ReservedKey {
    /// Every reserved key, in the order they are written.
    pub const ALL: [ReservedKey; 7] = [
        ReservedKey::RequestMethod,
        ReservedKey::Status,
        ReservedKey::Protocol,
        ReservedKey::Referer,
        ReservedKey::RemoteIp,
        ReservedKey::ServerIp,
        ReservedKey::UserAgent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReservedKey::RequestMethod => "requestMethod",
            ReservedKey::Status => "status",
            ReservedKey::Protocol => "protocol",
            ReservedKey::Referer => "referer",
            ReservedKey::RemoteIp => "remoteIp",
            ReservedKey::ServerIp => "serverIp",
            ReservedKey::UserAgent => "userAgent",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Whether a property-bag value under this name is lifted into
    /// `httpRequest` as-is. Keys whose backend type is not a free-form
    /// string are only taken from [`HttpRequest`].
    pub fn accepts_property(self) -> bool {
        matches!(
            self,
            ReservedKey::Referer
                | ReservedKey::RemoteIp
                | ReservedKey::ServerIp
                | ReservedKey::UserAgent
        )
    }
}

/// Whether a property with this name belongs in `httpRequest` rather than
/// the top-level property list.
pub fn is_reserved(name: &str) -> bool {
    ReservedKey::parse(name).is_some_and(ReservedKey::accepts_property)
}

/// Request metadata harvested by HTTP middleware.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl HttpRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, key: ReservedKey) -> Option<PropertyValue> {
        match key {
            ReservedKey::RequestMethod => self.request_method.as_deref().map(PropertyValue::from),
            ReservedKey::Status => self.status.map(|s| PropertyValue::from(u64::from(s))),
            ReservedKey::Protocol => self.protocol.as_deref().map(PropertyValue::from),
            ReservedKey::Referer => self.referer.as_deref().map(PropertyValue::from),
            ReservedKey::RemoteIp => self.remote_ip.as_deref().map(PropertyValue::from),
            ReservedKey::ServerIp => self.server_ip.as_deref().map(PropertyValue::from),
            ReservedKey::UserAgent => self.user_agent.as_deref().map(PropertyValue::from),
        }
    }

    /// Set a field from a loosely-typed value. Blank strings are ignored,
    /// as is a `status` that does not fit an HTTP status code.
    pub fn set(&mut self, key: ReservedKey, value: &PropertyValue) {
        if key == ReservedKey::Status {
            self.status = status_code(value).or(self.status);
            return;
        }
        let Some(text) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            return;
        };
        let slot = match key {
            ReservedKey::RequestMethod => &mut self.request_method,
            ReservedKey::Protocol => &mut self.protocol,
            ReservedKey::Referer => &mut self.referer,
            ReservedKey::RemoteIp => &mut self.remote_ip,
            ReservedKey::ServerIp => &mut self.server_ip,
            ReservedKey::UserAgent => &mut self.user_agent,
            ReservedKey::Status => return,
        };
        *slot = Some(text.to_string());
    }

    /// Fill fields still unset here from `other`.
    pub fn merge_missing(&mut self, other: &HttpRequest) {
        fn fill<T: Clone>(slot: &mut Option<T>, other: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(other);
            }
        }
        fill(&mut self.request_method, &other.request_method);
        fill(&mut self.status, &other.status);
        fill(&mut self.protocol, &other.protocol);
        fill(&mut self.referer, &other.referer);
        fill(&mut self.remote_ip, &other.remote_ip);
        fill(&mut self.server_ip, &other.server_ip);
        fill(&mut self.user_agent, &other.user_agent);
    }

    pub fn is_empty(&self) -> bool {
        ReservedKey::ALL.into_iter().all(|k| self.value(k).is_none())
    }
}

fn status_code(value: &PropertyValue) -> Option<u16> {
    use crate::value::Scalar;
    match value {
        PropertyValue::Scalar(Scalar::U64(n)) => u16::try_from(*n).ok(),
        PropertyValue::Scalar(Scalar::I64(n)) => u16::try_from(*n).ok(),
        PropertyValue::Scalar(Scalar::Str(s)) => s.trim().parse().ok(),
        _ => None,
    }
}
