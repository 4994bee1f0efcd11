//! Channel wire messages.
//!
//! # Request
//!
//! ```text
//! {
//!   "requestInit": { "method": "GET", "headers": { "Authorization": "Bearer <token>" }, "body"?: .. },
//!   "schemaId": "directory" | "users",
//!   "url": "https://..",
//!   "retryBudget"?: 2,
//!   "arrangeByField"?: "username",
//!   "arrangeByDirection"?: "ascending" | "descending"
//! }
//! ```
//!
//! # Reply
//!
//! ```text
//! { "requestId": "<uuid>", "task": "directoryFetch" | "usersFetch" | "prefetch", "outcome": .. }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use roster_core::{
    AbortSignal, CacheKey, HttpMethod, InvariantError, Outcome, RequestDescriptor, SchemaId,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one accepted request. Time-ordered (UUIDv7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskKind {
    DirectoryFetch,
    UsersFetch,
    Prefetch,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectoryFetch => "directoryFetch",
            Self::UsersFetch => "usersFetch",
            Self::Prefetch => "prefetch",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequestInit {
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl fmt::Debug for RequestInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: BTreeMap<&str, &str> = self
            .headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case("authorization") {
                    (name.as_str(), "[REDACTED]")
                } else {
                    (name.as_str(), value.as_str())
                }
            })
            .collect();
        f.debug_struct("RequestInit")
            .field("method", &self.method)
            .field("headers", &headers)
            .field("body", &self.body)
            .finish()
    }
}

/// A request submitted to a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequestMessage {
    pub request_init: RequestInit,
    pub schema_id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_budget: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrange_by_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrange_by_direction: Option<String>,
}

impl RequestMessage {
    /// A GET request authorized with `bearer_token`.
    pub fn get(url: impl Into<String>, schema_id: impl Into<String>, bearer_token: &str) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", bearer_token),
        );
        Self {
            request_init: RequestInit {
                method: HttpMethod::Get.as_str().to_string(),
                headers,
                body: None,
            },
            schema_id: schema_id.into(),
            url: url.into(),
            retry_budget: None,
            arrange_by_field: None,
            arrange_by_direction: None,
        }
    }

    pub fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = Some(retry_budget);
        self
    }

    pub fn arrange_by(mut self, field: impl Into<String>, direction: impl Into<String>) -> Self {
        self.arrange_by_field = Some(field.into());
        self.arrange_by_direction = Some(direction.into());
        self
    }

    /// Parse a raw JSON message.
    pub fn from_json(raw: &str) -> Result<Self, InvariantError> {
        serde_json::from_str(raw).map_err(|e| InvariantError::MalformedMessage {
            reason: e.to_string(),
        })
    }

    /// Validate the message into an immutable descriptor bound to `abort`.
    pub fn to_descriptor(
        &self,
        abort: AbortSignal,
        default_retry_budget: u32,
    ) -> Result<RequestDescriptor, InvariantError> {
        let method: HttpMethod = self.request_init.method.parse()?;
        let schema_id: SchemaId = self.schema_id.parse()?;
        let cache_key = CacheKey::parse(&self.url)?;

        let mut builder = RequestDescriptor::builder(cache_key, schema_id)
            .method(method)
            .abort_signal(abort)
            .retry_budget(self.retry_budget.unwrap_or(default_retry_budget));
        for (name, value) in &self.request_init.headers {
            builder = builder.header(name, value.clone());
        }
        if let Some(body) = &self.request_init.body {
            builder = builder.body(body.clone());
        }
        builder.build()
    }
}

/// The single reply to an accepted request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyMessage<T> {
    pub request_id: RequestId,
    pub task: TaskKind,
    pub outcome: Outcome<T>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::{ErrorKind, Failure, UsersPayload};
    use serde_json::json;

    const URL: &str = "https://api.example/user/?&limit=200&newQueryFlag=true&totalDocuments=0";

    #[test]
    fn test_parse_wire_request() {
        let raw = json!({
            "requestInit": {
                "method": "get",
                "headers": { "Authorization": "Bearer abc", "Accept": "application/json" }
            },
            "schemaId": "directory",
            "url": URL,
            "retryBudget": 1
        })
        .to_string();

        let message = RequestMessage::from_json(&raw).unwrap();
        let descriptor = message.to_descriptor(AbortSignal::never(), 3).unwrap();
        assert_eq!(descriptor.method(), HttpMethod::Get);
        assert_eq!(descriptor.schema_id(), SchemaId::Directory);
        assert_eq!(descriptor.retry_budget(), 1);
        assert_eq!(descriptor.url(), URL);
        assert_eq!(descriptor.authorization_header(), "Bearer abc");
        assert_eq!(descriptor.headers().get("accept").map(String::as_str), Some("application/json"));
    }

    #[test]
    fn test_default_retry_budget_applies() {
        let descriptor = RequestMessage::get(URL, "directory", "abc")
            .to_descriptor(AbortSignal::never(), 4)
            .unwrap();
        assert_eq!(descriptor.retry_budget(), 4);
    }

    #[test]
    fn test_malformed_messages_are_invariant_errors() {
        assert!(matches!(
            RequestMessage::from_json("{not json"),
            Err(InvariantError::MalformedMessage { .. })
        ));
        assert!(RequestMessage::from_json(r#"{"url": "x"}"#).is_err());

        let mut extra = serde_json::to_value(RequestMessage::get(URL, "directory", "abc")).unwrap();
        extra["priority"] = json!("high");
        assert!(RequestMessage::from_json(&extra.to_string()).is_err());
    }

    #[test]
    fn test_invalid_fields_fail_descriptor_validation() {
        let never = AbortSignal::never;

        let mut message = RequestMessage::get(URL, "directory", "abc");
        message.request_init.method = "FETCH".to_string();
        assert!(message.to_descriptor(never(), 0).is_err());

        let message = RequestMessage::get(URL, "orgChart", "abc");
        assert!(message.to_descriptor(never(), 0).is_err());

        let message = RequestMessage::get("ftp://api.example/user", "directory", "abc");
        assert!(message.to_descriptor(never(), 0).is_err());

        let mut message = RequestMessage::get(URL, "directory", "abc");
        message.request_init.headers.clear();
        assert!(matches!(
            message.to_descriptor(never(), 0),
            Err(InvariantError::RequiredFieldMissing { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_authorization() {
        let message = RequestMessage::get(URL, "directory", "super-secret");
        assert!(!format!("{:?}", message).contains("super-secret"));
    }

    #[test]
    fn test_reply_wire_shape() {
        let reply: ReplyMessage<UsersPayload> = ReplyMessage {
            request_id: RequestId::new(),
            task: TaskKind::UsersFetch,
            outcome: Outcome::Failure(Failure::new(ErrorKind::NetworkError, "HTTP 500")),
        };
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["task"], "usersFetch");
        assert_eq!(value["outcome"]["ok"], false);
        assert_eq!(value["outcome"]["err"]["kind"], "NetworkError");
        assert!(value["requestId"].is_string());

        let back: ReplyMessage<UsersPayload> = serde_json::from_value(value).unwrap();
        assert_eq!(back, reply);
    }

    #[test]
    fn test_request_ids_are_unique_v7() {
        let first = RequestId::new();
        let second = RequestId::new();
        assert_ne!(first, second);
        assert_eq!(first.as_uuid().get_version_num(), 7);
    }
}
