//! Immutable request descriptors.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::abort::AbortSignal;
use crate::cache_key::CacheKey;
use crate::error::InvariantError;
use crate::schema::SchemaId;

const AUTHORIZATION: &str = "authorization";
const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = InvariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(InvariantError::InvalidValue {
                field: "requestInit.method".to_string(),
                reason: format!("unsupported method '{}'", other),
            }),
        }
    }
}

/// Everything needed to run one pipeline invocation.
///
/// Built through [`RequestDescriptorBuilder`]; immutable afterwards. The
/// bearer token is held as a secret and only exposed when the outbound
/// request is assembled.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    cache_key: CacheKey,
    method: HttpMethod,
    headers: BTreeMap<String, String>,
    bearer_token: SecretString,
    body: Option<serde_json::Value>,
    abort: AbortSignal,
    schema_id: SchemaId,
    retry_budget: u32,
}

impl RequestDescriptor {
    pub fn builder(cache_key: CacheKey, schema_id: SchemaId) -> RequestDescriptorBuilder {
        RequestDescriptorBuilder {
            cache_key,
            schema_id,
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            bearer_token: None,
            body: None,
            abort: None,
            retry_budget: 0,
        }
    }

    pub fn cache_key(&self) -> &CacheKey {
        &self.cache_key
    }

    /// The request target; identical to the cache key.
    pub fn url(&self) -> &str {
        self.cache_key.as_str()
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Non-authorization headers, names lowercased.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// The `Authorization` header value, exposing the token.
    pub fn authorization_header(&self) -> String {
        format!("{}{}", BEARER_PREFIX, self.bearer_token.expose_secret())
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    pub fn schema_id(&self) -> SchemaId {
        self.schema_id
    }

    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    /// Upper bound on network attempts for this descriptor.
    pub fn max_attempts(&self) -> u32 {
        self.retry_budget.saturating_add(1)
    }
}

#[derive(Debug)]
pub struct RequestDescriptorBuilder {
    cache_key: CacheKey,
    schema_id: SchemaId,
    method: HttpMethod,
    headers: BTreeMap<String, String>,
    bearer_token: Option<SecretString>,
    body: Option<serde_json::Value>,
    abort: Option<AbortSignal>,
    retry_budget: u32,
}

impl RequestDescriptorBuilder {
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Add a header. An `Authorization` header is parsed as a bearer token.
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        let name = name.as_ref().trim().to_ascii_lowercase();
        let value = value.into();
        if name == AUTHORIZATION {
            self.bearer_token = value
                .strip_prefix(BEARER_PREFIX)
                .map(|token| SecretString::from(token.trim().to_string()));
        } else {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(SecretString::from(token.into()));
        self
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn abort_signal(mut self, signal: AbortSignal) -> Self {
        self.abort = Some(signal);
        self
    }

    pub fn retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = retry_budget;
        self
    }

    /// Finish the descriptor. Fails if no non-empty bearer token was supplied.
    pub fn build(self) -> Result<RequestDescriptor, InvariantError> {
        let bearer_token = self
            .bearer_token
            .filter(|token| !token.expose_secret().is_empty())
            .ok_or_else(|| InvariantError::RequiredFieldMissing {
                field: "requestInit.headers.Authorization (Bearer)".to_string(),
            })?;

        Ok(RequestDescriptor {
            cache_key: self.cache_key,
            method: self.method,
            headers: self.headers,
            bearer_token,
            body: self.body,
            abort: self.abort.unwrap_or_else(AbortSignal::never),
            schema_id: self.schema_id,
            retry_budget: self.retry_budget,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CacheKey {
        CacheKey::parse("https://api.example/user/?&limit=200").unwrap()
    }

    #[test]
    fn test_requires_bearer_token() {
        let result = RequestDescriptor::builder(key(), SchemaId::Directory).build();
        assert!(matches!(
            result,
            Err(InvariantError::RequiredFieldMissing { .. })
        ));

        let result = RequestDescriptor::builder(key(), SchemaId::Directory)
            .header("Authorization", "Basic abc")
            .build();
        assert!(result.is_err());

        let result = RequestDescriptor::builder(key(), SchemaId::Directory)
            .header("Authorization", "Bearer ")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_authorization_header_is_parsed() {
        let descriptor = RequestDescriptor::builder(key(), SchemaId::Directory)
            .header("AUTHORIZATION", "Bearer tok-1")
            .header("Content-Type", "application/json")
            .retry_budget(2)
            .build()
            .unwrap();

        assert_eq!(descriptor.authorization_header(), "Bearer tok-1");
        assert!(!descriptor.headers().contains_key("authorization"));
        assert_eq!(
            descriptor.headers().get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(descriptor.max_attempts(), 3);
        assert_eq!(descriptor.url(), key().as_str());
    }

    #[test]
    fn test_debug_redacts_token() {
        let descriptor = RequestDescriptor::builder(key(), SchemaId::Users)
            .bearer_token("super-secret")
            .build()
            .unwrap();
        let debug = format!("{:?}", descriptor);
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!(" Patch ".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }
}
