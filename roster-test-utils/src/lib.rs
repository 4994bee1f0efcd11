//! ROSTER Test Utilities
//!
//! Centralized test infrastructure for the ROSTER workspace:
//! - Scripted HTTP transport and instrumented cache store
//! - Token minting
//! - Proptest generators for query inputs
//! - Fixtures for payloads, response bodies and descriptors
//! - Assertions over outcomes and cache contents

pub use roster_auth::{test_clocks, FixedClock, JwtClaimsDecoder, TokenDecoder};
pub use roster_core::{
    CacheKey, DecodedTokenClaims, DirectoryPayload, DirectoryUser, ErrorKind, Outcome,
    RequestDescriptor, SchemaId, Source, UserRecord, UsersPayload,
};
pub use roster_fetch::{HttpRequest, HttpResponse, HttpTransport, TransportError};
pub use roster_storage::{CacheEntry, CacheStats, CacheStore, InMemoryCacheStore};

use async_trait::async_trait;
use roster_core::CacheError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// SCRIPTED TRANSPORT
// ============================================================================

/// One scripted reaction to an HTTP attempt.
#[derive(Debug, Clone)]
pub enum Step {
    Respond(HttpResponse),
    Fail(TransportError),
    /// Never complete. Only an abort ends the attempt.
    Hang,
    /// Panic inside the transport.
    Panic(String),
}

/// Transport that replays a script of [`Step`]s and records every request.
///
/// When the script runs out, further attempts fail with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<HttpRequest>>,
    calls: AtomicU32,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_steps(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        let transport = Self::new();
        for step in steps {
            transport.push(step);
        }
        transport
    }

    pub fn push(&self, step: Step) {
        self.lock_steps().push_back(step);
    }

    pub fn push_status(&self, status: u16) {
        self.push(Step::Respond(HttpResponse::new(status, Vec::new())));
    }

    pub fn push_json(&self, status: u16, body: &serde_json::Value) {
        self.push(Step::Respond(HttpResponse::new(status, body.to_string())));
    }

    /// Delay every response by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn remaining_steps(&self) -> usize {
        self.lock_steps().len()
    }

    fn lock_steps(&self) -> std::sync::MutexGuard<'_, VecDeque<Step>> {
        self.steps.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        let step = self.lock_steps().pop_front();
        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match step {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Hang) => std::future::pending().await,
            Some(Step::Panic(message)) => panic!("{}", message),
            None => Err(TransportError::new("scripted transport exhausted")),
        }
    }
}

// ============================================================================
// INSTRUMENTED CACHE STORE
// ============================================================================

/// Cache store that counts reads and writes, keeps every written body, and
/// can be told to fail.
#[derive(Debug, Default)]
pub struct InstrumentedCacheStore {
    inner: InMemoryCacheStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    reads: AtomicU32,
    writes: AtomicU32,
    written: Mutex<Vec<(CacheKey, serde_json::Value)>>,
}

impl InstrumentedCacheStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Every body passed to `set`, in write order.
    pub fn written(&self) -> Vec<(CacheKey, serde_json::Value)> {
        self.written
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl CacheStore for InstrumentedCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::Transaction {
                reason: "injected read failure".to_string(),
            });
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::QuotaExceeded {
                reason: "injected write failure".to_string(),
            });
        }
        self.written
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((key.clone(), entry.body().clone()));
        self.inner.set(key, entry).await
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        self.inner.remove(key).await
    }

    async fn clear(&self) -> Result<u64, CacheError> {
        self.inner.clear().await
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        self.inner.stats().await
    }
}

// ============================================================================
// TOKENS
// ============================================================================

pub mod tokens {
    //! Bearer token minting. Tokens are HS256-signed with a throwaway key;
    //! the decoder does not check signatures.

    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::{json, Value};

    pub use roster_auth::test_clocks::ISSUED_AT;

    /// Builder for token claims.
    #[derive(Debug, Clone)]
    pub struct TestToken {
        claims: Value,
    }

    impl TestToken {
        pub fn new(username: &str) -> Self {
            Self {
                claims: json!({
                    "userId": format!("id-{}", username),
                    "username": username,
                    "roles": ["Employee"],
                    "sessionId": format!("session-{}", username),
                    "iat": ISSUED_AT,
                    "exp": ISSUED_AT + 3600,
                }),
            }
        }

        pub fn roles(mut self, roles: &[&str]) -> Self {
            self.claims["roles"] = json!(roles);
            self
        }

        pub fn issued_at(mut self, iat: i64) -> Self {
            self.claims["iat"] = json!(iat);
            self
        }

        pub fn expires_at(mut self, exp: i64) -> Self {
            self.claims["exp"] = json!(exp);
            self
        }

        pub fn claim(mut self, name: &str, value: Value) -> Self {
            self.claims[name] = value;
            self
        }

        pub fn without(mut self, name: &str) -> Self {
            if let Some(map) = self.claims.as_object_mut() {
                map.remove(name);
            }
            self
        }

        pub fn mint(&self) -> String {
            mint_claims(&self.claims)
        }
    }

    /// Sign arbitrary claims.
    pub fn mint_claims(claims: &Value) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(b"roster-test-key"),
        )
        .unwrap_or_else(|e| panic!("failed to mint test token: {}", e))
    }

    /// A token for `username` with the default claims.
    pub fn mint(username: &str) -> String {
        TestToken::new(username).mint()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for query inputs.

    use proptest::prelude::*;

    /// Free-text filter values, including characters that need encoding.
    pub fn arb_filter_value() -> impl Strategy<Value = String> {
        "[A-Za-z0-9 &=?/#%+-]{1,16}"
    }

    pub fn arb_base_url() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("https://api.example".to_string()),
            Just("https://api.example/".to_string()),
            Just("http://localhost:5500/api/v1".to_string()),
        ]
    }

    pub fn arb_username() -> impl Strategy<Value = String> {
        "[a-z]{3,10}"
    }

    pub fn arb_roles() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(
            prop_oneof![
                Just("Admin".to_string()),
                Just("Manager".to_string()),
                Just("Employee".to_string()),
            ],
            0..4,
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    pub const BASE_URL: &str = "https://api.example";

    pub fn directory_user(id: &str, username: &str, department: &str) -> DirectoryUser {
        DirectoryUser {
            id: id.to_string(),
            username: username.to_string(),
            first_name: username.to_uppercase(),
            last_name: "Tester".to_string(),
            job_position: "Clerk".to_string(),
            department: department.to_string(),
            store_location: Some("Edmonton".to_string()),
            profile_picture_url: None,
        }
    }

    pub fn directory_payload() -> DirectoryPayload {
        DirectoryPayload {
            data: vec![
                directory_user("u1", "alice", "Sales"),
                directory_user("u2", "bob", "Sales"),
            ],
        }
    }

    pub fn user_record(id: &str, username: &str, created_day: u32) -> UserRecord {
        let created = Utc
            .with_ymd_and_hms(2024, 1, created_day.clamp(1, 28), 9, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        UserRecord {
            id: id.to_string(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            first_name: username.to_uppercase(),
            middle_name: None,
            last_name: "Tester".to_string(),
            job_position: "Clerk".to_string(),
            department: "Sales".to_string(),
            store_location: Some("Calgary".to_string()),
            roles: vec!["Employee".to_string()],
            active: true,
            created_at: created,
            updated_at: created,
        }
    }

    /// Three users in non-alphabetical server order.
    pub fn users_payload() -> UsersPayload {
        UsersPayload {
            data: vec![
                user_record("u2", "carol", 3),
                user_record("u1", "alice", 1),
                user_record("u3", "bob", 2),
            ],
            pages: 1,
            total_documents: 3,
        }
    }

    /// Response body carrying `payload` plus an `accessToken` field.
    pub fn body_with_token<T: serde::Serialize>(payload: &T, token: Option<&str>) -> Value {
        let mut body = serde_json::to_value(payload).unwrap_or(Value::Null);
        if let (Some(token), Some(map)) = (token, body.as_object_mut()) {
            map.insert("accessToken".to_string(), json!(token));
        }
        body
    }

    pub fn directory_response(token: &str) -> HttpResponse {
        HttpResponse::new(
            200,
            body_with_token(&directory_payload(), Some(token)).to_string(),
        )
    }

    pub fn users_response(token: &str) -> HttpResponse {
        HttpResponse::new(200, body_with_token(&users_payload(), Some(token)).to_string())
    }

    pub fn directory_key() -> CacheKey {
        roster_core::DirectoryQuery::new(BASE_URL)
            .cache_key()
            .unwrap_or_else(|e| panic!("fixture directory key: {}", e))
    }

    pub fn users_key() -> CacheKey {
        roster_core::UsersQuery::new(BASE_URL, 10)
            .cache_key()
            .unwrap_or_else(|e| panic!("fixture users key: {}", e))
    }

    pub fn descriptor(key: CacheKey, schema: SchemaId, retry_budget: u32) -> RequestDescriptor {
        RequestDescriptor::builder(key, schema)
            .header("Authorization", "Bearer caller-token")
            .retry_budget(retry_budget)
            .build()
            .unwrap_or_else(|e| panic!("fixture descriptor: {}", e))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over outcomes and cache contents.

    use super::*;

    /// Assert a success from `source` and return the payload.
    pub fn assert_success<T: std::fmt::Debug>(outcome: Outcome<T>, source: Source) -> T {
        match outcome {
            Outcome::Success(success) => {
                assert_eq!(success.source, source, "unexpected outcome source");
                match source {
                    Source::Cache => assert!(
                        success.decoded_token.is_none(),
                        "cache hits must not carry decoded claims"
                    ),
                    Source::Network => assert!(
                        success.decoded_token.is_some(),
                        "network successes must carry decoded claims"
                    ),
                }
                success.payload
            }
            Outcome::Failure(failure) => panic!("expected success, got {:?}", failure),
        }
    }

    /// Assert a failure of `kind` and return its message.
    pub fn assert_failure<T: std::fmt::Debug>(outcome: Outcome<T>, kind: ErrorKind) -> String {
        match outcome {
            Outcome::Failure(failure) => {
                assert_eq!(failure.kind, kind, "unexpected failure kind: {}", failure.message);
                failure.message
            }
            Outcome::Success(success) => panic!("expected {} failure, got {:?}", kind, success),
        }
    }

    /// Assert nothing written to `store` carries a credential field.
    pub fn assert_no_secrets_written(store: &InstrumentedCacheStore) {
        for (key, body) in store.written() {
            assert!(
                !roster_core::contains_secret_fields(&body),
                "credential field cached under {}: {}",
                key,
                body
            );
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
