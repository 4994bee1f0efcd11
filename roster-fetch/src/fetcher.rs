//! Fetch with retry budget.

use std::sync::Arc;

use roster_core::{
    AbortReason, InvariantError, NetworkError, RequestDescriptor, ResponseSchema, RosterResult,
};
use secrecy::SecretString;

use crate::decode::decode_body;
use crate::retry::RetryPolicy;
use crate::transport::{HttpRequest, HttpTransport};

/// A validated network response.
#[derive(Debug)]
pub struct FetchResponse<T> {
    pub payload: T,
    /// Bearer token returned alongside the payload, if any.
    pub access_token: Option<SecretString>,
    /// Network attempts made, including the successful one.
    pub attempts: u32,
}

/// Issues a descriptor's request, retrying network failures and non-2xx
/// statuses up to the descriptor's retry budget.
///
/// The descriptor's abort signal bounds the whole fetch, backoff sleeps
/// included. Once it fires the fetch fails with [`NetworkError::Aborted`]
/// no matter how much budget is left. Schema failures on a 2xx response are
/// never retried.
#[derive(Clone)]
pub struct RetryingFetcher {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn fetch<T: ResponseSchema>(
        &self,
        descriptor: &RequestDescriptor,
    ) -> RosterResult<FetchResponse<T>> {
        if descriptor.schema_id() != T::SCHEMA_ID {
            return Err(InvariantError::SchemaMismatch {
                expected: T::SCHEMA_ID.to_string(),
                got: descriptor.schema_id().to_string(),
            }
            .into());
        }

        let url = descriptor.url();
        let abort = descriptor.abort_signal();
        let max_attempts = descriptor.max_attempts();
        let mut attempts = 0u32;

        loop {
            if let Some(reason) = abort.reason() {
                return Err(aborted(url, attempts, reason).into());
            }

            attempts += 1;
            let request = HttpRequest::from_descriptor(descriptor);
            tracing::debug!(url = %url, attempt = attempts, max_attempts, "Sending request");

            let result = tokio::select! {
                biased;
                reason = abort.aborted() => {
                    tracing::warn!(url = %url, attempt = attempts, %reason, "Request aborted");
                    return Err(aborted(url, attempts, reason).into());
                }
                result = self.transport.send(request) => result,
            };

            let failure = match result {
                Ok(response) if response.is_success() => {
                    let decoded = decode_body::<T>(&response.body)?;
                    tracing::debug!(
                        url = %url,
                        attempt = attempts,
                        status = response.status,
                        token_present = decoded.access_token.is_some(),
                        "Response validated"
                    );
                    return Ok(FetchResponse {
                        payload: decoded.payload,
                        access_token: decoded.access_token,
                        attempts,
                    });
                }
                Ok(response) => NetworkError::Status {
                    url: url.to_string(),
                    status: response.status,
                    attempts,
                },
                Err(e) => NetworkError::Transport {
                    url: url.to_string(),
                    attempts,
                    reason: e.reason,
                },
            };

            if attempts >= max_attempts {
                tracing::error!(url = %url, attempts, error = %failure, "Retry budget exhausted");
                return Err(failure.into());
            }

            let delay = self.policy.delay_for(attempts - 1);
            tracing::warn!(
                url = %url,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Request failed, retrying"
            );

            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    reason = abort.aborted() => {
                        return Err(aborted(url, attempts, reason).into());
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

impl std::fmt::Debug for RetryingFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingFetcher")
            .field("policy", &self.policy)
            .finish()
    }
}

fn aborted(url: &str, attempts: u32, reason: AbortReason) -> NetworkError {
    NetworkError::Aborted {
        url: url.to_string(),
        attempts,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpResponse, TransportError};
    use async_trait::async_trait;
    use roster_core::{
        AbortController, CacheKey, DirectoryPayload, ErrorKind, RosterError, SchemaId,
        UsersPayload,
    };
    use secrecy::ExposeSecret;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const DIRECTORY_OK: &str = r#"{"accessToken":"t0k","data":[{"_id":"u1","username":"alice","firstName":"Alice","lastName":"Ng","jobPosition":"Clerk","department":"Sales"}]}"#;

    /// Replays canned responses; hangs forever once the script runs out.
    struct Scripted {
        script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(script: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpTransport for Scripted {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }
    }

    fn descriptor(budget: u32) -> RequestDescriptor {
        RequestDescriptor::builder(
            CacheKey::parse("https://api.example/user/?&limit=200").unwrap(),
            SchemaId::Directory,
        )
        .bearer_token("caller")
        .retry_budget(budget)
        .build()
        .unwrap()
    }

    fn fetcher(transport: Arc<Scripted>, policy: RetryPolicy) -> RetryingFetcher {
        RetryingFetcher::new(transport, policy)
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let transport = Scripted::new(vec![Ok(HttpResponse::new(200, DIRECTORY_OK))]);
        let response = fetcher(transport.clone(), RetryPolicy::immediate())
            .fetch::<DirectoryPayload>(&descriptor(2))
            .await
            .unwrap();

        assert_eq!(response.attempts, 1);
        assert_eq!(response.payload.data[0].username, "alice");
        assert_eq!(
            response.access_token.as_ref().map(|t| t.expose_secret()),
            Some("t0k")
        );
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let transport = Scripted::new(vec![
            Ok(HttpResponse::new(503, "")),
            Err(TransportError::new("connection reset")),
            Ok(HttpResponse::new(200, DIRECTORY_OK)),
        ]);
        let response = fetcher(transport.clone(), RetryPolicy::immediate())
            .fetch::<DirectoryPayload>(&descriptor(2))
            .await
            .unwrap();
        assert_eq!(response.attempts, 3);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_budget_reports_attempts_and_status() {
        let transport = Scripted::new(vec![
            Ok(HttpResponse::new(500, "")),
            Ok(HttpResponse::new(500, "")),
            Ok(HttpResponse::new(500, "")),
        ]);
        let err = fetcher(transport.clone(), RetryPolicy::immediate())
            .fetch::<DirectoryPayload>(&descriptor(2))
            .await
            .unwrap_err();

        assert_eq!(transport.calls(), 3);
        assert_eq!(err.kind(), ErrorKind::NetworkError);
        assert!(matches!(
            err,
            RosterError::Network(NetworkError::Status { status: 500, attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_zero_budget_single_attempt() {
        let transport = Scripted::new(vec![Err(TransportError::new("refused"))]);
        let err = fetcher(transport.clone(), RetryPolicy::immediate())
            .fetch::<DirectoryPayload>(&descriptor(0))
            .await
            .unwrap_err();
        assert_eq!(transport.calls(), 1);
        assert!(matches!(
            err,
            RosterError::Network(NetworkError::Transport { attempts: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_schema_failure_not_retried() {
        let transport = Scripted::new(vec![
            Ok(HttpResponse::new(200, "not json")),
            Ok(HttpResponse::new(200, DIRECTORY_OK)),
        ]);
        let err = fetcher(transport.clone(), RetryPolicy::immediate())
            .fetch::<DirectoryPayload>(&descriptor(3))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaValidationError);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_schema_id_mismatch_sends_nothing() {
        let transport = Scripted::new(vec![]);
        let err = fetcher(transport.clone(), RetryPolicy::immediate())
            .fetch::<UsersPayload>(&descriptor(0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantError);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_between_attempts() {
        let transport = Scripted::new(vec![
            Ok(HttpResponse::new(500, "")),
            Ok(HttpResponse::new(500, "")),
            Ok(HttpResponse::new(500, "")),
        ]);
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(1), 2.0);
        let started = tokio::time::Instant::now();

        let _ = fetcher(transport, policy)
            .fetch::<DirectoryPayload>(&descriptor(2))
            .await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_aborts_hanging_request_regardless_of_budget() {
        let transport = Scripted::new(vec![]);
        let controller = AbortController::new();
        let _guard = controller.abort_after(Duration::from_secs(10));
        let descriptor = RequestDescriptor::builder(
            CacheKey::parse("https://api.example/user/?&limit=200").unwrap(),
            SchemaId::Directory,
        )
        .bearer_token("caller")
        .retry_budget(5)
        .abort_signal(controller.signal())
        .build()
        .unwrap();

        let err = fetcher(transport.clone(), RetryPolicy::immediate())
            .fetch::<DirectoryPayload>(&descriptor)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NetworkError);
        assert!(matches!(
            err,
            RosterError::Network(NetworkError::Aborted { attempts: 1, .. })
        ));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_during_backoff() {
        let transport = Scripted::new(vec![Ok(HttpResponse::new(500, ""))]);
        let controller = AbortController::new();
        let _guard = controller.abort_after(Duration::from_millis(50));
        let descriptor = RequestDescriptor::builder(
            CacheKey::parse("https://api.example/user/?&limit=200").unwrap(),
            SchemaId::Directory,
        )
        .bearer_token("caller")
        .retry_budget(3)
        .abort_signal(controller.signal())
        .build()
        .unwrap();
        let policy = RetryPolicy::new(Duration::from_secs(5), Duration::from_secs(5), 1.0);

        let err = fetcher(transport.clone(), policy)
            .fetch::<DirectoryPayload>(&descriptor)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RosterError::Network(NetworkError::Aborted { .. })
        ));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_already_aborted_sends_nothing() {
        let transport = Scripted::new(vec![Ok(HttpResponse::new(200, DIRECTORY_OK))]);
        let controller = AbortController::new();
        controller.abort(AbortReason::Cancelled);
        let descriptor = RequestDescriptor::builder(
            CacheKey::parse("https://api.example/user/?&limit=200").unwrap(),
            SchemaId::Directory,
        )
        .bearer_token("caller")
        .abort_signal(controller.signal())
        .build()
        .unwrap();

        let err = fetcher(transport.clone(), RetryPolicy::immediate())
            .fetch::<DirectoryPayload>(&descriptor)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RosterError::Network(NetworkError::Aborted { attempts: 0, .. })
        ));
        assert_eq!(transport.calls(), 0);
    }
}
