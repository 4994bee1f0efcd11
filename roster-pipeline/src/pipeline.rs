//! Cache-first request pipeline.
//!
//! One run moves through a fixed sequence of steps and stops at the first
//! success or failure:
//!
//! ```text
//! CHECK_CACHE ──hit──────────────────────────────────────────► Success(cache)
//!      │miss
//!      ▼
//!    FETCH ──no token──► Failure(InvariantError)
//!      │token
//!      ▼
//!   DECODE ──► WRITE_CACHE ──────────────────────────────────► Success(network)
//! ```
//!
//! Any step error ends the run with a [`Failure`] of that step's kind.
//! There is at most one cache read and one cache write per run, and the
//! only retries are the fetcher's own.
//!
//! [`Failure`]: roster_core::Failure

use std::fmt;
use std::sync::Arc;

use roster_auth::TokenDecoder;
use roster_core::{
    InvariantError, Outcome, RequestDescriptor, ResponseSchema, RosterError, RosterResult, Source,
    Success,
};
use roster_fetch::RetryingFetcher;
use roster_storage::{CacheStore, CachedEnvelope};
use secrecy::ExposeSecret;
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    CheckCache,
    Fetch,
    Decode,
    WriteCache,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CheckCache => "check_cache",
            Self::Fetch => "fetch",
            Self::Decode => "decode",
            Self::WriteCache => "write_cache",
        };
        f.write_str(name)
    }
}

/// Orchestrates cache, fetcher and token decoder for one request at a time.
///
/// Cheap to share: every dependency is behind an `Arc`.
#[derive(Clone)]
pub struct RequestPipeline {
    cache: Arc<dyn CacheStore>,
    fetcher: RetryingFetcher,
    decoder: Arc<dyn TokenDecoder>,
}

impl RequestPipeline {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        fetcher: RetryingFetcher,
        decoder: Arc<dyn TokenDecoder>,
    ) -> Self {
        Self {
            cache,
            fetcher,
            decoder,
        }
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Run the pipeline for `descriptor`. Never panics on step failures;
    /// every error is folded into the returned [`Outcome`].
    pub async fn run<T: ResponseSchema>(&self, descriptor: &RequestDescriptor) -> Outcome<T> {
        let span = tracing::debug_span!(
            "pipeline",
            cache_key = %descriptor.cache_key(),
            schema = %descriptor.schema_id(),
        );
        async {
            match self.execute::<T>(descriptor).await {
                Ok(success) => {
                    tracing::debug!(source = ?success.source, "Pipeline succeeded");
                    Outcome::Success(success)
                }
                Err((step, err)) => {
                    if err.kind().is_retryable() {
                        tracing::warn!(step = %step, kind = %err.kind(), error = %err, "Pipeline failed");
                    } else {
                        tracing::error!(step = %step, kind = %err.kind(), error = %err, "Pipeline failed");
                    }
                    Outcome::from(Err::<Success<T>, _>(err))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute<T: ResponseSchema>(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<Success<T>, (PipelineStep, RosterError)> {
        if descriptor.schema_id() != T::SCHEMA_ID {
            return Err((
                PipelineStep::CheckCache,
                InvariantError::SchemaMismatch {
                    expected: T::SCHEMA_ID.to_string(),
                    got: descriptor.schema_id().to_string(),
                }
                .into(),
            ));
        }

        let cached = step(PipelineStep::CheckCache, self.check_cache::<T>(descriptor).await)?;
        if let Some(payload) = cached {
            return Ok(Success {
                source: Source::Cache,
                decoded_token: None,
                payload,
            });
        }

        let response = step(PipelineStep::Fetch, self.fetcher.fetch::<T>(descriptor).await)?;
        let token = step(
            PipelineStep::Fetch,
            response.access_token.ok_or(InvariantError::TokenMissing.into()),
        )?;
        tracing::debug!(attempts = response.attempts, "Fetched from network");

        let claims = step(
            PipelineStep::Decode,
            self.decoder
                .decode(token.expose_secret())
                .map_err(Into::into),
        )?;
        tracing::debug!(username = %claims.username, "Decoded token");

        step(
            PipelineStep::WriteCache,
            self.write_cache(descriptor, &response.payload).await,
        )?;

        Ok(Success {
            source: Source::Network,
            decoded_token: Some(claims),
            payload: response.payload,
        })
    }

    async fn check_cache<T: ResponseSchema>(
        &self,
        descriptor: &RequestDescriptor,
    ) -> RosterResult<Option<T>> {
        let key = descriptor.cache_key();
        match self.cache.get(key).await? {
            Some(entry) => {
                let envelope = CachedEnvelope::<T>::from_entry(entry);
                let payload = envelope.open(key)?;
                tracing::debug!(cached_at = %envelope.cached_at(), "Cache hit");
                Ok(Some(payload))
            }
            None => {
                tracing::debug!("Cache miss");
                Ok(None)
            }
        }
    }

    async fn write_cache<T: ResponseSchema>(
        &self,
        descriptor: &RequestDescriptor,
        payload: &T,
    ) -> RosterResult<()> {
        let key = descriptor.cache_key();
        let envelope = CachedEnvelope::seal(key, payload)?;
        self.cache.set(key, envelope.into_entry()).await?;
        tracing::debug!("Cache written");
        Ok(())
    }
}

fn step<T>(
    at: PipelineStep,
    result: RosterResult<T>,
) -> Result<T, (PipelineStep, RosterError)> {
    result.map_err(|err| (at, err))
}

impl fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("fetcher", &self.fetcher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::{DirectoryPayload, ErrorKind, SchemaId, UsersPayload};
    use roster_fetch::{HttpResponse, RetryPolicy};
    use roster_test_utils::assertions::{assert_failure, assert_no_secrets_written, assert_success};
    use roster_test_utils::{
        fixtures, tokens, InstrumentedCacheStore, JwtClaimsDecoder, ScriptedTransport, Step,
    };
    use serde_json::json;

    fn pipeline(
        cache: Arc<InstrumentedCacheStore>,
        transport: Arc<ScriptedTransport>,
    ) -> RequestPipeline {
        RequestPipeline::new(
            cache,
            RetryingFetcher::new(transport, RetryPolicy::immediate()),
            Arc::new(JwtClaimsDecoder::new()),
        )
    }

    fn directory_descriptor(budget: u32) -> RequestDescriptor {
        fixtures::descriptor(fixtures::directory_key(), SchemaId::Directory, budget)
    }

    #[tokio::test]
    async fn test_miss_fetches_decodes_and_caches() {
        let cache = InstrumentedCacheStore::new();
        let transport = ScriptedTransport::with_steps([Step::Respond(
            fixtures::directory_response(&tokens::mint("alice")),
        )]);
        let pipeline = pipeline(cache.clone(), transport.clone());

        let outcome = pipeline.run::<DirectoryPayload>(&directory_descriptor(0)).await;
        let claims = match &outcome {
            Outcome::Success(success) => success.decoded_token.clone(),
            Outcome::Failure(failure) => panic!("unexpected failure: {:?}", failure),
        };
        assert_eq!(claims.map(|c| c.username), Some("alice".to_string()));
        assert_eq!(assert_success(outcome, Source::Network), fixtures::directory_payload());

        assert_eq!(transport.calls(), 1);
        assert_eq!((cache.reads(), cache.writes()), (1, 1));
        assert_no_secrets_written(&cache);
    }

    #[tokio::test]
    async fn test_hit_skips_network() {
        let cache = InstrumentedCacheStore::new();
        let transport = ScriptedTransport::with_steps([Step::Respond(
            fixtures::directory_response(&tokens::mint("alice")),
        )]);
        let pipeline = pipeline(cache.clone(), transport.clone());

        let _ = pipeline.run::<DirectoryPayload>(&directory_descriptor(0)).await;
        let outcome = pipeline.run::<DirectoryPayload>(&directory_descriptor(0)).await;

        assert_eq!(assert_success(outcome, Source::Cache), fixtures::directory_payload());
        assert_eq!(transport.calls(), 1);
        assert_eq!(cache.writes(), 1);
    }

    #[tokio::test]
    async fn test_cache_read_fault_is_not_a_miss() {
        let cache = InstrumentedCacheStore::new();
        cache.fail_reads(true);
        let transport = ScriptedTransport::new();
        let pipeline = pipeline(cache.clone(), transport.clone());

        let outcome = pipeline.run::<DirectoryPayload>(&directory_descriptor(0)).await;
        assert_failure(outcome, ErrorKind::CacheError);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_undeserializable_hit_is_cache_error() {
        let cache = InstrumentedCacheStore::new();
        let key = fixtures::directory_key();
        let entry = CachedEnvelope::seal(&key, &json!({"data": "corrupt"}))
            .unwrap()
            .into_entry();
        cache.set(&key, entry).await.unwrap();
        let transport = ScriptedTransport::new();

        let outcome = pipeline(cache, transport.clone())
            .run::<DirectoryPayload>(&directory_descriptor(0))
            .await;
        assert_failure(outcome, ErrorKind::CacheError);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_token_is_invariant_error_and_not_cached() {
        let cache = InstrumentedCacheStore::new();
        let body = fixtures::body_with_token(&fixtures::directory_payload(), None);
        let transport = ScriptedTransport::with_steps([Step::Respond(HttpResponse::new(
            200,
            body.to_string(),
        ))]);

        let outcome = pipeline(cache.clone(), transport)
            .run::<DirectoryPayload>(&directory_descriptor(0))
            .await;
        let message = assert_failure(outcome, ErrorKind::InvariantError);
        assert!(message.contains("token missing"));
        assert_eq!(cache.writes(), 0);
    }

    #[tokio::test]
    async fn test_bad_token_is_token_decode_error_and_not_cached() {
        let cache = InstrumentedCacheStore::new();
        let transport = ScriptedTransport::with_steps([Step::Respond(
            fixtures::directory_response("abc"),
        )]);

        let outcome = pipeline(cache.clone(), transport)
            .run::<DirectoryPayload>(&directory_descriptor(0))
            .await;
        assert_failure(outcome, ErrorKind::TokenDecodeError);
        assert_eq!(cache.writes(), 0);
    }

    #[tokio::test]
    async fn test_cache_write_fault_fails_run() {
        let cache = InstrumentedCacheStore::new();
        cache.fail_writes(true);
        let transport = ScriptedTransport::with_steps([Step::Respond(
            fixtures::directory_response(&tokens::mint("alice")),
        )]);

        let outcome = pipeline(cache.clone(), transport)
            .run::<DirectoryPayload>(&directory_descriptor(0))
            .await;
        assert_failure(outcome, ErrorKind::CacheError);
        assert_eq!(cache.writes(), 1);
    }

    #[tokio::test]
    async fn test_schema_mismatch_touches_nothing() {
        let cache = InstrumentedCacheStore::new();
        let transport = ScriptedTransport::new();

        let outcome = pipeline(cache.clone(), transport.clone())
            .run::<UsersPayload>(&directory_descriptor(0))
            .await;
        assert_failure(outcome, ErrorKind::InvariantError);
        assert_eq!((cache.reads(), cache.writes(), transport.calls()), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_network_failure_propagates_kind() {
        let cache = InstrumentedCacheStore::new();
        let transport = ScriptedTransport::new();
        transport.push_status(502);
        transport.push_status(502);

        let outcome = pipeline(cache.clone(), transport.clone())
            .run::<DirectoryPayload>(&directory_descriptor(1))
            .await;
        assert_failure(outcome, ErrorKind::NetworkError);
        assert_eq!(transport.calls(), 2);
        assert_eq!(cache.writes(), 0);
    }
}
