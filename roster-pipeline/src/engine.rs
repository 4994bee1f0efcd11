//! Assembly of the shared pipeline and its worker channels.

use std::sync::Arc;

use roster_auth::{JwtClaimsDecoder, TokenDecoder};
use roster_core::{CacheError, DirectoryQuery, ResponseSchema, UsersQuery};
use roster_fetch::{HttpTransport, ReqwestTransport, RetryingFetcher};
use roster_storage::{CacheStore, LmdbCacheStore};

use crate::channel::{ChannelConfig, WorkerChannel};
use crate::config::{ConfigError, EngineConfig};
use crate::pipeline::RequestPipeline;
use crate::strategy::{DirectoryFetchTask, PrefetchTask, UsersFetchTask};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to open cache: {0}")]
    Cache(#[from] CacheError),
}

/// Owns one [`RequestPipeline`] and hands out channels that share it.
///
/// Every channel spawned from the same engine shares the cache store, so a
/// result fetched on one channel is a cache hit on every other.
#[derive(Debug, Clone)]
pub struct Engine {
    api_base_url: String,
    pipeline: Arc<RequestPipeline>,
    channel_config: ChannelConfig,
}

impl Engine {
    pub fn new(
        api_base_url: impl Into<String>,
        pipeline: RequestPipeline,
        channel_config: ChannelConfig,
    ) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            pipeline: Arc::new(pipeline),
            channel_config,
        }
    }

    /// Build an engine backed by LMDB and reqwest.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let cache = LmdbCacheStore::open(&config.cache.path, config.cache.max_size_mb)
            .map_err(CacheError::from)?;
        tracing::info!(
            path = %config.cache.path.display(),
            max_size_mb = config.cache.max_size_mb,
            "Opened cache store"
        );
        Ok(Self::with_parts(
            config,
            Arc::new(cache),
            Arc::new(ReqwestTransport::new()),
            Arc::new(JwtClaimsDecoder::new()),
        ))
    }

    /// Build an engine from `config` with caller-supplied backends.
    pub fn with_parts(
        config: &EngineConfig,
        cache: Arc<dyn CacheStore>,
        transport: Arc<dyn HttpTransport>,
        decoder: Arc<dyn TokenDecoder>,
    ) -> Self {
        let fetcher = RetryingFetcher::new(transport, config.retry_policy());
        let pipeline = RequestPipeline::new(cache, fetcher, decoder);
        Self::new(config.api_base_url.clone(), pipeline, config.channel_config())
    }

    pub fn pipeline(&self) -> &Arc<RequestPipeline> {
        &self.pipeline
    }

    pub fn channel_config(&self) -> &ChannelConfig {
        &self.channel_config
    }

    pub fn directory_query(&self) -> DirectoryQuery {
        DirectoryQuery::new(self.api_base_url.clone())
    }

    pub fn users_query(&self, limit: u32) -> UsersQuery {
        UsersQuery::new(self.api_base_url.clone(), limit)
    }

    pub fn directory_channel(&self) -> WorkerChannel<DirectoryFetchTask> {
        WorkerChannel::spawn(
            DirectoryFetchTask,
            Arc::clone(&self.pipeline),
            self.channel_config.clone(),
        )
    }

    pub fn users_channel(&self) -> WorkerChannel<UsersFetchTask> {
        WorkerChannel::spawn(
            UsersFetchTask,
            Arc::clone(&self.pipeline),
            self.channel_config.clone(),
        )
    }

    pub fn prefetch_channel<P: ResponseSchema>(&self) -> WorkerChannel<PrefetchTask<P>> {
        WorkerChannel::spawn(
            PrefetchTask::new(),
            Arc::clone(&self.pipeline),
            self.channel_config.clone(),
        )
    }

    /// Drop every cached result. Returns the number of entries removed.
    pub async fn clear_cache(&self) -> Result<u64, CacheError> {
        let removed = self.pipeline.cache().clear().await?;
        tracing::info!(removed, "Cache cleared");
        Ok(removed)
    }
}
