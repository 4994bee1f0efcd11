//! ROSTER request pipeline
//!
//! Cache-first fetching of directory and user-list data. A
//! [`RequestPipeline`] checks the cache, fetches with bounded retry on a
//! miss, validates and decodes the response, and writes a sanitized copy
//! back. [`WorkerChannel`]s host the pipeline off the caller's task and
//! speak the [`ReplyMessage`] protocol.

pub mod channel;
pub mod config;
pub mod engine;
pub mod pipeline;
pub mod protocol;
pub mod strategy;
pub mod telemetry;

pub use channel::{
    ChannelConfig, ChannelError, WorkerChannel, DEFAULT_QUEUE_CAPACITY, DEFAULT_RETRY_BUDGET,
};
pub use config::{
    CacheConfig, ChannelSection, ConfigError, EngineConfig, LogConfig, RetryConfig,
};
pub use engine::{Engine, EngineError};
pub use pipeline::{PipelineStep, RequestPipeline};
pub use protocol::{ReplyMessage, RequestId, RequestInit, RequestMessage, TaskKind};
pub use strategy::{
    Arrangement, DirectoryFetchTask, PrefetchTask, SortDirection, SortField, TaskStrategy,
    UsersFetchTask,
};
pub use telemetry::{init_tracing, TelemetryError};

// Shared types callers need alongside the pipeline.
pub use roster_core::{
    CacheKey, DecodedTokenClaims, DirectoryQuery, ErrorKind, Failure, Outcome, Source, Success,
    UsersQuery,
};
