//! Worker channels.
//!
//! A [`WorkerChannel`] hosts one [`RequestPipeline`] on its own tokio task
//! and talks to its owner only through messages: requests go in through
//! [`WorkerChannel::submit`], and exactly one [`ReplyMessage`] per accepted
//! request comes back on the reply stream.
//!
//! Requests are validated when submitted. An invalid request is answered
//! with an `InvariantError` at once and never queued. Valid requests run one
//! at a time in acceptance order. Each run executes on a separate task so a
//! panic is caught at the channel boundary and reported as an
//! `InternalError` failure; the channel keeps serving.
//!
//! # Teardown
//!
//! [`WorkerChannel::terminate`] (or dropping the channel) stops accepting
//! requests and stops listening for replies. A run already in flight still
//! completes its fetch and cache write, but its reply is discarded. Queued
//! requests that have not started are skipped.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use roster_core::{
    AbortController, ErrorKind, Failure, InvariantError, Outcome, RequestDescriptor,
    ResponseSchema, RosterError, FETCH_REQUEST_TIMEOUT,
};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

use crate::pipeline::RequestPipeline;
use crate::protocol::{ReplyMessage, RequestId, RequestMessage};
use crate::strategy::TaskStrategy;

/// Default number of requests that may wait in a channel's queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default retry budget for requests that do not carry one.
pub const DEFAULT_RETRY_BUDGET: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub queue_capacity: usize,
    /// Bound on every fetch, retries and backoff included.
    pub request_timeout: Duration,
    pub default_retry_budget: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            request_timeout: FETCH_REQUEST_TIMEOUT,
            default_retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel has been terminated")]
    Terminated,
}

/// A validated request waiting for the worker.
struct Job<S: TaskStrategy> {
    request_id: RequestId,
    descriptor: RequestDescriptor,
    extras: S::Extras,
    controller: AbortController,
}

/// Both ends the owner uses to feed the worker. Dropped on terminate.
struct Intake<S: TaskStrategy> {
    jobs: mpsc::Sender<Job<S>>,
    replies: mpsc::UnboundedSender<ReplyMessage<S::Payload>>,
}

pub struct WorkerChannel<S: TaskStrategy> {
    strategy: Arc<S>,
    default_retry_budget: u32,
    intake: Option<Intake<S>>,
    replies: mpsc::UnboundedReceiver<ReplyMessage<S::Payload>>,
    worker: JoinHandle<()>,
}

impl<S: TaskStrategy> WorkerChannel<S> {
    /// Spawn the channel's task. Must be called within a tokio runtime.
    pub fn spawn(strategy: S, pipeline: Arc<RequestPipeline>, config: ChannelConfig) -> Self {
        let strategy = Arc::new(strategy);
        let (jobs_tx, jobs_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();

        let worker = tokio::spawn(run_worker(
            Arc::clone(&strategy),
            pipeline,
            config.request_timeout,
            jobs_rx,
            replies_tx.clone(),
        ));
        tracing::debug!(task = %S::TASK, "Worker channel started");

        Self {
            strategy,
            default_retry_budget: config.default_retry_budget,
            intake: Some(Intake {
                jobs: jobs_tx,
                replies: replies_tx,
            }),
            replies: replies_rx,
            worker,
        }
    }

    /// Accept a typed request.
    ///
    /// A request that fails validation is answered with an `InvariantError`
    /// before this returns; it never enters the queue. A valid request waits
    /// while the queue is full.
    pub async fn submit(&self, message: RequestMessage) -> Result<RequestId, ChannelError> {
        let intake = self.intake.as_ref().ok_or(ChannelError::Terminated)?;
        let request_id = RequestId::new();
        match self.prepare(&message) {
            Ok((descriptor, extras, controller)) => {
                let job = Job {
                    request_id,
                    descriptor,
                    extras,
                    controller,
                };
                intake
                    .jobs
                    .send(job)
                    .await
                    .map_err(|_| ChannelError::Terminated)?;
                tracing::trace!(task = %S::TASK, request_id = %request_id, "Request queued");
            }
            Err(err) => reject(intake, request_id, err)?,
        }
        Ok(request_id)
    }

    /// Accept a raw JSON request. Input that does not parse is answered
    /// like any other invalid request.
    pub async fn submit_raw(&self, raw: &str) -> Result<RequestId, ChannelError> {
        match RequestMessage::from_json(raw) {
            Ok(message) => self.submit(message).await,
            Err(err) => {
                let intake = self.intake.as_ref().ok_or(ChannelError::Terminated)?;
                let request_id = RequestId::new();
                reject(intake, request_id, err)?;
                Ok(request_id)
            }
        }
    }

    fn prepare(
        &self,
        message: &RequestMessage,
    ) -> Result<(RequestDescriptor, S::Extras, AbortController), InvariantError> {
        let extras = self.strategy.parse_extras(message)?;
        let controller = AbortController::new();
        let descriptor = message.to_descriptor(controller.signal(), self.default_retry_budget)?;
        let expected = <S::Payload as ResponseSchema>::SCHEMA_ID;
        if descriptor.schema_id() != expected {
            return Err(InvariantError::SchemaMismatch {
                expected: expected.to_string(),
                got: descriptor.schema_id().to_string(),
            });
        }
        Ok((descriptor, extras, controller))
    }

    /// Next reply, or `None` once the channel is terminated and drained.
    pub async fn recv(&mut self) -> Option<ReplyMessage<S::Payload>> {
        self.replies.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ReplyMessage<S::Payload>> {
        self.replies.try_recv().ok()
    }

    pub fn is_terminated(&self) -> bool {
        self.intake.is_none()
    }

    /// Stop accepting requests and stop listening for replies.
    pub fn terminate(&mut self) {
        if self.intake.take().is_some() {
            self.replies.close();
            tracing::debug!(task = %S::TASK, "Worker channel terminated");
        }
    }

    /// Terminate and wait for any in-flight run to finish.
    pub async fn shutdown(mut self) {
        self.terminate();
        if let Err(err) = self.worker.await {
            tracing::error!(task = %S::TASK, error = %err, "Worker task failed");
        }
    }
}

impl<S: TaskStrategy> std::fmt::Debug for WorkerChannel<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerChannel")
            .field("task", &S::TASK)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

fn reject<S: TaskStrategy>(
    intake: &Intake<S>,
    request_id: RequestId,
    err: InvariantError,
) -> Result<(), ChannelError> {
    let reply = ReplyMessage {
        request_id,
        task: S::TASK,
        outcome: rejected(request_id, err),
    };
    intake
        .replies
        .send(reply)
        .map_err(|_| ChannelError::Terminated)
}

async fn run_worker<S: TaskStrategy>(
    strategy: Arc<S>,
    pipeline: Arc<RequestPipeline>,
    request_timeout: Duration,
    mut jobs: mpsc::Receiver<Job<S>>,
    replies: mpsc::UnboundedSender<ReplyMessage<S::Payload>>,
) {
    while let Some(job) = jobs.recv().await {
        let request_id = job.request_id;
        if replies.is_closed() {
            tracing::debug!(task = %S::TASK, request_id = %request_id, "Skipping queued request after terminate");
            continue;
        }

        let outcome = execute(&strategy, &pipeline, request_timeout, job).await;
        let reply = ReplyMessage {
            request_id,
            task: S::TASK,
            outcome,
        };
        if replies.send(reply).is_err() {
            tracing::debug!(task = %S::TASK, request_id = %request_id, "Reply discarded, channel terminated");
        }
    }
    tracing::debug!(task = %S::TASK, "Worker channel stopped");
}

async fn execute<S: TaskStrategy>(
    strategy: &Arc<S>,
    pipeline: &Arc<RequestPipeline>,
    request_timeout: Duration,
    job: Job<S>,
) -> Outcome<S::Payload> {
    let Job {
        request_id,
        descriptor,
        extras,
        controller,
    } = job;

    let _timer = controller.abort_after(request_timeout);
    let strategy = Arc::clone(strategy);
    let pipeline = Arc::clone(pipeline);
    let run = tokio::spawn(async move {
        pipeline
            .run::<S::Payload>(&descriptor)
            .await
            .map_payload(|payload| strategy.post_process(payload, &extras))
    });

    match run.await {
        Ok(outcome) => outcome,
        Err(err) => {
            let message = join_error_message(err);
            tracing::error!(task = %S::TASK, request_id = %request_id, error = %message, "Pipeline run panicked");
            Outcome::Failure(Failure::new(ErrorKind::InternalError, message))
        }
    }
}

fn rejected<T>(request_id: RequestId, err: InvariantError) -> Outcome<T> {
    tracing::warn!(request_id = %request_id, error = %err, "Rejected malformed request");
    Outcome::Failure(Failure::from(RosterError::from(err)))
}

fn join_error_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "pipeline run was cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => format!("pipeline run panicked: {}", panic_text(payload.as_ref())),
        Err(err) => err.to_string(),
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> &str {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.as_str()
    } else {
        "non-string panic payload"
    }
}
