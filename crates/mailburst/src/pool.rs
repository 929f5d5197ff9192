//! Bounded worker pool that dispatches messages concurrently.
//!
//! Jobs flow through a bounded queue to a fixed set of worker tasks. Every
//! job that reaches a worker produces exactly one [`DispatchResult`] on an
//! unbounded result channel, so stopping the pool never waits on a reader.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local};
use mailburst_smtp::{Mailer, Message, TlsTransport, Transport};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::Config;
use crate::error::{Error, Result, SubmitError};
use crate::retry::RetryPolicy;

/// Lifecycle of a [`DispatchPool`]. It only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created, no workers yet.
    Created,
    /// Workers running and accepting jobs.
    Running,
    /// Queue closed, waiting for workers to drain it.
    Stopping,
    /// All workers finished; the result stream has ended.
    Stopped,
}

/// Outcome of dispatching one message.
#[derive(Debug)]
pub struct DispatchResult {
    /// The message this result is for.
    pub message: Message,
    /// Whether the message was delivered.
    pub success: bool,
    /// Error of the last attempt, on failure.
    pub error: Option<Error>,
    /// Time spent on the message, backoff included.
    pub elapsed: Duration,
    /// When the last attempt finished.
    pub completed_at: DateTime<Local>,
    /// Attempts made (zero if the message never reached a worker).
    pub attempts: u32,
}

impl DispatchResult {
    fn new(message: Message, outcome: Result<()>, elapsed: Duration, attempts: u32) -> Self {
        Self {
            message,
            success: outcome.is_ok(),
            error: outcome.err(),
            elapsed,
            completed_at: Local::now(),
            attempts,
        }
    }

    fn not_queued(message: Message, reason: SubmitError) -> Self {
        Self::new(message, Err(reason.into()), Duration::ZERO, 0)
    }
}

struct PoolState {
    lifecycle: Lifecycle,
    retry: Option<RetryPolicy>,
    jobs: Option<mpsc::Sender<Message>>,
    results: Option<mpsc::UnboundedSender<DispatchResult>>,
    workers: Vec<JoinHandle<()>>,
}

/// Worker pool delivering messages through a shared [`Mailer`].
pub struct DispatchPool<T = TlsTransport> {
    mailer: Arc<Mailer<T>>,
    sender: String,
    workers: usize,
    queue_capacity: usize,
    next_id: AtomicU64,
    state: Mutex<PoolState>,
    results: Mutex<Option<mpsc::UnboundedReceiver<DispatchResult>>>,
}

impl DispatchPool<TlsTransport> {
    /// Creates a TLS pool from a loaded configuration.
    ///
    /// A configuration with `max_retries == 0` disables retry.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let pool = Self::new(
            Mailer::tls(config.session()),
            config.from.clone(),
            config.workers,
        );
        pool.state().retry = config.retry.is_enabled().then_some(config.retry);
        pool
    }
}

impl<T: Transport + 'static> DispatchPool<T> {
    /// Creates a pool with `workers` tasks (at least one), a job queue of
    /// `workers * 2` and the default retry policy.
    ///
    /// `sender` is the From address of messages built with [`message`](Self::message).
    #[must_use]
    pub fn new(mailer: Mailer<T>, sender: impl Into<String>, workers: usize) -> Self {
        let workers = workers.max(1);
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        Self {
            mailer: Arc::new(mailer),
            sender: sender.into(),
            workers,
            queue_capacity: workers * 2,
            next_id: AtomicU64::new(0),
            state: Mutex::new(PoolState {
                lifecycle: Lifecycle::Created,
                retry: Some(RetryPolicy::default()),
                jobs: None,
                results: Some(results_tx),
                workers: Vec::new(),
            }),
            results: Mutex::new(Some(results_rx)),
        }
    }

    /// Overrides the job queue capacity (at least one).
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Number of worker tasks.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Capacity of the job queue.
    #[must_use]
    pub const fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Mailer shared by the workers.
    #[must_use]
    pub fn mailer(&self) -> &Mailer<T> {
        &self.mailer
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.state().lifecycle
    }

    /// Retry policy in effect, or `None` if retry is disabled.
    #[must_use]
    pub fn retry_policy(&self) -> Option<RetryPolicy> {
        self.state().retry
    }

    /// Replaces the retry policy. `max_retries == 0` disables retry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] once the pool has been started.
    pub fn set_retry_policy(
        &self,
        max_retries: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
    ) -> Result<()> {
        let mut state = self.state();
        if state.lifecycle != Lifecycle::Created {
            return Err(Error::AlreadyStarted);
        }

        let policy = RetryPolicy::new(max_retries, initial_backoff, max_backoff);
        state.retry = policy.is_enabled().then_some(policy);
        Ok(())
    }

    /// Builds a message from the configured sender with the next id.
    ///
    /// Ids start at 1 and strictly increase, also across threads.
    pub fn message(
        &self,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Message {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        Message::new(id, self.sender.clone(), to, subject, body)
    }

    /// Spawns the worker tasks.
    ///
    /// Starting a running pool only logs a warning, and a stopped pool cannot
    /// be restarted.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(&self) {
        let mut state = self.state();
        match state.lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Running => {
                tracing::warn!("dispatch pool already started");
                return;
            }
            Lifecycle::Stopping | Lifecycle::Stopped => {
                tracing::warn!("dispatch pool has been stopped and cannot restart");
                return;
            }
        }

        let Some(results) = state.results.take() else {
            return;
        };
        let retry = state.retry;
        let (jobs_tx, jobs_rx) = mpsc::channel(self.queue_capacity);
        let jobs_rx = Arc::new(AsyncMutex::new(jobs_rx));

        match retry {
            Some(policy) => tracing::info!(
                workers = self.workers,
                max_attempts = policy.max_retries,
                "starting dispatch pool with retry"
            ),
            None => tracing::info!(workers = self.workers, "starting dispatch pool without retry"),
        }

        state.workers = (1..=self.workers)
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    Arc::clone(&self.mailer),
                    retry,
                    Arc::clone(&jobs_rx),
                    results.clone(),
                ))
            })
            .collect();
        state.jobs = Some(jobs_tx);
        state.lifecycle = Lifecycle::Running;
    }

    /// Enqueues a message without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::NotStarted`] before `start()`,
    /// [`SubmitError::ShuttingDown`] after `stop()`, and
    /// [`SubmitError::QueueFull`] when the queue is at capacity.
    pub fn submit(&self, message: Message) -> std::result::Result<(), SubmitError> {
        let state = self.state();
        let jobs = match (state.lifecycle, &state.jobs) {
            (Lifecycle::Created, _) => return Err(SubmitError::NotStarted),
            (Lifecycle::Running, Some(jobs)) => jobs,
            _ => return Err(SubmitError::ShuttingDown),
        };

        let id = message.id;
        match jobs.try_send(message) {
            Ok(()) => {
                tracing::debug!(id, "message queued");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(SubmitError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(SubmitError::ShuttingDown),
        }
    }

    /// Closes the queue and waits until every queued and in-flight message
    /// has produced its result. The result stream ends afterwards.
    ///
    /// Calling it again is a no-op, and so is stopping a pool that was never
    /// started; such a pool can still be started later.
    pub async fn stop(&self) {
        let (jobs, workers) = {
            let mut state = self.state();
            match state.lifecycle {
                Lifecycle::Running => {}
                Lifecycle::Created => {
                    tracing::warn!("dispatch pool not started");
                    return;
                }
                Lifecycle::Stopping | Lifecycle::Stopped => return,
            }

            tracing::info!("stopping dispatch pool");
            state.lifecycle = Lifecycle::Stopping;
            (state.jobs.take(), std::mem::take(&mut state.workers))
        };

        drop(jobs);
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "worker task failed");
            }
        }

        self.state().lifecycle = Lifecycle::Stopped;
        tracing::info!("dispatch pool stopped");
    }

    /// Takes the result stream. Only the first call returns it.
    ///
    /// The stream is unbounded and, until taken, is owned by the pool: a pool
    /// driven through `start`/`submit`/`stop` without ever calling this keeps
    /// every [`DispatchResult`] in memory until the pool is dropped.
    pub fn results(&self) -> Option<mpsc::UnboundedReceiver<DispatchResult>> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Starts the pool, enqueues every message (waiting for queue space),
    /// stops, and returns all results in completion order.
    ///
    /// A message that cannot be enqueued gets a failed result with zero
    /// attempts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResultsTaken`] if `results()` was already called.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub async fn process_all(&self, messages: Vec<Message>) -> Result<Vec<DispatchResult>> {
        let mut results = self.results().ok_or(Error::ResultsTaken)?;
        let total = messages.len();

        self.start();
        let jobs = self.state().jobs.clone();

        let mut rejected = Vec::new();
        if let Some(jobs) = jobs {
            for message in messages {
                let id = message.id;
                match jobs.send(message).await {
                    Ok(()) => tracing::debug!(id, "message queued"),
                    Err(mpsc::error::SendError(message)) => rejected.push(message),
                }
            }
        } else {
            rejected = messages;
        }

        self.stop().await;

        let mut out = Vec::with_capacity(total);
        while let Some(result) = results.recv().await {
            out.push(result);
        }
        for message in rejected {
            tracing::warn!(id = message.id, to = %message.to, "message was not queued");
            out.push(DispatchResult::not_queued(message, SubmitError::ShuttingDown));
        }

        Ok(out)
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> std::fmt::Debug for DispatchPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchPool")
            .field("sender", &self.sender)
            .field("workers", &self.workers)
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}

async fn worker<T: Transport>(
    id: usize,
    mailer: Arc<Mailer<T>>,
    retry: Option<RetryPolicy>,
    jobs: Arc<AsyncMutex<mpsc::Receiver<Message>>>,
    results: mpsc::UnboundedSender<DispatchResult>,
) {
    loop {
        // Lock only while waiting for the next job.
        let Some(message) = jobs.lock().await.recv().await else {
            break;
        };

        tracing::info!(worker = id, id = message.id, to = %message.to, "processing message");
        let started = Instant::now();

        let (outcome, attempts) = match retry {
            Some(policy) => {
                let mailer = &*mailer;
                let message = &message;
                let outcome = policy
                    .send_with_retry(move |attempt| {
                        tracing::debug!(worker = id, id = message.id, attempt, "sending");
                        mailer.send_one(message)
                    })
                    .await;
                (outcome.result, outcome.attempts)
            }
            None => (mailer.send_one(&message).await.map_err(Error::from), 1),
        };

        let elapsed = started.elapsed();
        match &outcome {
            Ok(()) => tracing::info!(
                worker = id,
                id = message.id,
                to = %message.to,
                attempts,
                ?elapsed,
                "message sent"
            ),
            Err(e) => tracing::error!(
                worker = id,
                id = message.id,
                to = %message.to,
                attempts,
                error = %e,
                "message failed"
            ),
        }

        if results
            .send(DispatchResult::new(message, outcome, elapsed, attempts))
            .is_err()
        {
            tracing::debug!(worker = id, "result receiver dropped");
        }
    }

    tracing::debug!(worker = id, "worker finished");
}
