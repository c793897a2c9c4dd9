//! Scripted in-memory backend.
//!
//! [`ScriptedBackend`] implements all three capabilities. Each call pops the
//! next [`Outcome`] from a per-capability script and counts the invocation,
//! so tests can assert both results and call counts.

use fstx_core::{
    Aborter, BackendError, BackendResult, Context, ContextError, Starter, Stopper, Transaction,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a single backend call reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The call succeeds.
    Ok,
    /// The call fails with a retryable error carrying this message.
    Fail(String),
    /// The call reports that its context was cancelled.
    Cancelled,
    /// The call reports that its context deadline passed.
    DeadlineExceeded,
}

impl Outcome {
    /// A retryable failure.
    pub fn fail(message: impl Into<String>) -> Self {
        Outcome::Fail(message.into())
    }

    fn into_result(self) -> BackendResult<()> {
        match self {
            Outcome::Ok => Ok(()),
            Outcome::Fail(message) => Err(BackendError::other(message)),
            Outcome::Cancelled => Err(ContextError::Cancelled.into()),
            Outcome::DeadlineExceeded => Err(ContextError::DeadlineExceeded.into()),
        }
    }
}

/// A script of outcomes, falling back to a fixed outcome once exhausted.
#[derive(Debug)]
struct Script {
    queue: VecDeque<Outcome>,
    fallback: Outcome,
}

impl Script {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            fallback: Outcome::Ok,
        }
    }

    fn pop(&mut self) -> Outcome {
        self.queue
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// An in-memory backend driven by scripted outcomes.
#[derive(Debug)]
pub struct ScriptedBackend {
    open_attempts: AtomicU32,
    publish_attempts: AtomicU32,
    publish_wait: Mutex<Duration>,
    latency: Mutex<Duration>,
    start_script: Mutex<Script>,
    stop_script: Mutex<Script>,
    kill_script: Mutex<Script>,
    starts: AtomicU32,
    stops: AtomicU32,
    kills: AtomicU32,
}

impl ScriptedBackend {
    /// Creates a backend whose calls all succeed, allowing 3 attempts per
    /// phase with a 1 second publish wait.
    pub fn new() -> Self {
        Self {
            open_attempts: AtomicU32::new(3),
            publish_attempts: AtomicU32::new(3),
            publish_wait: Mutex::new(Duration::from_secs(1)),
            latency: Mutex::new(Duration::ZERO),
            start_script: Mutex::new(Script::new()),
            stop_script: Mutex::new(Script::new()),
            kill_script: Mutex::new(Script::new()),
            starts: AtomicU32::new(0),
            stops: AtomicU32::new(0),
            kills: AtomicU32::new(0),
        }
    }

    /// Sets the maximum open attempts.
    pub fn with_open_attempts(self, attempts: u32) -> Self {
        self.set_open_attempts(attempts);
        self
    }

    /// Sets the maximum publish attempts.
    pub fn with_publish_attempts(self, attempts: u32) -> Self {
        self.set_publish_attempts(attempts);
        self
    }

    /// Sets the wait between publish attempts.
    pub fn with_publish_wait(self, wait: Duration) -> Self {
        *self.publish_wait.lock() = wait;
        self
    }

    /// Makes every call take `latency` before reporting its outcome.
    ///
    /// The delay honours the call's context, so a cancelled context cuts
    /// it short with a cancellation error.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = latency;
        self
    }

    /// Queues outcomes for successive start calls.
    pub fn with_start_script(self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.start_script.lock().queue.extend(outcomes);
        self
    }

    /// Queues outcomes for successive stop calls.
    pub fn with_stop_script(self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.stop_script.lock().queue.extend(outcomes);
        self
    }

    /// Queues outcomes for successive kill calls.
    pub fn with_kill_script(self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.kill_script.lock().queue.extend(outcomes);
        self
    }

    /// Sets the outcome of start calls once the script is exhausted.
    pub fn with_start_fallback(self, outcome: Outcome) -> Self {
        self.start_script.lock().fallback = outcome;
        self
    }

    /// Sets the outcome of stop calls once the script is exhausted.
    pub fn with_stop_fallback(self, outcome: Outcome) -> Self {
        self.stop_script.lock().fallback = outcome;
        self
    }

    /// Sets the outcome of kill calls once the script is exhausted.
    pub fn with_kill_fallback(self, outcome: Outcome) -> Self {
        self.kill_script.lock().fallback = outcome;
        self
    }

    /// Changes the open attempts of a live backend.
    pub fn set_open_attempts(&self, attempts: u32) {
        self.open_attempts.store(attempts, Ordering::SeqCst);
    }

    /// Changes the publish attempts of a live backend.
    pub fn set_publish_attempts(&self, attempts: u32) {
        self.publish_attempts.store(attempts, Ordering::SeqCst);
    }

    /// Number of start calls so far.
    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of stop calls so far.
    pub fn stops(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }

    /// Number of kill calls so far.
    pub fn kills(&self) -> u32 {
        self.kills.load(Ordering::SeqCst)
    }

    /// Wraps the backend in an `Arc` and builds a transaction over it.
    pub fn into_transaction(self) -> (Arc<Self>, Transaction<Self, Self, Self>) {
        let backend = Arc::new(self);
        let txn = Transaction::from_backend(Arc::clone(&backend));
        (backend, txn)
    }

    async fn call(
        &self,
        ctx: &Context,
        counter: &AtomicU32,
        script: &Mutex<Script>,
    ) -> BackendResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        let outcome = script.lock().pop();

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            ctx.sleep(latency).await?;
        }
        outcome.into_result()
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Starter for ScriptedBackend {
    async fn start(&self, ctx: &Context) -> BackendResult<()> {
        self.call(ctx, &self.starts, &self.start_script).await
    }

    fn open_attempts(&self) -> u32 {
        self.open_attempts.load(Ordering::SeqCst)
    }
}

impl Stopper for ScriptedBackend {
    async fn stop(&self, ctx: &Context) -> BackendResult<()> {
        self.call(ctx, &self.stops, &self.stop_script).await
    }

    fn publish_attempts(&self) -> u32 {
        self.publish_attempts.load(Ordering::SeqCst)
    }

    fn publish_attempts_wait(&self) -> Duration {
        *self.publish_wait.lock()
    }
}

impl Aborter for ScriptedBackend {
    async fn kill(&self, ctx: &Context) -> BackendResult<()> {
        self.call(ctx, &self.kills, &self.kill_script).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_then_fallback() {
        let backend = ScriptedBackend::new()
            .with_start_script([Outcome::fail("busy"), Outcome::Ok])
            .with_start_fallback(Outcome::Cancelled);
        let ctx = Context::background();

        assert!(backend.start(&ctx).await.is_err());
        assert!(backend.start(&ctx).await.is_ok());
        let err = backend.start(&ctx).await.unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(backend.starts(), 3);
        assert_eq!(backend.stops(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_honours_context() {
        let backend = ScriptedBackend::new().with_latency(Duration::from_secs(30));
        let ctx = Context::background().with_timeout(Duration::from_secs(1));

        let err = backend.stop(&ctx).await.unwrap_err();
        assert_eq!(err.as_context_error(), Some(ContextError::DeadlineExceeded));
        assert_eq!(backend.stops(), 1);
    }

    #[test]
    fn live_attempt_counts() {
        let backend = ScriptedBackend::new().with_open_attempts(5);
        assert_eq!(backend.open_attempts(), 5);
        backend.set_open_attempts(1);
        assert_eq!(backend.open_attempts(), 1);
        assert_eq!(backend.publish_attempts(), 3);
        assert_eq!(backend.publish_attempts_wait(), Duration::from_secs(1));
    }
}
