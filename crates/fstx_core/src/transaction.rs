//! Transaction lifecycle state machine.

use crate::capability::{Aborter, Starter, Stopper};
use crate::context::Context;
use crate::error::{BackendResult, Phase, TransactionError, TransactionResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Delay between consecutive open attempts.
pub const OPEN_ATTEMPT_DELAY: Duration = Duration::from_secs(10);

/// Whether a transaction is currently open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// No transaction is open.
    #[default]
    Idle,
    /// A transaction was opened and not yet closed or aborted.
    Ongoing,
}

impl TransactionState {
    /// Returns true for [`TransactionState::Ongoing`].
    pub fn is_ongoing(&self) -> bool {
        matches!(self, TransactionState::Ongoing)
    }
}

/// Drives a backend through open, close and abort.
///
/// One value represents one in-flight transaction. Operations take
/// `&mut self`, so a single instance cannot be driven from two places at
/// once; independent instances share nothing and may run concurrently.
pub struct Transaction<S, P, A> {
    state: TransactionState,
    starter: Arc<S>,
    stopper: Arc<P>,
    aborter: Arc<A>,
}

impl<B> Transaction<B, B, B>
where
    B: Starter + Stopper + Aborter,
{
    /// Creates a transaction over a backend implementing all three
    /// capabilities.
    pub fn from_backend(backend: Arc<B>) -> Self {
        Self::new(Arc::clone(&backend), Arc::clone(&backend), backend)
    }
}

impl<S, P, A> Transaction<S, P, A>
where
    S: Starter,
    P: Stopper,
    A: Aborter,
{
    /// Creates an idle transaction over the given capabilities.
    pub fn new(starter: Arc<S>, stopper: Arc<P>, aborter: Arc<A>) -> Self {
        Self {
            state: TransactionState::Idle,
            starter,
            stopper,
            aborter,
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns true between a successful open and the next close.
    pub fn is_ongoing(&self) -> bool {
        self.state.is_ongoing()
    }

    /// Marks the transaction as ongoing without contacting the backend.
    ///
    /// Lets a fresh process attach to a transaction that an earlier process
    /// opened, so that a later [`close`](Self::close) actually publishes.
    /// Two processes attaching to the same backend transaction at once is
    /// not detected; callers must prevent it.
    pub fn set_ongoing(&mut self) {
        self.state = TransactionState::Ongoing;
    }

    /// Opens the transaction, retrying failed starts.
    ///
    /// Does nothing if the transaction is already ongoing. Otherwise calls
    /// [`Starter::start`] up to [`Starter::open_attempts`] times, waiting
    /// [`OPEN_ATTEMPT_DELAY`] between attempts. A cancellation reported by the
    /// backend, or one that arrives during a wait, ends the loop at once.
    ///
    /// The transaction is ongoing if and only if this returns `Ok`.
    pub async fn open(&mut self, ctx: &Context) -> TransactionResult<()> {
        if self.is_ongoing() {
            debug!("transaction already ongoing, skipping open");
            return Ok(());
        }

        let starter = &self.starter;
        retry(
            ctx,
            Phase::Open,
            starter.open_attempts(),
            OPEN_ATTEMPT_DELAY,
            move || starter.start(ctx),
        )
        .await?;

        self.state = TransactionState::Ongoing;
        info!("transaction opened");
        Ok(())
    }

    /// Closes (publishes) the transaction, retrying failed stops.
    ///
    /// Does nothing if no transaction is ongoing. Otherwise calls
    /// [`Stopper::stop`] up to [`Stopper::publish_attempts`] times, waiting
    /// [`Stopper::publish_attempts_wait`] between attempts.
    ///
    /// Once the retry loop ends the transaction is idle, whether or not the
    /// close succeeded.
    pub async fn close(&mut self, ctx: &Context) -> TransactionResult<()> {
        if !self.is_ongoing() {
            debug!("no ongoing transaction, skipping close");
            return Ok(());
        }

        let stopper = &self.stopper;
        let result = retry(
            ctx,
            Phase::Close,
            stopper.publish_attempts(),
            stopper.publish_attempts_wait(),
            move || stopper.stop(ctx),
        )
        .await;

        self.state = TransactionState::Idle;
        match &result {
            Ok(()) => info!("transaction closed"),
            Err(e) => warn!(error = %e, "transaction close failed"),
        }
        result
    }

    /// Forcefully aborts the ongoing transaction.
    ///
    /// Does nothing if no transaction is ongoing. Otherwise calls
    /// [`Aborter::kill`] exactly once. The state is left unchanged: an
    /// aborted transaction value is expected to be discarded.
    pub async fn abort(&mut self, ctx: &Context) -> TransactionResult<()> {
        if !self.is_ongoing() {
            debug!("no ongoing transaction, skipping abort");
            return Ok(());
        }

        warn!("aborting transaction");
        self.aborter
            .kill(ctx)
            .await
            .map_err(|e| TransactionError::from_backend(Phase::Abort, e))
    }

    /// Opens the transaction, runs `work`, then closes the transaction
    /// whatever `work` returned.
    ///
    /// An error from `work` takes precedence over an error from the close.
    /// If the open fails, `work` is not run.
    pub async fn run<T, E, F, Fut>(&mut self, ctx: &Context, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TransactionError>,
    {
        self.open(ctx).await?;
        let result = work().await;
        let closed = self.close(ctx).await;
        let value = result?;
        closed?;
        Ok(value)
    }
}

impl<S, P, A> std::fmt::Debug for Transaction<S, P, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Runs `attempt` up to `max_attempts` times.
///
/// Success ends the loop. A cancellation error ends it and is surfaced as a
/// context error. Any other error is retried after `delay`, unless it came
/// from the final attempt. The delay itself is interrupted by `ctx`.
async fn retry<F, Fut>(
    ctx: &Context,
    phase: Phase,
    max_attempts: u32,
    delay: Duration,
    mut attempt: F,
) -> TransactionResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BackendResult<()>>,
{
    for n in 1..=max_attempts {
        debug!(%phase, attempt = n, max_attempts, "transaction attempt");

        let err = match attempt().await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if err.is_cancellation() {
            debug!(%phase, attempt = n, error = %err, "transaction attempt cancelled");
            return Err(TransactionError::from_backend(phase, err));
        }
        if n == max_attempts {
            warn!(%phase, attempts = n, error = %err, "transaction attempts exhausted");
            return Err(TransactionError::from_backend(phase, err));
        }

        warn!(
            %phase,
            attempt = n,
            max_attempts,
            error = %err,
            retry_in = ?delay,
            "transaction attempt failed, retrying"
        );
        ctx.sleep(delay).await?;
    }

    Err(TransactionError::NoAttempts { phase })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextError;
    use crate::error::BackendError;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// A backend whose calls always succeed, or always fail, and are counted.
    #[derive(Default)]
    struct CountingBackend {
        fail: bool,
        attempts: u32,
        starts: AtomicU32,
        stops: AtomicU32,
        kills: AtomicU32,
    }

    impl CountingBackend {
        fn new(attempts: u32) -> Arc<Self> {
            Arc::new(Self {
                attempts,
                ..Default::default()
            })
        }

        fn failing(attempts: u32) -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                attempts,
                ..Default::default()
            })
        }

        fn outcome(&self) -> BackendResult<()> {
            if self.fail {
                Err(BackendError::other("backend unavailable"))
            } else {
                Ok(())
            }
        }
    }

    impl Starter for CountingBackend {
        async fn start(&self, _ctx: &Context) -> BackendResult<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.outcome()
        }

        fn open_attempts(&self) -> u32 {
            self.attempts
        }
    }

    impl Stopper for CountingBackend {
        async fn stop(&self, _ctx: &Context) -> BackendResult<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.outcome()
        }

        fn publish_attempts(&self) -> u32 {
            self.attempts
        }

        fn publish_attempts_wait(&self) -> Duration {
            Duration::from_secs(1)
        }
    }

    impl Aborter for CountingBackend {
        async fn kill(&self, _ctx: &Context) -> BackendResult<()> {
            self.kills.fetch_add(1, Ordering::SeqCst);
            self.outcome()
        }
    }

    #[test]
    fn state_checks() {
        assert!(TransactionState::Ongoing.is_ongoing());
        assert!(!TransactionState::Idle.is_ongoing());
        assert_eq!(TransactionState::default(), TransactionState::Idle);
    }

    #[tokio::test]
    async fn new_transaction_is_idle() {
        let backend = CountingBackend::new(3);
        let txn = Transaction::from_backend(backend);
        assert_eq!(txn.state(), TransactionState::Idle);
        assert!(format!("{txn:?}").contains("Idle"));
    }

    #[tokio::test]
    async fn open_then_close() {
        let backend = CountingBackend::new(3);
        let mut txn = Transaction::from_backend(Arc::clone(&backend));
        let ctx = Context::background();

        txn.open(&ctx).await.unwrap();
        assert!(txn.is_ongoing());
        txn.close(&ctx).await.unwrap();
        assert!(!txn.is_ongoing());

        assert_eq!(backend.starts.load(Ordering::SeqCst), 1);
        assert_eq!(backend.stops.load(Ordering::SeqCst), 1);
        assert_eq!(backend.kills.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn idle_close_and_abort_are_noops() {
        let backend = CountingBackend::failing(3);
        let mut txn = Transaction::from_backend(Arc::clone(&backend));
        let ctx = Context::background();

        txn.close(&ctx).await.unwrap();
        txn.abort(&ctx).await.unwrap();

        assert_eq!(backend.stops.load(Ordering::SeqCst), 0);
        assert_eq!(backend.kills.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn abort_keeps_state() {
        let backend = CountingBackend::failing(3);
        let mut txn = Transaction::from_backend(Arc::clone(&backend));
        txn.set_ongoing();

        let err = txn.abort(&Context::background()).await.unwrap_err();
        assert_eq!(err.phase(), Some(Phase::Abort));
        assert!(txn.is_ongoing());
        assert_eq!(backend.kills.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempts() {
        let backend = CountingBackend::new(0);
        let mut txn = Transaction::from_backend(Arc::clone(&backend));
        let ctx = Context::background();

        let err = txn.open(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            TransactionError::NoAttempts { phase: Phase::Open }
        ));
        assert!(!txn.is_ongoing());

        txn.set_ongoing();
        let err = txn.close(&ctx).await.unwrap_err();
        assert_eq!(err.phase(), Some(Phase::Close));
        assert!(!txn.is_ongoing());
        assert_eq!(backend.starts.load(Ordering::SeqCst), 0);
        assert_eq!(backend.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_close_clears_state() {
        let backend = CountingBackend::failing(2);
        let mut txn = Transaction::from_backend(Arc::clone(&backend));
        txn.set_ongoing();

        let err = txn.close(&Context::background()).await.unwrap_err();
        assert!(matches!(err, TransactionError::Close(_)));
        assert!(!txn.is_ongoing());
        assert_eq!(backend.stops.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_closes_after_work() {
        let backend = CountingBackend::new(1);
        let mut txn = Transaction::from_backend(Arc::clone(&backend));

        let value = txn
            .run(&Context::background(), || async {
                Ok::<_, TransactionError>(42)
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert!(!txn.is_ongoing());
        assert_eq!(backend.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_closes_after_work_failure() {
        let backend = CountingBackend::new(1);
        let mut txn = Transaction::from_backend(Arc::clone(&backend));

        let err = txn
            .run(&Context::background(), || async {
                Err::<(), _>(TransactionError::Context(ContextError::Cancelled))
            })
            .await
            .unwrap_err();

        assert!(err.is_cancellation());
        assert!(!txn.is_ongoing());
        assert_eq!(backend.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_prefers_work_error_over_close_error() {
        let backend = CountingBackend::failing(1);
        let mut txn = Transaction::from_backend(Arc::clone(&backend));
        txn.set_ongoing();

        let err = txn
            .run(&Context::background(), || async {
                Err::<(), _>(TransactionError::NoAttempts { phase: Phase::Abort })
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransactionError::NoAttempts { phase: Phase::Abort }
        ));
        assert!(!txn.is_ongoing());
        assert_eq!(backend.starts.load(Ordering::SeqCst), 0);
        assert_eq!(backend.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_reports_close_error_after_work_success() {
        let backend = CountingBackend::failing(1);
        let mut txn = Transaction::from_backend(Arc::clone(&backend));
        txn.set_ongoing();

        let err = txn
            .run(&Context::background(), || async { Ok::<_, TransactionError>(7) })
            .await
            .unwrap_err();

        assert!(matches!(err, TransactionError::Close(_)));
        assert!(!txn.is_ongoing());
    }
}
