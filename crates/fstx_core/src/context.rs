//! Cancellation and deadline signals for transaction operations.
//!
//! Every lifecycle call takes a [`Context`]. The retry loops race their
//! inter-attempt delay against it, and backends receive the same value so
//! they can bound their own external calls.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a context stopped being live.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// The context (or one of its ancestors) was cancelled.
    #[error("context canceled")]
    Cancelled,

    /// The context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Shared cancellation state. Children register weakly so that dropping a
/// child context never keeps it alive through its parent.
#[derive(Debug)]
struct CancelState {
    tx: watch::Sender<bool>,
    children: Mutex<Vec<Weak<CancelState>>>,
}

impl CancelState {
    fn new() -> Arc<Self> {
        let (tx, _) = watch::channel(false);
        Arc::new(Self {
            tx,
            children: Mutex::new(Vec::new()),
        })
    }

    fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn cancel(&self) {
        self.tx.send_replace(true);
        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }

    fn child(self: &Arc<Self>) -> Arc<Self> {
        let child = Self::new();
        let mut children = self.children.lock();
        if self.is_cancelled() {
            child.tx.send_replace(true);
        } else {
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }
        child
    }
}

/// A cancellation and deadline signal handed to every transaction call.
///
/// Contexts are cheap to clone; clones observe the same signal.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: Option<Arc<CancelState>>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derives a child context together with the handle that cancels it.
    ///
    /// Cancelling the parent also cancels the child; cancelling the child
    /// leaves the parent untouched.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let state = match &self.cancel {
            Some(parent) => parent.child(),
            None => CancelState::new(),
        };
        let ctx = Self {
            cancel: Some(Arc::clone(&state)),
            deadline: self.deadline,
        };
        (ctx, CancelHandle { state })
    }

    /// Derives a child context that expires at `deadline`, or at the parent's
    /// deadline if that comes first.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        };
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(deadline),
        }
    }

    /// Derives a child context that expires `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns the effective deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns why the context is done, or `None` while it is still live.
    ///
    /// Cancellation takes precedence over an expired deadline.
    pub fn err(&self) -> Option<ContextError> {
        if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        if let Some(err) = self.err() {
            return err;
        }

        let cancelled = async {
            if let Some(state) = &self.cancel {
                let mut rx = state.tx.subscribe();
                let signalled = rx.wait_for(|cancelled| *cancelled).await.is_ok();
                if signalled {
                    return;
                }
            }
            std::future::pending::<()>().await
        };

        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = cancelled => ContextError::Cancelled,
            () = expired => ContextError::DeadlineExceeded,
        }
    }

    /// Waits for `delay`, returning early with the context error if the
    /// context is done first.
    pub async fn sleep(&self, delay: Duration) -> Result<(), ContextError> {
        if let Some(err) = self.err() {
            return Err(err);
        }

        tokio::select! {
            biased;
            err = self.done() => Err(err),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

/// Cancels the [`Context`] it was created with, and all of its descendants.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    /// Cancels the context. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    /// Returns true once [`cancel`](Self::cancel) has been called on this
    /// handle or an ancestor.
    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }
}
