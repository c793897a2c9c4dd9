//! AFS transactions.
//!
//! AFS volumes are written in place and need no publish step, so every
//! lifecycle call succeeds immediately. The backend exists so AFS installs
//! go through the same transaction flow as CVMFS ones.

use crate::config::AfsOpts;
use fstx_core::{Aborter, BackendResult, Context, Starter, Stopper, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A no-op transaction backend for AFS.
#[derive(Debug, Clone, Default)]
pub struct AfsBackend {
    opts: AfsOpts,
}

impl AfsBackend {
    /// Creates a backend from `opts`.
    pub fn new(opts: AfsOpts) -> Self {
        Self { opts }
    }

    /// Builds a transaction driven by this backend.
    pub fn into_transaction(self) -> Transaction<Self, Self, Self> {
        Transaction::from_backend(Arc::new(self))
    }
}

impl Starter for AfsBackend {
    async fn start(&self, _ctx: &Context) -> BackendResult<()> {
        debug!("afs transaction start");
        Ok(())
    }

    fn open_attempts(&self) -> u32 {
        self.opts.open_attempts
    }
}

impl Stopper for AfsBackend {
    async fn stop(&self, _ctx: &Context) -> BackendResult<()> {
        debug!("afs transaction stop");
        Ok(())
    }

    fn publish_attempts(&self) -> u32 {
        1
    }

    fn publish_attempts_wait(&self) -> Duration {
        Duration::ZERO
    }
}

impl Aborter for AfsBackend {
    async fn kill(&self, _ctx: &Context) -> BackendResult<()> {
        debug!("afs transaction abort");
        Ok(())
    }
}
