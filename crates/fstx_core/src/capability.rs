//! Capability contracts implemented by transaction backends.
//!
//! A backend translates the three lifecycle verbs into calls against a
//! concrete publishing mechanism. The traits are independent: a backend may
//! implement all three on one type, or split them across several.

use crate::context::Context;
use crate::error::BackendResult;
use std::future::Future;
use std::time::Duration;

/// Performs a single attempt at opening a transaction.
pub trait Starter: Send + Sync {
    /// Attempts to acquire exclusive write access.
    fn start(&self, ctx: &Context) -> impl Future<Output = BackendResult<()>> + Send;

    /// Maximum number of start attempts for one open.
    ///
    /// Queried afresh on every open, so it may change between transactions.
    fn open_attempts(&self) -> u32;
}

/// Performs a single attempt at closing (publishing) a transaction.
pub trait Stopper: Send + Sync {
    /// Attempts to commit the pending changes and release write access.
    fn stop(&self, ctx: &Context) -> impl Future<Output = BackendResult<()>> + Send;

    /// Maximum number of stop attempts for one close.
    fn publish_attempts(&self) -> u32;

    /// Delay between consecutive stop attempts.
    fn publish_attempts_wait(&self) -> Duration;
}

/// Forcefully releases a transaction without committing.
pub trait Aborter: Send + Sync {
    /// Discards pending changes. Called once; never retried.
    fn kill(&self, ctx: &Context) -> impl Future<Output = BackendResult<()>> + Send;
}
