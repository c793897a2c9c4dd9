//! # fstx core
//!
//! Retrying lifecycle for transactions against a shared, slow and possibly
//! flaky publishing backend.
//!
//! This crate provides:
//! - Capability traits a backend implements (`Starter`, `Stopper`, `Aborter`)
//! - A cancellation and deadline `Context`
//! - The `Transaction` state machine (idle → ongoing → idle)
//! - Phase-tagged errors
//!
//! ## Lifecycle
//!
//! 1. Construct a backend and hand it to [`Transaction`]
//! 2. [`Transaction::open`] retries the backend start until it succeeds
//! 3. Do the work that needs exclusive write access
//! 4. [`Transaction::close`] publishes, or [`Transaction::abort`] discards
//!
//! ## Key Invariants
//!
//! - A transaction is ongoing iff the last open succeeded and no close has run
//! - Opening an ongoing transaction, or closing/aborting an idle one, is a no-op
//! - Cancellation ends a retry loop immediately; other failures are retried
//! - Close always leaves the transaction idle
//! - Backend errors are returned, never swallowed

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod capability;
mod context;
mod error;
mod transaction;

pub use capability::{Aborter, Starter, Stopper};
pub use context::{CancelHandle, Context, ContextError};
pub use error::{BackendError, BackendResult, Phase, TransactionError, TransactionResult};
pub use transaction::{Transaction, TransactionState, OPEN_ATTEMPT_DELAY};
