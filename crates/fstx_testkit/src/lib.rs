//! # fstx testkit
//!
//! Test utilities for fstx.
//!
//! This crate provides:
//! - A scripted in-memory backend implementing every capability
//! - Property-based test generators using proptest
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fstx_testkit::prelude::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn retries_until_open() {
//!     let (backend, mut txn) = ScriptedBackend::new()
//!         .with_start_script([Outcome::fail("busy"), Outcome::Ok])
//!         .into_transaction();
//!     txn.open(&Context::background()).await.unwrap();
//!     assert_eq!(backend.starts(), 2);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

use tracing_subscriber::EnvFilter;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use fstx_core::{Context, ContextError, Phase, Transaction, TransactionError};
}

pub use fixtures::*;
pub use generators::*;

/// Installs a test-friendly tracing subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
