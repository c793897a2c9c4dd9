//! # fstx backends
//!
//! Transaction backends for fstx.
//!
//! This crate provides:
//! - CVMFS backend driving `cvmfs_server transaction/publish/abort`
//! - AFS backend (no publish step; every call succeeds)
//! - Command runner that honours the caller's context and logs tool output
//! - JSON-loadable backend options
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fstx_backends::{CvmfsBackend, CvmfsOpts};
//! use fstx_core::Context;
//!
//! let opts = CvmfsOpts::from_json(&std::fs::read_to_string("cvmfs.json")?)?;
//! let mut txn = CvmfsBackend::new(opts).into_transaction();
//! let ctx = Context::background();
//!
//! txn.open(&ctx).await?;
//! install_release().await?;
//! txn.close(&ctx).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod afs;
mod config;
mod cvmfs;
mod error;
mod shell;

pub use afs::AfsBackend;
pub use config::{
    AfsOpts, CvmfsOpts, DEFAULT_OPEN_ATTEMPTS, DEFAULT_PUBLISH_ATTEMPTS, DEFAULT_PUBLISH_WAIT_SECS,
};
pub use cvmfs::{create_nested_catalogs, CvmfsBackend, NESTED_CATALOG_MARKER};
pub use error::{ConfigError, ConfigResult};
pub use shell::{CommandOutput, CommandRunner};
