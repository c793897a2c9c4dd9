//! Backend options.
//!
//! Options deserialize from the JSON documents release tooling already uses,
//! so the field names match those documents rather than Rust naming.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default number of attempts to open a transaction.
pub const DEFAULT_OPEN_ATTEMPTS: u32 = 3;

/// Default number of attempts to publish a transaction.
pub const DEFAULT_PUBLISH_ATTEMPTS: u32 = 3;

/// Default wait between publish attempts, in seconds.
pub const DEFAULT_PUBLISH_WAIT_SECS: u64 = 30;

fn default_open_attempts() -> u32 {
    DEFAULT_OPEN_ATTEMPTS
}

fn default_publish_attempts() -> u32 {
    DEFAULT_PUBLISH_ATTEMPTS
}

fn default_publish_wait_secs() -> u64 {
    DEFAULT_PUBLISH_WAIT_SECS
}

fn default_cvmfs_binary() -> PathBuf {
    PathBuf::from("cvmfs_server")
}

fn check_attempts(field: &'static str, attempts: u32) -> ConfigResult<()> {
    if attempts == 0 {
        return Err(ConfigError::Invalid {
            field,
            reason: "must be at least 1".into(),
        });
    }
    Ok(())
}

/// Options for a CVMFS transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CvmfsOpts {
    /// User with the rights to run the server tool; commands run through
    /// `sudo -u` when set.
    #[serde(default)]
    pub sudo_user: Option<String>,

    /// Path to the CVMFS server tool.
    #[serde(rename = "cvmfs_server_binary", default = "default_cvmfs_binary")]
    pub binary: PathBuf,

    /// Repository the transaction is opened on.
    pub nightly_repo: String,

    /// Machine allowed to contact the CVMFS gateway.
    #[serde(default)]
    pub release_manager: String,

    /// How many times to try opening the transaction.
    #[serde(
        rename = "max_transaction_open_attempts",
        default = "default_open_attempts"
    )]
    pub open_attempts: u32,

    /// How many times to try publishing the transaction.
    #[serde(rename = "max_publish_attempts", default = "default_publish_attempts")]
    pub publish_attempts: u32,

    /// Seconds to wait between publish attempts.
    #[serde(default = "default_publish_wait_secs")]
    pub publish_attempts_wait_secs: u64,
}

impl CvmfsOpts {
    /// Creates options for `repo` with default binary and attempt counts.
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            sudo_user: None,
            binary: default_cvmfs_binary(),
            nightly_repo: repo.into(),
            release_manager: String::new(),
            open_attempts: DEFAULT_OPEN_ATTEMPTS,
            publish_attempts: DEFAULT_PUBLISH_ATTEMPTS,
            publish_attempts_wait_secs: DEFAULT_PUBLISH_WAIT_SECS,
        }
    }

    /// Parses and validates options from a JSON document.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let opts: Self = serde_json::from_str(json)?;
        opts.validate()?;
        Ok(opts)
    }

    /// Checks that the options can drive a transaction.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.nightly_repo.trim().is_empty() {
            return Err(ConfigError::Missing("nightly_repo"));
        }
        if self.binary.as_os_str().is_empty() {
            return Err(ConfigError::Missing("cvmfs_server_binary"));
        }
        check_attempts("max_transaction_open_attempts", self.open_attempts)?;
        check_attempts("max_publish_attempts", self.publish_attempts)
    }

    /// Sets the server tool path.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Runs commands as `user` through `sudo -u`.
    pub fn with_sudo_user(mut self, user: impl Into<String>) -> Self {
        self.sudo_user = Some(user.into());
        self
    }

    /// Sets the release manager node.
    pub fn with_release_manager(mut self, node: impl Into<String>) -> Self {
        self.release_manager = node.into();
        self
    }

    /// Sets the open attempt count.
    pub fn with_open_attempts(mut self, attempts: u32) -> Self {
        self.open_attempts = attempts;
        self
    }

    /// Sets the publish attempt count.
    pub fn with_publish_attempts(mut self, attempts: u32) -> Self {
        self.publish_attempts = attempts;
        self
    }

    /// Sets the wait between publish attempts.
    ///
    /// The wait is stored in whole seconds; a fractional second rounds up.
    pub fn with_publish_attempts_wait(mut self, wait: Duration) -> Self {
        self.publish_attempts_wait_secs = wait
            .as_secs()
            .saturating_add(u64::from(wait.subsec_nanos() > 0));
        self
    }

    /// The wait between publish attempts.
    pub fn publish_attempts_wait(&self) -> Duration {
        Duration::from_secs(self.publish_attempts_wait_secs)
    }
}

/// Options for an AFS transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfsOpts {
    /// How many times to try opening the transaction.
    #[serde(
        rename = "max_transaction_open_attempts",
        default = "default_open_attempts"
    )]
    pub open_attempts: u32,
}

impl AfsOpts {
    /// Parses and validates options from a JSON document.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let opts: Self = serde_json::from_str(json)?;
        check_attempts("max_transaction_open_attempts", opts.open_attempts)?;
        Ok(opts)
    }

    /// Sets the open attempt count.
    pub fn with_open_attempts(mut self, attempts: u32) -> Self {
        self.open_attempts = attempts;
        self
    }
}

impl Default for AfsOpts {
    fn default() -> Self {
        Self {
            open_attempts: DEFAULT_OPEN_ATTEMPTS,
        }
    }
}
