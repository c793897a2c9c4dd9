//! Error types for transaction lifecycles.

use crate::context::ContextError;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Result type for backend capability calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type for transaction lifecycle calls.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Errors reported by a backend's start, stop or kill operation.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The call gave up because its context was cancelled or expired.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// An external command exited unsuccessfully.
    #[error("command `{command}` failed ({}): {stderr}", display_status(*.status))]
    Command {
        /// The command line that was run.
        command: String,
        /// Exit code, if the process exited normally.
        status: Option<i32>,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// I/O error while talking to the backend.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend-specific failure.
    #[error("{0}")]
    Other(Box<dyn StdError + Send + Sync>),
}

fn display_status(status: Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}

impl BackendError {
    /// Wraps an arbitrary error.
    pub fn other(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Other(err.into())
    }

    /// Returns the context error this failure stems from, if any.
    ///
    /// Wrapped errors are searched through their `source` chain, so a
    /// backend that boxes a [`ContextError`] inside its own error type is
    /// still recognised as cancelled.
    pub fn as_context_error(&self) -> Option<ContextError> {
        match self {
            BackendError::Context(err) => Some(*err),
            BackendError::Other(err) => {
                let root: &(dyn StdError + 'static) = &**err;
                let mut current = Some(root);
                while let Some(err) = current {
                    if let Some(ctx) = err.downcast_ref::<ContextError>() {
                        return Some(*ctx);
                    }
                    if let Some(BackendError::Context(ctx)) = err.downcast_ref::<BackendError>() {
                        return Some(*ctx);
                    }
                    current = err.source();
                }
                None
            }
            _ => None,
        }
    }

    /// Returns true if this failure is a cancellation or deadline expiry.
    ///
    /// Such failures end a retry loop instead of being retried.
    pub fn is_cancellation(&self) -> bool {
        self.as_context_error().is_some()
    }
}

/// The lifecycle phase an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Opening the transaction.
    Open,
    /// Closing (publishing) the transaction.
    Close,
    /// Aborting the transaction.
    Abort,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Open => write!(f, "open"),
            Phase::Close => write!(f, "close"),
            Phase::Abort => write!(f, "abort"),
        }
    }
}

/// Errors returned by [`Transaction`](crate::Transaction) operations.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// The backend failed to open the transaction.
    #[error("transaction open error: {0}")]
    Open(#[source] BackendError),

    /// The backend failed to close the transaction.
    #[error("transaction close error: {0}")]
    Close(#[source] BackendError),

    /// The backend failed to abort the transaction.
    #[error("transaction abort error: {0}")]
    Abort(#[source] BackendError),

    /// The retry loop stopped because the caller's context was cancelled
    /// or its deadline passed.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The backend allows zero attempts for this phase.
    #[error("transaction {phase} error: backend allows no attempts")]
    NoAttempts {
        /// Phase that could not be attempted.
        phase: Phase,
    },
}

impl TransactionError {
    /// Tags a backend failure with the phase that produced it.
    ///
    /// Cancellation is surfaced as [`TransactionError::Context`] rather than
    /// as a phase error.
    pub fn from_backend(phase: Phase, err: BackendError) -> Self {
        if let Some(ctx) = err.as_context_error() {
            return TransactionError::Context(ctx);
        }
        match phase {
            Phase::Open => TransactionError::Open(err),
            Phase::Close => TransactionError::Close(err),
            Phase::Abort => TransactionError::Abort(err),
        }
    }

    /// Returns the phase this error belongs to, or `None` for context errors.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            TransactionError::Open(_) => Some(Phase::Open),
            TransactionError::Close(_) => Some(Phase::Close),
            TransactionError::Abort(_) => Some(Phase::Abort),
            TransactionError::NoAttempts { phase } => Some(*phase),
            TransactionError::Context(_) => None,
        }
    }

    /// Returns the underlying backend error of a phase error.
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            TransactionError::Open(err)
            | TransactionError::Close(err)
            | TransactionError::Abort(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the context error if the operation stopped because the caller
    /// gave up.
    pub fn context_error(&self) -> Option<ContextError> {
        match self {
            TransactionError::Context(err) => Some(*err),
            _ => None,
        }
    }

    /// Returns true if this error reports cancellation or deadline expiry.
    pub fn is_cancellation(&self) -> bool {
        self.context_error().is_some()
    }
}
