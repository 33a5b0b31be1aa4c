//! Error types for the collaborator surfaces of the store.
//!
//! The dispatch core itself never fails: a vetoed action is a normal
//! outcome and a dispatch to a destroyed store is a silent no-op. Errors
//! only come from the edges: serial queues that have shut down, waiters
//! whose completion can no longer fire, and configuration files.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by an [`ExecutionContext`](crate::ExecutionContext).
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue was shut down or its worker is gone.
    #[error("serial queue '{0}' is closed")]
    Closed(String),

    /// The worker thread could not be started.
    #[error("failed to spawn worker for serial queue '{label}'")]
    Spawn {
        label: String,
        #[source]
        source: io::Error,
    },
}

/// Error returned by [`Store::dispatch_and_wait`](crate::Store::dispatch_and_wait).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    /// The completion callback was dropped without firing.
    ///
    /// Happens when the store is destroyed before the action runs, or when
    /// the action body drops its [`Completion`](crate::Completion).
    #[error("action completion was abandoned before it fired")]
    Abandoned,
}

/// Errors raised while loading a [`StoreConfig`](crate::StoreConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
}
