//! Server error types.

use iothread_settings::SettingsError;
use thiserror::Error;

/// Errors that stop the server from starting or serving.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: String,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// Settings failed to load or validate.
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
