//! Runtime error types.

use thiserror::Error;

use courier_core::ConfigurationError;

use crate::config::ConfigError;

/// Errors that can occur while building or running a [`CourierRuntime`](crate::CourierRuntime).
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Handler registration failed.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The configured strategy needs a tokio runtime and none is running.
    #[error("strategy `{strategy}` requires a running tokio runtime")]
    NoAsyncRuntime { strategy: &'static str },
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
