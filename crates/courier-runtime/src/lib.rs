//! Courier Runtime - process host for the courier mediator.
//!
//! This crate provides:
//! - Layered configuration (`CourierConfig`, `ConfigLoader`) via figment
//! - Logging setup (`LoggingBuilder`) via tracing-subscriber
//! - `CourierRuntime`, which builds the mediator from configuration and
//!   keeps it running until Ctrl+C/SIGTERM
//!
//! ```rust,ignore
//! use courier_runtime::CourierRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = CourierRuntime::builder()
//!         .instance_provider(InstanceRegistry::new())
//!         .requests(|r| r.handler(create_order))
//!         .build()?;
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, CourierConfig, LoggingConfig, load_config,
    load_config_from_file,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{CourierRuntime, RuntimeBuilder, wait_for_shutdown};

pub use tracing;
pub use tracing_subscriber;

/// Logging macros for applications built on the runtime.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
