//! Configuration for the courier runtime.
//!
//! Settings are layered with figment from defaults, TOML/YAML files,
//! `COURIER_*` environment variables and programmatic overrides. See
//! [`loader`] for the lookup order.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    CourierConfig, EventConfig, EventStrategyKind, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, RequestConfig, RequestStrategyKind, SourceConfig, SpanEventConfig,
};
pub use validation::validate_config;
