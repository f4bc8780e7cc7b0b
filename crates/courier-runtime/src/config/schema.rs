//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Request dispatch settings.
    #[serde(default)]
    pub requests: RequestConfig,

    /// Event publication settings.
    #[serde(default)]
    pub events: EventConfig,

    /// Event source settings.
    #[serde(default)]
    pub sources: SourceConfig,
}

// =============================================================================
// Dispatch
// =============================================================================

/// How requests are executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStrategyKind {
    /// On the caller's task; failures return from `send`.
    #[default]
    Inline,
    /// Spawned onto the runtime; `send` returns `None` immediately.
    Detached,
}

/// How event handlers are executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStrategyKind {
    /// One after another on the caller's task, stopping at the first failure.
    #[default]
    Sequential,
    /// One task per handler; failures are logged.
    Spawned,
}

/// Request dispatch settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestConfig {
    #[serde(default)]
    pub strategy: RequestStrategyKind,

    /// Wrap the strategy with a span and a completion event per request.
    #[serde(default)]
    pub trace: bool,
}

/// Event publication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventConfig {
    #[serde(default)]
    pub strategy: EventStrategyKind,

    /// Wrap the strategy with a span and a completion event per publish.
    #[serde(default)]
    pub trace: bool,
}

/// Event source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Prefix of worker thread names.
    #[serde(default = "default_thread_prefix")]
    pub thread_prefix: String,

    /// Start sources as soon as the mediator is built.
    #[serde(default = "default_autostart")]
    pub autostart: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            thread_prefix: default_thread_prefix(),
            autostart: default_autostart(),
        }
    }
}

fn default_thread_prefix() -> String {
    courier_framework::source::DEFAULT_THREAD_PREFIX.to_string()
}

fn default_autostart() -> bool {
    true
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Output destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// When the log file is rotated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Minutely,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids. Useful with event sources, which run on named threads.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include thread names.
    #[serde(default)]
    pub thread_names: bool,

    /// Include file and line of the call site.
    #[serde(default)]
    pub file_location: bool,

    /// Log file, required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Rotated files to keep.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Per-target levels, e.g. `courier_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            thread_names: false,
            file_location: false,
            file_path: None,
            rotation: LogRotation::default(),
            max_files: default_max_files(),
            filters: HashMap::new(),
        }
    }
}

fn default_max_files() -> usize {
    5
}
