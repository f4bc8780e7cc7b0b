//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config`: enables TOML files (`courier.toml`, `config.toml`)
//! - `yaml-config`: enables YAML files (`courier.yaml`, `courier.yml`, ...)
//!
//! Both can be enabled at once; each format is searched independently.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Profile-specific file (`courier.{profile}.toml`)
//! 3. Main file (`courier.toml`)
//! 4. Environment variables (`COURIER_*`)
//! 5. Programmatic merges ([`ConfigLoader::merge`])
//!
//! # Environment Variable Mapping
//!
//! `__` separates nesting levels:
//!
//! - `COURIER_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `COURIER_EVENTS__STRATEGY=spawned` → `events.strategy = "spawned"`
//! - `COURIER_SOURCES__THREAD_PREFIX=feed` → `sources.thread_prefix = "feed"`
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./config/courier.toml")
//!     .load()?;
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::CourierConfig;

/// Prefix of the environment variables read by the loader.
pub const ENV_PREFIX: &str = "COURIER_";

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Reads `COURIER_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var("COURIER_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }

    fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layered configuration loader.
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::parse(&profile.into());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds the current directory to the search paths.
    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds `{user config dir}/courier` to the search paths.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_path(dir.join("courier")),
            None => self,
        }
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables environment variables (the default).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges configuration values on top of files and environment variables.
    pub fn merge(mut self, config: CourierConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and returns the configuration.
    pub fn load(self) -> ConfigResult<CourierConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: CourierConfig = figment.extract().map_err(|e| {
            ConfigError::ParseError(format!("Failed to extract configuration: {e}"))
        })?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            request_strategy = ?config.requests.strategy,
            event_strategy = ?config.events.strategy,
            "Configuration loaded"
        );

        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(CourierConfig::default()));

        if let Some(path) = self.config_file.take() {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, &path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        // Programmatic overrides win over every other source.
        Ok(figment.merge(std::mem::take(&mut self.figment)))
    }

    /// Merges one file, choosing the format from its extension.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::ParseError(format!(
                "Unsupported or disabled configuration file format: .{ext}"
            ))),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("courier"));
        }
        paths
    }

    /// Walks `search_paths × base_names`; a profile file is merged before
    /// its base file, and the first base file found ends the search.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn load_format_files<F>(
        &self,
        mut figment: Figment,
        search_paths: &[PathBuf],
        base_names: &[&str],
        merge_fn: F,
    ) -> (Figment, bool)
    where
        F: Fn(Figment, &Path) -> Figment,
    {
        for search_path in search_paths {
            for base_name in base_names {
                let Some((stem, ext)) = base_name.rsplit_once('.') else {
                    continue;
                };

                let profile_path =
                    search_path.join(format!("{stem}.{}.{ext}", self.profile.as_str()));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    figment = merge_fn(figment, &profile_path);
                }

                let base_path = search_path.join(base_name);
                if base_path.exists() {
                    info!(path = %base_path.display(), "Loading configuration file");
                    return (merge_fn(figment, &base_path), true);
                }
            }
        }
        (figment, false)
    }

    #[cfg_attr(
        not(any(feature = "toml-config", feature = "yaml-config")),
        allow(unused_mut, unused_variables)
    )]
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let search_paths = self.resolve_search_paths();
        let mut found = false;

        #[cfg(feature = "toml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["courier.toml", "config.toml"],
                |fig, path| fig.merge(Toml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        #[cfg(feature = "yaml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["courier.yaml", "courier.yml", "config.yaml", "config.yml"],
                |fig, path| fig.merge(Yaml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        if !found {
            warn!("No configuration file found, using defaults");
        }
        figment
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<CourierConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from one file plus environment variables.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<CourierConfig> {
    ConfigLoader::new().file(path).load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{EventStrategyKind, LogLevel, RequestStrategyKind};

    fn empty_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("courier-config-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_default_config() {
        let config = ConfigLoader::new()
            .search_path(empty_dir("defaults"))
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.logging.level.as_str(), "info");
        assert_eq!(config.requests.strategy, RequestStrategyKind::Inline);
        assert_eq!(config.events.strategy, EventStrategyKind::Sequential);
        assert_eq!(config.sources.thread_prefix, "courier-source");
        assert!(config.sources.autostart);
    }

    #[test]
    fn test_merge_overrides_defaults() {
        let mut overrides = CourierConfig::default();
        overrides.logging.level = LogLevel::Debug;
        overrides.events.strategy = EventStrategyKind::Spawned;

        let config = ConfigLoader::new()
            .search_path(empty_dir("merge"))
            .without_env()
            .merge(overrides)
            .load()
            .unwrap();

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.events.strategy, EventStrategyKind::Spawned);
    }

    #[test]
    fn test_merge_overrides_environment() {
        let mut overrides = CourierConfig::default();
        overrides.logging.level = LogLevel::Debug;

        // SAFETY: every other loader test runs with the environment disabled.
        unsafe {
            std::env::set_var("COURIER_LOGGING__LEVEL", "warn");
        }
        let from_env = ConfigLoader::new()
            .search_path(empty_dir("env-only"))
            .with_env()
            .load();
        let merged = ConfigLoader::new()
            .search_path(empty_dir("env-merge"))
            .with_env()
            .merge(overrides)
            .load();
        unsafe {
            std::env::remove_var("COURIER_LOGGING__LEVEL");
        }

        assert_eq!(from_env.unwrap().logging.level, LogLevel::Warn);
        assert_eq!(merged.unwrap().logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let path = empty_dir("missing").join("courier.toml");
        let err = ConfigLoader::new().file(&path).without_env().load().unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(p) if p == path));
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_profile_file_under_main_file() {
        let dir = empty_dir("profile");
        std::fs::write(
            dir.join("courier.production.toml"),
            "[requests]\nstrategy = \"detached\"\ntrace = true\n",
        )
        .unwrap();
        std::fs::write(dir.join("courier.toml"), "[requests]\ntrace = false\n").unwrap();

        let config = ConfigLoader::new()
            .profile("prod")
            .search_path(&dir)
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.requests.strategy, RequestStrategyKind::Detached);
        assert!(!config.requests.trace);
    }

    #[test]
    fn test_profile_from_env() {
        // SAFETY: the other loader tests do not depend on the ambient profile.
        unsafe {
            std::env::set_var("COURIER_PROFILE", "production");
        }
        let profile = Profile::from_env();
        assert_eq!(profile, Profile::Production);
        unsafe {
            std::env::remove_var("COURIER_PROFILE");
        }
    }

    #[test]
    fn test_custom_profile_name() {
        assert_eq!(Profile::parse("Staging"), Profile::Custom("staging".to_string()));
        assert_eq!(Profile::parse("dev").to_string(), "development");
    }
}
