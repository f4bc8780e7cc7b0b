//! Process host for a [`Mediator`].
//!
//! [`CourierRuntime`] loads configuration, installs logging, builds the
//! mediator with the configured strategies and keeps it alive until the
//! process is asked to stop.
//!
//! ```rust,ignore
//! use courier_runtime::CourierRuntime;
//!
//! let runtime = CourierRuntime::builder()
//!     .config_file("config/courier.toml")
//!     .instance_provider(InstanceRegistry::new().with_singleton(Inventory::default()))
//!     .requests(|r| r.handler(create_order))
//!     .events(|e| e.handler(reserve_stock).source(OrderFeed::new()))
//!     .build()?;
//!
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};

use courier_core::InstanceProvider;
use courier_framework::mediator::{EventSetup, MediatorBuilder, RequestSetup};
use courier_framework::strategy::{
    DetachedRequestStrategy, EventInvocationStrategy, InlineRequestStrategy,
    RequestInvocationStrategy, SequentialEventStrategy, SpawnedEventStrategy, Traced,
};
use courier_framework::{Mediator, Publisher};

use crate::config::{
    ConfigLoader, CourierConfig, EventConfig, EventStrategyKind, RequestConfig,
    RequestStrategyKind, validate_config,
};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// A configured mediator plus its lifecycle.
pub struct CourierRuntime {
    config: CourierConfig,
    mediator: Mediator,
}

impl CourierRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Returns the configuration the runtime was built from.
    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    pub fn mediator(&self) -> &Mediator {
        &self.mediator
    }

    pub fn publisher(&self) -> Publisher {
        self.mediator.publisher()
    }

    /// Runs until Ctrl+C or SIGTERM, then stops.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Courier runtime is now running. Press Ctrl+C to stop.");
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs until `shutdown` completes, then stops.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.mediator.start_sources();
        info!(
            running_sources = self.mediator.event_sources().running_count(),
            "Runtime started"
        );

        shutdown.await;

        self.stop();
        Ok(())
    }

    /// Signals event sources to stop.
    pub fn stop(&self) {
        self.mediator.shutdown();
        info!("Runtime stopped");
    }
}

/// Waits for Ctrl+C or, on Unix, SIGTERM.
///
/// Returns right away if no signal handler can be installed.
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to register SIGTERM handler");
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`CourierRuntime`].
///
/// Strategies set in code win over the configured ones.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    mediator: MediatorBuilder,
    init_logging: bool,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            mediator: MediatorBuilder::new(),
            init_logging: true,
        }
    }

    /// Loads exactly this configuration file.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g. "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges configuration values on top of files and environment variables.
    pub fn merge(mut self, config: CourierConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Leaves subscriber installation to the caller.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    pub fn instance_provider<P: InstanceProvider>(mut self, provider: P) -> Self {
        self.mediator = self.mediator.instance_provider(provider);
        self
    }

    pub fn shared_instance_provider(mut self, provider: Arc<dyn InstanceProvider>) -> Self {
        self.mediator = self.mediator.shared_instance_provider(provider);
        self
    }

    /// See [`MediatorBuilder::requests`].
    pub fn requests(mut self, configure: impl FnOnce(RequestSetup) -> RequestSetup) -> Self {
        self.mediator = self.mediator.requests(configure);
        self
    }

    /// See [`MediatorBuilder::events`].
    pub fn events(mut self, configure: impl FnOnce(EventSetup) -> EventSetup) -> Self {
        self.mediator = self.mediator.events(configure);
        self
    }

    /// Loads configuration, installs logging and builds the mediator.
    ///
    /// The `detached` and `spawned` strategies capture the current tokio
    /// runtime, so with those configured this must run inside one.
    pub fn build(self) -> RuntimeResult<CourierRuntime> {
        let config = self.config_loader.load()?;
        validate_config(&config)?;

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let request_strategy = request_strategy(&config.requests)?;
        let event_strategy = event_strategy(&config.events)?;

        let mediator = self
            .mediator
            .requests(move |r| {
                if r.has_strategy() {
                    r
                } else {
                    r.strategy(request_strategy)
                }
            })
            .events(move |e| {
                if e.has_strategy() {
                    e
                } else {
                    e.strategy(event_strategy)
                }
            })
            .source_thread_prefix(config.sources.thread_prefix.clone())
            .autostart_sources(config.sources.autostart)
            .build()?;

        info!(
            log_level = %config.logging.level,
            request_strategy = ?config.requests.strategy,
            event_strategy = ?config.events.strategy,
            "Runtime initialized from configuration"
        );

        Ok(CourierRuntime { config, mediator })
    }
}

fn request_strategy(config: &RequestConfig) -> RuntimeResult<Arc<dyn RequestInvocationStrategy>> {
    let strategy: Arc<dyn RequestInvocationStrategy> = match config.strategy {
        RequestStrategyKind::Inline => Arc::new(InlineRequestStrategy),
        RequestStrategyKind::Detached => Arc::new(
            DetachedRequestStrategy::try_current()
                .ok_or(RuntimeError::NoAsyncRuntime { strategy: "detached" })?,
        ),
    };
    Ok(if config.trace {
        Arc::new(Traced::new(strategy))
    } else {
        strategy
    })
}

fn event_strategy(config: &EventConfig) -> RuntimeResult<Arc<dyn EventInvocationStrategy>> {
    let strategy: Arc<dyn EventInvocationStrategy> = match config.strategy {
        EventStrategyKind::Sequential => Arc::new(SequentialEventStrategy),
        EventStrategyKind::Spawned => Arc::new(
            SpawnedEventStrategy::try_current()
                .ok_or(RuntimeError::NoAsyncRuntime { strategy: "spawned" })?,
        ),
    };
    Ok(if config.trace {
        Arc::new(Traced::new(strategy))
    } else {
        strategy
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use courier_core::{BoxError, InstanceRegistry, Request};

    use super::*;

    #[derive(Clone)]
    struct Reserve(u32);

    impl Request<u32> for Reserve {}

    #[derive(Clone)]
    struct StockLow;

    fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
            .search_path("/nonexistent/courier-runtime-tests")
            .without_env()
            .without_logging()
            .instance_provider(InstanceRegistry::new())
    }

    #[tokio::test]
    async fn test_build_with_defaults_and_send() {
        let runtime = builder()
            .requests(|r| r.handler(|q: Reserve| async move { Ok::<_, BoxError>(q.0 + 1) }))
            .build()
            .unwrap();

        assert_eq!(
            runtime.config().requests.strategy,
            RequestStrategyKind::Inline
        );
        let left = runtime.mediator().send::<_, u32>(Reserve(4)).await.unwrap();
        assert_eq!(left, Some(5));
    }

    #[tokio::test]
    async fn test_run_until_shuts_mediator_down() {
        let runtime = builder().build().unwrap();
        runtime.run_until(async {}).await.unwrap();
        assert!(runtime.mediator().is_shutdown());
        assert!(runtime.publisher().is_shutdown());
    }

    #[tokio::test]
    async fn test_configured_spawned_strategy() {
        let mut config = CourierConfig::default();
        config.events.strategy = EventStrategyKind::Spawned;
        config.events.trace = true;

        let runtime = builder()
            .merge(config)
            .events(|e| {
                e.handler(|_e: StockLow| async { Err::<(), _>(BoxError::from("no supplier")) })
            })
            .build()
            .unwrap();

        // Spawned handlers report failures to the error callback, not to publish.
        assert!(runtime.publisher().publish(StockLow).await.is_ok());
    }

    #[tokio::test]
    async fn test_code_strategy_wins_over_config() {
        let mut config = CourierConfig::default();
        config.events.strategy = EventStrategyKind::Spawned;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let runtime = builder()
            .merge(config)
            .events(move |e| {
                e.handler(move |_e: StockLow| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(BoxError::from("no supplier"))
                    }
                })
                .strategy(SequentialEventStrategy)
            })
            .build()
            .unwrap();

        assert!(runtime.publisher().publish(StockLow).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_detached_needs_tokio_runtime() {
        let mut config = CourierConfig::default();
        config.requests.strategy = RequestStrategyKind::Detached;

        let err = builder().merge(config).build().err().unwrap();
        assert!(matches!(
            err,
            RuntimeError::NoAsyncRuntime { strategy: "detached" }
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = CourierConfig::default();
        config.sources.thread_prefix = String::new();

        let err = builder().merge(config).build().err().unwrap();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[test]
    fn test_missing_provider_surfaces_configuration_error() {
        let err = RuntimeBuilder::new()
            .search_path("/nonexistent/courier-runtime-tests")
            .without_env()
            .without_logging()
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RuntimeError::Configuration(_)));
    }
}
