use crate::{
    monitoring::{LifecycleManager, MonitoringKind},
    policy::target::TargetPolicy,
    services::{ContentReader, RelayService, DEFAULT_MAX_BODY_SIZE, DEFAULT_RELAY_TIMEOUT},
};
use anyhow::{Context, Result};
use std::{
    future::Future,
    net::{SocketAddr, TcpListener},
    path::PathBuf,
    pin::Pin,
    sync::Arc,
    time::Duration,
};

pub mod api;
pub mod monitoring;
pub mod policy;
pub mod services;

const DEFAULT_BIND_ADDRESS: ([u8; 4], u16) = ([127, 0, 0, 1], 8090);

/// The server configuration.
pub struct Config {
    addr: Option<SocketAddr>,
    relay_timeout: Option<Duration>,
    max_body_size: Option<u64>,
    content_dir: Option<PathBuf>,
    target_policy: Option<Arc<dyn TargetPolicy>>,
    monitoring_enabled: Option<Vec<MonitoringKind>>,
    shutdown_grace_period: Option<Duration>,
    shutdown: Option<Pin<Box<dyn Future<Output = ()> + Send>>>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("addr", &self.addr)
            .field("relay_timeout", &self.relay_timeout)
            .field("max_body_size", &self.max_body_size)
            .field("content_dir", &self.content_dir)
            .field(
                "target_policy",
                &self.target_policy.as_ref().map(|_| "dyn TargetPolicy"),
            )
            .field("monitoring_enabled", &self.monitoring_enabled)
            .field("shutdown_grace_period", &self.shutdown_grace_period)
            .field("shutdown", &self.shutdown.as_ref().map(|_| "dyn Future"))
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Creates a new server configuration.
    pub fn new() -> Self {
        Self {
            addr: None,
            relay_timeout: None,
            max_body_size: None,
            content_dir: None,
            target_policy: None,
            monitoring_enabled: None,
            shutdown_grace_period: None,
            shutdown: None,
        }
    }

    /// Specify the address for the server to listen on.
    pub fn with_addr(mut self, addr: impl Into<SocketAddr>) -> Self {
        self.addr = Some(addr.into());
        self
    }

    /// Specify the time allowed for a single relayed request.
    ///
    /// Defaults to 30 seconds.
    pub fn with_relay_timeout(mut self, timeout: Duration) -> Self {
        self.relay_timeout = Some(timeout);
        self
    }

    /// Specify the maximum size, in bytes, of a target's response body.
    ///
    /// Defaults to 10 MiB.
    pub fn with_max_body_size(mut self, max_body_size: u64) -> Self {
        self.max_body_size = Some(max_body_size);
        self
    }

    /// Specify the directory lesson content is read from.
    ///
    /// This enables the content API in the server.
    pub fn with_content_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.content_dir = Some(path.into());
        self
    }

    /// Specify the policy relay targets are checked against.
    ///
    /// If this is not specified, the relay forwards to any host it can reach.
    pub fn with_target_policy(mut self, policy: impl TargetPolicy + 'static) -> Self {
        self.target_policy = Some(Arc::new(policy));
        self
    }

    /// Specify the monitoring endpoints to serve.
    pub fn with_monitoring_enabled(mut self, monitoring_enabled: Vec<MonitoringKind>) -> Self {
        self.monitoring_enabled = Some(monitoring_enabled);
        self
    }

    /// Specify how long to keep serving after shutdown starts.
    pub fn with_shutdown_grace_period(mut self, period: impl Into<Option<Duration>>) -> Self {
        self.shutdown_grace_period = period.into();
        self
    }

    /// Specifies the future to wait on to shutdown the server.
    ///
    /// If the future completes, the server will initiate a graceful shutdown.
    pub fn with_shutdown(mut self, shutdown: impl Future<Output = ()> + Send + 'static) -> Self {
        self.shutdown = Some(Box::pin(shutdown));
        self
    }
}

/// Represents the API Lab relay server.
pub struct Server {
    config: Config,
    lifecycle: Arc<LifecycleManager>,
    listener: Option<TcpListener>,
}

impl Server {
    /// Creates a new server with the given configuration.
    pub fn new(config: Config) -> Self {
        let lifecycle = Arc::new(LifecycleManager::new(config.shutdown_grace_period));
        Self {
            config,
            lifecycle,
            listener: None,
        }
    }

    /// Binds the server to the configured address.
    ///
    /// Returns the address the server bound to.
    pub fn bind(&mut self) -> Result<SocketAddr> {
        let addr = self
            .config
            .addr
            .unwrap_or_else(|| SocketAddr::from(DEFAULT_BIND_ADDRESS));

        tracing::debug!("binding server to address `{addr}`");
        let listener = TcpListener::bind(addr)
            .with_context(|| format!("failed to bind to address `{addr}`"))?;
        listener
            .set_nonblocking(true)
            .context("failed to configure the server socket")?;

        let addr = listener
            .local_addr()
            .context("failed to get the local address of the server")?;
        self.listener = Some(listener);
        Ok(addr)
    }

    /// Runs the server until its shutdown future completes.
    ///
    /// The server is bound first if [`Server::bind`] was not called.
    pub async fn run(mut self) -> Result<()> {
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => {
                self.bind()?;
                self.listener
                    .take()
                    .context("server listener was not bound")?
            }
        };
        let listener = tokio::net::TcpListener::from_std(listener)
            .context("failed to register the server socket")?;
        let addr = listener.local_addr()?;

        tracing::debug!(
            "using server configuration: {config:?}",
            config = self.config
        );

        if self.config.target_policy.is_none() {
            tracing::warn!(
                "no target policy configured: the relay will forward requests to any host this process can reach"
            );
        }

        let relay = RelayService::new(
            self.config.relay_timeout.unwrap_or(DEFAULT_RELAY_TIMEOUT),
            self.config.max_body_size.unwrap_or(DEFAULT_MAX_BODY_SIZE),
            self.config.target_policy.take(),
        )
        .context("failed to create the relay HTTP client")?;

        let content = self.config.content_dir.take().map(|dir| {
            if !dir.is_dir() {
                tracing::warn!(
                    "content directory `{dir}` does not exist",
                    dir = dir.display()
                );
            }
            ContentReader::new(dir)
        });

        let mut router = api::create_router(relay, content);

        let health_checks_enabled = self
            .config
            .monitoring_enabled
            .as_ref()
            .map(|kinds| kinds.contains(&MonitoringKind::HealthChecks))
            .unwrap_or(false);
        if health_checks_enabled {
            router = router.merge(self.lifecycle.health_checks_router());
        }

        self.lifecycle.set_live().await;

        // Set shutdown sequence whether or not it will be graceful.
        if let Some(shutdown) = self.config.shutdown.take() {
            tracing::debug!("server is running with a shutdown signal");
            let lifecycle = self.lifecycle.clone();
            tokio::spawn(async move {
                shutdown.await;
                if let Err(e) = lifecycle.shutdown().await {
                    tracing::error!("failed to shut down the server: {e:#}");
                }
            });
        } else {
            tracing::debug!("server is running without a shutdown signal");
        }

        self.lifecycle.set_ready().await;

        tracing::info!("server listening on {addr}");
        let lifecycle = self.lifecycle.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { lifecycle.drain_signal().await })
            .await
            .context("failed to serve the API")?;

        tracing::info!("server shut down");
        Ok(())
    }
}
