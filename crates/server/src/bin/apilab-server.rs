use anyhow::{bail, Result};
use apilab_server::{
    monitoring::MonitoringKind,
    policy::target::{AllowedHostsPolicy, PublicNetworkPolicy, TargetPolicyCollection},
    Config, Server,
};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use tokio::signal;
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Use verbose output
    #[arg(short, long, env = "APILAB_VERBOSE", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Address to listen to
    #[arg(short, long, env = "APILAB_LISTEN", default_value = "127.0.0.1:8090")]
    listen: SocketAddr,

    /// The directory lesson content is served from; the content API is
    /// disabled when not set.
    #[arg(long, env = "APILAB_CONTENT_DIR")]
    content_dir: Option<PathBuf>,

    /// The time, in seconds, allowed for a single relayed request.
    #[arg(long, env = "APILAB_RELAY_TIMEOUT", default_value_t = 30)]
    relay_timeout: u64,

    /// The maximum size, in bytes, of a relayed response body.
    #[arg(long, env = "APILAB_MAX_BODY_SIZE", default_value_t = 10 * 1024 * 1024)]
    max_body_size: u64,

    /// Only relay to these hosts (comma separated).
    ///
    /// Without this option the relay forwards to any host it can reach.
    #[arg(long, env = "APILAB_ALLOWED_HOSTS", value_delimiter = ',')]
    allowed_hosts: Vec<String>,

    /// Reject relay targets on loopback, private and link-local addresses.
    #[arg(long, env = "APILAB_PUBLIC_NETWORK_ONLY")]
    public_network_only: bool,

    /// The monitoring endpoints to serve.
    #[arg(long, env = "APILAB_MONITORING", value_delimiter = ',')]
    monitoring: Vec<MonitoringKind>,

    /// The time, in seconds, to keep serving after a shutdown signal.
    #[arg(long, env = "APILAB_SHUTDOWN_GRACE_PERIOD")]
    shutdown_grace_period: Option<u64>,
}

impl Args {
    fn init_tracing(&self) {
        let level_filter = match self.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        };
        tracing_subscriber::fmt()
            .with_max_level(level_filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    args.init_tracing();
    tracing::debug!("args: {args:?}");

    if args.relay_timeout == 0 {
        bail!("the relay timeout must be at least one second");
    }

    let mut config = Config::new()
        .with_addr(args.listen)
        .with_relay_timeout(Duration::from_secs(args.relay_timeout))
        .with_max_body_size(args.max_body_size)
        .with_monitoring_enabled(args.monitoring)
        .with_shutdown_grace_period(args.shutdown_grace_period.map(Duration::from_secs))
        .with_shutdown(shutdown_signal());

    if let Some(path) = args.content_dir {
        config = config.with_content_dir(path);
    }

    let mut policies = TargetPolicyCollection::new();
    if !args.allowed_hosts.is_empty() {
        tracing::info!(
            "relaying only to hosts: {hosts}",
            hosts = args.allowed_hosts.join(", ")
        );
        policies.push(args.allowed_hosts.iter().collect::<AllowedHostsPolicy>());
    }
    if args.public_network_only {
        tracing::info!("relaying only to public network addresses");
        policies.push(PublicNetworkPolicy);
    }
    if !policies.is_empty() {
        config = config.with_target_policy(policies);
    }

    Server::new(config).run().await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");

        tracing::info!("starting shutdown (SIGINT)");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;

        tracing::info!("starting shutdown (SIGTERM)");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
