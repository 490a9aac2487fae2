use sitegate::config::{Config, ServerMode};
use sitegate::server::{AppContext, SiteServer, PKG_NAME, VERSION};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// How long to wait for in-flight responses after the shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sitegate=debug".parse().expect("valid log directive")),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sitegate.toml"));

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path.display(), error = %e, "Failed to load configuration");
        e
    })?;

    print_startup_banner(&config);

    let bind_addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .map_err(|e| {
            error!(bind = %config.server.bind, port = config.server.port, error = %e, "Invalid bind address");
            anyhow::anyhow!("Invalid bind address: {}", e)
        })?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let context = Arc::new(AppContext::new(config));
    let server = SiteServer::new(bind_addr, context, shutdown_rx);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!(error = %e, "Site server error");
        }
    });

    // Wait for the first interrupt or termination signal
    wait_for_shutdown_signal().await;

    // Signal shutdown; sending again later is a no-op, so repeat signals are
    // absorbed harmlessly below
    let _ = shutdown_tx.send(true);

    // Let in-flight responses finish, bounded by the grace period. Repeat
    // signals during the drain are logged and ignored.
    let drain = tokio::time::timeout(SHUTDOWN_GRACE, async move {
        let _ = server_handle.await;
    });
    tokio::pin!(drain);

    loop {
        tokio::select! {
            _ = &mut drain => break,
            _ = wait_for_shutdown_signal() => {
                info!("Shutdown already in progress");
            }
        }
    }

    info!("Shutdown complete");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down...");
    }
}

fn print_startup_banner(config: &Config) {
    info!(name = PKG_NAME, version = VERSION, "Starting site server");
    info!(
        bind = %config.server.bind,
        port = config.server.port,
        mode = config.server.mode.as_str(),
        slot = %config.server.slot,
        "Server configuration"
    );
    info!(
        host = %config.upstream.host,
        port = config.upstream.port,
        slug = %config.upstream.slug,
        timeout_secs = config.upstream.timeout_secs,
        "Upstream monitoring service"
    );
    match config.server.mode {
        ServerMode::Static => {
            info!(
                static_root = %config.site.static_root.display(),
                "Serving static bundle"
            );
        }
        ServerMode::Dev => {
            info!(
                dev_server_port = config.server.dev_server_port,
                "Forwarding to development server"
            );
        }
    }
    info!(
        status_file = %config.site.status_file.display(),
        "Game status file"
    );
}
