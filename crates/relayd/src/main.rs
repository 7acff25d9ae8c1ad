//! relayd - SigRelay signed-packet relay daemon
//!
//! Accepts peer connections, authenticates every packet, and acknowledges
//! the ones that verify.

use clap::Parser;
use relayd::config::Config;
use relayd::server::Server;
use std::future::Future;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse configuration
    let config = Config::parse();

    init_logging(&config);

    info!(
        "relayd v{} - SigRelay Signed-Packet Relay",
        env!("CARGO_PKG_VERSION")
    );

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start server: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Install signal handlers
    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(wait_for_signal(), shutdown.clone()));

    if let Err(e) = server.run(shutdown).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("relayd stopped");
    ExitCode::SUCCESS
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if config.verbose {
            EnvFilter::new("relayd=debug,sigrelay_net=debug")
        } else {
            EnvFilter::new("relayd=info")
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Resolves on SIGINT or SIGTERM; errors if no signal can be watched
async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => result,
                    _ = terminate.recv() => Ok(()),
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                tokio::signal::ctrl_c().await
            }
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await
}

/// Cancel `shutdown` once `signal` fires. A failed listener leaves the
/// server running.
async fn cancel_on_signal<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Received shutdown signal");
            shutdown.cancel();
        }
        Err(e) => error!("Signal handling disabled: {}", e),
    }
}
