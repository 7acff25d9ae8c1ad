//! relayd server - listener, accept loop, and background tasks

use crate::config::Config;
use crate::handler::{handle_connection, HandlerSettings};
use crate::heartbeat::HeartbeatMonitor;
use crate::registry::{ConnectionHandle, Registry};
use crate::relay::{Relay, RelayStats};
use sigrelay_net::FrameCodec;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Server state
pub struct Server {
    config: Config,
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<Registry>,
    relay: Arc<Relay>,
}

impl Server {
    /// Bind the listener. Failure here is fatal to the process.
    pub async fn bind(config: Config) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        let identity = config
            .identity()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| ServerError::BindFailed {
                addr: config.listen,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        if let Some(identity) = &identity {
            info!("Signing acknowledgements as {}", hex::encode(identity.public_key()));
        }

        Ok(Self {
            config,
            listener,
            local_addr,
            registry: Arc::new(Registry::new()),
            relay: Arc::new(Relay::new(identity)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn relay(&self) -> Arc<Relay> {
        self.relay.clone()
    }

    /// Get server statistics
    pub fn stats(&self) -> ServerStats {
        ServerStats::collect(&self.registry, &self.relay)
    }

    /// Run the accept loop until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        info!("Listening on {}", self.local_addr);

        let heartbeat = HeartbeatMonitor::new(
            self.registry.clone(),
            self.config.heartbeat_interval(),
            self.config.probe_timeout(),
        );
        let heartbeat_handle = tokio::spawn(heartbeat.run(shutdown.child_token()));
        let stats_handle = self.spawn_stats_task(shutdown.child_token());

        let settings = HandlerSettings {
            read_buffer_bytes: self.config.read_buffer_bytes,
            max_frame_bytes: self.config.max_frame_bytes,
            idle_timeout: self.config.idle_timeout(),
        };
        // Handlers outlive the accept loop by up to the shutdown grace period
        let connections = CancellationToken::new();
        let mut handlers = JoinSet::new();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!("Accepted connection from {}", addr);
                            self.spawn_handler(stream, addr, &settings, &connections, &mut handlers);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                Some(_) = handlers.join_next(), if !handlers.is_empty() => {}
                _ = shutdown.cancelled() => {
                    info!("Shutting down...");
                    break;
                }
            }
        }

        self.drain(handlers, connections).await;
        heartbeat_handle.abort();
        stats_handle.abort();

        Ok(())
    }

    fn spawn_handler(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        settings: &HandlerSettings,
        connections: &CancellationToken,
        handlers: &mut JoinSet<()>,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }
        let (read_half, write_half) = stream.into_split();
        let handle = ConnectionHandle::new(
            self.registry.next_id(),
            addr,
            Box::new(write_half),
            FrameCodec::with_max_frame_bytes(settings.max_frame_bytes),
        );

        let registry = self.registry.clone();
        let relay = self.relay.clone();
        let settings = settings.clone();
        let shutdown = connections.child_token();
        handlers.spawn(async move {
            handle_connection(read_half, handle, registry, relay, settings, shutdown).await;
        });
    }

    /// Give handlers up to the grace period, then drop whatever is left
    async fn drain(&self, mut handlers: JoinSet<()>, connections: CancellationToken) {
        let grace = self.config.shutdown_grace();
        if !grace.is_zero() && !handlers.is_empty() {
            info!(
                "Waiting up to {:?} for {} connections",
                grace,
                handlers.len()
            );
            let _ = tokio::time::timeout(grace, async {
                while handlers.join_next().await.is_some() {}
            })
            .await;
        }

        connections.cancel();
        let closed = self.registry.close_all();
        if closed > 0 {
            info!("Dropping {} open connections", closed);
        }
        handlers.abort_all();
    }

    /// Spawn periodic stats logging
    fn spawn_stats_task(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let registry = self.registry.clone();
        let relay = self.relay.clone();
        let period = self.config.stats_interval();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let stats = ServerStats::collect(&registry, &relay);
                        info!(
                            "Stats: {} connections ({} accepted, {} evicted), {} dispatched, {} rejected, {} undecodable",
                            stats.connections,
                            stats.accepted,
                            stats.evicted,
                            stats.relay.packets_dispatched,
                            stats.relay.rejected_total(),
                            stats.relay.decode_errors
                        );
                    }
                    _ = shutdown.cancelled() => {
                        break;
                    }
                }
            }
        })
    }
}

/// Server statistics
#[derive(Debug, Clone)]
pub struct ServerStats {
    pub connections: usize,
    pub accepted: u64,
    pub evicted: u64,
    pub relay: RelayStats,
}

impl ServerStats {
    fn collect(registry: &Registry, relay: &Relay) -> Self {
        Self {
            connections: registry.len(),
            accepted: registry.registered_total(),
            evicted: registry.evicted_total(),
            relay: relay.stats(),
        }
    }
}
