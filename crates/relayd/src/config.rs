//! Configuration for relayd

use clap::Parser;
use sigrelay_core::KeyPair;
use sigrelay_net::framing::ABSOLUTE_MAX_FRAME_BYTES;
use std::net::SocketAddr;
use std::time::Duration;

/// Smallest read buffer that can hold a length prefix plus one byte
const MIN_READ_BUFFER_BYTES: usize = 5;

/// relayd - SigRelay signed-packet relay daemon
#[derive(Parser, Debug, Clone)]
#[command(name = "relayd")]
#[command(author, version, about = "SigRelay signed-packet relay daemon", long_about = None)]
pub struct Config {
    /// Listen address for peer connections
    #[arg(short, long, env = "RELAYD_LISTEN", default_value = "0.0.0.0:9009")]
    pub listen: SocketAddr,

    /// Heartbeat sweep interval in seconds
    #[arg(long, default_value = "60")]
    pub heartbeat_interval_secs: u64,

    /// Write deadline for a single heartbeat probe, in milliseconds
    #[arg(long, default_value = "5000")]
    pub probe_timeout_ms: u64,

    /// Initial per-connection read buffer size
    #[arg(long, default_value = "4096")]
    pub read_buffer_bytes: usize,

    /// Maximum encoded packet size accepted on the wire
    #[arg(long, default_value = "1048576")]
    pub max_frame_bytes: usize,

    /// Close connections idle for this many seconds (0 = never)
    #[arg(long, default_value = "0")]
    pub idle_timeout_secs: u64,

    /// Grace period for open connections on shutdown (0 = exit immediately)
    #[arg(long, default_value = "0")]
    pub shutdown_grace_secs: u64,

    /// Stats logging interval in seconds
    #[arg(long, default_value = "300")]
    pub stats_interval_secs: u64,

    /// Hex-encoded 32-byte ed25519 seed; when set, acknowledgements are signed
    #[arg(long, env = "RELAYD_IDENTITY_SEED", hide_env_values = true)]
    pub identity_seed: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 9009)),
            heartbeat_interval_secs: 60,
            probe_timeout_ms: 5000,
            read_buffer_bytes: 4096,
            max_frame_bytes: 1024 * 1024,
            idle_timeout_secs: 0,
            shutdown_grace_secs: 0,
            stats_interval_secs: 300,
            identity_seed: None,
            verbose: false,
            log_format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.heartbeat_interval_secs == 0 {
            anyhow::bail!("Heartbeat interval must be at least 1 second");
        }
        if self.probe_timeout_ms == 0 {
            anyhow::bail!("Probe timeout must be non-zero");
        }
        if self.read_buffer_bytes < MIN_READ_BUFFER_BYTES {
            anyhow::bail!(
                "Read buffer must be at least {} bytes",
                MIN_READ_BUFFER_BYTES
            );
        }
        if self.max_frame_bytes == 0 || self.max_frame_bytes > ABSOLUTE_MAX_FRAME_BYTES {
            anyhow::bail!(
                "Max frame size must be between 1 and {} bytes",
                ABSOLUTE_MAX_FRAME_BYTES
            );
        }
        if self.stats_interval_secs == 0 {
            anyhow::bail!("Stats interval must be at least 1 second");
        }
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            anyhow::bail!("Unknown log format: {}", self.log_format);
        }
        self.identity()?;
        Ok(())
    }

    /// Server signing identity, if configured
    pub fn identity(&self) -> anyhow::Result<Option<KeyPair>> {
        self.identity_seed
            .as_deref()
            .map(KeyPair::from_hex_seed)
            .transpose()
            .map_err(anyhow::Error::from)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}
