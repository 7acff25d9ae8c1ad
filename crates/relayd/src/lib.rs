//! relayd - SigRelay signed-packet relay daemon
//!
//! This daemon provides:
//! - A TCP listener with one handler task per peer connection
//! - ed25519 authentication of every inbound packet
//! - Acknowledgement replies for verified packets
//! - A connection registry swept by a heartbeat monitor

pub mod config;
pub mod handler;
pub mod heartbeat;
pub mod registry;
pub mod relay;
pub mod server;

pub use config::Config;
pub use heartbeat::HeartbeatMonitor;
pub use registry::{ConnectionHandle, Registry};
pub use relay::Relay;
pub use server::{Server, ServerError, ServerStats};
