//! relayctl - send one packet to a SigRelay relay and print the reply

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use sigrelay_core::{verify, KeyPair, Packet};
use sigrelay_net::RelayClient;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

/// relayctl - SigRelay client
#[derive(Parser, Debug)]
#[command(name = "relayctl")]
#[command(author, version, about = "Send a packet to a SigRelay relay", long_about = None)]
struct Args {
    /// Relay address
    #[arg(short, long, env = "RELAYCTL_RELAY", default_value = "127.0.0.1:9009")]
    relay: String,

    /// Hex-encoded 32-byte signing seed (random when omitted)
    #[arg(long, env = "RELAYCTL_SEED", hide_env_values = true)]
    seed: Option<String>,

    /// Correlation id (random when omitted)
    #[arg(long)]
    id: Option<String>,

    #[arg(long, default_value = "relayctl")]
    src: String,

    #[arg(long, default_value = "server")]
    dst: String,

    #[arg(short, long, default_value = "")]
    body: String,

    #[arg(long, default_value = "0")]
    fee: u64,

    #[arg(long, default_value = "0")]
    ttl: u64,

    /// Send without a signature; the relay will drop it
    #[arg(long)]
    unsigned: bool,

    /// Seconds to wait for the acknowledgement
    #[arg(long, default_value = "5")]
    timeout_secs: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn build_packet(&self) -> anyhow::Result<Packet> {
        let id = match &self.id {
            Some(id) => id.clone(),
            None => hex::encode(rand::random::<[u8; 8]>()),
        };
        let mut packet = Packet::data(id, self.src.as_str(), self.dst.as_str(), self.body.as_str());
        packet.fee = self.fee;
        packet.ttl = self.ttl;

        if self.unsigned {
            return Ok(packet);
        }

        let keypair = match &self.seed {
            Some(seed) => KeyPair::from_hex_seed(seed).context("invalid --seed")?,
            None => KeyPair::generate(),
        };
        debug!("Signing as {}", hex::encode(keypair.public_key()));
        Ok(keypair.sign_packet(&packet))
    }
}

/// Printable form of a reply
#[derive(Debug, Serialize)]
struct Reply {
    #[serde(rename = "type")]
    kind: u32,
    id: String,
    src: String,
    dst: String,
    body: String,
    signed: bool,
    verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pk: Option<String>,
}

impl From<&Packet> for Reply {
    fn from(packet: &Packet) -> Self {
        let signed = packet.is_signed();
        Self {
            kind: packet.kind,
            id: packet.id.clone(),
            src: packet.src.clone(),
            dst: packet.dst.clone(),
            body: packet.body_lossy().into_owned(),
            signed,
            verified: signed && verify(packet),
            pk: (!packet.pk.is_empty()).then(|| hex::encode(&packet.pk)),
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let packet = args.build_packet()?;
    let timeout = Duration::from_secs(args.timeout_secs);

    let mut client = RelayClient::connect(args.relay.as_str())
        .await
        .with_context(|| format!("failed to connect to {}", args.relay))?;
    info!("Connected to {}", client.peer_addr());

    let reply = client
        .request(&packet, timeout)
        .await
        .with_context(|| format!("no acknowledgement for packet {}", packet.id))?;

    println!("{}", serde_json::to_string_pretty(&Reply::from(&reply))?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
