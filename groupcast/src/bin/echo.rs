//! A tiny demo: joins a multicast group, prints every datagram it receives,
//! and optionally sends one datagram on start. Exercises the full
//! `CastClient` lifecycle end to end against a real socket, in the spirit
//! of `relay/src/main.rs`'s single-binary transport loop.

#![allow(clippy::print_stdout, reason = "We are a CLI demo.")]

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use groupcast::{CastClient, CastListener, CastMode, Config, HandleResult, Operation};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "groupcast-echo", about = "Join a group-cast address and echo datagrams")]
struct Args {
    /// Remote multicast group or broadcast address (empty substitutes 255.255.255.255 in broadcast mode).
    #[arg(long, default_value = "239.0.0.1")]
    remote: String,

    /// UDP port to bind and join on.
    #[arg(long, default_value_t = 9000)]
    port: u16,

    /// Local address to bind to.
    #[arg(long, default_value = "0.0.0.0:0")]
    bind: SocketAddr,

    /// Use broadcast instead of multicast.
    #[arg(long)]
    broadcast: bool,

    /// Multicast TTL.
    #[arg(long, default_value_t = 1)]
    ttl: u8,

    /// Payload to send once, immediately after connecting.
    #[arg(long)]
    send: Option<String>,
}

struct EchoListener;

impl CastListener for EchoListener {
    fn on_connect(&self, connection_id: u64) -> HandleResult {
        tracing::info!(connection_id, "connected");
        HandleResult::Ok
    }

    fn on_send(&self, connection_id: u64, data: &[u8]) -> HandleResult {
        println!("[{connection_id}] sent {} bytes", data.len());
        HandleResult::Ok
    }

    fn on_receive(&self, connection_id: u64, data: &[u8]) -> HandleResult {
        println!("[{connection_id}] recv: {}", String::from_utf8_lossy(data));
        HandleResult::Ok
    }

    fn on_close(&self, connection_id: u64, operation: Operation, code: i32) -> HandleResult {
        tracing::info!(connection_id, ?operation, code, "closed");
        HandleResult::Ok
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::new();
    config.set_multicast_ttl(true, args.ttl)?;
    config.set_cast_mode(
        true,
        if args.broadcast { CastMode::Broadcast } else { CastMode::Multicast },
    )?;

    let mut client = CastClient::new(config, Arc::new(EchoListener));

    let remote = if args.broadcast { String::new() } else { args.remote.clone() };
    let source: Option<IpAddr> = None;
    if !client.start(&remote, args.port, Some(args.bind), source) {
        let (kind, code) = client.get_last_error();
        anyhow::bail!("failed to start: {kind:?} (code {code})");
    }

    if let Some(payload) = &args.send {
        if !client.send(payload.as_bytes()) {
            let (kind, code) = client.get_last_error();
            tracing::warn!(?kind, code, "send failed");
        }
    }

    println!("listening on {:?}, press Ctrl-C to stop (auto-stops after 30s)", client.get_local_address());
    client.wait(Some(Duration::from_secs(30)));

    client.stop();
    Ok(())
}
