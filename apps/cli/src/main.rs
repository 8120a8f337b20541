//! udptun CLI
//!
//! `udptun client` runs the tunnel client against a relay server;
//! `udptun serve` runs the relay itself.

use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use udptun_client::TunnelClient;
use udptun_core::ClientConfig;
use udptun_relay::RelayConfig;

/// udptun - UDP over authenticated TCP tunneling
#[derive(Parser)]
#[command(name = "udptun")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tunnel client
    Client {
        /// Tunnel config: <serverHost>:<udpPortSpec>@<token>[:<localPort>]
        #[arg(short, long)]
        config: String,

        /// Destination UDP address, e.g. 8.8.8.8:53
        #[arg(short, long)]
        dst: String,

        /// Relay server TCP port
        #[arg(long, default_value = "9000")]
        server_port: u16,

        /// Idle seconds before a keepalive frame is sent
        #[arg(long, default_value = "15")]
        keepalive: u64,

        /// Seconds between reconnect attempts
        #[arg(long, default_value = "2")]
        reconnect_delay: u64,
    },

    /// Run the relay server
    Serve {
        /// TCP listen address
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        listen: String,

        /// Auth token
        #[arg(short, long)]
        token: String,

        /// Upstream destination IP
        #[arg(long, default_value = "127.0.0.1")]
        dst_ip: IpAddr,

        /// Upstream UDP reply timeout in seconds
        #[arg(long, default_value = "3")]
        udp_timeout: u64,

        /// Packets/sec limit per connection (0 disables)
        #[arg(long, default_value = "0")]
        rate_pps: u32,

        /// Bytes/sec limit per connection (0 disables)
        #[arg(long, default_value = "0")]
        rate_bps: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Client {
            config,
            dst,
            server_port,
            keepalive,
            reconnect_delay,
        } => {
            let config: ClientConfig = config.parse().context("invalid tunnel config")?;
            let (dst_host, dst_port) = dst
                .rsplit_once(':')
                .context("destination must be <host>:<port>")?;
            let dst_port: u16 = dst_port.parse().context("invalid destination port")?;

            let mut client = TunnelClient::new(config, dst_host, dst_port, server_port);
            client.set_timing(
                Duration::from_secs(keepalive),
                Duration::from_secs(reconnect_delay),
            );
            client.set_log_listener(|line| println!("{line}"));
            client.start().await?;

            info!("client running, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            client.stop().await;
        }
        Commands::Serve {
            listen,
            token,
            dst_ip,
            udp_timeout,
            rate_pps,
            rate_bps,
        } => {
            let listener = TcpListener::bind(&listen)
                .await
                .with_context(|| format!("failed to listen on {listen}"))?;
            let config = RelayConfig {
                token,
                dst_ip,
                udp_timeout: Duration::from_secs(udp_timeout),
                rate_pps,
                rate_bps,
            };
            udptun_relay::run(listener, config).await?;
        }
    }

    Ok(())
}
