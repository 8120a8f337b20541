//! Relay connection handling
//!
//! One task per tunnel connection. Each DATA frame is forwarded to the
//! upstream destination `dst_ip:frame.dst_port` from a per-connection
//! ephemeral UDP socket; the next UDP reply (within `udp_timeout`) is framed
//! back with the request's session id. Keepalives are consumed silently.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use udptun_core::{decode_from, encode, Frame};

use crate::RateLimiter;

/// Default upstream reply timeout
pub const DEFAULT_UDP_TIMEOUT: Duration = Duration::from_secs(3);

/// Relay server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Shared secret keying the frame HMAC
    pub token: String,
    /// Upstream destination IP; the port comes from each frame's header
    pub dst_ip: IpAddr,
    /// How long to wait for one upstream UDP reply per request
    pub udp_timeout: Duration,
    /// Egress packets/sec limit per connection (0 disables)
    pub rate_pps: u32,
    /// Egress bytes/sec limit per connection (0 disables)
    pub rate_bps: usize,
}

impl RelayConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            dst_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            udp_timeout: DEFAULT_UDP_TIMEOUT,
            rate_pps: 0,
            rate_bps: 0,
        }
    }
}

/// Accept tunnel connections until the listener itself fails.
pub async fn run(listener: TcpListener, config: RelayConfig) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "relay listening");
    loop {
        let (conn, remote) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("accept failed: {e}");
                continue;
            }
        };
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_conn(conn, config).await {
                debug!(%remote, "connection task ended: {e}");
            }
        });
    }
}

/// Serve one tunnel connection until its stream fails or misbehaves.
pub async fn handle_conn(conn: TcpStream, config: RelayConfig) -> std::io::Result<()> {
    let remote = conn.peer_addr()?;
    info!(%remote, "tunnel connected");

    let upstream = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    let (read_half, mut write_half) = conn.into_split();
    let mut reader = BufReader::new(read_half);
    let mut limiter = RateLimiter::new(config.rate_pps, config.rate_bps);

    let mut bytes_in: u64 = 0;
    let mut bytes_out: u64 = 0;
    let mut buf = vec![0u8; 65535];

    loop {
        let frame = match decode_from(&mut reader, &config.token).await {
            Ok(frame) => frame,
            Err(e) => {
                info!(%remote, bytes_in, bytes_out, "tunnel disconnected: {e}");
                return Ok(());
            }
        };
        if !frame.is_data() {
            continue;
        }
        if !limiter.allow(frame.payload.len()) {
            warn!(%remote, bytes = frame.payload.len(), "rate limit drop");
            continue;
        }
        bytes_in += frame.payload.len() as u64;

        let dst = SocketAddr::new(config.dst_ip, frame.header.dst_port);
        if let Err(e) = upstream.send_to(&frame.payload, dst).await {
            warn!(%dst, "upstream UDP send failed: {e}");
            continue;
        }

        let reply_len = match timeout(config.udp_timeout, upstream.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => len,
            Ok(Err(e)) => {
                warn!("upstream UDP receive failed: {e}");
                continue;
            }
            // upstream stayed silent; nothing to frame back
            Err(_) => continue,
        };

        let reply = Frame::data(
            frame.header.session_id,
            frame.header.dst_port,
            buf[..reply_len].to_vec(),
        );
        let encoded = match encode(&reply, &config.token) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("dropping reply: {e}");
                continue;
            }
        };
        write_half.write_all(&encoded).await?;
        write_half.flush().await?;
        bytes_out += reply_len as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_config_defaults() {
        let config = RelayConfig::new("secret");
        assert_eq!(config.token, "secret");
        assert_eq!(config.dst_ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.udp_timeout, DEFAULT_UDP_TIMEOUT);
        assert_eq!(config.rate_pps, 0);
        assert_eq!(config.rate_bps, 0);
    }
}
