//! Tunnel session engine
//!
//! State machine per run: Idle -> Listening -> (Connecting <-> Bridging) ->
//! Stopped. `start()` binds the local UDP socket and spawns the outer
//! reconnect loop; `stop()` flips the running flag, aborts the loop and
//! clears the session table. Bridging races the uplink (UDP -> TCP) and the
//! downlink (TCP -> UDP) concurrently on the loop task, sharing the one TCP
//! connection and the one UDP socket.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

use udptun_core::{decode_from, encode, ClientConfig, Frame, FrameError, MAX_PAYLOAD};

use crate::{ClientError, LogBridge, Result, SessionTable};

/// TCP connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Local UDP receive timeout; also the cadence of the keepalive idle check
const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Idle time on the write side before a keepalive frame is emitted
pub const DEFAULT_KEEPALIVE_IDLE: Duration = Duration::from_secs(15);

/// Flat delay between reconnect attempts, retried without bound
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Tunnel client bridging 127.0.0.1:`localPort` to `serverHost:serverTcpPort`.
///
/// One tunnel run at a time per instance; `start()` is idempotent while a
/// run is active.
pub struct TunnelClient {
    config: ClientConfig,
    dst_host: String,
    dst_port: u16,
    server_tcp_port: u16,
    keepalive_idle: Duration,
    reconnect_delay: Duration,
    running: Arc<AtomicBool>,
    sessions: Arc<SessionTable>,
    log: LogBridge,
    worker: Option<JoinHandle<()>>,
}

impl TunnelClient {
    pub fn new(
        config: ClientConfig,
        dst_host: impl Into<String>,
        dst_port: u16,
        server_tcp_port: u16,
    ) -> Self {
        Self {
            config,
            dst_host: dst_host.into(),
            dst_port,
            server_tcp_port,
            keepalive_idle: DEFAULT_KEEPALIVE_IDLE,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            running: Arc::new(AtomicBool::new(false)),
            sessions: Arc::new(SessionTable::new()),
            log: LogBridge::new(),
            worker: None,
        }
    }

    /// Install a listener for the engine's human-readable progress lines.
    pub fn set_log_listener(&mut self, listener: impl FnMut(&str) + Send + Sync + 'static) {
        self.log.set_listener(listener);
    }

    /// Override keepalive idle threshold and reconnect delay.
    pub fn set_timing(&mut self, keepalive_idle: Duration, reconnect_delay: Duration) {
        self.keepalive_idle = keepalive_idle;
        self.reconnect_delay = reconnect_delay;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Distinct local UDP peers seen this run.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Validate the destination port, bind the local UDP socket and launch
    /// the reconnect loop. No-op when already running.
    pub async fn start(&mut self) -> Result<()> {
        if !self.config.allows_dst_port(self.dst_port) {
            return Err(ClientError::PortNotAllowed {
                port: self.dst_port,
                min: self.config.port_min,
                max: self.config.port_max,
            });
        }

        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let udp = match UdpSocket::bind((Ipv4Addr::LOCALHOST, self.config.local_port)).await {
            Ok(socket) => socket,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(ClientError::Bind(e));
            }
        };

        self.log.post(&format!(
            "UDP listen 127.0.0.1:{}, dst={}:{}",
            self.config.local_port, self.dst_host, self.dst_port
        ));
        info!(
            local_port = self.config.local_port,
            dst_host = %self.dst_host,
            dst_port = self.dst_port,
            "tunnel started"
        );

        let run = TunnelRun {
            server_host: self.config.server_host.clone(),
            server_tcp_port: self.server_tcp_port,
            token: self.config.token.clone(),
            dst_port: self.dst_port,
            keepalive_idle: self.keepalive_idle,
            reconnect_delay: self.reconnect_delay,
            running: self.running.clone(),
            sessions: self.sessions.clone(),
            udp: Arc::new(udp),
            log: self.log.clone(),
        };
        self.worker = Some(tokio::spawn(run.run()));
        Ok(())
    }

    /// Stop the tunnel. Aborting the loop cancels both bridge directions;
    /// awaiting the cancelled task guarantees both sockets are dropped, so
    /// the local UDP port is free again when this returns. Safe to call
    /// repeatedly.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker.abort();
            let _ = worker.await;
        }
        self.sessions.clear();
        self.log.post("tunnel stopped");
        info!("tunnel stopped");
    }
}

impl Drop for TunnelClient {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

/// State owned by the outer reconnect loop task.
struct TunnelRun {
    server_host: String,
    server_tcp_port: u16,
    token: String,
    dst_port: u16,
    keepalive_idle: Duration,
    reconnect_delay: Duration,
    running: Arc<AtomicBool>,
    sessions: Arc<SessionTable>,
    udp: Arc<UdpSocket>,
    log: LogBridge,
}

impl TunnelRun {
    /// Connecting <-> Bridging, forever. Flat delay, no backoff, no jitter;
    /// session mappings survive reconnects and are cleared only on stop.
    async fn run(self) {
        while self.running.load(Ordering::SeqCst) {
            match self.connect().await {
                Ok(stream) => {
                    self.log.post(&format!(
                        "TCP connected {}:{}",
                        self.server_host, self.server_tcp_port
                    ));
                    info!(server = %self.server_host, port = self.server_tcp_port, "connected to relay");
                    if let Err(e) = self.bridge(stream).await {
                        debug!("bridge ended: {e}");
                    }
                }
                Err(e) => {
                    warn!(server = %self.server_host, port = self.server_tcp_port, "connect failed: {e}");
                    self.log.post(&format!("connect failed: {e}"));
                }
            }
            if self.running.load(Ordering::SeqCst) {
                self.log.post(&format!(
                    "TCP down, reconnecting in {}s",
                    self.reconnect_delay.as_secs_f32()
                ));
                tokio::time::sleep(self.reconnect_delay).await;
            }
        }
    }

    async fn connect(&self) -> std::io::Result<TcpStream> {
        let stream = timeout(
            CONNECT_TIMEOUT,
            TcpStream::connect((self.server_host.as_str(), self.server_tcp_port)),
        )
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Bridge one TCP connection: both directions race on this task, so
    /// aborting the loop cancels them together and either direction failing
    /// tears the connection down. Returns when the bridge ends.
    async fn bridge(&self, stream: TcpStream) -> std::io::Result<()> {
        let (read_half, mut write_half) = stream.into_split();

        tokio::select! {
            err = self.downlink_loop(read_half) => {
                if let Some(err) = err {
                    debug!("downlink ended: {err}");
                }
                Ok(())
            }
            result = self.uplink_loop(&mut write_half) => result,
        }
    }

    /// UDP -> TCP. Blocks on UDP receive with a 1s timeout; receive timeouts
    /// and receive errors both fall through to the keepalive idle check.
    async fn uplink_loop(&self, write_half: &mut OwnedWriteHalf) -> std::io::Result<()> {
        let mut buf = vec![0u8; 65535];
        let mut last_write = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            match timeout(RECV_TIMEOUT, self.udp.recv_from(&mut buf)).await {
                Ok(Ok((len, sender))) => {
                    if len > MAX_PAYLOAD {
                        warn!(bytes = len, %sender, "dropping oversize datagram");
                        self.log.post(&format!("drop oversize {len}"));
                        continue;
                    }
                    let session_id = self.sessions.session_for(sender);
                    let frame = Frame::data(session_id, self.dst_port, buf[..len].to_vec());
                    let encoded = match encode(&frame, &self.token) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            // Unreachable after the oversize filter; a
                            // programming defect, not a tunnel failure.
                            error!("frame encode failed: {e}");
                            continue;
                        }
                    };
                    write_half.write_all(&encoded).await?;
                    write_half.flush().await?;
                    last_write = Instant::now();
                    continue;
                }
                Ok(Err(e)) => {
                    warn!("local UDP receive failed: {e}");
                }
                Err(_) => {}
            }
            if last_write.elapsed() >= self.keepalive_idle {
                let encoded = encode(&Frame::keepalive(), &self.token)
                    .expect("keepalive frame is always encodable");
                write_half.write_all(&encoded).await?;
                write_half.flush().await?;
                last_write = Instant::now();
            }
        }
        Ok(())
    }

    /// TCP -> UDP. Decodes frames until the stream fails, returning the
    /// terminating error; keepalives and frames for unknown session ids are
    /// dropped silently.
    async fn downlink_loop(&self, read_half: OwnedReadHalf) -> Option<FrameError> {
        let mut reader = BufReader::new(read_half);
        while self.running.load(Ordering::SeqCst) {
            match decode_from(&mut reader, &self.token).await {
                Ok(frame) => {
                    if !frame.is_data() {
                        continue;
                    }
                    let Some(sender) = self.sessions.sender(frame.header.session_id) else {
                        continue;
                    };
                    if let Err(e) = self.udp.send_to(&frame.payload, sender).await {
                        debug!(%sender, "local UDP write failed: {e}");
                    }
                }
                Err(e) => return Some(e),
            }
        }
        None
    }
}
