use thiserror::Error;

/// Errors surfaced from `TunnelClient::start`.
///
/// Everything that happens after `start` returns (connect failures, frame
/// errors, I/O errors during bridging) is logged and retried, never surfaced
/// as fatal.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("destination port {port} not allowed; expected {min}..{max}")]
    PortNotAllowed { port: u16, min: u16, max: u16 },

    #[error("failed to bind local UDP socket: {0}")]
    Bind(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
