use thiserror::Error;

/// Errors produced by the frame codec.
///
/// During bridging every variant leads to the same recovery: tear down the
/// TCP connection and reconnect. `PayloadTooLarge` and `InvalidPort` on the
/// encode path indicate a caller bug, since oversize datagrams are filtered
/// before encoding.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("payload exceeds limit: {len} > {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("destination port must be 1..65535")]
    InvalidPort,

    #[error("invalid magic")]
    InvalidMagic,

    #[error("invalid version: {0}")]
    InvalidVersion(u8),

    #[error("invalid tag length: {0}")]
    InvalidTagLength(u8),

    #[error("frame authentication failed")]
    AuthFailed,

    #[error("stream ended mid-frame: {0}")]
    Truncated(#[from] std::io::Error),
}

/// Errors from parsing the `host:portSpec@token[:localPort]` config string.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("empty config")]
    Empty,

    #[error("invalid format: missing @")]
    MissingAt,

    #[error("invalid <serverHost>:<udpPortSpec>")]
    InvalidHostPortSpec,

    #[error("empty serverHost")]
    EmptyHost,

    #[error("empty token")]
    EmptyToken,

    #[error("invalid port: {0:?}")]
    InvalidPort(String),

    #[error("port range start must be <= end: {min}-{max}")]
    InvalidRange { min: u16, max: u16 },
}
