//! udptun Client
//!
//! Tunnel session engine: bridges a local UDP socket to a relay server over
//! one authenticated TCP connection, multiplexing local UDP peers by session
//! id, emitting keepalives on idle, and reconnecting with a flat delay when
//! the connection drops.

mod error;
mod log_bridge;
mod session;
mod tunnel;

pub use error::*;
pub use log_bridge::*;
pub use session::*;
pub use tunnel::*;
