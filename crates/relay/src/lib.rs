//! udptun Relay
//!
//! Server side of the tunnel: accepts authenticated TCP connections, forwards
//! DATA payloads to an upstream UDP destination and frames one reply back per
//! request, with an optional per-connection rate limit.

mod limiter;
mod server;

pub use limiter::*;
pub use server::*;
