//! udptun Core
//!
//! Wire protocol and configuration shared by the tunnel client and the relay
//! server: the authenticated frame codec and the client configuration model.

mod config;
mod error;
mod frame;

pub use config::*;
pub use error::*;
pub use frame::*;
