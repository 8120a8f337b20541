//! Per-connection fixed-window rate limiting

use std::time::{Duration, Instant};

/// Packets/bytes-per-second limiter over a one-second fixed window.
///
/// A zero limit disables the corresponding check. Each connection task owns
/// its own limiter, so no locking is involved.
pub struct RateLimiter {
    window: Instant,
    packets: u32,
    bytes: usize,
    pps: u32,
    bps: usize,
}

impl RateLimiter {
    pub fn new(pps: u32, bps: usize) -> Self {
        Self {
            window: Instant::now(),
            packets: 0,
            bytes: 0,
            pps,
            bps,
        }
    }

    /// Whether a packet of `len` bytes fits in the current window, counting
    /// it when it does.
    pub fn allow(&mut self, len: usize) -> bool {
        if self.pps == 0 && self.bps == 0 {
            return true;
        }
        let now = Instant::now();
        if now.duration_since(self.window) >= Duration::from_secs(1) {
            self.window = now;
            self.packets = 0;
            self.bytes = 0;
        }
        if self.pps > 0 && self.packets + 1 > self.pps {
            return false;
        }
        if self.bps > 0 && self.bytes + len > self.bps {
            return false;
        }
        self.packets += 1;
        self.bytes += len;
        true
    }
}
