//! Session table mapping local UDP peers to tunnel session ids
//!
//! Session ids are random 64-bit values minted on first sight of a sender
//! and assumed statistically unique within one run. Entries are never
//! evicted while the engine runs; growth is bounded only by the number of
//! distinct local peers. The reverse mapping is refreshed on every datagram
//! so replies go to the most recent source address a peer used.

use std::collections::HashMap;
use std::net::SocketAddr;

use parking_lot::RwLock;

#[derive(Default)]
struct Maps {
    id_by_sender: HashMap<SocketAddr, u64>,
    sender_by_id: HashMap<u64, SocketAddr>,
}

/// Bidirectional sender <-> session-id table, shared by the uplink and
/// downlink pumps. Both maps are mutated under one lock so every id present
/// in one table has a matching entry in the other.
#[derive(Default)]
pub struct SessionTable {
    maps: RwLock<Maps>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session id for `sender`, minting a fresh random one on first sight.
    /// Refreshes the reverse mapping in the same critical section.
    pub fn session_for(&self, sender: SocketAddr) -> u64 {
        let mut maps = self.maps.write();
        let id = *maps
            .id_by_sender
            .entry(sender)
            .or_insert_with(rand::random::<u64>);
        maps.sender_by_id.insert(id, sender);
        id
    }

    /// The UDP peer a session id belongs to, if known.
    pub fn sender(&self, session_id: u64) -> Option<SocketAddr> {
        self.maps.read().sender_by_id.get(&session_id).copied()
    }

    /// Number of distinct peers seen this run.
    pub fn len(&self) -> usize {
        self.maps.read().id_by_sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries. Called on engine stop.
    pub fn clear(&self) {
        let mut maps = self.maps.write();
        maps.id_by_sender.clear();
        maps.sender_by_id.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn test_same_sender_gets_stable_id() {
        let table = SessionTable::new();
        let first = table.session_for(addr(40000));
        let second = table.session_for(addr(40000));
        assert_eq!(first, second);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_distinct_senders_get_distinct_ids() {
        let table = SessionTable::new();
        let a = table.session_for(addr(40000));
        let b = table.session_for(addr(40001));
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_reverse_lookup() {
        let table = SessionTable::new();
        let id = table.session_for(addr(40000));
        assert_eq!(table.sender(id), Some(addr(40000)));
        assert_eq!(table.sender(id.wrapping_add(1)), None);
    }

    #[test]
    fn test_clear_empties_both_tables() {
        let table = SessionTable::new();
        let id = table.session_for(addr(40000));
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.sender(id), None);
    }
}
