//! BridgeTable: the L2 forwarding database used for egress interface lookup.
//!
//! Grounded on `examples/original_source/.../pgw_fwd.c` (`bridge_addr_add`,
//! `bridge_addr_lookup`) for the learn/evict/lookup semantics, and on
//! SPEC_FULL.md §4.1 for the `(addr, iface)` dedupe-before-insert rule (the C
//! source inserts on address-only miss; the spec is authoritative here).

use crate::addr::{Eui64, Interface};
use rand::Rng;

#[derive(Clone, Copy, Debug)]
struct BridgeEntry {
    addr: Eui64,
    iface: Interface,
}

/// Fixed-capacity forwarding table: `Eui64`-like address -> learned interface.
pub struct BridgeTable {
    slots: Vec<Option<BridgeEntry>>,
}

impl BridgeTable {
    pub fn new(capacity: usize) -> Self {
        BridgeTable {
            slots: vec![None; capacity],
        }
    }

    /// Learn that `addr` is reachable via `iface`. No-op for the multicast
    /// sentinel. If `(addr, iface)` is already present, does nothing. If the
    /// table is full, evicts a uniformly random occupied slot first.
    pub fn learn(&mut self, addr: Eui64, iface: Interface) {
        if addr.is_multicast() {
            return;
        }
        if self
            .slots
            .iter()
            .flatten()
            .any(|e| e.addr == addr && e.iface == iface)
        {
            return;
        }
        let free = self.slots.iter().position(|s| s.is_none());
        let index = match free {
            Some(i) => i,
            None => rand::thread_rng().gen_range(0..self.slots.len()),
        };
        self.slots[index] = Some(BridgeEntry { addr, iface });
        tracing::debug!(%addr, ?iface, index, "bridge: learned address");
    }

    /// First-match lookup of the interface an address was last learned on.
    pub fn lookup(&self, addr: Eui64) -> Option<Interface> {
        if addr.is_multicast() {
            return None;
        }
        self.slots
            .iter()
            .flatten()
            .find(|e| e.addr == addr)
            .map(|e| e.iface)
    }

    #[cfg(test)]
    fn occupied_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::EUI64_MULTICAST;

    fn eui(n: u8) -> Eui64 {
        Eui64::new([0, 0, 0, 0, 0, 0, 0, n])
    }

    #[test]
    fn learn_then_lookup_until_eviction() {
        let mut bt = BridgeTable::new(2);
        bt.learn(eui(1), Interface::LowPan);
        assert_eq!(bt.lookup(eui(1)), Some(Interface::LowPan));
    }

    #[test]
    fn multicast_address_is_never_learned_or_matched() {
        let mut bt = BridgeTable::new(4);
        bt.learn(EUI64_MULTICAST, Interface::Ethernet);
        assert_eq!(bt.occupied_count(), 0);
        assert_eq!(bt.lookup(EUI64_MULTICAST), None);
    }

    #[test]
    fn duplicate_addr_iface_pair_is_not_relearned() {
        let mut bt = BridgeTable::new(4);
        bt.learn(eui(1), Interface::LowPan);
        bt.learn(eui(1), Interface::LowPan);
        assert_eq!(bt.occupied_count(), 1);
    }

    #[test]
    fn same_addr_different_iface_learns_a_second_slot() {
        let mut bt = BridgeTable::new(4);
        bt.learn(eui(1), Interface::LowPan);
        bt.learn(eui(1), Interface::Ethernet);
        assert_eq!(bt.occupied_count(), 2);
        // first match wins; either is a legal "first" depending on insertion order
        assert!(bt.lookup(eui(1)).is_some());
    }

    #[test]
    fn overflow_evicts_rather_than_growing() {
        let mut bt = BridgeTable::new(1);
        bt.learn(eui(1), Interface::LowPan);
        bt.learn(eui(2), Interface::Ethernet);
        assert_eq!(bt.occupied_count(), 1);
        assert_eq!(bt.lookup(eui(2)), Some(Interface::Ethernet));
    }
}
