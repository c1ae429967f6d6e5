//! The gateway: owns every table, and is the single entry point driven by
//! `main.rs`'s event loop (`input` for arriving packets, `poll` for the
//! periodic tick). Grounded on `examples/MalteJ-mvirt/mvirt-net/src/dataplane/mod.rs`
//! for the "one struct owns all the tables, caller drives it with explicit
//! events" shape; the source's globals (`uip_buf`, `pgw_nbr_cache[]`,
//! `pgw_context[]`, `bridge_table[]`, `rr_ipaddr`, `rr_lladdr`) become this
//! struct's fields, per SPEC_FULL.md §3/§9.

use crate::addr::{Eui64, Interface, Ipv6Addr};
use crate::bridge::BridgeTable;
use crate::clock::GwInstant;
use crate::config::Config;
use crate::context::ContextTable;
use crate::dispatcher::{self, Emission};
use crate::ndproxy;
use crate::neighbor::NeighborCache;
use crate::packet::PacketContext;

pub struct Gateway {
    pub cfg: Config,
    /// This gateway's own link-layer identity, used as the source address
    /// of packets it originates itself (proxy-DAD probes).
    pub own_eui: Eui64,
    pub bridge: BridgeTable,
    pub neighbors: NeighborCache,
    pub contexts: ContextTable,
    /// The real router's IPv6 address and link address, learned from the
    /// first RA seen on the Ethernet segment. Never forgotten once set.
    pub rr_ip: Option<Ipv6Addr>,
    pub rr_eui: Option<Eui64>,
}

impl Gateway {
    pub fn new(cfg: Config, own_eui: Eui64) -> Self {
        let mut bridge = BridgeTable::new(cfg.max_bridge_entries);
        bridge.learn(own_eui, Interface::Local);
        let neighbors = NeighborCache::new(cfg.max_lowpan_neighbors);
        let contexts = ContextTable::new(cfg.max_contexts);
        Gateway {
            cfg,
            own_eui,
            bridge,
            neighbors,
            contexts,
            rr_ip: None,
            rr_eui: None,
        }
    }

    /// Processes one arriving datagram, returning every packet that must
    /// now be emitted.
    pub fn input(&mut self, buf: Vec<u8>, inc: Interface, src_eui: Eui64, dst_eui: Eui64, now: GwInstant) -> Vec<Emission> {
        let cfg = self.cfg.clone();
        let ctx = PacketContext::new(buf, inc, src_eui, dst_eui);
        dispatcher::dispatch(self, ctx, now, &cfg)
    }

    /// Advances every timer by one tick: neighbor/context expiry, proxy-DAD
    /// progress, and — if a context transition changed what the network
    /// should advertise — a spontaneous RA re-announcement.
    pub fn poll(&mut self, now: GwInstant) -> Vec<Emission> {
        let cfg = self.cfg.clone();
        self.neighbors.periodic_expire(now);
        self.contexts.periodic(now, &cfg);

        let mut out = ndproxy::dad::poll(self, now, &cfg);
        if self.contexts.changed() {
            out.extend(ndproxy::ra::announce_from_poll(self, now, &cfg));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbor::NeighborState;
    use std::net::Ipv6Addr as StdV6;

    fn ip(s: &str) -> Ipv6Addr {
        let a: StdV6 = s.parse().unwrap();
        Ipv6Addr::from_bytes(&a.octets())
    }

    fn eui(n: u8) -> Eui64 {
        Eui64::new([0, 0, 0, 0, 0, 0, 0, n])
    }

    #[test]
    fn poll_expires_registered_neighbor_past_its_reachable_deadline() {
        let cfg = Config::default();
        let mut gw = Gateway::new(cfg.clone(), eui(0xee));
        let idx = gw
            .neighbors
            .add(ip("2001:db8::2"), eui(2), NeighborState::Registered, GwInstant::ZERO, &cfg)
            .unwrap();
        gw.neighbors.get_mut(idx).unwrap().reachable_deadline = GwInstant::from_secs(10);
        gw.poll(GwInstant::from_secs(11));
        assert!(gw.neighbors.get(idx).is_none());
    }

    #[test]
    fn own_eui_is_preseeded_into_the_bridge_table_as_local() {
        let cfg = Config::default();
        let gw = Gateway::new(cfg, eui(0xee));
        assert_eq!(gw.bridge.lookup(eui(0xee)), Some(Interface::Local));
    }

    #[test]
    fn poll_with_nothing_pending_emits_nothing() {
        let cfg = Config::default();
        let mut gw = Gateway::new(cfg.clone(), eui(0xee));
        assert!(gw.poll(GwInstant::ZERO).is_empty());
    }
}
