//! Proxy Duplicate Address Detection.
//!
//! The gateway performs DAD on the Ethernet segment on behalf of a
//! registering 6LoWPAN node: it sends up to `pgw_max_dad_ns` unspecified-
//! source Neighbor Solicitations to the target's solicited-node multicast
//! address, spaced one retransmission timer apart, and declares success once
//! that budget is exhausted with no answering NA (`na::handle_from_ethernet`
//! handles the collision case). The retransmission timer (`dad_retrans_ms`)
//! is distinct from the periodic poll cadence (`pgw_period_ms`): advancing
//! DAD is still checked at most once per `Gateway::poll` tick, but a
//! `Tentative` entry's deadline only elapses after the longer retrans
//! interval. Grounded on `examples/original_source/.../pgw.c`'s `pgw_dad`,
//! called once per `pgw_periodic` tick, per SPEC_FULL.md §4.6.5, and on
//! `pgw_nd.c`'s `UIP_ND6_RETRANS_TIMER`-based `dadtimer`.

use crate::addr::{Interface, EUI64_MULTICAST};
use crate::clock::GwInstant;
use crate::config::Config;
use crate::dispatcher::Emission;
use crate::gateway::Gateway;
use crate::neighbor::{NeighborIndex, NeighborState};
use crate::options::ARO_SUCCESS;
use crate::packet::{build_ns, is_unspecified, solicited_node_multicast, PacketContext};

use super::ns::build_registration_na;

/// Sends the first DAD probe for a freshly `Tentative` entry.
pub fn start(gw: &mut Gateway, idx: NeighborIndex, now: GwInstant, cfg: &Config) -> Vec<Emission> {
    let Some(entry) = gw.neighbors.get_mut(idx) else { return vec![] };
    entry.dad_ns_sent = 1;
    entry.dad_deadline = now.checked_add(cfg.dad_retrans());
    let target = entry.ipaddr;

    vec![probe(gw, &target)]
}

fn probe(gw: &Gateway, target: &crate::addr::Ipv6Addr) -> Emission {
    let dst = solicited_node_multicast(target);
    let unspecified = crate::addr::Ipv6Addr::from_bytes(&[0u8; 16]);
    let buf = build_ns(&unspecified, &dst, target, &[]);
    Emission {
        iface: Interface::Ethernet,
        ctx: PacketContext::new(buf, Interface::Ethernet, gw.own_eui, EUI64_MULTICAST),
    }
}

/// Advances at most one in-progress registration per call, matching the
/// source's `pgw_periodic` which calls `pgw_dad` once and returns.
pub fn poll(gw: &mut Gateway, now: GwInstant, cfg: &Config) -> Vec<Emission> {
    let Some(idx) = gw
        .neighbors
        .iter()
        .find(|(_, e)| e.state == NeighborState::Tentative && !e.ipaddr.is_link_local() && now.has_elapsed(e.dad_deadline))
        .map(|(i, _)| i)
    else {
        return vec![];
    };

    let entry = *gw.neighbors.get(idx).unwrap();
    if entry.dad_ns_sent < cfg.pgw_max_dad_ns {
        let emission = probe(gw, &entry.ipaddr);
        let e = gw.neighbors.get_mut(idx).unwrap();
        e.dad_ns_sent += 1;
        e.dad_deadline = now.checked_add(cfg.dad_retrans());
        return vec![emission];
    }

    tracing::info!(ip = %entry.ipaddr, "dad: succeeded, registering");
    let Some(rr_ip) = gw.rr_ip else { return vec![] };
    let Some(rr_eui) = gw.rr_eui else { return vec![] };

    let e = gw.neighbors.get_mut(idx).unwrap();
    e.state = NeighborState::Registered;
    e.aro_pending = false;
    e.ra_pending = true;
    e.reachable_deadline = now.checked_add(std::time::Duration::from_secs(e.pending_lifetime_secs));
    let (ipaddr, lladdr, lifetime_minutes) = (
        e.ipaddr,
        e.lladdr,
        (e.pending_lifetime_secs / 60).min(u16::MAX as u64) as u16,
    );

    vec![Emission {
        iface: Interface::LowPan,
        ctx: PacketContext::new(
            build_registration_na(&rr_ip, rr_eui, &ipaddr, &ipaddr, lladdr, ARO_SUCCESS, lifetime_minutes),
            Interface::LowPan,
            rr_eui,
            lladdr,
        ),
    }]
}
