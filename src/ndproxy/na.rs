//! Neighbor Advertisement handling: proxy-DAD collision detection and
//! forwarding of solicited/unsolicited NAs between segments.
//!
//! Grounded on `examples/original_source/.../pgw.c`'s `proxy_na_input`, per
//! SPEC_FULL.md §4.6.2.

use crate::addr::Interface;
use crate::clock::GwInstant;
use crate::config::Config;
use crate::dispatcher::Emission;
use crate::gateway::Gateway;
use crate::neighbor::NeighborState;
use crate::options::{adjust_ipv6_payload_len, rewrite_options, AroOption, ARO_SUCCESS};
use crate::packet::{PacketContext, IPV6_PAYLOAD_LEN_OFFSET, ICMP_BODY_OFFSET, NA_BODY_LEN};

use super::ns::build_registration_na;

pub fn handle(gw: &mut Gateway, ctx: PacketContext, now: GwInstant, cfg: &Config) -> Vec<Emission> {
    match ctx.inc {
        Interface::Ethernet | Interface::Local => handle_from_ethernet(gw, ctx, now, cfg),
        Interface::LowPan => handle_from_lowpan(gw, ctx, cfg),
        Interface::Undefined => vec![],
    }
}

fn handle_from_ethernet(gw: &mut Gateway, ctx: PacketContext, now: GwInstant, cfg: &Config) -> Vec<Emission> {
    if ctx.ipv6_dst().is_multicast() {
        handle_dad_collision(gw, ctx)
    } else {
        handle_unicast(gw, ctx, now, cfg)
    }
}

/// A node on the Ethernet segment answered a proxy-DAD probe the gateway
/// sent on behalf of a `Tentative` 6LoWPAN registration: the address is in
/// use there, so registration fails. The probe is unspecified-source, so the
/// defending node's NA is sent to the link-local-all-nodes multicast address
/// rather than back to the gateway directly.
fn handle_dad_collision(gw: &mut Gateway, ctx: PacketContext) -> Vec<Emission> {
    let target = crate::addr::Ipv6Addr::from_bytes(&ctx.icmp_body()[4..20]);

    let Some((idx, lladdr)) = gw
        .neighbors
        .iter()
        .find(|(_, e)| e.state == NeighborState::Tentative && e.ipaddr == target)
        .map(|(i, e)| (i, e.lladdr))
    else {
        tracing::trace!(%target, "na: no matching dad probe, dropping");
        return vec![];
    };

    let Some(rr_ip) = gw.rr_ip else { return vec![] };
    let Some(rr_eui) = gw.rr_eui else { return vec![] };

    tracing::info!(%target, "na: proxy-dad collision, registration rejected");
    gw.neighbors.remove(idx);

    vec![Emission {
        iface: Interface::LowPan,
        ctx: PacketContext::new(
            build_registration_na(&rr_ip, lladdr, &target, &target, lladdr, crate::options::ARO_DUPLICATE, 0),
            Interface::LowPan,
            rr_eui,
            lladdr,
        ),
    }]
}

/// A unicast NA on the Ethernet segment addressed to a 6LoWPAN node's own
/// (registered) address: either the router's NUD reply completing a pending
/// re-registration, or an ordinary NA that must simply be forwarded toward
/// the node. Looked up by destination IP, not by the NA's target field.
fn handle_unicast(gw: &mut Gateway, mut ctx: PacketContext, now: GwInstant, cfg: &Config) -> Vec<Emission> {
    let dst = ctx.ipv6_dst();
    let Some(idx) = gw.neighbors.lookup_by_ip(&dst, now) else {
        tracing::trace!(%dst, "na: no registered neighbor at this address, dropping");
        return vec![];
    };
    let entry = *gw.neighbors.get(idx).unwrap();
    let src = ctx.ipv6_src();
    let opt_start = ICMP_BODY_OFFSET + NA_BODY_LEN;

    let completes_registration = entry.aro_pending
        && gw.rr_ip == Some(src)
        && matches!(entry.state, NeighborState::Tentative | NeighborState::Registered);

    if completes_registration {
        if rewrite_options(&mut ctx.buf, IPV6_PAYLOAD_LEN_OFFSET, opt_start, Interface::LowPan, cfg.option_filtering, false).is_err() {
            return vec![];
        }
        let lifetime_minutes = (entry.pending_lifetime_secs / 60).min(u16::MAX as u64) as u16;
        let aro = AroOption { status: ARO_SUCCESS, lifetime_minutes, eui64: entry.lladdr }.encode();
        ctx.buf.extend_from_slice(&aro);
        adjust_ipv6_payload_len(&mut ctx.buf, IPV6_PAYLOAD_LEN_OFFSET, aro.len() as i32);

        let e = gw.neighbors.get_mut(idx).unwrap();
        e.state = NeighborState::Registered;
        e.aro_pending = false;
        e.reachable_deadline = now.checked_add(std::time::Duration::from_secs(e.pending_lifetime_secs));

        ctx.fix_checksum();
        ctx.dst_eui = entry.lladdr;
        tracing::info!(%dst, "na: router nud confirmed registration, forwarding aro-success");
        return vec![Emission { iface: Interface::LowPan, ctx }];
    }

    if entry.state == NeighborState::Registered {
        if rewrite_options(&mut ctx.buf, IPV6_PAYLOAD_LEN_OFFSET, opt_start, Interface::LowPan, cfg.option_filtering, false).is_err() {
            return vec![];
        }
        ctx.fix_checksum();
        ctx.dst_eui = entry.lladdr;
        return vec![Emission { iface: Interface::LowPan, ctx }];
    }

    vec![]
}

/// An NA originating on the 6LoWPAN segment: either an unsolicited update
/// (flooded to the other links, per §4.6.2) or a solicited reply to an
/// address-resolution NS the dispatcher already routed toward `ctx.out`.
fn handle_from_lowpan(_gw: &mut Gateway, mut ctx: PacketContext, cfg: &Config) -> Vec<Emission> {
    let dst = ctx.ipv6_dst();
    let opt_start = ICMP_BODY_OFFSET + NA_BODY_LEN;

    if dst.is_multicast() {
        let mut out = Vec::with_capacity(2);
        for iface in Interface::others(ctx.inc) {
            let mut clone = PacketContext::new(ctx.buf.clone(), ctx.inc, ctx.src_eui, ctx.dst_eui);
            if rewrite_options(&mut clone.buf, IPV6_PAYLOAD_LEN_OFFSET, opt_start, iface, cfg.option_filtering, false).is_err() {
                continue;
            }
            clone.fix_checksum();
            out.push(Emission { iface, ctx: clone });
        }
        return out;
    }

    if ctx.out == Interface::Undefined {
        return vec![];
    }
    if rewrite_options(&mut ctx.buf, IPV6_PAYLOAD_LEN_OFFSET, opt_start, ctx.out, cfg.option_filtering, false).is_err() {
        return vec![];
    }
    ctx.fix_checksum();
    let out = ctx.out;
    vec![Emission { iface: out, ctx }]
}
