//! Neighbor Solicitation handling: address resolution toward Ethernet/Local,
//! registration (ARO) and NUD toward LowPan.
//!
//! Grounded on `examples/original_source/.../pgw.c`'s `proxy_ns_input`, per
//! SPEC_FULL.md §4.6.1.

use crate::addr::{Eui64, EthMac, Interface, Ipv6Addr, EUI64_MULTICAST};
use crate::clock::GwInstant;
use crate::config::Config;
use crate::dispatcher::Emission;
use crate::error::PacketError;
use crate::gateway::Gateway;
use crate::neighbor::NeighborState;
use crate::options::{
    walk_options, encode_lladdr_option, AroOption, OPT_ARO, OPT_SLLAO, OPT_TLLAO,
    ARO_DUPLICATE, ARO_RTR_NC_FULL,
};
use crate::packet::{
    build_na, is_unspecified, ICMP_BODY_OFFSET, IPV6_PAYLOAD_LEN_OFFSET, NA_FLAG_OVERRIDE,
    NA_FLAG_ROUTER, NA_FLAG_SOLICITED, NS_BODY_LEN, PacketContext, link_local_all_nodes,
};
use crate::options::rewrite_options;

use super::dad;

pub fn handle(gw: &mut Gateway, ctx: PacketContext, now: GwInstant, cfg: &Config) -> Vec<Emission> {
    match ctx.inc {
        Interface::Ethernet | Interface::Local => handle_from_eth_or_local(gw, ctx, now),
        Interface::LowPan => handle_from_lowpan(gw, ctx, now, cfg),
        Interface::Undefined => vec![],
    }
}

fn handle_from_eth_or_local(gw: &mut Gateway, ctx: PacketContext, now: GwInstant) -> Vec<Emission> {
    let target = Ipv6Addr::from_bytes(&ctx.icmp_body()[4..20]);
    let src = ctx.ipv6_src();

    let Some(idx) = gw.neighbors.lookup_by_ip(&target, now) else {
        return vec![];
    };
    let entry = *gw.neighbors.get(idx).unwrap();

    match entry.state {
        NeighborState::Registered => {
            let tllao = encode_lladdr_option(OPT_TLLAO, entry.lladdr, false);
            if !is_unspecified(&src) {
                let buf = build_na(&target, &src, &target, NA_FLAG_OVERRIDE | NA_FLAG_SOLICITED, &[&tllao]);
                vec![Emission {
                    iface: ctx.inc,
                    ctx: PacketContext::new(buf, ctx.inc, entry.lladdr, ctx.src_eui),
                }]
            } else {
                let dst = link_local_all_nodes();
                let buf = build_na(&target, &dst, &target, NA_FLAG_OVERRIDE, &[&tllao]);
                vec![Emission {
                    iface: ctx.inc,
                    ctx: PacketContext::new(buf, ctx.inc, entry.lladdr, EUI64_MULTICAST),
                }]
            }
        }
        NeighborState::Tentative => {
            if is_unspecified(&src) {
                tracing::debug!(%target, "ns: ethernet dad collided with in-flight registration");
                gw.neighbors.remove(idx);
            }
            vec![]
        }
        NeighborState::GarbageCollectible => vec![],
    }
}

fn collect_ns_options(buf: &[u8], opt_start: usize) -> Result<(Option<Eui64>, Option<AroOption>), PacketError> {
    let views = walk_options(buf, opt_start)?;
    let mut sllao = None;
    let mut aro = None;
    for v in &views {
        match v.opt_type {
            OPT_SLLAO => {
                let addr_len = v.byte_len - 2;
                sllao = Some(extract_lladdr(buf, v.offset, addr_len));
            }
            OPT_ARO => {
                aro = Some(AroOption::parse_incoming(&buf[v.offset..v.offset + v.byte_len])?);
            }
            _ => {}
        }
    }
    Ok((sllao, aro))
}

fn extract_lladdr(buf: &[u8], offset: usize, addr_len: usize) -> Eui64 {
    if addr_len == 8 {
        let mut e = [0u8; 8];
        e.copy_from_slice(&buf[offset + 2..offset + 10]);
        Eui64::new(e)
    } else {
        let mac = EthMac::new(buf[offset + 2..offset + 8].try_into().unwrap());
        Eui64::from_eth_mac(&mac)
    }
}

fn handle_from_lowpan(gw: &mut Gateway, mut ctx: PacketContext, now: GwInstant, cfg: &Config) -> Vec<Emission> {
    let target = Ipv6Addr::from_bytes(&ctx.icmp_body()[4..20]);
    if target.is_multicast() {
        return vec![];
    }

    let opt_start = ICMP_BODY_OFFSET + NS_BODY_LEN;
    let (sllao_eui, aro) = match collect_ns_options(&ctx.buf, opt_start) {
        Ok(v) => v,
        Err(_) => return vec![],
    };
    let src = ctx.ipv6_src();

    if aro.is_none() || is_unspecified(&src) || sllao_eui.is_none() {
        // Neighbor Unreachability Detection: forward unchanged, after
        // translating any link-layer-address option to the egress link's
        // native width.
        if rewrite_options(&mut ctx.buf, IPV6_PAYLOAD_LEN_OFFSET, opt_start, ctx.out, cfg.option_filtering, false).is_err() {
            return vec![];
        }
        ctx.fix_checksum();
        let out = ctx.out;
        return vec![Emission { iface: out, ctx }];
    }
    let aro = aro.unwrap();
    let sllao_eui = sllao_eui.unwrap();

    let (Some(rr_ip), Some(rr_eui)) = (gw.rr_ip, gw.rr_eui) else {
        return vec![];
    };
    if ctx.ipv6_dst() != rr_ip || target != rr_ip || ctx.dst_eui != rr_eui {
        return vec![];
    }

    match gw.neighbors.lookup_by_ip(&src, now) {
        None => try_register(gw, src, ctx.src_eui, sllao_eui, &aro, rr_ip, now, cfg),
        Some(idx) => {
            let existing = *gw.neighbors.get(idx).unwrap();
            if existing.lladdr != ctx.src_eui {
                tracing::debug!(%src, "ns: registration rejected, address already owned by a different eui");
                vec![Emission {
                    iface: Interface::LowPan,
                    ctx: PacketContext::new(
                        build_registration_na(&rr_ip, sllao_eui, &src, &src, ctx.src_eui, ARO_DUPLICATE, 0),
                        Interface::LowPan,
                        rr_eui,
                        ctx.src_eui,
                    ),
                }]
            } else {
                match existing.state {
                    NeighborState::Registered => {
                        let e = gw.neighbors.get_mut(idx).unwrap();
                        e.pending_lifetime_secs = aro.lifetime_minutes as u64 * 60;
                        e.reachable_deadline = now.checked_add(std::time::Duration::from_secs(e.pending_lifetime_secs));
                        e.aro_pending = true;
                        if rewrite_options(&mut ctx.buf, IPV6_PAYLOAD_LEN_OFFSET, opt_start, Interface::Ethernet, cfg.option_filtering, false).is_err() {
                            return vec![];
                        }
                        ctx.fix_checksum();
                        vec![Emission { iface: Interface::Ethernet, ctx }]
                    }
                    NeighborState::Tentative => vec![],
                    NeighborState::GarbageCollectible => {
                        // Known via RS but never registered: promote in place
                        // and enter proxy-DAD, the same as a brand-new node.
                        let e = gw.neighbors.get_mut(idx).unwrap();
                        e.state = NeighborState::Tentative;
                        e.aro_pending = true;
                        e.pending_lifetime_secs = aro.lifetime_minutes as u64 * 60;
                        e.dad_ns_sent = 0;
                        e.dad_deadline = now;
                        dad::start(gw, idx, now, cfg)
                    }
                }
            }
        }
    }
}

fn try_register(
    gw: &mut Gateway,
    src: Ipv6Addr,
    src_eui: Eui64,
    sllao_eui: Eui64,
    aro: &AroOption,
    rr_ip: Ipv6Addr,
    now: GwInstant,
    cfg: &Config,
) -> Vec<Emission> {
    match gw.neighbors.add(src, src_eui, NeighborState::Tentative, now, cfg) {
        Some(idx) => {
            let e = gw.neighbors.get_mut(idx).unwrap();
            e.aro_pending = true;
            e.pending_lifetime_secs = aro.lifetime_minutes as u64 * 60;
            dad::start(gw, idx, now, cfg)
        }
        None => {
            tracing::warn!(%src, "ns: neighbor cache full, rejecting registration");
            let Some(rr_eui) = gw.rr_eui else { return vec![] };
            vec![Emission {
                iface: Interface::LowPan,
                ctx: PacketContext::new(
                    build_registration_na(&rr_ip, sllao_eui, &src, &src, src_eui, ARO_RTR_NC_FULL, 0),
                    Interface::LowPan,
                    rr_eui,
                    src_eui,
                ),
            }]
        }
    }
}

/// Builds a router-sourced NA carrying an ARO, used for registration
/// success/duplicate/full responses (§4.6.1) and the proxy-DAD success and
/// failure messages (§4.6.5).
pub(crate) fn build_registration_na(
    rr_ip: &Ipv6Addr,
    tllao_eui: Eui64,
    dst_ip: &Ipv6Addr,
    target_ip: &Ipv6Addr,
    node_eui: Eui64,
    status: u8,
    lifetime_minutes: u16,
) -> Vec<u8> {
    let tllao = encode_lladdr_option(OPT_TLLAO, tllao_eui, true);
    let aro = AroOption { status, lifetime_minutes, eui64: node_eui };
    let encoded_aro = aro.encode();
    build_na(
        rr_ip,
        dst_ip,
        target_ip,
        NA_FLAG_ROUTER | NA_FLAG_SOLICITED | NA_FLAG_OVERRIDE,
        &[&tllao, &encoded_aro],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::GwInstant;
    use crate::config::Config;
    use crate::gateway::Gateway;
    use crate::options::{AroOption, ARO_SUCCESS};
    use crate::packet::build_ns;
    use std::net::Ipv6Addr as StdV6;

    fn ip(s: &str) -> Ipv6Addr {
        let a: StdV6 = s.parse().unwrap();
        Ipv6Addr::from_bytes(&a.octets())
    }

    fn eui(n: u8) -> Eui64 {
        Eui64::new([0, 0, 0, 0, 0, 0, 0, n])
    }

    fn node_with_aro(src: &Ipv6Addr, dst: &Ipv6Addr, target: &Ipv6Addr, sllao_eui: Eui64, aro: &AroOption) -> Vec<u8> {
        let sllao = encode_lladdr_option(OPT_SLLAO, sllao_eui, true);
        let encoded_aro = aro.encode();
        build_ns(src, dst, target, &[&sllao, &encoded_aro])
    }

    #[test]
    fn first_registration_creates_tentative_and_starts_dad() {
        let cfg = Config::default();
        let mut gw = Gateway::new(cfg.clone(), eui(0xee));
        gw.rr_ip = Some(ip("2001:db8::1"));
        gw.rr_eui = Some(eui(1));

        let aro = AroOption { status: ARO_SUCCESS, lifetime_minutes: 10, eui64: eui(2) };
        let buf = node_with_aro(&ip("2001:db8::2"), &ip("2001:db8::1"), &ip("2001:db8::1"), eui(2), &aro);
        let ctx = PacketContext::new(buf, Interface::LowPan, eui(2), eui(1));

        let emissions = handle(&mut gw, ctx, GwInstant::ZERO, &cfg);
        assert_eq!(emissions.len(), 1);
        assert_eq!(emissions[0].iface, Interface::Ethernet);
        let idx = gw.neighbors.lookup_by_ip(&ip("2001:db8::2"), GwInstant::ZERO).unwrap();
        assert_eq!(gw.neighbors.get(idx).unwrap().state, NeighborState::Tentative);
    }

    #[test]
    fn different_eui_same_ip_is_rejected_as_duplicate() {
        let cfg = Config::default();
        let mut gw = Gateway::new(cfg.clone(), eui(0xee));
        gw.rr_ip = Some(ip("2001:db8::1"));
        gw.rr_eui = Some(eui(1));
        gw.neighbors.add(ip("2001:db8::2"), eui(2), NeighborState::Registered, GwInstant::ZERO, &cfg);

        let aro = AroOption { status: ARO_SUCCESS, lifetime_minutes: 10, eui64: eui(3) };
        let buf = node_with_aro(&ip("2001:db8::2"), &ip("2001:db8::1"), &ip("2001:db8::1"), eui(3), &aro);
        let ctx = PacketContext::new(buf, Interface::LowPan, eui(3), eui(1));

        let emissions = handle(&mut gw, ctx, GwInstant::ZERO, &cfg);
        assert_eq!(emissions.len(), 1);
        let aro_status_offset = crate::packet::ICMP_BODY_OFFSET + crate::packet::NA_BODY_LEN + 16 + 2;
        assert_eq!(emissions[0].ctx.buf[aro_status_offset], ARO_DUPLICATE);
        let idx = gw.neighbors.lookup_by_ip(&ip("2001:db8::2"), GwInstant::ZERO).unwrap();
        assert_eq!(gw.neighbors.get(idx).unwrap().lladdr, eui(2));
    }

    #[test]
    fn wrong_registrar_target_is_dropped() {
        let cfg = Config::default();
        let mut gw = Gateway::new(cfg.clone(), eui(0xee));
        gw.rr_ip = Some(ip("2001:db8::1"));
        gw.rr_eui = Some(eui(1));

        let aro = AroOption { status: ARO_SUCCESS, lifetime_minutes: 10, eui64: eui(2) };
        // target is not rr_ip
        let buf = node_with_aro(&ip("2001:db8::2"), &ip("2001:db8::1"), &ip("2001:db8::9"), eui(2), &aro);
        let ctx = PacketContext::new(buf, Interface::LowPan, eui(2), eui(1));
        assert!(handle(&mut gw, ctx, GwInstant::ZERO, &cfg).is_empty());
    }
}
