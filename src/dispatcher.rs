//! Frame dispatch: bridge-table learning, the network-layer filter, the
//! reflection guard, and handoff to the ND proxy for ICMPv6 traffic that
//! touches the LowPan segment.
//!
//! Grounded on `examples/original_source/.../pgw_fwd.c` (`pgw_fwd_packet`)
//! for the learn-then-forward-or-flood shape of an ordinary learning bridge
//! and the six numbered steps of SPEC_FULL.md §4.7, generalized so both the
//! plain-forwarding path and the ND proxy return the same `Vec<Emission>`
//! shape rather than mutating a shared output buffer — see SPEC_FULL.md §9's
//! discussion of the `Drop | EmitOn | EmitFlood` action enum, which this
//! crate widens to `Vec<Emission>` since RA fan-out and proxy-DAD must emit
//! more than one packet per event.

use crate::addr::{Eui64, Interface};
use crate::clock::GwInstant;
use crate::config::Config;
use crate::gateway::Gateway;
use crate::ndproxy;
use crate::packet::{PacketContext, ICMPV6_NEXT_HEADER};

const UDP_NEXT_HEADER: u8 = 17;

/// One packet the caller must hand to the named interface's driver.
#[derive(Debug)]
pub struct Emission {
    pub iface: Interface,
    pub ctx: PacketContext,
}

pub fn dispatch(gw: &mut Gateway, mut ctx: PacketContext, now: GwInstant, cfg: &Config) -> Vec<Emission> {
    if !ctx.src_eui.is_multicast() {
        gw.bridge.learn(ctx.src_eui, ctx.inc);
    }

    let dst_multicast = ctx.ipv6_dst().is_multicast();
    ctx.out = if dst_multicast {
        Interface::Undefined
    } else {
        gw.bridge.lookup(ctx.dst_eui).unwrap_or(Interface::Undefined)
    };

    let next_header = ctx.next_header();
    if next_header != ICMPV6_NEXT_HEADER && next_header != UDP_NEXT_HEADER {
        tracing::trace!(next_header, "dispatcher: dropping non-udp non-icmpv6 traffic");
        return vec![];
    }

    if ctx.out != Interface::Undefined && ctx.out == ctx.inc {
        tracing::trace!("dispatcher: dropping reflected packet");
        return vec![];
    }

    if next_header == ICMPV6_NEXT_HEADER {
        let touches_lowpan = ctx.inc == Interface::LowPan || ctx.out == Interface::LowPan;
        if ctx.out != Interface::Undefined && !touches_lowpan {
            // Ethernet<->Local: forward unchanged, no proxying.
            return vec![Emission { iface: ctx.out, ctx }];
        }
        return ndproxy::handle(gw, ctx, now, cfg);
    }

    if ctx.out != Interface::Undefined {
        return vec![Emission { iface: ctx.out, ctx }];
    }
    flood(&ctx)
}

/// An address-independent copy of `ctx`: a fresh `Vec<u8>` for the buffer,
/// everything else unchanged. Used wherever one inbound event must produce
/// more than one outbound packet, since each emitted packet owns its buffer
/// independently rather than sharing and restoring a single one.
pub fn clone_ctx(ctx: &PacketContext) -> PacketContext {
    PacketContext {
        buf: ctx.buf.clone(),
        inc: ctx.inc,
        out: ctx.out,
        src_eui: ctx.src_eui,
        dst_eui: ctx.dst_eui,
    }
}

/// A clone of `ctx` redirected at a specific egress interface and
/// destination link address, for per-neighbor unicast fan-out.
pub fn retarget(ctx: &PacketContext, iface: Interface, dst_eui: Eui64) -> PacketContext {
    let mut c = clone_ctx(ctx);
    c.out = iface;
    c.dst_eui = dst_eui;
    c
}

fn flood(ctx: &PacketContext) -> Vec<Emission> {
    Interface::others(ctx.inc)
        .into_iter()
        .map(|iface| {
            let mut c = clone_ctx(ctx);
            c.out = iface;
            Emission { iface, ctx: c }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::Ipv6Addr;
    use crate::config::Config;
    use crate::gateway::Gateway;
    use crate::packet::build_ns;
    use std::net::Ipv6Addr as StdV6;

    fn ip(s: &str) -> Ipv6Addr {
        let a: StdV6 = s.parse().unwrap();
        Ipv6Addr::from_bytes(&a.octets())
    }

    fn eui(n: u8) -> Eui64 {
        Eui64::new([0, 0, 0, 0, 0, 0, 0, n])
    }

    fn udp_packet(dst_eui: Eui64, inc: Interface) -> PacketContext {
        let mut buf = build_ns(&ip("2001:db8::1"), &ip("2001:db8::2"), &ip("2001:db8::2"), &[]);
        buf[crate::packet::IPV6_NEXT_HEADER_OFFSET] = UDP_NEXT_HEADER;
        PacketContext::new(buf, inc, eui(1), dst_eui)
    }

    #[test]
    fn unknown_unicast_udp_floods_other_interfaces() {
        let cfg = Config::default();
        let mut gw = Gateway::new(cfg.clone(), eui(0xee));
        let ctx = udp_packet(eui(2), Interface::LowPan);
        let emissions = dispatch(&mut gw, ctx, GwInstant::ZERO, &cfg);
        assert_eq!(emissions.len(), 2);
        assert!(emissions.iter().any(|e| e.iface == Interface::Ethernet));
        assert!(emissions.iter().any(|e| e.iface == Interface::Local));
    }

    #[test]
    fn known_unicast_udp_forwards_to_learned_interface() {
        let cfg = Config::default();
        let mut gw = Gateway::new(cfg.clone(), eui(0xee));
        gw.bridge.learn(eui(2), Interface::Ethernet);
        let ctx = udp_packet(eui(2), Interface::LowPan);
        let emissions = dispatch(&mut gw, ctx, GwInstant::ZERO, &cfg);
        assert_eq!(emissions.len(), 1);
        assert_eq!(emissions[0].iface, Interface::Ethernet);
    }

    #[test]
    fn reflection_toward_the_incoming_interface_is_dropped() {
        let cfg = Config::default();
        let mut gw = Gateway::new(cfg.clone(), eui(0xee));
        gw.bridge.learn(eui(2), Interface::LowPan);
        let ctx = udp_packet(eui(2), Interface::LowPan);
        assert!(dispatch(&mut gw, ctx, GwInstant::ZERO, &cfg).is_empty());
    }

    #[test]
    fn non_udp_non_icmpv6_traffic_is_dropped() {
        let cfg = Config::default();
        let mut gw = Gateway::new(cfg.clone(), eui(0xee));
        let mut buf = build_ns(&ip("2001:db8::1"), &ip("2001:db8::2"), &ip("2001:db8::2"), &[]);
        buf[crate::packet::IPV6_NEXT_HEADER_OFFSET] = 6; // TCP
        let ctx = PacketContext::new(buf, Interface::LowPan, eui(1), eui(2));
        assert!(dispatch(&mut gw, ctx, GwInstant::ZERO, &cfg).is_empty());
    }

    #[test]
    fn icmpv6_purely_between_ethernet_and_local_forwards_without_proxying() {
        let cfg = Config::default();
        let mut gw = Gateway::new(cfg.clone(), eui(0xee));
        gw.bridge.learn(eui(2), Interface::Local);
        let buf = build_ns(&ip("2001:db8::1"), &ip("2001:db8::2"), &ip("2001:db8::2"), &[]);
        let ctx = PacketContext::new(buf, Interface::Ethernet, eui(1), eui(2));
        let emissions = dispatch(&mut gw, ctx, GwInstant::ZERO, &cfg);
        assert_eq!(emissions.len(), 1);
        assert_eq!(emissions[0].iface, Interface::Local);
    }
}
