//! The ND proxy: NS/NA/RS/RA handlers and proxy-DAD.
//!
//! Grounded on `examples/original_source/.../pgw.c` (`proxy_ns_input`,
//! `proxy_na_input`, `proxy_rs_input`, `proxy_ra_input`, `pgw_dad`) for the
//! per-message-type branching on `incoming_if`/`outgoing_if`, per SPEC_FULL.md
//! §4.6. Each handler returns the list of packets the dispatcher must emit
//! rather than mutating shared state — the generalization of §9's
//! `Drop | EmitOn | EmitFlood` action enum this crate adopts, since several
//! paths (RA fan-out, proxy-DAD) must emit more than one packet per event.

pub mod dad;
pub mod na;
pub mod ns;
pub mod ra;
pub mod rs;

use crate::clock::GwInstant;
use crate::config::Config;
use crate::dispatcher::Emission;
use crate::gateway::Gateway;
use crate::packet::PacketContext;
use smoltcp::wire::Icmpv6Message;

pub fn handle(gw: &mut Gateway, ctx: PacketContext, now: GwInstant, cfg: &Config) -> Vec<Emission> {
    let icmp_type = ctx.icmp_type();
    let _span = tracing::debug_span!("ndproxy", inc = ?ctx.inc, out = ?ctx.out, icmp_type).entered();

    if icmp_type == u8::from(Icmpv6Message::Redirect) {
        tracing::trace!("dropping redirect");
        return vec![];
    }
    if icmp_type == u8::from(Icmpv6Message::NeighborSolicit) {
        return ns::handle(gw, ctx, now, cfg);
    }
    if icmp_type == u8::from(Icmpv6Message::NeighborAdvert) {
        return na::handle(gw, ctx, now, cfg);
    }
    if icmp_type == u8::from(Icmpv6Message::RouterSolicit) {
        return rs::handle(gw, ctx, now, cfg);
    }
    if icmp_type == u8::from(Icmpv6Message::RouterAdvert) {
        return ra::handle(gw, ctx, now, cfg);
    }
    tracing::trace!("unhandled icmpv6 type, dropping");
    vec![]
}
