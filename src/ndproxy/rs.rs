//! Router Solicitation handling.
//!
//! A 6LoWPAN node's RS never reaches the real router: the gateway answers
//! directly from its cached RA state and, on the first sighting of the
//! node, opens a `GarbageCollectible` neighbor-cache entry for it — the
//! "known via RS, not yet registered" state named in SPEC_FULL.md §4.4.
//! Grounded on `examples/original_source/.../pgw.c`'s `proxy_rs_input`, per
//! §4.6.3.

use crate::addr::Interface;
use crate::clock::GwInstant;
use crate::config::Config;
use crate::dispatcher::Emission;
use crate::gateway::Gateway;
use crate::neighbor::NeighborState;
use crate::packet::{is_unspecified, PacketContext};

use super::ra;

pub fn handle(gw: &mut Gateway, ctx: PacketContext, now: GwInstant, cfg: &Config) -> Vec<Emission> {
    match ctx.inc {
        Interface::LowPan => handle_from_lowpan(gw, ctx, now, cfg),
        // The gateway is transparent on the Ethernet segment: RS there is
        // for the real router to answer.
        Interface::Ethernet | Interface::Local | Interface::Undefined => vec![],
    }
}

fn handle_from_lowpan(gw: &mut Gateway, ctx: PacketContext, now: GwInstant, cfg: &Config) -> Vec<Emission> {
    let src = ctx.ipv6_src();
    if !is_unspecified(&src) && gw.neighbors.lookup_by_ip(&src, now).is_none() {
        gw.neighbors.add(src, ctx.src_eui, NeighborState::GarbageCollectible, now, cfg);
        tracing::debug!(%src, "rs: learned neighbor via solicitation");
    }

    let Some(buf) = ra::synthesize_for(gw, &src, now) else {
        return vec![];
    };
    vec![Emission {
        iface: Interface::LowPan,
        ctx: PacketContext::new(buf, Interface::LowPan, ctx.dst_eui, ctx.src_eui),
    }]
}
