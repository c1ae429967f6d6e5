//! Router Advertisement handling: prefix-driven context creation, and the
//! shared announcement fan-out used both by a real inbound RA and by a
//! spontaneous re-announcement `Gateway::poll` triggers when a context
//! transition changes what the network should advertise.
//!
//! Grounded on `examples/original_source/.../pgw.c`'s `proxy_ra_input` and
//! the RA-rebuilding half of `pgw_periodic`, per SPEC_FULL.md §4.6.4.

use crate::addr::{Eui64, Interface, Ipv6Addr, EUI64_MULTICAST};
use crate::clock::GwInstant;
use crate::config::Config;
use crate::context::{ContextEntry, ContextState};
use crate::dispatcher::{clone_ctx, retarget, Emission};
use crate::gateway::Gateway;
use crate::neighbor::NeighborState;
use crate::options::{adjust_ipv6_payload_len, encode_lladdr_option, rewrite_options, walk_options, SixCoOption, OPT_PIO, OPT_SLLAO};
use crate::packet::{build_ra, link_local_all_nodes, PacketContext, ICMP_BODY_OFFSET, IPV6_PAYLOAD_LEN_OFFSET, RA_BODY_LEN};

pub fn handle(gw: &mut Gateway, ctx: PacketContext, now: GwInstant, cfg: &Config) -> Vec<Emission> {
    match ctx.inc {
        Interface::Ethernet | Interface::Local => handle_from_ethernet(gw, ctx, now, cfg),
        Interface::LowPan | Interface::Undefined => vec![],
    }
}

fn handle_from_ethernet(gw: &mut Gateway, mut ctx: PacketContext, now: GwInstant, cfg: &Config) -> Vec<Emission> {
    if gw.rr_ip.is_none() {
        gw.rr_ip = Some(ctx.ipv6_src());
        gw.rr_eui = Some(ctx.src_eui);
        tracing::info!(rr_ip = %ctx.ipv6_src(), rr_eui = %ctx.src_eui, "ra: learned router");
    }

    let opt_start = ICMP_BODY_OFFSET + RA_BODY_LEN;
    let views = match walk_options(&ctx.buf, opt_start) {
        Ok(v) => v,
        Err(_) => return vec![],
    };

    let mut has_sllao = false;
    let mut pios = Vec::new();
    for v in &views {
        match v.opt_type {
            OPT_SLLAO => has_sllao = true,
            OPT_PIO if v.byte_len >= 32 => {
                let body = &ctx.buf[v.offset..v.offset + v.byte_len];
                let prefix_len_bits = body[2];
                let mut prefix_bytes = [0u8; 16];
                prefix_bytes.copy_from_slice(&body[16..32]);
                pios.push((Ipv6Addr::from_bytes(&prefix_bytes), prefix_len_bits));
            }
            _ => {}
        }
    }
    for (prefix, prefix_len_bits) in pios {
        gw.contexts.observe_prefix(prefix, prefix_len_bits, now, cfg);
    }

    if !has_sllao {
        append_option(&mut ctx.buf, &encode_lladdr_option(OPT_SLLAO, ctx.src_eui, false));
    }
    for entry in gw.contexts.active_contexts().copied().collect::<Vec<_>>() {
        append_option(&mut ctx.buf, &six_co_for(&entry, now));
    }

    announce(gw, ctx, cfg)
}

fn append_option(buf: &mut Vec<u8>, opt: &[u8]) {
    buf.extend_from_slice(opt);
    adjust_ipv6_payload_len(buf, IPV6_PAYLOAD_LEN_OFFSET, opt.len() as i32);
}

fn six_co_for(entry: &ContextEntry, now: GwInstant) -> Vec<u8> {
    SixCoOption {
        context_id: entry.context_id,
        compression_flag: entry.state == ContextState::InUseCompress,
        lifetime_minutes: remaining_minutes(entry.vlifetime_deadline, now),
        prefix: entry.prefix,
        prefix_len_bits: entry.prefix_len_bits,
    }
    .encode()
}

/// Clears the on-link flag (bit `0x80` of the PIO's flags byte) before an
/// RA reaches the LowPan segment, per SPEC_FULL.md §6: a 6LoWPAN node must
/// never treat the advertised prefix as on-link for L2 address resolution,
/// only for stateless autoconfiguration and compression.
fn clear_pio_onlink_flag(buf: &mut [u8], opt_start: usize) {
    if let Ok(views) = walk_options(buf, opt_start) {
        for v in views {
            if v.opt_type == OPT_PIO {
                buf[v.offset + 3] &= !0x80;
            }
        }
    }
}

fn remaining_minutes(deadline: GwInstant, now: GwInstant) -> u16 {
    let remaining_ms = deadline.0.saturating_sub(now.0);
    (remaining_ms / 60_000).min(u16::MAX as u64) as u16
}

/// The flood-on-context-change vs. unicast-on-ra-pending fan-out shared by
/// both an inbound-RA rebuild and a spontaneous poll-triggered one. Whether
/// the caller passes a fully assembled RA buffer already carrying the
/// SLLAO/6CO options appended for `ctx.inc`'s own width.
fn announce(gw: &mut Gateway, ctx: PacketContext, cfg: &Config) -> Vec<Emission> {
    let opt_start = ICMP_BODY_OFFSET + RA_BODY_LEN;

    if gw.contexts.changed() {
        gw.contexts.clear_changed();
        for (_, entry) in gw.neighbors.iter_mut() {
            entry.ra_pending = false;
        }
        let mut out = Vec::with_capacity(2);
        for iface in Interface::others(ctx.inc) {
            let mut clone = clone_ctx(&ctx);
            clone.out = iface;
            // A context-change RA is a flood, not a reply: it must carry the
            // all-nodes multicast destination regardless of whether the
            // triggering RA itself was unicast.
            clone.set_ipv6_dst(&link_local_all_nodes());
            clone.dst_eui = EUI64_MULTICAST;
            if rewrite_options(&mut clone.buf, IPV6_PAYLOAD_LEN_OFFSET, opt_start, iface, cfg.option_filtering, true).is_err() {
                continue;
            }
            if iface == Interface::LowPan {
                clear_pio_onlink_flag(&mut clone.buf, opt_start);
            }
            clone.fix_checksum();
            out.push(Emission { iface, ctx: clone });
        }
        out
    } else {
        let pending: Vec<(usize, Eui64)> = gw
            .neighbors
            .iter()
            .filter(|(_, e)| e.ra_pending && e.state == NeighborState::Registered)
            .map(|(i, e)| (i, e.lladdr))
            .collect();
        let mut out = Vec::with_capacity(pending.len());
        for (idx, lladdr) in pending {
            let mut clone = retarget(&ctx, Interface::LowPan, lladdr);
            if rewrite_options(&mut clone.buf, IPV6_PAYLOAD_LEN_OFFSET, opt_start, Interface::LowPan, cfg.option_filtering, true).is_err() {
                continue;
            }
            clear_pio_onlink_flag(&mut clone.buf, opt_start);
            clone.fix_checksum();
            out.push(Emission { iface: Interface::LowPan, ctx: clone });
            if let Some(e) = gw.neighbors.get_mut(idx) {
                e.ra_pending = false;
            }
        }
        out
    }
}

/// Synthesizes a fresh RA from cached router state, with no real inbound RA
/// driving it: used when `ContextTable::changed()` alone must trigger a
/// re-announcement during `Gateway::poll`. Returns nothing before any real
/// RA has ever been seen — contexts only exist after a PIO has been
/// processed from one, so `rr_ip`/`rr_eui` are always set by the time this
/// matters.
pub fn announce_from_poll(gw: &mut Gateway, now: GwInstant, cfg: &Config) -> Vec<Emission> {
    let Some(rr_eui) = gw.rr_eui else { return vec![] };
    let ll = rr_eui.to_link_local();

    let mut opts_buf = encode_lladdr_option(OPT_SLLAO, rr_eui, false);
    for entry in gw.contexts.active_contexts().copied().collect::<Vec<_>>() {
        opts_buf.extend_from_slice(&six_co_for(&entry, now));
    }

    let buf = build_ra(&ll, &link_local_all_nodes(), 0, 0, 0, 0, 0, &[&opts_buf]);
    let ctx = PacketContext::new(buf, Interface::Ethernet, rr_eui, Eui64::new([0; 8]));
    announce(gw, ctx, cfg)
}

/// Builds a unicast RA addressed directly to a 6LoWPAN node's own address,
/// used to answer its Router Solicitation directly rather than forwarding
/// the RS onward. `None` before any real RA has ever been seen.
pub fn synthesize_for(gw: &Gateway, dst: &Ipv6Addr, now: GwInstant) -> Option<Vec<u8>> {
    let rr_eui = gw.rr_eui?;
    let ll = rr_eui.to_link_local();
    let mut opts_buf = encode_lladdr_option(OPT_SLLAO, rr_eui, true);
    for entry in gw.contexts.active_contexts() {
        opts_buf.extend_from_slice(&six_co_for(entry, now));
    }
    Some(build_ra(&ll, dst, 0, 0, 0, 0, 0, &[&opts_buf]))
}
