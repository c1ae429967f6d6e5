//! Scenario-level tests driving a `Gateway` end to end through `input`/`poll`,
//! the same way `main.rs` does, rather than calling handler functions directly.

use sixlp_gw::addr::{Eui64, Interface, Ipv6Addr, EUI64_MULTICAST};
use sixlp_gw::clock::GwInstant;
use sixlp_gw::config::Config;
use sixlp_gw::gateway::Gateway;
use sixlp_gw::neighbor::NeighborState;
use sixlp_gw::options::{
    encode_lladdr_option, walk_options, AroOption, ARO_DUPLICATE, OPT_6CO, OPT_PIO, OPT_SLLAO,
};
use sixlp_gw::packet::{
    build_na, build_ns, build_ra, link_local_all_nodes, solicited_node_multicast,
    ICMP_BODY_OFFSET, NA_BODY_LEN, NA_FLAG_OVERRIDE, NA_FLAG_SOLICITED, RA_BODY_LEN,
};
use std::net::Ipv6Addr as StdV6;
use std::time::Duration;

fn ip(s: &str) -> Ipv6Addr {
    let a: StdV6 = s.parse().unwrap();
    Ipv6Addr::from_bytes(&a.octets())
}

fn eui(n: u8) -> Eui64 {
    Eui64::new([0, 0, 0, 0, 0, 0, 0, n])
}

const ARO_STATUS_OFFSET_IN_REGISTRATION_NA: usize = ICMP_BODY_OFFSET + NA_BODY_LEN + 16 + 2;

fn pio_option(prefix: &Ipv6Addr, prefix_len_bits: u8, on_link: bool) -> Vec<u8> {
    let mut v = vec![0u8; 32];
    v[0] = OPT_PIO;
    v[1] = 4;
    v[2] = prefix_len_bits;
    v[3] = if on_link { 0x80 } else { 0 };
    v[16..32].copy_from_slice(prefix.as_bytes());
    v
}

#[test]
fn registration_success_then_duplicate_then_dad_failure_then_address_resolution() {
    let cfg = Config::default();
    let mut gw = Gateway::new(cfg.clone(), eui(0xee));
    let rr_ip = ip("2001:db8::100");
    let rr_eui = eui(1);
    gw.rr_ip = Some(rr_ip);
    gw.rr_eui = Some(rr_eui);

    // --- Scenario 1: registration success ---
    let a_eui = Eui64::new([0x00, 0x07, 0x62, 0xff, 0xfe, 0x00, 0x11, 0x22]);
    let a_ip = ip("2001:db8::1");
    let sllao_a = encode_lladdr_option(OPT_SLLAO, a_eui, true);
    let aro_a = AroOption { status: 0, lifetime_minutes: 10, eui64: a_eui }.encode();
    let ns_a = build_ns(&a_ip, &rr_ip, &rr_ip, &[&sllao_a, &aro_a]);

    let emissions = gw.input(ns_a, Interface::LowPan, a_eui, rr_eui, GwInstant::ZERO);
    assert_eq!(emissions.len(), 1);
    let dad_probe = &emissions[0];
    assert_eq!(dad_probe.iface, Interface::Ethernet);
    assert!(sixlp_gw::packet::is_unspecified(&dad_probe.ctx.ipv6_src()));
    assert_eq!(dad_probe.ctx.ipv6_dst(), solicited_node_multicast(&a_ip));
    assert_eq!(&dad_probe.ctx.icmp_body()[4..20], a_ip.as_bytes());

    let idx_a = gw.neighbors.lookup_by_ip(&a_ip, GwInstant::ZERO).unwrap();
    assert_eq!(gw.neighbors.get(idx_a).unwrap().state, NeighborState::Tentative);

    let dad_deadline = gw.neighbors.get(idx_a).unwrap().dad_deadline;
    let emissions = gw.poll(dad_deadline);
    assert_eq!(emissions.len(), 1);
    let reg_na = &emissions[0];
    assert_eq!(reg_na.iface, Interface::LowPan);
    assert_eq!(
        reg_na.ctx.icmp_body()[0],
        NA_FLAG_OVERRIDE | NA_FLAG_SOLICITED | sixlp_gw::packet::NA_FLAG_ROUTER
    );
    assert_eq!(reg_na.ctx.buf[ARO_STATUS_OFFSET_IN_REGISTRATION_NA], 0);

    let entry = *gw.neighbors.get(idx_a).unwrap();
    assert_eq!(entry.state, NeighborState::Registered);
    assert_eq!(entry.reachable_deadline, dad_deadline.checked_add(Duration::from_secs(600)));

    // --- Scenario 2: duplicate rejection ---
    let b_eui = eui(5);
    let sllao_b = encode_lladdr_option(OPT_SLLAO, b_eui, true);
    let aro_b = AroOption { status: 0, lifetime_minutes: 10, eui64: b_eui }.encode();
    let ns_b = build_ns(&a_ip, &rr_ip, &rr_ip, &[&sllao_b, &aro_b]);

    let emissions = gw.input(ns_b, Interface::LowPan, b_eui, rr_eui, dad_deadline);
    assert_eq!(emissions.len(), 1);
    assert_eq!(emissions[0].iface, Interface::LowPan);
    assert_eq!(emissions[0].ctx.buf[ARO_STATUS_OFFSET_IN_REGISTRATION_NA], ARO_DUPLICATE);

    let entry = *gw.neighbors.get(idx_a).unwrap();
    assert_eq!(entry.lladdr, a_eui);
    assert_eq!(entry.state, NeighborState::Registered);

    // --- Scenario 3: DAD failure ---
    let c_eui = eui(7);
    let c_ip = ip("2001:db8::7");
    let sllao_c = encode_lladdr_option(OPT_SLLAO, c_eui, true);
    let aro_c = AroOption { status: 0, lifetime_minutes: 10, eui64: c_eui }.encode();
    let ns_c = build_ns(&c_ip, &rr_ip, &rr_ip, &[&sllao_c, &aro_c]);
    let emissions = gw.input(ns_c, Interface::LowPan, c_eui, rr_eui, dad_deadline);
    assert_eq!(emissions.len(), 1);
    let idx_c = gw.neighbors.lookup_by_ip(&c_ip, dad_deadline).unwrap();
    assert_eq!(gw.neighbors.get(idx_c).unwrap().state, NeighborState::Tentative);

    let defending_na = build_na(&ip("fe80::9"), &link_local_all_nodes(), &c_ip, 0, &[]);
    let emissions = gw.input(defending_na, Interface::Ethernet, eui(9), EUI64_MULTICAST, dad_deadline);
    assert_eq!(emissions.len(), 1);
    assert_eq!(emissions[0].iface, Interface::LowPan);
    assert_eq!(emissions[0].ctx.buf[ARO_STATUS_OFFSET_IN_REGISTRATION_NA], ARO_DUPLICATE);
    assert!(gw.neighbors.get(idx_c).is_none());

    // --- Scenario 4: address resolution from Ethernet ---
    let h_eui = eui(55);
    let h_ip = ip("2001:db8::55");
    let ns_from_host = build_ns(&h_ip, &solicited_node_multicast(&a_ip), &a_ip, &[]);
    let emissions = gw.input(ns_from_host, Interface::Ethernet, h_eui, EUI64_MULTICAST, dad_deadline);
    assert_eq!(emissions.len(), 1);
    let resolved = &emissions[0];
    assert_eq!(resolved.iface, Interface::Ethernet);
    assert_eq!(resolved.ctx.src_eui, a_eui);
    assert_eq!(resolved.ctx.dst_eui, h_eui);
    assert_eq!(&resolved.ctx.icmp_body()[4..20], a_ip.as_bytes());
    assert_eq!(resolved.ctx.icmp_body()[0], NA_FLAG_OVERRIDE | NA_FLAG_SOLICITED);
}

#[test]
fn ra_with_new_prefix_creates_context_floods_then_promotes_to_compress() {
    let cfg = Config::default();
    let mut gw = Gateway::new(cfg.clone(), eui(0xee));
    let prefix = ip("2001:db8::");
    let pio = pio_option(&prefix, 64, true);
    let ra = build_ra(&ip("fe80::1"), &link_local_all_nodes(), 64, 0, 1800, 0, 0, &[&pio]);

    let emissions = gw.input(ra, Interface::Ethernet, eui(1), EUI64_MULTICAST, GwInstant::ZERO);
    assert_eq!(emissions.len(), 2);
    assert!(emissions.iter().all(|e| e.ctx.verify_checksum()));

    let entry = *gw.contexts.lookup_by_id(0).unwrap();
    assert_eq!(entry.prefix_len_bits, 64);
    assert_eq!(entry.vlifetime_deadline, GwInstant::ZERO.checked_add(Duration::from_secs(600)));

    let opt_start = ICMP_BODY_OFFSET + RA_BODY_LEN;
    let to_lowpan = emissions.iter().find(|e| e.iface == Interface::LowPan).unwrap();
    let views = walk_options(&to_lowpan.ctx.buf, opt_start).unwrap();
    assert!(views.iter().any(|v| v.opt_type == OPT_6CO));
    let pio_view = views.iter().find(|v| v.opt_type == OPT_PIO).unwrap();
    assert_eq!(to_lowpan.ctx.buf[pio_view.offset + 3] & 0x80, 0);

    // advance past the initial context lifetime: promotion to InUseCompress
    // fires a spontaneous re-announcement out of poll() alone.
    let deadline = entry.vlifetime_deadline;
    let emissions = gw.poll(deadline);
    assert_eq!(emissions.len(), 2);
    assert!(emissions.iter().any(|e| e.iface == Interface::LowPan));
    assert!(emissions.iter().any(|e| e.iface == Interface::Local));

    let promoted = *gw.contexts.lookup_by_id(0).unwrap();
    assert_eq!(promoted.state, sixlp_gw::context::ContextState::InUseCompress);
    assert_eq!(promoted.vlifetime_deadline, deadline.checked_add(Duration::from_secs(3600)));
}

#[test]
fn rs_pending_fan_out_sends_one_unicast_ra_per_pending_neighbor() {
    let cfg = Config::default();
    let mut gw = Gateway::new(cfg.clone(), eui(0xee));
    let prefix = ip("2001:db8::");
    let pio = pio_option(&prefix, 64, true);
    let ra = build_ra(&ip("fe80::1"), &link_local_all_nodes(), 64, 0, 1800, 0, 0, &[&pio]);

    gw.input(ra.clone(), Interface::Ethernet, eui(1), EUI64_MULTICAST, GwInstant::ZERO);
    let initial_deadline = gw.contexts.lookup_by_id(0).unwrap().vlifetime_deadline;
    gw.poll(initial_deadline); // promotes the context to InUseCompress

    let a_idx = gw.neighbors.add(ip("2001:db8::10"), eui(10), NeighborState::Registered, initial_deadline, &cfg).unwrap();
    gw.neighbors.get_mut(a_idx).unwrap().ra_pending = true;
    let b_idx = gw.neighbors.add(ip("2001:db8::11"), eui(11), NeighborState::Registered, initial_deadline, &cfg).unwrap();
    gw.neighbors.get_mut(b_idx).unwrap().ra_pending = true;

    // a same-prefix refresh RA while the context is already InUseCompress
    // neither creates nor changes a context, so the unicast-fan-out branch
    // of `ra::announce` runs instead of the flood branch.
    let refresh = build_ra(&ip("fe80::1"), &link_local_all_nodes(), 64, 0, 1800, 0, 0, &[&pio]);
    let emissions = gw.input(refresh, Interface::Ethernet, eui(1), EUI64_MULTICAST, initial_deadline);

    assert_eq!(emissions.len(), 2);
    assert!(emissions.iter().all(|e| e.iface == Interface::LowPan));
    let dst_euis: Vec<Eui64> = emissions.iter().map(|e| e.ctx.dst_eui).collect();
    assert!(dst_euis.contains(&eui(10)));
    assert!(dst_euis.contains(&eui(11)));

    assert!(!gw.neighbors.get(a_idx).unwrap().ra_pending);
    assert!(!gw.neighbors.get(b_idx).unwrap().ra_pending);
}
