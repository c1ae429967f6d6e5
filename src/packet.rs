//! The shared packet buffer, its fixed-offset accessors, and typed builders
//! for NS/NA/RS/RA messages.
//!
//! Per SPEC_FULL.md §9's design note, the buffer is re-expressed as an
//! explicit value (`PacketContext`) rather than the source's global
//! `uip_buf`/`uip_len` pair plus `incoming_if`/`outgoing_if`/`src_eui64`/
//! `dst_eui64` globals. `buf` holds exactly the IPv6 datagram (starting at
//! the IPv6 header) — it carries no Ethernet or 802.15.4 framing, matching
//! the source's own `uip_buf`, which begins at the IPv6 header with link
//! addresses tracked separately. L2 framing is the driver contract's concern
//! (§6), not the core's.
//!
//! `Vec<u8>` already tracks its own length, so the source's separate `len`
//! field is dropped as redundant in Rust — noted in DESIGN.md.
//!
//! Grounded on `examples/MalteJ-mvirt/mvirt-net/src/dataplane/ndp.rs` for the
//! builder-returns-`Vec<u8>` shape, generalized here to hand-rolled option
//! placement since `smoltcp::wire::NdiscRepr` has no representation for
//! ARO/6CO.

use crate::addr::{Eui64, Interface, Ipv6Addr};
use crate::checksum::icmpv6_checksum;
use smoltcp::wire::Icmpv6Message;

pub const IPV6_HDR_LEN: usize = 40;
pub const IPV6_PAYLOAD_LEN_OFFSET: usize = 4;
pub const IPV6_NEXT_HEADER_OFFSET: usize = 6;
pub const IPV6_HOP_LIMIT_OFFSET: usize = 7;
pub const IPV6_SRC_OFFSET: usize = 8;
pub const IPV6_DST_OFFSET: usize = 24;
pub const ICMP_TYPE_OFFSET: usize = IPV6_HDR_LEN;
pub const ICMP_CODE_OFFSET: usize = IPV6_HDR_LEN + 1;
pub const ICMP_CHECKSUM_OFFSET: usize = IPV6_HDR_LEN + 2;
pub const ICMP_BODY_OFFSET: usize = IPV6_HDR_LEN + 4;

pub const ICMPV6_NEXT_HEADER: u8 = 58;
pub const DEFAULT_HOP_LIMIT: u8 = 255;

pub const NS_BODY_LEN: usize = 20; // reserved(4) + target(16)
pub const NA_BODY_LEN: usize = 20; // flags+reserved(4) + target(16)
pub const RS_BODY_LEN: usize = 4; // reserved(4)
pub const RA_BODY_LEN: usize = 12; // hop_limit(1) flags(1) lifetime(2) reachable(4) retrans(4)

pub const NA_FLAG_ROUTER: u8 = 0x80;
pub const NA_FLAG_SOLICITED: u8 = 0x40;
pub const NA_FLAG_OVERRIDE: u8 = 0x20;

/// The threaded-through per-packet context: the datagram plus the interface
/// pair and link addresses it arrived/will leave with.
#[derive(Debug)]
pub struct PacketContext {
    pub buf: Vec<u8>,
    pub inc: Interface,
    pub out: Interface,
    pub src_eui: Eui64,
    pub dst_eui: Eui64,
}

impl PacketContext {
    pub fn new(buf: Vec<u8>, inc: Interface, src_eui: Eui64, dst_eui: Eui64) -> Self {
        PacketContext {
            buf,
            inc,
            out: Interface::Undefined,
            src_eui,
            dst_eui,
        }
    }

    pub fn ipv6_src(&self) -> Ipv6Addr {
        Ipv6Addr::from_bytes(&self.buf[IPV6_SRC_OFFSET..IPV6_SRC_OFFSET + 16])
    }

    pub fn ipv6_dst(&self) -> Ipv6Addr {
        Ipv6Addr::from_bytes(&self.buf[IPV6_DST_OFFSET..IPV6_DST_OFFSET + 16])
    }

    pub fn set_ipv6_dst(&mut self, addr: &Ipv6Addr) {
        self.buf[IPV6_DST_OFFSET..IPV6_DST_OFFSET + 16].copy_from_slice(addr.as_bytes());
    }

    pub fn next_header(&self) -> u8 {
        self.buf[IPV6_NEXT_HEADER_OFFSET]
    }

    pub fn icmp_type(&self) -> u8 {
        self.buf[ICMP_TYPE_OFFSET]
    }

    pub fn icmp_body(&self) -> &[u8] {
        &self.buf[ICMP_BODY_OFFSET..]
    }

    /// Recomputes and stores the ICMPv6 checksum over the current buffer
    /// contents. Must be called after every in-place edit, per §4.3.
    pub fn fix_checksum(&mut self) {
        self.buf[ICMP_CHECKSUM_OFFSET] = 0;
        self.buf[ICMP_CHECKSUM_OFFSET + 1] = 0;
        let src = self.ipv6_src();
        let dst = self.ipv6_dst();
        let cs = icmpv6_checksum(&src, &dst, &self.buf[IPV6_HDR_LEN..]);
        self.buf[ICMP_CHECKSUM_OFFSET..ICMP_CHECKSUM_OFFSET + 2].copy_from_slice(&cs.to_be_bytes());
    }

    pub fn verify_checksum(&self) -> bool {
        let src = self.ipv6_src();
        let dst = self.ipv6_dst();
        icmpv6_checksum(&src, &dst, &self.buf[IPV6_HDR_LEN..]) == 0
    }
}

fn write_ipv6_header(buf: &mut Vec<u8>, src: &Ipv6Addr, dst: &Ipv6Addr, payload_len: u16, hop_limit: u8) {
    buf.resize(IPV6_HDR_LEN, 0);
    buf[0] = 0x60; // version 6, traffic class/flow label left zero
    buf[IPV6_PAYLOAD_LEN_OFFSET..IPV6_PAYLOAD_LEN_OFFSET + 2].copy_from_slice(&payload_len.to_be_bytes());
    buf[IPV6_NEXT_HEADER_OFFSET] = ICMPV6_NEXT_HEADER;
    buf[IPV6_HOP_LIMIT_OFFSET] = hop_limit;
    buf[IPV6_SRC_OFFSET..IPV6_SRC_OFFSET + 16].copy_from_slice(src.as_bytes());
    buf[IPV6_DST_OFFSET..IPV6_DST_OFFSET + 16].copy_from_slice(dst.as_bytes());
}

fn finish(mut buf: Vec<u8>, icmp_type: Icmpv6Message, src: &Ipv6Addr, dst: &Ipv6Addr) -> Vec<u8> {
    let payload_len = (buf.len() - IPV6_HDR_LEN) as u16;
    buf[IPV6_PAYLOAD_LEN_OFFSET..IPV6_PAYLOAD_LEN_OFFSET + 2].copy_from_slice(&payload_len.to_be_bytes());
    buf[ICMP_TYPE_OFFSET] = u8::from(icmp_type);
    buf[ICMP_CHECKSUM_OFFSET] = 0;
    buf[ICMP_CHECKSUM_OFFSET + 1] = 0;
    let cs = icmpv6_checksum(src, dst, &buf[IPV6_HDR_LEN..]);
    buf[ICMP_CHECKSUM_OFFSET..ICMP_CHECKSUM_OFFSET + 2].copy_from_slice(&cs.to_be_bytes());
    buf
}

/// Builds a bare Neighbor Solicitation with the given options appended.
pub fn build_ns(src: &Ipv6Addr, dst: &Ipv6Addr, target: &Ipv6Addr, options: &[&[u8]]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(IPV6_HDR_LEN + 4 + NS_BODY_LEN + 32);
    write_ipv6_header(&mut buf, src, dst, 0, DEFAULT_HOP_LIMIT);
    buf.resize(ICMP_BODY_OFFSET, 0);
    buf.extend_from_slice(&[0u8; 4]); // reserved
    buf.extend_from_slice(target.as_bytes());
    for opt in options {
        buf.extend_from_slice(opt);
    }
    finish(buf, Icmpv6Message::NeighborSolicit, src, dst)
}

/// Builds a Neighbor Advertisement with the given flags, target, and options.
pub fn build_na(src: &Ipv6Addr, dst: &Ipv6Addr, target: &Ipv6Addr, flags: u8, options: &[&[u8]]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(IPV6_HDR_LEN + 4 + NA_BODY_LEN + 32);
    write_ipv6_header(&mut buf, src, dst, 0, DEFAULT_HOP_LIMIT);
    buf.resize(ICMP_BODY_OFFSET, 0);
    buf.extend_from_slice(&[flags, 0, 0, 0]);
    buf.extend_from_slice(target.as_bytes());
    for opt in options {
        buf.extend_from_slice(opt);
    }
    finish(buf, Icmpv6Message::NeighborAdvert, src, dst)
}

/// Builds a bare Router Solicitation.
pub fn build_rs(src: &Ipv6Addr, dst: &Ipv6Addr, options: &[&[u8]]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(IPV6_HDR_LEN + 4 + RS_BODY_LEN + 16);
    write_ipv6_header(&mut buf, src, dst, 0, DEFAULT_HOP_LIMIT);
    buf.resize(ICMP_BODY_OFFSET, 0);
    buf.extend_from_slice(&[0u8; 4]);
    for opt in options {
        buf.extend_from_slice(opt);
    }
    finish(buf, Icmpv6Message::RouterSolicit, src, dst)
}

#[allow(clippy::too_many_arguments)]
pub fn build_ra(
    src: &Ipv6Addr,
    dst: &Ipv6Addr,
    cur_hop_limit: u8,
    flags: u8,
    router_lifetime: u16,
    reachable_time: u32,
    retrans_timer: u32,
    options: &[&[u8]],
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(IPV6_HDR_LEN + 4 + RA_BODY_LEN + 48);
    write_ipv6_header(&mut buf, src, dst, 0, DEFAULT_HOP_LIMIT);
    buf.resize(ICMP_BODY_OFFSET, 0);
    buf.push(cur_hop_limit);
    buf.push(flags);
    buf.extend_from_slice(&router_lifetime.to_be_bytes());
    buf.extend_from_slice(&reachable_time.to_be_bytes());
    buf.extend_from_slice(&retrans_timer.to_be_bytes());
    for opt in options {
        buf.extend_from_slice(opt);
    }
    finish(buf, Icmpv6Message::RouterAdvert, src, dst)
}

/// The solicited-node multicast address for `target`: `ff02::1:ffXX:XXXX`.
pub fn solicited_node_multicast(target: &Ipv6Addr) -> Ipv6Addr {
    let t = target.as_bytes();
    let mut out = [0u8; 16];
    out[0] = 0xff;
    out[1] = 0x02;
    out[11] = 0x01;
    out[12] = 0xff;
    out[13] = t[13];
    out[14] = t[14];
    out[15] = t[15];
    Ipv6Addr::from_bytes(&out)
}

pub const LINK_LOCAL_ALL_NODES: [u8; 16] = [0xff, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];

pub fn link_local_all_nodes() -> Ipv6Addr {
    Ipv6Addr::from_bytes(&LINK_LOCAL_ALL_NODES)
}

pub fn is_unspecified(addr: &Ipv6Addr) -> bool {
    addr.as_bytes().iter().all(|&b| b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{AroOption, ARO_SUCCESS};
    use std::net::Ipv6Addr as StdV6;

    fn ip(s: &str) -> Ipv6Addr {
        let a: StdV6 = s.parse().unwrap();
        Ipv6Addr::from_bytes(&a.octets())
    }

    #[test]
    fn build_ns_has_valid_checksum_and_body() {
        let src = ip("2001:db8::1");
        let dst = ip("ff02::1:ff00:1");
        let target = ip("2001:db8::2");
        let buf = build_ns(&src, &dst, &target, &[]);
        let ctx = PacketContext::new(buf, Interface::LowPan, Eui64::new([0; 8]), Eui64::new([0; 8]));
        assert!(ctx.verify_checksum());
        assert_eq!(ctx.icmp_type(), u8::from(Icmpv6Message::NeighborSolicit));
        assert_eq!(&ctx.icmp_body()[4..20], target.as_bytes());
    }

    #[test]
    fn build_na_with_aro_option_appends_and_checksums() {
        let src = ip("fe80::1");
        let dst = ip("2001:db8::1");
        let target = ip("2001:db8::1");
        let aro = AroOption {
            status: ARO_SUCCESS,
            lifetime_minutes: 10,
            eui64: Eui64::new([0, 7, 0x62, 0xff, 0xfe, 0, 0x11, 0x22]),
        };
        let encoded = aro.encode();
        let buf = build_na(&src, &dst, &target, NA_FLAG_ROUTER | NA_FLAG_SOLICITED | NA_FLAG_OVERRIDE, &[&encoded]);
        let ctx = PacketContext::new(buf, Interface::Ethernet, Eui64::new([0; 8]), Eui64::new([0; 8]));
        assert!(ctx.verify_checksum());
        assert_eq!(ctx.icmp_body()[0], NA_FLAG_ROUTER | NA_FLAG_SOLICITED | NA_FLAG_OVERRIDE);
        let opt_start = ICMP_BODY_OFFSET + NA_BODY_LEN;
        assert_eq!(ctx.buf[opt_start], crate::options::OPT_ARO);
    }

    #[test]
    fn solicited_node_multicast_matches_rfc_form() {
        let target = ip("2001:db8::1");
        let sn = solicited_node_multicast(&target);
        assert_eq!(&sn.as_bytes()[0..13], &[0xff, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0xff]);
        assert_eq!(&sn.as_bytes()[13..16], &target.as_bytes()[13..16]);
    }

    #[test]
    fn unspecified_address_detection() {
        assert!(is_unspecified(&ip("::")));
        assert!(!is_unspecified(&ip("::1")));
    }
}
