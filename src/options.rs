//! ICMPv6 ND option wire formats and the in-place rewrite pipeline.
//!
//! Grounded on `examples/original_source/.../pgw_fwd.c` (`translate_icmp_lladdr`)
//! for the grow/shrink/memmove mechanics, `pgw.c` (`pgw_append_icmp_opt`) for
//! the ARO/6CO byte layouts, and SPEC_FULL.md §6 for the exact field widths.
//! `smoltcp` has no representation for ARO (type 131) or 6CO (type 32), so
//! this module walks the option TLV stream directly the way the original does,
//! rather than going through `smoltcp::wire::NdiscRepr`.

use crate::addr::{Eui64, EthMac, Interface, Ipv6Addr};
use crate::error::PacketError;

pub const OPT_SLLAO: u8 = 1;
pub const OPT_TLLAO: u8 = 2;
pub const OPT_PIO: u8 = 3;
pub const OPT_6CO: u8 = 32;
pub const OPT_ARO: u8 = 131;

pub const ARO_SUCCESS: u8 = 0;
pub const ARO_DUPLICATE: u8 = 1;
pub const ARO_RTR_NC_FULL: u8 = 2;

/// An Address Registration Option, RFC 6775 (wire type 131 per SPEC_FULL.md §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AroOption {
    pub status: u8,
    pub lifetime_minutes: u16,
    pub eui64: Eui64,
}

impl AroOption {
    pub const LEN_UNITS: u8 = 2;
    pub const BYTE_LEN: usize = 16;

    /// Parses an ARO option body starting at `buf[0]` (the `type` byte).
    /// Per §4.6.1, a received ARO with `len != 2` or `status != 0` is
    /// malformed.
    pub fn parse_incoming(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < Self::BYTE_LEN {
            return Err(PacketError::Truncated);
        }
        let len_units = buf[1];
        let status = buf[2];
        if len_units != Self::LEN_UNITS || status != 0 {
            return Err(PacketError::MalformedAro);
        }
        let lifetime_minutes = u16::from_be_bytes([buf[4], buf[5]]);
        let mut eui = [0u8; 8];
        eui.copy_from_slice(&buf[8..16]);
        Ok(AroOption {
            status,
            lifetime_minutes,
            eui64: Eui64::new(eui),
        })
    }

    /// Encodes a (possibly synthesized, status-bearing) ARO to append to an
    /// outgoing NS/NA.
    pub fn encode(&self) -> [u8; Self::BYTE_LEN] {
        let mut out = [0u8; Self::BYTE_LEN];
        out[0] = OPT_ARO;
        out[1] = Self::LEN_UNITS;
        out[2] = self.status;
        out[3] = 0;
        out[4..6].copy_from_slice(&self.lifetime_minutes.to_be_bytes());
        out[8..16].copy_from_slice(self.eui64.as_bytes());
        out
    }
}

/// A 6LoWPAN Context Option, RFC 6775 (wire type 32 per SPEC_FULL.md §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SixCoOption {
    pub context_id: u8,
    pub compression_flag: bool,
    pub lifetime_minutes: u16,
    pub prefix: Ipv6Addr,
    pub prefix_len_bits: u8,
}

impl SixCoOption {
    pub fn len_units(&self) -> u8 {
        if self.prefix_len_bits > 64 { 3 } else { 2 }
    }

    fn prefix_byte_len(&self) -> usize {
        // bit length, not byte length, per SPEC_FULL.md's correctness fix
        // over the original's memcpy.
        self.prefix_len_bits.div_ceil(8) as usize
    }

    pub fn encode(&self) -> Vec<u8> {
        let units = self.len_units();
        let mut out = vec![0u8; units as usize * 8];
        out[0] = OPT_6CO;
        out[1] = units;
        out[2] = self.prefix_len_bits;
        let c_bit = if self.compression_flag { 0x10 } else { 0 };
        out[3] = (self.context_id & 0x0f) | c_bit;
        out[4..6].copy_from_slice(&self.lifetime_minutes.to_be_bytes());
        let plen = self.prefix_byte_len();
        out[8..8 + plen].copy_from_slice(&self.prefix.as_bytes()[..plen]);
        out
    }

    pub fn parse(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < 16 {
            return Err(PacketError::Truncated);
        }
        let len_units = buf[1];
        if len_units != 2 && len_units != 3 {
            return Err(PacketError::Truncated);
        }
        let byte_len = len_units as usize * 8;
        if buf.len() < byte_len {
            return Err(PacketError::Truncated);
        }
        let prefix_len_bits = buf[2];
        let context_id = buf[3] & 0x0f;
        let compression_flag = buf[3] & 0x10 != 0;
        let lifetime_minutes = u16::from_be_bytes([buf[4], buf[5]]);
        let plen = prefix_len_bits.div_ceil(8) as usize;
        let mut prefix_bytes = [0u8; 16];
        prefix_bytes[..plen.min(16)].copy_from_slice(&buf[8..8 + plen.min(16)]);
        Ok(SixCoOption {
            context_id,
            compression_flag,
            lifetime_minutes,
            prefix: Ipv6Addr::from_bytes(&prefix_bytes),
            prefix_len_bits,
        })
    }
}

/// A decoded view of one option in the TLV stream: its type, its offset
/// within the buffer, and its length in bytes at the time it was observed.
#[derive(Clone, Copy, Debug)]
pub struct OptionView {
    pub opt_type: u8,
    pub offset: usize,
    pub byte_len: usize,
}

/// Walks the option TLV stream from `start` to `buf.len()`, returning a view
/// of each option without mutating anything. Aborts with `ZeroLengthOption`
/// on a `len == 0` option, matching §4.3's invariant.
pub fn walk_options(buf: &[u8], start: usize) -> Result<Vec<OptionView>, PacketError> {
    let mut views = Vec::new();
    let mut pos = start;
    while pos < buf.len() {
        if pos + 2 > buf.len() {
            return Err(PacketError::Truncated);
        }
        let opt_type = buf[pos];
        let len_units = buf[pos + 1];
        if len_units == 0 {
            return Err(PacketError::ZeroLengthOption);
        }
        let byte_len = len_units as usize * 8;
        if pos + byte_len > buf.len() {
            return Err(PacketError::Truncated);
        }
        views.push(OptionView { opt_type, offset: pos, byte_len });
        pos += byte_len;
    }
    Ok(views)
}

fn insert_bytes(buf: &mut Vec<u8>, at: usize, count: usize) {
    let old_len = buf.len();
    buf.resize(old_len + count, 0);
    buf.copy_within(at..old_len, at + count);
    buf[at..at + count].fill(0);
}

fn remove_bytes(buf: &mut Vec<u8>, at: usize, count: usize) {
    let old_len = buf.len();
    buf.copy_within(at + count..old_len, at);
    buf.truncate(old_len - count);
}

/// Builds a fresh SLLAO/TLLAO option (not a translation of an existing one)
/// for `eui`, at either Ethernet (6-octet) or LowPan (8-octet) native width.
pub fn encode_lladdr_option(opt_type: u8, eui: Eui64, lowpan_width: bool) -> Vec<u8> {
    if lowpan_width {
        let mut out = vec![0u8; 16];
        out[0] = opt_type;
        out[1] = 2;
        out[2..10].copy_from_slice(eui.as_bytes());
        out
    } else {
        let mac = eui.to_eth_mac();
        let mut out = vec![0u8; 8];
        out[0] = opt_type;
        out[1] = 1;
        out[2..8].copy_from_slice(mac.0.as_bytes());
        out
    }
}

pub(crate) fn adjust_ipv6_payload_len(buf: &mut [u8], field_offset: usize, delta: i32) {
    let cur = u16::from_be_bytes([buf[field_offset], buf[field_offset + 1]]);
    let new_len = (cur as i32 + delta) as u16;
    buf[field_offset..field_offset + 2].copy_from_slice(&new_len.to_be_bytes());
}

/// Rewrites every SLLAO/TLLAO option in place to match the egress link's
/// native address width, and — only when `filtering` is set and the message
/// is an RA bound for LowPan — strips every option except PIO and 6CO.
///
/// `ipv6_payload_len_offset` is the absolute offset of the 2-byte IPv6
/// payload-length field within `buf`; it is kept in sync with every grow,
/// shrink, or removal, per §4.3.
pub fn rewrite_options(
    buf: &mut Vec<u8>,
    ipv6_payload_len_offset: usize,
    opt_start: usize,
    target: Interface,
    filtering: bool,
    is_ra: bool,
) -> Result<(), PacketError> {
    let mut pos = opt_start;
    while pos < buf.len() {
        if pos + 2 > buf.len() {
            return Err(PacketError::Truncated);
        }
        let opt_type = buf[pos];
        let len_units = buf[pos + 1];
        if len_units == 0 {
            return Err(PacketError::ZeroLengthOption);
        }
        let byte_len = len_units as usize * 8;
        if pos + byte_len > buf.len() {
            return Err(PacketError::Truncated);
        }

        if filtering && is_ra && target == Interface::LowPan && opt_type != OPT_PIO && opt_type != OPT_6CO {
            remove_bytes(buf, pos, byte_len);
            adjust_ipv6_payload_len(buf, ipv6_payload_len_offset, -(byte_len as i32));
            // do not advance: the next option now sits at `pos`.
            continue;
        }

        if opt_type == OPT_SLLAO || opt_type == OPT_TLLAO {
            let addr_len = byte_len - 2;
            match (target, addr_len) {
                (Interface::LowPan, 6) => {
                    let mac = EthMac::new(buf[pos + 2..pos + 8].try_into().unwrap());
                    let eui = Eui64::from_eth_mac(&mac);
                    insert_bytes(buf, pos + byte_len, 8);
                    buf[pos + 1] = 2;
                    buf[pos + 2..pos + 10].copy_from_slice(eui.as_bytes());
                    buf[pos + 10..pos + 16].fill(0);
                    adjust_ipv6_payload_len(buf, ipv6_payload_len_offset, 8);
                    pos += 16;
                }
                (Interface::Ethernet, 8) => {
                    let mut eui_bytes = [0u8; 8];
                    eui_bytes.copy_from_slice(&buf[pos + 2..pos + 10]);
                    let mac = Eui64::new(eui_bytes).to_eth_mac();
                    remove_bytes(buf, pos + 8, 8);
                    buf[pos + 1] = 1;
                    buf[pos + 2..pos + 8].copy_from_slice(mac.0.as_bytes());
                    adjust_ipv6_payload_len(buf, ipv6_payload_len_offset, -8);
                    pos += 8;
                }
                _ => {
                    // already native width for the target link (or Local,
                    // which needs no translation): leave untouched.
                    pos += byte_len;
                }
            }
        } else {
            pos += byte_len;
        }
    }
    Ok(())
}
