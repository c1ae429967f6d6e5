//! Link-layer and network-layer address types and the bijection between them.
//!
//! Grounded on `examples/MalteJ-mvirt/mvirt-net/src/dataplane/packet.rs` for the
//! general shape of small `Copy` address newtypes wrapping `smoltcp` wire types,
//! and on `examples/original_source/.../pgw_fwd.c` (`create_6lowpan_lladdr`,
//! `create_ethernet_lladdr`) for the exact byte mapping.

use smoltcp::wire::{EthernetAddress, Ipv6Address};
use std::fmt;

/// An IEEE 802.15.4 extended (64-bit) address, used as the LowPan-side link-layer
/// identifier for every 6LoWPAN node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Eui64(pub [u8; 8]);

/// All-zero EUI-64 is reserved to mean "L2 multicast/broadcast"; it is never a
/// real node's address (invariant: BridgeTable never learns or matches it).
pub const EUI64_MULTICAST: Eui64 = Eui64([0; 8]);

impl Eui64 {
    pub const fn new(bytes: [u8; 8]) -> Self {
        Eui64(bytes)
    }

    pub fn is_multicast(&self) -> bool {
        *self == EUI64_MULTICAST
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Ethernet-48 → EUI-64, inserting the `ff:fe` mid-bytes.
    ///
    /// `eth[0..3] = eui[0..3]`, `eth[3..6] = eui[5..8]`; the reverse direction
    /// fills in `eui[3] = 0xff`, `eui[4] = 0xfe`. No U/L bit is touched here —
    /// that XOR belongs only to link-local IPv6 derivation (`to_link_local`).
    pub fn from_eth_mac(mac: &EthMac) -> Self {
        let m = mac.0.as_bytes();
        Eui64([m[0], m[1], m[2], 0xff, 0xfe, m[3], m[4], m[5]])
    }

    /// EUI-64 → Ethernet-48, dropping the `ff:fe` mid-bytes.
    pub fn to_eth_mac(&self) -> EthMac {
        let e = &self.0;
        EthMac(EthernetAddress([e[0], e[1], e[2], e[5], e[6], e[7]]))
    }

    /// Derive the `fe80::/64` link-local IPv6 address for this identifier,
    /// XORing the universal/local bit in octet 8 (RFC 4291 §2.5.1 modified
    /// EUI-64 format).
    pub fn to_link_local(&self) -> Ipv6Addr {
        let mut bytes = [0u8; 16];
        bytes[0] = 0xfe;
        bytes[1] = 0x80;
        bytes[8] = self.0[0] ^ 0x02;
        bytes[9..16].copy_from_slice(&self.0[1..8]);
        Ipv6Address::from_bytes(&bytes)
    }
}

impl std::str::FromStr for Eui64 {
    type Err = String;

    /// Parses eight colon-separated hex octets, e.g. `02:00:00:00:00:00:00:01`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 8];
        let mut parts = s.split(':');
        for b in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| format!("too few octets in {s:?}"))?;
            *b = u8::from_str_radix(part, 16).map_err(|e| format!("{part:?}: {e}"))?;
        }
        if parts.next().is_some() {
            return Err(format!("too many octets in {s:?}"));
        }
        Ok(Eui64(bytes))
    }
}

impl fmt::Debug for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

/// A 6-octet Ethernet hardware address. Thin wrapper so the `Eui64` <-> `EthMac`
/// conversions stay directional and cannot be mixed up with a raw `[u8; 6]`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EthMac(pub EthernetAddress);

impl EthMac {
    pub const BROADCAST: EthMac = EthMac(EthernetAddress([0xff; 6]));

    pub fn new(bytes: [u8; 6]) -> Self {
        EthMac(EthernetAddress(bytes))
    }

    pub fn is_multicast(&self) -> bool {
        self.0.is_multicast()
    }
}

impl fmt::Debug for EthMac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type Ipv6Addr = Ipv6Address;

/// The three logical interfaces a packet can arrive on or be sent out of, plus
/// the `Undefined` egress tag meaning "flood to all but the incoming one".
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Interface {
    Undefined,
    Ethernet,
    LowPan,
    Local,
}

impl Interface {
    /// The other "real" interface in the Ethernet/LowPan/Local triangle that
    /// isn't `self` and isn't `except`. Used by the Dispatcher's flood path,
    /// which always excludes exactly the incoming interface.
    pub fn others(except: Interface) -> [Interface; 2] {
        match except {
            Interface::LowPan => [Interface::Ethernet, Interface::Local],
            Interface::Ethernet => [Interface::LowPan, Interface::Local],
            Interface::Local => [Interface::LowPan, Interface::Ethernet],
            Interface::Undefined => [Interface::LowPan, Interface::Ethernet],
        }
    }
}
