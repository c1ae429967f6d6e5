//! I/O abstraction the binary plugs concrete transports into. Grounded on
//! `examples/MalteJ-mvirt/mvirt-net/src/dataplane/backend.rs`'s
//! `ReactorBackend` trait, which abstracts packet I/O over vhost-user and
//! TUN the same way these three traits abstract it over Ethernet and
//! 802.15.4: the core never owns a socket or a file descriptor, only a
//! `Box<dyn Trait>` it calls into. Per SPEC_FULL.md §6 these are black-box
//! collaborators — `Gateway` never holds one; `main.rs` does, feeding raw
//! frames into `Gateway::input` and concrete driver calls out of its
//! `Vec<Emission>`.

use crate::addr::Eui64;

/// A raw link-layer transport: an Ethernet NIC or an 802.15.4 radio.
///
/// The Ethernet driver's `read` strips the 4-byte CRC; the 802.15.4
/// driver's `read` strips the 2-byte FCS. Neither driver parses payload —
/// framing is `LowpanFraming`'s job.
pub trait L2Driver {
    /// One-time setup (socket/fd creation, radio configuration). `false` on
    /// failure.
    fn init(&mut self) -> bool;

    /// Sends one raw link-layer frame. `false` on failure.
    fn send(&mut self, buf: &[u8]) -> bool;

    /// Whether a frame is available to `read` without blocking.
    fn pending(&self) -> bool;

    /// Reads one frame into `buf`, returning its length. `0` if none was
    /// pending.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Enables the underlying interface.
    fn on(&mut self);

    /// Disables it.
    fn off(&mut self);
}

/// Parses and builds 802.15.4 frames carrying 6LoWPAN payloads, in and out
/// of EUI-64 source/destination addressing.
pub trait LowpanFraming {
    /// Extracts `(src, dst, payload)` from a raw frame `L2Driver::read`
    /// produced. An all-zero receiver address denotes L2
    /// multicast/broadcast. `None` if the frame can't be parsed.
    fn parse<'a>(&self, frame: &'a [u8]) -> Option<(Eui64, Eui64, &'a [u8])>;

    /// Builds a frame addressed to `dst` (or L2-broadcast if `None`)
    /// carrying `payload`, writing it into `out` and returning its length.
    fn build(&self, dst: Option<Eui64>, payload: &[u8], out: &mut [u8]) -> usize;
}

/// The 6LoWPAN-side output path as the dispatcher sees it: hand over an
/// IPv6 datagram and an optional destination, let the driver below worry
/// about framing and fragmentation.
pub trait SixLowpanOutput {
    /// Sends `ipv6_frame` toward `dest`, or floods it if `dest` is `None`.
    /// `false` on failure.
    fn output(&mut self, dest: Option<Eui64>, ipv6_frame: &[u8]) -> bool;
}

/// A frame layout of `src(8) | dst(8) | payload`, with an all-zero `dst`
/// meaning broadcast. Used by `platform::SocketDriver`, which talks to Unix
/// datagram sockets rather than a NIC or a radio: the socket preserves
/// frame boundaries but carries no link address of its own, so the address
/// pair travels inside the frame instead of being read off the transport.
pub struct SocketFraming;

impl LowpanFraming for SocketFraming {
    fn parse<'a>(&self, frame: &'a [u8]) -> Option<(Eui64, Eui64, &'a [u8])> {
        if frame.len() < 16 {
            return None;
        }
        let mut src = [0u8; 8];
        let mut dst = [0u8; 8];
        src.copy_from_slice(&frame[0..8]);
        dst.copy_from_slice(&frame[8..16]);
        Some((Eui64::new(src), Eui64::new(dst), &frame[16..]))
    }

    fn build(&self, dst: Option<Eui64>, payload: &[u8], out: &mut [u8]) -> usize {
        let total = 16 + payload.len();
        if out.len() < total {
            return 0;
        }
        out[0..8].copy_from_slice(&[0u8; 8]);
        out[8..16].copy_from_slice(dst.unwrap_or(crate::addr::EUI64_MULTICAST).as_bytes());
        out[16..total].copy_from_slice(payload);
        total
    }
}
