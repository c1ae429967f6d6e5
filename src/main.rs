//! Binary entry point: the only place in this crate that touches actual
//! I/O. `Gateway` is driven entirely through `input()`/`poll()`; this loop
//! just reads frames off whatever `L2Driver` is wired up, hands them to the
//! gateway, and writes whatever `Emission`s come back out the named
//! interface's driver. Grounded on
//! `examples/MalteJ-mvirt/mvirt-net/src/main.rs`'s startup shape
//! (`tracing_subscriber::fmt::init()`, fail-fast on interface bring-up),
//! adapted from its async/tokio loop to a plain synchronous one per
//! SPEC_FULL.md §5's scheduling model, which carries no async runtime.

use clap::Parser;
use sixlp_gw::addr::{Eui64, EthMac, Interface};
use sixlp_gw::clock::GwInstant;
use sixlp_gw::config::Cli;
use sixlp_gw::dispatcher::Emission;
use sixlp_gw::driver::{L2Driver, LowpanFraming, SocketFraming};
use sixlp_gw::error::GatewayError;
use sixlp_gw::gateway::Gateway;
use sixlp_gw::platform::SocketDriver;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// 1280-byte MTU + Ethernet header room, per SPEC_FULL.md §4.3's buffer
/// invariant. Frames larger than this are dropped at the I/O boundary
/// rather than forwarded unchecked.
const MAX_FRAME_LEN: usize = 1294;

/// dst(6) + src(6) + ethertype(2).
const ETH_HEADER_LEN: usize = 14;
const ETHERTYPE_IPV6: u16 = 0x86dd;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = match cli.resolve() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };
    let own_eui: Eui64 = match cli.own_eui.parse() {
        Ok(e) => e,
        Err(e) => {
            error!(error = %e, "invalid --own-eui");
            std::process::exit(1);
        }
    };

    let mut eth = bind_or_exit(Interface::Ethernet, &cli.eth_local_socket, &cli.eth_peer_socket);
    let mut local = bind_or_exit(Interface::Local, &cli.local_local_socket, &cli.local_peer_socket);
    let mut lowpan = bind_or_exit(Interface::LowPan, &cli.lowpan_local_socket, &cli.lowpan_peer_socket);
    for (iface, drv) in [
        (Interface::Ethernet, &mut eth as &mut dyn L2Driver),
        (Interface::Local, &mut local as &mut dyn L2Driver),
        (Interface::LowPan, &mut lowpan as &mut dyn L2Driver),
    ] {
        if !drv.init() {
            error!(error = %GatewayError::InterfaceInitFailed(iface), "interface bring-up failed");
            std::process::exit(1);
        }
        drv.on();
    }

    info!(%own_eui, "6LoWPAN proxy gateway starting");
    let mut gw = Gateway::new(cfg.clone(), own_eui);
    let own_mac = own_eui.to_eth_mac();
    let lowpan_framing = SocketFraming;
    let start = Instant::now();
    let mut buf = [0u8; MAX_FRAME_LEN];

    loop {
        let now = GwInstant::from_millis(start.elapsed().as_millis() as u64);
        let mut emissions = Vec::new();
        let mut idle = true;

        if eth.pending() {
            idle = false;
            if let Some((payload, src, dst)) = read_ethernet(&mut eth, &mut buf) {
                emissions.extend(gw.input(payload, Interface::Ethernet, src, dst, now));
            }
        }
        if local.pending() {
            idle = false;
            if let Some((payload, src, dst)) = read_ethernet(&mut local, &mut buf) {
                emissions.extend(gw.input(payload, Interface::Local, src, dst, now));
            }
        }
        if lowpan.pending() {
            idle = false;
            let n = lowpan.read(&mut buf);
            if n > 0 {
                match lowpan_framing.parse(&buf[..n]) {
                    Some((src, dst, payload)) => emissions.extend(gw.input(payload.to_vec(), Interface::LowPan, src, dst, now)),
                    None => tracing::trace!("lowpan: dropping unparseable frame"),
                }
            }
        }

        emissions.extend(gw.poll(now));
        for emission in emissions {
            emit(&mut eth, &mut local, &mut lowpan, &lowpan_framing, own_mac, emission);
        }

        if idle {
            std::thread::sleep(Duration::from_millis(cfg.pgw_period_ms.min(20)));
        }
    }
}

fn bind_or_exit(iface: Interface, local: &std::path::Path, peer: &std::path::Path) -> SocketDriver {
    match SocketDriver::bind(local, peer) {
        Ok(d) => d,
        Err(e) => {
            error!(error = %GatewayError::InterfaceInitFailed(iface), cause = %e, "failed to bind socket");
            std::process::exit(1);
        }
    }
}

/// Reads and parses one standard Ethernet frame, returning the IPv6
/// payload and the sender/receiver EUI-64 derived from its MAC addresses.
/// `None` for anything truncated, non-IPv6, or oversized.
fn read_ethernet(driver: &mut dyn L2Driver, buf: &mut [u8]) -> Option<(Vec<u8>, Eui64, Eui64)> {
    let n = driver.read(buf);
    if n < ETH_HEADER_LEN || n > MAX_FRAME_LEN {
        return None;
    }
    let frame = &buf[..n];
    let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    if ethertype != ETHERTYPE_IPV6 {
        return None;
    }
    let mut dst_mac = [0u8; 6];
    let mut src_mac = [0u8; 6];
    dst_mac.copy_from_slice(&frame[0..6]);
    src_mac.copy_from_slice(&frame[6..12]);
    let src = Eui64::from_eth_mac(&EthMac::new(src_mac));
    let dst = Eui64::from_eth_mac(&EthMac::new(dst_mac));
    Some((frame[ETH_HEADER_LEN..].to_vec(), src, dst))
}

/// Writes one emitted packet out the driver for its target interface,
/// framing it appropriately for that interface's transport.
fn emit(
    eth: &mut SocketDriver,
    local: &mut SocketDriver,
    lowpan: &mut SocketDriver,
    lowpan_framing: &SocketFraming,
    own_mac: EthMac,
    emission: Emission,
) {
    match emission.iface {
        Interface::Ethernet | Interface::Local => {
            let mut out = vec![0u8; ETH_HEADER_LEN + emission.ctx.buf.len()];
            out[0..6].copy_from_slice(emission.ctx.dst_eui.to_eth_mac().0.as_bytes());
            out[6..12].copy_from_slice(own_mac.0.as_bytes());
            out[12..14].copy_from_slice(&ETHERTYPE_IPV6.to_be_bytes());
            out[ETH_HEADER_LEN..].copy_from_slice(&emission.ctx.buf);
            let driver = if emission.iface == Interface::Ethernet { eth } else { local };
            if !driver.send(&out) {
                tracing::warn!(iface = ?emission.iface, "main: emission send failed");
            }
        }
        Interface::LowPan => {
            let dst = if emission.ctx.dst_eui.is_multicast() { None } else { Some(emission.ctx.dst_eui) };
            let mut out = vec![0u8; MAX_FRAME_LEN];
            let n = lowpan_framing.build(dst, &emission.ctx.buf, &mut out);
            if n == 0 || !lowpan.send(&out[..n]) {
                tracing::warn!("main: lowpan emission send failed");
            }
        }
        Interface::Undefined => {}
    }
}
