//! Default concrete transport: Unix datagram sockets standing in for a
//! NIC and an 802.15.4 radio. A datagram socket preserves frame
//! boundaries the same way a packet socket or a radio's SPI framing would,
//! so it is a faithful `L2Driver` without any invented wire protocol of its
//! own. Grounded on the pluggable-backend shape of
//! `examples/MalteJ-mvirt/mvirt-net/src/dataplane/backend.rs`'s
//! `ReactorBackend`: one small struct per endpoint, non-blocking, behind a
//! trait `Gateway` never sees. A real deployment swaps this module out for
//! a NIC-backed `L2Driver` and a radio-HAL-backed one; nothing elsewhere in
//! the crate depends on sockets specifically.

use crate::driver::L2Driver;
use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};

pub struct SocketDriver {
    sock: UnixDatagram,
    peer: PathBuf,
}

impl SocketDriver {
    /// Binds a datagram socket at `local`, sending to `peer`. Removes any
    /// stale socket file left at `local` from a previous run.
    pub fn bind(local: impl AsRef<Path>, peer: impl Into<PathBuf>) -> io::Result<Self> {
        let _ = std::fs::remove_file(local.as_ref());
        let sock = UnixDatagram::bind(local.as_ref())?;
        sock.set_nonblocking(true)?;
        Ok(SocketDriver { sock, peer: peer.into() })
    }
}

impl L2Driver for SocketDriver {
    fn init(&mut self) -> bool {
        true
    }

    fn send(&mut self, buf: &[u8]) -> bool {
        match self.sock.send_to(buf, &self.peer) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, peer = %self.peer.display(), "driver: send failed");
                false
            }
        }
    }

    fn pending(&self) -> bool {
        let mut probe = [0u8; 1];
        match self.sock.peek(&mut probe) {
            Ok(_) => true,
            Err(e) => e.kind() != io::ErrorKind::WouldBlock,
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        match self.sock.recv(buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(e) => {
                tracing::warn!(error = %e, "driver: read failed");
                0
            }
        }
    }

    fn on(&mut self) {}

    fn off(&mut self) {}
}
