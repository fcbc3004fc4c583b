//! `SerialRomPort`: a `RomPort` that frames CHANNEL transactions over
//! a byte-oriented serial transport, via two `SyncRingBuffer`s fed by
//! the reader/writer thread pair in `bridge`.

use std::sync::Arc;
use std::time::Duration;

use km_channel::FramedRomPort;
use km_framer::{TransportError, WireIo};

use crate::ring::SyncRingBuffer;

/// Half-word `WireIo` over a pair of shared byte rings, rather than a
/// transport handle directly — the reader/writer threads own the
/// actual device I/O.
pub struct RingWireIo {
    inbound: Arc<SyncRingBuffer>,
    outbound: Arc<SyncRingBuffer>,
    recv_timeout: Duration,
}

impl RingWireIo {
    pub fn new(inbound: Arc<SyncRingBuffer>, outbound: Arc<SyncRingBuffer>, recv_timeout: Duration) -> Self {
        Self { inbound, outbound, recv_timeout }
    }
}

impl WireIo for RingWireIo {
    fn send_halfword(&mut self, value: u16) -> Result<(), TransportError> {
        self.outbound.push_slice(&value.to_be_bytes());
        Ok(())
    }

    fn recv_halfword(&mut self) -> Result<u16, TransportError> {
        let hi = self.inbound.pop_timeout(self.recv_timeout).ok_or(TransportError::NoReply)?;
        let lo = self.inbound.pop_timeout(self.recv_timeout).ok_or(TransportError::NoReply)?;
        Ok(u16::from_be_bytes([hi, lo]))
    }
}

pub type SerialRomPort = FramedRomPort<RingWireIo>;

pub fn serial_rom_port(inbound: Arc<SyncRingBuffer>, outbound: Arc<SyncRingBuffer>, recv_timeout: Duration) -> SerialRomPort {
    FramedRomPort::new(RingWireIo::new(inbound, outbound, recv_timeout))
}
