//! `SimulatedWireIo`: a [`WireIo`] that services frames against a
//! [`PeerHandle`] instead of talking to a real bus, so `FramedRomPort`
//! and everything above it sees a normal transport.

use km_framer::{frame_recv, frame_send, LoopbackWireIo, TransportError, WireIo};

use crate::peer::PeerHandle;

pub struct SimulatedWireIo {
    io: LoopbackWireIo,
    peer: PeerHandle,
}

impl SimulatedWireIo {
    pub fn new(peer: PeerHandle) -> Self {
        Self { io: LoopbackWireIo::new(), peer }
    }

    /// Decode whatever has been sent so far as one frame, dispatch it
    /// against the peer, and encode the reply back into `inbound`.
    ///
    /// Mirrors the real channel's half-duplex discipline: `Channel::cmd`
    /// always finishes sending before it starts receiving, so this is
    /// only ever invoked from an empty `inbound` queue.
    fn service(&mut self) -> Result<(), TransportError> {
        let mut outgoing = LoopbackWireIo::new();
        std::mem::swap(&mut outgoing.inbound, &mut self.io.outbound);

        let (cmd, payload) = frame_recv(&mut outgoing, u16::MAX as usize)?;
        let (status, reply) = self.peer.dispatch(cmd, &payload);

        let mut reply_io = LoopbackWireIo::new();
        frame_send(&mut reply_io, status, &reply)?;

        if self.peer.corrupt_replies() && reply_io.outbound.len() > 6 {
            reply_io.outbound[6] ^= 0x0100;
        }

        self.io.inbound = reply_io.outbound;
        Ok(())
    }
}

impl WireIo for SimulatedWireIo {
    fn send_halfword(&mut self, value: u16) -> Result<(), TransportError> {
        self.io.send_halfword(value)
    }

    fn recv_halfword(&mut self) -> Result<u16, TransportError> {
        if self.io.inbound.is_empty() {
            self.service()?;
        }
        self.io.recv_halfword()
    }
}
