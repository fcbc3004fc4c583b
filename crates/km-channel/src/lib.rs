//! CHANNEL: the top-level transaction contract. Issues a command over
//! a `RomPort`, paces the transaction, classifies the reply status,
//! and drives ROM recovery after any channel-level or transport
//! failure.

pub mod error;
pub mod rom_port;

pub use error::{classify, ChannelError, ChannelStatus};
pub use rom_port::{FramedRomPort, RomPort};

use std::time::{Duration, Instant};

use km_wire::consts::{KS_CMD_LOOPBACK, KS_CMD_TESTPATT, ROM_IDLE_LITERAL};

/// Outer timeout for ROM recovery (`spec.md` §4.2: "~2 s").
const ROM_RECOVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Minimum per-transaction pacing delay, present even for a zero-length
/// payload and reply, to give the peer's DMA engines time to
/// synchronise (`spec.md` §4.1).
const PACE_MIN: Duration = Duration::from_micros(50);
/// Additional pacing per byte of payload + reply buffer.
const PACE_PER_BYTE: Duration = Duration::from_nanos(200);

pub struct Channel<P> {
    port: P,
}

impl<P: RomPort> Channel<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    pub fn into_inner(self) -> P {
        self.port
    }

    fn pace(&self, payload_len: usize, reply_max: usize) {
        let extra = PACE_PER_BYTE.saturating_mul((payload_len + reply_max) as u32);
        std::thread::sleep(PACE_MIN + extra);
    }

    /// Read a known ROM address until two consecutive reads agree and
    /// match the idle literal, or until the outer timeout elapses.
    /// Best-effort: a timeout here just means the next transaction may
    /// start before the peer has fully released the bus.
    fn rom_recovery_wait(&mut self) {
        let start = Instant::now();
        let mut last: Option<u32> = None;
        while start.elapsed() < ROM_RECOVERY_TIMEOUT {
            let word = self.port.rom_recovery_read();
            if last == Some(word) && word == ROM_IDLE_LITERAL {
                return;
            }
            last = Some(word);
        }
    }

    /// Issue one command and await its reply. On any error whose high
    /// byte is non-zero, or any transport-level failure, perform ROM
    /// recovery before returning.
    pub fn cmd(
        &mut self,
        opcode: u16,
        payload: &[u8],
        reply_max: usize,
    ) -> Result<(u16, Vec<u8>), ChannelError> {
        self.pace(payload.len(), reply_max);
        self.port.send_frame(opcode, payload)?;

        match self.port.recv_frame(reply_max) {
            Ok((status, reply)) => match classify(status) {
                ChannelStatus::Channel(raw) => {
                    self.rom_recovery_wait();
                    Err(ChannelError::Channel(raw))
                }
                ChannelStatus::RemoteFile(_) => Ok((status, reply)),
            },
            Err(e) => {
                self.rom_recovery_wait();
                Err(ChannelError::from(e))
            }
        }
    }

    /// `KS_CMD_LOOPBACK`: the peer echoes `payload` back unchanged.
    pub fn loopback(&mut self, payload: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let (_, reply) = self.cmd(KS_CMD_LOOPBACK, payload, payload.len())?;
        Ok(reply)
    }

    /// `KS_CMD_TESTPATT`: request the peer's fixed diagnostic pattern.
    pub fn test_pattern(&mut self, reply_max: usize) -> Result<Vec<u8>, ChannelError> {
        let (_, reply) = self.cmd(KS_CMD_TESTPATT, &[], reply_max)?;
        Ok(reply)
    }
}
