//! APPSTATE: the 16-bit liveness bitmask each side advertises over
//! CHANNEL. The USB side must refresh its own bits roughly every 5 s
//! or the peer assumes it has gone away (`spec.md` §4.4).

pub mod error;

pub use error::AppStateError;

use std::time::{Duration, Instant};

use km_channel::{Channel, RomPort};
use km_wire::consts::{
    APP_STATE_HAVE_FILE, APP_STATE_SERVICE_UP, KS_APP_STATE_SET, KS_CMD_APP_STATE,
};

/// Cadence at which this side must resend its own state to avoid being
/// timed out by the peer.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(5);

pub struct AppState<P> {
    chan: Channel<P>,
    local_bits: u16,
    last_refresh: Instant,
    service_up: Option<bool>,
}

impl<P: RomPort> AppState<P> {
    pub fn new(chan: Channel<P>) -> Self {
        Self {
            chan,
            local_bits: 0,
            last_refresh: Instant::now(),
            service_up: None,
        }
    }

    pub fn into_inner(self) -> Channel<P> {
        self.chan
    }

    fn set(&mut self, mask: u16, bits: u16) -> Result<u16, AppStateError> {
        let mut payload = Vec::with_capacity(4);
        payload.extend_from_slice(&mask.to_be_bytes());
        payload.extend_from_slice(&bits.to_be_bytes());
        let (_, reply) = self
            .chan
            .cmd(KS_CMD_APP_STATE | KS_APP_STATE_SET, &payload, 2)?;
        if reply.len() < 2 {
            return Err(AppStateError::ShortReply);
        }
        Ok(u16::from_be_bytes([reply[0], reply[1]]))
    }

    /// Replace this side's advertised state outright and reset the
    /// refresh clock.
    pub fn set_local(&mut self, bits: u16) -> Result<(), AppStateError> {
        self.set(0xFFFF, bits)?;
        self.local_bits = bits;
        self.last_refresh = Instant::now();
        Ok(())
    }

    /// Resend the last advertised state if [`REFRESH_INTERVAL`] has
    /// elapsed since the previous refresh. Returns whether a refresh
    /// was sent.
    pub fn refresh_if_due(&mut self) -> Result<bool, AppStateError> {
        if self.last_refresh.elapsed() < REFRESH_INTERVAL {
            return Ok(false);
        }
        let bits = self.local_bits;
        self.set_local(bits)?;
        Ok(true)
    }

    /// Query the peer's current advertised mask.
    pub fn peer_mask(&mut self) -> Result<u16, AppStateError> {
        let mut payload = Vec::with_capacity(4);
        payload.extend_from_slice(&0u16.to_be_bytes());
        payload.extend_from_slice(&0u16.to_be_bytes());
        let (_, reply) = self.chan.cmd(KS_CMD_APP_STATE, &payload, 2)?;
        if reply.len() < 2 {
            return Err(AppStateError::ShortReply);
        }
        let mask = u16::from_be_bytes([reply[0], reply[1]]);
        self.service_up = Some(mask & (APP_STATE_SERVICE_UP | APP_STATE_HAVE_FILE) == (APP_STATE_SERVICE_UP | APP_STATE_HAVE_FILE));
        Ok(mask)
    }

    /// The cached "peer's file service is up" boolean RFILE consults
    /// before every remote-file operation, rechecking the peer if the
    /// cache has been cleared.
    pub fn service_up(&mut self) -> Result<bool, AppStateError> {
        if let Some(cached) = self.service_up {
            return Ok(cached);
        }
        self.peer_mask()?;
        Ok(self.service_up.unwrap_or(false))
    }

    pub fn clear_service_up_cache(&mut self) {
        self.service_up = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use km_channel::FramedRomPort;
    use km_framer::LoopbackWireIo;

    fn queue_reply(io: &mut LoopbackWireIo, status: u16, payload: &[u8]) {
        km_framer::frame_send(io, status, payload).expect("queue reply");
        let sent = std::mem::take(&mut io.outbound);
        io.inbound.extend(sent);
    }

    fn new_state(io: LoopbackWireIo) -> AppState<FramedRomPort<LoopbackWireIo>> {
        AppState::new(Channel::new(FramedRomPort::new(io)))
    }

    #[test]
    fn set_local_updates_local_bits_and_refresh_clock() {
        let mut io = LoopbackWireIo::new();
        queue_reply(&mut io, 0x00, &APP_STATE_SERVICE_UP.to_be_bytes());
        let mut state = new_state(io);
        state.set_local(APP_STATE_SERVICE_UP).expect("set_local");
        assert_eq!(state.local_bits, APP_STATE_SERVICE_UP);
        assert!(!state.refresh_if_due().expect("not due yet"));
    }

    #[test]
    fn service_up_caches_until_cleared() {
        let mut io = LoopbackWireIo::new();
        let mask = (APP_STATE_SERVICE_UP | APP_STATE_HAVE_FILE).to_be_bytes();
        queue_reply(&mut io, 0x00, &mask);
        let mut state = new_state(io);

        assert!(state.service_up().expect("first query hits the peer"));
        // Cache is now warm; a second call must not need another reply queued.
        assert!(state.service_up().expect("second query hits the cache"));

        state.clear_service_up_cache();
        // No reply queued: a recheck now fails as a transport error,
        // proving the cache really was the only thing satisfying the
        // previous two calls.
        assert!(state.service_up().is_err());
    }
}
