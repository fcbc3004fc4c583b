//! Frame encode/decode: magic scan, length/command/payload, CRC.

use km_wire::consts::{FRAME_MAGIC, MAGIC_SCAN_MIN_HALFWORDS};
use km_wire::crc32_ks;

use crate::error::TransportError;
use crate::wire_io::WireIo;

/// Number of magic-scan attempts FRAMER allows before declaring
/// `NoReply`. `spec.md` §4.1 requires at least 128 half-words; we scan
/// several multiples of the magic length to give a noisy bus a fair
/// chance without scanning forever.
const MAGIC_SCAN_ATTEMPTS: usize = MAGIC_SCAN_MIN_HALFWORDS;

fn crc_over(length: u16, cmd_or_status: u16, payload: &[u8]) -> u32 {
    let mut bytes = Vec::with_capacity(4 + payload.len());
    bytes.extend_from_slice(&length.to_be_bytes());
    bytes.extend_from_slice(&cmd_or_status.to_be_bytes());
    bytes.extend_from_slice(payload);
    crc32_ks(0, &bytes)
}

/// Send one frame: magic, length, `cmd`, payload (padded to an even
/// byte count on the wire; the pad byte is not part of the CRC), CRC
/// (high half-word first).
pub fn frame_send<T: WireIo>(io: &mut T, cmd: u16, payload: &[u8]) -> Result<(), TransportError> {
    if payload.len() > u16::MAX as usize {
        return Err(TransportError::BadLength);
    }
    let length = payload.len() as u16;

    for word in FRAME_MAGIC {
        io.send_halfword(word)?;
    }
    io.send_halfword(length)?;
    io.send_halfword(cmd)?;

    let mut chunks = payload.chunks_exact(2);
    for pair in &mut chunks {
        io.send_halfword(u16::from_be_bytes([pair[0], pair[1]]))?;
    }
    if let [last] = *chunks.remainder() {
        io.send_halfword(u16::from(last) << 8)?;
    }

    let crc = crc_over(length, cmd, payload);
    io.send_halfword((crc >> 16) as u16)?;
    io.send_halfword((crc & 0xFFFF) as u16)?;
    Ok(())
}

/// Scan for the magic sequence and decode the frame that follows it.
/// Returns the command/status word and the payload bytes (exactly
/// `length` of them, the wire's rounding pad byte stripped).
pub fn frame_recv<T: WireIo>(io: &mut T, max_payload: usize) -> Result<(u16, Vec<u8>), TransportError> {
    let mut matched = 0usize;
    let mut attempts = 0usize;
    loop {
        if attempts >= MAGIC_SCAN_ATTEMPTS {
            return Err(TransportError::NoReply);
        }
        attempts += 1;
        let word = io.recv_halfword()?;
        if word == FRAME_MAGIC[matched] {
            matched += 1;
            if matched == FRAME_MAGIC.len() {
                break;
            }
        } else if word == FRAME_MAGIC[0] {
            matched = 1;
        } else {
            matched = 0;
        }
    }

    let length = io.recv_halfword()?;
    let cmd_or_status = io.recv_halfword()?;

    if length as usize > max_payload {
        return Err(TransportError::BadLength);
    }

    let wire_len = (length as usize).div_ceil(2);
    let mut payload = Vec::with_capacity(length as usize);
    for i in 0..wire_len {
        let word = io.recv_halfword()?;
        let [hi, lo] = word.to_be_bytes();
        payload.push(hi);
        if payload.len() < length as usize {
            payload.push(lo);
        } else {
            // odd trailing byte: `lo` was padding, not real data
            let _ = i;
        }
    }

    let crc_hi = io.recv_halfword()?;
    let crc_lo = io.recv_halfword()?;
    let crc_rx = (u32::from(crc_hi) << 16) | u32::from(crc_lo);

    let crc_calc = crc_over(length, cmd_or_status, &payload);
    if crc_calc != crc_rx {
        return Err(TransportError::BadCrc);
    }

    Ok((cmd_or_status, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire_io::LoopbackWireIo;

    fn send_and_capture(cmd: u16, payload: &[u8]) -> LoopbackWireIo {
        let mut io = LoopbackWireIo::new();
        frame_send(&mut io, cmd, payload).expect("send");
        // Move what was sent into the inbound queue so frame_recv can read it back.
        let mut loopback = LoopbackWireIo::new();
        loopback.inbound = io.outbound;
        loopback
    }

    #[test]
    fn round_trip_even_payload() {
        let payload = [0xde, 0xad, 0xbe, 0xef];
        let mut io = send_and_capture(0x12, &payload);
        let (cmd, got) = frame_recv(&mut io, 64).expect("recv");
        assert_eq!(cmd, 0x12);
        assert_eq!(got, payload);
    }

    #[test]
    fn round_trip_odd_payload() {
        let payload = [0x01, 0x02, 0x03];
        let mut io = send_and_capture(0x05, &payload);
        let (_, got) = frame_recv(&mut io, 64).expect("recv");
        assert_eq!(got, payload);
    }

    #[test]
    fn round_trip_empty_payload() {
        let mut io = send_and_capture(0x01, &[]);
        let (cmd, got) = frame_recv(&mut io, 64).expect("recv");
        assert_eq!(cmd, 0x01);
        assert!(got.is_empty());
    }

    #[test]
    fn leading_noise_before_magic_is_skipped() {
        let mut io = send_and_capture(0x02, &[0xAA]);
        // Prepend noise that partially matches the magic prefix.
        io.inbound.push_front(0x1017);
        io.inbound.push_front(0xFFFF);
        io.inbound.push_front(0x0204);
        let (cmd, got) = frame_recv(&mut io, 64).expect("recv");
        assert_eq!(cmd, 0x02);
        assert_eq!(got, vec![0xAA]);
    }

    #[test]
    fn no_magic_is_no_reply() {
        let mut io = LoopbackWireIo::new();
        for _ in 0..200 {
            io.inbound.push_back(0x0000);
        }
        assert_eq!(frame_recv(&mut io, 64), Err(TransportError::NoReply));
    }

    #[test]
    fn corrupted_payload_is_bad_crc() {
        let payload = [1, 2, 3, 4];
        let mut io = send_and_capture(0x10, &payload);
        // Flip a bit in the payload's first halfword (index 6: magic x4 + len + cmd).
        let word = io.inbound[6];
        io.inbound[6] = word ^ 0x0100;
        assert_eq!(frame_recv(&mut io, 64), Err(TransportError::BadCrc));
    }

    #[test]
    fn oversized_reply_is_bad_length() {
        let payload = [0u8; 10];
        let mut io = send_and_capture(0x10, &payload);
        assert_eq!(frame_recv(&mut io, 4), Err(TransportError::BadLength));
    }
}
