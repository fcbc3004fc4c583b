//! BCPL-style length-prefixed name buffers, as they arrive from (and
//! are returned to) the Amiga filesystem packet boundary: `buf[0]` is
//! the length, `buf[1..]` the bytes, never NUL-terminated.
//!
//! The reference implementation temporarily NUL-terminates these in
//! place for an RFILE call and restores the original byte afterward.
//! `spec.md` §9 ("Name buffer mutation") treats that as an
//! implementation shortcut, not a contract: every function here
//! copies into an owned buffer instead, leaving the caller's bytes
//! untouched on every exit path by construction.

/// Decode a BCPL name into an owned `String` without mutating `buf`.
pub fn bcpl_name_to_string(buf: &[u8]) -> Option<String> {
    let len = *buf.first()? as usize;
    let bytes = buf.get(1..1 + len)?;
    Some(String::from_utf8_lossy(bytes).into_owned())
}

/// Encode `name` into a BCPL buffer of at most `capacity` bytes
/// (1 length byte + up to `capacity - 2` name bytes, leaving room for
/// the reply packet's own trailing byte, per `spec.md` §4.6's
/// directory-entry population note).
pub fn string_to_bcpl_name(name: &str, capacity: usize) -> Vec<u8> {
    let max_len = capacity.saturating_sub(2).min(255);
    let truncated: Vec<u8> = name.bytes().take(max_len).collect();
    let mut out = Vec::with_capacity(truncated.len() + 1);
    out.push(truncated.len() as u8);
    out.extend_from_slice(&truncated);
    out
}
