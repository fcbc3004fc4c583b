use std::fmt;

/// Failures detected locally while framing a transaction, before any
/// peer-side status is known. These are the "local detection codes"
/// of `spec.md` §4.2 (near-max 32-bit range on the real wire).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No magic sequence was found within the bounded scan window.
    NoReply,
    /// A reply declared a payload longer than the caller's buffer.
    BadLength,
    /// The reply's CRC did not match its length/status/payload.
    BadCrc,
    /// Reply data was structurally inconsistent (e.g. directory entry
    /// corruption) beyond what CRC alone catches.
    BadData,
    /// The caller's buffer could not hold the reply.
    NoMem,
    /// The underlying transport (serial port, ROM bus driver) failed.
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoReply => write!(f, "no reply: magic sequence not found"),
            Self::BadLength => write!(f, "reply payload longer than destination buffer"),
            Self::BadCrc => write!(f, "CRC mismatch on reply frame"),
            Self::BadData => write!(f, "reply data inconsistent"),
            Self::NoMem => write!(f, "no buffer space for reply"),
            Self::Io(msg) => write!(f, "transport I/O error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}
