use std::fmt;

use km_msgq::MsgqError;
use km_wire::consts::{
    KM_STATUS_EOF, KM_STATUS_EXIST, KM_STATUS_FAIL, KM_STATUS_INVALID, KM_STATUS_NOEXIST,
    KM_STATUS_NOTEMPTY, KM_STATUS_PERM, KM_STATUS_UNKCMD,
};

/// Remote-file-layer status (`KM_STATUS_*`), mapped from the reply
/// header's `status` byte into a name rather than a bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    Fail,
    UnkCmd,
    Perm,
    Invalid,
    NotEmpty,
    NoExist,
    Exist,
    /// Not a wire status byte: synthesized when MSGQ exhausts its
    /// tag-filtered retry budget, i.e. the peer never answered.
    Unavail,
    Unknown(u8),
}

impl From<u8> for RemoteStatus {
    fn from(status: u8) -> Self {
        match status {
            KM_STATUS_FAIL => Self::Fail,
            KM_STATUS_UNKCMD => Self::UnkCmd,
            KM_STATUS_PERM => Self::Perm,
            KM_STATUS_INVALID => Self::Invalid,
            KM_STATUS_NOTEMPTY => Self::NotEmpty,
            KM_STATUS_NOEXIST => Self::NoExist,
            KM_STATUS_EXIST => Self::Exist,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fail => write!(f, "remote operation failed"),
            Self::UnkCmd => write!(f, "remote does not implement this operation"),
            Self::Perm => write!(f, "permission denied"),
            Self::Invalid => write!(f, "invalid argument or object type"),
            Self::NotEmpty => write!(f, "directory not empty"),
            Self::NoExist => write!(f, "object does not exist"),
            Self::Exist => write!(f, "object already exists"),
            Self::Unavail => write!(f, "remote file service unavailable"),
            Self::Unknown(s) => write!(f, "unrecognized remote status 0x{s:02x}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RfileError {
    Msgq(MsgqError),
    Remote(RemoteStatus),
    /// A reply was shorter than the fixed fields it's required to carry.
    ShortReply,
    /// A name/path field was not valid UTF-8 once NUL-stripped.
    InvalidUtf8,
    /// A directory-entry reply failed `DirEnt` decoding.
    Dirent(km_wire::DirEntError),
}

impl fmt::Display for RfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Msgq(e) => write!(f, "{e}"),
            Self::Remote(s) => write!(f, "{s}"),
            Self::ShortReply => write!(f, "remote-file reply too short for its fixed fields"),
            Self::InvalidUtf8 => write!(f, "remote-file reply contained invalid UTF-8"),
            Self::Dirent(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RfileError {}

/// `NoData` only reaches here after MSGQ's own bounded retries are
/// exhausted (`spec.md` §7: "persistent NoData... becomes Unavail"),
/// so there is no transient case left for RFILE to distinguish.
impl From<MsgqError> for RfileError {
    fn from(e: MsgqError) -> Self {
        match e {
            MsgqError::NoData => Self::Remote(RemoteStatus::Unavail),
            other => Self::Msgq(other),
        }
    }
}

impl From<km_wire::DirEntError> for RfileError {
    fn from(e: km_wire::DirEntError) -> Self {
        Self::Dirent(e)
    }
}

/// `KM_STATUS_EOF` is a meaningful non-error outcome for `FREAD`
/// (no more data), not surfaced through this mapping.
pub fn check_status(status: u8) -> Result<(), RfileError> {
    if status == 0 {
        return Ok(());
    }
    Err(RfileError::Remote(RemoteStatus::from(status)))
}

pub fn is_eof(status: u8) -> bool {
    status == KM_STATUS_EOF
}
