use std::fmt;

use km_rfile::{RemoteStatus, RfileError};

/// Local equivalents of the AmigaOS filesystem error codes the
/// reference handler returns, mapped from `RemoteStatus` per
/// `spec.md` §4.6's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmigaError {
    FileNotObject,
    NoMoreEntries,
    NotImplemented,
    WriteProtected,
    ObjectWrongType,
    DirectoryNotEmpty,
    ObjectNotFound,
    ObjectExists,
    /// A conflicting shared/exclusive lock already exists on the object.
    InUse,
    NoFreeStore,
    BadNumber,
    BadTemplate,
    SeekError,
    RequiredArgMissing,
    /// Packet type the handler does not implement.
    ActionNotKnown,
    /// Handler is shutting down and only accepts `FREE_LOCK`/`END`.
    DeviceNotMounted,
}

impl fmt::Display for AmigaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::FileNotObject => "file is not an object",
            Self::NoMoreEntries => "no more directory entries",
            Self::NotImplemented => "operation not implemented by remote",
            Self::WriteProtected => "write protected",
            Self::ObjectWrongType => "object is the wrong type",
            Self::DirectoryNotEmpty => "directory not empty",
            Self::ObjectNotFound => "object not found",
            Self::ObjectExists => "object already exists",
            Self::InUse => "object in use",
            Self::NoFreeStore => "no free store",
            Self::BadNumber => "unrecognized remote status",
            Self::BadTemplate => "bad template",
            Self::SeekError => "seek error",
            Self::RequiredArgMissing => "required argument missing",
            Self::ActionNotKnown => "action not known",
            Self::DeviceNotMounted => "device not mounted",
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for AmigaError {}

impl From<RemoteStatus> for AmigaError {
    fn from(status: RemoteStatus) -> Self {
        match status {
            RemoteStatus::Fail => Self::FileNotObject,
            RemoteStatus::UnkCmd => Self::NotImplemented,
            RemoteStatus::Perm => Self::WriteProtected,
            RemoteStatus::Invalid => Self::ObjectWrongType,
            RemoteStatus::NotEmpty => Self::DirectoryNotEmpty,
            RemoteStatus::NoExist => Self::ObjectNotFound,
            RemoteStatus::Exist => Self::ObjectExists,
            RemoteStatus::Unavail => Self::DeviceNotMounted,
            RemoteStatus::Unknown(_) => Self::BadNumber,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    Amiga(AmigaError),
    Rfile(RfileError),
    /// An id referred to a lock or file-position record no longer held.
    UnknownHandle,
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Amiga(e) => write!(f, "{e}"),
            Self::Rfile(e) => write!(f, "{e}"),
            Self::UnknownHandle => write!(f, "unknown lock or file-position handle"),
        }
    }
}

impl std::error::Error for HandlerError {}

impl From<AmigaError> for HandlerError {
    fn from(e: AmigaError) -> Self {
        Self::Amiga(e)
    }
}

/// `RfileError::Remote` carries a meaningful AmigaOS-equivalent
/// status; anything else (transport/msgq failure, short reply) is not
/// something the Amiga packet layer has a code for and is propagated
/// as-is.
impl From<RfileError> for HandlerError {
    fn from(e: RfileError) -> Self {
        match e {
            RfileError::Remote(status) => Self::Amiga(AmigaError::from(status)),
            other => Self::Rfile(other),
        }
    }
}
