//! Shared wire-level types for the KickSmash core: magic/opcode/status
//! constants, the CRC used on every frame, message tags and handles,
//! and the directory-entry codec.
//!
//! Every other `km-*` crate builds on this one; it carries no I/O and
//! no transport assumptions of its own.

pub mod consts;
pub mod crc;
pub mod dirent;
pub mod handle;
pub mod msghdr;
pub mod tag;

pub use consts::FRAME_MAGIC;
pub use crc::crc32_ks;
pub use dirent::{DirEnt, DirEntError};
pub use handle::Handle;
pub use msghdr::MsgHdr;
pub use tag::{Tag, TagAllocator};
