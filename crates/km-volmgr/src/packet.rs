//! Amiga filesystem request packets, as `VOLMGR::message` drains them
//! from a volume's port and dispatches each through `HANDLER`.
//!
//! This models the packet surface as a closed enum rather than the
//! reference implementation's tagged `dos_packet_t` union — the wire
//! shape of a DOS packet is outside this crate's scope (it's an
//! AmigaOS exec structure, not a KickSmash wire message), so only the
//! fields each operation actually needs are carried.

use km_channel::RomPort;
use km_handler::{AmigaDirEntry, FilePosId, Handler, HandlerError, LockId, VolumeInfo};
use km_wire::Handle;

#[derive(Debug, Clone)]
pub enum Packet {
    LocateObject { parent: Handle, name: String, write: bool },
    CopyDir { lock: LockId },
    CreateDir { parent: Handle, name: String },
    FreeLock { lock: LockId },
    ExamineObject { lock: LockId },
    ExamineNext { lock: LockId },
    FindInput { parent: Handle, name: String },
    FindUpdate { parent: Handle, name: String },
    FindOutput { parent: Handle, name: String },
    End { lock: LockId, file: FilePosId },
    Read { file: FilePosId, len: u32 },
    Write { file: FilePosId, data: Vec<u8> },
    Seek { file: FilePosId, offset: i64, whence: i32 },
    DeleteObject { parent: Handle, name: String },
    RenameObject { src_parent: Handle, dst_parent: Handle, old_name: String, new_name: String },
    Parent { lock: LockId },
    SameLock { a: LockId, b: LockId },
    MakeLink { parent: Handle, name: String, hard_target: Option<LockId>, soft_target: String, hard: bool },
    ReadLink { parent: Handle, name: String },
    DiskInfo { volume: Handle },
    CurrentVolume,
    SetProtect { parent: Handle, name: String, aperms: u32 },
    /// Always replies `TRUE` — every volume this handler serves is a filesystem.
    IsFilesystem,
    /// Ralph Babel packet; this handler has no FSSM to hand back.
    GetDiskFssm,
    /// Ralph Babel packet; no-op success, there is no FSSM to release.
    FreeDiskFssm,
    /// No-op success.
    UndiskInfo,
    /// Not a recognized packet type; replies `ActionNotKnown`.
    Unknown,
    Die,
}

#[derive(Debug, Clone)]
pub enum PacketReply {
    Ok,
    Lock(LockId),
    OptLock(Option<LockId>),
    LockAndFile(LockId, FilePosId),
    Entry(AmigaDirEntry),
    Entries(Vec<AmigaDirEntry>),
    Data(Vec<u8>),
    Pos(u32),
    Bool(bool),
    Link(String),
    Info(VolumeInfo),
    Err(HandlerError),
}

impl From<Result<PacketReply, HandlerError>> for PacketReply {
    fn from(result: Result<PacketReply, HandlerError>) -> Self {
        result.unwrap_or_else(PacketReply::Err)
    }
}

/// Run one packet through `handler`, mapping its result onto a
/// `PacketReply`. Unrecognized packet types reply `ActionNotKnown`,
/// per `spec.md` §4.6.
pub fn dispatch<P: RomPort>(handler: &mut Handler<P>, packet: Packet) -> PacketReply {
    let result: Result<PacketReply, HandlerError> = match packet {
        Packet::LocateObject { parent, name, write } => {
            handler.locate_object(parent, &name, write).map(PacketReply::Lock)
        }
        Packet::CopyDir { lock } => handler.copy_dir(lock).map(PacketReply::Lock),
        Packet::CreateDir { parent, name } => handler.create_dir(parent, &name).map(PacketReply::Lock),
        Packet::FreeLock { lock } => handler.free_lock(lock).map(|()| PacketReply::Ok),
        Packet::ExamineObject { lock } => handler.examine_object(lock).map(PacketReply::Entry),
        Packet::ExamineNext { lock } => handler.examine_next(lock).map(PacketReply::Entries),
        Packet::FindInput { parent, name } => {
            handler.find_input(parent, &name, false).map(|(l, f)| PacketReply::LockAndFile(l, f))
        }
        Packet::FindUpdate { parent, name } => {
            handler.find_input(parent, &name, true).map(|(l, f)| PacketReply::LockAndFile(l, f))
        }
        Packet::FindOutput { parent, name } => {
            handler.find_output(parent, &name).map(|(l, f)| PacketReply::LockAndFile(l, f))
        }
        Packet::End { lock, file } => handler.end(lock, file).map(|()| PacketReply::Ok),
        Packet::Read { file, len } => handler.read(file, len).map(PacketReply::Data),
        Packet::Write { file, data } => handler.write(file, &data).map(|()| PacketReply::Ok),
        Packet::Seek { file, offset, whence } => handler.seek(file, offset, whence).map(PacketReply::Pos),
        Packet::DeleteObject { parent, name } => handler.delete_object(parent, &name).map(|()| PacketReply::Ok),
        Packet::RenameObject { src_parent, dst_parent, old_name, new_name } => handler
            .rename_object(src_parent, dst_parent, &old_name, &new_name)
            .map(|()| PacketReply::Ok),
        Packet::Parent { lock } => handler.parent(lock).map(PacketReply::OptLock),
        Packet::SameLock { a, b } => handler.same_lock(a, b).map(PacketReply::Bool),
        Packet::MakeLink { parent, name, hard_target, soft_target, hard } => handler
            .make_link(parent, &name, hard_target, &soft_target, hard)
            .map(|()| PacketReply::Ok),
        Packet::ReadLink { parent, name } => handler.read_link(parent, &name).map(PacketReply::Link),
        Packet::DiskInfo { volume } => handler.disk_info(volume).map(PacketReply::Info),
        Packet::CurrentVolume => handler.current_volume_lock().map(PacketReply::Lock),
        Packet::SetProtect { parent, name, aperms } => {
            handler.set_protect(parent, &name, aperms).map(|()| PacketReply::Ok)
        }
        Packet::IsFilesystem => Ok(PacketReply::Bool(true)),
        Packet::GetDiskFssm => Err(HandlerError::Amiga(km_handler::AmigaError::ObjectWrongType)),
        Packet::FreeDiskFssm => Ok(PacketReply::Ok),
        Packet::UndiskInfo => Ok(PacketReply::Ok),
        Packet::Die => {
            handler.die();
            Ok(PacketReply::Ok)
        }
        Packet::Unknown => Err(HandlerError::Amiga(km_handler::AmigaError::ActionNotKnown)),
    };
    result.into()
}
