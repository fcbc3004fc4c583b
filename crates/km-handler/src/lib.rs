//! HANDLER: the Amiga filesystem packet engine layered on RFILE.
//!
//! One method per packet type from `spec.md` §4.6's table. Locks and
//! open file positions live in small arenas (`lock::LockTable`,
//! `filepos::FilePosTable`) rather than the reference implementation's
//! pointer-linked lists, per §9's recommendation. Unsupported packet
//! types are the caller's concern (dispatch lives in a packet loop
//! above this, per-volume in `km-volmgr`); this crate only exposes the
//! operations and the shutdown-gating rule.

pub mod bcpl;
pub mod error;
pub mod filepos;
pub mod lock;
pub mod populate;

pub use error::{AmigaError, HandlerError};
pub use filepos::{FilePos, FilePosId, FilePosTable};
pub use lock::{AccessMode, Lock, LockId, LockTable};
pub use populate::{populate, AmigaDirEntry};

use km_channel::RomPort;
use km_rfile::RemoteFile;
use km_wire::consts::{
    HM_MODE_CREATE, HM_MODE_NOFOLLOW, HM_MODE_READ, HM_MODE_READDIR, HM_MODE_READLINK,
    HM_MODE_TRUNC, HM_MODE_WRITE, HM_TYPE_DIR, HM_TYPE_HLINK, HM_TYPE_LINK,
};
use km_wire::Handle;

/// Bytes read per `EXAMINE_OBJECT`/`EXAMINE_NEXT`/`DISK_INFO` call;
/// large enough that a single directory entry never spans two reads.
const DIRENT_READ_CHUNK: u32 = 4096;

/// Size reserved for a BCPL name buffer in replies that populate one,
/// matching the classic Amiga `MAXFILENAMELEN` allowance.
const BCPL_NAME_CAPACITY: usize = 108;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    pub blocksize: u32,
    pub blocks_total: u64,
    pub blocks_used: u64,
}

pub struct Handler<P> {
    rfile: RemoteFile<P>,
    locks: LockTable,
    files: FilePosTable,
    /// Active volume locks resolve against; `km-volmgr` sets this when
    /// it owns more than one mounted volume.
    current_volume: Handle,
    /// Cleared by `DIE`; once false only `FREE_LOCK`/`END` are accepted.
    running: bool,
}

impl<P: RomPort> Handler<P> {
    pub fn new(rfile: RemoteFile<P>) -> Self {
        Self {
            rfile,
            locks: LockTable::new(),
            files: FilePosTable::new(),
            current_volume: Handle::DEFAULT_VOLUME,
            running: true,
        }
    }

    pub fn into_inner(self) -> RemoteFile<P> {
        self.rfile
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn current_volume(&self) -> Handle {
        self.current_volume
    }

    pub fn set_current_volume(&mut self, volume: Handle) {
        self.current_volume = volume;
    }

    fn ensure_running(&self) -> Result<(), HandlerError> {
        if self.running {
            Ok(())
        } else {
            Err(HandlerError::Amiga(AmigaError::DeviceNotMounted))
        }
    }

    /// Arbitrates a freshly opened remote handle against the existing
    /// lock list before holding it; closes the handle and returns
    /// `InUse` on conflict rather than leaking it on the remote side.
    fn insert_lock(&mut self, handle: Handle, access: AccessMode, parent: Handle) -> Result<LockId, HandlerError> {
        match self.locks.insert_checked(Lock { handle, access, parent, rewind_pending: false }) {
            Ok(id) => Ok(id),
            Err(_) => {
                let _ = self.rfile.fclose(handle);
                Err(HandlerError::Amiga(AmigaError::InUse))
            }
        }
    }

    /// `LOCATE_OBJECT` — open for read or write; fall back to a
    /// directory open when the plain open reports the object is the
    /// wrong type (i.e. it's a directory).
    pub fn locate_object(&mut self, parent: Handle, name: &str, write: bool) -> Result<LockId, HandlerError> {
        self.ensure_running()?;
        let mode = if write { HM_MODE_WRITE } else { HM_MODE_READ };
        let opened = match self.rfile.fopen(parent, mode, 0, name) {
            Ok(result) => result,
            Err(err) => {
                let mapped = HandlerError::from(err);
                if matches!(mapped, HandlerError::Amiga(AmigaError::ObjectWrongType)) {
                    self.rfile.fopen(parent, HM_MODE_READDIR, 0, name)?
                } else {
                    return Err(mapped);
                }
            }
        };
        let (handle, _obj_type) = opened;
        let access = if write { AccessMode::Exclusive } else { AccessMode::Shared };
        self.insert_lock(handle, access, parent)
    }

    /// `COPY_DIR` — duplicate an existing lock by reopening its
    /// handle with an empty name.
    pub fn copy_dir(&mut self, lock_id: LockId) -> Result<LockId, HandlerError> {
        self.ensure_running()?;
        let lock = self.locks.get(lock_id).ok_or(HandlerError::UnknownHandle)?.clone();
        let (handle, _) = self.rfile.fopen(lock.handle, 0, 0, "")?;
        self.insert_lock(handle, AccessMode::Shared, lock.parent)
    }

    /// `CREATE_DIR` — create then immediately open the new directory.
    pub fn create_dir(&mut self, parent: Handle, name: &str) -> Result<LockId, HandlerError> {
        self.ensure_running()?;
        self.rfile.fcreate(parent, HM_TYPE_DIR, 0o777, name, "")?;
        let (handle, _) = self.rfile.fopen(parent, HM_MODE_READDIR, 0, name)?;
        self.insert_lock(handle, AccessMode::Shared, parent)
    }

    /// `FREE_LOCK` — accepted even while shutting down.
    pub fn free_lock(&mut self, lock_id: LockId) -> Result<(), HandlerError> {
        let Some(lock) = self.locks.remove(lock_id) else {
            return Ok(());
        };
        self.rfile.fclose(lock.handle)?;
        Ok(())
    }

    /// `EXAMINE_OBJECT` — reopen the lock's target without following
    /// links, read its own metadata, and mark the lock to rewind on
    /// the next `EXAMINE_NEXT` if it's a directory.
    pub fn examine_object(&mut self, lock_id: LockId) -> Result<AmigaDirEntry, HandlerError> {
        self.ensure_running()?;
        let target = self.locks.get(lock_id).ok_or(HandlerError::UnknownHandle)?.handle;
        let (examine_handle, obj_type) = self.rfile.fopen(target, HM_MODE_READDIR | HM_MODE_NOFOLLOW, 0, "")?;
        let entries = self.rfile.fread_dir(examine_handle, DIRENT_READ_CHUNK, true)?;
        self.rfile.fclose(examine_handle)?;
        let entry = entries.into_iter().next().ok_or(HandlerError::Amiga(AmigaError::ObjectNotFound))?;
        if obj_type == HM_TYPE_DIR {
            if let Some(lock) = self.locks.get_mut(lock_id) {
                lock.rewind_pending = true;
            }
        }
        Ok(populate(&entry, BCPL_NAME_CAPACITY))
    }

    /// `EXAMINE_NEXT` — rewind first if `EXAMINE_OBJECT` asked for it,
    /// then read the next batch of entries.
    pub fn examine_next(&mut self, lock_id: LockId) -> Result<Vec<AmigaDirEntry>, HandlerError> {
        self.ensure_running()?;
        let lock = self.locks.get(lock_id).ok_or(HandlerError::UnknownHandle)?;
        let handle = lock.handle;
        let seek0 = lock.rewind_pending;
        let entries = self.rfile.fread_dir(handle, DIRENT_READ_CHUNK, seek0)?;
        if let Some(lock) = self.locks.get_mut(lock_id) {
            lock.rewind_pending = false;
        }
        Ok(entries.iter().map(|e| populate(e, BCPL_NAME_CAPACITY)).collect())
    }

    /// `FINDINPUT`/`FINDUPDATE` — open for read, or read+write when
    /// `update` is set. Takes a shared lock, matching the reference
    /// handler's `CreateLock(handle, phandle, SHARED_LOCK)`.
    pub fn find_input(&mut self, parent: Handle, name: &str, update: bool) -> Result<(LockId, FilePosId), HandlerError> {
        self.ensure_running()?;
        let mode = if update { HM_MODE_READ | HM_MODE_WRITE } else { HM_MODE_READ };
        let (handle, _) = self.rfile.fopen(parent, mode, 0, name)?;
        self.open_file_records(handle, parent, AccessMode::Shared)
    }

    /// `FINDOUTPUT` — open for write, creating/truncating. Takes an
    /// exclusive lock, matching the reference handler's
    /// `CreateLock(handle, phandle, EXCLUSIVE_LOCK)`.
    pub fn find_output(&mut self, parent: Handle, name: &str) -> Result<(LockId, FilePosId), HandlerError> {
        self.ensure_running()?;
        let (handle, _) = self.rfile.fopen(parent, HM_MODE_WRITE | HM_MODE_CREATE | HM_MODE_TRUNC, 0o644, name)?;
        self.open_file_records(handle, parent, AccessMode::Exclusive)
    }

    fn open_file_records(&mut self, handle: Handle, parent: Handle, access: AccessMode) -> Result<(LockId, FilePosId), HandlerError> {
        let lock_id = self.insert_lock(handle, access, parent)?;
        let file_id = self.files.insert(handle);
        Ok((lock_id, file_id))
    }

    /// `END` — accepted even while shutting down.
    pub fn end(&mut self, lock_id: LockId, file_id: FilePosId) -> Result<(), HandlerError> {
        self.files.remove(file_id);
        self.free_lock(lock_id)
    }

    /// `READ` — loop `FREAD` until `want` bytes are collected or the
    /// remote reports EOF, advancing the mirrored position.
    pub fn read(&mut self, file_id: FilePosId, want: u32) -> Result<Vec<u8>, HandlerError> {
        self.ensure_running()?;
        let handle = self.files.get(file_id).ok_or(HandlerError::UnknownHandle)?.handle;
        let mut out = Vec::new();
        let mut remaining = want;
        while remaining > 0 {
            match self.rfile.fread(handle, remaining, false)? {
                Some(chunk) if !chunk.is_empty() => {
                    remaining -= chunk.len() as u32;
                    out.extend_from_slice(&chunk);
                }
                _ => break,
            }
        }
        self.files.advance(file_id, out.len() as u64);
        Ok(out)
    }

    /// `WRITE`
    pub fn write(&mut self, file_id: FilePosId, data: &[u8]) -> Result<(), HandlerError> {
        self.ensure_running()?;
        let handle = self.files.get(file_id).ok_or(HandlerError::UnknownHandle)?.handle;
        self.rfile.fwrite(handle, data, 0)?;
        self.files.advance(file_id, data.len() as u64);
        Ok(())
    }

    /// `SEEK` — returns the position before the seek, saturated to 32
    /// bits for the classic packet's `i32` result.
    pub fn seek(&mut self, file_id: FilePosId, offset: i64, whence: i32) -> Result<u32, HandlerError> {
        self.ensure_running()?;
        let handle = self.files.get(file_id).ok_or(HandlerError::UnknownHandle)?.handle;
        let (new_pos, prev_pos) = self.rfile.fseek(handle, offset, whence)?;
        self.files.set_pos(file_id, new_pos);
        Ok(prev_pos.min(u64::from(u32::MAX)) as u32)
    }

    /// `DELETE_OBJECT`
    pub fn delete_object(&mut self, parent: Handle, name: &str) -> Result<(), HandlerError> {
        self.ensure_running()?;
        self.rfile.fdelete(parent, name)?;
        Ok(())
    }

    /// `RENAME_OBJECT`
    pub fn rename_object(&mut self, src_parent: Handle, dst_parent: Handle, old_name: &str, new_name: &str) -> Result<(), HandlerError> {
        self.ensure_running()?;
        self.rfile.frename(src_parent, dst_parent, old_name, new_name)?;
        Ok(())
    }

    /// `MAKE_LINK` — resolves the hard-link target's path first, since
    /// FCREATE always takes a name rather than a lock.
    pub fn make_link(&mut self, parent: Handle, name: &str, hard_target: Option<LockId>, soft_target: &str, hard: bool) -> Result<(), HandlerError> {
        self.ensure_running()?;
        let (obj_type, target) = if hard {
            let lock_id = hard_target.ok_or(HandlerError::UnknownHandle)?;
            let handle = self.locks.get(lock_id).ok_or(HandlerError::UnknownHandle)?.handle;
            (HM_TYPE_HLINK, self.rfile.fpath(handle)?)
        } else {
            (HM_TYPE_LINK, soft_target.to_string())
        };
        self.rfile.fcreate(parent, obj_type, 0, name, &target)?;
        Ok(())
    }

    /// `READ_LINK`
    pub fn read_link(&mut self, parent: Handle, name: &str) -> Result<String, HandlerError> {
        self.ensure_running()?;
        let (handle, _) = self.rfile.fopen(parent, HM_MODE_READLINK, 0, name)?;
        let data = self.rfile.fread(handle, 1024, true)?.unwrap_or_default();
        self.rfile.fclose(handle)?;
        String::from_utf8(data).map_err(|_| HandlerError::Amiga(AmigaError::ObjectWrongType))
    }

    /// `PARENT` — trims the trailing path component and reopens it;
    /// `None` when `lock_id` already names a volume root.
    pub fn parent(&mut self, lock_id: LockId) -> Result<Option<LockId>, HandlerError> {
        self.ensure_running()?;
        let handle = self.locks.get(lock_id).ok_or(HandlerError::UnknownHandle)?.handle;
        let path = self.rfile.fpath(handle)?;
        let Some(trimmed) = trim_trailing_component(&path) else {
            return Ok(None);
        };
        let (new_handle, _) = self.rfile.fopen(Handle::DEFAULT_VOLUME, HM_MODE_READ, 0, &trimmed)?;
        Ok(Some(self.insert_lock(new_handle, AccessMode::Shared, Handle::VOLUME_DIR)?))
    }

    /// `SAME_LOCK` — compares handles first; falls back to comparing
    /// two independently fetched, owned path strings rather than
    /// aliasing a single shared scratch buffer across both `FPATH`
    /// calls.
    pub fn same_lock(&mut self, a: LockId, b: LockId) -> Result<bool, HandlerError> {
        self.ensure_running()?;
        let handle_a = self.locks.get(a).ok_or(HandlerError::UnknownHandle)?.handle;
        let handle_b = self.locks.get(b).ok_or(HandlerError::UnknownHandle)?.handle;
        if handle_a == handle_b {
            return Ok(true);
        }
        let path_a: String = self.rfile.fpath(handle_a)?;
        let path_b: String = self.rfile.fpath(handle_b)?;
        Ok(path_a == path_b)
    }

    /// `DISK_INFO`/`INFO` — the volume's own directory entry carries
    /// its size and block accounting.
    pub fn disk_info(&mut self, volume_handle: Handle) -> Result<VolumeInfo, HandlerError> {
        self.ensure_running()?;
        let entries = self.rfile.fread_dir(volume_handle, DIRENT_READ_CHUNK, true)?;
        let entry = entries.into_iter().next().ok_or(HandlerError::Amiga(AmigaError::ObjectNotFound))?;
        let blocks_total = if entry.blocksize > 0 { entry.size / u64::from(entry.blocksize) } else { 0 };
        Ok(VolumeInfo { blocksize: entry.blocksize, blocks_total, blocks_used: u64::from(entry.blocks) })
    }

    /// `CURRENT_VOLUME`
    pub fn current_volume_lock(&mut self) -> Result<LockId, HandlerError> {
        self.ensure_running()?;
        let (handle, _) = self.rfile.fopen(self.current_volume, HM_MODE_READDIR, 0, "")?;
        self.insert_lock(handle, AccessMode::Shared, Handle::VOLUME_DIR)
    }

    /// `SET_PROTECT`
    pub fn set_protect(&mut self, parent: Handle, name: &str, aperms: u32) -> Result<(), HandlerError> {
        self.ensure_running()?;
        self.rfile.fsetperms(parent, name, aperms)?;
        Ok(())
    }

    /// `DIE` — clears the running flag; remaining locks are expected
    /// to drain via `FREE_LOCK`/`END` as the client releases them.
    pub fn die(&mut self) {
        self.running = false;
    }

    pub fn open_lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Opens a named volume's own directory handle, as `VOLMGR`'s
    /// `seen` does for a newly advertised volume with no existing
    /// record.
    pub fn open_volume(&mut self, name: &str) -> Result<Handle, HandlerError> {
        let (handle, _) = self.rfile.fopen(Handle::DEFAULT_VOLUME, HM_MODE_READDIR, 0, name)?;
        Ok(handle)
    }

    /// Closes a bare remote handle outside the lock table, as `VOLMGR`
    /// does when a volume drops out of the DOS device list entirely.
    pub fn close_handle(&mut self, handle: Handle) -> Result<(), HandlerError> {
        self.rfile.fclose(handle)?;
        Ok(())
    }
}

/// Strip the trailing path component (the object's own name) off a
/// `FPATH` result, leaving the parent's path. `None` when the path is
/// already bare (no further parent to ascend to) — a volume root.
fn trim_trailing_component(path: &str) -> Option<String> {
    if let Some(idx) = path.rfind('/') {
        Some(path[..idx].to_string())
    } else if let Some(idx) = path.find(':') {
        if idx + 1 == path.len() {
            None
        } else {
            Some(path[..=idx].to_string())
        }
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use km_channel::{Channel, FramedRomPort};
    use km_framer::LoopbackWireIo;
    use km_msgq::MsgQueue;
    use km_wire::consts::{HM_TYPE_FILE, KM_OP_FCLOSE, KM_OP_FOPEN, KM_STATUS_INVALID, KM_STATUS_OK};
    use km_wire::{MsgHdr, Tag};

    fn queue_channel_reply(io: &mut LoopbackWireIo, status: u16, payload: &[u8]) {
        km_framer::frame_send(io, status, payload).expect("queue reply");
        let sent = std::mem::take(&mut io.outbound);
        io.inbound.extend(sent);
    }

    fn queue_rfile_reply(io: &mut LoopbackWireIo, op: u8, tag: Tag, status: u8, body: &[u8]) {
        queue_channel_reply(io, 0x00, &[]);
        let mut msg = MsgHdr::reply(op, status, tag).encode().to_vec();
        msg.extend_from_slice(body);
        queue_channel_reply(io, 0x00, &msg);
    }

    fn new_handler(io: LoopbackWireIo) -> Handler<FramedRomPort<LoopbackWireIo>> {
        Handler::new(RemoteFile::new(MsgQueue::new(Channel::new(FramedRomPort::new(io)))))
    }

    fn fopen_reply(handle: u32, obj_type: u16) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&handle.to_be_bytes());
        body.extend_from_slice(&obj_type.to_be_bytes());
        body
    }

    #[test]
    fn locate_object_then_free_lock() {
        let mut io = LoopbackWireIo::new();
        queue_rfile_reply(&mut io, KM_OP_FOPEN, Tag(0), KM_STATUS_OK, &fopen_reply(5, HM_TYPE_FILE));
        queue_rfile_reply(&mut io, KM_OP_FCLOSE, Tag(1), KM_STATUS_OK, &[]);

        let mut handler = new_handler(io);
        let lock_id = handler.locate_object(Handle::DEFAULT_VOLUME, "foo", false).expect("locate");
        assert_eq!(handler.open_lock_count(), 1);
        handler.free_lock(lock_id).expect("free");
        assert_eq!(handler.open_lock_count(), 0);
    }

    #[test]
    fn locate_object_falls_back_to_directory_open() {
        let mut io = LoopbackWireIo::new();
        queue_rfile_reply(&mut io, KM_OP_FOPEN, Tag(0), KM_STATUS_INVALID, &[]);
        queue_rfile_reply(&mut io, KM_OP_FOPEN, Tag(1), KM_STATUS_OK, &fopen_reply(9, HM_TYPE_DIR));

        let mut handler = new_handler(io);
        let lock_id = handler.locate_object(Handle::DEFAULT_VOLUME, "adir", false).expect("locate falls back");
        assert_eq!(handler.locks.get(lock_id).unwrap().handle, Handle(9));
    }

    #[test]
    fn exclusive_locate_object_conflicts_with_an_existing_lock_on_the_same_handle() {
        let mut io = LoopbackWireIo::new();
        queue_rfile_reply(&mut io, KM_OP_FOPEN, Tag(0), KM_STATUS_OK, &fopen_reply(5, HM_TYPE_FILE));
        queue_rfile_reply(&mut io, KM_OP_FOPEN, Tag(1), KM_STATUS_OK, &fopen_reply(5, HM_TYPE_FILE));
        queue_rfile_reply(&mut io, KM_OP_FCLOSE, Tag(2), KM_STATUS_OK, &[]);

        let mut handler = new_handler(io);
        handler.locate_object(Handle::DEFAULT_VOLUME, "foo", true).expect("first exclusive lock");
        let err = handler.locate_object(Handle::DEFAULT_VOLUME, "foo", true).unwrap_err();
        assert_eq!(err, HandlerError::Amiga(AmigaError::InUse));
        assert_eq!(handler.open_lock_count(), 1);
    }

    #[test]
    fn operations_after_die_are_rejected_except_free_lock_and_end() {
        let io = LoopbackWireIo::new();
        let mut handler = new_handler(io);
        handler.die();
        assert!(!handler.is_running());

        let err = handler.locate_object(Handle::DEFAULT_VOLUME, "foo", false).unwrap_err();
        assert_eq!(err, HandlerError::Amiga(AmigaError::DeviceNotMounted));

        // FREE_LOCK on an id that was never issued is a harmless no-op,
        // not rejected by the shutdown gate.
        handler.free_lock(LockId(0)).expect("free_lock still accepted while shutting down");
    }

    #[test]
    fn read_accumulates_across_short_reads_and_stops_on_eof() {
        let mut io = LoopbackWireIo::new();
        let mut reply = Vec::new();
        reply.extend_from_slice(&3u32.to_be_bytes());
        reply.extend_from_slice(b"abc");
        queue_rfile_reply(&mut io, km_wire::consts::KM_OP_FREAD, Tag(0), KM_STATUS_OK, &reply);
        queue_rfile_reply(&mut io, km_wire::consts::KM_OP_FREAD, Tag(1), km_wire::consts::KM_STATUS_EOF, &[]);

        let mut handler = new_handler(io);
        let file_id = handler.files.insert(Handle(42));
        let data = handler.read(file_id, 100).expect("read");
        assert_eq!(data, b"abc");
        assert_eq!(handler.files.get(file_id).unwrap().pos, 3);
    }

    #[test]
    fn same_lock_short_circuits_on_equal_handles() {
        let io = LoopbackWireIo::new();
        let mut handler = new_handler(io);
        let a = handler.locks.insert(Lock { handle: Handle(1), access: AccessMode::Shared, parent: Handle(0), rewind_pending: false });
        let b = handler.locks.insert(Lock { handle: Handle(1), access: AccessMode::Shared, parent: Handle(0), rewind_pending: false });
        assert!(handler.same_lock(a, b).expect("same_lock"));
    }

    #[test]
    fn same_lock_compares_fetched_paths_when_handles_differ() {
        let mut io = LoopbackWireIo::new();
        queue_rfile_reply(&mut io, km_wire::consts::KM_OP_FPATH, Tag(0), KM_STATUS_OK, b"Work:dir\0");
        queue_rfile_reply(&mut io, km_wire::consts::KM_OP_FPATH, Tag(1), KM_STATUS_OK, b"Work:dir\0");

        let mut handler = new_handler(io);
        let a = handler.locks.insert(Lock { handle: Handle(1), access: AccessMode::Shared, parent: Handle(0), rewind_pending: false });
        let b = handler.locks.insert(Lock { handle: Handle(2), access: AccessMode::Shared, parent: Handle(0), rewind_pending: false });
        assert!(handler.same_lock(a, b).expect("same_lock by path"));
    }

    #[test]
    fn parent_of_volume_root_is_none() {
        assert_eq!(trim_trailing_component("Work:"), None);
        assert_eq!(trim_trailing_component("Work:dir/sub"), Some("Work:dir".to_string()));
        assert_eq!(trim_trailing_component("Work:dir"), Some("Work:".to_string()));
    }
}
