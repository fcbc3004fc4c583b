//! RFILE: the stateless remote-file protocol layered on MSGQ.
//!
//! Each operation allocates a tag, builds a tagged-variant request (one
//! encoder per op, per `spec.md` §9's "polymorphism over message
//! variants" note — no structural inheritance between request and
//! reply), submits it, and maps the reply status to a local error.
//!
//! Every reply this module hands back is a freshly owned `Vec<u8>` or
//! `String`; there is no scratch buffer shared across calls, so the
//! single-buffer aliasing discipline `spec.md` §4.5 calls out for the
//! reference implementation does not carry over here.

pub mod diag;
pub mod error;

pub use error::{check_status, is_eof, RemoteStatus, RfileError};

use km_channel::RomPort;
use km_msgq::MsgQueue;
use km_wire::consts::{
    KM_OP_FCLOSE, KM_OP_FCREATE, KM_OP_FDELETE, KM_OP_FOPEN, KM_OP_FPATH, KM_OP_FREAD,
    KM_OP_FRENAME, KM_OP_FSEEK, KM_OP_FSETDATE, KM_OP_FSETOWN, KM_OP_FSETPERMS, KM_OP_FWRITE,
};
use km_wire::{DirEnt, Handle, MsgHdr, Tag, TagAllocator};

/// Selects which timestamp `FSETDATE` reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhichTime {
    Mtime,
    Ctime,
    Atime,
}

impl WhichTime {
    fn wire(self) -> u16 {
        match self {
            Self::Mtime => 0,
            Self::Ctime => 1,
            Self::Atime => 2,
        }
    }
}

fn nul_terminated(s: &str) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

fn take_c_string(buf: &[u8]) -> Result<String, RfileError> {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..end].to_vec()).map_err(|_| RfileError::InvalidUtf8)
}

pub struct RemoteFile<P> {
    msgq: MsgQueue<P>,
    tags: TagAllocator,
}

impl<P: RomPort> RemoteFile<P> {
    pub fn new(msgq: MsgQueue<P>) -> Self {
        Self { msgq, tags: TagAllocator::new() }
    }

    pub fn into_inner(self) -> MsgQueue<P> {
        self.msgq
    }

    fn request(&mut self, op: u8, body: &[u8], reply_max: usize) -> Result<(Tag, u8, Vec<u8>), RfileError> {
        let tag = self.tags.alloc();
        let mut msg = Vec::with_capacity(4 + body.len());
        msg.extend_from_slice(&MsgHdr::request(op, tag).encode());
        msg.extend_from_slice(body);
        self.msgq.msg_send(&msg)?;

        let reply = self.msgq.msg_recv_matching(reply_max + 4, op, tag)?;
        let hdr = MsgHdr::decode(&reply).ok_or(RfileError::ShortReply)?;
        Ok((tag, hdr.status, reply[4..].to_vec()))
    }

    /// Open, reopen (empty `name` on an existing handle), or create
    /// (via `mode`'s `HM_MODE_CREATE`) an object. `mode` combines
    /// `HM_MODE_*` bits; `"::"`/`":"` name prefixes select absolute vs.
    /// volume-relative resolution.
    pub fn fopen(&mut self, parent: Handle, mode: u16, aperms: u32, name: &str) -> Result<(Handle, u16), RfileError> {
        let mut body = Vec::new();
        body.extend_from_slice(&parent.0.to_be_bytes());
        body.extend_from_slice(&mode.to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes()); // type, reserved on open
        body.extend_from_slice(&aperms.to_be_bytes());
        body.extend_from_slice(&nul_terminated(name));

        let (_, status, reply) = self.request(KM_OP_FOPEN, &body, 6)?;
        check_status(status)?;
        if reply.len() < 6 {
            return Err(RfileError::ShortReply);
        }
        let handle = Handle(u32::from_be_bytes([reply[0], reply[1], reply[2], reply[3]]));
        let obj_type = u16::from_be_bytes([reply[4], reply[5]]);
        Ok((handle, obj_type))
    }

    pub fn fclose(&mut self, handle: Handle) -> Result<(), RfileError> {
        let (_, status, _) = self.request(KM_OP_FCLOSE, &handle.0.to_be_bytes(), 0)?;
        check_status(status)
    }

    /// Read up to `requested_len` bytes (or directory entries) starting
    /// at the current position. `seek0` rewinds first. Returns `None`
    /// on `KM_STATUS_EOF` (no more data).
    pub fn fread(&mut self, handle: Handle, requested_len: u32, seek0: bool) -> Result<Option<Vec<u8>>, RfileError> {
        const FLAG_SEEK0: u16 = km_wire::consts::HM_FLAG_SEEK0;
        let mut body = Vec::new();
        body.extend_from_slice(&handle.0.to_be_bytes());
        body.extend_from_slice(&requested_len.to_be_bytes());
        body.extend_from_slice(&(if seek0 { FLAG_SEEK0 } else { 0 }).to_be_bytes());

        let (tag, status, reply) = self.request(KM_OP_FREAD, &body, requested_len as usize + 4)?;
        if is_eof(status) {
            return Ok(None);
        }
        check_status(status)?;
        if reply.len() < 4 {
            return Err(RfileError::ShortReply);
        }
        let total_len = u32::from_be_bytes([reply[0], reply[1], reply[2], reply[3]]) as usize;
        let mut data = reply[4..].to_vec();
        if data.len() < total_len {
            let rest = self.msgq.msg_recv_cont(KM_OP_FREAD, tag, total_len - data.len())?;
            data.extend_from_slice(&rest);
        }
        data.truncate(total_len);
        Ok(Some(data))
    }

    /// Convenience over [`Self::fread`] for directory handles: decode
    /// the returned bytes as a sequence of `DirEnt` records.
    pub fn fread_dir(&mut self, handle: Handle, max_entries_bytes: u32, seek0: bool) -> Result<Vec<DirEnt>, RfileError> {
        let Some(bytes) = self.fread(handle, max_entries_bytes, seek0)? else {
            return Ok(Vec::new());
        };
        let mut entries = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let (entry, used) = DirEnt::decode(&bytes[offset..])?;
            entries.push(entry);
            offset += used;
        }
        Ok(entries)
    }

    /// Write may be split across several frames by MSGQ; RFILE itself
    /// issues a single logical request.
    pub fn fwrite(&mut self, handle: Handle, data: &[u8], flags: u16) -> Result<(), RfileError> {
        let mut body = Vec::with_capacity(10 + data.len());
        body.extend_from_slice(&handle.0.to_be_bytes());
        body.extend_from_slice(&(data.len() as u32).to_be_bytes());
        body.extend_from_slice(&flags.to_be_bytes());
        body.extend_from_slice(data);

        let (_, status, _) = self.request(KM_OP_FWRITE, &body, 0)?;
        check_status(status)
    }

    /// `whence` outside `[-1, 1]` is clamped, per `spec.md` §4.5.
    pub fn fseek(&mut self, handle: Handle, offset: i64, whence: i32) -> Result<(u64, u64), RfileError> {
        let whence = whence.clamp(-1, 1) as i16;
        let mut body = Vec::new();
        body.extend_from_slice(&handle.0.to_be_bytes());
        body.extend_from_slice(&((offset >> 32) as u32).to_be_bytes());
        body.extend_from_slice(&(offset as u32).to_be_bytes());
        body.extend_from_slice(&whence.to_be_bytes());

        let (_, status, reply) = self.request(KM_OP_FSEEK, &body, 16)?;
        check_status(status)?;
        if reply.len() < 16 {
            return Err(RfileError::ShortReply);
        }
        let u32_at = |o: usize| u32::from_be_bytes([reply[o], reply[o + 1], reply[o + 2], reply[o + 3]]);
        let new_pos = (u64::from(u32_at(0)) << 32) | u64::from(u32_at(4));
        let prev_pos = (u64::from(u32_at(8)) << 32) | u64::from(u32_at(12));
        Ok((new_pos, prev_pos))
    }

    /// For `HM_TYPE_LINK`, `target_name` is the stored symlink text.
    /// For `HM_TYPE_HLINK`, it is the path of an existing object
    /// already resolved by the caller.
    pub fn fcreate(&mut self, parent: Handle, obj_type: u16, aperms: u32, name: &str, target_name: &str) -> Result<(), RfileError> {
        let mut body = Vec::new();
        body.extend_from_slice(&parent.0.to_be_bytes());
        body.extend_from_slice(&obj_type.to_be_bytes());
        body.extend_from_slice(&aperms.to_be_bytes());
        body.extend_from_slice(&nul_terminated(name));
        body.extend_from_slice(&nul_terminated(target_name));

        let (_, status, _) = self.request(KM_OP_FCREATE, &body, 0)?;
        check_status(status)
    }

    /// An empty directory is required for a directory delete.
    pub fn fdelete(&mut self, parent: Handle, name: &str) -> Result<(), RfileError> {
        let mut body = Vec::new();
        body.extend_from_slice(&parent.0.to_be_bytes());
        body.extend_from_slice(&nul_terminated(name));

        let (_, status, _) = self.request(KM_OP_FDELETE, &body, 0)?;
        check_status(status)
    }

    /// May cross volume boundaries at the peer's discretion.
    pub fn frename(&mut self, src_parent: Handle, dst_parent: Handle, old_name: &str, new_name: &str) -> Result<(), RfileError> {
        let mut body = Vec::new();
        body.extend_from_slice(&src_parent.0.to_be_bytes());
        body.extend_from_slice(&dst_parent.0.to_be_bytes());
        body.extend_from_slice(&nul_terminated(old_name));
        body.extend_from_slice(&nul_terminated(new_name));

        let (_, status, _) = self.request(KM_OP_FRENAME, &body, 0)?;
        check_status(status)
    }

    pub fn fpath(&mut self, handle: Handle) -> Result<String, RfileError> {
        let (_, status, reply) = self.request(KM_OP_FPATH, &handle.0.to_be_bytes(), 1024)?;
        check_status(status)?;
        take_c_string(&reply)
    }

    pub fn fsetperms(&mut self, parent: Handle, name: &str, aperms: u32) -> Result<(), RfileError> {
        let mut body = Vec::new();
        body.extend_from_slice(&parent.0.to_be_bytes());
        body.extend_from_slice(&aperms.to_be_bytes());
        body.extend_from_slice(&nul_terminated(name));

        let (_, status, _) = self.request(KM_OP_FSETPERMS, &body, 0)?;
        check_status(status)
    }

    pub fn fsetown(&mut self, parent: Handle, name: &str, uid: u32, gid: u32) -> Result<(), RfileError> {
        let mut body = Vec::new();
        body.extend_from_slice(&parent.0.to_be_bytes());
        body.extend_from_slice(&uid.to_be_bytes());
        body.extend_from_slice(&gid.to_be_bytes());
        body.extend_from_slice(&nul_terminated(name));

        let (_, status, _) = self.request(KM_OP_FSETOWN, &body, 0)?;
        check_status(status)
    }

    /// Returns the previous value of the selected timestamp.
    pub fn fsetdate(&mut self, parent: Handle, name: &str, which: WhichTime, set: Option<(u32, u32)>) -> Result<(u32, u32), RfileError> {
        let (secs, nsecs) = set.unwrap_or((0, 0));
        let mut body = Vec::new();
        body.extend_from_slice(&parent.0.to_be_bytes());
        body.extend_from_slice(&which.wire().to_be_bytes());
        body.extend_from_slice(&(u16::from(set.is_some())).to_be_bytes());
        body.extend_from_slice(&secs.to_be_bytes());
        body.extend_from_slice(&nsecs.to_be_bytes());
        body.extend_from_slice(&nul_terminated(name));

        let (_, status, reply) = self.request(KM_OP_FSETDATE, &body, 8)?;
        check_status(status)?;
        if reply.len() < 8 {
            return Err(RfileError::ShortReply);
        }
        let prev_secs = u32::from_be_bytes([reply[0], reply[1], reply[2], reply[3]]);
        let prev_nsecs = u32::from_be_bytes([reply[4], reply[5], reply[6], reply[7]]);
        Ok((prev_secs, prev_nsecs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use km_channel::{Channel, FramedRomPort};
    use km_framer::LoopbackWireIo;

    /// Queue one CHANNEL-level reply (an ack for `msg_send`, or the
    /// payload for `msg_recv`) directly onto the loopback transport.
    fn queue_channel_reply(io: &mut LoopbackWireIo, status: u16, payload: &[u8]) {
        km_framer::frame_send(io, status, payload).expect("queue reply");
        let sent = std::mem::take(&mut io.outbound);
        io.inbound.extend(sent);
    }

    /// Queue the full exchange for one logical RFILE request: an ack
    /// for the `msg_send` that carries the request, then a message
    /// reply (carrying `reply_op|REPLY`, `status`, the request's tag,
    /// and `body`) for the `msg_recv` that fetches it.
    fn queue_rfile_reply(io: &mut LoopbackWireIo, op: u8, tag: Tag, status: u8, body: &[u8]) {
        queue_channel_reply(io, 0x00, &[]);
        let mut msg = MsgHdr::reply(op, status, tag).encode().to_vec();
        msg.extend_from_slice(body);
        queue_channel_reply(io, 0x00, &msg);
    }

    fn new_rfile(io: LoopbackWireIo) -> RemoteFile<FramedRomPort<LoopbackWireIo>> {
        RemoteFile::new(MsgQueue::new(Channel::new(FramedRomPort::new(io))))
    }

    #[test]
    fn fopen_then_fclose_round_trip() {
        let mut io = LoopbackWireIo::new();
        let mut body = Vec::new();
        body.extend_from_slice(&77u32.to_be_bytes());
        body.extend_from_slice(&km_wire::consts::HM_TYPE_FILE.to_be_bytes());
        queue_rfile_reply(&mut io, KM_OP_FOPEN, Tag(0), 0, &body);
        queue_rfile_reply(&mut io, KM_OP_FCLOSE, Tag(1), 0, &[]);

        let mut rfile = new_rfile(io);
        let (handle, obj_type) = rfile
            .fopen(Handle(0), km_wire::consts::HM_MODE_READ, 0, "foo")
            .expect("fopen");
        assert_eq!(handle, Handle(77));
        assert_eq!(obj_type, km_wire::consts::HM_TYPE_FILE);

        rfile.fclose(handle).expect("fclose");
    }

    #[test]
    fn fopen_maps_remote_status_to_error() {
        let mut io = LoopbackWireIo::new();
        queue_rfile_reply(&mut io, KM_OP_FOPEN, Tag(0), km_wire::consts::KM_STATUS_NOEXIST, &[]);

        let mut rfile = new_rfile(io);
        let err = rfile.fopen(Handle(0), 0, 0, "missing").unwrap_err();
        assert_eq!(err, RfileError::Remote(RemoteStatus::NoExist));
    }

    #[test]
    fn fseek_clamps_whence_outside_unit_range() {
        let mut io = LoopbackWireIo::new();
        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes());
        queue_rfile_reply(&mut io, KM_OP_FSEEK, Tag(0), 0, &body);

        let mut rfile = new_rfile(io);
        rfile.fseek(Handle(1), 100, 7).expect("fseek");

        // First sent frame is the KS_CMD_MSG_SEND carrying this
        // request: magic(4) + length + cmd + MsgHdr (2 halfwords) +
        // handle (2) + offset-hi (2) + offset-lo (2) + whence (1).
        let io = rfile.into_inner().into_inner().into_inner().into_inner();
        let whence = io.outbound[14] as i16;
        assert_eq!(whence, 1, "whence=7 should clamp to +1");
    }

    #[test]
    fn fread_dir_decodes_entries() {
        let mut io = LoopbackWireIo::new();
        let mut body = Vec::new();
        let entry = DirEnt {
            obj_type: km_wire::consts::HM_TYPE_FILE,
            size: 10,
            blocksize: 512,
            blocks: 1,
            atime: 0,
            ctime: 0,
            mtime: 0,
            aperms: 0,
            ino: 1,
            uid: 0,
            gid: 0,
            mode: 0o644,
            nlink: 1,
            rdev: 0,
            name: "a.txt".to_string(),
            comment: String::new(),
        };
        let encoded = entry.encode();
        body.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
        body.extend_from_slice(&encoded);
        queue_rfile_reply(&mut io, KM_OP_FREAD, Tag(0), 0, &body);

        let mut rfile = new_rfile(io);
        let entries = rfile.fread_dir(Handle(5), 4096, true).expect("fread_dir");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a.txt");
    }
}
