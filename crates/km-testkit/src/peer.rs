//! `SimulatedPeer`: answers CHANNEL/MSGQ traffic (`KS_CMD_*`) against
//! an in-memory [`SimFs`], and unpacks `KS_CMD_MSG_SEND` payloads one
//! level further into `KM_OP_*` filesystem operations.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use km_wire::consts::{
    APP_STATE_HAVE_FILE, APP_STATE_SERVICE_UP, HM_MODE_NOFOLLOW, HM_MODE_TRUNC, HM_TYPE_DIR,
    HM_TYPE_HLINK, HM_TYPE_LINK, KM_OP_FCLOSE, KM_OP_FCREATE, KM_OP_FDELETE, KM_OP_FOPEN,
    KM_OP_FPATH, KM_OP_FREAD, KM_OP_FRENAME, KM_OP_FSEEK, KM_OP_FSETPERMS, KM_OP_FWRITE,
    KM_STATUS_EOF, KM_STATUS_EXIST, KM_STATUS_FAIL, KM_STATUS_INVALID, KM_STATUS_NOEXIST,
    KM_STATUS_NOTEMPTY, KM_STATUS_OK, KM_STATUS_UNKCMD, KS_CMD_APP_STATE, KS_CMD_LOOPBACK,
    KS_CMD_MSG_FLUSH, KS_CMD_MSG_INFO, KS_CMD_MSG_LOCK, KS_CMD_MSG_RECEIVE, KS_CMD_MSG_SEND,
    KS_CMD_TESTPATT, KS_STATUS_NODATA, KS_STATUS_OK,
};
use km_wire::{DirEnt, Handle, MsgHdr};

use crate::fs::{Node, SimFs};

struct OpenHandle {
    path: String,
    pos: usize,
    /// Set for handles opened with `HM_MODE_NOFOLLOW`, or for a volume
    /// root: the next read returns exactly one self-descriptive entry
    /// rather than the node's children.
    describe_self: bool,
}

fn take_cstr(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn encode_fread_reply(data: &[u8]) -> (u8, Vec<u8>) {
    let mut reply = Vec::with_capacity(4 + data.len());
    reply.extend_from_slice(&(data.len() as u32).to_be_bytes());
    reply.extend_from_slice(data);
    (KM_STATUS_OK, reply)
}

pub struct SimulatedPeer {
    fs: SimFs,
    open: std::collections::HashMap<Handle, OpenHandle>,
    next_handle: u32,
    pending: VecDeque<Vec<u8>>,
    app_state: u16,
    corrupt_replies: bool,
}

impl SimulatedPeer {
    pub fn new(fs: SimFs) -> Self {
        Self {
            fs,
            open: std::collections::HashMap::new(),
            next_handle: 1,
            pending: VecDeque::new(),
            app_state: APP_STATE_SERVICE_UP | APP_STATE_HAVE_FILE,
            corrupt_replies: false,
        }
    }

    pub fn fs_mut(&mut self) -> &mut SimFs {
        &mut self.fs
    }

    pub fn fs(&self) -> &SimFs {
        &self.fs
    }

    pub fn set_app_state(&mut self, bits: u16) {
        self.app_state = bits;
    }

    pub fn set_corrupt_replies(&mut self, corrupt: bool) {
        self.corrupt_replies = corrupt;
    }

    pub fn corrupt_replies(&self) -> bool {
        self.corrupt_replies
    }

    fn have_file(&self) -> bool {
        self.app_state & APP_STATE_HAVE_FILE != 0
    }

    fn alloc_handle(&mut self, path: String, describe_self: bool) -> Handle {
        let handle = Handle(self.next_handle);
        self.next_handle += 1;
        self.open.insert(handle, OpenHandle { path, pos: 0, describe_self });
        handle
    }

    fn parent_path(&self, parent: Handle) -> String {
        if parent.is_sentinel() {
            self.fs.root().to_string()
        } else {
            self.open
                .get(&parent)
                .map(|h| h.path.clone())
                .unwrap_or_else(|| self.fs.root().to_string())
        }
    }

    fn obj_type_of(&self, path: &str) -> Option<u16> {
        match self.fs.node(path) {
            Some(Node::File(_)) => Some(km_wire::consts::HM_TYPE_FILE),
            Some(Node::Dir(_)) => Some(HM_TYPE_DIR),
            Some(Node::Link(_)) => Some(HM_TYPE_LINK),
            None => None,
        }
    }

    fn dirent_for(&self, path: &str) -> Option<DirEnt> {
        let node = self.fs.node(path)?;
        let name = path
            .rsplit(['/', ':'])
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(path)
            .to_string();
        let (obj_type, size) = match node {
            Node::File(data) => (km_wire::consts::HM_TYPE_FILE, data.len() as u64),
            Node::Dir(children) => (HM_TYPE_DIR, children.len() as u64),
            Node::Link(target) => (HM_TYPE_LINK, target.len() as u64),
        };
        Some(DirEnt {
            obj_type,
            size,
            blocksize: 512,
            blocks: size.div_ceil(512) as u32,
            atime: 0,
            ctime: 0,
            mtime: 0,
            aperms: 0,
            ino: 0,
            uid: 0,
            gid: 0,
            mode: 0o644,
            nlink: 1,
            rdev: 0,
            name,
            comment: String::new(),
        })
    }

    /// Entry point from the frame-level transport: `cmd` is a
    /// `KS_CMD_*` word, `payload` its request bytes.
    pub fn dispatch(&mut self, cmd: u16, payload: &[u8]) -> (u16, Vec<u8>) {
        match cmd {
            KS_CMD_LOOPBACK => (KS_STATUS_OK, payload.to_vec()),
            KS_CMD_TESTPATT => (KS_STATUS_OK, vec![0xA5; 16]),
            KS_CMD_MSG_INFO => (KS_STATUS_OK, [0u8; 16].to_vec()),
            KS_CMD_MSG_LOCK => (KS_STATUS_OK, Vec::new()),
            KS_CMD_MSG_FLUSH => {
                self.pending.clear();
                (KS_STATUS_OK, Vec::new())
            }
            KS_CMD_APP_STATE => {
                (KS_STATUS_OK, self.app_state.to_be_bytes().to_vec())
            }
            KS_CMD_MSG_SEND => self.handle_msg_send(payload),
            KS_CMD_MSG_RECEIVE => self.handle_msg_receive(),
            _ => (KS_STATUS_NODATA, Vec::new()),
        }
        // KS_CMD_APP_STATE's set-variant (KS_APP_STATE_SET OR'd in) is
        // covered by the match above too since it isn't matched
        // separately: this peer's own advertised bits are driven
        // directly through `set_app_state`, not by the wire request.
    }

    fn handle_msg_send(&mut self, payload: &[u8]) -> (u16, Vec<u8>) {
        let Some(hdr) = MsgHdr::decode(payload) else {
            return (KS_STATUS_NODATA, Vec::new());
        };
        let body = payload[4..].to_vec();
        if self.have_file() {
            let (status, reply_body) = self.handle_op(hdr.opcode(), &body);
            let mut msg = MsgHdr::reply(hdr.opcode(), status, hdr.tag).encode().to_vec();
            msg.extend_from_slice(&reply_body);
            self.pending.push_back(msg);
        }
        // With file service down the request is accepted onto the wire
        // but never answered, so the following MSG_RECEIVE reports
        // NODATA, matching a peer that has gone away.
        (KS_STATUS_OK, Vec::new())
    }

    fn handle_msg_receive(&mut self) -> (u16, Vec<u8>) {
        match self.pending.pop_front() {
            Some(msg) => (KS_STATUS_OK, msg),
            None => (KS_STATUS_NODATA, Vec::new()),
        }
    }

    fn handle_op(&mut self, op: u8, body: &[u8]) -> (u8, Vec<u8>) {
        match op {
            KM_OP_FOPEN => self.op_fopen(body),
            KM_OP_FCLOSE => self.op_fclose(body),
            KM_OP_FREAD => self.op_fread(body),
            KM_OP_FWRITE => self.op_fwrite(body),
            KM_OP_FSEEK => self.op_fseek(body),
            KM_OP_FCREATE => self.op_fcreate(body),
            KM_OP_FDELETE => self.op_fdelete(body),
            KM_OP_FRENAME => self.op_frename(body),
            KM_OP_FPATH => self.op_fpath(body),
            KM_OP_FSETPERMS => (KM_STATUS_OK, Vec::new()),
            _ => (KM_STATUS_UNKCMD, Vec::new()),
        }
    }

    fn op_fopen(&mut self, body: &[u8]) -> (u8, Vec<u8>) {
        if body.len() < 12 {
            return (KM_STATUS_FAIL, Vec::new());
        }
        let parent = Handle(u32::from_be_bytes([body[0], body[1], body[2], body[3]]));
        let mode = u16::from_be_bytes([body[4], body[5]]);
        let name = take_cstr(&body[12..]);

        let parent_path = self.parent_path(parent);
        let path = self.fs.resolve(&parent_path, &name);

        if !self.fs.exists(&path) {
            if mode & km_wire::consts::HM_MODE_CREATE != 0 {
                self.fs.create(&path, Node::File(Vec::new()));
            } else {
                return (KM_STATUS_NOEXIST, Vec::new());
            }
        } else if mode & HM_MODE_TRUNC != 0 {
            if let Some(Node::File(data)) = self.fs.node_mut(&path) {
                data.clear();
            }
        }

        let Some(obj_type) = self.obj_type_of(&path) else {
            return (KM_STATUS_FAIL, Vec::new());
        };
        let describe_self = mode & HM_MODE_NOFOLLOW != 0 || path.ends_with(':');
        let handle = self.alloc_handle(path, describe_self);

        let mut reply = Vec::with_capacity(6);
        reply.extend_from_slice(&handle.0.to_be_bytes());
        reply.extend_from_slice(&obj_type.to_be_bytes());
        (KM_STATUS_OK, reply)
    }

    fn op_fclose(&mut self, body: &[u8]) -> (u8, Vec<u8>) {
        if body.len() < 4 {
            return (KM_STATUS_FAIL, Vec::new());
        }
        let handle = Handle(u32::from_be_bytes([body[0], body[1], body[2], body[3]]));
        self.open.remove(&handle);
        (KM_STATUS_OK, Vec::new())
    }

    fn op_fread(&mut self, body: &[u8]) -> (u8, Vec<u8>) {
        if body.len() < 10 {
            return (KM_STATUS_FAIL, Vec::new());
        }
        let handle = Handle(u32::from_be_bytes([body[0], body[1], body[2], body[3]]));
        let requested = u32::from_be_bytes([body[4], body[5], body[6], body[7]]) as usize;
        let flags = u16::from_be_bytes([body[8], body[9]]);
        let seek0 = flags & km_wire::consts::HM_FLAG_SEEK0 != 0;

        let Some(path) = self.open.get(&handle).map(|h| h.path.clone()) else {
            return (KM_STATUS_FAIL, Vec::new());
        };
        if seek0 {
            if let Some(open) = self.open.get_mut(&handle) {
                open.pos = 0;
            }
        }
        let describe_self = self.open.get(&handle).is_some_and(|h| h.describe_self);

        if describe_self {
            let open = self.open.get_mut(&handle).expect("checked above");
            if open.pos > 0 {
                return (KM_STATUS_EOF, Vec::new());
            }
            open.pos = 1;
            let Some(entry) = self.dirent_for(&path) else {
                return (KM_STATUS_FAIL, Vec::new());
            };
            return encode_fread_reply(&entry.encode());
        }

        match self.fs.node(&path).cloned() {
            Some(Node::File(data)) => {
                let open = self.open.get_mut(&handle).expect("checked above");
                if open.pos >= data.len() {
                    return (KM_STATUS_EOF, Vec::new());
                }
                let take = requested.min(data.len() - open.pos);
                let chunk = data[open.pos..open.pos + take].to_vec();
                open.pos += take;
                encode_fread_reply(&chunk)
            }
            Some(Node::Dir(_)) => {
                let open_pos = self.open.get(&handle).expect("checked above").pos;
                let children = self.fs.children(&path);
                if open_pos >= children.len() {
                    return (KM_STATUS_EOF, Vec::new());
                }
                let mut data = Vec::new();
                let mut consumed = 0usize;
                for name in &children[open_pos..] {
                    let child_path = self.fs.resolve(&path, name);
                    let Some(entry) = self.dirent_for(&child_path) else { continue };
                    let encoded = entry.encode();
                    if !data.is_empty() && data.len() + encoded.len() > requested {
                        break;
                    }
                    data.extend_from_slice(&encoded);
                    consumed += 1;
                }
                self.open.get_mut(&handle).expect("checked above").pos = open_pos + consumed.max(1);
                encode_fread_reply(&data)
            }
            _ => (KM_STATUS_FAIL, Vec::new()),
        }
    }

    fn op_fwrite(&mut self, body: &[u8]) -> (u8, Vec<u8>) {
        if body.len() < 10 {
            return (KM_STATUS_FAIL, Vec::new());
        }
        let handle = Handle(u32::from_be_bytes([body[0], body[1], body[2], body[3]]));
        let len = u32::from_be_bytes([body[4], body[5], body[6], body[7]]) as usize;
        if body.len() < 10 + len {
            return (KM_STATUS_FAIL, Vec::new());
        }
        let data = body[10..10 + len].to_vec();

        let Some(path) = self.open.get(&handle).map(|h| h.path.clone()) else {
            return (KM_STATUS_FAIL, Vec::new());
        };
        let pos = self.open.get(&handle).expect("checked above").pos;
        match self.fs.node_mut(&path) {
            Some(Node::File(bytes)) => {
                if pos + len > bytes.len() {
                    bytes.resize(pos + len, 0);
                }
                bytes[pos..pos + len].copy_from_slice(&data);
                self.open.get_mut(&handle).expect("checked above").pos += len;
                (KM_STATUS_OK, Vec::new())
            }
            _ => (KM_STATUS_INVALID, Vec::new()),
        }
    }

    fn op_fseek(&mut self, body: &[u8]) -> (u8, Vec<u8>) {
        if body.len() < 14 {
            return (KM_STATUS_FAIL, Vec::new());
        }
        let handle = Handle(u32::from_be_bytes([body[0], body[1], body[2], body[3]]));
        let hi = u32::from_be_bytes([body[4], body[5], body[6], body[7]]);
        let lo = u32::from_be_bytes([body[8], body[9], body[10], body[11]]);
        let offset = (((hi as u64) << 32) | lo as u64) as i64;
        let whence = i16::from_be_bytes([body[12], body[13]]);

        let Some(path) = self.open.get(&handle).map(|h| h.path.clone()) else {
            return (KM_STATUS_FAIL, Vec::new());
        };
        let len = match self.fs.node(&path) {
            Some(Node::File(data)) => data.len() as i64,
            _ => 0,
        };
        let open = self.open.get_mut(&handle).expect("checked above");
        let prev = open.pos as i64;
        let base = match whence {
            -1 => 0,
            1 => len,
            _ => prev,
        };
        let new_pos = (base + offset).clamp(0, len) as usize;
        open.pos = new_pos;

        let mut reply = Vec::with_capacity(16);
        reply.extend_from_slice(&((new_pos as u64 >> 32) as u32).to_be_bytes());
        reply.extend_from_slice(&(new_pos as u32).to_be_bytes());
        reply.extend_from_slice(&((prev as u64 >> 32) as u32).to_be_bytes());
        reply.extend_from_slice(&(prev as u32).to_be_bytes());
        (KM_STATUS_OK, reply)
    }

    fn op_fcreate(&mut self, body: &[u8]) -> (u8, Vec<u8>) {
        if body.len() < 10 {
            return (KM_STATUS_FAIL, Vec::new());
        }
        let parent = Handle(u32::from_be_bytes([body[0], body[1], body[2], body[3]]));
        let obj_type = u16::from_be_bytes([body[4], body[5]]);
        let rest = &body[10..];
        let name = take_cstr(rest);
        let target = take_cstr(&rest[name.len() + 1..]);

        let parent_path = self.parent_path(parent);
        let path = self.fs.resolve(&parent_path, &name);
        if self.fs.exists(&path) {
            return (KM_STATUS_EXIST, Vec::new());
        }
        match obj_type {
            t if t == HM_TYPE_DIR => self.fs.create(&path, Node::Dir(Vec::new())),
            t if t == HM_TYPE_LINK || t == HM_TYPE_HLINK => self.fs.create(&path, Node::Link(target)),
            _ => self.fs.create(&path, Node::File(Vec::new())),
        }
        (KM_STATUS_OK, Vec::new())
    }

    fn op_fdelete(&mut self, body: &[u8]) -> (u8, Vec<u8>) {
        if body.len() < 4 {
            return (KM_STATUS_FAIL, Vec::new());
        }
        let parent = Handle(u32::from_be_bytes([body[0], body[1], body[2], body[3]]));
        let name = take_cstr(&body[4..]);
        let parent_path = self.parent_path(parent);
        let path = self.fs.resolve(&parent_path, &name);
        match self.fs.node(&path) {
            None => (KM_STATUS_NOEXIST, Vec::new()),
            Some(Node::Dir(children)) if !children.is_empty() => (KM_STATUS_NOTEMPTY, Vec::new()),
            Some(_) => {
                self.fs.remove(&path);
                (KM_STATUS_OK, Vec::new())
            }
        }
    }

    fn op_frename(&mut self, body: &[u8]) -> (u8, Vec<u8>) {
        if body.len() < 8 {
            return (KM_STATUS_FAIL, Vec::new());
        }
        let src_parent = Handle(u32::from_be_bytes([body[0], body[1], body[2], body[3]]));
        let dst_parent = Handle(u32::from_be_bytes([body[4], body[5], body[6], body[7]]));
        let rest = &body[8..];
        let old_name = take_cstr(rest);
        let new_name = take_cstr(&rest[old_name.len() + 1..]);

        let src_path = self.fs.resolve(&self.parent_path(src_parent), &old_name);
        let dst_path = self.fs.resolve(&self.parent_path(dst_parent), &new_name);
        if !self.fs.exists(&src_path) {
            return (KM_STATUS_NOEXIST, Vec::new());
        }
        if self.fs.rename(&src_path, &dst_path) {
            (KM_STATUS_OK, Vec::new())
        } else {
            (KM_STATUS_EXIST, Vec::new())
        }
    }

    fn op_fpath(&mut self, body: &[u8]) -> (u8, Vec<u8>) {
        if body.len() < 4 {
            return (KM_STATUS_FAIL, Vec::new());
        }
        let handle = Handle(u32::from_be_bytes([body[0], body[1], body[2], body[3]]));
        match self.open.get(&handle) {
            Some(open) => {
                let mut reply = open.path.clone().into_bytes();
                reply.push(0);
                (KM_STATUS_OK, reply)
            }
            None => (KM_STATUS_FAIL, Vec::new()),
        }
    }
}

/// Shared handle to a [`SimulatedPeer`], held by both the transport
/// that drives it and the test that seeds/inspects it mid-scenario.
#[derive(Clone)]
pub struct PeerHandle(Arc<Mutex<SimulatedPeer>>);

impl PeerHandle {
    pub fn new(peer: SimulatedPeer) -> Self {
        Self(Arc::new(Mutex::new(peer)))
    }

    pub fn with_fs<R>(&self, f: impl FnOnce(&mut SimFs) -> R) -> R {
        f(self.0.lock().expect("peer mutex poisoned").fs_mut())
    }

    pub fn set_app_state(&self, bits: u16) {
        self.0.lock().expect("peer mutex poisoned").set_app_state(bits);
    }

    pub fn set_corrupt_replies(&self, corrupt: bool) {
        self.0.lock().expect("peer mutex poisoned").set_corrupt_replies(corrupt);
    }

    pub(crate) fn dispatch(&self, cmd: u16, payload: &[u8]) -> (u16, Vec<u8>) {
        self.0.lock().expect("peer mutex poisoned").dispatch(cmd, payload)
    }

    pub(crate) fn corrupt_replies(&self) -> bool {
        self.0.lock().expect("peer mutex poisoned").corrupt_replies()
    }
}
