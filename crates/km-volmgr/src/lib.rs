//! VOLMGR: dynamic volume discovery, DOS device-list integration, and
//! per-volume packet dispatch into `HANDLER`.
//!
//! Operations follow `spec.md` §4.7 exactly: `seen`/`flush`/`message`/
//! `close`. The DOS device list itself is a collaborator this crate
//! cannot own (see `dos_list::DosDeviceList`); node pointers are
//! represented only as published names, since that's all `seen`'s
//! collision resolution and `flush`'s withdrawal actually need.

pub mod dos_list;
pub mod packet;
pub mod volume;

pub use dos_list::{resolve_collision, sanitize_name, DosDeviceList, VecDosDeviceList};
pub use packet::{dispatch, Packet, PacketReply};
pub use volume::Volume;

use std::collections::{HashMap, VecDeque};

use km_channel::RomPort;
use km_handler::{Handler, HandlerError};
use km_wire::Handle;

pub struct VolumeManager<P, D> {
    handler: Handler<P>,
    dos_list: D,
    volumes: Vec<Volume>,
    pending: HashMap<u32, VecDeque<Packet>>,
}

impl<P: RomPort, D: DosDeviceList> VolumeManager<P, D> {
    pub fn new(handler: Handler<P>, dos_list: D) -> Self {
        Self { handler, dos_list, volumes: Vec::new(), pending: HashMap::new() }
    }

    pub fn into_handler(self) -> Handler<P> {
        self.handler
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    fn next_port_bit(&self) -> u32 {
        1u32 << (self.volumes.len() % 32)
    }

    /// A volume by `name` was advertised. Re-publish an existing,
    /// withdrawn record, or open and register a brand-new one.
    pub fn seen(&mut self, name: &str, atime: u32, flags: u32, bootpri: i8) -> Result<(), HandlerError> {
        if let Some(vol) = self.volumes.iter_mut().find(|v| v.name == name) {
            vol.seen += 1;
            vol.atime = atime;
            vol.flags = flags;
            vol.bootpri = bootpri;
            if !vol.in_dos_list {
                self.dos_list.add(&vol.published_name);
                vol.in_dos_list = true;
            }
            return Ok(());
        }

        let handle = self.handler.open_volume(name)?;
        let sanitized = sanitize_name(name);
        let published_name = resolve_collision(&sanitized, &self.dos_list);
        self.dos_list.add(&published_name);
        let port = self.next_port_bit();
        self.volumes.push(Volume {
            name: name.to_string(),
            published_name,
            handle,
            refcount: 0,
            in_dos_list: true,
            seen: 1,
            port,
            atime,
            flags,
            bootpri,
        });
        Ok(())
    }

    /// Withdraw every volume whose seen counter is still zero; drop
    /// (and close) any that also has no outstanding references. Resets
    /// every seen counter for the next advertisement cycle.
    pub fn flush(&mut self) -> Result<(), HandlerError> {
        let mut doomed = Vec::new();
        for (index, vol) in self.volumes.iter_mut().enumerate() {
            if vol.seen == 0 {
                if vol.in_dos_list {
                    self.dos_list.remove(&vol.published_name);
                    vol.in_dos_list = false;
                }
                if vol.refcount == 0 {
                    doomed.push(index);
                }
            }
        }
        for index in doomed.into_iter().rev() {
            let vol = self.volumes.remove(index);
            self.pending.remove(&vol.port);
            self.handler.close_handle(vol.handle)?;
        }
        for vol in &mut self.volumes {
            vol.seen = 0;
        }
        Ok(())
    }

    /// Queue a packet arriving on `name`'s message port, for the next
    /// `message` call to drain.
    pub fn submit(&mut self, name: &str, packet: Packet) {
        let Some(vol) = self.volumes.iter().find(|v| v.name == name) else {
            return;
        };
        self.pending.entry(vol.port).or_default().push_back(packet);
    }

    /// Drain every queued packet for each volume whose port bit is set
    /// in `mask`, dispatching each through `HANDLER` with that volume
    /// as the active context.
    pub fn message(&mut self, mask: u32) -> Vec<(String, PacketReply)> {
        let mut replies = Vec::new();
        let ports: Vec<(String, Handle, u32)> = self
            .volumes
            .iter()
            .filter(|v| v.port & mask != 0)
            .map(|v| (v.name.clone(), v.handle, v.port))
            .collect();

        for (name, handle, port) in ports {
            self.handler.set_current_volume(handle);
            if let Some(queue) = self.pending.get_mut(&port) {
                while let Some(packet) = queue.pop_front() {
                    let reply = dispatch(&mut self.handler, packet);
                    replies.push((name.clone(), reply));
                }
            }
        }
        replies
    }

    /// Force every volume's refcount to zero, as on shutdown. Callers
    /// typically follow this with `flush()` to withdraw and close them.
    pub fn close(&mut self) {
        for vol in &mut self.volumes {
            vol.refcount = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use km_channel::{Channel, FramedRomPort};
    use km_framer::LoopbackWireIo;
    use km_msgq::MsgQueue;
    use km_rfile::RemoteFile;
    use km_wire::consts::{HM_TYPE_DIR, KM_OP_FCLOSE, KM_OP_FOPEN, KM_STATUS_OK};
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

    fn fopen_reply(handle: u32, obj_type: u16) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&handle.to_be_bytes());
        body.extend_from_slice(&obj_type.to_be_bytes());
        body
    }

    fn new_volmgr(io: LoopbackWireIo) -> VolumeManager<FramedRomPort<LoopbackWireIo>, VecDosDeviceList> {
        let handler = Handler::new(RemoteFile::new(MsgQueue::new(Channel::new(FramedRomPort::new(io)))));
        VolumeManager::new(handler, VecDosDeviceList::new())
    }

    #[test]
    fn seen_opens_and_publishes_a_new_volume() {
        let mut io = LoopbackWireIo::new();
        queue_rfile_reply(&mut io, KM_OP_FOPEN, Tag(0), KM_STATUS_OK, &fopen_reply(3, HM_TYPE_DIR));

        let mut mgr = new_volmgr(io);
        mgr.seen("Work:", 0, 0, 0).expect("seen");
        assert_eq!(mgr.volumes().len(), 1);
        assert_eq!(mgr.volumes()[0].published_name, "Work:");
        assert!(mgr.volumes()[0].in_dos_list);
    }

    #[test]
    fn seen_twice_increments_counter_without_reopening() {
        let mut io = LoopbackWireIo::new();
        queue_rfile_reply(&mut io, KM_OP_FOPEN, Tag(0), KM_STATUS_OK, &fopen_reply(3, HM_TYPE_DIR));

        let mut mgr = new_volmgr(io);
        mgr.seen("Work:", 0, 0, 0).expect("first seen");
        mgr.seen("Work:", 1, 0, 0).expect("second seen");
        assert_eq!(mgr.volumes().len(), 1);
        assert_eq!(mgr.volumes()[0].seen, 2);
    }

    #[test]
    fn flush_withdraws_unseen_volumes_and_closes_when_unreferenced() {
        let mut io = LoopbackWireIo::new();
        queue_rfile_reply(&mut io, KM_OP_FOPEN, Tag(0), KM_STATUS_OK, &fopen_reply(3, HM_TYPE_DIR));
        queue_rfile_reply(&mut io, KM_OP_FCLOSE, Tag(1), KM_STATUS_OK, &[]);

        let mut mgr = new_volmgr(io);
        mgr.seen("Work:", 0, 0, 0).expect("seen");
        mgr.flush().expect("flush drops it: seen counter never incremented again");
        assert!(mgr.volumes().is_empty());
    }

    #[test]
    fn flush_keeps_volume_with_outstanding_refcount() {
        let mut io = LoopbackWireIo::new();
        queue_rfile_reply(&mut io, KM_OP_FOPEN, Tag(0), KM_STATUS_OK, &fopen_reply(3, HM_TYPE_DIR));

        let mut mgr = new_volmgr(io);
        mgr.seen("Work:", 0, 0, 0).expect("seen");
        mgr.volumes[0].refcount = 1;
        mgr.flush().expect("flush");
        assert_eq!(mgr.volumes().len(), 1);
        assert!(!mgr.volumes()[0].in_dos_list, "withdrawn from the DOS list despite refcount");
    }

    #[test]
    fn message_dispatches_queued_packets_for_masked_volume() {
        let mut io = LoopbackWireIo::new();
        queue_rfile_reply(&mut io, KM_OP_FOPEN, Tag(0), KM_STATUS_OK, &fopen_reply(3, HM_TYPE_DIR));
        queue_rfile_reply(&mut io, KM_OP_FOPEN, Tag(1), KM_STATUS_OK, &fopen_reply(5, km_wire::consts::HM_TYPE_FILE));

        let mut mgr = new_volmgr(io);
        mgr.seen("Work:", 0, 0, 0).expect("seen");
        let port = mgr.volumes()[0].port;
        mgr.submit("Work:", Packet::LocateObject { parent: Handle(3), name: "foo".into(), write: false });

        let replies = mgr.message(port);
        assert_eq!(replies.len(), 1);
        assert!(matches!(replies[0].1, PacketReply::Lock(_)));
    }

    #[test]
    fn close_zeroes_refcounts_so_a_following_flush_can_drop_everything() {
        let mut io = LoopbackWireIo::new();
        queue_rfile_reply(&mut io, KM_OP_FOPEN, Tag(0), KM_STATUS_OK, &fopen_reply(3, HM_TYPE_DIR));
        queue_rfile_reply(&mut io, KM_OP_FCLOSE, Tag(1), KM_STATUS_OK, &[]);

        let mut mgr = new_volmgr(io);
        mgr.seen("Work:", 0, 0, 0).expect("seen");
        mgr.volumes[0].refcount = 3;
        mgr.volumes[0].seen = 0;
        mgr.close();
        mgr.flush().expect("flush after close");
        assert!(mgr.volumes().is_empty());
    }
}
