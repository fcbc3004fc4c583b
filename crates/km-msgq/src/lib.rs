//! MSGQ: two logical ring-buffer queues (Amiga→USB, USB→Amiga)
//! described to this side only through size counters, driven over
//! CHANNEL. Handles streaming fragmentation above the peer's per-frame
//! maximum and tag-filtered receive.

pub mod error;
pub mod info;

pub use error::MsgqError;
pub use info::QueueInfo;

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use km_channel::{Channel, ChannelError, RomPort};
use km_wire::consts::{
    KS_CMD_MSG_FLUSH, KS_CMD_MSG_INFO, KS_CMD_MSG_LOCK, KS_CMD_MSG_RECEIVE, KS_CMD_MSG_SEND,
    KS_MSG_UNLOCK, KS_STATUS_BADLEN, KS_STATUS_NODATA,
};
use km_wire::{MsgHdr, Tag};

/// Largest single-frame message the peer accepts; larger messages
/// must be streamed (`spec.md` §4.3).
pub const PEER_MAX_MSG: usize = 2000;
const MAX_SEND_RETRIES: usize = 10;
const MAX_RECV_TAG_RETRIES: usize = 50;
const RETRY_PACE: Duration = Duration::from_millis(1);

pub struct MsgQueue<P> {
    chan: Channel<P>,
    /// Messages read off the wire while waiting on a different tag,
    /// bucketed by opcode so a later `msg_recv_matching` call for that
    /// op can claim them instead of the peer's traffic being dropped.
    pending: HashMap<u8, VecDeque<Vec<u8>>>,
}

impl<P: RomPort> MsgQueue<P> {
    pub fn new(chan: Channel<P>) -> Self {
        Self { chan, pending: HashMap::new() }
    }

    pub fn into_inner(self) -> Channel<P> {
        self.chan
    }

    pub fn msg_info(&mut self) -> Result<QueueInfo, MsgqError> {
        let (_, reply) = self.chan.cmd(KS_CMD_MSG_INFO, &[], info::QUEUE_INFO_LEN)?;
        QueueInfo::decode(&reply).ok_or(MsgqError::ShortReply)
    }

    /// Send one logical message. `data` must begin with the message's
    /// own 4-byte `MsgHdr`; messages longer than [`PEER_MAX_MSG`] are
    /// streamed in fragments, each re-prefixed with a copy of that
    /// header, per `spec.md` §4.3.
    pub fn msg_send(&mut self, data: &[u8]) -> Result<(), MsgqError> {
        if data.len() <= PEER_MAX_MSG {
            return self.send_fragment(data);
        }

        let hdr = &data[..4];
        let body = &data[4..];
        for chunk in body.chunks(PEER_MAX_MSG - 4) {
            let mut frag = Vec::with_capacity(4 + chunk.len());
            frag.extend_from_slice(hdr);
            frag.extend_from_slice(chunk);
            self.send_fragment(&frag)?;
        }
        Ok(())
    }

    fn send_fragment(&mut self, frag: &[u8]) -> Result<(), MsgqError> {
        for _ in 0..MAX_SEND_RETRIES {
            match self.chan.cmd(KS_CMD_MSG_SEND, frag, 0) {
                Ok(_) => return Ok(()),
                Err(ChannelError::Channel(status)) if status == KS_STATUS_BADLEN => {
                    std::thread::sleep(RETRY_PACE);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(MsgqError::SendRetriesExhausted)
    }

    /// Fetch one logical message from the opposite queue. If `tag` is
    /// given, discard messages that don't match it, up to
    /// [`MAX_RECV_TAG_RETRIES`] attempts. Returns the raw reply bytes
    /// including the leading `MsgHdr`.
    pub fn msg_recv(&mut self, max: usize, tag: Option<Tag>) -> Result<Vec<u8>, MsgqError> {
        let attempts = if tag.is_some() { MAX_RECV_TAG_RETRIES } else { 1 };
        for _ in 0..attempts {
            match self.chan.cmd(KS_CMD_MSG_RECEIVE, &[], max) {
                Ok((_, reply)) => {
                    let hdr = MsgHdr::decode(&reply).ok_or(MsgqError::ShortReply)?;
                    if let Some(want) = tag {
                        if hdr.tag != want {
                            continue;
                        }
                    }
                    return Ok(reply);
                }
                Err(ChannelError::Channel(status)) if status == KS_STATUS_NODATA => {
                    return Err(MsgqError::NoData);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(MsgqError::TagRetriesExhausted)
    }

    /// Fetch the reply to a specific outstanding request: `op` is the
    /// opcode RFILE is waiting on and `tag` the tag it allocated. Any
    /// unrelated message read along the way is queued under its own
    /// opcode rather than discarded, so a later call for that op finds
    /// it without waiting on fresh peer traffic.
    pub fn msg_recv_matching(&mut self, max: usize, op: u8, tag: Tag) -> Result<Vec<u8>, MsgqError> {
        if let Some(queue) = self.pending.get_mut(&op) {
            if let Some(pos) = queue
                .iter()
                .position(|m| MsgHdr::decode(m).is_some_and(|h| h.tag == tag))
            {
                return Ok(queue.remove(pos).expect("position came from this queue"));
            }
        }

        for _ in 0..MAX_RECV_TAG_RETRIES {
            match self.chan.cmd(KS_CMD_MSG_RECEIVE, &[], max) {
                Ok((_, reply)) => {
                    let hdr = MsgHdr::decode(&reply).ok_or(MsgqError::ShortReply)?;
                    if hdr.opcode() == op && hdr.tag == tag {
                        return Ok(reply);
                    }
                    self.pending.entry(hdr.opcode()).or_default().push_back(reply);
                }
                Err(ChannelError::Channel(status)) if status == KS_STATUS_NODATA => {
                    return Err(MsgqError::NoData);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(MsgqError::TagRetriesExhausted)
    }

    /// Continue reading subsequent fragments of the logical message
    /// identified by `op`/`tag`, stripping the repeated `MsgHdr` from
    /// each and concatenating payload until `remaining` bytes are
    /// consumed.
    pub fn msg_recv_cont(&mut self, op: u8, tag: Tag, mut remaining: usize) -> Result<Vec<u8>, MsgqError> {
        let mut out = Vec::with_capacity(remaining);
        while remaining > 0 {
            let fragment = self.msg_recv_matching(remaining + 4, op, tag)?;
            let payload = &fragment[4..];
            let take = payload.len().min(remaining);
            out.extend_from_slice(&payload[..take]);
            remaining -= take;
        }
        Ok(out)
    }

    pub fn msg_lock(&mut self, mask: u8) -> Result<(), MsgqError> {
        self.chan.cmd(KS_CMD_MSG_LOCK, &[mask], 0)?;
        Ok(())
    }

    pub fn msg_unlock(&mut self, mask: u8) -> Result<(), MsgqError> {
        self.chan.cmd(KS_CMD_MSG_LOCK | KS_MSG_UNLOCK, &[mask], 0)?;
        Ok(())
    }

    pub fn msg_flush(&mut self) -> Result<(), MsgqError> {
        self.chan.cmd(KS_CMD_MSG_FLUSH, &[], 0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use km_channel::FramedRomPort;
    use km_framer::LoopbackWireIo;

    /// Queue a reply frame directly onto a loopback transport's inbound
    /// side, as if the peer had already written it.
    fn queue_reply(io: &mut LoopbackWireIo, status: u16, payload: &[u8]) {
        km_framer::frame_send(io, status, payload).expect("queue reply");
        let sent = std::mem::take(&mut io.outbound);
        io.inbound.extend(sent);
    }

    fn new_queue(io: LoopbackWireIo) -> MsgQueue<FramedRomPort<LoopbackWireIo>> {
        MsgQueue::new(Channel::new(FramedRomPort::new(io)))
    }

    #[test]
    fn msg_info_decodes_counters() {
        let mut io = LoopbackWireIo::new();
        let mut info = Vec::new();
        info.extend_from_slice(&10u32.to_be_bytes());
        info.extend_from_slice(&20u32.to_be_bytes());
        info.extend_from_slice(&30u32.to_be_bytes());
        info.extend_from_slice(&40u32.to_be_bytes());
        queue_reply(&mut io, 0x00, &info);

        let mut q = new_queue(io);
        let got = q.msg_info().expect("info");
        assert_eq!(got.atou_inuse, 10);
        assert_eq!(got.utoa_avail, 40);
    }

    #[test]
    fn msg_recv_reports_no_data() {
        let mut io = LoopbackWireIo::new();
        queue_reply(&mut io, KS_STATUS_NODATA, &[]);

        let mut q = new_queue(io);
        let err = q.msg_recv(64, None).unwrap_err();
        assert_eq!(err, MsgqError::NoData);
    }

    #[test]
    fn msg_recv_filters_by_tag() {
        let mut io = LoopbackWireIo::new();
        let mismatched = MsgHdr::request(0x12, Tag(1)).encode();
        let matched = MsgHdr::request(0x12, Tag(2)).encode();
        queue_reply(&mut io, 0x00, &mismatched);
        queue_reply(&mut io, 0x00, &matched);

        let mut q = new_queue(io);
        let got = q.msg_recv(64, Some(Tag(2))).expect("recv");
        let hdr = MsgHdr::decode(&got).expect("hdr");
        assert_eq!(hdr.tag, Tag(2));
    }

    #[test]
    fn unmatched_message_is_queued_by_op_not_discarded() {
        let mut io = LoopbackWireIo::new();
        // An unrelated FOPEN reply arrives first, then the FREAD reply
        // we're actually waiting for.
        let unrelated = MsgHdr::request(0x10, Tag(5)).encode();
        let wanted = MsgHdr::request(0x12, Tag(9)).encode();
        queue_reply(&mut io, 0x00, &unrelated);
        queue_reply(&mut io, 0x00, &wanted);

        let mut q = new_queue(io);
        let got = q.msg_recv_matching(64, 0x12, Tag(9)).expect("recv");
        let hdr = MsgHdr::decode(&got).expect("hdr");
        assert_eq!(hdr.opcode(), 0x12);
        assert_eq!(hdr.tag, Tag(9));

        // The unrelated FOPEN reply was queued, not dropped.
        assert_eq!(q.pending.get(&0x10).map(VecDeque::len), Some(1));
        let recovered = q.msg_recv_matching(64, 0x10, Tag(5)).expect("recv from pending");
        let recovered_hdr = MsgHdr::decode(&recovered).expect("hdr");
        assert_eq!(recovered_hdr.tag, Tag(5));
    }

    #[test]
    fn msg_send_splits_large_messages_into_header_prefixed_fragments() {
        let mut io = LoopbackWireIo::new();
        // 4-byte header + 3000-byte body needs two fragments at
        // PEER_MAX_MSG - 4 bytes of body each.
        for _ in 0..2 {
            queue_reply(&mut io, 0x00, &[]);
        }

        let mut q = new_queue(io);
        let mut data = MsgHdr::request(0x12, Tag(1)).encode().to_vec();
        data.extend(std::iter::repeat(0xAB).take(3000));
        q.msg_send(&data).expect("fragmented send");
    }

    #[test]
    fn msg_recv_cont_strips_header_from_each_fragment() {
        let mut io = LoopbackWireIo::new();
        let mut first = MsgHdr::reply(0x12, 0, Tag(7)).encode().to_vec();
        first.extend_from_slice(&[1, 2, 3, 4]);
        let mut second = MsgHdr::reply(0x12, 0, Tag(7)).encode().to_vec();
        second.extend_from_slice(&[5, 6]);
        queue_reply(&mut io, 0x00, &first);
        queue_reply(&mut io, 0x00, &second);

        let mut q = new_queue(io);
        let data = q.msg_recv_cont(0x12, Tag(7), 6).expect("cont");
        assert_eq!(data, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn lock_and_unlock_round_trip() {
        let mut io = LoopbackWireIo::new();
        queue_reply(&mut io, 0x00, &[]);
        queue_reply(&mut io, 0x00, &[]);

        let mut q = new_queue(io);
        q.msg_lock(0x01).expect("lock");
        q.msg_unlock(0x01).expect("unlock");
    }
}
