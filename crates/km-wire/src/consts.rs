//! Wire-level constants: magic sequence, KS channel opcodes/status, KM
//! message opcodes/status, and the filesystem type/mode/flag bit layouts.
//!
//! Values are taken from the KickSmash firmware's `smash_cmd.h` and
//! `host_cmd.h` headers; see `DESIGN.md` for the exact source mapping.

/// Four 16-bit words that open every frame on the wire.
pub const FRAME_MAGIC: [u16; 4] = [0x0204, 0x1017, 0x0119, 0x0117];

/// Minimum number of half-words the framer must scan before giving up
/// on finding the magic sequence.
pub const MAGIC_SCAN_MIN_HALFWORDS: usize = 128;

/// Known idle bus literal used to detect that the peer has released
/// the ROM data bus during recovery.
pub const ROM_IDLE_LITERAL: u32 = 0x1114_4EF9;

/// CRC polynomial used by the STM32-style big-endian, left-shift CRC.
pub const CRC_POLY: u32 = 0x04C1_1DB7;

// ---------------------------------------------------------------------
// KS_CMD_* — commands sent to Kicksmash over the ROM bus channel.
// ---------------------------------------------------------------------

pub const KS_CMD_NULL: u16 = 0x00;
pub const KS_CMD_NOP: u16 = 0x01;
pub const KS_CMD_ID: u16 = 0x02;
pub const KS_CMD_UPTIME: u16 = 0x03;
pub const KS_CMD_TESTPATT: u16 = 0x04;
pub const KS_CMD_LOOPBACK: u16 = 0x05;
pub const KS_CMD_MSG_INFO: u16 = 0x20;
pub const KS_CMD_MSG_SEND: u16 = 0x21;
pub const KS_CMD_MSG_RECEIVE: u16 = 0x22;
pub const KS_CMD_MSG_LOCK: u16 = 0x23;
pub const KS_CMD_MSG_FLUSH: u16 = 0x24;
pub const KS_CMD_APP_STATE: u16 = 0x25;

/// OR'd into `KS_CMD_APP_STATE` to request a masked state update rather
/// than a query.
pub const KS_APP_STATE_SET: u16 = 0x0100;

/// OR'd into `KS_CMD_MSG_LOCK` to unlock instead of lock.
pub const KS_MSG_UNLOCK: u16 = 0x0100;

// ---------------------------------------------------------------------
// APP_STATE_* — bits of the 16-bit liveness mask each side advertises.
// ---------------------------------------------------------------------

/// This side's message/file service is up and accepting requests.
pub const APP_STATE_SERVICE_UP: u16 = 0x0001;
/// The peer offers the remote-file service (RFILE).
pub const APP_STATE_HAVE_FILE: u16 = 0x0002;
/// The peer handles `KM_OP_LOOPBACK`.
pub const APP_STATE_HAVE_LOOPBACK: u16 = 0x0004;

// ---------------------------------------------------------------------
// KS_STATUS_* — channel-level status (high byte non-zero per spec).
// ---------------------------------------------------------------------

pub const KS_STATUS_OK: u16 = 0x0000;
pub const KS_STATUS_FAIL: u16 = 0x0100;
pub const KS_STATUS_CRC: u16 = 0x0200;
pub const KS_STATUS_UNKCMD: u16 = 0x0300;
pub const KS_STATUS_BADARG: u16 = 0x0400;
pub const KS_STATUS_BADLEN: u16 = 0x0500;
pub const KS_STATUS_NODATA: u16 = 0x0600;
pub const KS_STATUS_LOCKED: u16 = 0x0700;

// ---------------------------------------------------------------------
// KM_OP_* — message opcodes carried in `MsgHdr::op` (low 7 bits).
// ---------------------------------------------------------------------

pub const KM_OP_NULL: u8 = 0x00;
pub const KM_OP_NOP: u8 = 0x01;
pub const KM_OP_ID: u8 = 0x02;
pub const KM_OP_LOOPBACK: u8 = 0x06;
pub const KM_OP_FOPEN: u8 = 0x10;
pub const KM_OP_FCLOSE: u8 = 0x11;
pub const KM_OP_FREAD: u8 = 0x12;
pub const KM_OP_FWRITE: u8 = 0x13;
pub const KM_OP_FSEEK: u8 = 0x14;
pub const KM_OP_FCREATE: u8 = 0x15;
pub const KM_OP_FDELETE: u8 = 0x16;
pub const KM_OP_FRENAME: u8 = 0x17;
pub const KM_OP_FPATH: u8 = 0x18;
pub const KM_OP_FSETPERMS: u8 = 0x19;
pub const KM_OP_FSETOWN: u8 = 0x1a;
pub const KM_OP_FSETDATE: u8 = 0x1b;

/// Set in `MsgHdr::op` on reply messages.
pub const KM_OP_REPLY: u8 = 0x80;
/// Mask isolating the opcode from the reply bit.
pub const KM_OP_MASK: u8 = 0x7f;

// ---------------------------------------------------------------------
// KM_STATUS_* — remote file-layer status carried in reply `MsgHdr::status`.
// ---------------------------------------------------------------------

pub const KM_STATUS_OK: u8 = 0x00;
pub const KM_STATUS_FAIL: u8 = 0x01;
pub const KM_STATUS_EOF: u8 = 0x02;
pub const KM_STATUS_UNKCMD: u8 = 0x03;
pub const KM_STATUS_PERM: u8 = 0x04;
pub const KM_STATUS_INVALID: u8 = 0x05;
pub const KM_STATUS_NOTEMPTY: u8 = 0x06;
pub const KM_STATUS_NOEXIST: u8 = 0x07;
pub const KM_STATUS_EXIST: u8 = 0x08;

// ---------------------------------------------------------------------
// HM_TYPE_* — object type codes (FOPEN reply, DirEnt).
// ---------------------------------------------------------------------

pub const HM_TYPE_UNKNOWN: u16 = 0x0000;
pub const HM_TYPE_FILE: u16 = 0x0001;
pub const HM_TYPE_DIR: u16 = 0x0002;
pub const HM_TYPE_LINK: u16 = 0x0003;
pub const HM_TYPE_HLINK: u16 = 0x0004;
pub const HM_TYPE_BDEV: u16 = 0x0005;
pub const HM_TYPE_CDEV: u16 = 0x0006;
pub const HM_TYPE_FIFO: u16 = 0x0007;
pub const HM_TYPE_SOCKET: u16 = 0x0008;
pub const HM_TYPE_WHTOUT: u16 = 0x0009;
pub const HM_TYPE_VOLUME: u16 = 0x000a;
pub const HM_TYPE_VOLDIR: u16 = 0x000b;

// ---------------------------------------------------------------------
// HM_MODE_* — FOPEN mode bits.
// ---------------------------------------------------------------------

pub const HM_MODE_READ: u16 = 0x0001;
pub const HM_MODE_WRITE: u16 = 0x0002;
pub const HM_MODE_RDWR: u16 = 0x0003;
pub const HM_MODE_APPEND: u16 = 0x0004;
pub const HM_MODE_CREATE: u16 = 0x0100;
pub const HM_MODE_TRUNC: u16 = 0x0200;
pub const HM_MODE_DIR: u16 = 0x0800;
pub const HM_MODE_READDIR: u16 = HM_MODE_DIR | HM_MODE_READ;
pub const HM_MODE_NOFOLLOW: u16 = 0x1000;
pub const HM_MODE_LINK: u16 = 0x2000;
pub const HM_MODE_READLINK: u16 = HM_MODE_LINK | HM_MODE_READ;

/// Seek the start of the directory/file before the read (`FREAD` flags).
pub const HM_FLAG_SEEK0: u16 = 0x0001;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readdir_is_dir_or_read() {
        assert_eq!(HM_MODE_READDIR, 0x0801);
    }

    #[test]
    fn readlink_is_link_or_read() {
        assert_eq!(HM_MODE_READLINK, 0x2001);
    }
}
