//! In-memory simulated peer for end-to-end tests across the KickSmash
//! core: a [`fs::SimFs`] answers filesystem requests, [`peer::SimulatedPeer`]
//! speaks the `KS_CMD_*`/`KM_OP_*` protocol against it, and
//! [`wire::SimulatedWireIo`] plugs that into the same `WireIo` seam the
//! real ROM bus and serial bridge use.

pub mod fs;
pub mod peer;
pub mod wire;

pub use fs::{Node, SimFs};
pub use peer::{PeerHandle, SimulatedPeer};
pub use wire::SimulatedWireIo;

use km_channel::{Channel, FramedRomPort};
use km_handler::Handler;
use km_msgq::MsgQueue;
use km_rfile::RemoteFile;
use km_volmgr::{VecDosDeviceList, VolumeManager};

pub type SimulatedRomPort = FramedRomPort<SimulatedWireIo>;

/// Build a `Handler` wired to a fresh simulated peer seeded with `fs`,
/// plus the shared handle tests use to seed/inspect/corrupt the peer
/// mid-scenario.
pub fn handler_over(fs: SimFs) -> (Handler<SimulatedRomPort>, PeerHandle) {
    let peer = PeerHandle::new(SimulatedPeer::new(fs));
    let io = SimulatedWireIo::new(peer.clone());
    let port = FramedRomPort::new(io);
    let chan = Channel::new(port);
    let msgq = MsgQueue::new(chan);
    let rfile = RemoteFile::new(msgq);
    (Handler::new(rfile), peer)
}

/// As [`handler_over`], but also wraps the handler in a `VolumeManager`
/// with an in-memory DOS device list.
pub fn volume_manager_over(
    fs: SimFs,
) -> (VolumeManager<SimulatedRomPort, VecDosDeviceList>, PeerHandle) {
    let (handler, peer) = handler_over(fs);
    (VolumeManager::new(handler, VecDosDeviceList::default()), peer)
}
