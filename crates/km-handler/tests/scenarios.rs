//! End-to-end scenarios driven through a simulated peer rather than
//! hand-queued frames: every layer from `Handler` down through
//! `RemoteFile`/`MsgQueue`/`Channel`/`FramedRomPort` is exercised for
//! real, only the bus itself is in-memory.

use km_handler::bcpl::bcpl_name_to_string;
use km_handler::{AmigaError, HandlerError};
use km_msgq::MsgqError;
use km_rfile::RfileError;
use km_testkit::{handler_over, SimFs};
use km_wire::Handle;

fn fresh() -> (km_handler::Handler<km_testkit::SimulatedRomPort>, km_testkit::PeerHandle) {
    handler_over(SimFs::new("Work"))
}

#[test]
fn happy_path_read_returns_file_contents() {
    let (mut handler, peer) = fresh();
    peer.with_fs(|fs| fs.write_file("Work:readme.txt", b"hello world"));

    let (lock_id, file_id) = handler
        .find_input(Handle::DEFAULT_VOLUME, "readme.txt", false)
        .expect("open for read");
    let data = handler.read(file_id, 100).expect("read");
    assert_eq!(data, b"hello world");
    handler.end(lock_id, file_id).expect("end");
    assert_eq!(handler.open_lock_count(), 0);
}

#[test]
fn write_then_verify_lands_in_the_simulated_filesystem() {
    let (mut handler, peer) = fresh();

    let (lock_id, file_id) = handler
        .find_output(Handle::DEFAULT_VOLUME, "out.txt")
        .expect("open for write");
    handler.write(file_id, b"payload").expect("write");
    handler.end(lock_id, file_id).expect("end");

    peer.with_fs(|fs| {
        assert_eq!(fs.read_file("Work:out.txt"), Some(b"payload".as_slice()));
    });
}

#[test]
fn directory_iteration_lists_children_then_runs_dry() {
    let (mut handler, peer) = fresh();
    peer.with_fs(|fs| {
        fs.mkdir("Work:dir");
        fs.write_file("Work:dir/a", b"1");
        fs.write_file("Work:dir/b", b"22");
        fs.write_file("Work:dir/c", b"333");
    });

    let lock_id = handler
        .locate_object(Handle::DEFAULT_VOLUME, "dir", false)
        .expect("locate dir");
    let first = handler.examine_object(lock_id).expect("examine_object");
    assert_eq!(first.entry_type, 2); // ST_USERDIR

    let mut names = Vec::new();
    loop {
        let batch = handler.examine_next(lock_id).expect("examine_next");
        if batch.is_empty() {
            break;
        }
        for entry in &batch {
            names.push(bcpl_name_to_string(&entry.name_bcpl).expect("name"));
        }
    }
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[test]
fn cross_directory_rename_moves_the_object() {
    let (mut handler, peer) = fresh();
    peer.with_fs(|fs| {
        fs.mkdir("Work:src");
        fs.mkdir("Work:dst");
        fs.write_file("Work:src/file.txt", b"data");
    });

    let before = handler
        .locate_object(Handle::DEFAULT_VOLUME, "src/file.txt", false)
        .expect("object exists before rename");
    handler.free_lock(before).expect("free");

    handler
        .rename_object(Handle::DEFAULT_VOLUME, Handle::DEFAULT_VOLUME, "src/file.txt", "dst/file.txt")
        .expect("rename");

    let after_old = handler.locate_object(Handle::DEFAULT_VOLUME, "src/file.txt", false);
    assert_eq!(after_old.unwrap_err(), HandlerError::Amiga(AmigaError::ObjectNotFound));

    let after_new = handler
        .locate_object(Handle::DEFAULT_VOLUME, "dst/file.txt", false)
        .expect("object exists at new path");
    handler.free_lock(after_new).expect("free");
}

#[test]
fn corrupted_reply_surfaces_as_a_transport_error() {
    let (mut handler, peer) = fresh();
    peer.with_fs(|fs| fs.write_file("Work:readme.txt", b"hello"));
    peer.set_corrupt_replies(true);

    let err = handler
        .locate_object(Handle::DEFAULT_VOLUME, "readme.txt", false)
        .expect_err("corrupted frame must not be accepted as a valid reply");
    assert!(matches!(
        err,
        HandlerError::Rfile(RfileError::Msgq(MsgqError::Channel(
            km_channel::ChannelError::Transport(km_framer::TransportError::BadCrc)
        )))
    ));
}

#[test]
fn peer_with_file_service_down_reports_device_not_mounted() {
    let (mut handler, peer) = fresh();
    peer.with_fs(|fs| fs.write_file("Work:readme.txt", b"hello"));
    peer.set_app_state(0);

    let err = handler
        .locate_object(Handle::DEFAULT_VOLUME, "readme.txt", false)
        .expect_err("peer with no file service never answers");
    assert_eq!(err, HandlerError::Amiga(AmigaError::DeviceNotMounted));
}
