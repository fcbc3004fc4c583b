//! The reader/writer thread pair that owns the actual serial device
//! I/O, per `spec.md` §5: "a single reader thread... a single writer
//! thread... with two shared byte ring buffers between them and the
//! serial device."

use std::io::{Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::ring::SyncRingBuffer;

const READ_CHUNK: usize = 256;
const WRITER_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct BridgeHandles {
    pub reader: JoinHandle<()>,
    pub writer: JoinHandle<()>,
    pub inbound: Arc<SyncRingBuffer>,
    pub outbound: Arc<SyncRingBuffer>,
}

/// Spawn the reader/writer pair over an already-open device, split
/// into its read and write halves (as `serialport::TryClone` or a
/// socket's `try_clone` would produce).
pub fn spawn<R, W>(mut reader: R, mut writer: W, ring_capacity: usize) -> BridgeHandles
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let inbound = Arc::new(SyncRingBuffer::new(ring_capacity));
    let outbound = Arc::new(SyncRingBuffer::new(ring_capacity));

    let reader_inbound = Arc::clone(&inbound);
    let reader_handle = thread::spawn(move || {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    eprintln!("hostbridge: reader saw EOF, stopping");
                    break;
                }
                Ok(n) => reader_inbound.push_slice(&buf[..n]),
                Err(e) => {
                    eprintln!("hostbridge: reader error: {e}");
                    break;
                }
            }
        }
    });

    let writer_outbound = Arc::clone(&outbound);
    let writer_handle = thread::spawn(move || loop {
        let Some(first) = writer_outbound.pop_timeout(WRITER_POLL_INTERVAL) else {
            continue;
        };
        let mut chunk = vec![first];
        while let Some(byte) = writer_outbound.try_pop() {
            chunk.push(byte);
        }
        if let Err(e) = writer.write_all(&chunk) {
            eprintln!("hostbridge: writer error: {e}");
            break;
        }
        if let Err(e) = writer.flush() {
            eprintln!("hostbridge: writer flush error: {e}");
            break;
        }
    });

    BridgeHandles { reader: reader_handle, writer: writer_handle, inbound, outbound }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    /// A `Write` sink the test can inspect after the writer thread
    /// has drained the outbound ring into it.
    struct RecordingWriter(Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for RecordingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn reader_thread_feeds_inbound_ring_from_the_device() {
        let source = Cursor::new(vec![0xAAu8, 0xBB, 0xCC]);
        let sink = Arc::new(std::sync::Mutex::new(Vec::new()));
        let handles = spawn(source, RecordingWriter(Arc::clone(&sink)), 64);
        for _ in 0..50 {
            if handles.inbound.len() == 3 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(handles.inbound.len(), 3);
    }

    #[test]
    fn writer_thread_drains_outbound_ring_to_the_device() {
        let source = Cursor::new(Vec::new());
        let sink = Arc::new(std::sync::Mutex::new(Vec::new()));
        let handles = spawn(source, RecordingWriter(Arc::clone(&sink)), 64);
        handles.outbound.push_slice(&[1, 2, 3]);
        for _ in 0..50 {
            if sink.lock().unwrap().len() == 3 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(*sink.lock().unwrap(), vec![1, 2, 3]);
    }
}
