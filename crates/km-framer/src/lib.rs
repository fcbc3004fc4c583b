//! FRAMER: the magic-framed, CRC-protected wire codec the ROM-bus
//! channel is built on. Operates on half-words through the `WireIo`
//! seam so the same codec serves the real ROM bus capture path and
//! in-memory test transports alike.

pub mod error;
pub mod frame;
pub mod wire_io;

pub use error::TransportError;
pub use frame::{frame_recv, frame_send};
pub use wire_io::{LoopbackWireIo, WireIo};
