//! The USB-host side of the KickSmash link: a `RomPort` over a serial
//! transport, the reader/writer thread pair that drives it, and a
//! small diagnostic front-end (`bin/smashhost.rs`).

pub mod bridge;
pub mod config;
pub mod ring;
pub mod serial_port;

pub use bridge::{spawn, BridgeHandles};
pub use config::BridgeConfig;
pub use ring::SyncRingBuffer;
pub use serial_port::{serial_rom_port, RingWireIo, SerialRomPort};
