//! Diagnostic front-end for the host side of the KickSmash link: open
//! a serial device, spawn the reader/writer bridge, and either probe
//! it once with `KS_CMD_LOOPBACK` or run `km-volmgr`'s dispatch sweep,
//! logging connect/keepalive events to stderr.

use std::fs::OpenOptions;
use std::process;
use std::time::Duration;

use km_channel::Channel;
use km_handler::Handler;
use km_hostbridge::config::BridgeConfig;
use km_hostbridge::{serial_rom_port, spawn};
use km_msgq::MsgQueue;
use km_rfile::RemoteFile;
use km_volmgr::{VecDosDeviceList, VolumeManager};

struct CliArgs {
    device_path: Option<String>,
    loopback_only: bool,
}

fn print_usage_and_exit(code: i32) -> ! {
    eprintln!("Usage: smashhost [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --device <path>   Serial device to open [default: /dev/ttyACM0]");
    eprintln!("  --loopback        Send one KS_CMD_LOOPBACK probe and exit");
    eprintln!("  -h, --help        Show this help");
    process::exit(code);
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut device_path = None;
    let mut loopback_only = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--device" => {
                i += 1;
                device_path = args.get(i).cloned();
            }
            "--loopback" => loopback_only = true,
            "-h" | "--help" => print_usage_and_exit(0),
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage_and_exit(1);
            }
        }
        i += 1;
    }

    CliArgs { device_path, loopback_only }
}

fn main() {
    let args = parse_args();
    let mut config = BridgeConfig::default();
    if let Some(path) = args.device_path {
        config.device_path = path;
    }

    let reader = OpenOptions::new().read(true).open(&config.device_path).unwrap_or_else(|e| {
        eprintln!("smashhost: failed to open {} for reading: {e}", config.device_path);
        process::exit(1);
    });
    let writer = OpenOptions::new().write(true).open(&config.device_path).unwrap_or_else(|e| {
        eprintln!("smashhost: failed to open {} for writing: {e}", config.device_path);
        process::exit(1);
    });

    eprintln!("smashhost: connected to {}", config.device_path);
    let bridge = spawn(reader, writer, config.ring_capacity);
    let port = serial_rom_port(bridge.inbound.clone(), bridge.outbound.clone(), Duration::from_millis(500));
    let mut channel = Channel::new(port);

    if args.loopback_only {
        match channel.loopback(b"smashhost") {
            Ok(reply) => eprintln!("smashhost: loopback ok: {reply:?}"),
            Err(e) => eprintln!("smashhost: loopback failed: {e}"),
        }
        return;
    }

    let handler = Handler::new(RemoteFile::new(MsgQueue::new(channel)));
    let mut volmgr = VolumeManager::new(handler, VecDosDeviceList::new());

    eprintln!("smashhost: entering dispatch loop, keepalive every {:?}", config.keepalive_interval());
    loop {
        if let Err(e) = volmgr.flush() {
            eprintln!("smashhost: volume sweep failed: {e}");
        }
        std::thread::sleep(config.keepalive_interval());
    }
}
