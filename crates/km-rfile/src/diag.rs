//! Small diagnostic surface over [`RemoteFile`]: `ls`/`get`/`put`/`stat`.
//!
//! `original_source/amiga/smashftp.c` is a full interactive FTP-like
//! client built over RFILE; this module exposes the handful of
//! primitive operations it's built from as plain functions so
//! `smashhost` and integration tests can drive an open → read → close
//! round trip without an AmigaOS packet layer. It is a library
//! surface, not a shell — `smashftp.c`'s REPL stays out of scope.

use km_channel::RomPort;
use km_wire::consts::{HM_MODE_READ, HM_MODE_READDIR, HM_MODE_WRITE, HM_MODE_CREATE, HM_MODE_TRUNC};
use km_wire::{DirEnt, Handle};

use crate::{RemoteFile, RfileError};

/// List the entries of the directory at `parent`/`name` (or `parent`
/// directly if `name` is empty).
pub fn ls<P: RomPort>(rfile: &mut RemoteFile<P>, parent: Handle, name: &str) -> Result<Vec<DirEnt>, RfileError> {
    let (handle, _) = rfile.fopen(parent, HM_MODE_READDIR, 0, name)?;
    let entries = rfile.fread_dir(handle, 64 * 1024, true);
    rfile.fclose(handle)?;
    entries
}

/// Read the whole contents of `parent`/`name`.
pub fn get<P: RomPort>(rfile: &mut RemoteFile<P>, parent: Handle, name: &str) -> Result<Vec<u8>, RfileError> {
    let (handle, _) = rfile.fopen(parent, HM_MODE_READ, 0, name)?;
    let mut out = Vec::new();
    loop {
        match rfile.fread(handle, 64 * 1024, out.is_empty()) {
            Ok(Some(chunk)) if chunk.is_empty() => break,
            Ok(Some(chunk)) => out.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(e) => {
                let _ = rfile.fclose(handle);
                return Err(e);
            }
        }
    }
    rfile.fclose(handle)?;
    Ok(out)
}

/// Write `data` as the whole contents of `parent`/`name`, creating or
/// truncating it first.
pub fn put<P: RomPort>(rfile: &mut RemoteFile<P>, parent: Handle, name: &str, data: &[u8]) -> Result<(), RfileError> {
    let (handle, _) = rfile.fopen(parent, HM_MODE_WRITE | HM_MODE_CREATE | HM_MODE_TRUNC, 0o644, name)?;
    let result = rfile.fwrite(handle, data, 0);
    rfile.fclose(handle)?;
    result
}

/// Resolve `parent`/`name` to its remote object type, then release it.
/// A thin stand-in for `smashftp.c`'s `stat` command: just enough to
/// distinguish files/directories/links without the full `DirEnt`
/// metadata `ls` already provides for directory listings.
pub fn stat<P: RomPort>(rfile: &mut RemoteFile<P>, parent: Handle, name: &str) -> Result<u16, RfileError> {
    let (handle, obj_type) = rfile.fopen(parent, HM_MODE_READ, 0, name)?;
    rfile.fclose(handle)?;
    Ok(obj_type)
}
