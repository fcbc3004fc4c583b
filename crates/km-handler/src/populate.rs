//! Directory-entry population: convert a remote `DirEnt` into the
//! Amiga-facing representation `spec.md` §4.6 describes — remote type
//! mapped to a local entry-type code, name copied into a BCPL buffer
//! (truncated to capacity minus 2), mtime/blocks/protection/owner
//! carried through unchanged.

use km_wire::consts::{HM_TYPE_DIR, HM_TYPE_HLINK, HM_TYPE_LINK, HM_TYPE_VOLDIR, HM_TYPE_VOLUME};
use km_wire::DirEnt;

use crate::bcpl::string_to_bcpl_name;

/// Classic AmigaDOS `ST_*` entry-type codes this maps remote object
/// types onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmigaDirEntry {
    pub entry_type: i32,
    pub name_bcpl: Vec<u8>,
    pub size: u64,
    pub protection: u32,
    pub mtime_secs: u32,
    pub blocks: u32,
    pub uid: u32,
    pub gid: u32,
}

fn amiga_entry_type(obj_type: u16) -> i32 {
    match obj_type {
        HM_TYPE_DIR => 2,                        // ST_USERDIR
        HM_TYPE_LINK => 3,                        // ST_SOFTLINK
        HM_TYPE_HLINK => 4,                       // ST_LINKDIR
        HM_TYPE_VOLUME | HM_TYPE_VOLDIR => 1,      // ST_ROOT
        _ => -3,                                  // ST_FILE
    }
}

pub fn populate(entry: &DirEnt, name_capacity: usize) -> AmigaDirEntry {
    AmigaDirEntry {
        entry_type: amiga_entry_type(entry.obj_type),
        name_bcpl: string_to_bcpl_name(&entry.name, name_capacity),
        size: entry.size,
        protection: entry.aperms,
        mtime_secs: entry.mtime,
        blocks: entry.blocks,
        uid: entry.uid,
        gid: entry.gid,
    }
}
