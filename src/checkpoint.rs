//! Checkpoint (respawn point) records.
//!
//! Nothing in the ROM stores how many checkpoints a level has. The count
//! is recovered from the trigger events that activate them: the low
//! nibble of a checkpoint trigger's subId is the checkpoint number, so
//! the count is the highest number seen plus one. Expanded ROMs from
//! version 3 on record the count explicitly and that wins.
//!
//! Records grew across the titles: the second game added a byte before
//! the position words and one after the flags, the third added one more
//! trailing byte. 29, 31 and 32 bytes respectively.

use log::warn;

use crate::error::RomError;
use crate::events::EventTable;
use crate::rom::{Cursor, RomImage};
use crate::variant::{Expansion, GameVariant, ResolvedTables};

/// Upper bound on derived counts; anything past this is table garbage.
const MAX_CHECKPOINTS: usize = 0x40;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointInfo {
    /// Object / tile / palette load selectors for this spawn.
    pub obj_load: u8,
    pub tile_load: u8,
    pub pal_load: u8,
    pub byte0: Option<u8>,
    /// Character spawn position.
    pub ch_x: u16,
    pub ch_y: u16,
    pub cam_x: u16,
    pub cam_y: u16,
    pub bkg_x: u16,
    pub bkg_y: u16,
    pub min_x: u16,
    pub max_x: u16,
    pub min_y: u16,
    pub max_y: u16,
    pub force_x: i16,
    pub force_y: i16,
    pub scroll: u8,
    pub tel_dwn: u8,
    pub byte1: Option<u8>,
    pub byte2: Option<u8>,
    /// Flat offset the record was read from.
    pub source: usize,
}

/// Highest checkpoint number named by a trigger event, plus one. The
/// older titles always have at least the level entry point.
pub fn derive_count(
    variant: GameVariant,
    expansion: Option<&Expansion>,
    events: &EventTable,
) -> usize {
    let mut count = if variant.is_older() { 1 } else { 0 };
    let mut derived = false;

    for e in events.iter() {
        if e.kind == 0x2 && (e.id == 0xB || e.id == 0x2) {
            derived = true;
            let number = (e.sub_id & 0xF) as usize;
            count = count.max(number + 1);
        }
    }

    if let Some(exp) = expansion {
        if exp.version >= 3 {
            return (exp.checkpoint_size as usize).min(MAX_CHECKPOINTS);
        }
    }

    if !derived {
        warn!("no checkpoint triggers found, assuming {} checkpoint(s)", count);
    }
    count.min(MAX_CHECKPOINTS)
}

/// Parse one record at the cursor.
pub fn parse_record(cur: &mut Cursor<'_>, variant: GameVariant) -> Result<CheckpointInfo, RomError> {
    let mut ci = CheckpointInfo {
        source: cur.pos(),
        ..CheckpointInfo::default()
    };

    ci.obj_load = cur.u8()?;
    ci.tile_load = cur.u8()?;
    ci.pal_load = cur.u8()?;

    if variant.index() > 0 {
        ci.byte0 = Some(cur.u8()?);
    }

    ci.ch_x = cur.u16()?;
    ci.ch_y = cur.u16()?;
    ci.cam_x = cur.u16()?;
    ci.cam_y = cur.u16()?;
    ci.bkg_x = cur.u16()?;
    ci.bkg_y = cur.u16()?;
    ci.min_x = cur.u16()?;
    ci.max_x = cur.u16()?;
    ci.min_y = cur.u16()?;
    ci.max_y = cur.u16()?;
    ci.force_x = cur.i16()?;
    ci.force_y = cur.i16()?;
    ci.scroll = cur.u8()?;
    ci.tel_dwn = cur.u8()?;

    if variant.index() > 0 {
        ci.byte1 = Some(cur.u8()?);
    }
    if variant.index() > 1 {
        ci.byte2 = Some(cur.u8()?);
    }

    Ok(ci)
}

/// Resolve the banked pointer of checkpoint `p` for the level.
fn record_pointer(rom: &RomImage, tables: &ResolvedTables, level: usize, p: usize) -> usize {
    let anchor = tables.anchors.checkpoints;
    let level_offset = rom.sread_word(anchor + level as u32 * 2) as u32;
    let record_offset = rom.sread_word(anchor + level_offset + p as u32 * 2) as u32;
    rom.snes2pc(((anchor & 0xFFFF) | (tables.checkpoint_bank << 16)) + record_offset)
}

/// Load all of a level's checkpoint records.
pub fn load_checkpoints(
    rom: &RomImage,
    tables: &ResolvedTables,
    level: usize,
    events: &EventTable,
) -> Result<Vec<CheckpointInfo>, RomError> {
    if tables.anchors.checkpoints == 0 {
        return Ok(Vec::new());
    }

    let count = derive_count(tables.variant, tables.expansion.as_ref(), events);
    let mut out = Vec::with_capacity(count);
    for p in 0..count {
        let ptr = record_pointer(rom, tables, level, p);
        let mut cur = rom.cursor(ptr);
        out.push(parse_record(&mut cur, tables.variant)?);
    }
    Ok(out)
}
