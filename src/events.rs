//! Placed-actor and trigger records.
//!
//! The X titles store events per level as a run of screen blocks: a block
//! id byte, then 7-byte records until one carries the end-of-block flag,
//! then the next block id; the level ends when a block id repeats. Rockman
//! & Forte instead stores segments of counted 7-byte records, and segment
//! records of type 4 name the next segment to visit, so extraction walks
//! the segment graph breadth-first.
//!
//! Either way, records land in 256 buckets keyed by screen column
//! (`x >> 5`), which is what every consumer actually selects by.

use std::collections::HashMap;
use std::collections::VecDeque;

use indexmap::IndexSet;
use lazy_static::lazy_static;
use log::{debug, warn};

use crate::error::RomError;
use crate::rom::RomImage;
use crate::variant::ResolvedTables;

pub const EVENT_BUCKETS: usize = 0x100;

lazy_static! {
    /// (type, id) pairs whose stored subId is wrong in the shipped ROMs,
    /// mapped to the value the game actually uses. 0xB is the heart tank;
    /// its graphics only resolve under subId 4.
    static ref SUBID_OVERRIDES: HashMap<(u8, u8), u8> = {
        let mut m = HashMap::new();
        m.insert((0x0u8, 0xBu8), 0x4u8);
        m
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventInfo {
    /// Low two bits of the header byte: 0 items, 1 objects, 2 triggers,
    /// 3 enemies.
    pub kind: u8,
    /// High six bits of the header byte.
    pub match_bits: u8,
    pub id: u8,
    pub sub_id: u8,
    pub x: u16,
    pub y: u16,
    /// Bits 13..15 of the stored x word; bit 2 closes a block.
    pub flag: u8,
}

/// Events bucketed by screen column.
#[derive(Debug, Clone)]
pub struct EventTable {
    buckets: Vec<Vec<EventInfo>>,
}

impl Default for EventTable {
    fn default() -> Self {
        EventTable::new()
    }
}

impl EventTable {
    pub fn new() -> EventTable {
        EventTable {
            buckets: vec![Vec::new(); EVENT_BUCKETS],
        }
    }

    pub fn bucket(&self, column: usize) -> &[EventInfo] {
        &self.buckets[column]
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventInfo> {
        self.buckets.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Vec::is_empty)
    }

    /// Insert an event into its screen-column bucket.
    pub fn place(&mut self, event: EventInfo) {
        let column = (event.x >> 5) as usize;
        if column < EVENT_BUCKETS {
            self.buckets[column].push(event);
        } else {
            warn!("event at x={:#x} past the last screen column", event.x);
        }
    }
}

/// Parse the level's event stream into the column table.
pub fn load_events(
    rom: &RomImage,
    tables: &ResolvedTables,
    level: usize,
) -> Result<EventTable, RomError> {
    if tables.anchors.events == 0 {
        return Ok(EventTable::new());
    }

    if tables.variant.is_older() {
        load_block_stream(rom, tables, level)
    } else {
        load_segment_graph(rom, tables, level)
    }
}

fn load_block_stream(
    rom: &RomImage,
    tables: &ResolvedTables,
    level: usize,
) -> Result<EventTable, RomError> {
    let bank = tables.event_bank;
    // expanded ROMs relocate the per-level pointer table to the bank's end
    let pointer_table = if tables.expansion.is_some() {
        (bank << 16) | 0xFFE0
    } else {
        tables.anchors.events
    };
    let start = rom.snes2pc(rom.sread_word(pointer_table + level as u32 * 2) as u32 | (bank << 16));

    let mut table = EventTable::new();
    let mut cur = rom.cursor(start);

    // 0xFF doubles as the initial sentinel, so a stream opening with a
    // 0xFF block id holds no events
    let mut block_id = 0xFFu32;
    let mut next_block_id = cur.u8()? as u32;

    while block_id != next_block_id {
        block_id = next_block_id;

        loop {
            let header = cur.u8()?;
            let kind = header & 0x3;
            let y = cur.u16()?;
            let id = cur.u8()?;
            let mut sub_id = cur.u8()?;
            if let Some(&fixed) = SUBID_OVERRIDES.get(&(kind, id)) {
                sub_id = fixed;
            }
            let x = cur.u16()?;

            let event = EventInfo {
                kind,
                match_bits: header >> 2,
                id,
                sub_id,
                x: x & 0x1FFF,
                y,
                flag: (x >> 13) as u8,
            };
            let done = event.flag & 0x4 != 0;
            table.place(event);

            if done {
                break;
            }
        }

        next_block_id = cur.u8()? as u32;
    }

    debug!("level {}: {} events in block stream", level, table.len());
    Ok(table)
}

fn load_segment_graph(
    rom: &RomImage,
    tables: &ResolvedTables,
    level: usize,
) -> Result<EventTable, RomError> {
    let bank = tables.event_bank;
    let level_addr = rom.snes2pc(rom.sread_word(tables.anchors.events + level as u32 * 2) as u32 | (bank << 16));

    let mut table = EventTable::new();
    let mut queue: VecDeque<u32> = VecDeque::from([0]);
    let mut seen: IndexSet<u32> = IndexSet::new();
    seen.insert(0);

    while let Some(index) = queue.pop_front() {
        let segment = rom.snes2pc(rom.word(level_addr + index as usize * 2) as u32 | (bank << 16));
        let mut cur = rom.cursor(segment);

        let count = cur.u8()?;
        for _ in 0..count {
            let kind = cur.u8()?;
            let id = cur.u8()?;
            let sub_id = cur.u8()?;
            let x = cur.u16()?;
            let y = cur.u16()?;

            table.place(EventInfo {
                kind,
                match_bits: 0,
                id,
                sub_id,
                x,
                y,
                flag: 0,
            });

            // segment links: doors and teleports name the next segment
            if kind == 0x4 && matches!(id, 0x0 | 0x1 | 0x6 | 0xE) {
                let mut next = (sub_id & 0x7F) as u32;
                if id == 0x6 || id == 0xE {
                    // teleports go through a per-level indirection table
                    let offset = rom.sread_word(0xC14A3E + 2 * level as u32) as u32;
                    next = rom.sread_byte(0xC14A3E + offset + 2 * next) as u32;
                }
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
    }

    debug!(
        "level {}: {} events across {} segments",
        level,
        table.len(),
        seen.len()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant;
    use test_log::test;

    fn blank_rom(title: &[u8], len: usize, header_at: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        bytes[header_at..header_at + title.len()].copy_from_slice(title);
        for i in title.len()..21 {
            bytes[header_at + i] = b' ';
        }
        bytes[header_at + 0x1C] = 0xFF;
        bytes[header_at + 0x1D] = 0x7F;
        bytes[header_at + 0x1E] = 0x00;
        bytes[header_at + 0x1F] = 0x80;
        bytes
    }

    #[test]
    fn block_stream_parses_and_rebuckets() {
        let mut bytes = blank_rom(b"MEGAMAN X", 0x18_0000, 0x7FC0);

        // level 0 pointer at snes 0x8582C2 -> pc 0x282C2; aim at 0x9000
        bytes[0x282C2] = 0x00;
        bytes[0x282C3] = 0x90;

        // snes 0x859000 -> pc 0x29000: one block, one record
        let ev = 0x29000;
        bytes[ev] = 0x01; // block 1
        bytes[ev + 1] = 0x0C; // header: match 3, kind 0
        bytes[ev + 2] = 0x20; // y = 0x0120
        bytes[ev + 3] = 0x01;
        bytes[ev + 4] = 0x0B; // heart tank
        bytes[ev + 5] = 0x00; // stored subId, overridden below
        bytes[ev + 6] = 0x40; // x = 0x0040 with end-of-block flag
        bytes[ev + 7] = 0x80;
        bytes[ev + 8] = 0x01; // repeated block id terminates

        let rom = RomImage::load(bytes).unwrap();
        let tables = variant::detect(&rom).unwrap();
        let table = load_events(&rom, &tables, 0).unwrap();

        assert_eq!(table.len(), 1);
        let e = &table.bucket(0x40 >> 5)[0];
        assert_eq!(e.kind, 0);
        assert_eq!(e.match_bits, 3);
        assert_eq!(e.id, 0xB);
        assert_eq!(e.sub_id, 0x4, "heart tank subId override");
        assert_eq!(e.x, 0x40);
        assert_eq!(e.y, 0x120);
        assert!(e.flag & 0x4 != 0);
    }

    #[test]
    fn leading_sentinel_block_holds_no_events() {
        let mut bytes = blank_rom(b"MEGAMAN X", 0x18_0000, 0x7FC0);
        bytes[0x282C2] = 0x00;
        bytes[0x282C3] = 0x90;
        bytes[0x29000] = 0xFF; // first block id matches the sentinel

        let rom = RomImage::load(bytes).unwrap();
        let tables = variant::detect(&rom).unwrap();
        let table = load_events(&rom, &tables, 0).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn segment_graph_handles_cycles() {
        let mut bytes = blank_rom(b"ROCKMAN&FORTE", 0x40_0000, 0xFFC0);

        // p_events anchor 0x80C18B -> pc 0xC18B; level 0 table at 0x2000
        bytes[0xC18B] = 0x00;
        bytes[0xC18C] = 0x20;

        // segment pointers: 0 -> 0x3000, 1 -> 0x3010
        bytes[0x2000] = 0x00;
        bytes[0x2001] = 0x30;
        bytes[0x2002] = 0x10;
        bytes[0x2003] = 0x30;

        // segment 0: one door record linking segment 1
        bytes[0x3000] = 0x01;
        bytes[0x3001] = 0x04; // kind 4
        bytes[0x3002] = 0x00; // id 0: plain door
        bytes[0x3003] = 0x01; // next segment 1
        bytes[0x3004] = 0x45; // x = 0x0045
        bytes[0x3005] = 0x00;
        bytes[0x3006] = 0x80; // y
        bytes[0x3007] = 0x00;

        // segment 1: a door linking straight back to segment 0
        bytes[0x3010] = 0x01;
        bytes[0x3011] = 0x04;
        bytes[0x3012] = 0x00;
        bytes[0x3013] = 0x00; // back-edge to 0
        bytes[0x3014] = 0x00;
        bytes[0x3015] = 0x02; // x = 0x0200
        bytes[0x3016] = 0x90;
        bytes[0x3017] = 0x00;

        let rom = RomImage::load(bytes).unwrap();
        let tables = variant::detect(&rom).unwrap();
        let table = load_events(&rom, &tables, 0).unwrap();

        // the back-edge must not loop; both segments visited once
        assert_eq!(table.len(), 2);
        assert_eq!(table.bucket(0x45 >> 5).len(), 1);
        assert_eq!(table.bucket(0x200 >> 5).len(), 1);
    }
}
