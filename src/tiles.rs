//! Tile memory and the scene/block/map assembly chain.
//!
//! Levels address graphics through three tables. A scene is an 8x8 grid
//! of block indices, a block is a 2x2 group of map indices, and a map is
//! a 2x2 group of 8x8-pixel tiles with per-tile palette and flip bits.
//! The newest engine drops the block layer and stores each scene as a
//! flat 16x16 map grid, compressed. Either way the output here is one
//! 16x16 grid of map indices per scene.
//!
//! Tile pixels live in a VRAM image. The first 0x200 bytes are a fixed
//! pattern the hardware expects (solid and striped filler tiles); level
//! graphics decompress on top, and checkpoint-selected dynamic loads
//! block-copy uncompressed tile data over that.

use log::warn;

use crate::compress::{self, Scheme};
use crate::error::RomError;
use crate::rom::RomImage;

pub const TILE_BYTES: usize = 0x20;
pub const TILE_COUNT: usize = 0x400;
pub const VRAM_LEN: usize = 0x10000;
/// Raw 8-bits-per-pixel bytes per expanded tile.
pub const TILE_PIXELS: usize = 64;

/// Fixed filler tiles occupying the first 16 tile slots.
pub const VRAM_SEED: [u8; 0x200] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00,
    0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00,
    0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00,
    0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff,
    0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff,
    0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00,
    0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff,
    0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff,
    0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
];

/// One map word: a tile index plus its render attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapTile {
    pub tile: u16,
    pub palette: u8,
    pub up_layer: bool,
    pub mirrored: bool,
    pub flipped: bool,
}

impl MapTile {
    pub fn from_word(word: u16) -> MapTile {
        MapTile {
            tile: word & 0x3FF,
            palette: ((word >> 10) & 7) as u8,
            up_layer: word & 0x2000 != 0,
            mirrored: word & 0x4000 != 0,
            flipped: word & 0x8000 != 0,
        }
    }
}

/// Planar 4bpp tile to one byte per pixel, row-major 8x8.
pub fn tile_4bpp_to_raw(src: &[u8], dst: &mut [u8]) {
    let mut w = 0;
    for y in 0..8 {
        for x in 0..8u32 {
            let shift = !x & 7;
            dst[w] = ((src[y * 2] >> shift) & 1)
                | (((src[y * 2 + 1] >> shift) << 1) & 2)
                | (((src[y * 2 + 16] >> shift) << 2) & 4)
                | (((src[y * 2 + 17] >> shift) << 3) & 8);
            w += 1;
        }
    }
}

/// The VRAM image for one level: planar tile data plus the expanded
/// pixel cache.
pub struct TileMemory {
    vram: Vec<u8>,
    /// Bytes of compressed graphics actually consumed from the ROM.
    pub cmp_real_size: usize,
}

impl TileMemory {
    pub fn new() -> TileMemory {
        let mut vram = vec![0u8; VRAM_LEN];
        vram[..VRAM_SEED.len()].copy_from_slice(&VRAM_SEED);
        TileMemory {
            vram,
            cmp_real_size: 0,
        }
    }

    pub fn vram(&self) -> &[u8] {
        &self.vram
    }

    /// Decompress level graphics into the window at `dest`.
    pub fn load_compressed(
        &mut self,
        rom: &RomImage,
        pos: usize,
        dest: usize,
        size: usize,
        scheme: Scheme,
    ) -> Result<(), RomError> {
        self.cmp_real_size =
            compress::decompress(rom.bytes(), pos, &mut self.vram, dest, size, scheme, "gfx")?;
        Ok(())
    }

    /// Block-copy uncompressed tile data, as the dynamic tile loads do.
    pub fn load_raw(
        &mut self,
        rom: &RomImage,
        pos: usize,
        dest: usize,
        size: usize,
    ) -> Result<(), RomError> {
        if dest + size > VRAM_LEN {
            return Err(RomError::TileMemoryOverflow {
                table: "dynamic tiles".to_string(),
                need: dest + size,
            });
        }
        rom.check("dynamic tiles", pos, size)?;
        self.vram[dest..dest + size].copy_from_slice(&rom.bytes()[pos..pos + size]);
        Ok(())
    }

    /// Replace the window contents wholesale.
    pub fn load_raw_bytes(&mut self, data: &[u8]) {
        let n = data.len().min(VRAM_LEN);
        self.vram[..n].copy_from_slice(&data[..n]);
    }

    /// Expand all 0x400 tiles to 8bpp pixels.
    pub fn rasterize(&self) -> Vec<u8> {
        let mut cache = vec![0u8; TILE_COUNT * TILE_PIXELS];
        for i in 0..TILE_COUNT {
            tile_4bpp_to_raw(
                &self.vram[i * TILE_BYTES..(i + 1) * TILE_BYTES],
                &mut cache[i * TILE_PIXELS..(i + 1) * TILE_PIXELS],
            );
        }
        cache
    }
}

impl Default for TileMemory {
    fn default() -> Self {
        TileMemory::new()
    }
}

/// Extent of the dynamic tile loads in tile slots, as scanned from the
/// descriptor table. The re-sort utility must leave this span alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicTileSpan {
    pub start: usize,
    pub end: usize,
    pub entries: usize,
}

/// Walk up to 0x40 descriptor entries for the level and compute the tile
/// slots their destinations cover. A zero size in the first entry is
/// skipped; anywhere else it terminates the list. `table` is the flat
/// descriptor-table offset from the anchors; zero means no table.
pub fn scan_dynamic_span(rom: &RomImage, table: usize, level: usize) -> DynamicTileSpan {
    let mut span = DynamicTileSpan {
        start: TILE_COUNT,
        end: 0,
        entries: 0,
    };
    if table == 0 {
        return span;
    }

    for i in 0..0x40 {
        let base_index = rom.word(table + level * 2) as usize + i * 2;
        let main_index = rom.word(table + base_index) as usize;
        span.entries += 1;

        let size = rom.word(table + main_index) as usize;
        if size == 0 {
            if i == 0 {
                continue;
            }
            break;
        }

        // destination registers are 16-bit words on the hardware
        let pos = (rom.word(table + main_index + 2) << 1).wrapping_sub(0x2000) as usize;
        let start = pos / TILE_BYTES;
        let end = (size + pos) / TILE_BYTES;
        span.start = span.start.min(start);
        span.end = span.end.max(end);
    }

    span
}

/// Apply the dynamic tile loads selected by `tile_select` (inclusive).
/// Entries whose source is the 0x7F0000 RAM bank have no ROM image and
/// are skipped.
pub fn load_dynamic_tiles(
    rom: &RomImage,
    table: usize,
    level: usize,
    tile_select: u8,
    mem: &mut TileMemory,
) -> Result<(), RomError> {
    if table == 0 {
        return Ok(());
    }

    for i in 0..=tile_select as usize {
        let base_index = rom.word(table + level * 2) as usize + i * 2;
        let main_index = rom.word(table + base_index) as usize;

        let size = rom.word(table + main_index) as usize;
        if size == 0 {
            continue;
        }
        let dest = (rom.word(table + main_index + 2) << 1).wrapping_sub(0x2000) as usize;
        let addr = rom.dword(table + main_index + 4) & 0xFFFFFF;

        if addr == 0x7F0000 {
            continue;
        }
        mem.load_raw(rom, rom.snes2pc(addr), dest, size)?;
    }

    Ok(())
}

/// Scene -> block -> map walk for the block-based engines. Produces one
/// 16x16 grid of map indices per scene.
pub fn assemble_scene_maps(
    rom: &RomImage,
    p_scenes: usize,
    p_blocks: usize,
    scene_used: usize,
) -> Result<Vec<u16>, RomError> {
    rom.check("scene table", p_scenes, scene_used * 0x80)?;

    let mut mapping = vec![0u16; scene_used * 0x100];
    let mut write = 0usize;
    for i in 0..scene_used {
        for y in 0..8 {
            for x in 0..8 {
                let block = rom.word(p_scenes + i * 0x80 + x * 2 + y * 0x10) as usize;
                let mut take = p_blocks + block * 8;

                mapping[write] = rom.word(take);
                take += 2;
                mapping[write + 0x01] = rom.word(take);
                take += 2;
                mapping[write + 0x10] = rom.word(take);
                take += 2;
                mapping[write + 0x11] = rom.word(take);
                write += 2;
            }
            write += 0x10;
        }
    }
    Ok(mapping)
}

/// Flat scene walk for the block-less engine: scenes were decompressed
/// into `map_ram` as raw 16x16 grids of map words, 0x200 bytes apiece.
pub fn assemble_scene_maps_flat(map_ram: &[u8], scene_used: usize) -> Vec<u16> {
    let mut mapping = vec![0u16; scene_used * 0x100];
    let mut write = 0usize;
    for i in 0..scene_used {
        for y in 0..16 {
            for x in 0..16 {
                let at = i * 0x200 + x * 2 + y * 0x20;
                let word = match map_ram.get(at + 1) {
                    Some(&hi) => u16::from_le_bytes([map_ram[at], hi]),
                    None => {
                        warn!("scene {} map read past decompressed data", i);
                        0
                    }
                };
                mapping[write] = word;
                write += 1;
            }
        }
    }
    mapping
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn map_word_fields() {
        let m = MapTile::from_word(0xE7FF);
        assert_eq!(m.tile, 0x3FF);
        assert_eq!(m.palette, 1);
        assert!(m.up_layer);
        assert!(m.mirrored);
        assert!(m.flipped);

        let m = MapTile::from_word(0x0123);
        assert_eq!(m.tile, 0x123);
        assert_eq!(m.palette, 0);
        assert!(!m.up_layer && !m.mirrored && !m.flipped);
    }

    #[test]
    fn planar_expansion_per_plane() {
        let mut tile = [0u8; TILE_BYTES];
        // row 0: plane 0 all ones, plane 3 leftmost pixel only
        tile[0] = 0xFF;
        tile[17] = 0x80;
        let mut out = [0u8; TILE_PIXELS];
        tile_4bpp_to_raw(&tile, &mut out);
        assert_eq!(out[0], 0x9);
        assert_eq!(&out[1..8], &[1, 1, 1, 1, 1, 1, 1]);
        assert_eq!(&out[8..16], &[0; 8]);
    }

    #[test]
    fn seed_occupies_first_sixteen_tiles() {
        let mem = TileMemory::new();
        assert_eq!(&mem.vram()[..0x200], &VRAM_SEED[..]);
        assert_eq!(mem.vram()[0x200], 0);
        // filler tile n is a solid block of pixel value n
        let pixels = mem.rasterize();
        for n in 0..16 {
            assert!(
                pixels[n * TILE_PIXELS..(n + 1) * TILE_PIXELS]
                    .iter()
                    .all(|&p| p == n as u8),
                "tile {}",
                n
            );
        }
    }

    #[test]
    fn flat_assembly_reads_little_endian_words() {
        let mut map_ram = vec![0u8; 0x400];
        map_ram[0] = 0x34;
        map_ram[1] = 0x12;
        map_ram[0x200] = 0x78;
        map_ram[0x201] = 0x56;
        let mapping = assemble_scene_maps_flat(&map_ram, 2);
        assert_eq!(mapping.len(), 0x200);
        assert_eq!(mapping[0], 0x1234);
        assert_eq!(mapping[0x100], 0x5678);
    }
}
