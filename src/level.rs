//! Level orchestration.
//!
//! `LevelReader` owns the ROM image and the resolved tables and rebuilds
//! a complete `LevelSnapshot` for any (level, checkpoint) selection. A
//! snapshot is self-contained and immutable; selecting another level
//! builds a fresh one rather than patching caches in place.

use log::{debug, info, warn};

use crate::checkpoint::{self, CheckpointInfo};
use crate::compress::Scheme;
use crate::config::DecodeOptions;
use crate::error::RomError;
use crate::events::{self, EventTable};
use crate::layout;
use crate::palette::PaletteSet;
use crate::rom::RomImage;
use crate::tiles::{self, DynamicTileSpan, TileMemory, TILE_COUNT, VRAM_LEN};
use crate::variant::{self, GameVariant, ResolvedTables};

/// Per-call replacements for the checkpoint's load selectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOverrides {
    pub obj_load: Option<u8>,
    pub tile_load: Option<u8>,
    pub pal_load: Option<u8>,
}

/// Flat offsets of the level's tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevelPointers {
    pub layout: usize,
    pub scenes: usize,
    pub blocks: usize,
    pub maps: usize,
    pub collision: usize,
}

/// The level's compressed graphics block.
#[derive(Debug, Clone, Copy, Default)]
pub struct GfxBlock {
    pub gfx_id: u8,
    pub cmp_pos: usize,
    pub cmp_dest: usize,
    pub cmp_size: usize,
    pub real_size: usize,
}

/// Approximate table populations, from the consecutive-storage
/// heuristic. Only trustworthy enough for the re-sort utility.
#[derive(Debug, Clone, Copy)]
pub struct LevelCounts {
    pub tiles: usize,
    pub blocks: usize,
    pub maps: usize,
}

#[derive(Debug, Clone)]
pub struct LevelSnapshot {
    pub level: u16,
    pub point: u16,
    pub width: u8,
    pub height: u8,
    pub scene_used: usize,
    pub scene_layout: Vec<u8>,
    /// One 16x16 grid of map words per scene.
    pub mapping: Vec<u16>,
    pub vram: Vec<u8>,
    /// All 0x400 tiles expanded to 8bpp pixels.
    pub tile_pixels: Vec<u8>,
    pub palettes: PaletteSet,
    pub events: EventTable,
    pub checkpoints: Vec<CheckpointInfo>,
    pub pointers: LevelPointers,
    pub gfx: GfxBlock,
    pub dynamic_span: DynamicTileSpan,
    pub counts: LevelCounts,
    pub sort_ok: bool,
}

/// A decoded background plane, same assembly as the foreground.
#[derive(Debug, Clone)]
pub struct BackgroundPlane {
    pub width: u8,
    pub height: u8,
    pub scene_used: usize,
    pub scene_layout: Vec<u8>,
    pub mapping: Vec<u16>,
}

pub struct LevelReader {
    rom: RomImage,
    tables: ResolvedTables,
    options: DecodeOptions,
}

impl LevelReader {
    pub fn new(rom: RomImage) -> Result<LevelReader, RomError> {
        LevelReader::with_options(rom, DecodeOptions::default())
    }

    pub fn with_options(rom: RomImage, options: DecodeOptions) -> Result<LevelReader, RomError> {
        let tables = variant::detect(&rom)?;
        Ok(LevelReader {
            rom,
            tables,
            options,
        })
    }

    pub fn rom(&self) -> &RomImage {
        &self.rom
    }

    pub fn tables(&self) -> &ResolvedTables {
        &self.tables
    }

    pub fn variant(&self) -> GameVariant {
        self.tables.variant
    }

    /// Decode everything for one level and checkpoint.
    pub fn select_level(
        &self,
        level: u16,
        point: u16,
        overrides: LoadOverrides,
    ) -> Result<LevelSnapshot, RomError> {
        let variant = self.tables.variant;
        if level >= variant.num_levels() {
            return Err(RomError::OutOfBounds {
                what: "level index".to_string(),
                offset: level as usize,
                len: variant.num_levels() as usize,
            });
        }
        info!("selecting {} level {} point {}", variant.name(), level, point);

        let events = events::load_events(&self.rom, &self.tables, level as usize)?;
        let checkpoints = checkpoint::load_checkpoints(&self.rom, &self.tables, level as usize, &events)?;

        let selected = checkpoints
            .get(point as usize)
            .or_else(|| checkpoints.first());
        let tile_load = overrides
            .tile_load
            .or(selected.map(|c| c.tile_load))
            .unwrap_or(0);
        let pal_load = overrides
            .pal_load
            .or(selected.map(|c| c.pal_load))
            .unwrap_or(0);

        let mut palettes = PaletteSet::load_base(&self.rom, &self.tables, level as usize)?;
        palettes.load_dynamic(&self.rom, &self.tables, level as usize, pal_load);

        let mut mem = TileMemory::new();
        let mut gfx = self.resolve_gfx(level)?;
        self.decompress_block(&mut mem, &mut gfx)?;
        tiles::load_dynamic_tiles(
            &self.rom,
            self.tables.anchors.tile_descriptors,
            level as usize,
            tile_load,
            &mut mem,
        )?;
        let dynamic_span =
            tiles::scan_dynamic_span(&self.rom, self.tables.anchors.tile_descriptors, level as usize);

        let pointers = self.resolve_pointers(level);
        let (width, height, decoded) = self.decode_layout(&pointers)?;

        let mapping = if variant.has_blocks() {
            tiles::assemble_scene_maps(&self.rom, pointers.scenes, pointers.blocks, decoded.scene_used)?
        } else {
            self.assemble_flat_scenes(level, decoded.scene_used)?
        };

        let (counts, sort_ok) = self.estimate_counts(level, &pointers, gfx.cmp_size);

        Ok(LevelSnapshot {
            level,
            point,
            width,
            height,
            scene_used: decoded.scene_used,
            scene_layout: decoded.scenes,
            mapping,
            tile_pixels: mem.rasterize(),
            vram: mem.vram().to_vec(),
            palettes,
            events,
            checkpoints,
            pointers,
            gfx,
            dynamic_span,
            counts,
            sort_ok,
        })
    }

    /// Decode the background plane, when the title has one.
    pub fn load_background(&self, level: u16) -> Result<Option<BackgroundPlane>, RomError> {
        let anchors = &self.tables.anchors;
        if anchors.bg_layout == 0 {
            return Ok(None);
        }

        let p = level as u32 * 3;
        let p_layout = self.rom.snes2pc(self.rom.sread_dword(anchors.bg_layout + p));
        let p_scenes = self.rom.snes2pc(self.rom.sread_dword(anchors.bg_scenes + p));
        let p_blocks = self.rom.snes2pc(self.rom.sread_dword(anchors.bg_blocks + p));

        let mut cur = self.rom.cursor(p_layout);
        let width = cur.u8()?;
        let height = cur.u8()?;
        let _stored_used = cur.u8()?;
        let limit = width as usize * height as usize;
        let decoded = layout::decode(&self.rom.bytes()[cur.pos()..], limit)?;

        let mapping =
            tiles::assemble_scene_maps(&self.rom, p_scenes, p_blocks, decoded.scene_used)?;

        Ok(Some(BackgroundPlane {
            width,
            height,
            scene_used: decoded.scene_used,
            scene_layout: decoded.scenes,
            mapping,
        }))
    }

    fn resolve_pointers(&self, level: u16) -> LevelPointers {
        let anchors = &self.tables.anchors;
        let rom = &self.rom;
        let p = level as u32 * 3;

        let banked = |anchor: u32| -> usize {
            if anchor == 0 {
                0
            } else {
                rom.snes2pc(rom.sread_dword(anchor + p))
            }
        };

        let (layout, scenes) = if self.tables.variant.has_blocks() {
            (banked(anchors.layout), banked(anchors.scenes))
        } else {
            (
                rom.snes2pc(0xC5_0000 | rom.sread_word(anchors.layout + level as u32 * 2) as u32),
                rom.snes2pc(rom.sread_dword(anchors.scenes + level as u32)),
            )
        };

        LevelPointers {
            layout,
            scenes,
            blocks: banked(anchors.blocks),
            maps: banked(anchors.maps),
            collision: banked(anchors.collision),
        }
    }

    fn resolve_gfx(&self, level: u16) -> Result<GfxBlock, RomError> {
        let anchors = &self.tables.anchors;
        let rom = &self.rom;

        let (config, id_stride_off) = if self.tables.variant.has_blocks() {
            let config = rom.snes2pc(
                rom.sread_word(anchors.gfx_config + level as u32 * 2 + 4) as u32 | 0x86_0000,
            );
            (config, 2u32)
        } else {
            let slot = rom.sread_byte(0x80824A + level as u32) as u32;
            let config =
                rom.snes2pc(rom.sread_word(anchors.gfx_config + slot) as u32 | 0x80_0000);
            (config, 0u32)
        };

        let gfx_id = rom.byte(config);
        let cmp_size = rom.word(config + 1) as usize;
        let cmp_dest = (rom.word(config + 3) << 1).wrapping_sub(0x2000) as usize;
        let cmp_pos = rom.snes2pc(
            rom.sread_dword(anchors.gfx_position + gfx_id as u32 * 5 + id_stride_off),
        );

        Ok(GfxBlock {
            gfx_id,
            cmp_pos,
            cmp_dest,
            cmp_size,
            real_size: 0,
        })
    }

    fn decompress_block(&self, mem: &mut TileMemory, gfx: &mut GfxBlock) -> Result<(), RomError> {
        let mut size = gfx.cmp_size;
        if gfx.cmp_dest + size > VRAM_LEN {
            if !self.options.tolerate_tile_overflow {
                return Err(RomError::TileMemoryOverflow {
                    table: "gfx".to_string(),
                    need: gfx.cmp_dest + size,
                });
            }
            size = VRAM_LEN - gfx.cmp_dest.min(VRAM_LEN);
            warn!(
                "graphics block truncated from {:#x} to {:#x} bytes",
                gfx.cmp_size, size
            );
        }

        mem.load_compressed(
            &self.rom,
            gfx.cmp_pos,
            gfx.cmp_dest,
            size,
            Scheme::for_variant(self.tables.variant),
        )?;
        gfx.real_size = mem.cmp_real_size;
        debug!(
            "gfx block {:#x}: {:#x} bytes from {:#x} ({} consumed)",
            gfx.gfx_id, size, gfx.cmp_pos, gfx.real_size
        );
        Ok(())
    }

    fn decode_layout(
        &self,
        pointers: &LevelPointers,
    ) -> Result<(u8, u8, layout::DecodedLayout), RomError> {
        let mut cur = self.rom.cursor(pointers.layout);
        let width = cur.u8()?;
        let height = cur.u8()?;
        let limit = width as usize * height as usize;

        let decoded = if self.tables.variant.has_blocks() {
            let stored_used = cur.u8()? as usize;
            let decoded = layout::decode(&self.rom.bytes()[cur.pos()..], limit)?;
            if stored_used != decoded.scene_used {
                debug!(
                    "layout header claims {} scenes, data uses {}",
                    stored_used, decoded.scene_used
                );
            }
            decoded
        } else {
            layout::decode_raw(&self.rom.bytes()[cur.pos()..], limit)?
        };

        Ok((width, height, decoded))
    }

    /// Decompress the flat scene grids and gather their map words.
    fn assemble_flat_scenes(&self, level: u16, scene_used: usize) -> Result<Vec<u16>, RomError> {
        let anchors = &self.tables.anchors;
        let rom = &self.rom;

        let idx = rom.sread_byte(anchors.scenes + level as u32) as u32;
        let offset = rom.word(rom.snes2pc(0x80_8158 + idx)) as u32;
        let config = rom.snes2pc(0x80_0000 | offset);
        let gfx_id = rom.byte(config);
        let size = rom.word(config + 1) as usize;
        let pos = rom.snes2pc(rom.sread_dword(anchors.gfx_position + gfx_id as u32 * 5));

        let mut map_ram = vec![0u8; 0x10000];
        crate::compress::decompress(
            rom.bytes(),
            pos,
            &mut map_ram,
            0x200,
            size,
            Scheme::Lzss,
            "scene maps",
        )?;

        Ok(tiles::assemble_scene_maps_flat(&map_ram, scene_used))
    }

    /// Consecutive-storage heuristic for table populations, plus the
    /// shared-tileset guard that disables re-sorting.
    fn estimate_counts(
        &self,
        level: u16,
        pointers: &LevelPointers,
        cmp_size: usize,
    ) -> (LevelCounts, bool) {
        let variant = self.tables.variant;
        let mut sort_ok = true;

        // two levels share one compressed tile set; re-sorting either
        // would desync the other's map table
        if variant == GameVariant::Mmx2 && (level == 10 || level == 11) {
            sort_ok = false;
        }

        if !variant.has_blocks() || level + 1 >= variant.num_levels() {
            return (
                LevelCounts {
                    tiles: TILE_COUNT,
                    blocks: 0x40,
                    maps: TILE_COUNT,
                },
                false,
            );
        }

        let anchors = &self.tables.anchors;
        let next = (level as u32 + 1) * 3;
        let next_blocks = self.rom.snes2pc(self.rom.sread_dword(anchors.blocks + next));
        let next_maps = self.rom.snes2pc(self.rom.sread_dword(anchors.maps + next));

        let tiles_estimate = (0x200 + cmp_size) / 0x20;
        let blocks = next_blocks.checked_sub(pointers.blocks).map(|d| d / 8);
        let maps = next_maps.checked_sub(pointers.maps).map(|d| d / 8);

        match (blocks, maps) {
            (Some(blocks), Some(maps))
                if tiles_estimate <= TILE_COUNT && blocks <= TILE_COUNT && maps <= TILE_COUNT =>
            {
                (
                    LevelCounts {
                        tiles: tiles_estimate,
                        blocks,
                        maps,
                    },
                    sort_ok,
                )
            }
            _ => {
                debug!("table pointers not consecutive, counts clamped");
                (
                    LevelCounts {
                        tiles: TILE_COUNT,
                        blocks: TILE_COUNT,
                        maps: TILE_COUNT,
                    },
                    false,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_default_to_checkpoint_values() {
        let o = LoadOverrides::default();
        assert!(o.obj_load.is_none() && o.tile_load.is_none() && o.pal_load.is_none());
    }
}
