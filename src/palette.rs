//! 256-entry palette cache.
//!
//! Colors are 15-bit SNES words. The cache keeps them with red and blue
//! swapped into place so callers can peel channels off directly. Sixteen
//! rows of sixteen colors; `row_sources` remembers where each row came
//! from in the image so an editor can write colors back.
//!
//! The base palette comes from a per-level config record. The X titles
//! then run a descriptor walk driven by the checkpoint's palette
//! selector, overwriting whole rows; the walker stops at an 0xFFFF color
//! pointer and refuses write targets past the cache.

use log::warn;

use crate::error::RomError;
use crate::rom::RomImage;
use crate::variant::{GameVariant, ResolvedTables};

pub const PALETTE_SIZE: usize = 0x100;
pub const ROW_COUNT: usize = 16;

/// Swap the red and blue fields of a BGR555 word.
pub fn convert_16_color(color: u16) -> u16 {
    ((color & 0x1F) << 10) | (color & 0x3E0) | ((color >> 10) & 0x1F)
}

/// Expand a cached color to 8-bit channels.
pub fn to_rgb888(color: u16) -> (u8, u8, u8) {
    let r = ((color >> 10) & 0x1F) as u8;
    let g = ((color >> 5) & 0x1F) as u8;
    let b = (color & 0x1F) as u8;
    (r << 3, g << 3, b << 3)
}

#[derive(Debug, Clone)]
pub struct PaletteSet {
    pub colors: [u16; PALETTE_SIZE],
    /// Flat offset each 16-color row was last loaded from.
    pub row_sources: [usize; ROW_COUNT],
}

impl Default for PaletteSet {
    fn default() -> Self {
        PaletteSet {
            colors: [0; PALETTE_SIZE],
            row_sources: [0; ROW_COUNT],
        }
    }
}

impl PaletteSet {
    /// Load the level's base palette.
    pub fn load_base(
        rom: &RomImage,
        tables: &ResolvedTables,
        level: usize,
    ) -> Result<PaletteSet, RomError> {
        let mut set = PaletteSet::default();
        if tables.variant == GameVariant::RockmanForte {
            set.load_base_flat(rom, level)?;
        } else {
            set.load_base_config(rom, tables, level)?;
        }
        Ok(set)
    }

    /// X titles: one config record per level holds a color count and a
    /// banked pointer to the color words.
    fn load_base_config(
        &mut self,
        rom: &RomImage,
        tables: &ResolvedTables,
        level: usize,
    ) -> Result<(), RomError> {
        let anchors = &tables.anchors;
        let config = rom.snes2pc(
            rom.sread_word(anchors.palettes + level as u32 * 2 + 0x60) as u32 | 0x86_0000,
        );
        let mut cur = rom.cursor(config);
        let colors_to_load = cur.u8()? as usize;
        let p_palette = rom.snes2pc(cur.u16()? as u32 | anchors.palette_bank);
        rom.check("palette colors", p_palette, colors_to_load * 2)?;

        for i in 0..colors_to_load.min(PALETTE_SIZE) {
            self.colors[i] = convert_16_color(rom.word(p_palette + i * 2));
        }
        for i in 0..(colors_to_load >> 4).min(ROW_COUNT) {
            self.row_sources[i] = p_palette + i * 0x20;
        }
        Ok(())
    }

    /// Rockman & Forte: a fixed set of palette group indices plus one
    /// level-specific index, each naming a (count, pointer, target)
    /// record. Groups that would spill past the cache are skipped.
    fn load_base_flat(&mut self, rom: &RomImage, level: usize) -> Result<(), RomError> {
        let mut indices: Vec<u32> = vec![0x124, 0x0, 0x1E, 0x1B2, 0xA, 0x104];
        indices.push(2 * rom.sread_byte(0x80823D + level as u32) as u32);

        for index in indices {
            let offset = rom.word(rom.snes2pc(0x81928A + index)) as u32;

            let colors_to_load = rom.byte(rom.snes2pc(0x81_0000 + offset)) as usize;
            let pal_offset = rom.word(rom.snes2pc(0x81_0000 + offset + 1)) as u32;
            let dst = rom.byte(rom.snes2pc(0x81_0000 + offset + 3)) as usize;

            if dst + colors_to_load > PALETTE_SIZE {
                continue;
            }

            let p_palette = rom.snes2pc(0xC5_0000 | pal_offset);
            rom.check("palette group", p_palette, colors_to_load * 2)?;
            for i in 0..colors_to_load {
                self.colors[dst + i] = convert_16_color(rom.word(p_palette + i * 2));
            }
            for i in 0..colors_to_load >> 4 {
                self.row_sources[(dst >> 4) + i] = p_palette + i * 0x20;
            }
        }
        Ok(())
    }

    /// Descriptor walk for the checkpoint's palette selector. Each
    /// selected list is a run of (color pointer, write target) records
    /// closed by an 0xFFFF pointer. Targets past row 7 abort the walk.
    pub fn load_dynamic(
        &mut self,
        rom: &RomImage,
        tables: &ResolvedTables,
        level: usize,
        pal_select: u8,
    ) {
        let table = tables.anchors.palette_descriptors;
        if table == 0 {
            return;
        }
        let bank = tables.anchors.palette_bank;
        let level = level & 0xFF;

        for i in 0..=pal_select as usize {
            let base_index = rom.word(table + level * 2) as usize + i * 2;
            let mut main_index = rom.word(table + base_index) as usize;

            loop {
                let color_pointer = rom.word(table + main_index) as u32;
                if color_pointer == 0xFFFF {
                    break;
                }

                let write_to = (rom.word(table + main_index + 2) & 0xFF) as usize;
                if write_to > 0x7F {
                    warn!("palette descriptor targets row {:#x}, stopping", write_to >> 4);
                    return;
                }

                let src = rom.snes2pc(bank | color_pointer);
                self.row_sources[write_to >> 4] = src;
                for j in 0..0x10 {
                    self.colors[write_to + j] = convert_16_color(rom.word(src + j * 2));
                }

                main_index += 3;
            }
        }
    }
}
