//! Game detection and per-variant table anchors.
//!
//! Four shipped titles are supported. Each owns a fixed set of banked
//! anchor addresses for its level tables; the detector compares the header
//! title bytes against the known signatures and hands back one immutable
//! `ResolvedTables` value that every later decode step reads from. A zero
//! anchor means the title has no such table.

use log::{debug, info};

use crate::error::RomError;
use crate::rom::RomImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameVariant {
    Mmx1,
    Mmx2,
    Mmx3,
    /// Rockman & Forte; the newest engine revision, HiROM, flattened
    /// scene addressing and segment-graph events.
    RockmanForte,
}

impl GameVariant {
    pub fn index(self) -> usize {
        match self {
            GameVariant::Mmx1 => 0,
            GameVariant::Mmx2 => 1,
            GameVariant::Mmx3 => 2,
            GameVariant::RockmanForte => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GameVariant::Mmx1 => "Mega Man X",
            GameVariant::Mmx2 => "Mega Man X2",
            GameVariant::Mmx3 => "Mega Man X3",
            GameVariant::RockmanForte => "Rockman & Forte",
        }
    }

    pub fn num_levels(self) -> u16 {
        match self {
            GameVariant::Mmx3 => 15,
            _ => 13,
        }
    }

    /// The three X titles use Scene -> Block -> Map addressing; Rockman &
    /// Forte flattens scenes straight to 16x16 map grids.
    pub fn has_blocks(self) -> bool {
        !matches!(self, GameVariant::RockmanForte)
    }

    /// Older titles derive checkpoint counts from trigger events and use
    /// the block-sequential event stream.
    pub fn is_older(self) -> bool {
        self.has_blocks()
    }
}

/// Banked anchor addresses of every per-level table one variant owns,
/// plus the handful of flat table offsets the engines hardcode.
#[derive(Debug, Clone)]
pub struct AnchorTable {
    pub layout: u32,
    pub scenes: u32,
    pub blocks: u32,
    pub maps: u32,
    pub collision: u32,
    pub checkpoints: u32,
    pub palettes: u32,
    pub gfx_config: u32,
    pub gfx_position: u32,
    pub events: u32,
    pub borders: u32,
    pub locks: u32,
    pub properties: u32,
    pub sprite_assembly: u32,
    pub bg_layout: u32,
    pub bg_scenes: u32,
    pub bg_blocks: u32,
    /// Flat offset of the dynamic tile descriptor table.
    pub tile_descriptors: usize,
    /// Flat offset of the dynamic palette descriptor table.
    pub palette_descriptors: usize,
    /// Bank holding level palette color data.
    pub palette_bank: u32,
}

impl AnchorTable {
    pub fn for_variant(variant: GameVariant) -> AnchorTable {
        const LAYOUT: [u32; 4] = [0x868D24, 0x868888, 0x8689B3, 0x808199];
        const SCENES: [u32; 4] = [0x868D93, 0x8688F7, 0x868A22, 0x808257];
        const BLOCKS: [u32; 4] = [0x868E02, 0x868966, 0x868A91, 0];
        const MAPS: [u32; 4] = [0x868E71, 0x8689D5, 0x868B00, 0x8081B3];
        const COLLISION: [u32; 4] = [0x868EE0, 0x868A44, 0x868B6F, 0];
        const CHECKPOINTS: [u32; 4] = [0x86A780, 0x86A4C5, 0x86A8E4, 0];
        const PALETTES: [u32; 4] = [0x868133, 0x86817A, 0x868180, 0];
        const GFX_CONFIG: [u32; 4] = [0x86F56F, 0x86F831, 0x86F3C3, 0x80B75B];
        const GFX_POSITION: [u32; 4] = [0x86F6F7, 0x86F9FF, 0x86F730, 0x81E391];
        const EVENTS: [u32; 4] = [0x8582C2, 0x29D3D1, 0x3CCE4B, 0x80C18B];
        const BORDERS: [u32; 4] = [0x86E4E2, 0x82EBE9, 0x83DE43, 0];
        const LOCKS: [u32; 4] = [0x86ECD0, 0x82FAE4, 0x83F2CC, 0];
        const PROPERTIES: [u32; 4] = [0, 0, 0x86E28E, 0];
        const SPRITE_ASSEMBLY: [u32; 4] = [0x8D8000, 0x8D8000, 0x8D8000, 0];
        const BG_LAYOUT: [u32; 4] = [0x868F4F, 0x868AB3, 0x868BDE, 0];
        const BG_SCENES: [u32; 4] = [0x868FBE, 0x868B22, 0x868C4D, 0];
        const BG_BLOCKS: [u32; 4] = [0x86902D, 0x868B91, 0x868CBC, 0];
        const TILE_DESCRIPTORS: [usize; 4] = [0x321D5, 0x31D6A, 0x32085, 0];
        const PALETTE_DESCRIPTORS: [usize; 4] = [0x32260, 0x31DD1, 0x32172, 0];

        let i = variant.index();
        AnchorTable {
            layout: LAYOUT[i],
            scenes: SCENES[i],
            blocks: BLOCKS[i],
            maps: MAPS[i],
            collision: COLLISION[i],
            checkpoints: CHECKPOINTS[i],
            palettes: PALETTES[i],
            gfx_config: GFX_CONFIG[i],
            gfx_position: GFX_POSITION[i],
            events: EVENTS[i],
            borders: BORDERS[i],
            locks: LOCKS[i],
            properties: PROPERTIES[i],
            sprite_assembly: SPRITE_ASSEMBLY[i],
            bg_layout: BG_LAYOUT[i],
            bg_scenes: BG_SCENES[i],
            bg_blocks: BG_BLOCKS[i],
            tile_descriptors: TILE_DESCRIPTORS[i],
            palette_descriptors: PALETTE_DESCRIPTORS[i],
            palette_bank: if variant == GameVariant::Mmx3 {
                0x8C_0000
            } else {
                0x85_0000
            },
        }
    }
}

/// Expanded-ROM trailer: a signature plus version word near the end of a
/// grown image, left behind by the (out of scope) expansion patcher. When
/// present, events and checkpoints read from relocated banks and the
/// per-level region sizes become explicit.
#[derive(Debug, Clone)]
pub struct Expansion {
    pub version: u16,
    pub header_pc: usize,
    pub layout_size: u16,
    pub event_size: u16,
    pub checkpoint_size: u16,
    pub layout_scenes: u16,
}

const EXPANDED_SIG: &str = "EXPANDED ROM  ";
const EXPANDED_HEADER_SIZE: usize = 0x20;

/// Everything the rest of the decoder needs to know about which game this
/// is and where its tables live. Built once at load time.
#[derive(Debug, Clone)]
pub struct ResolvedTables {
    pub variant: GameVariant,
    pub anchors: AnchorTable,
    pub expansion: Option<Expansion>,
    pub event_bank: u32,
    pub checkpoint_bank: u32,
    pub lock_bank: u32,
}

/// Match the title bytes against the four known signatures and resolve
/// the variant's anchor set. Fatal if nothing matches.
pub fn detect(rom: &RomImage) -> Result<ResolvedTables, RomError> {
    let header = rom.header();
    let t0 = header.title_u32(0);
    let t4 = header.title_u32(4);
    let t8 = header.title_u16(8);

    // "MEGA"/"Mega"/"ROCK" then "MAN "/"man "/"MAN&"
    let prefix_ok = matches!(t0, 0x4147454D | 0x6167654D | 0x4B434F52)
        && matches!(t4, 0x204E414D | 0x206E616D | 0x264E414D);

    let variant = if prefix_ok {
        match t8 {
            0x2058 => GameVariant::Mmx1,
            0x3258 => GameVariant::Mmx2,
            0x3358 => GameVariant::Mmx3,
            // "& " (Japanese) or "FO" (English) tail
            0x2026 | 0x4F46 => GameVariant::RockmanForte,
            _ => return Err(RomError::UnsupportedVariant(header.title_string())),
        }
    } else {
        return Err(RomError::UnsupportedVariant(header.title_string()));
    };

    info!("detected {}", variant.name());

    let anchors = AnchorTable::for_variant(variant);
    let expansion = detect_expansion(rom, variant);

    let mut event_bank = anchors.events >> 16;
    let mut checkpoint_bank = anchors.checkpoints >> 16;
    let mut lock_bank = anchors.borders >> 16;

    if expansion.is_some() {
        match variant {
            GameVariant::Mmx1 => {
                event_bank = 0xB2;
                checkpoint_bank = 0x93;
                lock_bank = 0xBB;
            }
            GameVariant::Mmx2 => {
                event_bank = 0xB2;
                // checkpoint pointers stay in the shipped event bank
                checkpoint_bank = anchors.events >> 16;
                lock_bank = 0xBB;
            }
            GameVariant::Mmx3 => {
                event_bank = 0xC2;
                checkpoint_bank = anchors.events >> 16;
                lock_bank = 0xCB;
            }
            GameVariant::RockmanForte => {}
        }
    }

    Ok(ResolvedTables {
        variant,
        anchors,
        expansion,
        event_bank,
        checkpoint_bank,
        lock_bank,
    })
}

fn detect_expansion(rom: &RomImage, variant: GameVariant) -> Option<Expansion> {
    // (expected rom_size header byte, expected file size, mirror base)
    let (size_byte, file_len, base) = match variant {
        GameVariant::Mmx1 | GameVariant::Mmx2 => (0x0C, 0x28_0000, 0x18_0000usize),
        GameVariant::Mmx3 => (0x0C, 0x30_0000, 0x20_0000),
        GameVariant::RockmanForte => (0x0D, 0x60_0000, 0x40_0000),
    };

    if rom.header().rom_size != size_byte || rom.len() != file_len {
        return None;
    }

    // the patcher leaves the newest title's signature at the first
    // mirror boundary and its version fields at the second
    let sig_base = match variant {
        GameVariant::RockmanForte => 0x20_0000,
        _ => base,
    };
    if rom.ascii(sig_base + 0x8000 - EXPANDED_HEADER_SIZE, EXPANDED_SIG.len()) != EXPANDED_SIG {
        return None;
    }
    let header_pc = base + 0x8000 - EXPANDED_HEADER_SIZE;

    let version = rom.word(header_pc + 0xE);
    let mut exp = Expansion {
        version,
        header_pc,
        layout_size: 0,
        event_size: 0,
        checkpoint_size: 0,
        layout_scenes: 0x40,
    };

    if version == 0 {
        exp.layout_size = 0x800;
    }
    if version >= 1 {
        exp.layout_size = rom.word(header_pc + 0x10);
        exp.event_size = rom.word(header_pc + 0x12);
    }
    if version >= 3 {
        exp.checkpoint_size = rom.word(header_pc + 0x14);
    }

    debug!(
        "expanded ROM trailer v{} at {:#x} (layout {:#x}, events {:#x}, checkpoints {})",
        exp.version, header_pc, exp.layout_size, exp.event_size, exp.checkpoint_size
    );

    Some(exp)
}

/// Shipped byte budget of each level's event region, indexed by level.
/// Only meaningful for the three X titles; re-encode utilities use these
/// to stay inside the original region.
pub fn orig_event_size(variant: GameVariant, level: u16) -> u16 {
    const SIZES: [[u16; 14]; 3] = [
        [
            0x2C8, 0x211, 0x250, 0x4B3, 0x2EA, 0x32C, 0x2E2, 0x260, 0x2D2, 0x37F, 0x254, 0x2B2,
            0x27, 0,
        ],
        [
            0x235, 0x4A7, 0x338, 0x489, 0x310, 0x382, 0x3B6, 0x3DA, 0x45C, 0x303, 0x212, 0x30F,
            0xBD, 0,
        ],
        [
            0x2F1, 0x3B4, 0x3A7, 0x3D9, 0x3DA, 0x455, 0x3C9, 0x405, 0x33B, 0x22B, 0x3CB, 0x2BA,
            0x274, 0xE6,
        ],
    ];
    SIZES
        .get(variant.index())
        .and_then(|row| row.get(level as usize))
        .copied()
        .unwrap_or(0)
}

/// Shipped byte budget of each level's layout region.
pub fn orig_layout_size(variant: GameVariant, level: u16) -> u16 {
    const SIZES: [[u16; 13]; 3] = [
        [
            0x12, 0x32, 0x38, 0x64, 0x22, 0x3A, 0x1E, 0x6A, 0x2A, 0x3C, 0x22, 0x1A, 0x00,
        ],
        [
            0x8C, 0x3E, 0x38, 0x40, 0x42, 0x5C, 0x2A, 0x4E, 0x5E, 0x5A, 0x16, 0x5A, 0x00,
        ],
        [
            0x4C, 0x4C, 0x38, 0x42, 0x60, 0x54, 0x4E, 0x52, 0x30, 0x2E, 0x4E, 0x46, 0x22,
        ],
    ];
    SIZES
        .get(variant.index())
        .and_then(|row| row.get(level as usize))
        .copied()
        .unwrap_or(0)
}
