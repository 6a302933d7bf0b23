//! End-to-end decode of a hand-built ROM image.
//!
//! Builds a minimal LoROM image with the first game's title and pokes a
//! complete level-0 table chain into it: events, a checkpoint, a base
//! palette, a compressed graphics block, layout, scenes and blocks, plus
//! a background plane. Then decodes the whole thing through the public
//! API and checks every surface of the snapshot.

use maverick::level::{LevelReader, LoadOverrides};
use maverick::palette::convert_16_color;
use maverick::rom::RomImage;
use maverick::tiles::MapTile;
use maverick::variant::GameVariant;

use test_log::test;

/// LoROM address translation, duplicated so the test doesn't trust the
/// code under test for its own fixture.
fn lorom(snes: u32) -> usize {
    (((snes & 0x7F0000) >> 1) + (snes & 0x7FFF)) as usize
}

struct Builder {
    bytes: Vec<u8>,
}

impl Builder {
    fn new() -> Builder {
        let mut bytes = vec![0u8; 0x18_0000];
        let title = b"MEGAMAN X";
        bytes[0x7FC0..0x7FC0 + title.len()].copy_from_slice(title);
        for i in title.len()..21 {
            bytes[0x7FC0 + i] = b' ';
        }
        // checksum pair must sum to 0xFFFF for the header probe
        bytes[0x7FDC] = 0xFF;
        bytes[0x7FDD] = 0x7F;
        bytes[0x7FDE] = 0x00;
        bytes[0x7FDF] = 0x80;
        Builder { bytes }
    }

    fn byte(&mut self, pc: usize, v: u8) -> &mut Self {
        self.bytes[pc] = v;
        self
    }

    fn word(&mut self, pc: usize, v: u16) -> &mut Self {
        self.bytes[pc..pc + 2].copy_from_slice(&v.to_le_bytes());
        self
    }

    fn dword(&mut self, pc: usize, v: u32) -> &mut Self {
        self.bytes[pc..pc + 4].copy_from_slice(&v.to_le_bytes());
        self
    }

    fn slice(&mut self, pc: usize, data: &[u8]) -> &mut Self {
        self.bytes[pc..pc + data.len()].copy_from_slice(data);
        self
    }
}

fn build_level_zero() -> Vec<u8> {
    let mut b = Builder::new();

    // --- events: anchor 0x8582C2, bank 0x85, level 0 at offset 0x9000
    b.word(lorom(0x8582C2), 0x9000);
    let ev = lorom(0x859000);
    b.slice(
        ev,
        &[
            0x01, // block 1
            0x02, // header: kind 2 (trigger)
            0x40, 0x01, // y = 0x0140
            0x02, // id 2: checkpoint trigger
            0x00, // subId 0 -> checkpoint count 1
            0x60, 0x80, // x = 0x0060 with end-of-block flag
            0x01, // repeated block id ends the level
        ],
    );

    // --- checkpoints: anchor 0x86A780, level offset 0x20, record +0x100
    let ck = lorom(0x86A780);
    b.word(ck, 0x0020);
    b.word(ck + 0x20, 0x0100);
    let record = ck + 0x100;
    let mut rec = vec![0u8; 29];
    rec[0] = 0; // objLoad
    rec[1] = 0; // tileLoad
    rec[2] = 0; // palLoad
    rec[3..5].copy_from_slice(&0x0080u16.to_le_bytes()); // chX
    rec[5..7].copy_from_slice(&0x0140u16.to_le_bytes()); // chY
    b.slice(record, &rec);

    // --- base palette: config pointer chain into 16 colors at 0x85C000
    b.word(lorom(0x868133 + 0x60), 0xB000);
    let pal_cfg = lorom(0x86B000);
    b.byte(pal_cfg, 0x10);
    b.word(pal_cfg + 1, 0xC000);
    let colors = lorom(0x85C000);
    b.word(colors, 0x7C00); // SNES blue
    b.word(colors + 2, 0x001F); // SNES red

    // --- dynamic palette walk terminates immediately (0xFFFF pointer)
    let pd = 0x32260;
    b.word(pd, 0x0010);
    b.word(pd + 0x10, 0x0020);
    b.word(pd + 0x20, 0xFFFF);

    // --- graphics: config at 0x86D000, 0x40 bytes to window 0x200
    b.word(lorom(0x86F56F + 4), 0xD000);
    let gfx_cfg = lorom(0x86D000);
    b.byte(gfx_cfg, 0x01); // gfx id
    b.word(gfx_cfg + 1, 0x40); // compressed request size
    b.word(gfx_cfg + 3, 0x1100); // dest: (0x1100 << 1) - 0x2000 = 0x200
    b.dword(lorom(0x86F6F7) + 1 * 5 + 2, 0x86E000);
    // bitmask RLE, all fill bytes: control 0x00 then the group's fill,
    // eight groups of eight
    let mut stream = Vec::new();
    for group in 0..8u8 {
        stream.push(0x00);
        stream.push(group);
    }
    b.slice(lorom(0x86E000), &stream);

    // --- level pointers
    b.dword(lorom(0x868D24), 0x86C000); // layout
    b.dword(lorom(0x868D93), 0x86C100); // scenes
    b.dword(lorom(0x868E02), 0x86C400); // blocks
    b.dword(lorom(0x868E71), 0x86C500); // maps
    b.dword(lorom(0x868EE0), 0x86C600); // collision
    // the next level's block/map pointers feed the count heuristic
    b.dword(lorom(0x868E02) + 3, 0x86C480);
    b.dword(lorom(0x868E71) + 3, 0x86C580);

    // layout: 2 x 1 grid, scenes 0 and 1
    b.slice(lorom(0x86C000), &[0x02, 0x01, 0x02, 0x02, 0x00, 0xFF]);

    // scene tables are all block 0; block 0 points at maps 1..4
    let blocks = lorom(0x86C400);
    b.word(blocks, 1);
    b.word(blocks + 2, 2);
    b.word(blocks + 4, 3);
    b.word(blocks + 6, 4);

    // --- background plane: 1 x 1 grid of scene 0, block of maps 5..8
    b.dword(lorom(0x868F4F), 0x86C700);
    b.dword(lorom(0x868FBE), 0x86C800);
    b.dword(lorom(0x86902D), 0x86C900);
    b.slice(lorom(0x86C700), &[0x01, 0x01, 0x01, 0x81, 0x00, 0xFF]);
    let bg_blocks = lorom(0x86C900);
    b.word(bg_blocks, 5);
    b.word(bg_blocks + 2, 6);
    b.word(bg_blocks + 4, 7);
    b.word(bg_blocks + 6, 8);

    b.bytes
}

#[test]
fn decodes_a_full_synthetic_level() {
    let rom = RomImage::load(build_level_zero()).unwrap();
    let reader = LevelReader::new(rom).unwrap();
    assert_eq!(reader.variant(), GameVariant::Mmx1);

    let snapshot = reader.select_level(0, 0, LoadOverrides::default()).unwrap();

    // layout
    assert_eq!((snapshot.width, snapshot.height), (2, 1));
    assert_eq!(snapshot.scene_layout, [0, 1]);
    assert_eq!(snapshot.scene_used, 2);

    // events
    assert_eq!(snapshot.events.len(), 1);
    let e = &snapshot.events.bucket(0x60 >> 5)[0];
    assert_eq!((e.kind, e.id, e.x, e.y), (2, 2, 0x60, 0x140));

    // checkpoints
    assert_eq!(snapshot.checkpoints.len(), 1);
    let cp = &snapshot.checkpoints[0];
    assert_eq!((cp.ch_x, cp.ch_y), (0x80, 0x140));

    // palette: SNES blue caches with red and blue swapped
    assert_eq!(snapshot.palettes.colors[0], convert_16_color(0x7C00));
    assert_eq!(snapshot.palettes.colors[1], convert_16_color(0x001F));

    // graphics decompressed right after the filler tiles
    assert_eq!(snapshot.gfx.cmp_dest, 0x200);
    assert_eq!(snapshot.gfx.real_size, 16);
    for i in 0..0x40 {
        assert_eq!(snapshot.vram[0x200 + i], (i / 8) as u8);
    }

    // scene 0 is all block 0, whose maps are 1..4 in quadrant order
    assert_eq!(snapshot.mapping.len(), 2 * 0x100);
    assert_eq!(snapshot.mapping[0x00], 1);
    assert_eq!(snapshot.mapping[0x01], 2);
    assert_eq!(snapshot.mapping[0x10], 3);
    assert_eq!(snapshot.mapping[0x11], 4);
    let tile = MapTile::from_word(snapshot.mapping[0]);
    assert_eq!(tile.tile, 1);

    // count heuristic: 0x80-byte gaps mean 16 blocks and 16 maps
    assert_eq!(snapshot.counts.blocks, 16);
    assert_eq!(snapshot.counts.maps, 16);
    assert_eq!(snapshot.counts.tiles, (0x200 + 0x40) / 0x20);
    assert!(snapshot.sort_ok);

    // every tile expanded
    assert_eq!(snapshot.tile_pixels.len(), 0x400 * 64);
}

#[test]
fn decodes_the_background_plane() {
    let rom = RomImage::load(build_level_zero()).unwrap();
    let reader = LevelReader::new(rom).unwrap();

    let plane = reader.load_background(0).unwrap().expect("bg tables");
    assert_eq!((plane.width, plane.height), (1, 1));
    assert_eq!(plane.scene_layout, [0]);
    assert_eq!(plane.mapping[0x00], 5);
    assert_eq!(plane.mapping[0x01], 6);
    assert_eq!(plane.mapping[0x10], 7);
    assert_eq!(plane.mapping[0x11], 8);
}

#[test]
fn checkpoint_point_overrides_apply() {
    let rom = RomImage::load(build_level_zero()).unwrap();
    let reader = LevelReader::new(rom).unwrap();

    // an out-of-range point falls back to the first checkpoint
    let snapshot = reader.select_level(0, 9, LoadOverrides::default()).unwrap();
    assert_eq!(snapshot.checkpoints.len(), 1);

    // a tile_load override is accepted even with empty descriptor tables
    let snapshot = reader
        .select_level(
            0,
            0,
            LoadOverrides {
                tile_load: Some(0),
                ..LoadOverrides::default()
            },
        )
        .unwrap();
    assert_eq!(snapshot.scene_used, 2);
}
