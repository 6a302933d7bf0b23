//! Tile re-sort utility.
//!
//! Reordering tiles so that similar ones sit together can shrink the
//! compressed graphics block considerably. Each heuristic ranks tiles by
//! a per-tile statistic, the tiles are reordered, the block recompressed,
//! and the smallest result kept. The identity ordering is always tried
//! first so the outcome can never be worse than the original.
//!
//! The first 16 tiles are the fixed filler set and tiles covered by
//! dynamic loads are overwritten at runtime, so neither may move. A level
//! whose tile block is shared with another level must not be re-sorted at
//! all, since only one level's map table would be rewritten to match.

use log::{debug, info};

use crate::compress::{self, Scheme};
use crate::error::RomError;
use crate::tiles::{DynamicTileSpan, TileMemory, TILE_BYTES, TILE_COUNT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortHeuristic {
    /// Keep the existing order.
    Identity,
    /// Rank by the brightest byte in the tile.
    Max,
    /// Rank by the most frequent byte in the tile.
    Mode,
}

impl SortHeuristic {
    fn rank(self, tile: &[u8]) -> u8 {
        match self {
            SortHeuristic::Identity => 0,
            SortHeuristic::Max => tile.iter().copied().max().unwrap_or(0),
            SortHeuristic::Mode => {
                let mut counts = [0u16; 0x100];
                let mut best = 0u8;
                let mut best_count = 0u16;
                for &b in tile {
                    counts[b as usize] += 1;
                    if counts[b as usize] > best_count {
                        best_count = counts[b as usize];
                        best = b;
                    }
                }
                best
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SortOutcome {
    /// Tile data in the winning order, full window.
    pub vram: Vec<u8>,
    /// Old tile index to new tile index.
    pub remap: Vec<u16>,
    /// Compressed size of the winning order.
    pub packed_size: usize,
}

/// Try the re-sort heuristics and keep whichever compresses smallest.
/// `cmp_size` is the byte length of the level's compressed tile block.
/// With `sort_ok` false only the identity ordering is considered.
pub fn sort_tiles(
    mem: &TileMemory,
    cmp_size: usize,
    span: DynamicTileSpan,
    sort_ok: bool,
    scheme: Scheme,
) -> Result<SortOutcome, RomError> {
    let heuristics: &[SortHeuristic] = if sort_ok {
        &[SortHeuristic::Identity, SortHeuristic::Max, SortHeuristic::Mode]
    } else {
        &[SortHeuristic::Identity]
    };

    let vram = mem.vram();

    // the filler tiles stay put, and so does everything past the block
    let start = 0x200 / TILE_BYTES;
    let end = TILE_COUNT - (0x8000usize - 0x200 - cmp_size.min(0x7E00)) / TILE_BYTES;

    let mut best: Option<SortOutcome> = None;

    for &heuristic in heuristics {
        let mut order: Vec<(u16, u8)> = (0..TILE_COUNT as u16)
            .map(|i| {
                let tile = &vram[i as usize * TILE_BYTES..(i as usize + 1) * TILE_BYTES];
                (i, heuristic.rank(tile))
            })
            .collect();

        if span.start >= end || span.end <= start {
            order[start..end].sort_by_key(|&(_, v)| v);
        } else if span.start <= start && span.end >= end {
            // dynamic loads cover the whole block, nothing can move
        } else {
            if start < span.start {
                order[start..span.start].sort_by_key(|&(_, v)| v);
            }
            if span.end < end {
                order[span.end..end].sort_by_key(|&(_, v)| v);
            }
        }

        let mut sorted = vec![0u8; vram.len()];
        for (new, &(old, _)) in order.iter().enumerate() {
            sorted[new * TILE_BYTES..(new + 1) * TILE_BYTES]
                .copy_from_slice(&vram[old as usize * TILE_BYTES..(old as usize + 1) * TILE_BYTES]);
        }

        let packed = compress::compress(&sorted[0x200..0x200 + cmp_size], scheme)?;
        debug!("{:?} ordering packs to {} bytes", heuristic, packed.len());

        if best.as_ref().map_or(true, |b| packed.len() < b.packed_size) {
            let mut remap = vec![0u16; TILE_COUNT];
            for (new, &(old, _)) in order.iter().enumerate() {
                remap[old as usize] = new as u16;
            }
            best = Some(SortOutcome {
                vram: sorted,
                remap,
                packed_size: packed.len(),
            });
        }
    }

    let outcome = best.unwrap_or_else(|| SortOutcome {
        vram: vram.to_vec(),
        remap: (0..TILE_COUNT as u16).collect(),
        packed_size: cmp_size,
    });
    info!(
        "tile block: {} bytes compressed after re-sort (was {})",
        outcome.packed_size, cmp_size
    );
    Ok(outcome)
}

/// Rewrite assembled map words for a new tile order, keeping the
/// palette and flip attributes.
pub fn remap_mapping(mapping: &mut [u16], remap: &[u16]) {
    for word in mapping {
        let tile = (*word & 0x3FF) as usize;
        *word = (*word & !0x3FF) | (remap[tile] & 0x3FF);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn no_span() -> DynamicTileSpan {
        DynamicTileSpan {
            start: TILE_COUNT,
            end: 0,
            entries: 0,
        }
    }

    #[test]
    fn identity_only_when_sort_disallowed() {
        let mem = TileMemory::new();
        let outcome = sort_tiles(&mem, 0x800, no_span(), false, Scheme::Lzss).unwrap();
        let identity: Vec<u16> = (0..TILE_COUNT as u16).collect();
        assert_eq!(outcome.remap, identity);
    }

    #[test]
    fn remap_is_a_permutation() {
        let mut mem = TileMemory::new();
        // give the block some variety so Max/Mode produce real orderings
        let fake: Vec<u8> = (0..0x800).map(|i| (i * 7 % 251) as u8).collect();
        struct_fill(&mut mem, &fake);

        let outcome = sort_tiles(&mem, 0x800, no_span(), true, Scheme::Lzss).unwrap();
        let mut seen = vec![false; TILE_COUNT];
        for &n in &outcome.remap {
            assert!(!seen[n as usize]);
            seen[n as usize] = true;
        }
        // filler tiles never move
        for i in 0..0x10 {
            assert_eq!(outcome.remap[i], i as u16);
        }
    }

    #[test]
    fn remap_preserves_attribute_bits() {
        let mut remap: Vec<u16> = (0..TILE_COUNT as u16).collect();
        remap[0x123] = 0x321;
        let mut mapping = vec![0xE123u16];
        remap_mapping(&mut mapping, &remap);
        assert_eq!(mapping[0], 0xE321);
    }

    fn struct_fill(mem: &mut TileMemory, data: &[u8]) {
        // route through the raw loader so the test uses the public API
        use crate::rom::RomImage;
        let mut bytes = vec![0u8; 0x18_0000];
        bytes[0x7FC0..0x7FC0 + 9].copy_from_slice(b"MEGAMAN X");
        for i in 9..21 {
            bytes[0x7FC0 + i] = b' ';
        }
        bytes[0x7FDC] = 0xFF;
        bytes[0x7FDD] = 0x7F;
        bytes[0x7FDE] = 0x00;
        bytes[0x7FDF] = 0x80;
        bytes[0x10000..0x10000 + data.len()].copy_from_slice(data);
        let rom = RomImage::load(bytes).unwrap();
        mem.load_raw(&rom, 0x10000, 0x200, data.len()).unwrap();
    }
}
