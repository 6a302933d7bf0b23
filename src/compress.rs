//! Graphics compression codec.
//!
//! Two shipped formats. The first game uses a bitmask RLE: each control
//! byte's bits pick, MSB first, between "copy a literal" and "repeat the
//! group's fill byte". The later games use an LZSS variant with a
//! SNES-friendly layout: control bits interleave with the data stream,
//! and a set bit introduces a two-byte (length, offset) pair copying
//! already-written output. Offsets may overlap the write position, so the
//! copy must run one byte at a time; a one-byte offset legitimately
//! expands into a long repeated run.

use log::debug;

use crate::error::RomError;

pub const MAX_LENGTH: usize = 63;
pub const MIN_LENGTH: usize = 3;
pub const WINDOW_SIZE: usize = 1023;

/// Which compressed format a blob uses. Fixed per game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Control-byte bitmask RLE (first game).
    BitmaskRle,
    /// LZSS with 6-bit lengths and 10-bit offsets (everything later).
    Lzss,
}

impl Scheme {
    pub fn for_variant(variant: crate::variant::GameVariant) -> Scheme {
        match variant {
            crate::variant::GameVariant::Mmx1 => Scheme::BitmaskRle,
            _ => Scheme::Lzss,
        }
    }
}

fn corrupt(table: &str, detail: String) -> RomError {
    RomError::CorruptCompressedBlock {
        table: table.to_string(),
        detail,
    }
}

/// Decompress `size` bytes from `src[src_off..]` into `dst[dst_off..]`.
/// Returns the number of source bytes consumed. `table` names the blob
/// for error reporting.
///
/// `dst` must have room for the full request; the tile-memory window
/// check belongs to the caller, which knows what the destination is.
pub fn decompress(
    src: &[u8],
    src_off: usize,
    dst: &mut [u8],
    dst_off: usize,
    size: usize,
    scheme: Scheme,
    table: &str,
) -> Result<usize, RomError> {
    if dst_off + size > dst.len() {
        return Err(RomError::TileMemoryOverflow {
            table: table.to_string(),
            need: dst_off + size,
        });
    }

    let mut pos = src_off;
    let take = |pos: &mut usize| -> Result<u8, RomError> {
        let b = *src
            .get(*pos)
            .ok_or_else(|| corrupt(table, format!("source exhausted at {:#x}", *pos)))?;
        *pos += 1;
        Ok(b)
    };

    match scheme {
        Scheme::BitmaskRle => {
            let mut write = dst_off;
            for _ in 0..size >> 3 {
                let mut control = take(&mut pos)?;
                let data = take(&mut pos)?;
                for _ in 0..8 {
                    dst[write] = if control & 0x80 != 0 {
                        take(&mut pos)?
                    } else {
                        data
                    };
                    write += 1;
                    control <<= 1;
                }
            }
        }
        Scheme::Lzss => {
            let mut control = take(&mut pos)?;
            let mut bit_pos = 7u32;
            let mut count = 0usize;
            let mut write = 0usize;

            while count < size {
                if control & (1 << bit_pos) != 0 {
                    let b0 = take(&mut pos)? as usize;
                    let b1 = take(&mut pos)? as usize;
                    let length = b0 >> 2;
                    let offset = ((b0 & 0x3) << 8) | b1;

                    if offset > write {
                        return Err(corrupt(
                            table,
                            format!(
                                "back-reference offset {} before start of output at {}",
                                offset, write
                            ),
                        ));
                    }
                    if count + length > size {
                        return Err(corrupt(
                            table,
                            format!(
                                "match of {} bytes overruns the declared {:#x}-byte output",
                                length, size
                            ),
                        ));
                    }

                    count += length;
                    for _ in 0..length {
                        // overlap-aware byte copy; never a bulk move
                        dst[dst_off + write] = dst[dst_off + write - offset];
                        write += 1;
                    }
                } else {
                    dst[dst_off + write] = take(&mut pos)?;
                    write += 1;
                    count += 1;
                }

                if bit_pos == 0 {
                    if count < size {
                        control = take(&mut pos)?;
                    }
                    bit_pos = 7;
                } else {
                    bit_pos -= 1;
                }
            }
        }
    }

    Ok(pos - src_off)
}

/// Transient best match from the window scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchPair {
    pub offset: usize,
    pub length: usize,
}

/// KMP failure function over the next `max_length` source bytes, so the
/// window scan can skip re-comparing a matched prefix.
fn compute_kmp(src: &[u8], src_off: usize, table: &mut [i32; MAX_LENGTH], max_length: usize) {
    table[0] = -1;
    if MAX_LENGTH > 1 {
        table[1] = 0;
    }

    let mut i = 2usize;
    let mut j = 0usize;
    while i < max_length {
        if src[src_off + i - 1] == src[src_off + j] {
            j += 1;
            table[i] = j as i32;
            i += 1;
        } else if j > 0 {
            j = table[j] as usize;
        } else {
            table[i] = 0;
            i += 1;
        }
    }
}

/// Longest match for `src[cursor..]` inside the window
/// `src[window_start..cursor]`, scanning from the far end of the window.
/// Stops early at [`MAX_LENGTH`] or when the match runs to end-of-input,
/// which is necessarily the best match there. Ties keep the first match
/// found during the scan.
pub fn find_match(src: &[u8], window_start: usize, cursor: usize, size: usize) -> MatchPair {
    let mut table = [0i32; MAX_LENGTH];
    compute_kmp(src, cursor, &mut table, MAX_LENGTH.min(size - cursor));

    let mut best = MatchPair::default();
    let mut m = 0usize;
    let mut i = 0usize;

    while m < cursor - window_start {
        if src[cursor + i] == src[window_start + m + i] {
            i += 1;
            if i == MAX_LENGTH {
                best.length = MAX_LENGTH;
                best.offset = cursor - window_start - m;
                break;
            } else if cursor + i == size {
                best.length = i;
                best.offset = cursor - window_start - m;
                break;
            }
        } else {
            if i > best.length {
                best.length = i;
                best.offset = cursor - window_start - m;
            }

            m += (i as i32 - table[i]) as usize;
            i = if table[i] > 0 { table[i] as usize } else { 0 };
        }
    }

    best
}

/// Compress `src` with the given scheme. The output is not guaranteed to
/// be byte-identical to the original toolchain's, only to round-trip
/// through [`decompress`].
pub fn compress(src: &[u8], scheme: Scheme) -> Result<Vec<u8>, RomError> {
    match scheme {
        Scheme::BitmaskRle => compress_bitmask_rle(src),
        Scheme::Lzss => Ok(compress_lzss(src)),
    }
}

/// Groups of eight: pick the group's most frequent byte as the fill,
/// clear that byte's control bits, append the rest as literals.
fn compress_bitmask_rle(src: &[u8]) -> Result<Vec<u8>, RomError> {
    if src.len() % 8 != 0 {
        return Err(RomError::EncodeOverflow(format!(
            "bitmask RLE needs a multiple of 8 bytes, got {}",
            src.len()
        )));
    }

    let mut out = Vec::with_capacity(src.len() + src.len() / 8);
    for group in src.chunks_exact(8) {
        let mut counts = [0u8; 0x100];
        let mut best_count = 0u8;
        let mut data = 0u8;
        for &b in group {
            counts[b as usize] += 1;
            if counts[b as usize] > best_count {
                best_count = counts[b as usize];
                data = b;
            }
        }

        let mut control = 0xFFu8;
        for (j, &b) in group.iter().enumerate() {
            if b == data {
                control ^= 0x80 >> j;
            }
        }

        out.push(control);
        out.push(data);
        for &b in group {
            if b != data {
                out.push(b);
            }
        }
    }

    Ok(out)
}

/// Greedy left-to-right LZSS: take the longest window match when it
/// reaches [`MIN_LENGTH`], else a literal; flush the control byte every
/// eight decisions.
fn compress_lzss(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len() / 2 + 16);
    if src.is_empty() {
        return out;
    }

    let mut control_at = 0usize;
    let mut flag = 0x80u8;
    let mut window = 0usize;
    let mut cursor = 0usize;

    while cursor < src.len() {
        if flag == 0x80 {
            control_at = out.len();
            out.push(0);
        }

        let m = find_match(src, window, cursor, src.len());

        if m.length < MIN_LENGTH {
            out.push(src[cursor]);
            cursor += 1;
        } else {
            out[control_at] |= flag;
            // length in the top six bits, offset split 2+8
            out.push(((m.length << 2) | (m.offset >> 8)) as u8);
            out.push((m.offset & 0xFF) as u8);
            cursor += m.length;
        }

        flag >>= 1;
        if flag == 0 {
            flag = 0x80;
        }

        if cursor - window > WINDOW_SIZE {
            window = cursor - WINDOW_SIZE;
        }
    }

    debug!("lzss: {} bytes -> {}", src.len(), out.len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use test_log::test;

    fn roundtrip(data: &[u8], scheme: Scheme) {
        let packed = compress(data, scheme).unwrap();
        let mut unpacked = vec![0u8; data.len()];
        let consumed =
            decompress(&packed, 0, &mut unpacked, 0, data.len(), scheme, "test").unwrap();
        assert_eq!(consumed, packed.len(), "whole stream consumed");
        assert_eq!(unpacked, data);
    }

    #[test]
    fn lzss_overlapping_match_decodes_bytewise() {
        // three literals then a 4-long match reaching 3 bytes back; the
        // copy overlaps its own output and must extend the period-3 run
        let stream = [0x10, 0x01, 0x02, 0x02, 0x10, 0x03];
        let mut out = [0u8; 7];
        let consumed = decompress(&stream, 0, &mut out, 0, 7, Scheme::Lzss, "test").unwrap();
        assert_eq!(consumed, 6);
        assert_eq!(out, [0x01, 0x02, 0x02, 0x01, 0x02, 0x02, 0x01]);
    }

    #[test]
    fn lzss_one_byte_offset_expands_run() {
        // literal 0xAA then offset-1 matches must repeat it
        let data = [0xAAu8; 40];
        roundtrip(&data, Scheme::Lzss);
    }

    #[test]
    fn lzss_rejects_back_reference_before_start() {
        // control 0x80: first decision is a match with nothing written yet
        let stream = [0x80, 0x10, 0x01];
        let mut out = [0u8; 8];
        let err = decompress(&stream, 0, &mut out, 0, 8, Scheme::Lzss, "t").unwrap_err();
        assert!(matches!(err, RomError::CorruptCompressedBlock { .. }));
    }

    #[test]
    fn lzss_match_past_declared_size_is_corrupt() {
        // three literals, then a length-4 match with only one output
        // byte left; the overrun must fail rather than truncate
        let stream = [0x10, 0x01, 0x02, 0x02, 0x10, 0x03];
        let mut out = [0u8; 8];
        let err = decompress(&stream, 0, &mut out, 0, 4, Scheme::Lzss, "t").unwrap_err();
        assert!(matches!(err, RomError::CorruptCompressedBlock { .. }));
    }

    #[test]
    fn lzss_truncated_source_is_an_error() {
        let stream = [0x00, 0x01]; // promises literals it doesn't have
        let mut out = [0u8; 8];
        let err = decompress(&stream, 0, &mut out, 0, 8, Scheme::Lzss, "t").unwrap_err();
        assert!(matches!(err, RomError::CorruptCompressedBlock { .. }));
    }

    #[test]
    fn destination_window_is_enforced() {
        let stream = [0u8; 16];
        let mut out = [0u8; 8];
        let err = decompress(&stream, 0, &mut out, 4, 8, Scheme::Lzss, "t").unwrap_err();
        assert!(matches!(err, RomError::TileMemoryOverflow { .. }));
    }

    #[test]
    fn bitmask_rle_roundtrip_uniform() {
        let mut data = vec![0x55u8; 64];
        data[3] = 0x11;
        data[40] = 0x99;
        roundtrip(&data, Scheme::BitmaskRle);
    }

    #[test]
    fn bitmask_rle_rejects_ragged_input() {
        assert!(compress(&[1, 2, 3], Scheme::BitmaskRle).is_err());
    }

    #[test]
    fn lzss_roundtrip_structured() {
        // typical tile data: repetitive with short literal islands
        let mut data = Vec::new();
        for i in 0..0x300 {
            data.push(match i % 7 {
                0..=4 => 0x00,
                5 => (i / 7) as u8,
                _ => 0xF0,
            });
        }
        roundtrip(&data, Scheme::Lzss);
    }

    #[test]
    fn lzss_roundtrip_random() {
        let mut rng = StdRng::seed_from_u64(0x1991);
        for len in [1usize, 2, 7, 63, 64, 257, 2048] {
            let mut data = vec![0u8; len];
            // low-entropy alphabet so matches actually occur
            for b in data.iter_mut() {
                *b = rng.random_range(0..4) * 0x11;
            }
            roundtrip(&data, Scheme::Lzss);
        }
    }

    #[test]
    fn match_finder_prefers_longest() {
        //                     0     1     2     3     4     5     6     7
        let src = [0x01, 0x02, 0x03, 0x01, 0x02, 0x01, 0x02, 0x03];
        // at cursor 5 the window holds [01 02 03 01 02]; longest match
        // for [01 02 03] starts at 0, length 3
        let m = find_match(&src, 0, 5, src.len());
        assert_eq!(m.length, 3);
        assert_eq!(m.offset, 5);
    }

    #[test]
    fn match_finder_stops_at_end_of_input() {
        let src = [0x07, 0x07, 0x07, 0x07];
        let m = find_match(&src, 0, 1, src.len());
        // matched all the way to the end; by definition the best
        assert_eq!(m.length, 3);
        assert_eq!(m.offset, 1);
    }
}
