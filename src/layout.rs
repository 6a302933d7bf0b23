//! Scene layout run-length codec.
//!
//! A layout is a width-by-height grid of scene indices stored as
//! (control, value) pairs, terminated by a 0xFF control byte. A control
//! byte with the high bit set repeats the value `control & 0x7F` times;
//! with the high bit clear it emits `control` ascending indices starting
//! at the value. The later engine revision dropped the codec and stores
//! the grid raw, so callers pick between [`decode`] and a plain copy.

use log::warn;

use crate::error::RomError;

/// Largest scene grid either engine addresses.
pub const MAX_SCENES: usize = 0x400;

const TERMINATOR: u8 = 0xFF;
const RUN_FLAG: u8 = 0x80;
const MAX_ASCENDING: usize = 0x7F;
// a constant run of 0x7F would encode as 0xFF, the terminator
const MAX_CONSTANT: usize = 0x7E;

/// A decoded layout plus the scene population it implies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLayout {
    pub scenes: Vec<u8>,
    /// One past the highest scene index emitted. Derived from the data
    /// rather than stored, so stale counts in an edited stream cannot
    /// undercut the scene tables.
    pub scene_used: usize,
}

/// Expand an encoded stream. Reads pairs until the terminator; `limit`
/// caps the output so a missing terminator cannot run away.
pub fn decode(stream: &[u8], limit: usize) -> Result<DecodedLayout, RomError> {
    let limit = limit.min(MAX_SCENES);
    let mut scenes = Vec::with_capacity(limit);
    let mut scene_used = 0usize;
    let mut pos = 0usize;

    loop {
        let control = *stream.get(pos).ok_or_else(|| RomError::CorruptCompressedBlock {
            table: "layout".to_string(),
            detail: "stream ended before terminator".to_string(),
        })?;
        if control == TERMINATOR {
            break;
        }
        let value = *stream.get(pos + 1).ok_or_else(|| RomError::CorruptCompressedBlock {
            table: "layout".to_string(),
            detail: "control byte with no value".to_string(),
        })?;
        pos += 2;

        let count = (control & !RUN_FLAG) as usize;
        for i in 0..count {
            if scenes.len() == limit {
                return Err(RomError::CorruptCompressedBlock {
                    table: "layout".to_string(),
                    detail: format!("more than {} scenes before terminator", limit),
                });
            }
            let scene = if control & RUN_FLAG != 0 {
                value
            } else {
                value.wrapping_add(i as u8)
            };
            scenes.push(scene);
            scene_used = scene_used.max(scene as usize + 1);
        }
    }

    Ok(DecodedLayout { scenes, scene_used })
}

/// Pack a grid back into (control, value) pairs. Greedy: at each point
/// take the longer of the constant run and the ascending run, falling
/// back to a single-element pair. Runs are capped at the 7-bit count.
pub fn encode(scenes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(scenes.len() / 2 + 2);
    let mut i = 0usize;

    while i < scenes.len() {
        let start = scenes[i];

        let mut constant = 1usize;
        while i + constant < scenes.len()
            && scenes[i + constant] == start
            && constant < MAX_CONSTANT
        {
            constant += 1;
        }

        let mut ascending = 1usize;
        while i + ascending < scenes.len()
            && scenes[i + ascending] == start.wrapping_add(ascending as u8)
            && ascending < MAX_ASCENDING
        {
            ascending += 1;
        }

        if constant >= ascending && constant > 1 {
            out.push(RUN_FLAG | constant as u8);
            out.push(start);
            i += constant;
        } else {
            out.push(ascending as u8);
            out.push(start);
            i += ascending;
        }
    }

    out.push(TERMINATOR);
    out
}

/// Copy a raw (unencoded) grid, as stored by the later engine.
pub fn decode_raw(stream: &[u8], len: usize) -> Result<DecodedLayout, RomError> {
    if stream.len() < len {
        return Err(RomError::OutOfBounds {
            what: "raw layout".to_string(),
            offset: 0,
            len,
        });
    }
    let scenes = stream[..len].to_vec();
    let scene_used = scenes.iter().map(|&s| s as usize + 1).max().unwrap_or(0);
    if scene_used > MAX_SCENES {
        warn!("raw layout claims {} scenes", scene_used);
    }
    Ok(DecodedLayout { scenes, scene_used })
}
