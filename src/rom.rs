//! ROM image buffer and byte-level accessors.
//!
//! `RomImage` owns the cartridge bytes for the lifetime of the program;
//! everything else borrows from it. All multi-byte reads are little
//! endian, as stored on the cartridge. Signed words come out of the
//! dedicated `short` accessor with two's-complement sign extension;
//! nothing else reinterprets bits.

use log::{debug, warn};

use crate::address::Mapping;
use crate::error::RomError;
use crate::header::{self, SnesHeader};

/// Supported image sizes, in bytes.
pub const IMAGE_SIZES: [usize; 6] = [
    0x18_0000, 0x20_0000, 0x28_0000, 0x30_0000, 0x40_0000, 0x60_0000,
];

/// A loaded ROM image with its detected mapping mode.
pub struct RomImage {
    bytes: Vec<u8>,
    mapping: Mapping,
    header: SnesHeader,
}

impl RomImage {
    /// Take ownership of raw file bytes: strip a copier header if the
    /// internal-header probe found one, then validate the size.
    pub fn load(mut bytes: Vec<u8>) -> Result<RomImage, RomError> {
        let probe = header::probe(&bytes)
            .ok_or_else(|| RomError::UnsupportedVariant("no SNES header".to_string()))?;

        if probe.copier_offset != 0 {
            debug!("stripping {:#x}-byte copier header", probe.copier_offset);
            bytes.drain(..probe.copier_offset);
        }

        if !IMAGE_SIZES.contains(&bytes.len()) {
            return Err(RomError::BadImageSize(bytes.len()));
        }

        debug!(
            "loaded {:#x}-byte image, {:?}, title {:?}",
            bytes.len(),
            probe.mapping,
            probe.header.title_string()
        );

        Ok(RomImage {
            bytes,
            mapping: probe.mapping,
            header: probe.header,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn header(&self) -> &SnesHeader {
        &self.header
    }

    pub fn mapping(&self) -> Mapping {
        self.mapping
    }

    /// Resolve a banked address against this image's mapping.
    pub fn snes2pc(&self, snes: u32) -> usize {
        self.mapping.snes2pc(snes)
    }

    pub fn pc2snes(&self, pc: usize) -> u32 {
        self.mapping.pc2snes(pc)
    }

    /// Byte at a flat offset. Reads past the end yield 0 (open-bus style
    /// default) and log once per call site rather than failing: zeroed
    /// table entries already mean "absent" throughout the formats.
    pub fn byte(&self, pc: usize) -> u8 {
        match self.bytes.get(pc) {
            Some(&b) => b,
            None => {
                warn!("read past end of ROM at {:#x}", pc);
                0
            }
        }
    }

    /// Little-endian u16 at a flat offset.
    pub fn word(&self, pc: usize) -> u16 {
        u16::from_le_bytes([self.byte(pc), self.byte(pc + 1)])
    }

    /// Little-endian u32 at a flat offset. Callers mask to 24 bits when
    /// the field is a banked pointer.
    pub fn dword(&self, pc: usize) -> u32 {
        u32::from_le_bytes([
            self.byte(pc),
            self.byte(pc + 1),
            self.byte(pc + 2),
            self.byte(pc + 3),
        ])
    }

    /// Signed 16-bit read: two's complement, sign-extended.
    pub fn short(&self, pc: usize) -> i16 {
        self.word(pc) as i16
    }

    /// Byte at a banked SNES address.
    pub fn sread_byte(&self, snes: u32) -> u8 {
        self.byte(self.snes2pc(snes))
    }

    pub fn sread_word(&self, snes: u32) -> u16 {
        self.word(self.snes2pc(snes))
    }

    pub fn sread_dword(&self, snes: u32) -> u32 {
        self.dword(self.snes2pc(snes))
    }

    /// ASCII bytes at a flat offset, for signature checks.
    pub fn ascii(&self, pc: usize, len: usize) -> String {
        let end = (pc + len).min(self.bytes.len());
        if pc >= end {
            return String::new();
        }
        String::from_utf8_lossy(&self.bytes[pc..end]).to_string()
    }

    /// Bounds-check a pointer before handing it to a record walker.
    pub fn check(&self, what: &str, pc: usize, need: usize) -> Result<(), RomError> {
        if pc + need > self.bytes.len() {
            return Err(RomError::OutOfBounds {
                what: what.to_string(),
                offset: pc,
                len: self.bytes.len(),
            });
        }
        Ok(())
    }

    /// A read-and-advance cursor at a flat offset.
    pub fn cursor(&self, pc: usize) -> Cursor<'_> {
        Cursor {
            bytes: &self.bytes,
            pos: pc,
        }
    }
}

/// Forward-only reader over the ROM bytes. Replaces the original's bare
/// `ptr++` walking so every advance is bounds-checked in one place.
pub struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn at(bytes: &'a [u8], pos: usize) -> Cursor<'a> {
        Cursor { bytes, pos }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    fn oob(&self) -> RomError {
        RomError::OutOfBounds {
            what: "cursor".to_string(),
            offset: self.pos,
            len: self.bytes.len(),
        }
    }

    pub fn u8(&mut self) -> Result<u8, RomError> {
        let b = *self.bytes.get(self.pos).ok_or_else(|| self.oob())?;
        self.pos += 1;
        Ok(b)
    }

    pub fn u16(&mut self) -> Result<u16, RomError> {
        let lo = self.u8()?;
        let hi = self.u8()?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    pub fn i16(&mut self) -> Result<i16, RomError> {
        Ok(self.u16()? as i16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> RomImage {
        let mut bytes = vec![0u8; 0x18_0000];
        bytes[0x7FC0..0x7FC0 + 9].copy_from_slice(b"MEGAMAN X");
        for i in 9..21 {
            bytes[0x7FC0 + i] = b' ';
        }
        bytes[0x7FDC] = 0xFF;
        bytes[0x7FDD] = 0x7F;
        bytes[0x7FDE] = 0x00;
        bytes[0x7FDF] = 0x80;
        bytes[0x1000] = 0x34;
        bytes[0x1001] = 0x12;
        bytes[0x1002] = 0xFE;
        bytes[0x1003] = 0xFF;
        RomImage::load(bytes).unwrap()
    }

    #[test]
    fn little_endian_reads() {
        let rom = image();
        assert_eq!(rom.word(0x1000), 0x1234);
        assert_eq!(rom.dword(0x1000), 0xFFFE_1234);
    }

    #[test]
    fn signed_word_sign_extends() {
        let rom = image();
        assert_eq!(rom.short(0x1002), -2);
    }

    #[test]
    fn rejects_odd_sizes() {
        // a size that fits no candidate fails at the header probe
        match RomImage::load(vec![0u8; 0x12345]) {
            Err(RomError::UnsupportedVariant(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("accepted an unsupported size"),
        }
    }

    #[test]
    fn cursor_stops_at_end() {
        let bytes = [1u8, 2];
        let mut c = Cursor::at(&bytes, 0);
        assert_eq!(c.u16().unwrap(), 0x0201);
        assert!(c.u8().is_err());
    }
}
