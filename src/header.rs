//! SNES internal header parsing.
//!
//! The header sits at 0x7FC0 (LoROM) or 0xFFC0 (HiROM), shifted by 0x200
//! when a copier header was prepended to the dump. The checksum and its
//! complement must sum to 0xFFFF; that test picks the right candidate.

use std::fmt::{Display, Error, Formatter};

use crate::address::Mapping;

pub const TITLE_LEN: usize = 21;

/// The fixed portion of the internal cartridge header (interrupt vectors
/// excluded; nothing here needs them).
#[derive(Debug, Clone)]
pub struct SnesHeader {
    pub title: [u8; TITLE_LEN],
    pub map_mode: u8,
    pub cart_type: u8,
    pub rom_size: u8,
    pub ram_size: u8,
    pub country: u8,
    pub license: u8,
    pub version: u8,
    pub checksum_complement: u16,
    pub checksum: u16,
}

impl SnesHeader {
    fn parse(bytes: &[u8]) -> Option<SnesHeader> {
        if bytes.len() < 0x20 {
            return None;
        }

        let mut title = [0u8; TITLE_LEN];
        title.copy_from_slice(&bytes[..TITLE_LEN]);

        Some(SnesHeader {
            title,
            map_mode: bytes[0x15],
            cart_type: bytes[0x16],
            rom_size: bytes[0x17],
            ram_size: bytes[0x18],
            country: bytes[0x19],
            license: bytes[0x1A],
            version: bytes[0x1B],
            checksum_complement: u16::from_le_bytes([bytes[0x1C], bytes[0x1D]]),
            checksum: u16::from_le_bytes([bytes[0x1E], bytes[0x1F]]),
        })
    }

    /// Checksum plus complement must be 0xFFFF for a real header.
    fn plausible(&self) -> bool {
        self.checksum.wrapping_add(self.checksum_complement) == 0xFFFF
    }

    /// Title bytes as trimmed ASCII, for diagnostics only; the variant
    /// detector matches the raw bytes.
    pub fn title_string(&self) -> String {
        String::from_utf8_lossy(&self.title).trim_end().to_string()
    }

    /// Little-endian u32 from the title field, the unit the signature
    /// matcher compares.
    pub fn title_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes([
            self.title[offset],
            self.title[offset + 1],
            self.title[offset + 2],
            self.title[offset + 3],
        ])
    }

    pub fn title_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.title[offset], self.title[offset + 1]])
    }
}

/// Result of probing the four candidate header locations.
pub struct HeaderProbe {
    pub header: SnesHeader,
    pub mapping: Mapping,
    /// 0x200 when the dump carries a copier header that must be stripped.
    pub copier_offset: usize,
}

/// Probe headerless LoROM, headerless HiROM, then the two headered
/// variants, in that order.
pub fn probe(bytes: &[u8]) -> Option<HeaderProbe> {
    let candidates = [
        (0x7FC0usize, Mapping::LoRom, 0usize),
        (0xFFC0, Mapping::HiRom, 0),
        (0x81C0, Mapping::LoRom, 0x200),
        (0x101C0, Mapping::HiRom, 0x200),
    ];

    for (pos, mapping, copier_offset) in candidates {
        if pos + 0x20 > bytes.len() {
            continue;
        }
        if let Some(header) = SnesHeader::parse(&bytes[pos..]) {
            if header.plausible() {
                return Some(HeaderProbe {
                    header,
                    mapping,
                    copier_offset,
                });
            }
        }
    }

    None
}

impl Display for SnesHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "
Title:      {}
Map mode:   {:#04x}
Cart type:  {:#04x}
ROM size:   {:#04x}
RAM size:   {:#04x}
Version:    {}
Checksum:   {:#06x} (complement {:#06x})
",
            self.title_string(),
            self.map_mode,
            self.cart_type,
            self.rom_size,
            self.ram_size,
            self.version,
            self.checksum,
            self.checksum_complement,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_rom(header_at: usize, title: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0u8; 0x18_0000];
        bytes[header_at..header_at + title.len()].copy_from_slice(title);
        // complementary checksum pair
        bytes[header_at + 0x1C] = 0xFF;
        bytes[header_at + 0x1D] = 0x7F;
        bytes[header_at + 0x1E] = 0x00;
        bytes[header_at + 0x1F] = 0x80;
        bytes
    }

    #[test]
    fn probes_lorom() {
        let rom = fake_rom(0x7FC0, b"MEGAMAN X            ");
        let probe = probe(&rom).expect("header");
        assert_eq!(probe.mapping, Mapping::LoRom);
        assert_eq!(probe.copier_offset, 0);
        assert_eq!(probe.header.title_string(), "MEGAMAN X");
    }

    #[test]
    fn probes_headered_lorom() {
        let rom = fake_rom(0x81C0, b"MEGAMAN X            ");
        let probe = probe(&rom).expect("header");
        assert_eq!(probe.copier_offset, 0x200);
    }

    #[test]
    fn rejects_garbage() {
        let bytes = vec![0u8; 0x18_0000];
        assert!(probe(&bytes).is_none());
    }
}
