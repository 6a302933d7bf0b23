//! SNES banked address <-> flat file offset translation.
//!
//! A banked address is `bank << 16 | offset`. LoROM maps the upper half of
//! each bank (0x8000..0xFFFF) to consecutive 32KB chunks of the file;
//! HiROM maps banks 0xC0 and up linearly. Every other module resolves ROM
//! pointers through these two functions, never by hand.

/// Cartridge mapping mode, read from the internal header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapping {
    LoRom,
    HiRom,
}

impl Mapping {
    /// Banked SNES address to flat file offset.
    pub fn snes2pc(self, snes: u32) -> usize {
        match self {
            Mapping::LoRom => (((snes & 0x007F_0000) >> 1) + (snes & 0x7FFF)) as usize,
            Mapping::HiRom => (snes & 0x003F_FFFF) as usize,
        }
    }

    /// Flat file offset to banked SNES address.
    pub fn pc2snes(self, pc: usize) -> u32 {
        let pc = pc as u32;
        match self {
            Mapping::LoRom => 0x80_0000 + ((pc & 0x3F_8000) << 1) + 0x8000 + (pc & 0x7FFF),
            Mapping::HiRom => 0xC0_0000 | pc,
        }
    }
}
