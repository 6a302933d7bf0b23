//! Level decoder for the SNES 16-bit Mega Man titles (and Rockman &
//! Forte), reading layouts, tile graphics, palettes, events and
//! checkpoints straight out of a ROM image.
//!
//! Typical use: load the image, build a [`level::LevelReader`], and ask
//! it for a [`level::LevelSnapshot`]:
//!
//! ```no_run
//! use maverick::level::{LevelReader, LoadOverrides};
//! use maverick::rom::RomImage;
//!
//! # fn run() -> Result<(), maverick::error::RomError> {
//! let bytes = std::fs::read("mmx.sfc").map_err(maverick::error::RomError::from)?;
//! let reader = LevelReader::new(RomImage::load(bytes)?)?;
//! let snapshot = reader.select_level(0, 0, LoadOverrides::default())?;
//! println!("{} scenes in use", snapshot.scene_used);
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod checkpoint;
pub mod compress;
pub mod config;
pub mod error;
pub mod events;
pub mod header;
pub mod layout;
pub mod level;
pub mod palette;
pub mod rom;
pub mod sort;
pub mod tiles;
pub mod variant;
