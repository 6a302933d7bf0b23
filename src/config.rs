//! Optional decode options, read from a TOML file by the CLI.

use std::fs;
use std::path::Path;

use log::debug;
use serde::Deserialize;

use crate::error::RomError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecodeOptions {
    /// Clamp oversized graphics blocks to the window instead of failing.
    pub tolerate_tile_overflow: bool,
    /// Also decode the background plane.
    pub background: bool,
    /// Level selected when the command line names none.
    pub level: u16,
    /// Checkpoint selected when the command line names none.
    pub point: u16,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            tolerate_tile_overflow: false,
            background: false,
            level: 0,
            point: 0,
        }
    }
}

impl DecodeOptions {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<DecodeOptions, RomError> {
        let text = fs::read_to_string(path.as_ref())?;
        let options: DecodeOptions = toml::from_str(&text)
            .map_err(|e| RomError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        debug!("options: {:?}", options);
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_strict() {
        let options = DecodeOptions::default();
        assert!(!options.tolerate_tile_overflow);
        assert!(!options.background);
        assert_eq!(options.level, 0);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let options: DecodeOptions =
            toml::from_str("tolerate_tile_overflow = true\nlevel = 3\n").unwrap();
        assert!(options.tolerate_tile_overflow);
        assert_eq!(options.level, 3);
        assert_eq!(options.point, 0);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<DecodeOptions>("bogus = 1\n").is_err());
    }
}
