// Decoder error handling

use std::fmt;

/// Errors surfaced while decoding a ROM image.
///
/// Most decode steps are pure functions over pre-validated pointers and
/// return defaults for absent optional tables instead of failing; the
/// variants here cover the conditions that genuinely cannot be decoded
/// around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RomError {
    /// Title signature matched none of the four known games.
    UnsupportedVariant(String),

    /// ROM file has none of the supported sizes.
    BadImageSize(usize),

    /// A length/offset pair or literal run in a compressed block would
    /// read outside the legal window. `table` names the blob being
    /// decoded (e.g. "gfx level 3"), `detail` says what went wrong.
    CorruptCompressedBlock { table: String, detail: String },

    /// Decompression destination exceeds the fixed tile-memory window.
    /// Recoverable when the caller opts into truncation.
    TileMemoryOverflow { table: String, need: usize },

    /// A table pointer resolved outside the ROM image.
    OutOfBounds {
        what: String,
        offset: usize,
        len: usize,
    },

    /// A value that must fit an encoding field does not (encoder side).
    EncodeOverflow(String),

    Io(String),
}

impl fmt::Display for RomError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RomError::UnsupportedVariant(title) => {
                write!(f, "unsupported ROM: title {:?} matches no known game", title)
            }
            RomError::BadImageSize(size) => {
                write!(f, "unsupported ROM image size {:#x}", size)
            }
            RomError::CorruptCompressedBlock { table, detail } => {
                write!(f, "corrupt compressed block in {}: {}", table, detail)
            }
            RomError::TileMemoryOverflow { table, need } => {
                write!(
                    f,
                    "tile memory overflow decoding {}: needs {:#x} bytes",
                    table, need
                )
            }
            RomError::OutOfBounds { what, offset, len } => {
                write!(
                    f,
                    "{} points outside the ROM ({:#x} of {:#x} bytes)",
                    what, offset, len
                )
            }
            RomError::EncodeOverflow(msg) => write!(f, "encode overflow: {}", msg),
            RomError::Io(msg) => write!(f, "i/o error: {}", msg),
        }
    }
}

impl std::error::Error for RomError {}

impl From<std::io::Error> for RomError {
    fn from(e: std::io::Error) -> Self {
        RomError::Io(e.to_string())
    }
}
