//! Error types shared by the container reader, the MUSC parser and the XM writer.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The ROM does not contain a `DPAK` signature.
    #[error("no DPAK container found")]
    ContainerNotFound,

    /// The container exists but has no chunk starting with `signature`.
    #[error("container has no {signature} chunk")]
    ChunkNotFound { signature: String },

    /// A field declared more bytes than the source holds.
    #[error("truncated read: {0}")]
    TruncatedRead(#[source] io::Error),

    #[error("bad magic: expected {expected:?}, found {found:?}")]
    BadMagic { expected: [u8; 4], found: [u8; 4] },

    #[error("song {song} has an empty order table")]
    EmptyOrderTable { song: u32 },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Io(io::Error),
}

impl Error {
    /// True for the conditions that mean "nothing to convert here" rather than a broken file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ContainerNotFound | Error::ChunkNotFound { .. })
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::TruncatedRead(e),
            _ => Error::Io(e),
        }
    }
}

/// Contract violations detected while building an XM module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("order table has {0} entries (max 256)")]
    OrderTooLong(usize),

    #[error("pattern has {0} rows (must be 1..=256)")]
    InvalidRowCount(usize),

    #[error("pattern row {row} has {found} channels, module has {expected}")]
    ChannelMismatch {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("instrument has {0} samples (max 128)")]
    TooManySamples(usize),

    #[error("packed pattern data is {0} bytes (max 65535)")]
    PatternTooLarge(usize),
}
