//! Error taxonomy for bundle encoding, parsing and access.

use std::io;

use crate::codec::CodecError;

/// Errors raised while writing, parsing or reading a bundle.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    /// Short read/write or any other failure of the underlying file.
    #[error("Bundle I/O failed: {0}")]
    Integrity(#[from] io::Error),
    #[error("Not a texture bundle (magic {magic:?}, version {version:?})")]
    FormatMismatch { magic: [u8; 4], version: u8 },
    #[error("Corrupt bundle header: {0}")]
    CorruptHeader(String),
    #[error("Entry path {path:?} is {len} bytes, limit is {max}")]
    PathTooLong { path: String, len: usize, max: usize },
    #[error("{count} {what} do not fit in a 32-bit header count")]
    CountOverflow { what: &'static str, count: usize },
    #[error("Entry {0:?} already exists")]
    DuplicateEntry(String),
    #[error("No entry {0:?} in bundle")]
    UnknownEntry(String),
    #[error("Invalid ownership table: {0}")]
    InvalidOwnership(String),
    #[error("Failed to unpack frame: {0}")]
    Unpack(#[from] CodecError),
    #[error("Bundle handle is closed")]
    Closed,
}

impl From<BundleError> for io::Error {
    fn from(err: BundleError) -> Self {
        match err {
            BundleError::Integrity(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
