//! Texture bundle container: writer, reader, streaming access and cache.
//!
//! A bundle packs many named texture entries, each made of one or more
//! frames, into a single file with a fixed header in front of the payload.
//!
//! # File Format
//!
//! All integers are little-endian, with no padding:
//!
//! ```text
//! Header:
//!   Magic: "XBTF" (4 bytes)
//!   Version: '2' (1 byte)
//!   Entry count: u32
//!
//!   Per entry:
//!     Path: 256 bytes, lower-case, zero padded
//!     Loop count: u32 (0 = forever)
//!     Frame count: u32
//!
//!     Per frame:
//!       Width, Height, Format: u32
//!       Packed size, Unpacked size: u64
//!       Duration (ms): u32
//!       Offset: u64 (absolute)
//!
//! Payload (variable):
//!   Frame bytes, LZ4 block compressed when packed < unpacked size.
//!   Entries with identical content share one copy.
//! ```

mod error;
mod format;
mod manager;
mod reader;
mod stream;
mod writer;

pub use error::BundleError;
pub use format::{
    BUNDLE_MAGIC, BUNDLE_VERSION, Entry, Frame, FrameFormat, MAX_PATH_LEN, PATH_FIELD_LEN,
    PixelFormat, Swizzle, canonical_path, header_size, header_size_for, read_header, write_header,
};
pub use manager::{BUNDLE_EXTENSION, BUNDLE_SCHEME, BundleManager, split_bundle_path};
pub use reader::BundleReader;
pub use stream::BundleStream;
pub use writer::{BundleWriter, WriteStats};
