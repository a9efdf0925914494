//! Binary format definitions for texture bundles.

use std::io::{Read, Seek, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::BundleError;

/// Magic bytes identifying a texture bundle.
pub const BUNDLE_MAGIC: &[u8; 4] = b"XBTF";

/// Current format version.
pub const BUNDLE_VERSION: u8 = b'2';

/// Width of the fixed, zero-padded path field.
pub const PATH_FIELD_LEN: usize = 256;

/// Longest canonical path; one byte of the field is kept for the terminator.
pub const MAX_PATH_LEN: usize = PATH_FIELD_LEN - 1;

/// Magic(4) + Version(1) + FileCount(4).
pub const PREAMBLE_SIZE: u64 = 9;

/// Path(256) + Loop(4) + FrameCount(4).
pub const ENTRY_RECORD_SIZE: u64 = PATH_FIELD_LEN as u64 + 8;

/// Width, Height, Format(4 each) + PackedSize, UnpackedSize(8 each) +
/// Duration(4) + Offset(8).
pub const FRAME_RECORD_SIZE: u64 = 40;

/// Base pixel or block format of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PixelFormat {
    Dxt1 = 1,
    Dxt3 = 2,
    Dxt5 = 4,
    Dxt5YCoCg = 8,
    A8R8G8B8 = 16,
    A8 = 32,
    Rgba8 = 64,
    Rgb8 = 128,
}

impl PixelFormat {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(PixelFormat::Dxt1),
            2 => Some(PixelFormat::Dxt3),
            4 => Some(PixelFormat::Dxt5),
            8 => Some(PixelFormat::Dxt5YCoCg),
            16 => Some(PixelFormat::A8R8G8B8),
            32 => Some(PixelFormat::A8),
            64 => Some(PixelFormat::Rgba8),
            128 => Some(PixelFormat::Rgb8),
            _ => None,
        }
    }

    /// Byte length of one `width` x `height` image in this format.
    ///
    /// Block formats round each dimension up to whole 4x4 blocks.
    pub fn data_size(self, width: u32, height: u32) -> u64 {
        let (w, h) = (width as u64, height as u64);
        let blocks = w.div_ceil(4) * h.div_ceil(4);
        match self {
            PixelFormat::Dxt1 => blocks * 8,
            PixelFormat::Dxt3 | PixelFormat::Dxt5 | PixelFormat::Dxt5YCoCg => blocks * 16,
            PixelFormat::A8R8G8B8 | PixelFormat::Rgba8 => w * h * 4,
            PixelFormat::Rgb8 => w * h * 3,
            PixelFormat::A8 => w * h,
        }
    }
}

/// Channel swizzle hint for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum Swizzle {
    #[default]
    None = 0,
    /// Luminance: red replicated to all channels.
    Rrrr = 1,
    /// Luminance-alpha: red to colour, green to alpha.
    Rrrg = 2,
    Bgra = 3,
}

impl Swizzle {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Swizzle::None),
            1 => Some(Swizzle::Rrrr),
            2 => Some(Swizzle::Rrrg),
            3 => Some(Swizzle::Bgra),
            _ => None,
        }
    }
}

/// Format tag stored per frame: base format, opacity flag and swizzle hint
/// packed into one bitmask.
///
/// ```text
/// bits  0-15  PixelFormat
/// bit   16    opaque
/// bits 24-27  Swizzle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameFormat(pub u32);

impl FrameFormat {
    const BASE_MASK: u32 = 0xFFFF;
    const OPAQUE: u32 = 1 << 16;
    const SWIZZLE_SHIFT: u32 = 24;
    const SWIZZLE_MASK: u32 = 0xF << Self::SWIZZLE_SHIFT;

    pub fn new(base: PixelFormat, opaque: bool, swizzle: Swizzle) -> Self {
        let mut bits = base as u32;
        if opaque {
            bits |= Self::OPAQUE;
        }
        bits |= (swizzle as u32) << Self::SWIZZLE_SHIFT;
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    /// Base format, or `None` for an unrecognised tag.
    pub fn base(self) -> Option<PixelFormat> {
        PixelFormat::from_u32(self.0 & Self::BASE_MASK)
    }

    pub fn is_opaque(self) -> bool {
        self.0 & Self::OPAQUE != 0
    }

    pub fn swizzle(self) -> Swizzle {
        Swizzle::from_u32((self.0 & Self::SWIZZLE_MASK) >> Self::SWIZZLE_SHIFT).unwrap_or_default()
    }
}

/// One still image or animation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    /// Stored byte length (compressed or raw).
    pub packed_size: u64,
    /// Byte length after unpacking.
    pub unpacked_size: u64,
    /// Display time in milliseconds.
    pub duration: u32,
    /// Absolute position of the packed bytes in the bundle.
    pub offset: u64,
}

impl Frame {
    /// True when the stored bytes need decompression.
    pub fn is_packed(&self) -> bool {
        self.packed_size < self.unpacked_size
    }

    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(&self.width.to_le_bytes())?;
        w.write_all(&self.height.to_le_bytes())?;
        w.write_all(&self.format.bits().to_le_bytes())?;
        w.write_all(&self.packed_size.to_le_bytes())?;
        w.write_all(&self.unpacked_size.to_le_bytes())?;
        w.write_all(&self.duration.to_le_bytes())?;
        w.write_all(&self.offset.to_le_bytes())?;
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            width: read_u32(r)?,
            height: read_u32(r)?,
            format: FrameFormat(read_u32(r)?),
            packed_size: read_u64(r)?,
            unpacked_size: read_u64(r)?,
            duration: read_u32(r)?,
            offset: read_u64(r)?,
        })
    }
}

/// One named bundle entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Entry {
    /// Canonical path (lower-case, `/`-separated).
    pub path: String,
    /// Animation loop count, 0 = loop forever.
    #[serde(rename = "loop")]
    pub loop_count: u32,
    /// Frames in animation order.
    pub frames: Vec<Frame>,
    /// Build only: priority of the substitution currently standing in.
    #[serde(skip)]
    pub priority: Option<u32>,
    /// Build only: file the frames are decoded from.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Entry {
    /// Create a skeleton entry with no frames.
    pub fn new(path: &str) -> Self {
        Self {
            path: canonical_path(path),
            ..Default::default()
        }
    }

    /// Sum of the unpacked sizes of all frames.
    pub fn unpacked_size(&self) -> u64 {
        self.frames.iter().map(|f| f.unpacked_size).sum()
    }

    /// Sum of the packed sizes of all frames.
    pub fn packed_size(&self) -> u64 {
        self.frames.iter().map(|f| f.packed_size).sum()
    }
}

/// Normalise a path to its case-insensitive lookup key.
pub fn canonical_path(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_lowercase()
}

/// Header size for the given number of entries and frames.
pub fn header_size_for(entry_count: u64, frame_count: u64) -> u64 {
    PREAMBLE_SIZE + entry_count * ENTRY_RECORD_SIZE + frame_count * FRAME_RECORD_SIZE
}

/// Header size for a set of entries, known before any payload is encoded.
pub fn header_size(entries: &[Entry]) -> u64 {
    let frames: u64 = entries.iter().map(|e| e.frames.len() as u64).sum();
    header_size_for(entries.len() as u64, frames)
}

fn header_count(what: &'static str, count: usize) -> Result<u32, BundleError> {
    u32::try_from(count).map_err(|_| BundleError::CountOverflow { what, count })
}

/// Serialize the header for `entries`, in slice order.
pub fn write_header<W: Write>(w: &mut W, entries: &[Entry]) -> Result<(), BundleError> {
    w.write_all(BUNDLE_MAGIC)?;
    w.write_all(&[BUNDLE_VERSION])?;
    w.write_all(&header_count("entries", entries.len())?.to_le_bytes())?;

    for entry in entries {
        let path = canonical_path(&entry.path);
        if path.len() > MAX_PATH_LEN {
            return Err(BundleError::PathTooLong {
                len: path.len(),
                path,
                max: MAX_PATH_LEN,
            });
        }
        let mut field = [0u8; PATH_FIELD_LEN];
        field[..path.len()].copy_from_slice(path.as_bytes());
        w.write_all(&field)?;
        w.write_all(&entry.loop_count.to_le_bytes())?;
        w.write_all(&header_count("frames", entry.frames.len())?.to_le_bytes())?;

        for frame in &entry.frames {
            frame.write_to(w)?;
        }
    }
    Ok(())
}

/// Parse a header from the start of `r`.
///
/// Leaves the stream positioned directly after the header; never touches
/// payload bytes.
pub fn read_header<R: Read + Seek>(r: &mut R) -> Result<Vec<Entry>, BundleError> {
    let start = r.stream_position()?;

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    let mut version = [0u8; 1];
    r.read_exact(&mut version)?;
    if &magic != BUNDLE_MAGIC || version[0] != BUNDLE_VERSION {
        return Err(BundleError::FormatMismatch {
            magic,
            version: version[0],
        });
    }

    let entry_count = read_u32(r)?;
    // Capacity is capped so a corrupt count cannot force a huge allocation.
    let mut entries = Vec::with_capacity(entry_count.min(4096) as usize);
    let mut frame_total = 0u64;

    for _ in 0..entry_count {
        let mut field = [0u8; PATH_FIELD_LEN];
        r.read_exact(&mut field)?;
        let end = field.iter().position(|&b| b == 0).unwrap_or(PATH_FIELD_LEN);
        let path = String::from_utf8_lossy(&field[..end]).into_owned();

        let loop_count = read_u32(r)?;
        let frame_count = read_u32(r)?;
        let mut frames = Vec::with_capacity(frame_count.min(4096) as usize);
        for _ in 0..frame_count {
            frames.push(Frame::read_from(r)?);
        }
        frame_total += frame_count as u64;

        entries.push(Entry {
            path,
            loop_count,
            frames,
            priority: None,
            source: None,
        });
    }

    let expected = header_size_for(entry_count as u64, frame_total);
    let actual = r.stream_position()? - start;
    if actual != expected {
        return Err(BundleError::CorruptHeader(format!(
            "header ends at byte {actual}, expected {expected}"
        )));
    }

    Ok(entries)
}

fn read_u32<R: Read>(r: &mut R) -> std::io::Result<u32> {
    let mut buf4 = [0u8; 4];
    r.read_exact(&mut buf4)?;
    Ok(u32::from_le_bytes(buf4))
}

fn read_u64<R: Read>(r: &mut R) -> std::io::Result<u64> {
    let mut buf8 = [0u8; 8];
    r.read_exact(&mut buf8)?;
    Ok(u64::from_le_bytes(buf8))
}
