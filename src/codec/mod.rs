//! Collaborators of the bundle format: pixel decoding, block encoding,
//! byte compression and content digests.
//!
//! The bundle itself only stores opaque frame payloads. Everything that
//! knows about pixels sits behind the traits in this module so a build can
//! swap in other decoders or block codecs.

mod decode;
mod lz4;
mod pixels;

use std::borrow::Cow;
use std::path::Path;

use xxhash_rust::xxh3::Xxh3;

pub use decode::ImageDecoder;
pub use lz4::Lz4Compressor;
pub use pixels::{ArgbCodec, DecodedImage, EncodedFrame, RawFrame};

/// Errors from the codec collaborators.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("Unsupported pixel layout: {0}")]
    Unsupported(String),
    #[error("Compression failed: {0}")]
    Compress(String),
    #[error("Decompression failed: {0}")]
    Decompress(String),
    #[error("Unpacked {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
}

/// General purpose byte compressor applied to every stored frame.
pub trait ByteCompressor: Send + Sync {
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Inverse of [`compress`](Self::compress); the unpacked length is
    /// known from the frame record.
    fn decompress(&self, input: &[u8], unpacked_len: usize) -> Result<Vec<u8>, CodecError>;
}

/// Turns decoded pixels into the representation stored in a frame.
pub trait BlockCodec: Send + Sync {
    fn encode(&self, frame: &RawFrame) -> Result<EncodedFrame, CodecError>;
}

/// Decodes a source asset into raw pixel frames.
pub trait Decoder: Send + Sync {
    fn supports(&self, path: &Path) -> bool;

    fn decode(&self, path: &Path) -> Result<DecodedImage, CodecError>;
}

/// Content digest of a decoded asset.
///
/// Covers every frame's dimensions and pixels in order, so identical byte
/// strings with different shapes never compare equal. Frame durations are
/// not part of the digest.
pub fn content_digest(frames: &[RawFrame]) -> u128 {
    let mut hasher = Xxh3::new();
    for frame in frames {
        hasher.update(&frame.width.to_le_bytes());
        hasher.update(&frame.height.to_le_bytes());
        hasher.update(&frame.pixels);
    }
    hasher.digest128()
}

/// Compress `input` if that makes it strictly smaller, else keep it raw.
///
/// The returned length is the frame's packed size and never exceeds the
/// input length.
pub fn pack_bytes<'a>(compressor: Option<&dyn ByteCompressor>, input: &'a [u8]) -> Cow<'a, [u8]> {
    let Some(compressor) = compressor else {
        return Cow::Borrowed(input);
    };
    match compressor.compress(input) {
        Ok(packed) if packed.len() < input.len() => Cow::Owned(packed),
        Ok(_) => Cow::Borrowed(input),
        Err(e) => {
            log::debug!("Storing frame uncompressed: {}", e);
            Cow::Borrowed(input)
        }
    }
}

/// Recover a frame's unpacked bytes from its stored bytes.
pub fn unpack_bytes(
    compressor: &dyn ByteCompressor,
    packed: &[u8],
    unpacked_len: u64,
) -> Result<Vec<u8>, CodecError> {
    let unpacked = if packed.len() as u64 == unpacked_len {
        packed.to_vec()
    } else {
        compressor.decompress(packed, unpacked_len as usize)?
    };
    if unpacked.len() as u64 != unpacked_len {
        return Err(CodecError::SizeMismatch {
            expected: unpacked_len,
            actual: unpacked.len() as u64,
        });
    }
    Ok(unpacked)
}
