//! LZ4 block compression for frame payloads.

use super::{ByteCompressor, CodecError};

/// LZ4 block format without a size prefix.
///
/// The unpacked length is stored in each frame record, so the payload
/// carries only the compressed block.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Compressor;

impl ByteCompressor for Lz4Compressor {
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(lz4_flex::block::compress(input))
    }

    fn decompress(&self, input: &[u8], unpacked_len: usize) -> Result<Vec<u8>, CodecError> {
        lz4_flex::block::decompress(input, unpacked_len)
            .map_err(|e| CodecError::Decompress(e.to_string()))
    }
}
