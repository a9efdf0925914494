//! Raw and encoded frame buffers, plus the default block codec.

use super::{BlockCodec, CodecError};
use crate::bundle::{FrameFormat, PixelFormat, Swizzle};

/// One decoded frame in RGBA8 order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub has_alpha: bool,
    /// Display time in milliseconds (0 for stills).
    pub duration: u32,
}

impl RawFrame {
    /// Wrap RGBA8 pixels, detecting whether any pixel is translucent.
    pub fn rgba(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        let has_alpha = pixels.chunks_exact(4).any(|px| px[3] != 0xFF);
        Self {
            width,
            height,
            pixels,
            has_alpha,
            duration: 0,
        }
    }

    pub fn with_duration(mut self, duration: u32) -> Self {
        self.duration = duration;
        self
    }
}

/// Output of a [`Decoder`](super::Decoder): frames in animation order.
#[derive(Debug, Clone, Default)]
pub struct DecodedImage {
    pub frames: Vec<RawFrame>,
    /// 0 = loop forever.
    pub loop_count: u32,
}

/// Output of a [`BlockCodec`].
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub data: Vec<u8>,
    pub format: FrameFormat,
    /// Codec specific error metric, lower is better.
    pub quality: Option<f32>,
}

/// Stores frames as uncompressed A8R8G8B8 (BGRA byte order).
///
/// Frames without any translucent pixel are tagged opaque so the renderer
/// can skip blending.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgbCodec;

impl BlockCodec for ArgbCodec {
    fn encode(&self, frame: &RawFrame) -> Result<EncodedFrame, CodecError> {
        let expected = PixelFormat::Rgba8.data_size(frame.width, frame.height);
        if frame.pixels.len() as u64 != expected {
            return Err(CodecError::Unsupported(format!(
                "{}x{} frame has {} bytes, expected {}",
                frame.width,
                frame.height,
                frame.pixels.len(),
                expected
            )));
        }

        let mut data = Vec::with_capacity(frame.pixels.len());
        for px in frame.pixels.chunks_exact(4) {
            data.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
        }

        Ok(EncodedFrame {
            data,
            format: FrameFormat::new(PixelFormat::A8R8G8B8, !frame.has_alpha, Swizzle::None),
            quality: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argb_swaps_channels() {
        let frame = RawFrame::rgba(1, 2, vec![1, 2, 3, 255, 4, 5, 6, 128]);
        assert!(frame.has_alpha);

        let encoded = ArgbCodec.encode(&frame).unwrap();
        assert_eq!(encoded.data, vec![3, 2, 1, 255, 6, 5, 4, 128]);
        assert_eq!(encoded.format.base(), Some(PixelFormat::A8R8G8B8));
        assert!(!encoded.format.is_opaque());
    }

    #[test]
    fn test_argb_opaque_flag() {
        let frame = RawFrame::rgba(2, 2, vec![255; 16]);
        assert!(!frame.has_alpha);
        assert!(ArgbCodec.encode(&frame).unwrap().format.is_opaque());
    }

    #[test]
    fn test_argb_rejects_short_buffer() {
        let frame = RawFrame::rgba(4, 4, vec![0; 10]);
        assert!(ArgbCodec.encode(&frame).is_err());
    }
}
