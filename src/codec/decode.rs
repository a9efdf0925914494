//! Source image decoding backed by the `image` crate.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::AnimationDecoder;
use image::codecs::gif::GifDecoder;

use super::{CodecError, DecodedImage, Decoder, RawFrame};

const STILL_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Decodes PNG and JPEG stills and animated GIFs to RGBA8.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl ImageDecoder {
    fn decode_still(&self, path: &Path) -> Result<DecodedImage, CodecError> {
        let img = image::open(path).map_err(|e| decode_error(path, e))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        Ok(DecodedImage {
            frames: vec![RawFrame::rgba(width, height, rgba.into_raw())],
            loop_count: 0,
        })
    }

    fn decode_gif(&self, path: &Path) -> Result<DecodedImage, CodecError> {
        let file = File::open(path).map_err(|e| decode_error(path, e))?;
        let decoder = GifDecoder::new(BufReader::new(file)).map_err(|e| decode_error(path, e))?;

        let mut frames = Vec::new();
        for frame in decoder.into_frames() {
            let frame = frame.map_err(|e| decode_error(path, e))?;
            let (numer, denom) = frame.delay().numer_denom_ms();
            let duration = if denom == 0 { 0 } else { numer / denom };
            let buffer = frame.into_buffer();
            let (width, height) = buffer.dimensions();
            frames.push(RawFrame::rgba(width, height, buffer.into_raw()).with_duration(duration));
        }

        Ok(DecodedImage {
            frames,
            loop_count: 0,
        })
    }
}

impl Decoder for ImageDecoder {
    fn supports(&self, path: &Path) -> bool {
        extension(path).is_some_and(|ext| ext == "gif" || STILL_EXTENSIONS.contains(&ext.as_str()))
    }

    fn decode(&self, path: &Path) -> Result<DecodedImage, CodecError> {
        match extension(path).as_deref() {
            Some("gif") => self.decode_gif(path),
            _ => self.decode_still(path),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn decode_error(path: &Path, err: impl std::fmt::Display) -> CodecError {
    CodecError::Decode {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::tempdir;

    #[test]
    fn test_supports_extensions() {
        assert!(ImageDecoder.supports(Path::new("a/b.PNG")));
        assert!(ImageDecoder.supports(Path::new("b.jpeg")));
        assert!(ImageDecoder.supports(Path::new("b.gif")));
        assert!(!ImageDecoder.supports(Path::new("b.txt")));
        assert!(!ImageDecoder.supports(Path::new("noext")));
    }

    #[test]
    fn test_decode_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("red.png");
        RgbaImage::from_pixel(3, 2, Rgba([255, 0, 0, 255]))
            .save(&path)
            .unwrap();

        let decoded = ImageDecoder.decode(&path).unwrap();
        assert_eq!(decoded.frames.len(), 1);
        let frame = &decoded.frames[0];
        assert_eq!((frame.width, frame.height), (3, 2));
        assert_eq!(frame.pixels.len(), 3 * 2 * 4);
        assert!(!frame.has_alpha);
        assert_eq!(&frame.pixels[..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        assert!(matches!(
            ImageDecoder.decode(&path),
            Err(CodecError::Decode { .. })
        ));
    }
}
