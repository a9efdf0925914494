//! Random access over one bundle entry as a continuous byte stream.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use super::error::BundleError;
use super::format::Entry;
use super::reader::BundleReader;
use crate::codec::{ByteCompressor, Lz4Compressor, unpack_bytes};

/// Streams the unpacked bytes of an entry's frames, back to back.
///
/// Frames are unpacked on first touch and kept for the lifetime of the
/// stream, so each frame is unpacked at most once and memory use is bounded
/// by the entry's total unpacked size. Any load or unpack failure closes the
/// stream.
///
/// Usage:
/// ```ignore
/// let reader = Arc::new(BundleReader::open("skin.xbt")?);
/// let entry = reader.entry("ui/button.png").unwrap().clone();
/// let mut stream = BundleStream::new(reader, entry);
/// let mut pixels = Vec::new();
/// stream.read_to_end(&mut pixels)?;
/// ```
pub struct BundleStream {
    reader: Arc<BundleReader>,
    entry: Entry,
    compressor: Box<dyn ByteCompressor>,
    /// Unpacked frames, filled on first touch.
    cache: Vec<Option<Vec<u8>>>,
    /// Logical start of each frame.
    starts: Vec<u64>,
    length: u64,
    frame_index: usize,
    frame_pos: u64,
    position: u64,
    closed: bool,
    frames_unpacked: usize,
    /// Reused buffer for packed bytes.
    load_buffer: Vec<u8>,
}

impl BundleStream {
    /// Stream `entry` from `reader`, unpacking with LZ4.
    pub fn new(reader: Arc<BundleReader>, entry: Entry) -> Self {
        Self::with_compressor(reader, entry, Box::new(Lz4Compressor))
    }

    pub fn with_compressor(
        reader: Arc<BundleReader>,
        entry: Entry,
        compressor: Box<dyn ByteCompressor>,
    ) -> Self {
        let mut starts = Vec::with_capacity(entry.frames.len());
        let mut length = 0;
        for frame in &entry.frames {
            starts.push(length);
            length += frame.unpacked_size;
        }

        Self {
            reader,
            cache: vec![None; entry.frames.len()],
            entry,
            compressor,
            starts,
            length,
            frame_index: 0,
            frame_pos: 0,
            position: 0,
            closed: false,
            frames_unpacked: 0,
            load_buffer: Vec::new(),
        }
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Total unpacked length of the entry.
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of frames unpacked so far.
    pub fn frames_unpacked(&self) -> usize {
        self.frames_unpacked
    }

    fn frame_len(&self, index: usize) -> u64 {
        self.entry.frames[index].unpacked_size
    }

    fn check_open(&self) -> io::Result<()> {
        if self.closed {
            return Err(BundleError::Closed.into());
        }
        Ok(())
    }

    /// Unpack frame `index` into the cache unless it is already there.
    fn ensure_frame(&mut self, index: usize) -> io::Result<()> {
        if self.cache[index].is_some() {
            return Ok(());
        }
        match self.unpack_frame(index) {
            Ok(data) => {
                self.cache[index] = Some(data);
                self.frames_unpacked += 1;
                Ok(())
            }
            Err(e) => {
                log::warn!(
                    "Closing stream for {:?}: frame {} failed: {}",
                    self.entry.path,
                    index,
                    e
                );
                self.closed = true;
                Err(e.into())
            }
        }
    }

    fn unpack_frame(&mut self, index: usize) -> Result<Vec<u8>, BundleError> {
        let frame = self.entry.frames[index];
        self.reader.load(&frame, &mut self.load_buffer)?;
        Ok(unpack_bytes(
            self.compressor.as_ref(),
            &self.load_buffer,
            frame.unpacked_size,
        )?)
    }

    /// Step past fully consumed frames while more frames remain.
    fn advance_frames(&mut self) {
        while self.frame_index + 1 < self.entry.frames.len()
            && self.frame_pos >= self.frame_len(self.frame_index)
        {
            self.frame_index += 1;
            self.frame_pos = 0;
        }
    }

    /// Point the cursor at `target` without unpacking anything.
    fn relocate(&mut self, target: u64) {
        let index = self.starts.partition_point(|&start| start <= target) - 1;
        self.frame_index = index;
        self.frame_pos = target - self.starts[index];
        self.position = target;
    }

    /// Walk forward to `target`, unpacking every frame left behind.
    fn walk_to(&mut self, target: u64) -> io::Result<()> {
        while target >= self.starts[self.frame_index] + self.frame_len(self.frame_index) {
            self.ensure_frame(self.frame_index)?;
            self.frame_index += 1;
            self.frame_pos = 0;
        }
        self.frame_pos = target - self.starts[self.frame_index];
        self.position = target;
        Ok(())
    }
}

impl Read for BundleStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_open()?;

        let remaining = self.length - self.position;
        let wanted = (buf.len() as u64).min(remaining) as usize;
        let mut done = 0;

        while done < wanted {
            self.advance_frames();
            let index = self.frame_index;
            self.ensure_frame(index)?;

            let start = self.frame_pos as usize;
            let available = self.frame_len(index) as usize - start;
            let take = available.min(wanted - done);
            if let Some(data) = &self.cache[index] {
                buf[done..done + take].copy_from_slice(&data[start..start + take]);
            }

            done += take;
            self.frame_pos += take as u64;
            self.position += take as u64;
        }
        self.advance_frames();

        Ok(done)
    }
}

impl Seek for BundleStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.check_open()?;

        let target = match pos {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => self.length as i128 + delta as i128,
        };
        if target == self.position as i128 {
            return Ok(self.position);
        }
        if target < 0 || target >= self.length as i128 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Seek to {} outside stream of {} bytes",
                    target, self.length
                ),
            ));
        }

        let target = target as u64;
        if target < self.position {
            self.relocate(target);
        } else {
            self.walk_to(target)?;
        }
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{BundleWriter, Frame};
    use crate::codec::{CodecError, pack_bytes};
    use proptest::prelude::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Compressible frame contents where neighbouring bytes always differ.
    fn frame_bytes(index: usize, size: usize) -> Vec<u8> {
        (0..size)
            .map(|i| {
                if i % 2 == 0 {
                    100 + index as u8
                } else {
                    (i / 32) as u8
                }
            })
            .collect()
    }

    fn write_entry(path: &Path, sizes: &[usize]) -> Vec<u8> {
        let mut writer = BundleWriter::new();
        let mut entry = Entry::new("stream.bin");
        let mut expected = Vec::new();
        let mut payload = Vec::new();

        for (i, &size) in sizes.iter().enumerate() {
            let raw = frame_bytes(i, size);
            let packed = pack_bytes(Some(&Lz4Compressor), &raw);
            entry.frames.push(Frame {
                width: size as u32,
                height: 1,
                packed_size: packed.len() as u64,
                unpacked_size: raw.len() as u64,
                ..Default::default()
            });
            payload.extend_from_slice(&packed);
            expected.extend_from_slice(&raw);
        }

        writer.add_entry(entry).unwrap();
        writer.append_payload(&payload);
        writer.finalize(path, &[0]).unwrap();
        expected
    }

    fn open_stream(path: &Path) -> BundleStream {
        let reader = Arc::new(BundleReader::open(path).unwrap());
        let entry = reader.entry("stream.bin").unwrap().clone();
        BundleStream::new(reader, entry)
    }

    struct Counting {
        calls: Arc<AtomicUsize>,
    }

    impl ByteCompressor for Counting {
        fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
            Lz4Compressor.compress(input)
        }

        fn decompress(&self, input: &[u8], len: usize) -> Result<Vec<u8>, CodecError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Lz4Compressor.decompress(input, len)
        }
    }

    struct Broken;

    impl ByteCompressor for Broken {
        fn compress(&self, _: &[u8]) -> Result<Vec<u8>, CodecError> {
            Err(CodecError::Compress("broken".into()))
        }

        fn decompress(&self, _: &[u8], _: usize) -> Result<Vec<u8>, CodecError> {
            Err(CodecError::Decompress("broken".into()))
        }
    }

    #[test]
    fn test_sequential_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seq.xbt");
        let expected = write_entry(&path, &[300, 1000, 7, 512]);

        let mut stream = open_stream(&path);
        assert_eq!(stream.len(), expected.len() as u64);

        let mut out = Vec::new();
        let mut chunk = [0u8; 97];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(out, expected);
        assert_eq!(stream.position(), stream.len());
        assert_eq!(stream.stream_position().unwrap(), stream.len());
    }

    #[test]
    fn test_seek_then_read_matches_suffix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seek.xbt");
        let expected = write_entry(&path, &[40, 0, 25, 60]);

        for k in 0..expected.len() {
            let mut stream = open_stream(&path);
            stream.seek(SeekFrom::Start(k as u64)).unwrap();
            let mut out = Vec::new();
            stream.read_to_end(&mut out).unwrap();
            assert_eq!(out, &expected[k..], "suffix from {}", k);
        }
    }

    #[test]
    fn test_backward_seek_reuses_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.xbt");
        let expected = write_entry(&path, &[500, 600, 700]);

        let calls = Arc::new(AtomicUsize::new(0));
        let reader = Arc::new(BundleReader::open(&path).unwrap());
        let entry = reader.entry("stream.bin").unwrap().clone();
        let mut stream = BundleStream::with_compressor(
            reader,
            entry,
            Box::new(Counting {
                calls: calls.clone(),
            }),
        );

        let mut all = Vec::new();
        stream.read_to_end(&mut all).unwrap();
        assert_eq!(all, expected);
        assert_eq!(stream.frames_unpacked(), 3);

        for &k in &[1700usize, 0, 650, 1, 1299, 20] {
            stream.seek(SeekFrom::Start(k as u64)).unwrap();
            let mut buf = vec![0u8; 50.min(expected.len() - k)];
            stream.read_exact(&mut buf).unwrap();
            assert_eq!(buf, &expected[k..k + buf.len()]);
        }
        assert_eq!(stream.frames_unpacked(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_forward_seek_unpacks_skipped_frames() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("skip.xbt");
        write_entry(&path, &[100, 100, 100]);

        let mut stream = open_stream(&path);
        stream.seek(SeekFrom::Start(250)).unwrap();
        assert_eq!(stream.frames_unpacked(), 2);

        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte).unwrap();
        assert_eq!(stream.frames_unpacked(), 3);
    }

    #[test]
    fn test_seek_bounds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bounds.xbt");
        write_entry(&path, &[10, 10]);

        let mut stream = open_stream(&path);
        assert_eq!(stream.seek(SeekFrom::End(-1)).unwrap(), 19);
        assert!(stream.seek(SeekFrom::Start(20)).is_err());
        assert!(stream.seek(SeekFrom::Current(-30)).is_err());
        assert_eq!(stream.seek(SeekFrom::Current(-4)).unwrap(), 15);
        assert!(!stream.is_closed());
    }

    #[test]
    fn test_unpack_failure_closes_stream() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.xbt");
        write_entry(&path, &[1024]);

        let reader = Arc::new(BundleReader::open(&path).unwrap());
        let entry = reader.entry("stream.bin").unwrap().clone();
        assert!(entry.frames[0].is_packed());
        let mut stream = BundleStream::with_compressor(reader, entry, Box::new(Broken));

        let mut buf = [0u8; 16];
        assert!(stream.read(&mut buf).is_err());
        assert!(stream.is_closed());
        assert!(stream.read(&mut buf).is_err());
        assert!(stream.seek(SeekFrom::Start(0)).is_err());
    }

    #[test]
    fn test_closed_reader_closes_stream() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("closed.xbt");
        write_entry(&path, &[64]);

        let reader = Arc::new(BundleReader::open(&path).unwrap());
        let entry = reader.entry("stream.bin").unwrap().clone();
        let mut stream = BundleStream::new(reader.clone(), entry);
        reader.close();

        let mut buf = [0u8; 8];
        assert!(stream.read(&mut buf).is_err());
        assert!(stream.is_closed());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_seek_read_equals_skip(
            sizes in prop::collection::vec(0usize..400, 1..6),
            pick in any::<prop::sample::Index>(),
        ) {
            let dir = tempdir().unwrap();
            let path = dir.path().join("prop.xbt");
            let expected = write_entry(&path, &sizes);
            prop_assume!(!expected.is_empty());

            let k = pick.index(expected.len());
            let mut stream = open_stream(&path);
            stream.seek(SeekFrom::Start(k as u64)).unwrap();
            let mut out = vec![0u8; expected.len() - k];
            stream.read_exact(&mut out).unwrap();
            prop_assert_eq!(&out[..], &expected[k..]);
        }
    }
}
