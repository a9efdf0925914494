//! Bundle reader: parses the header and loads frame payloads on demand.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;

use super::error::BundleError;
use super::format::{Entry, Frame, canonical_path, read_header};

/// An open bundle.
///
/// Opening parses the header and nothing else. Frame payloads are only
/// touched by [`load`](Self::load), which performs one seek and one read
/// under the handle lock, so a reader can be shared behind an `Arc`.
///
/// Usage:
/// ```ignore
/// let reader = BundleReader::open("skin.xbt")?;
/// let entry = reader.entry("ui/button.png").unwrap();
/// let mut packed = Vec::new();
/// reader.load(&entry.frames[0], &mut packed)?;
/// ```
#[derive(Debug)]
pub struct BundleReader {
    path: PathBuf,
    file: Mutex<Option<BufReader<File>>>,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    modified: SystemTime,
}

impl BundleReader {
    /// Open a bundle and decode its header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BundleError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let metadata = file.metadata()?;
        let modified = metadata.modified()?;
        let file_len = metadata.len();

        let mut reader = BufReader::new(file);
        let entries = read_header(&mut reader)?;

        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            validate_frames(entry, file_len)?;
            if index.insert(canonical_path(&entry.path), i).is_some() {
                return Err(BundleError::CorruptHeader(format!(
                    "duplicate entry {:?}",
                    entry.path
                )));
            }
        }

        log::debug!("Opened bundle {} ({} entries)", path.display(), entries.len());

        Ok(Self {
            path,
            file: Mutex::new(Some(reader)),
            entries,
            index,
            modified,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries in header order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Look up an entry; the match is case-insensitive.
    pub fn entry(&self, path: &str) -> Option<&Entry> {
        self.index
            .get(&canonical_path(path))
            .map(|&i| &self.entries[i])
    }

    /// Read a frame's packed bytes into `buf`, replacing its contents.
    pub fn load(&self, frame: &Frame, buf: &mut Vec<u8>) -> Result<(), BundleError> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(BundleError::Closed)?;

        buf.clear();
        buf.resize(frame.packed_size as usize, 0);
        file.seek(SeekFrom::Start(frame.offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    /// Modification time of the bundle file when it was opened.
    pub fn last_modified(&self) -> SystemTime {
        self.modified
    }

    /// Release the file handle. Later loads fail with [`BundleError::Closed`].
    pub fn close(&self) {
        self.file.lock().take();
    }

    pub fn is_open(&self) -> bool {
        self.file.lock().is_some()
    }
}

/// Reject frame records that cannot describe bytes in this file.
fn validate_frames(entry: &Entry, file_len: u64) -> Result<(), BundleError> {
    for (i, frame) in entry.frames.iter().enumerate() {
        if frame.packed_size > frame.unpacked_size {
            return Err(BundleError::CorruptHeader(format!(
                "{:?} frame {i}: packed size {} exceeds unpacked size {}",
                entry.path, frame.packed_size, frame.unpacked_size
            )));
        }
        let end = frame.offset.checked_add(frame.packed_size);
        if end.is_none_or(|end| end > file_len) {
            return Err(BundleError::CorruptHeader(format!(
                "{:?} frame {i}: payload at {}+{} lies past end of file ({file_len} bytes)",
                entry.path, frame.offset, frame.packed_size
            )));
        }
    }
    Ok(())
}
