//! Bundle writer: accumulates entries and payload, then emits the bundle.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::error::BundleError;
use super::format::{Entry, MAX_PATH_LEN, canonical_path, header_size, write_header};

/// In-memory bundle builder.
///
/// Entries keep insertion order, which is also the header order and the
/// order payload offsets are assigned in. Payload bytes stay in memory
/// until [`finalize`](Self::finalize).
///
/// Usage:
/// ```ignore
/// let mut writer = BundleWriter::new();
/// writer.add_entry(Entry::new("ui/button.png"))?;
/// let packed = writer.append_payload(&bytes);
/// writer.entry_mut("ui/button.png").unwrap().frames.push(frame);
/// writer.finalize("skin.xbt", &[0])?;
/// ```
#[derive(Debug, Default)]
pub struct BundleWriter {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    payload: Vec<u8>,
}

impl BundleWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a skeleton entry. Fails if the path is taken or too long.
    pub fn add_entry(&mut self, mut entry: Entry) -> Result<(), BundleError> {
        entry.path = canonical_path(&entry.path);
        if entry.path.len() > MAX_PATH_LEN {
            return Err(BundleError::PathTooLong {
                len: entry.path.len(),
                path: entry.path,
                max: MAX_PATH_LEN,
            });
        }
        if self.index.contains_key(&entry.path) {
            return Err(BundleError::DuplicateEntry(entry.path));
        }
        self.index.insert(entry.path.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Replace an existing entry's metadata. Returns false if absent.
    pub fn update_entry(&mut self, mut entry: Entry) -> bool {
        entry.path = canonical_path(&entry.path);
        match self.index.get(&entry.path) {
            Some(&i) => {
                self.entries[i] = entry;
                true
            }
            None => false,
        }
    }

    /// Drop an entry, e.g. one whose source failed to decode.
    pub fn remove_entry(&mut self, path: &str) -> Option<Entry> {
        let i = self.index.remove(&canonical_path(path))?;
        let entry = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(entry)
    }

    pub fn has_entry(&self, path: &str) -> bool {
        self.index.contains_key(&canonical_path(path))
    }

    pub fn entry(&self, path: &str) -> Option<&Entry> {
        self.index_of(path).map(|i| &self.entries[i])
    }

    pub fn entry_mut(&mut self, path: &str) -> Option<&mut Entry> {
        self.index_of(path).map(|i| &mut self.entries[i])
    }

    pub fn index_of(&self, path: &str) -> Option<usize> {
        self.index.get(&canonical_path(path)).copied()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Append packed frame bytes; returns the number of bytes added.
    pub fn append_payload(&mut self, data: &[u8]) -> u64 {
        self.payload.extend_from_slice(data);
        data.len() as u64
    }

    pub fn payload_len(&self) -> u64 {
        self.payload.len() as u64
    }

    pub fn header_size(&self) -> u64 {
        header_size(&self.entries)
    }

    /// Assign payload offsets to every frame.
    ///
    /// `owners[i]` is the index of the entry whose bytes entry `i` shares
    /// (`i` itself for an owner). Owners get consecutive offsets after the
    /// header; duplicates copy their owner's offsets.
    fn assign_offsets(&mut self, owners: &[usize]) -> Result<(), BundleError> {
        if owners.len() != self.entries.len() {
            return Err(BundleError::InvalidOwnership(format!(
                "{} owners for {} entries",
                owners.len(),
                self.entries.len()
            )));
        }

        let mut next = self.header_size();
        for (i, &owner) in owners.iter().enumerate() {
            if owner == i {
                for frame in &mut self.entries[i].frames {
                    frame.offset = next;
                    next += frame.packed_size;
                }
                continue;
            }
            if owner > i || owners[owner] != owner {
                return Err(BundleError::InvalidOwnership(format!(
                    "entry {i} points at {owner}, which does not own its bytes"
                )));
            }
            let shared = self.entries[owner].frames.clone();
            if shared.len() != self.entries[i].frames.len() {
                return Err(BundleError::InvalidOwnership(format!(
                    "entry {i} has {} frames, owner {owner} has {}",
                    self.entries[i].frames.len(),
                    shared.len()
                )));
            }
            for (frame, source) in self.entries[i].frames.iter_mut().zip(&shared) {
                frame.offset = source.offset;
            }
        }

        let packed = next - self.header_size();
        if packed != self.payload_len() {
            return Err(BundleError::InvalidOwnership(format!(
                "owned frames cover {packed} bytes, payload holds {}",
                self.payload_len()
            )));
        }
        Ok(())
    }

    /// Assign offsets and write header then payload to `w`.
    pub fn write_to<W: Write>(&mut self, w: &mut W, owners: &[usize]) -> Result<u64, BundleError> {
        self.assign_offsets(owners)?;
        write_header(w, &self.entries)?;
        w.write_all(&self.payload)?;
        Ok(self.header_size() + self.payload_len())
    }

    /// Write the finished bundle to `path`.
    ///
    /// The bundle is written to a sibling temporary file and renamed into
    /// place, so a failed build never leaves a partial bundle at `path`.
    pub fn finalize<P: AsRef<Path>>(
        &mut self,
        path: P,
        owners: &[usize],
    ) -> Result<WriteStats, BundleError> {
        let path = path.as_ref();
        let partial = partial_path(path);

        let result = self.write_partial(&partial, owners);
        let total_bytes = match result {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(e);
            }
        };
        if let Err(e) = fs::rename(&partial, path) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }

        let shared = owners
            .iter()
            .enumerate()
            .filter(|&(i, &owner)| owner != i)
            .count();
        Ok(WriteStats {
            entry_count: self.entries.len() as u64,
            frame_count: self.entries.iter().map(|e| e.frames.len() as u64).sum(),
            shared_entries: shared as u64,
            header_bytes: self.header_size(),
            payload_bytes: self.payload_len(),
            total_bytes,
        })
    }

    fn write_partial(&mut self, partial: &Path, owners: &[usize]) -> Result<u64, BundleError> {
        let file = File::create(partial)?;
        let mut writer = BufWriter::new(file);
        let total = self.write_to(&mut writer, owners)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(total)
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

/// Summary of a written bundle.
#[derive(Debug, Clone)]
pub struct WriteStats {
    pub entry_count: u64,
    pub frame_count: u64,
    /// Entries whose frames point at another entry's bytes.
    pub shared_entries: u64,
    pub header_bytes: u64,
    pub payload_bytes: u64,
    pub total_bytes: u64,
}

impl std::fmt::Display for WriteStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} entries ({} shared), {} frames, {} header + {} payload = {} bytes",
            self.entry_count,
            self.shared_entries,
            self.frame_count,
            self.header_bytes,
            self.payload_bytes,
            self.total_bytes
        )
    }
}
