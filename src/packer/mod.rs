//! Bundle builder: walks a source tree and packs every supported image.
//!
//! A build runs in three passes over a [`BundleWriter`]:
//!
//! 1. One skeleton entry per supported source. Family variants
//!    (`button.dxt.png`) stand in for their canonical path (`button.png`).
//! 2. Each entry is decoded, encoded by the block codec and packed with the
//!    byte compressor. With dedup enabled, an entry whose decoded pixels
//!    match an earlier entry shares that entry's frames instead.
//! 3. The writer assigns offsets and emits the bundle.
//!
//! Assets that fail to decode or encode are skipped with a warning; only
//! failing to walk the input or to write the output aborts the build.

mod config;
mod substitution;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::bundle::{BundleError, BundleWriter, Entry, Frame, canonical_path};
use crate::codec::{
    ArgbCodec, BlockCodec, ByteCompressor, CodecError, Decoder, ImageDecoder, Lz4Compressor,
    content_digest, pack_bytes,
};

pub use config::{ConfigError, PackerConfig, TextureFamily};
pub use substitution::{SubstitutionTable, supersedes};

/// Fatal build errors.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to walk input directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Failed to write bundle: {0}")]
    Bundle(#[from] BundleError),
}

/// Why a single asset was left out of the bundle.
#[derive(Debug, thiserror::Error)]
pub enum SkipReason {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("Source produced no frames")]
    NoFrames,
    #[error("{count} frames exceeds the limit of {max}")]
    TooManyFrames { count: usize, max: usize },
    #[error("Frame {frame}: encoded {actual} bytes, format needs {expected}")]
    EncodedSize {
        frame: usize,
        expected: u64,
        actual: u64,
    },
    #[error("Frame {frame}: unknown format tag {bits:#x}")]
    UnknownFormat { frame: usize, bits: u32 },
}

/// Outcome of encoding one entry.
enum Encoded {
    /// The entry owns newly appended payload.
    Owner { frames: usize, raw_bytes: u64 },
    /// The entry shares the frames of the named entry.
    Duplicate { owner: String, frames: usize },
}

/// Builds bundles from source directories.
///
/// Usage:
/// ```ignore
/// let packer = Packer::new(PackerConfig { dedup: true, ..Default::default() })?;
/// let stats = packer.build(Path::new("media"), Path::new("Textures.xbt"))?;
/// println!("{}", stats);
/// ```
pub struct Packer {
    config: PackerConfig,
    substitutions: SubstitutionTable,
    decoder: Box<dyn Decoder>,
    codec: Box<dyn BlockCodec>,
    compressor: Box<dyn ByteCompressor>,
}

impl Packer {
    /// Create a packer with the default image decoder, A8R8G8B8 codec and
    /// LZ4 compressor.
    pub fn new(config: PackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            substitutions: SubstitutionTable::new(&config.families),
            config,
            decoder: Box::new(ImageDecoder),
            codec: Box::new(ArgbCodec),
            compressor: Box::new(Lz4Compressor),
        })
    }

    pub fn with_decoder(mut self, decoder: Box<dyn Decoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_codec(mut self, codec: Box<dyn BlockCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_compressor(mut self, compressor: Box<dyn ByteCompressor>) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn config(&self) -> &PackerConfig {
        &self.config
    }

    /// List every file under `dir` as `(relative path, source path)`,
    /// sorted by name.
    pub fn collect_sources(&self, dir: &Path) -> Result<Vec<(String, PathBuf)>, BuildError> {
        let mut sources = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(dir) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            sources.push((relative, entry.into_path()));
        }
        Ok(sources)
    }

    /// Pack every supported file under `input` into the bundle `output`.
    pub fn build(&self, input: &Path, output: &Path) -> Result<BuildStats, BuildError> {
        let sources = self.collect_sources(input)?;
        log::info!("Found {} files under {}", sources.len(), input.display());
        self.pack_sources(&sources, output)
    }

    /// Pack the given `(relative path, source path)` pairs into `output`.
    pub fn pack_sources(
        &self,
        sources: &[(String, PathBuf)],
        output: &Path,
    ) -> Result<BuildStats, BuildError> {
        let mut stats = BuildStats::default();
        let mut writer = BundleWriter::new();
        self.add_skeletons(&mut writer, sources, &mut stats);

        let paths: Vec<String> = writer.entries().iter().map(|e| e.path.clone()).collect();
        let mut digests: HashMap<u128, String> = HashMap::new();
        let mut shared_with: HashMap<String, String> = HashMap::new();

        for path in paths {
            match self.encode_entry(&mut writer, &path, &mut digests) {
                Ok(Encoded::Owner { frames, raw_bytes }) => {
                    stats.frames += frames as u64;
                    stats.raw_bytes += raw_bytes;
                }
                Ok(Encoded::Duplicate { owner, frames }) => {
                    log::debug!("{} duplicates {}", path, owner);
                    stats.frames += frames as u64;
                    stats.duplicates += 1;
                    shared_with.insert(path, owner);
                }
                Err(reason) => {
                    log::warn!("Skipping {}: {}", path, reason);
                    writer.remove_entry(&path);
                    stats.skipped += 1;
                }
            }
        }

        let owners: Vec<usize> = writer
            .entries()
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                shared_with
                    .get(&entry.path)
                    .and_then(|owner| writer.index_of(owner))
                    .unwrap_or(i)
            })
            .collect();

        let written = writer.finalize(output, &owners)?;
        stats.entries = written.entry_count;
        stats.payload_bytes = written.payload_bytes;
        stats.bundle_bytes = written.total_bytes;

        log::info!("Wrote {}: {}", output.display(), stats);
        Ok(stats)
    }

    /// Create one skeleton entry per supported source, resolving family
    /// variants onto their canonical path.
    fn add_skeletons(
        &self,
        writer: &mut BundleWriter,
        sources: &[(String, PathBuf)],
        stats: &mut BuildStats,
    ) {
        for (relative, source) in sources {
            if !self.decoder.supports(source) {
                log::debug!("Ignoring unsupported file {}", relative);
                continue;
            }

            let (path, priority) = match self.substitutions.classify(relative) {
                Some((canonical, family)) => (canonical, Some(family.priority)),
                None => (canonical_path(relative), None),
            };

            if let Some(existing) = writer.entry(&path) {
                if supersedes(priority, existing.priority) {
                    let mut entry = existing.clone();
                    entry.priority = priority;
                    entry.source = Some(source.clone());
                    writer.update_entry(entry);
                }
                continue;
            }

            let mut entry = Entry::new(&path);
            entry.priority = priority;
            entry.source = Some(source.clone());
            if let Err(e) = writer.add_entry(entry) {
                log::warn!("Skipping {}: {}", relative, e);
                stats.skipped += 1;
            }
        }
    }

    /// Decode, encode and pack one entry's frames.
    fn encode_entry(
        &self,
        writer: &mut BundleWriter,
        path: &str,
        digests: &mut HashMap<u128, String>,
    ) -> Result<Encoded, SkipReason> {
        let Some(mut entry) = writer.entry(path).cloned() else {
            return Err(SkipReason::NoFrames);
        };
        let source = entry
            .source
            .clone()
            .unwrap_or_else(|| PathBuf::from(&entry.path));

        let image = self.decoder.decode(&source)?;
        if image.frames.is_empty() {
            return Err(SkipReason::NoFrames);
        }
        if image.frames.len() > self.config.max_animation_frames {
            return Err(SkipReason::TooManyFrames {
                count: image.frames.len(),
                max: self.config.max_animation_frames,
            });
        }
        entry.loop_count = image.loop_count;

        let digest = self.config.dedup.then(|| content_digest(&image.frames));
        if let Some(owner) = digest.and_then(|d| digests.get(&d)) {
            if let Some(shared) = writer.entry(owner) {
                // Payload is shared, timing stays per entry.
                entry.frames = shared
                    .frames
                    .iter()
                    .zip(&image.frames)
                    .map(|(frame, raw)| Frame {
                        duration: raw.duration,
                        ..*frame
                    })
                    .collect();
                let frames = entry.frames.len();
                writer.update_entry(entry);
                return Ok(Encoded::Duplicate {
                    owner: owner.clone(),
                    frames,
                });
            }
        }

        // Encode every frame before appending anything, so a failure
        // leaves no orphaned payload behind.
        let mut encoded = Vec::with_capacity(image.frames.len());
        for (i, raw) in image.frames.iter().enumerate() {
            let frame = self.codec.encode(raw)?;
            let Some(format) = frame.format.base() else {
                return Err(SkipReason::UnknownFormat {
                    frame: i,
                    bits: frame.format.bits(),
                });
            };
            let expected = format.data_size(raw.width, raw.height);
            if frame.data.len() as u64 != expected {
                return Err(SkipReason::EncodedSize {
                    frame: i,
                    expected,
                    actual: frame.data.len() as u64,
                });
            }
            encoded.push(frame);
        }

        let compressor = self.config.compress.then_some(self.compressor.as_ref());
        let mut raw_bytes = 0;
        entry.frames.clear();
        for (raw, frame) in image.frames.iter().zip(&encoded) {
            let packed = pack_bytes(compressor, &frame.data);
            let packed_size = writer.append_payload(&packed);
            raw_bytes += frame.data.len() as u64;
            entry.frames.push(Frame {
                width: raw.width,
                height: raw.height,
                format: frame.format,
                packed_size,
                unpacked_size: frame.data.len() as u64,
                duration: raw.duration,
                offset: 0,
            });
        }

        let frames = entry.frames.len();
        writer.update_entry(entry);
        if let Some(d) = digest {
            digests.insert(d, path.to_string());
        }
        Ok(Encoded::Owner { frames, raw_bytes })
    }
}

/// Summary of a finished build.
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    /// Entries written.
    pub entries: u64,
    /// Frames across all entries, shared ones included.
    pub frames: u64,
    /// Sources left out because they failed to decode or encode.
    pub skipped: u64,
    /// Entries sharing another entry's payload.
    pub duplicates: u64,
    /// Encoded bytes before compression, owners only.
    pub raw_bytes: u64,
    /// Payload bytes stored.
    pub payload_bytes: u64,
    /// Total bundle size.
    pub bundle_bytes: u64,
}

impl std::fmt::Display for BuildStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} entries, {} frames, {} duplicates, {} skipped, {} -> {} payload bytes, {} bytes total",
            self.entries,
            self.frames,
            self.duplicates,
            self.skipped,
            self.raw_bytes,
            self.payload_bytes,
            self.bundle_bytes
        )
    }
}

#[cfg(test)]
mod tests;
