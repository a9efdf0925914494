//! Texture bundles - packed texture containers with random access streaming.
//!
//! This crate builds and reads `.xbt` texture bundles: a single file that
//! holds many named textures, each with one or more (animation) frames,
//! behind a fixed binary header.
//!
//! # Architecture
//!
//! The crate is split into three modules:
//!
//! - `codec`: Collaborators that know about pixels and bytes (decoders,
//!   block codecs, compression, content digests)
//! - `bundle`: The container format (writer, reader, streaming file, cache)
//! - `packer`: Build orchestration from a source directory to a bundle
//!
//! # Example
//!
//! ```rust,no_run
//! use std::io::Read;
//! use std::path::Path;
//!
//! use texbundle::{BundleManager, Packer, PackerConfig};
//!
//! // Build a bundle from a directory of images
//! let packer = Packer::new(PackerConfig {
//!     dedup: true,
//!     ..Default::default()
//! })?;
//! let stats = packer.build(Path::new("media"), Path::new("Textures.xbt"))?;
//! println!("{}", stats);
//!
//! // Stream one entry back out through the shared cache
//! let mut stream = BundleManager::global().open("Textures.xbt/ui/button.png")?;
//! let mut pixels = Vec::new();
//! stream.read_to_end(&mut pixels)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bundle;
pub mod codec;
pub mod packer;

// Re-export commonly used types
pub use bundle::{
    BundleError, BundleManager, BundleReader, BundleStream, BundleWriter, Entry, Frame,
    FrameFormat, PixelFormat,
};
pub use packer::{BuildStats, Packer, PackerConfig, TextureFamily};
