//! Configuration types for bundle builds.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default cap on frames per animated source.
fn default_max_animation_frames() -> usize {
    1024
}

fn default_compress() -> bool {
    true
}

/// A family of pre-compressed texture variants.
///
/// A source named `<stem>.<family>.<ext>` stands in for `<stem>.<ext>`.
/// When several enabled families offer a variant for the same path, the
/// higher priority wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureFamily {
    pub name: String,
    pub priority: u32,
}

impl TextureFamily {
    pub fn new(name: &str, priority: u32) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            priority,
        }
    }

    /// Families known to the builder, with their fixed priorities.
    pub fn builtin() -> Vec<TextureFamily> {
        vec![
            TextureFamily::new("dxt", 10),
            TextureFamily::new("etc", 20),
            TextureFamily::new("astc", 30),
        ]
    }

    /// Look up a builtin family by name (any case).
    pub fn find_builtin(name: &str) -> Option<TextureFamily> {
        let name = name.to_ascii_lowercase();
        Self::builtin().into_iter().find(|f| f.name == name)
    }
}

/// Top-level build configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackerConfig {
    /// Share payload between entries with identical decoded pixels.
    #[serde(default)]
    pub dedup: bool,
    /// Attempt LZ4 compression of every frame.
    #[serde(default = "default_compress")]
    pub compress: bool,
    /// Enabled substitution families.
    #[serde(default)]
    pub families: Vec<TextureFamily>,
    /// Animated sources with more frames than this are skipped.
    #[serde(default = "default_max_animation_frames")]
    pub max_animation_frames: usize,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            dedup: false,
            compress: default_compress(),
            families: Vec::new(),
            max_animation_frames: default_max_animation_frames(),
        }
    }
}

impl PackerConfig {
    /// Load a JSON config file and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: PackerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_animation_frames == 0 {
            return Err(ConfigError::InvalidFrameLimit);
        }
        for (i, family) in self.families.iter().enumerate() {
            if family.name.is_empty() {
                return Err(ConfigError::EmptyFamilyName);
            }
            if family.name.contains(['.', '/', '\\']) {
                return Err(ConfigError::InvalidFamilyName(family.name.clone()));
            }
            let clash = self.families[..i]
                .iter()
                .any(|f| f.name.eq_ignore_ascii_case(&family.name));
            if clash {
                return Err(ConfigError::DuplicateFamily(family.name.clone()));
            }
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Animation frame limit must be non-zero")]
    InvalidFrameLimit,
    #[error("Texture family name must be non-empty")]
    EmptyFamilyName,
    #[error("Texture family name {0:?} may not contain '.', '/' or '\\'")]
    InvalidFamilyName(String),
    #[error("Texture family {0:?} is listed twice")]
    DuplicateFamily(String),
    #[error("Unknown texture family {0:?}")]
    UnknownFamily(String),
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
