//! Substitution of canonical sources by pre-compressed family variants.

use super::config::TextureFamily;
use crate::bundle::canonical_path;

/// Recognises `<stem>.<family>.<ext>` variant paths for enabled families.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionTable {
    families: Vec<TextureFamily>,
}

impl SubstitutionTable {
    pub fn new(families: &[TextureFamily]) -> Self {
        Self {
            families: families.to_vec(),
        }
    }

    /// Map a variant path to its canonical path and family.
    ///
    /// Returns `None` for paths that are not a variant of an enabled family.
    pub fn classify(&self, path: &str) -> Option<(String, &TextureFamily)> {
        let path = canonical_path(path);
        let (dir, name) = match path.rfind('/') {
            Some(i) => path.split_at(i + 1),
            None => ("", path.as_str()),
        };
        let (rest, ext) = name.rsplit_once('.')?;
        let (stem, tag) = rest.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        let family = self
            .families
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(tag))?;
        Some((format!("{dir}{stem}.{ext}"), family))
    }
}

/// Whether a candidate source should replace the current one.
///
/// Plain sources rank `None`, below every family. Only a strictly higher
/// rank replaces, so the first of equally ranked candidates is kept.
pub fn supersedes(candidate: Option<u32>, current: Option<u32>) -> bool {
    candidate > current
}
