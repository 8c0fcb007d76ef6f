use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::geometry::PhraseToken;

/// One playable audio clip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clip {
    /// Token key, e.g. `north_east`
    pub key: String,
    pub path: PathBuf,
}

/// Mapping from phrase tokens to clips. A token without an entry is skipped at playback.
#[derive(Debug, Clone, Default)]
pub struct ClipCatalog {
    clips: HashMap<PhraseToken, Clip>,
}

impl ClipCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map every token to `<dir>/<clip_key>.<extension>` without checking the files
    pub fn conventional(dir: &Path, extension: &str) -> Self {
        let clips = PhraseToken::ALL
            .into_iter()
            .map(|token| (token, clip_for(dir, token, extension)))
            .collect();
        Self { clips }
    }

    /// Map only the tokens whose `<dir>/<clip_key>.<extension>` file exists
    pub fn scan_dir(dir: &Path, extension: &str) -> Self {
        let mut catalog = Self::new();
        for token in PhraseToken::ALL {
            let clip = clip_for(dir, token, extension);
            if clip.path.is_file() {
                catalog.clips.insert(token, clip);
            } else {
                warn!(token = %token, path = %clip.path.display(), "No clip file for token");
            }
        }
        debug!(dir = %dir.display(), mapped = catalog.len(), "Scanned clip directory");
        catalog
    }

    /// Point a token at a specific file, replacing any existing mapping
    pub fn insert(&mut self, token: PhraseToken, path: impl Into<PathBuf>) {
        self.clips.insert(
            token,
            Clip {
                key: token.clip_key().to_string(),
                path: path.into(),
            },
        );
    }

    pub fn remove(&mut self, token: PhraseToken) -> Option<Clip> {
        self.clips.remove(&token)
    }

    pub fn get(&self, token: PhraseToken) -> Option<&Clip> {
        self.clips.get(&token)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

fn clip_for(dir: &Path, token: PhraseToken, extension: &str) -> Clip {
    Clip {
        key: token.clip_key().to_string(),
        path: dir.join(format!("{}.{}", token.clip_key(), extension)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conventional_maps_every_token() {
        let catalog = ClipCatalog::conventional(Path::new("/clips"), "wav");
        assert_eq!(catalog.len(), PhraseToken::ALL.len());
        assert_eq!(
            catalog.get(PhraseToken::NorthEast).map(|c| c.path.clone()),
            Some(PathBuf::from("/clips/north_east.wav"))
        );
    }

    #[test]
    fn test_scan_dir_only_maps_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("north.mp3"), b"ID3").unwrap();
        std::fs::write(dir.path().join("between.mp3"), b"ID3").unwrap();

        let catalog = ClipCatalog::scan_dir(dir.path(), "mp3");
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get(PhraseToken::North).is_some());
        assert!(catalog.get(PhraseToken::Between).is_some());
        assert!(catalog.get(PhraseToken::East).is_none());
    }

    #[test]
    fn test_insert_overrides() {
        let mut catalog = ClipCatalog::conventional(Path::new("/clips"), "wav");
        catalog.insert(PhraseToken::North, "/custom/n.ogg");
        assert_eq!(
            catalog.get(PhraseToken::North).map(|c| c.path.clone()),
            Some(PathBuf::from("/custom/n.ogg"))
        );
        assert!(catalog.remove(PhraseToken::And).is_some());
        assert!(catalog.get(PhraseToken::And).is_none());
    }
}
