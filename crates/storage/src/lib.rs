use directories::ProjectDirs;
use labelsnap_model::CropRegion;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const PRESETS_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Persisted crop presets: one named slot holding an ordered sequence of
/// regions. Order is insertion order; duplicates of the same geometry are
/// allowed, so entries are addressed by position.
#[derive(Debug, Clone)]
pub struct PresetStore {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PresetsEnvelope {
    version: u32,
    presets: Vec<CropRegion>,
}

impl PresetStore {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "labelsnap", "labelsnap")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read the persisted sequence. Missing, unreadable, or malformed state
    /// degrades to an empty sequence; the caller never sees a load error.
    pub fn load_all(&self) -> Vec<CropRegion> {
        let path = self.presets_path();
        if !path.exists() {
            return Vec::new();
        }

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read presets, treating as empty");
                return Vec::new();
            }
        };

        match serde_json::from_slice::<PresetsEnvelope>(&bytes) {
            Ok(envelope) => envelope.presets.into_iter().map(CropRegion::clamp).collect(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "malformed presets, treating as empty");
                Vec::new()
            }
        }
    }

    /// Overwrite the persisted sequence wholesale.
    pub fn save_all(&self, presets: &[CropRegion]) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let envelope =
            PresetsEnvelope { version: PRESETS_SCHEMA_VERSION, presets: presets.to_vec() };

        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(self.presets_path(), bytes)?;
        Ok(())
    }

    /// Append one preset and return its index in the persisted sequence.
    pub fn append(&self, preset: CropRegion) -> Result<usize, StorageError> {
        let mut presets = self.load_all();
        presets.push(preset);
        self.save_all(&presets)?;
        Ok(presets.len() - 1)
    }

    fn presets_path(&self) -> PathBuf {
        self.root.join("presets.json")
    }
}
