//! Study persistence
//!
//! Provides the [`StudyStore`] trait and two backends: JSON files (one per
//! study, keyed by study ID) and in-memory (tests). A persisted study
//! carries its full trial history and seed, so it can be reloaded after a
//! process restart and resumed with identical subsequent proposals.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::study::Study;
use crate::trial::Trial;

/// Errors from study storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("study not found: {0}")]
    NotFound(String),
}

/// Result alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Pluggable study persistence
pub trait StudyStore: Send + Sync {
    /// Load a study by ID
    fn load(&self, study_id: &str) -> Result<Study>;

    /// Persist a full study snapshot
    fn save(&self, study: &Study) -> Result<()>;

    /// Append one trial to a persisted study
    fn append_trial(&self, study_id: &str, trial: &Trial) -> Result<()>;

    /// IDs of all persisted studies
    fn list(&self) -> Result<Vec<String>>;
}

/// One JSON file per study under a root directory
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Create a store rooted at `root` (created if absent)
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, study_id: &str) -> PathBuf {
        // Study IDs double as file names; keep them path-safe
        let safe: String = study_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(format!("{safe}.json"))
    }
}

impl StudyStore for JsonFileStore {
    fn load(&self, study_id: &str) -> Result<Study> {
        let path = self.path_for(study_id);
        if !path.exists() {
            return Err(StorageError::NotFound(study_id.to_string()));
        }
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    fn save(&self, study: &Study) -> Result<()> {
        let path = self.path_for(&study.id);
        let data = serde_json::to_string_pretty(study)?;
        // Write-then-rename so a crash never leaves a torn study file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    fn append_trial(&self, study_id: &str, trial: &Trial) -> Result<()> {
        let mut study = self.load(study_id)?;
        study.trials.push(trial.clone());
        self.save(&study)
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// In-memory store for tests and ephemeral studies
#[derive(Debug, Default)]
pub struct InMemoryStore {
    studies: Mutex<HashMap<String, Study>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl StudyStore for InMemoryStore {
    fn load(&self, study_id: &str) -> Result<Study> {
        self.studies
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(study_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(study_id.to_string()))
    }

    fn save(&self, study: &Study) -> Result<()> {
        self.studies
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(study.id.clone(), study.clone());
        Ok(())
    }

    fn append_trial(&self, study_id: &str, trial: &Trial) -> Result<()> {
        let mut studies = self
            .studies
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let study = studies
            .get_mut(study_id)
            .ok_or_else(|| StorageError::NotFound(study_id.to_string()))?;
        study.trials.push(trial.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .studies
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }
}
