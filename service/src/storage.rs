use crate::models::RunRecord;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid run id: {0}")]
    InvalidId(String),
}

/// One directory per run under `base_path`, holding `run.json`
pub struct RunStorage {
    base_path: PathBuf,
}

impl RunStorage {
    pub fn new(base_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn create_run(&self) -> std::io::Result<String> {
        let run_id = Uuid::new_v4().to_string();
        fs::create_dir_all(self.base_path.join(&run_id))?;
        Ok(run_id)
    }

    pub fn run_path(&self, run_id: &str) -> Result<PathBuf, StorageError> {
        // Only ids we handed out, never a path
        let id = Uuid::parse_str(run_id).map_err(|_| StorageError::InvalidId(run_id.to_string()))?;
        Ok(self.base_path.join(id.to_string()))
    }

    pub fn write_run(&self, run: &RunRecord) -> Result<(), StorageError> {
        let run_path = self.run_path(&run.run_id)?;
        fs::create_dir_all(&run_path)?;
        let json = serde_json::to_string_pretty(run)?;
        let mut file = fs::File::create(run_path.join("run.json"))?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    pub fn read_run(&self, run_id: &str) -> Result<RunRecord, StorageError> {
        let json = fs::read_to_string(self.run_path(run_id)?.join("run.json"))?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn delete_run(&self, run_id: &str) -> Result<(), StorageError> {
        let run_path = self.run_path(run_id)?;
        if run_path.exists() {
            fs::remove_dir_all(run_path)?;
        }
        Ok(())
    }

    /// Stored run ids, sorted
    pub fn list_runs(&self) -> std::io::Result<Vec<String>> {
        let mut runs = Vec::new();

        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            if entry.path().join("run.json").is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    runs.push(name.to_string());
                }
            }
        }

        runs.sort();
        Ok(runs)
    }
}
