use chrono::{DateTime, Utc};
use dslpipe::{DispatchStats, DuplicatePolicy, FailureMode, ParserDescriptor, Record, RunOptions};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Per-request changes to the service's run defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOverrides {
    #[serde(default)]
    pub search_dir: Option<PathBuf>,
    #[serde(default)]
    pub preload: Option<Vec<String>>,
    #[serde(default)]
    pub duplicates: Option<DuplicatePolicy>,
    #[serde(default)]
    pub failure_mode: Option<FailureMode>,
    #[serde(default)]
    pub identity_attribute: Option<String>,
    #[serde(default)]
    pub pretty: Option<bool>,
}

impl RunOverrides {
    pub fn apply(self, base: &RunOptions) -> RunOptions {
        RunOptions {
            search_dir: self.search_dir.or_else(|| base.search_dir.clone()),
            preload: self.preload.unwrap_or_else(|| base.preload.clone()),
            duplicates: self.duplicates.unwrap_or(base.duplicates),
            failure_mode: self.failure_mode.unwrap_or(base.failure_mode),
            identity_attribute: self
                .identity_attribute
                .unwrap_or_else(|| base.identity_attribute.clone()),
            pretty: self.pretty.unwrap_or(base.pretty),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverRequest {
    pub module_path: PathBuf,
    #[serde(default)]
    pub options: RunOverrides,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserSummary {
    pub export_name: String,
    pub type_name: String,
    pub module: String,
}

impl From<&ParserDescriptor> for ParserSummary {
    fn from(descriptor: &ParserDescriptor) -> Self {
        Self {
            export_name: descriptor.export_name().to_string(),
            type_name: descriptor.type_name().to_string(),
            module: descriptor.module().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRunRequest {
    pub module_path: PathBuf,
    pub records: Vec<Record>,
    #[serde(default)]
    pub options: RunOverrides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// A finished run as stored on disk and returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub module_path: PathBuf,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub parsers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<DispatchStats>,
    #[serde(default)]
    pub records: Vec<Record>,
}
