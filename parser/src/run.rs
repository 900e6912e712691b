use crate::discovery::{discover, ParserDescriptor};
use crate::dispatch::{DispatchOptions, DispatchStats, Dispatcher, FailureMode};
use crate::loader::ModuleLoader;
use crate::registry_parser::{DuplicatePolicy, ParserRegistry};
use crate::serializer::SerializeStyle;
use crate::{LoadError, PipelineError, Record};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument};

/// Knobs for one run. Every field has a default, so `{}` is a valid options
/// document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Where companion libraries are looked up; beside the executable when unset
    pub search_dir: Option<PathBuf>,
    /// Dependencies to resolve before the module itself is opened
    pub preload: Vec<String>,
    pub duplicates: DuplicatePolicy,
    pub failure_mode: FailureMode,
    pub identity_attribute: String,
    pub pretty: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            search_dir: None,
            preload: Vec::new(),
            duplicates: DuplicatePolicy::Reject,
            failure_mode: FailureMode::FailFast,
            identity_attribute: "Path".to_string(),
            pretty: false,
        }
    }
}

impl RunOptions {
    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            failure_mode: self.failure_mode,
            identity_attribute: self.identity_attribute.clone(),
            style: if self.pretty {
                SerializeStyle::Pretty
            } else {
                SerializeStyle::Compact
            },
        }
    }

    fn loader(&self) -> Result<ModuleLoader, PipelineError> {
        match &self.search_dir {
            Some(dir) => Ok(ModuleLoader::new(dir)),
            None => ModuleLoader::beside_current_exe()
                .map_err(|e| PipelineError::module_load(PathBuf::new(), e)),
        }
    }
}

/// Annotated batch plus what the run saw along the way
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    pub records: Vec<Record>,
    /// Export names the module provided
    pub parsers: Vec<String>,
    #[serde(flatten)]
    pub stats: DispatchStats,
}

/// Load the module's parsers with a loader scoped to this call
pub fn load_parsers(
    module_path: &Path,
    options: &RunOptions,
) -> Result<Vec<ParserDescriptor>, PipelineError> {
    let mut loader = options.loader()?;

    for dependency in &options.preload {
        if loader.resolve(dependency)?.is_none() {
            return Err(PipelineError::module_load(
                module_path,
                LoadError::UnresolvedDependency(dependency.clone()),
            ));
        }
    }

    discover(&mut loader, module_path)
}

/// Discover the module's parsers and run the batch through them
#[instrument(skip(records, options), fields(record_count = records.len()))]
pub fn run(
    module_path: &Path,
    records: &[Record],
    options: &RunOptions,
) -> Result<RunOutput, PipelineError> {
    let result = execute(module_path, records, options);
    match &result {
        Ok(output) => info!(
            "Run finished: {} parsed, {} skipped, {} failed",
            output.stats.parsed, output.stats.skipped, output.stats.failed
        ),
        Err(e) => error!("Failed to parse DSL files: {}", e),
    }
    result
}

fn execute(
    module_path: &Path,
    records: &[Record],
    options: &RunOptions,
) -> Result<RunOutput, PipelineError> {
    let descriptors = load_parsers(module_path, options)?;
    let registry = ParserRegistry::build(descriptors, options.duplicates)?;

    let dispatch_options = options.dispatch_options();
    let (records, stats) = Dispatcher::new(&registry, &dispatch_options).dispatch_with_stats(records)?;

    Ok(RunOutput {
        records,
        parsers: registry.names().into_iter().map(str::to_string).collect(),
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_options_from_empty_document() {
        let options: RunOptions = serde_json::from_str("{}").unwrap();
        assert!(options.search_dir.is_none());
        assert_eq!(options.duplicates, DuplicatePolicy::Reject);
        assert_eq!(options.failure_mode, FailureMode::FailFast);
        assert_eq!(options.identity_attribute, "Path");
    }

    #[test]
    fn test_options_overrides() {
        let options: RunOptions = serde_json::from_str(
            r#"{"failure_mode": "isolate", "duplicates": "last-wins", "pretty": true}"#,
        )
        .unwrap();
        let dispatch = options.dispatch_options();
        assert_eq!(dispatch.failure_mode, FailureMode::Isolate);
        assert_eq!(dispatch.style, SerializeStyle::Pretty);
        assert_eq!(options.duplicates, DuplicatePolicy::LastWins);
    }

    #[test]
    fn test_run_with_missing_module_fails_before_output() {
        let dir = TempDir::new().unwrap();
        let options = RunOptions {
            search_dir: Some(dir.path().to_path_buf()),
            ..RunOptions::default()
        };
        let records = vec![Record::new().with("Path", "readme.txt")];

        let err = run(&dir.path().join("parsers.so"), &records, &options).unwrap_err();
        assert!(matches!(err, PipelineError::ModuleLoad { .. }));
    }

    #[test]
    fn test_unresolved_preload() {
        let dir = TempDir::new().unwrap();
        let options = RunOptions {
            search_dir: Some(dir.path().to_path_buf()),
            preload: vec!["grammar_runtime, Version=1.0".to_string()],
            ..RunOptions::default()
        };

        let err = load_parsers(&dir.path().join("parsers.so"), &options).unwrap_err();
        match err {
            PipelineError::ModuleLoad {
                source: LoadError::UnresolvedDependency(name),
                ..
            } => assert_eq!(name, "grammar_runtime, Version=1.0"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
