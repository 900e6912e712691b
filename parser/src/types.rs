use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Attribute naming the parser a record asks for
pub const PARSER_ATTR: &str = "Parser";
/// Attribute holding the raw text handed to the parser
pub const CONTENT_ATTR: &str = "Content";
/// Attribute the dispatcher writes the serialized result into
pub const OBJECT_ATTR: &str = "Object";
/// Attribute holding the failure message when running in isolation mode
pub const ERROR_ATTR: &str = "Error";

/// Error type parsers report their own failures with
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// One unit of work: a bag of named string attributes.
///
/// Serializes as a flat JSON object, e.g.
/// `{"Path": "model.dsl", "Parser": "Json", "Content": "{}"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    attributes: BTreeMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.attributes.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Requested parser and content, if the record is meant for the pipeline
    pub fn parse_request(&self) -> Option<(&str, &str)> {
        Some((self.get(PARSER_ATTR)?, self.get(CONTENT_ATTR)?))
    }

    /// Human readable identity used in error messages
    pub fn identity(&self, attribute: &str, index: usize) -> String {
        match self.get(attribute) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => format!("#{}", index),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            attributes: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// A parser's failure, copied out of the error the parser returned.
///
/// Errors produced inside a plugin carry code from that plugin, so they must
/// not outlive it. The dispatcher converts them into this host-owned form
/// (the message of every error in the source chain) while the plugin is
/// still loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    message: String,
    source: Option<Box<ParseFailure>>,
}

impl ParseFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Copy `error` and everything below it in its source chain
    pub fn capture(error: &(dyn std::error::Error + 'static)) -> Self {
        Self {
            message: error.to_string(),
            source: error.source().map(|cause| Box::new(Self::capture(cause))),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Messages from this failure down to its root cause
    pub fn chain(&self) -> Vec<&str> {
        let mut messages = vec![self.message.as_str()];
        let mut next = self.source.as_deref();
        while let Some(cause) = next {
            messages.push(cause.message.as_str());
            next = cause.source.as_deref();
        }
        messages
    }
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ParseFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl From<BoxError> for ParseFailure {
    fn from(error: BoxError) -> Self {
        Self::capture(error.as_ref())
    }
}

/// Why a plugin module could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("library error: {0}")]
    Library(#[from] libloading::Error),
    #[error("module does not export a parser declaration")]
    MissingDeclaration,
    #[error("module built against abi {found_abi} / dslpipe {found_core}, host is abi {expected_abi} / dslpipe {expected_core}")]
    Incompatible {
        found_abi: u32,
        found_core: String,
        expected_abi: u32,
        expected_core: String,
    },
    #[error("could not resolve dependency '{0}'")]
    UnresolvedDependency(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to load module '{}': {source}", .path.display())]
    ModuleLoad {
        path: PathBuf,
        #[source]
        source: LoadError,
    },
    #[error("Parser type '{type_name}' in module '{module}' has an empty export name")]
    InvalidExportName { type_name: String, module: String },
    #[error("Export name '{name}' is declared by both '{first}' and '{second}'")]
    DuplicateExportName {
        name: String,
        first: String,
        second: String,
    },
    #[error("Could not find parser '{parser}' for file '{record}'.")]
    MissingParser {
        parser: String,
        record: String,
        index: usize,
    },
    #[error("Parser '{parser}' failed on file '{record}': {source}")]
    Parse {
        parser: String,
        record: String,
        index: usize,
        #[source]
        source: ParseFailure,
    },
    #[error("Could not serialize result of parser '{parser}' for file '{record}': {source}")]
    Serialization {
        parser: String,
        record: String,
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl PipelineError {
    pub(crate) fn module_load(path: impl Into<PathBuf>, source: impl Into<LoadError>) -> Self {
        PipelineError::ModuleLoad {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Index of the record the error is attributed to, if any
    pub fn record_index(&self) -> Option<usize> {
        match self {
            PipelineError::MissingParser { index, .. }
            | PipelineError::Parse { index, .. }
            | PipelineError::Serialization { index, .. } => Some(*index),
            _ => None,
        }
    }
}
