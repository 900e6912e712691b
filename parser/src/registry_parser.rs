use crate::discovery::ParserDescriptor;
use crate::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// What to do when two parsers share an export name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Fail the build naming both parser types
    #[default]
    Reject,
    /// Later discovery order overwrites earlier
    LastWins,
}

/// ParserRegistry - export name to parser mapping, built once per run
#[derive(Debug, Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, ParserDescriptor>,
}

impl ParserRegistry {
    /// Fold discovered descriptors into the registry
    pub fn build(
        descriptors: impl IntoIterator<Item = ParserDescriptor>,
        policy: DuplicatePolicy,
    ) -> Result<Self, PipelineError> {
        let mut parsers: HashMap<String, ParserDescriptor> = HashMap::new();

        for descriptor in descriptors {
            let name = descriptor.export_name().to_string();
            if let Some(existing) = parsers.get(&name) {
                match policy {
                    DuplicatePolicy::Reject => {
                        return Err(PipelineError::DuplicateExportName {
                            name,
                            first: existing.type_name().to_string(),
                            second: descriptor.type_name().to_string(),
                        });
                    }
                    DuplicatePolicy::LastWins => {
                        warn!(
                            "Export name '{}' of {} overwritten by {}",
                            name,
                            existing.type_name(),
                            descriptor.type_name()
                        );
                    }
                }
            }
            debug!("Registering parser '{}' ({})", name, descriptor.type_name());
            parsers.insert(name, descriptor);
        }

        let registry = Self { parsers };
        info!(
            "Registered {} parsers: {}",
            registry.len(),
            registry.names().join(", ")
        );
        Ok(registry)
    }

    /// Get parser by export name
    pub fn lookup(&self, name: &str) -> Option<&ParserDescriptor> {
        let result = self.parsers.get(name);
        if result.is_none() {
            debug!("Parser not found: {}", name);
        }
        result
    }

    /// Registered export names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.parsers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ParserDescriptor> {
        self.parsers.values()
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoxError, Parser, Value};

    struct Fixed {
        name: &'static str,
        output: &'static str,
    }

    impl Parser for Fixed {
        fn export_name(&self) -> &str {
            self.name
        }

        fn parse_string(&self, _content: &str) -> Result<Value, BoxError> {
            Ok(Value::from(self.output))
        }
    }

    fn descriptor(name: &'static str, output: &'static str) -> ParserDescriptor {
        ParserDescriptor::new(Box::new(Fixed { name, output }), "test")
    }

    #[test]
    fn test_lookup_returns_each_registered_parser() {
        let registry = ParserRegistry::build(
            vec![descriptor("Json", "json"), descriptor("Csv", "csv")],
            DuplicatePolicy::Reject,
        )
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["Csv", "Json"]);
        assert_eq!(
            registry.lookup("Json").unwrap().invoke("").unwrap(),
            Value::from("json")
        );
        assert_eq!(
            registry.lookup("Csv").unwrap().invoke("").unwrap(),
            Value::from("csv")
        );
        assert!(registry.lookup("json").is_none());
        assert!(registry.lookup("Xml").is_none());
    }

    #[test]
    fn test_empty_registry() {
        let registry = ParserRegistry::build(Vec::new(), DuplicatePolicy::Reject).unwrap();
        assert!(registry.is_empty());
        assert!(registry.lookup("Json").is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = ParserRegistry::build(
            vec![descriptor("Json", "first"), descriptor("Json", "second")],
            DuplicatePolicy::Reject,
        )
        .unwrap_err();

        assert!(matches!(err, PipelineError::DuplicateExportName { ref name, .. } if name == "Json"));
    }

    #[test]
    fn test_duplicate_last_wins() {
        let registry = ParserRegistry::build(
            vec![descriptor("Json", "first"), descriptor("Json", "second")],
            DuplicatePolicy::LastWins,
        )
        .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.lookup("Json").unwrap().invoke("").unwrap(),
            Value::from("second")
        );
    }

    #[test]
    fn test_policy_names() {
        let policy: DuplicatePolicy = serde_json::from_str(r#""last-wins""#).unwrap();
        assert_eq!(policy, DuplicatePolicy::LastWins);
        assert_eq!(DuplicatePolicy::default(), DuplicatePolicy::Reject);
    }
}
