use crate::registry_parser::ParserRegistry;
use crate::serializer::{serialize, SerializeStyle};
use crate::{ParseFailure, PipelineError, Record, ERROR_ATTR, OBJECT_ATTR};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// How a failing record affects the rest of the batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureMode {
    /// The first missing parser or failing parse aborts the whole batch
    #[default]
    FailFast,
    /// Failures are written to the record's `Error` attribute and the batch goes on
    Isolate,
}

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub failure_mode: FailureMode,
    /// Attribute naming a record in error messages
    pub identity_attribute: String,
    pub style: SerializeStyle,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            failure_mode: FailureMode::FailFast,
            identity_attribute: "Path".to_string(),
            style: SerializeStyle::Compact,
        }
    }
}

/// Counts of what happened to the records of one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub parsed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Runs records through the parsers of a registry
pub struct Dispatcher<'a> {
    registry: &'a ParserRegistry,
    options: &'a DispatchOptions,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a ParserRegistry, options: &'a DispatchOptions) -> Self {
        Self { registry, options }
    }

    /// Process records in input order, returning the annotated batch
    pub fn dispatch(&self, records: &[Record]) -> Result<Vec<Record>, PipelineError> {
        self.dispatch_with_stats(records).map(|(records, _)| records)
    }

    pub fn dispatch_with_stats(
        &self,
        records: &[Record],
    ) -> Result<(Vec<Record>, DispatchStats), PipelineError> {
        info!(
            "Dispatching {} records ({:?})",
            records.len(),
            self.options.failure_mode
        );

        let mut output = Vec::with_capacity(records.len());
        let mut stats = DispatchStats::default();

        for (index, record) in records.iter().enumerate() {
            let mut record = record.clone();

            match self.process(index, &record) {
                Ok(Some(object)) => {
                    record.set(OBJECT_ATTR, object);
                    stats.parsed += 1;
                }
                Ok(None) => stats.skipped += 1,
                Err(err) => match self.options.failure_mode {
                    FailureMode::FailFast => {
                        error!("Dispatch aborted at record {}: {}", index, err);
                        return Err(err);
                    }
                    FailureMode::Isolate => {
                        warn!("Record {} failed: {}", index, err);
                        record.remove(OBJECT_ATTR);
                        record.set(ERROR_ATTR, err.to_string());
                        stats.failed += 1;
                    }
                },
            }

            output.push(record);
        }

        info!(
            "Dispatch complete: {} parsed, {} skipped, {} failed",
            stats.parsed, stats.skipped, stats.failed
        );
        Ok((output, stats))
    }

    /// Serialized result for one record, `None` when it is not for the pipeline
    fn process(&self, index: usize, record: &Record) -> Result<Option<String>, PipelineError> {
        let Some((parser_name, content)) = record.parse_request() else {
            debug!("Record {} has no Parser/Content, passing through", index);
            return Ok(None);
        };

        let identity = || record.identity(&self.options.identity_attribute, index);

        let descriptor = self
            .registry
            .lookup(parser_name)
            .ok_or_else(|| PipelineError::MissingParser {
                parser: parser_name.to_string(),
                record: identity(),
                index,
            })?;

        debug!("Parsing record {} with '{}'", index, parser_name);
        // The parser's own error is dropped here, while its module is loaded
        let value = descriptor
            .invoke(content)
            .map_err(|source| PipelineError::Parse {
                parser: parser_name.to_string(),
                record: identity(),
                index,
                source: ParseFailure::from(source),
            })?;

        let object = serialize(&value, self.options.style).map_err(|source| {
            PipelineError::Serialization {
                parser: parser_name.to_string(),
                record: identity(),
                index,
                source,
            }
        })?;

        Ok(Some(object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::ParserDescriptor;
    use crate::registry_parser::DuplicatePolicy;
    use crate::{BoxError, Parser, Value, CONTENT_ATTR, PARSER_ATTR};

    struct JsonParser;

    impl Parser for JsonParser {
        fn export_name(&self) -> &str {
            "Json"
        }

        fn parse_string(&self, content: &str) -> Result<Value, BoxError> {
            let json: serde_json::Value = serde_json::from_str(content)?;
            Ok(Value::from(json))
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("unexpected token '!' at 0")]
    struct Unexpected;

    struct Strict;

    impl Parser for Strict {
        fn export_name(&self) -> &str {
            "X"
        }

        fn parse_string(&self, content: &str) -> Result<Value, BoxError> {
            if content.starts_with('!') {
                return Err(Box::new(Unexpected));
            }
            Ok(Value::from(content))
        }
    }

    fn registry() -> ParserRegistry {
        ParserRegistry::build(
            vec![
                ParserDescriptor::new(Box::new(JsonParser), "test"),
                ParserDescriptor::new(Box::new(Strict), "test"),
            ],
            DuplicatePolicy::Reject,
        )
        .unwrap()
    }

    fn dsl(path: &str, parser: &str, content: &str) -> Record {
        Record::new()
            .with("Path", path)
            .with(PARSER_ATTR, parser)
            .with(CONTENT_ATTR, content)
    }

    #[test]
    fn test_json_record_gets_object() {
        let registry = registry();
        let options = DispatchOptions::default();
        let records = vec![Record::new().with(PARSER_ATTR, "Json").with(CONTENT_ATTR, "{}")];

        let output = Dispatcher::new(&registry, &options).dispatch(&records).unwrap();

        let expected = records[0].clone().with(OBJECT_ATTR, "{}");
        assert_eq!(output, vec![expected]);
    }

    #[test]
    fn test_records_without_parser_or_content_pass_through() {
        let registry = registry();
        let options = DispatchOptions::default();
        let records = vec![
            Record::new().with("Path", "readme.txt"),
            dsl("a.dsl", "Json", "[1]"),
            Record::new().with("Path", "b.dsl").with(PARSER_ATTR, "Missing"),
            Record::new().with("Path", "c.dsl").with(CONTENT_ATTR, "!!!"),
        ];

        let (output, stats) = Dispatcher::new(&registry, &options)
            .dispatch_with_stats(&records)
            .unwrap();

        assert_eq!(output.len(), 4);
        assert_eq!(output[0], records[0]);
        assert_eq!(output[1].get(OBJECT_ATTR), Some("[1]"));
        assert_eq!(output[2], records[2]);
        assert_eq!(output[3], records[3]);
        assert_eq!(stats, DispatchStats { parsed: 1, skipped: 3, failed: 0 });
    }

    #[test]
    fn test_missing_parser_fails_whole_batch() {
        let registry = registry();
        let options = DispatchOptions::default();
        let records = vec![
            Record::new().with("Path", "readme.txt"),
            dsl("a.dsl", "Json", "{}"),
            dsl("b.dsl", "Yaml", "a: 1"),
            dsl("c.dsl", "Json", "{}"),
        ];

        let err = Dispatcher::new(&registry, &options).dispatch(&records).unwrap_err();

        match err {
            PipelineError::MissingParser { parser, record, index } => {
                assert_eq!(parser, "Yaml");
                assert_eq!(record, "b.dsl");
                assert_eq!(index, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_registry_reports_missing_parser() {
        let registry = ParserRegistry::default();
        let options = DispatchOptions::default();
        let records = vec![Record::new().with(PARSER_ATTR, "Json").with(CONTENT_ATTR, "{}")];

        let err = Dispatcher::new(&registry, &options).dispatch(&records).unwrap_err();

        assert!(matches!(err, PipelineError::MissingParser { ref parser, .. } if parser == "Json"));
        assert!(err.to_string().contains("'#0'"));
    }

    #[test]
    fn test_parser_failure_wraps_cause() {
        let registry = registry();
        let options = DispatchOptions::default();
        let records = vec![dsl("bad.dsl", "X", "!!!")];

        let err = Dispatcher::new(&registry, &options).dispatch(&records).unwrap_err();

        match &err {
            PipelineError::Parse { parser, record, source, .. } => {
                assert_eq!(parser, "X");
                assert_eq!(record, "bad.dsl");
                assert_eq!(source.message(), "unexpected token '!' at 0");
            }
            other => panic!("unexpected error: {other}"),
        }
        let cause = std::error::Error::source(&err).unwrap();
        assert_eq!(cause.to_string(), "unexpected token '!' at 0");
    }

    #[test]
    fn test_dispatch_is_idempotent() {
        let registry = registry();
        let options = DispatchOptions::default();
        let records = vec![
            dsl("a.dsl", "Json", r#"{"b": [1, 2.5, "x"], "a": null}"#),
            Record::new().with("Path", "notes.md"),
            dsl("c.dsl", "X", "plain"),
        ];
        let dispatcher = Dispatcher::new(&registry, &options);

        let first = dispatcher.dispatch(&records).unwrap();
        let second = dispatcher.dispatch(&records).unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0].get(OBJECT_ATTR), Some(r#"{"a":null,"b":[1,2.5,"x"]}"#));
    }

    #[test]
    fn test_isolate_mode_keeps_going() {
        let registry = registry();
        let options = DispatchOptions {
            failure_mode: FailureMode::Isolate,
            ..DispatchOptions::default()
        };
        let records = vec![
            dsl("a.dsl", "Yaml", "a: 1"),
            dsl("b.dsl", "X", "!!!"),
            dsl("c.dsl", "Json", "{}"),
        ];

        let (output, stats) = Dispatcher::new(&registry, &options)
            .dispatch_with_stats(&records)
            .unwrap();

        assert_eq!(stats, DispatchStats { parsed: 1, skipped: 0, failed: 2 });
        assert!(output[0].get(ERROR_ATTR).unwrap().contains("'Yaml'"));
        assert!(output[0].get(OBJECT_ATTR).is_none());
        assert!(output[1].get(ERROR_ATTR).unwrap().contains("unexpected token"));
        assert_eq!(output[2].get(OBJECT_ATTR), Some("{}"));
        assert!(output[2].get(ERROR_ATTR).is_none());
    }

    #[test]
    fn test_isolate_mode_drops_stale_object() {
        let registry = registry();
        let options = DispatchOptions {
            failure_mode: FailureMode::Isolate,
            ..DispatchOptions::default()
        };
        let records = vec![
            dsl("a.dsl", "X", "!!!").with(OBJECT_ATTR, r#""from an earlier run""#),
            dsl("b.dsl", "Yaml", "a: 1").with(OBJECT_ATTR, "{}"),
        ];

        let output = Dispatcher::new(&registry, &options).dispatch(&records).unwrap();

        for record in &output {
            assert!(record.get(ERROR_ATTR).is_some());
            assert!(!record.contains(OBJECT_ATTR));
        }
    }

    #[test]
    fn test_custom_identity_attribute() {
        let registry = registry();
        let options = DispatchOptions {
            identity_attribute: "ItemSpec".to_string(),
            ..DispatchOptions::default()
        };
        let records = vec![Record::new()
            .with("ItemSpec", "models/order.dsl")
            .with(PARSER_ATTR, "Nope")
            .with(CONTENT_ATTR, "")];

        let err = Dispatcher::new(&registry, &options).dispatch(&records).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not find parser 'Nope' for file 'models/order.dsl'."
        );
    }
}
