use crate::FormatError;
use dslpipe::{BoxError, Parser, Value};

/// NDJSON parser - one JSON value per line, returned as a sequence
pub struct NdjsonParser;

impl Parser for NdjsonParser {
    fn export_name(&self) -> &str {
        "Ndjson"
    }

    fn parse_string(&self, content: &str) -> Result<Value, BoxError> {
        let mut items = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            let json: serde_json::Value = serde_json::from_str(line)
                .map_err(|source| FormatError::JsonLine { line: idx + 1, source })?;
            items.push(Value::from(json));
        }

        Ok(Value::Sequence(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ndjson_parse() {
        let parser = NdjsonParser;
        let data = "{\"step\":\"load\",\"order\":1}\n\n{\"step\":\"emit\",\"order\":2}\n";

        let value = parser.parse_string(data).unwrap();
        let items = value.as_sequence().unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].get("step").and_then(Value::as_str), Some("load"));
        assert_eq!(items[1].get("order"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_ndjson_reports_line() {
        let err = NdjsonParser
            .parse_string("{\"ok\":true}\n{broken")
            .unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
