use crate::FormatError;
use csv::ReaderBuilder;
use dslpipe::{BoxError, Parser, Value};
use std::collections::BTreeMap;

/// CSV parser - header row names the keys, each following row becomes a mapping
pub struct CsvParser;

impl CsvParser {
    fn rows(content: &str) -> Result<Vec<Value>, FormatError> {
        let mut reader = ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            return Err(FormatError::MissingHeader);
        }

        let mut rows = Vec::new();
        for record_result in reader.records() {
            let record = record_result?;

            let row: BTreeMap<String, Value> = headers
                .iter()
                .zip(record.iter())
                .map(|(key, field)| (key.to_string(), Value::from(field)))
                .collect();
            rows.push(Value::Mapping(row));
        }

        Ok(rows)
    }
}

impl Parser for CsvParser {
    fn export_name(&self) -> &str {
        "Csv"
    }

    fn parse_string(&self, content: &str) -> Result<Value, BoxError> {
        Ok(Value::Sequence(Self::rows(content)?))
    }
}
