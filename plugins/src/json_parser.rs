use crate::FormatError;
use dslpipe::{BoxError, Parser, Value};
use tracing::{error, info};

/// JSON parser - a whole JSON document per record
/// Example: {"entity": "Order", "fields": ["id", "total"]}
pub struct JsonParser;

impl Parser for JsonParser {
    fn export_name(&self) -> &str {
        "Json"
    }

    fn parse_string(&self, content: &str) -> Result<Value, BoxError> {
        info!("Starting JSON parsing of {} bytes", content.len());

        match serde_json::from_str::<serde_json::Value>(content) {
            Ok(json) => Ok(Value::from(json)),
            Err(e) => {
                error!("Failed to parse JSON document: {}", e);
                Err(FormatError::from(e).into())
            }
        }
    }
}
