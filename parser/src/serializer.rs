use crate::Value;

/// Layout of the serialized text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SerializeStyle {
    #[default]
    Compact,
    Pretty,
}

/// Turn a parse result into JSON text
pub fn serialize(value: &Value, style: SerializeStyle) -> Result<String, serde_json::Error> {
    match style {
        SerializeStyle::Compact => serde_json::to_string(value),
        SerializeStyle::Pretty => serde_json::to_string_pretty(value),
    }
}
