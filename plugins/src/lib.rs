// Stock parser module for dslpipe.
//
// Built as a cdylib so the host can load it at run time, and as an rlib so
// the parsers can be linked directly.

pub mod error;
pub mod csv_parser;
pub mod ndjson_parser;
pub mod json_parser;

pub use error::FormatError;
pub use csv_parser::CsvParser;
pub use ndjson_parser::NdjsonParser;
pub use json_parser::JsonParser;

// Add new parsers here:
dslpipe::declare_parsers![JsonParser, NdjsonParser, CsvParser];
