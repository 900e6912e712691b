// Parser plugin host: discovers the parsers a shared library declares and
// runs batches of records through them

pub mod types;
pub mod value;
pub mod base_parser;
pub mod loader;
pub mod discovery;
pub mod registry_parser;
pub mod serializer;
pub mod dispatch;
pub mod run;

// Re-export main types
pub use types::*;
pub use value::Value;
pub use base_parser::{
    Parser, ParserRegistrar, PluginDeclaration, CORE_VERSION, DECLARATION_SYMBOL, PLUGIN_ABI_VERSION,
};
pub use loader::{ModuleHandle, ModuleLoader};
pub use discovery::{discover, discover_declaration, ParserDescriptor};
pub use registry_parser::{DuplicatePolicy, ParserRegistry};
pub use serializer::{serialize, SerializeStyle};
pub use dispatch::{DispatchOptions, DispatchStats, Dispatcher, FailureMode};
pub use run::{load_parsers, run, RunOptions, RunOutput};
