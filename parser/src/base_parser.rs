use crate::{BoxError, Value};

/// Base trait that all parsers must implement.
///
/// A type becomes a parser by providing both halves of the contract: the
/// export name it is looked up by, and the parse function turning raw text
/// into a [`Value`]. Nothing is invoked at discovery time except
/// `export_name`.
pub trait Parser: Send + Sync {
    /// Name records use in their `Parser` attribute (e.g. "Json")
    fn export_name(&self) -> &str;

    /// Parse raw text into a structured value
    fn parse_string(&self, content: &str) -> Result<Value, BoxError>;

    /// Rust type implementing the parser, used in diagnostics
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Sink a plugin module hands its parsers to while it is being discovered
pub trait ParserRegistrar {
    fn register_parser(&mut self, parser: Box<dyn Parser>);
}

/// Bumped whenever [`PluginDeclaration`] or the traits above change shape
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// Version of this crate, compared against the one a plugin was built with
pub const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Symbol name a plugin module exports its declaration under
pub const DECLARATION_SYMBOL: &[u8] = b"dslpipe_plugin_declaration\0";

/// What a plugin module exports. Use [`declare_parsers!`](crate::declare_parsers)
/// rather than building one by hand.
#[derive(Clone, Copy)]
pub struct PluginDeclaration {
    pub abi_version: u32,
    pub core_version: &'static str,
    pub module_name: &'static str,
    pub module_version: &'static str,
    /// Companion libraries to resolve before `register` runs
    pub dependencies: &'static [&'static str],
    pub register: unsafe fn(&mut dyn ParserRegistrar),
}

impl PluginDeclaration {
    /// Identity other modules refer to this one by
    pub fn identity(&self) -> String {
        format!("{}, Version={}", self.module_name, self.module_version)
    }

    pub fn is_compatible(&self) -> bool {
        self.abi_version == PLUGIN_ABI_VERSION && self.core_version == CORE_VERSION
    }
}

/// Exports the parser declaration of a plugin module.
///
/// Usage:
/// ```rust,ignore
/// declare_parsers![JsonParser, CsvParser];
///
/// // with companion libraries that must be resolved first
/// declare_parsers![dependencies = ["grammar_runtime, Version=2.1"]; GrammarParser];
/// ```
#[macro_export]
macro_rules! declare_parsers {
    (dependencies = [$($dep:expr),* $(,)?]; $($parser:expr),* $(,)?) => {
        #[doc(hidden)]
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static dslpipe_plugin_declaration: $crate::PluginDeclaration = $crate::PluginDeclaration {
            abi_version: $crate::PLUGIN_ABI_VERSION,
            core_version: $crate::CORE_VERSION,
            module_name: env!("CARGO_PKG_NAME"),
            module_version: env!("CARGO_PKG_VERSION"),
            dependencies: &[$($dep),*],
            register: {
                #[allow(unused_variables)]
                fn register(registrar: &mut dyn $crate::ParserRegistrar) {
                    $(registrar.register_parser(Box::new($parser));)*
                }
                register
            },
        };
    };
    ($($parser:expr),* $(,)?) => {
        $crate::declare_parsers!(dependencies = []; $($parser),*);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl Parser for Upper {
        fn export_name(&self) -> &str {
            "Upper"
        }

        fn parse_string(&self, content: &str) -> Result<Value, BoxError> {
            Ok(Value::String(content.to_uppercase()))
        }
    }

    #[test]
    fn test_type_name_names_the_implementor() {
        let parser: Box<dyn Parser> = Box::new(Upper);
        assert!(parser.type_name().ends_with("Upper"));
    }

    #[test]
    fn test_declaration_identity_and_compatibility() {
        fn register(_: &mut dyn ParserRegistrar) {}

        let decl = PluginDeclaration {
            abi_version: PLUGIN_ABI_VERSION,
            core_version: CORE_VERSION,
            module_name: "grammars",
            module_version: "1.2.0",
            dependencies: &[],
            register,
        };
        assert_eq!(decl.identity(), "grammars, Version=1.2.0");
        assert!(decl.is_compatible());

        let old = PluginDeclaration { abi_version: 0, ..decl };
        assert!(!old.is_compatible());
    }
}
