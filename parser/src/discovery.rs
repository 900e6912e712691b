use crate::base_parser::{Parser, ParserRegistrar, PluginDeclaration, CORE_VERSION, PLUGIN_ABI_VERSION};
use crate::loader::{ModuleHandle, ModuleLoader};
use crate::{BoxError, LoadError, PipelineError, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One discovered parser, bound to the module it came from
pub struct ParserDescriptor {
    export_name: String,
    type_name: String,
    module: String,
    // Dropped before `_libraries`, whose code the parser's vtable points into
    parser: Box<dyn Parser>,
    _libraries: Vec<Arc<ModuleHandle>>,
}

impl ParserDescriptor {
    /// Descriptor for a parser linked into the current process
    pub fn new(parser: Box<dyn Parser>, module: impl Into<String>) -> Self {
        Self::bind(parser, module.into(), Vec::new())
    }

    fn bind(parser: Box<dyn Parser>, module: String, libraries: Vec<Arc<ModuleHandle>>) -> Self {
        Self {
            export_name: parser.export_name().to_string(),
            type_name: parser.type_name().to_string(),
            module,
            parser,
            _libraries: libraries,
        }
    }

    pub fn export_name(&self) -> &str {
        &self.export_name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn invoke(&self, content: &str) -> Result<Value, BoxError> {
        self.parser.parse_string(content)
    }
}

impl std::fmt::Debug for ParserDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserDescriptor")
            .field("export_name", &self.export_name)
            .field("type_name", &self.type_name)
            .field("module", &self.module)
            .finish()
    }
}

/// Collects what a module's `register` function hands over
struct ModuleRegistrar {
    module: String,
    libraries: Vec<Arc<ModuleHandle>>,
    found: Vec<ParserDescriptor>,
}

impl ParserRegistrar for ModuleRegistrar {
    fn register_parser(&mut self, parser: Box<dyn Parser>) {
        debug!(
            "Module '{}' registered parser type {} as '{}'",
            self.module,
            parser.type_name(),
            parser.export_name()
        );
        let descriptor = ParserDescriptor::bind(parser, self.module.clone(), self.libraries.clone());
        self.found.push(descriptor);
    }
}

/// Load the module at `module_path` and collect the parsers it declares.
///
/// Declared dependencies are resolved through `loader` before the module's
/// registration function runs. No parser is invoked.
pub fn discover(
    loader: &mut ModuleLoader,
    module_path: &Path,
) -> Result<Vec<ParserDescriptor>, PipelineError> {
    info!("Discovering parsers in {}", module_path.display());
    let module = loader.load(module_path)?;

    let declaration = match module.declaration() {
        Some(decl) => *decl,
        None => {
            return Err(PipelineError::module_load(
                module.path(),
                LoadError::MissingDeclaration,
            ))
        }
    };
    check_compatible(&declaration, module.path())?;
    resolve_dependencies(loader, &declaration, module.path())?;

    // The module first, then whatever it depends on
    let mut libraries = vec![Arc::clone(&module)];
    libraries.extend(
        loader
            .loaded()
            .iter()
            .filter(|handle| !Arc::ptr_eq(handle, &module))
            .cloned(),
    );

    collect(&declaration, module.identity().to_string(), libraries)
}

/// Run discovery for a declaration linked into the current process.
///
/// Its dependencies are resolved through `loader` exactly as for a module
/// loaded from disk, and the descriptors keep them loaded.
pub fn discover_declaration(
    loader: &mut ModuleLoader,
    declaration: &PluginDeclaration,
) -> Result<Vec<ParserDescriptor>, PipelineError> {
    info!("Discovering parsers in linked module {}", declaration.identity());
    let path = Path::new(declaration.module_name);
    check_compatible(declaration, path)?;
    resolve_dependencies(loader, declaration, path)?;

    collect(declaration, declaration.identity(), loader.loaded().to_vec())
}

fn resolve_dependencies(
    loader: &mut ModuleLoader,
    declaration: &PluginDeclaration,
    path: &Path,
) -> Result<(), PipelineError> {
    for dependency in declaration.dependencies {
        if loader.resolve(dependency)?.is_none() {
            warn!(
                "Module '{}' depends on '{}', which could not be resolved",
                declaration.identity(),
                dependency
            );
            return Err(PipelineError::module_load(
                path,
                LoadError::UnresolvedDependency(dependency.to_string()),
            ));
        }
    }
    Ok(())
}

fn check_compatible(declaration: &PluginDeclaration, path: &Path) -> Result<(), PipelineError> {
    if declaration.is_compatible() {
        return Ok(());
    }
    warn!(
        "Module '{}' is incompatible with this host",
        declaration.identity()
    );
    Err(PipelineError::module_load(
        path,
        LoadError::Incompatible {
            found_abi: declaration.abi_version,
            found_core: declaration.core_version.to_string(),
            expected_abi: PLUGIN_ABI_VERSION,
            expected_core: CORE_VERSION.to_string(),
        },
    ))
}

fn collect(
    declaration: &PluginDeclaration,
    module: String,
    libraries: Vec<Arc<ModuleHandle>>,
) -> Result<Vec<ParserDescriptor>, PipelineError> {
    let mut registrar = ModuleRegistrar {
        module,
        libraries,
        found: Vec::new(),
    };

    // SAFETY: the declaration passed the abi and core version check, so the
    // function pointer has the signature the host expects.
    unsafe { (declaration.register)(&mut registrar) };

    for descriptor in &registrar.found {
        if descriptor.export_name().trim().is_empty() {
            return Err(PipelineError::InvalidExportName {
                type_name: descriptor.type_name().to_string(),
                module: descriptor.module().to_string(),
            });
        }
    }

    info!(
        "Discovered {} parsers in '{}': {}",
        registrar.found.len(),
        registrar.module,
        registrar
            .found
            .iter()
            .map(|d| d.export_name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(registrar.found)
}
