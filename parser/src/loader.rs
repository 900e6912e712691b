use crate::base_parser::{PluginDeclaration, DECLARATION_SYMBOL};
use crate::{LoadError, PipelineError};
use libloading::Library;
use std::env::consts::{DLL_EXTENSION, DLL_PREFIX};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A library opened by a [`ModuleLoader`]. Kept alive by every parser
/// descriptor created from it.
pub struct ModuleHandle {
    identity: String,
    path: PathBuf,
    declaration: Option<PluginDeclaration>,
    library: Library,
}

impl ModuleHandle {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parser declaration, when the library exports one. Its strings point
    /// into the library and are only valid while this handle is alive.
    pub fn declaration(&self) -> Option<&PluginDeclaration> {
        self.declaration.as_ref()
    }

    pub fn library(&self) -> &Library {
        &self.library
    }
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("identity", &self.identity)
            .field("path", &self.path)
            .finish()
    }
}

/// Loads plugin modules and resolves their companion libraries from a single
/// search directory.
///
/// The loader only lives for the duration of a discovery call; libraries it
/// opened stay mapped for as long as someone holds their [`ModuleHandle`].
#[derive(Debug)]
pub struct ModuleLoader {
    search_dir: PathBuf,
    loaded: Vec<Arc<ModuleHandle>>,
}

impl ModuleLoader {
    pub fn new(search_dir: impl Into<PathBuf>) -> Self {
        Self {
            search_dir: search_dir.into(),
            loaded: Vec::new(),
        }
    }

    /// Loader searching the directory of the running executable
    pub fn beside_current_exe() -> std::io::Result<Self> {
        let exe = std::env::current_exe()?;
        let dir = exe.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self::new(dir))
    }

    pub fn search_dir(&self) -> &Path {
        &self.search_dir
    }

    pub fn loaded(&self) -> &[Arc<ModuleHandle>] {
        &self.loaded
    }

    /// Open the module at `path`, reusing it if this loader already has it
    pub fn load(&mut self, path: &Path) -> Result<Arc<ModuleHandle>, PipelineError> {
        let path = fs::canonicalize(path).map_err(|e| PipelineError::module_load(path, e))?;

        if let Some(existing) = self.loaded.iter().find(|m| m.path == path) {
            debug!("Module already loaded: {}", existing.identity);
            return Ok(Arc::clone(existing));
        }

        info!("Loading module: {}", path.display());
        let library = open_library(&path).map_err(|e| PipelineError::module_load(&path, e))?;

        // SAFETY: the symbol is only ever exported by `declare_parsers!`, which
        // gives it the `PluginDeclaration` type.
        let declaration = unsafe {
            library
                .get::<*const PluginDeclaration>(DECLARATION_SYMBOL)
                .ok()
                .map(|symbol| (*symbol).read())
        };

        let identity = match &declaration {
            Some(decl) => decl.identity(),
            None => file_stem(&path),
        };
        debug!("Module '{}' identity: {}", path.display(), identity);

        let handle = Arc::new(ModuleHandle {
            identity,
            path,
            declaration,
            library,
        });
        self.loaded.push(Arc::clone(&handle));
        Ok(handle)
    }

    /// Resolve a dependency the plugin needs but that is not loaded yet.
    ///
    /// Already loaded modules are matched on their full identity (or path)
    /// without touching the filesystem. Otherwise the short name, the text
    /// before the first `,`, is looked up in the search directory as
    /// `<short>.<ext>` and then `<prefix><short>.<ext>`. `Ok(None)` means the
    /// dependency could not be found.
    pub fn resolve(&mut self, dependency: &str) -> Result<Option<Arc<ModuleHandle>>, PipelineError> {
        if let Some(existing) = self
            .loaded
            .iter()
            .find(|m| m.identity == dependency || m.path.as_os_str() == dependency)
        {
            debug!("Dependency '{}' already loaded", dependency);
            return Ok(Some(Arc::clone(existing)));
        }

        let short = short_name(dependency);
        if short.is_empty() {
            warn!("Cannot resolve dependency with empty name: '{}'", dependency);
            return Ok(None);
        }

        match self.find_in_search_dir(short)? {
            Some(found) => {
                info!("Resolved dependency '{}' to {}", dependency, found.display());
                self.load(&found).map(Some)
            }
            None => {
                warn!(
                    "Dependency '{}' not found in {}",
                    dependency,
                    self.search_dir.display()
                );
                Ok(None)
            }
        }
    }

    fn find_in_search_dir(&self, short: &str) -> Result<Option<PathBuf>, PipelineError> {
        let entries = fs::read_dir(&self.search_dir)
            .map_err(|e| PipelineError::module_load(&self.search_dir, e))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();

        for candidate in candidate_file_names(short) {
            let found = files
                .iter()
                .find(|path| path.file_name().and_then(|n| n.to_str()) == Some(candidate.as_str()));
            if let Some(found) = found {
                return Ok(Some(found.clone()));
            }
        }

        Ok(None)
    }
}

/// Text before the first `,` of a dependency identity
pub fn short_name(dependency: &str) -> &str {
    dependency.split(',').next().unwrap_or("").trim()
}

/// File names a dependency short name may be stored under, most specific first
pub fn candidate_file_names(short: &str) -> Vec<String> {
    let mut names = vec![format!("{}.{}", short, DLL_EXTENSION)];
    if !DLL_PREFIX.is_empty() && !short.starts_with(DLL_PREFIX) {
        names.push(format!("{}{}.{}", DLL_PREFIX, short, DLL_EXTENSION));
    }
    names
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(unix)]
fn open_library(path: &Path) -> Result<Library, LoadError> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};

    // Global so that modules opened later can bind against this one's symbols
    let library = unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_GLOBAL)? };
    Ok(library.into())
}

#[cfg(not(unix))]
fn open_library(path: &Path) -> Result<Library, LoadError> {
    Ok(unsafe { Library::new(path)? })
}
