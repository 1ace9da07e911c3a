//! Handler Registry
//!
//! Resolves `module.function` references to callables. Modules are located
//! by a [`ModuleLoader`] using the search path built up from the directories
//! requests name, and are cached for the lifetime of the registry.
//!
//! # Caching
//!
//! A module is loaded at most once and never evicted: a handler library that
//! changes on disk after its first load keeps running the old code until the
//! process restarts. Concurrent first use of the same module may load it more
//! than once, but only the first completed load is stored and every caller
//! receives that entry.
//!
//! # Example
//!
//! ```
//! use fexec_server::registry::{BuiltinLoader, HandlerRegistry};
//! use fexec_common::HandlerReference;
//! use serde_json::json;
//! use std::path::Path;
//!
//! let registry = HandlerRegistry::new(BuiltinLoader::standard());
//! let reference: HandlerReference = "isprime.handler".parse().unwrap();
//! let handler = registry.resolve(&reference, Path::new("/app")).unwrap();
//! assert_eq!(handler(&json!({"n": "17"}), &json!({})).unwrap(), json!({"IsPrime": true}));
//! ```

pub mod builtin;
pub mod dylib;
pub mod loader;

pub use dylib::DylibLoader;
pub use loader::{BuiltinLoader, ChainLoader, ModuleLoader};

use dashmap::DashMap;
use fexec_common::protocol::error::{FexecError, Result};
use fexec_common::HandlerReference;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Error type handlers report failures with.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Signature of every handler: `(params, context) -> result`.
pub type HandlerFn = dyn Fn(&Value, &Value) -> std::result::Result<Value, HandlerError> + Send + Sync;

/// A resolved, shareable handler.
pub type Handler = Arc<HandlerFn>;

/// A loaded module: a set of named handlers.
///
/// Functions come from the module's own table or, for modules loaded from a
/// dynamic library, from the library's exported symbols.
pub struct Module {
    name: String,
    functions: HashMap<String, Handler>,
    library: Option<Arc<dylib::HandlerLibrary>>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: HashMap::new(),
            library: None,
        }
    }

    pub(crate) fn from_library(name: impl Into<String>, library: Arc<dylib::HandlerLibrary>) -> Self {
        Self {
            name: name.into(),
            functions: HashMap::new(),
            library: Some(library),
        }
    }

    /// Adds a function to the module's table.
    pub fn with_function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&Value, &Value) -> std::result::Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a function by name.
    pub fn function(&self, name: &str) -> Option<Handler> {
        if let Some(function) = self.functions.get(name) {
            return Some(Arc::clone(function));
        }
        self.library.as_ref().and_then(|library| library.handler(name))
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("library", &self.library.as_ref().map(|l| l.path().to_path_buf()))
            .finish()
    }
}

/// Directories handlers are looked up in, newest first.
#[derive(Default)]
struct SearchPath {
    dirs: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
}

/// Process-scoped handler registry.
///
/// Owns the loaded-module cache and the search path. Both only grow.
pub struct HandlerRegistry {
    loader: Box<dyn ModuleLoader>,
    search_path: RwLock<SearchPath>,
    modules: DashMap<String, Arc<Module>>,
}

impl HandlerRegistry {
    pub fn new(loader: impl ModuleLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            search_path: RwLock::new(SearchPath::default()),
            modules: DashMap::new(),
        }
    }

    /// Registry with the built-in modules and dynamic-library lookup.
    pub fn standard() -> Self {
        Self::new(
            ChainLoader::new()
                .with(BuiltinLoader::standard())
                .with(DylibLoader::new()),
        )
    }

    /// Adds `dir` to the front of the search path.
    ///
    /// Returns `false` when the directory was already present or is empty.
    pub fn add_search_dir(&self, dir: &Path) -> bool {
        if dir.as_os_str().is_empty() {
            return false;
        }
        if self.search_path.read().seen.contains(dir) {
            return false;
        }

        let mut search_path = self.search_path.write();
        if !search_path.seen.insert(dir.to_path_buf()) {
            return false;
        }
        search_path.dirs.insert(0, dir.to_path_buf());
        tracing::debug!("Added {} to the handler search path", dir.display());
        true
    }

    /// Snapshot of the search path, highest priority first.
    pub fn search_path(&self) -> Vec<PathBuf> {
        self.search_path.read().dirs.clone()
    }

    /// Resolves a handler, extending the search path with `dir` first.
    ///
    /// # Errors
    ///
    /// Returns [`FexecError::Load`] if the module cannot be located or does
    /// not export the function.
    pub fn resolve(&self, reference: &HandlerReference, dir: &Path) -> Result<Handler> {
        self.add_search_dir(dir);
        let module = self.module(&reference.module)?;

        module.function(&reference.function).ok_or_else(|| {
            FexecError::Load(format!(
                "Module '{}' has no function '{}'",
                reference.module, reference.function
            ))
        })
    }

    /// Returns the cached module, loading it on first use.
    fn module(&self, name: &str) -> Result<Arc<Module>> {
        if let Some(module) = self.modules.get(name) {
            return Ok(Arc::clone(module.value()));
        }

        let search_path = self.search_path();
        let loaded = self.loader.load(name, &search_path)?.ok_or_else(|| {
            FexecError::Load(format!(
                "Module '{}' not found (search path: {:?})",
                name, search_path
            ))
        })?;
        tracing::info!("Loaded handler module {}", name);

        let module = self
            .modules
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(loaded))
            .value()
            .clone();
        Ok(module)
    }

    pub fn is_cached(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    pub fn cached_modules(&self) -> usize {
        self.modules.len()
    }
}
