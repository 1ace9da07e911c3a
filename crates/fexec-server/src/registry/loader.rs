//! Module loaders
//!
//! A [`ModuleLoader`] turns a module name plus the current search path into a
//! [`Module`]. The registry never looks at the filesystem itself; it asks its
//! loader, which keeps loading strategies swappable and testable.

use fexec_common::protocol::error::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::{builtin, Module};

/// Locates and loads handler modules.
pub trait ModuleLoader: Send + Sync {
    /// Loads `module`, searching `search_path` in order.
    ///
    /// Returns `Ok(None)` when this loader does not know the module, so the
    /// next loader in a [`ChainLoader`] can try.
    fn load(&self, module: &str, search_path: &[PathBuf]) -> Result<Option<Module>>;
}

/// Builds a fresh [`Module`] on demand.
pub type ModuleFactory = Arc<dyn Fn() -> Module + Send + Sync>;

/// Loader for modules compiled into the executor binary.
///
/// Built-in modules ignore the search path.
#[derive(Clone, Default)]
pub struct BuiltinLoader {
    factories: HashMap<String, ModuleFactory>,
}

impl BuiltinLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader with the modules shipped with the executor.
    pub fn standard() -> Self {
        Self::new().with_module("isprime", builtin::isprime)
    }

    pub fn with_module<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Module + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl ModuleLoader for BuiltinLoader {
    fn load(&self, module: &str, _search_path: &[PathBuf]) -> Result<Option<Module>> {
        Ok(self.factories.get(module).map(|factory| factory()))
    }
}

/// Tries a sequence of loaders, first hit wins.
#[derive(Default)]
pub struct ChainLoader {
    loaders: Vec<Box<dyn ModuleLoader>>,
}

impl ChainLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loaders.push(Box::new(loader));
        self
    }
}

impl ModuleLoader for ChainLoader {
    fn load(&self, module: &str, search_path: &[PathBuf]) -> Result<Option<Module>> {
        for loader in &self.loaders {
            if let Some(found) = loader.load(module, search_path)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}
