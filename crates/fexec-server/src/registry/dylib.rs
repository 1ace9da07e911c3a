//! Handler modules loaded from dynamic libraries
//!
//! Module `a.b` is looked up as `<dir>/a/<lib>b<ext>` in each search
//! directory in turn (`libb.so` on Linux), using [`libloading`].
//!
//! # ABI
//!
//! Function `f` of a module is the exported symbol `fexec_handler_f`, with
//! the C signature
//!
//! ```c
//! int32_t fexec_handler_f(const char *params_json, const char *context_json, char **out);
//! ```
//!
//! A zero status means success and `*out` holds the JSON result. A non-zero
//! status means failure and `*out`, if set, holds an error message. The
//! library must also export `void fexec_free(char *)`, which the executor
//! calls to release `*out`.
//!
//! Only prefixed symbols are ever called. Other exports, including
//! `fexec_free` and anything the library links against, cannot be named by a
//! request.

use fexec_common::protocol::error::{FexecError, Result};
use libloading::{Library, Symbol};
use serde_json::Value;
use std::ffi::{c_char, CStr, CString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::loader::ModuleLoader;
use super::{Handler, HandlerError, Module};

type RawHandler = unsafe extern "C" fn(*const c_char, *const c_char, *mut *mut c_char) -> i32;
type RawFree = unsafe extern "C" fn(*mut c_char);

const FREE_SYMBOL: &[u8] = b"fexec_free\0";
const HANDLER_PREFIX: &str = "fexec_handler_";

/// Loads modules from dynamic libraries found on the search path.
#[derive(Debug, Clone, Copy, Default)]
pub struct DylibLoader;

impl DylibLoader {
    pub fn new() -> Self {
        Self
    }

    /// Path module `module` would have inside `dir`.
    pub fn library_path(dir: &Path, module: &str) -> PathBuf {
        let mut path = dir.to_path_buf();
        let file = match module.rsplit_once('.') {
            Some((package, file)) => {
                path.extend(package.split('.'));
                file
            }
            None => module,
        };
        path.push(libloading::library_filename(file));
        path
    }
}

fn validate_module_name(module: &str) -> Result<()> {
    let valid = module.split('.').all(|segment| {
        !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    });
    if valid {
        Ok(())
    } else {
        Err(FexecError::Load(format!("Invalid module name '{}'", module)))
    }
}

impl ModuleLoader for DylibLoader {
    fn load(&self, module: &str, search_path: &[PathBuf]) -> Result<Option<Module>> {
        validate_module_name(module)?;

        for dir in search_path {
            let candidate = Self::library_path(dir, module);
            if candidate.is_file() {
                let library = HandlerLibrary::open(&candidate)?;
                tracing::debug!("Opened handler library {}", candidate.display());
                return Ok(Some(Module::from_library(module, Arc::new(library))));
            }
        }
        Ok(None)
    }
}

/// An opened handler library.
///
/// Handlers resolved from it keep it alive through an `Arc`, so the library
/// is only unloaded once no module or handler refers to it.
pub struct HandlerLibrary {
    path: PathBuf,
    free: RawFree,
    // Dropped last.
    library: Library,
}

impl HandlerLibrary {
    fn open(path: &Path) -> Result<Self> {
        // SAFETY: loading runs the library's initializers. Handler libraries
        // are trusted code deployed alongside the executor.
        let library = unsafe { Library::new(path) }.map_err(|e| {
            FexecError::Load(format!("Failed to load library {}: {}", path.display(), e))
        })?;

        // SAFETY: the symbol is declared with the `fexec_free` signature.
        let free: RawFree = unsafe {
            let symbol: Symbol<RawFree> = library.get(FREE_SYMBOL).map_err(|_| {
                FexecError::Load(format!("{} does not export fexec_free", path.display()))
            })?;
            *symbol
        };

        Ok(Self {
            path: path.to_path_buf(),
            free,
            library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves the handler exported for function `name`.
    pub(crate) fn handler(self: &Arc<Self>, name: &str) -> Option<Handler> {
        if !is_function_name(name) {
            return None;
        }
        let symbol_name = CString::new(format!("{}{}", HANDLER_PREFIX, name)).ok()?;

        // SAFETY: exported handlers follow the documented ABI.
        let raw: RawHandler = unsafe {
            let symbol: Symbol<RawHandler> = self.library.get(symbol_name.as_bytes_with_nul()).ok()?;
            *symbol
        };

        let library = Arc::clone(self);
        let handler: Handler = Arc::new(move |params: &Value, context: &Value| library.call(raw, params, context));
        Some(handler)
    }

    fn call(&self, raw: RawHandler, params: &Value, context: &Value) -> std::result::Result<Value, HandlerError> {
        let params = CString::new(serde_json::to_string(params)?)?;
        let context = CString::new(serde_json::to_string(context)?)?;
        let mut out: *mut c_char = std::ptr::null_mut();

        // SAFETY: both inputs are valid NUL-terminated strings for the
        // duration of the call; `out` is written at most once by the callee.
        let status = unsafe { raw(params.as_ptr(), context.as_ptr(), &mut out) };

        let text = if out.is_null() {
            String::new()
        } else {
            // SAFETY: `out` was allocated by the library and is released
            // with its own deallocator after copying.
            unsafe {
                let text = CStr::from_ptr(out).to_string_lossy().into_owned();
                (self.free)(out);
                text
            }
        };

        if status != 0 {
            return Err(if text.is_empty() {
                format!("handler exited with status {}", status).into()
            } else {
                text.into()
            });
        }
        Ok(serde_json::from_str(&text)?)
    }
}

fn is_function_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
