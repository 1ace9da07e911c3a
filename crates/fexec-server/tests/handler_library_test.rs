//! Handlers served from a real dynamic library.
//!
//! The library in `tests/fixtures/handler_lib.rs` is compiled with `rustc`
//! into a fresh search directory for each test.

use fexec_common::InvocationRequest;
use fexec_server::registry::{DylibLoader, HandlerRegistry, Module, ModuleLoader};
use fexec_server::Executor;
use serde_json::json;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

const MODULE: &str = "pkg.handlers";

/// Builds the fixture library as module `pkg.handlers` inside a new directory.
fn build_library() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let target = DylibLoader::library_path(dir.path(), MODULE);
    std::fs::create_dir_all(target.parent().unwrap()).unwrap();

    let source = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/handler_lib.rs");
    let rustc = std::env::var_os("RUSTC").unwrap_or_else(|| "rustc".into());
    let status = Command::new(rustc)
        .args(["--crate-type", "cdylib", "--edition", "2021", "-o"])
        .arg(&target)
        .arg(&source)
        .status()
        .unwrap();
    assert!(status.success(), "failed to build {}", source.display());
    dir
}

fn load_module(dir: &TempDir) -> Module {
    DylibLoader::new()
        .load(MODULE, &[dir.path().to_path_buf()])
        .unwrap()
        .expect("library should be found")
}

#[test]
fn test_library_handlers_return_results_and_errors() {
    let dir = build_library();
    let module = load_module(&dir);
    let context = json!({"region": "eu-west"});

    let echo = module.function("echo").unwrap();
    let params = json!({"n": 17, "tags": ["a", "b"]});
    assert_eq!(echo(&params, &context).unwrap(), params);

    let from_context = module.function("context").unwrap();
    assert_eq!(from_context(&json!({}), &context).unwrap(), context);

    // Non-zero status: the message in `*out` becomes the error.
    let fail = module.function("fail").unwrap();
    assert_eq!(fail(&json!({}), &context).unwrap_err().to_string(), "quota exceeded");

    let silent = module.function("silent_fail").unwrap();
    assert_eq!(
        silent(&json!({}), &context).unwrap_err().to_string(),
        "handler exited with status 7"
    );

    let garbled = module.function("garbled").unwrap();
    assert!(garbled(&json!({}), &context).is_err());
}

#[test]
fn test_only_prefixed_exports_are_handlers() {
    let dir = build_library();
    let module = load_module(&dir);

    for name in ["helper", "fexec_free", "free", "malloc", "fexec_handler_echo", "", "echo\0"] {
        assert!(module.function(name).is_none(), "{:?} resolved as a handler", name);
    }
}

#[test]
fn test_executor_survives_non_handler_names() {
    let dir = build_library();
    let executor = Executor::new(Arc::new(HandlerRegistry::standard()), json!({}));

    let request = InvocationRequest::new("pkg.handlers.echo", json!({"ok": true}))
        .with_handler_dir(dir.path());
    let response = executor.invoke_blocking(&request);
    assert!(response.success);
    assert_eq!(response.result_value().unwrap(), Some(json!({"ok": true})));

    for handler in ["pkg.handlers.free", "pkg.handlers.fexec_free", "pkg.handlers.helper"] {
        let response = executor.invoke_blocking(&InvocationRequest::new(handler, json!({})));
        assert!(!response.success, "{} should not run", handler);
        assert!(response.result.is_none());
    }

    let response = executor.invoke_blocking(&InvocationRequest::new("pkg.handlers.fail", json!({})));
    assert!(!response.success);

    // Still serving after the rejected names.
    let response = executor.invoke_blocking(&InvocationRequest::new("pkg.handlers.echo", json!([1])));
    assert!(response.success);
    assert_eq!(response.result_value().unwrap(), Some(json!([1])));
}
