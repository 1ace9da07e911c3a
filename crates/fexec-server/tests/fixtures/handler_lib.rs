//! Handler library used by the dynamic-library tests.
//!
//! Built with `rustc --crate-type cdylib` at test time.

use std::ffi::{c_char, CStr, CString};
use std::ptr;

unsafe fn reply(out: *mut *mut c_char, text: &str) {
    *out = match CString::new(text) {
        Ok(text) => text.into_raw(),
        Err(_) => ptr::null_mut(),
    };
}

unsafe fn input(text: *const c_char) -> String {
    CStr::from_ptr(text).to_string_lossy().into_owned()
}

/// Returns the parameters unchanged.
#[no_mangle]
pub unsafe extern "C" fn fexec_handler_echo(
    params: *const c_char,
    _context: *const c_char,
    out: *mut *mut c_char,
) -> i32 {
    reply(out, &input(params));
    0
}

/// Returns the execution context.
#[no_mangle]
pub unsafe extern "C" fn fexec_handler_context(
    _params: *const c_char,
    context: *const c_char,
    out: *mut *mut c_char,
) -> i32 {
    reply(out, &input(context));
    0
}

/// Fails with a message.
#[no_mangle]
pub unsafe extern "C" fn fexec_handler_fail(
    _params: *const c_char,
    _context: *const c_char,
    out: *mut *mut c_char,
) -> i32 {
    reply(out, "quota exceeded");
    3
}

/// Fails without a message.
#[no_mangle]
pub unsafe extern "C" fn fexec_handler_silent_fail(
    _params: *const c_char,
    _context: *const c_char,
    _out: *mut *mut c_char,
) -> i32 {
    7
}

/// Succeeds with text that is not JSON.
#[no_mangle]
pub unsafe extern "C" fn fexec_handler_garbled(
    _params: *const c_char,
    _context: *const c_char,
    out: *mut *mut c_char,
) -> i32 {
    reply(out, "{not json");
    0
}

/// Exported, but not a handler.
#[no_mangle]
pub unsafe extern "C" fn helper(
    _params: *const c_char,
    _context: *const c_char,
    _out: *mut *mut c_char,
) -> i32 {
    0
}

#[no_mangle]
pub unsafe extern "C" fn fexec_free(text: *mut c_char) {
    if !text.is_null() {
        drop(CString::from_raw(text));
    }
}
