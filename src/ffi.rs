use std::collections::BTreeMap;
use std::ffi::{c_char, CStr, CString};
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::render::UnresolvedPolicy;
use crate::scan::BraceStyle;
use crate::{discover_placeholders, render_document};

static LAST_ERROR: Lazy<Mutex<Option<CString>>> = Lazy::new(|| Mutex::new(None));

fn set_last_error(msg: &str) {
    let c = CString::new(msg).unwrap_or_else(|_| CString::new("error").expect("cstr"));
    let mut guard = LAST_ERROR.lock().unwrap_or_else(|e| e.into_inner());
    *guard = Some(c);
}

fn take_cstr(ptr: *const c_char, name: &str) -> Result<String, String> {
    if ptr.is_null() {
        return Err(format!("{name} is null"));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(|s| s.to_string())
        .map_err(|_| format!("{name} is not valid UTF-8"))
}

fn take_bytes<'a>(ptr: *const u8, len: usize) -> Result<&'a [u8], String> {
    if ptr.is_null() {
        return Err("docx_bytes is null".to_string());
    }
    Ok(unsafe { std::slice::from_raw_parts(ptr, len) })
}

fn grammar_from(ptr: *const c_char) -> Result<BraceStyle, String> {
    if ptr.is_null() {
        return Ok(BraceStyle::default());
    }
    let s = take_cstr(ptr, "grammar")?;
    BraceStyle::parse(&s).ok_or_else(|| format!("unknown grammar: {s}"))
}

/// Discover the tag names of a DOCX template held in `docx_bytes`.
///
/// On success writes a malloc'd JSON array of tag names (in the grammar's
/// documented order) to `out_json` and returns 0. Non-zero on failure (see
/// `dm_last_error_utf8()`). Free the string with `dm_string_free`.
#[no_mangle]
pub extern "C" fn dm_discover_tags_json(
    docx_bytes: *const u8,
    docx_len: usize,
    grammar: *const c_char,
    out_json: *mut *mut c_char,
) -> i32 {
    if out_json.is_null() {
        set_last_error("out_json is null");
        return 2;
    }
    let bytes = match take_bytes(docx_bytes, docx_len) {
        Ok(b) => b,
        Err(e) => {
            set_last_error(&e);
            return 2;
        }
    };
    let grammar = match grammar_from(grammar) {
        Ok(g) => g,
        Err(e) => {
            set_last_error(&e);
            return 3;
        }
    };
    let discovery = match discover_placeholders(bytes, grammar) {
        Ok(d) => d,
        Err(err) => {
            set_last_error(&format!("{err}"));
            return 10;
        }
    };
    let json = match serde_json::to_string(&discovery.tokens) {
        Ok(j) => j,
        Err(err) => {
            set_last_error(&format!("{err}"));
            return 11;
        }
    };
    match CString::new(json) {
        Ok(c) => {
            unsafe { *out_json = c.into_raw() };
            0
        }
        Err(_) => {
            set_last_error("tag list contains a NUL byte");
            11
        }
    }
}

/// Render a filled copy of the template. `values_json` is a JSON object of
/// tag name -> value; `strict` non-zero fails on unresolved tags.
///
/// On success writes a malloc'd buffer to `out_buf`/`out_len` and returns 0.
/// Free the buffer with `dm_buffer_free`.
#[no_mangle]
pub extern "C" fn dm_render_docx(
    docx_bytes: *const u8,
    docx_len: usize,
    grammar: *const c_char,
    values_json: *const c_char,
    strict: i32,
    out_buf: *mut *mut u8,
    out_len: *mut usize,
) -> i32 {
    if out_buf.is_null() || out_len.is_null() {
        set_last_error("out_buf/out_len is null");
        return 2;
    }
    let bytes = match take_bytes(docx_bytes, docx_len) {
        Ok(b) => b,
        Err(e) => {
            set_last_error(&e);
            return 2;
        }
    };
    let grammar = match grammar_from(grammar) {
        Ok(g) => g,
        Err(e) => {
            set_last_error(&e);
            return 3;
        }
    };
    let values: BTreeMap<String, String> = match take_cstr(values_json, "values_json")
        .and_then(|s| serde_json::from_str(&s).map_err(|e| format!("values_json: {e}")))
    {
        Ok(v) => v,
        Err(e) => {
            set_last_error(&e);
            return 4;
        }
    };
    let policy = if strict != 0 {
        UnresolvedPolicy::Strict
    } else {
        UnresolvedPolicy::Lenient
    };
    match render_document(bytes, grammar, &values, policy) {
        Ok(out) => {
            let boxed = out.into_boxed_slice();
            let len = boxed.len();
            unsafe {
                *out_buf = Box::into_raw(boxed).cast::<u8>();
                *out_len = len;
            }
            0
        }
        Err(err) => {
            set_last_error(&format!("{err}"));
            10
        }
    }
}

/// Returns the last error message as a UTF-8 C string pointer (or null if
/// none). The pointer is valid until the next failing call.
#[no_mangle]
pub extern "C" fn dm_last_error_utf8() -> *const c_char {
    let guard = LAST_ERROR.lock().unwrap_or_else(|e| e.into_inner());
    match guard.as_ref() {
        Some(s) => s.as_ptr(),
        None => std::ptr::null(),
    }
}

/// Frees a string returned by `dm_discover_tags_json`.
#[no_mangle]
pub extern "C" fn dm_string_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

/// Frees a buffer returned by `dm_render_docx`.
#[no_mangle]
pub extern "C" fn dm_buffer_free(ptr: *mut u8, len: usize) {
    if !ptr.is_null() {
        drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len)) });
    }
}
