//! Test assembly exporting the specrun C ABI.
//!
//! Built as a cdylib by the native assembly tests. Every export appends a
//! line to the file named by `SPECRUN_FIXTURE_LOG` at compile time.

use std::ffi::c_void;
use std::fs::OpenOptions;
use std::io::Write;

type EventSink = unsafe extern "C" fn(*mut c_void, *const u8, usize);

extern "C" {
    fn malloc(size: usize) -> *mut u8;
}

const MANIFEST: &str = r#"{
    "name": "accounts_specs",
    "runner_version": "1.2.0",
    "contexts": [
        { "name": "accounts::when_transferring",
          "specifications": ["should_debit", "should_credit"] },
        { "name": "accounts::when_overdrawn", "tags": ["slow"] },
        { "name": "accounts::when_closed" },
        { "name": "accounts::when_frozen" }
    ]
}"#;

fn log(line: &str) {
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(env!("SPECRUN_FIXTURE_LOG"))
    {
        let _ = writeln!(file, "{}", line);
    }
}

unsafe fn emit(sink: EventSink, data: *mut c_void, event: &str) {
    sink(data, event.as_ptr(), event.len());
}

#[no_mangle]
pub unsafe extern "C" fn specrun_manifest(out_ptr: *mut *mut u8, out_len: *mut usize) -> i32 {
    log("manifest");
    let bytes = MANIFEST.as_bytes();
    let ptr = malloc(bytes.len());
    if ptr.is_null() {
        return -2;
    }
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
    *out_ptr = ptr;
    *out_len = bytes.len();
    0
}

#[no_mangle]
pub extern "C" fn specrun_start_run() -> i32 {
    log("start_run");
    0
}

#[no_mangle]
pub extern "C" fn specrun_end_run() -> i32 {
    log("end_run");
    0
}

#[no_mangle]
pub unsafe extern "C" fn specrun_run_context(
    name_ptr: *const u8,
    name_len: usize,
    sink: EventSink,
    data: *mut c_void,
) -> i32 {
    let name = std::str::from_utf8(std::slice::from_raw_parts(name_ptr, name_len)).unwrap_or("");
    log(&format!("run:{}", name));

    match name {
        "accounts::when_transferring" => {
            emit(sink, data, r#"{"event":"context_start","context":"accounts::when_transferring"}"#);
            emit(
                sink,
                data,
                r#"{"event":"specification_start","context":"accounts::when_transferring","specification":"should_debit"}"#,
            );
            emit(
                sink,
                data,
                r#"{"event":"specification_end","context":"accounts::when_transferring","specification":"should_debit","result":{"status":"passed"}}"#,
            );
            emit(
                sink,
                data,
                r#"{"event":"specification_start","context":"accounts::when_transferring","specification":"should_credit"}"#,
            );
            emit(
                sink,
                data,
                r#"{"event":"specification_end","context":"accounts::when_transferring","specification":"should_credit","result":{"status":"failed","message":"expected 100, got 90"}}"#,
            );
            emit(sink, data, "not an event");
            emit(sink, data, r#"{"event":"context_end","context":"accounts::when_transferring"}"#);
            0
        }
        "accounts::when_overdrawn" => -2,
        "accounts::when_frozen" => -4,
        _ => -1,
    }
}
