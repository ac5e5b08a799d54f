//! C ABI exported by test assemblies.
//!
//! An assembly is a `cdylib` exporting the symbols below. Buffers handed
//! to the host are allocated with `libc::malloc` and released by the host
//! with `libc::free`.

use std::ffi::c_void;

use serde::{Deserialize, Serialize};

/// `fn(out_ptr, out_len) -> i32` writing the JSON manifest.
pub const MANIFEST_SYMBOL: &str = "specrun_manifest";

/// `fn(name_ptr, name_len, sink, sink_data) -> i32` running one context.
pub const RUN_CONTEXT_SYMBOL: &str = "specrun_run_context";

/// Optional `fn() -> i32` called once before the first context.
pub const START_RUN_SYMBOL: &str = "specrun_start_run";

/// Optional `fn() -> i32` called once after the last context.
pub const END_RUN_SYMBOL: &str = "specrun_end_run";

/// Manifest export.
pub type ManifestFn = unsafe extern "C" fn(*mut *mut u8, *mut usize) -> i32;

/// Callback receiving one JSON-encoded [`SpecEvent`].
pub type EventSinkFn = unsafe extern "C" fn(*mut c_void, *const u8, usize);

/// Context runner export.
pub type RunContextFn = unsafe extern "C" fn(
    *const u8, usize,  // context name (UTF-8)
    EventSinkFn,
    *mut c_void,       // sink data
) -> i32;

/// Run hook export.
pub type RunHookFn = unsafe extern "C" fn() -> i32;

/// Result code returned by assembly exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ReturnCode {
    /// Call completed
    Success = 0,
    /// The assembly does not define the requested context
    ContextNotFound = -1,
    /// The context failed outside any specification
    ContextError = -2,
    /// The call panicked
    Panic = -4,
}

impl From<i32> for ReturnCode {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Success,
            -1 => Self::ContextNotFound,
            -2 => Self::ContextError,
            -4 => Self::Panic,
            _ => Self::ContextError, // Unknown codes treated as context errors
        }
    }
}

/// Progress event emitted by an assembly while running a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SpecEvent {
    ContextStart {
        context: String,
    },
    SpecificationStart {
        context: String,
        specification: String,
    },
    SpecificationEnd {
        context: String,
        specification: String,
        result: SpecResult,
    },
    ContextEnd {
        context: String,
    },
    FatalError {
        message: String,
    },
}

/// Status of a finished specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecStatus {
    Passed,
    Failed,
    NotImplemented,
    Ignored,
}

/// Result of a finished specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecResult {
    pub status: SpecStatus,
    #[serde(default)]
    pub message: Option<String>,
}

impl SpecResult {
    pub fn passed() -> Self {
        Self {
            status: SpecStatus::Passed,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: SpecStatus::Failed,
            message: Some(message.into()),
        }
    }

    pub fn not_implemented() -> Self {
        Self {
            status: SpecStatus::NotImplemented,
            message: None,
        }
    }

    pub fn ignored() -> Self {
        Self {
            status: SpecStatus::Ignored,
            message: None,
        }
    }
}

/// Copy bytes into a `libc::malloc` buffer for handing to the host.
///
/// Helper for assembly authors implementing [`MANIFEST_SYMBOL`]. Returns a
/// null pointer if the allocation fails.
pub fn export_bytes(bytes: &[u8]) -> (*mut u8, usize) {
    if bytes.is_empty() {
        return (std::ptr::null_mut(), 0);
    }
    // SAFETY: the buffer is sized to `bytes` and freed by the host with libc::free.
    unsafe {
        let ptr = libc::malloc(bytes.len()) as *mut u8;
        if ptr.is_null() {
            return (ptr, 0);
        }
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
        (ptr, bytes.len())
    }
}

/// RAII guard for memory allocated by an assembly.
/// Ensures libc::free is called even if processing the buffer fails.
pub(crate) struct ExportedBuffer {
    ptr: *mut u8,
    len: usize,
}

impl ExportedBuffer {
    /// # Safety
    /// `ptr` must be null or point to `len` bytes allocated with `libc::malloc`.
    pub(crate) unsafe fn new(ptr: *mut u8, len: usize) -> Self {
        Self { ptr, len }
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        if self.ptr.is_null() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl Drop for ExportedBuffer {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::free(self.ptr as *mut libc::c_void);
            }
        }
    }
}
