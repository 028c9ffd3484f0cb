//! Statement tracing through `sqlite3_trace_v2`.

use crate::error::check;
use crate::ffi;
use sqlqueue_core::Result;
use std::ffi::{CStr, c_char, c_int, c_uint, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

/// Callback invoked with the SQL text of every statement as it starts running.
pub type TraceCallback = Box<dyn FnMut(&str) + Send>;

/// Install `callback` on `db`, or remove the current one when `None`.
///
/// The returned box must outlive its registration: keep it until the next
/// call replaces it, or until the connection is closed.
///
/// # Safety
/// `db` must be a valid, open connection handle.
pub(crate) unsafe fn register(
    db: *mut ffi::sqlite3,
    callback: Option<TraceCallback>,
) -> Result<Option<Box<TraceCallback>>> {
    match callback {
        Some(callback) => {
            let mut boxed: Box<TraceCallback> = Box::new(callback);
            let ctx = ptr::from_mut::<TraceCallback>(&mut boxed).cast::<c_void>();
            // SAFETY: db is open; ctx points into a heap allocation the caller keeps alive
            let rc = unsafe {
                ffi::sqlite3_trace_v2(
                    db,
                    ffi::SQLITE_TRACE_STMT as c_uint,
                    Some(trace_trampoline),
                    ctx,
                )
            };
            // SAFETY: db is open
            unsafe { check(db, rc, None)? };
            Ok(Some(boxed))
        }
        None => {
            // SAFETY: db is open; a zero mask removes the callback
            let rc = unsafe { ffi::sqlite3_trace_v2(db, 0, None, ptr::null_mut()) };
            // SAFETY: db is open
            unsafe { check(db, rc, None)? };
            Ok(None)
        }
    }
}

unsafe extern "C" fn trace_trampoline(
    mask: c_uint,
    ctx: *mut c_void,
    p: *mut c_void,
    x: *mut c_void,
) -> c_int {
    if mask != ffi::SQLITE_TRACE_STMT as c_uint || ctx.is_null() {
        return 0;
    }
    // SAFETY: for SQLITE_TRACE_STMT, p is the statement and x its unexpanded SQL
    let sql = unsafe { statement_sql(p.cast(), x.cast()) };
    let Some(sql) = sql else {
        return 0;
    };
    // SAFETY: ctx was registered by `register` and is kept alive by the connection
    let callback = unsafe { &mut *ctx.cast::<TraceCallback>() };
    // Unwinding across the FFI boundary is undefined.
    if panic::catch_unwind(AssertUnwindSafe(|| callback(&sql))).is_err() {
        tracing::error!("Trace callback panicked");
    }
    0
}

/// Prefer the expanded SQL (bound values substituted) over the raw text.
///
/// Trigger steps arrive as a `--` comment naming the trigger; those pass
/// through verbatim, since expanding `stmt` would repeat the outer statement.
unsafe fn statement_sql(stmt: *mut ffi::sqlite3_stmt, unexpanded: *const c_char) -> Option<String> {
    // SAFETY: SQLite passes a NUL-terminated string valid for this call
    let raw = (!unexpanded.is_null()).then(|| unsafe { CStr::from_ptr(unexpanded) });
    if let Some(raw) = raw {
        if raw.to_bytes().starts_with(b"--") {
            return Some(raw.to_string_lossy().into_owned());
        }
    }
    if !stmt.is_null() {
        // SAFETY: stmt is the statement currently being traced
        let expanded = unsafe { ffi::sqlite3_expanded_sql(stmt) };
        if !expanded.is_null() {
            // SAFETY: expanded is a NUL-terminated string we must free
            let sql = unsafe { CStr::from_ptr(expanded) }.to_string_lossy().into_owned();
            unsafe { ffi::sqlite3_free(expanded.cast()) };
            return Some(sql);
        }
    }
    raw.map(|raw| raw.to_string_lossy().into_owned())
}
