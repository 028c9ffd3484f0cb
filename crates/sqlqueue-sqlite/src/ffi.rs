//! Low-level SQLite bindings.
//!
//! The raw declarations come from `libsqlite3-sys`; this module narrows them
//! to the subset the driver uses and adds a few safe helpers on top.

#![allow(non_camel_case_types)]

use std::ffi::{CStr, c_int};

pub use libsqlite3_sys::{
    sqlite3, sqlite3_destructor_type, sqlite3_stmt,
    // connection management
    sqlite3_busy_timeout, sqlite3_db_readonly, sqlite3_get_autocommit,
    sqlite3_open_v2, sqlite3_threadsafe,
    // errors
    sqlite3_errmsg, sqlite3_errstr,
    // statements
    sqlite3_bind_blob, sqlite3_bind_double, sqlite3_bind_int, sqlite3_bind_int64,
    sqlite3_bind_null, sqlite3_bind_parameter_count, sqlite3_bind_parameter_index,
    sqlite3_bind_text, sqlite3_clear_bindings, sqlite3_column_blob, sqlite3_column_bytes,
    sqlite3_column_count, sqlite3_column_double, sqlite3_column_int64, sqlite3_column_name,
    sqlite3_column_text, sqlite3_column_type, sqlite3_finalize, sqlite3_prepare_v2,
    sqlite3_reset, sqlite3_step,
    // execution and metadata
    sqlite3_changes, sqlite3_exec, sqlite3_free, sqlite3_last_insert_rowid,
    sqlite3_total_changes,
    // tracing
    sqlite3_expanded_sql, sqlite3_trace_v2,
    // version
    sqlite3_libversion, sqlite3_libversion_number,
};

pub use libsqlite3_sys::{
    SQLITE_ABORT, SQLITE_AUTH, SQLITE_BLOB, SQLITE_BUSY, SQLITE_CANTOPEN, SQLITE_CONSTRAINT,
    SQLITE_DONE, SQLITE_ERROR, SQLITE_FLOAT, SQLITE_INTEGER, SQLITE_INTERRUPT, SQLITE_LOCKED,
    SQLITE_MISUSE, SQLITE_NOTFOUND, SQLITE_OK, SQLITE_OPEN_CREATE,
    SQLITE_OPEN_FULLMUTEX, SQLITE_OPEN_NOMUTEX, SQLITE_OPEN_PRIVATECACHE, SQLITE_OPEN_READONLY,
    SQLITE_OPEN_READWRITE, SQLITE_OPEN_SHAREDCACHE, SQLITE_OPEN_URI, SQLITE_PERM,
    SQLITE_RANGE, SQLITE_READONLY, SQLITE_ROW, SQLITE_TEXT, SQLITE_TOOBIG, SQLITE_TRACE_STMT,
};

// Not in the generated bindings; the bundled amalgamation exports it and
// libsqlite3-sys links that library.
unsafe extern "C" {
    pub fn sqlite3_close_v2(db: *mut sqlite3) -> c_int;
}

/// Destructor telling SQLite to copy bound text/blob data immediately.
#[inline]
pub fn transient() -> sqlite3_destructor_type {
    libsqlite3_sys::SQLITE_TRANSIENT()
}

/// Get the SQLite library version as a string.
pub fn version() -> &'static str {
    // SAFETY: sqlite3_libversion returns a static string
    unsafe {
        let ptr = sqlite3_libversion();
        CStr::from_ptr(ptr).to_str().unwrap_or("unknown")
    }
}

/// Get the SQLite library version as a number.
pub fn version_number() -> i32 {
    // SAFETY: sqlite3_libversion_number is always safe to call
    unsafe { sqlite3_libversion_number() }
}

/// Whether the linked library was compiled with mutexing support.
///
/// This is a property of the whole engine, not of any one connection.
pub fn threadsafe() -> bool {
    // SAFETY: sqlite3_threadsafe reads a compile-time constant
    unsafe { sqlite3_threadsafe() != 0 }
}

/// Convert an SQLite result code to a human-readable string.
pub fn error_string(code: c_int) -> &'static str {
    // SAFETY: sqlite3_errstr returns a static string for every input
    unsafe {
        let ptr = sqlite3_errstr(code);
        if ptr.is_null() {
            return "unknown error";
        }
        CStr::from_ptr(ptr).to_str().unwrap_or("unknown error")
    }
}

/// Read the most recent error message of a connection.
///
/// # Safety
/// `db` must be a valid, open connection handle.
pub unsafe fn errmsg(db: *mut sqlite3) -> String {
    let ptr = unsafe { sqlite3_errmsg(db) };
    if ptr.is_null() {
        return "unknown error".to_string();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}
