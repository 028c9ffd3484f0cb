//! Mapping from SQLite result codes to [`sqlqueue_core::Error`].
//!
//! Errors carry the primary result code (`rc & 0xff`); extended codes only
//! refine the message SQLite already reports.

use crate::ffi;
use sqlqueue_core::{
    ConnectionError, ConnectionErrorKind, Error, QueryError, QueryErrorKind, Result,
};
use std::ffi::c_int;

/// Convert a native result code into a structured error.
///
/// Returns `None` for the success codes (`SQLITE_OK`, `SQLITE_ROW`,
/// `SQLITE_DONE`). For any other code the connection's current error message
/// is captured.
///
/// # Safety
/// `db` must be a valid connection handle or null. When null only the
/// generic description of `rc` is available.
pub unsafe fn error_for_code(db: *mut ffi::sqlite3, rc: c_int, sql: Option<&str>) -> Option<Error> {
    if matches!(rc, ffi::SQLITE_OK | ffi::SQLITE_ROW | ffi::SQLITE_DONE) {
        return None;
    }
    let message = if db.is_null() {
        ffi::error_string(rc).to_string()
    } else {
        // SAFETY: db is a valid handle per the caller's contract
        unsafe { ffi::errmsg(db) }
    };
    Some(query_error(rc, sql, message))
}

/// `Ok(())` for success codes, otherwise the mapped error.
///
/// # Safety
/// Same contract as [`error_for_code`].
pub unsafe fn check(db: *mut ffi::sqlite3, rc: c_int, sql: Option<&str>) -> Result<()> {
    // SAFETY: forwarded contract
    match unsafe { error_for_code(db, rc, sql) } {
        None => Ok(()),
        Some(err) => Err(err),
    }
}

pub(crate) fn query_error(rc: c_int, sql: Option<&str>, message: String) -> Error {
    Error::Query(QueryError {
        kind: kind_for_code(rc),
        code: Some(primary_code(rc)),
        sql: sql.map(str::to_string),
        message,
    })
}

pub(crate) fn open_error(rc: c_int, message: String) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Connect,
        code: Some(primary_code(rc)),
        message,
    })
}

fn primary_code(rc: c_int) -> c_int {
    rc & 0xff
}

pub(crate) fn closed_error() -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Closed,
        code: None,
        message: "connection is closed".to_string(),
    })
}

pub(crate) fn syntax_error(sql: &str, message: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        code: None,
        sql: Some(sql.to_string()),
        message: message.to_string(),
    })
}

/// Classify a (possibly extended) result code by its primary code.
pub fn kind_for_code(rc: c_int) -> QueryErrorKind {
    match rc & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH | ffi::SQLITE_READONLY => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_TOOBIG => QueryErrorKind::DataTruncation,
        ffi::SQLITE_INTERRUPT | ffi::SQLITE_ABORT => QueryErrorKind::Cancelled,
        ffi::SQLITE_RANGE => QueryErrorKind::Binding,
        _ => QueryErrorKind::Database,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn success_codes_map_to_none() {
        for rc in [ffi::SQLITE_OK, ffi::SQLITE_ROW, ffi::SQLITE_DONE] {
            assert!(unsafe { error_for_code(ptr::null_mut(), rc, None) }.is_none());
        }
    }

    #[test]
    fn failure_codes_carry_code_and_sql() {
        let err = unsafe { error_for_code(ptr::null_mut(), ffi::SQLITE_BUSY, Some("COMMIT")) }
            .expect("busy is an error");
        assert!(err.is_retryable());
        assert_eq!(err.code(), Some(ffi::SQLITE_BUSY));
        assert_eq!(err.sql(), Some("COMMIT"));
        assert!(err.to_string().contains("database is locked"));
    }

    #[test]
    fn extended_codes_use_primary_kind() {
        // SQLITE_CONSTRAINT_UNIQUE
        assert_eq!(kind_for_code(2067), QueryErrorKind::Constraint);
        assert_eq!(kind_for_code(ffi::SQLITE_READONLY), QueryErrorKind::Permission);
        assert_eq!(kind_for_code(ffi::SQLITE_ERROR), QueryErrorKind::Database);
    }

    #[test]
    fn extended_codes_are_reported_as_primary() {
        // SQLITE_CONSTRAINT_UNIQUE
        let err = query_error(2067, None, "UNIQUE constraint failed".to_string());
        assert_eq!(err.code(), Some(ffi::SQLITE_CONSTRAINT));

        // SQLITE_CANTOPEN_ISDIR
        let err = open_error(526, "unable to open database file".to_string());
        assert_eq!(err.code(), Some(ffi::SQLITE_CANTOPEN));
    }

    #[test]
    fn check_passes_success_through() {
        assert!(unsafe { check(ptr::null_mut(), ffi::SQLITE_OK, None) }.is_ok());
        assert!(unsafe { check(ptr::null_mut(), ffi::SQLITE_MISUSE, None) }.is_err());
    }
}
