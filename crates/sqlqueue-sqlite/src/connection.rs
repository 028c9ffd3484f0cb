//! SQLite connection implementation.
//!
//! [`SqliteConnection`] exclusively owns one native handle. It is `Send` so it
//! can be moved onto a queue worker, but not `Sync`: every call goes through
//! `&self` on a single thread at a time.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::result_large_err)] // Error type is defined in sqlqueue-core
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers

use crate::config::{SqliteConfig, TransactionKind};
use crate::error::{closed_error, open_error, query_error, syntax_error};
use crate::ffi;
use crate::location::DatabaseLocation;
use crate::statement::Statement;
use crate::trace::{self, TraceCallback};
use sqlqueue_core::{
    ConnectionError, ConnectionErrorKind, Error, FromValue, Result, Row, TransactionError,
    TransactionErrorKind, Value, checked_ident, quote_literal,
};
use std::ffi::{CStr, CString, c_int};
use std::ptr;

/// A connection to a SQLite database.
pub struct SqliteConnection {
    /// Null once the connection has been closed.
    db: *mut ffi::sqlite3,
    location: DatabaseLocation,
    read_only: bool,
    /// Keeps the registered trace callback alive while the engine points at it.
    trace: Option<Box<TraceCallback>>,
}

// SAFETY: the handle is owned exclusively and only used from one thread at a
// time; the type is deliberately not Sync.
unsafe impl Send for SqliteConnection {}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.location.connection_string()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                code: None,
                message: "Invalid path: contains null byte".to_string(),
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is a partially opened handle that must still be released
                unsafe {
                    let msg = ffi::errmsg(db);
                    ffi::sqlite3_close_v2(db);
                    msg
                }
            };
            tracing::debug!(location = %config.location, code = rc, "Failed to open SQLite database");
            return Err(open_error(rc, format!("Failed to open database: {}", msg)));
        }

        if config.busy_timeout_ms > 0 {
            let ms = c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX);
            // SAFETY: db is valid
            unsafe { ffi::sqlite3_busy_timeout(db, ms) };
        }

        // SAFETY: db is valid; "main" always names the primary schema
        let read_only = unsafe { ffi::sqlite3_db_readonly(db, c"main".as_ptr()) } == 1;

        tracing::debug!(location = %config.location, read_only, "Opened SQLite database");

        Ok(Self {
            db,
            location: config.location.clone(),
            read_only,
            trace: None,
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database, creating it if needed.
    pub fn open_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Open a database at `location` with default flags.
    pub fn open_location(location: DatabaseLocation) -> Result<Self> {
        Self::open(&SqliteConfig::new(location))
    }

    /// Where this connection's main database lives.
    pub fn location(&self) -> &DatabaseLocation {
        &self.location
    }

    pub(crate) fn handle(&self) -> Result<*mut ffi::sqlite3> {
        if self.db.is_null() {
            Err(closed_error())
        } else {
            Ok(self.db)
        }
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.db.is_null()
    }

    /// Execute one or more statements that take no parameters and return no rows.
    pub fn execute(&self, sql: &str) -> Result<()> {
        let db = self.handle()?;
        let c_sql = CString::new(sql).map_err(|_| syntax_error(sql, "SQL contains null byte"))?;

        tracing::trace!(sql = %sql, "Executing SQL");

        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };

        if rc != ffi::SQLITE_OK {
            let msg = if errmsg.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: errmsg was allocated by sqlite3_exec and is freed exactly once
                unsafe {
                    let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    msg
                }
            };
            return Err(query_error(rc, Some(sql), msg));
        }

        Ok(())
    }

    /// Compile `sql` into a reusable [`Statement`].
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_>> {
        Statement::prepare(self, sql)
    }

    /// Run a statement with positional parameters, discarding any rows.
    pub fn run(&self, sql: &str, params: &[Value]) -> Result<()> {
        self.prepare(sql)?.bind(params)?.run()
    }

    /// Run a statement with named parameters, discarding any rows.
    pub fn run_named(&self, sql: &str, params: &[(&str, Value)]) -> Result<()> {
        self.prepare(sql)?.bind_named(params)?.run()
    }

    /// First row of a query; fails when there is none.
    pub fn fetch(&self, sql: &str, params: &[Value]) -> Result<Row> {
        self.prepare(sql)?.bind(params)?.fetch()
    }

    pub fn fetch_named(&self, sql: &str, params: &[(&str, Value)]) -> Result<Row> {
        self.prepare(sql)?.bind_named(params)?.fetch()
    }

    /// All rows of a query.
    pub fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.prepare(sql)?.bind(params)?.fetch_all()
    }

    pub fn fetch_all_named(&self, sql: &str, params: &[(&str, Value)]) -> Result<Vec<Row>> {
        self.prepare(sql)?.bind_named(params)?.fetch_all()
    }

    /// Column 0 of the first row, which must exist and be non-NULL unless `T`
    /// is an `Option`.
    pub fn query<T: FromValue>(&self, sql: &str, params: &[Value]) -> Result<T> {
        self.prepare(sql)?.bind(params)?.query()
    }

    pub fn query_named<T: FromValue>(&self, sql: &str, params: &[(&str, Value)]) -> Result<T> {
        self.prepare(sql)?.bind_named(params)?.query()
    }

    /// Column 0 of the first row; `None` when there is no row or it is NULL.
    pub fn query_optional<T: FromValue>(&self, sql: &str, params: &[Value]) -> Result<Option<T>> {
        self.prepare(sql)?.bind(params)?.query_optional()
    }

    pub fn query_optional_named<T: FromValue>(
        &self,
        sql: &str,
        params: &[(&str, Value)],
    ) -> Result<Option<T>> {
        self.prepare(sql)?.bind_named(params)?.query_optional()
    }

    /// Run `body` inside `BEGIN ... COMMIT`.
    ///
    /// When `body` or the commit fails the transaction is rolled back and the
    /// original error returned. If the rollback fails too, the result is an
    /// [`Error::Transaction`] carrying both errors. A panic in `body` rolls
    /// back before unwinding continues.
    #[tracing::instrument(level = "debug", skip(self, body))]
    pub fn transaction<T, F>(&self, kind: TransactionKind, body: F) -> Result<T>
    where
        F: FnOnce(&SqliteConnection) -> Result<T>,
    {
        self.execute(&kind.begin_sql())?;
        let guard = RollbackGuard::new(
            self,
            TransactionErrorKind::RollbackFailed,
            vec!["ROLLBACK TRANSACTION".to_string()],
        );

        match body(self).and_then(|value| self.execute("COMMIT TRANSACTION").map(|()| value)) {
            Ok(value) => {
                guard.disarm();
                tracing::debug!("Transaction committed");
                Ok(value)
            }
            Err(err) => Err(guard.rollback(err)),
        }
    }

    /// Run `body` inside a named savepoint.
    ///
    /// On success the savepoint is released. On failure it is rolled back to
    /// and then released, so neither the savepoint nor a transaction it
    /// implicitly opened is left behind.
    #[tracing::instrument(level = "debug", skip(self, body))]
    pub fn savepoint<T, F>(&self, name: &str, body: F) -> Result<T>
    where
        F: FnOnce(&SqliteConnection) -> Result<T>,
    {
        let quoted = checked_ident(name)?;
        self.execute(&format!("SAVEPOINT {quoted}"))?;
        let release = format!("RELEASE SAVEPOINT {quoted}");
        let guard = RollbackGuard::new(
            self,
            TransactionErrorKind::SavepointRollbackFailed,
            vec![format!("ROLLBACK TO SAVEPOINT {quoted}"), release.clone()],
        );

        match body(self).and_then(|value| self.execute(&release).map(|()| value)) {
            Ok(value) => {
                guard.disarm();
                Ok(value)
            }
            Err(err) => Err(guard.rollback(err)),
        }
    }

    /// Attach another database under schema `name`.
    pub fn attach(&self, location: &DatabaseLocation, name: &str) -> Result<()> {
        let schema = checked_ident(name)?;
        let path = quote_literal(&location.connection_string());
        self.execute(&format!("ATTACH DATABASE {path} AS {schema}"))?;
        tracing::debug!(schema = %name, location = %location, "Attached database");
        Ok(())
    }

    /// Detach the database attached as `name`.
    pub fn detach(&self, name: &str) -> Result<()> {
        let schema = checked_ident(name)?;
        self.execute(&format!("DETACH DATABASE {schema}"))
    }

    /// Install a statement trace callback, or remove it with `None`.
    ///
    /// The callback receives each statement's SQL, with bound parameters
    /// expanded, as the statement starts running.
    pub fn trace<F>(&mut self, callback: Option<F>) -> Result<()>
    where
        F: FnMut(&str) + Send + 'static,
    {
        let db = self.handle()?;
        let callback = callback.map(|f| Box::new(f) as TraceCallback);
        // SAFETY: db is open; the previous callback stays alive until the new
        // registration has replaced it in the engine
        let installed = unsafe { trace::register(db, callback)? };
        let previous = std::mem::replace(&mut self.trace, installed);
        drop(previous);
        Ok(())
    }

    /// Rowid of the most recent successful insert; 0 when closed.
    pub fn last_insert_rowid(&self) -> i64 {
        match self.handle() {
            // SAFETY: db is valid
            Ok(db) => unsafe { ffi::sqlite3_last_insert_rowid(db) },
            Err(_) => 0,
        }
    }

    /// Rows changed by the most recent statement; 0 when closed.
    pub fn changes(&self) -> u64 {
        match self.handle() {
            // SAFETY: db is valid
            Ok(db) => unsafe { ffi::sqlite3_changes(db) }.max(0) as u64,
            Err(_) => 0,
        }
    }

    /// Rows changed since the connection was opened; 0 when closed.
    pub fn total_changes(&self) -> u64 {
        match self.handle() {
            // SAFETY: db is valid
            Ok(db) => unsafe { ffi::sqlite3_total_changes(db) }.max(0) as u64,
            Err(_) => 0,
        }
    }

    /// Whether the main database was opened read-only.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether no transaction is open.
    pub fn is_autocommit(&self) -> bool {
        match self.handle() {
            // SAFETY: db is valid
            Ok(db) => (unsafe { ffi::sqlite3_get_autocommit(db) }) != 0,
            Err(_) => true,
        }
    }

    /// Whether the linked SQLite library supports multi-threaded use.
    pub fn thread_safe() -> bool {
        ffi::threadsafe()
    }

    /// Change how long a locked database is retried before failing with busy.
    pub fn set_busy_timeout(&self, ms: u32) -> Result<()> {
        let db = self.handle()?;
        let ms = c_int::try_from(ms).unwrap_or(c_int::MAX);
        // SAFETY: db is valid
        let rc = unsafe { ffi::sqlite3_busy_timeout(db, ms) };
        // SAFETY: db is valid
        unsafe { crate::error::check(db, rc, None) }
    }

    /// Release the native handle. Later calls are no-ops.
    pub fn close(&mut self) -> Result<()> {
        if self.db.is_null() {
            return Ok(());
        }
        let db = std::mem::replace(&mut self.db, ptr::null_mut());
        // SAFETY: db was valid and is released exactly once; no statements can
        // be alive because they borrow self
        let rc = unsafe { ffi::sqlite3_close_v2(db) };
        self.trace = None;
        if rc != ffi::SQLITE_OK {
            tracing::warn!(code = rc, location = %self.location, "SQLite close reported an error");
            return Err(query_error(rc, None, ffi::error_string(rc).to_string()));
        }
        tracing::debug!(location = %self.location, "Closed SQLite database");
        Ok(())
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("location", &self.location)
            .field("read_only", &self.read_only)
            .field("closed", &self.db.is_null())
            .finish_non_exhaustive()
    }
}

/// Issues the compensating statements for a transaction or savepoint.
///
/// Dropped while armed (the body panicked) it rolls back on the way out.
struct RollbackGuard<'conn> {
    conn: &'conn SqliteConnection,
    kind: TransactionErrorKind,
    statements: Vec<String>,
    armed: bool,
}

impl<'conn> RollbackGuard<'conn> {
    fn new(conn: &'conn SqliteConnection, kind: TransactionErrorKind, statements: Vec<String>) -> Self {
        Self {
            conn,
            kind,
            statements,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }

    /// Roll back after `cause`, returning the error the caller should see.
    fn rollback(mut self, cause: Error) -> Error {
        self.armed = false;
        match self.compensate() {
            Ok(()) => cause,
            Err(rollback) => {
                tracing::warn!(error = %rollback, cause = %cause, "Rollback failed");
                Error::Transaction(TransactionError {
                    kind: self.kind,
                    message: "rollback after a failed unit of work did not complete".to_string(),
                    cause: Box::new(cause),
                    rollback: Box::new(rollback),
                })
            }
        }
    }

    fn compensate(&self) -> Result<()> {
        // The engine may already have rolled back the whole transaction.
        if self.conn.is_autocommit() {
            tracing::debug!("No transaction active; nothing to roll back");
            return Ok(());
        }
        for sql in &self.statements {
            self.conn.execute(sql)?;
        }
        Ok(())
    }
}

impl Drop for RollbackGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.compensate() {
                tracing::error!(error = %e, "Rollback during unwind failed");
            }
        }
    }
}
