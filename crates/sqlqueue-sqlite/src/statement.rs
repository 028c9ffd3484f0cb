//! Prepared statements.
//!
//! A [`Statement`] borrows its connection, so the connection cannot be closed
//! or moved while the statement is alive. The compiled statement is finalized
//! on drop.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::result_large_err)]

use crate::connection::SqliteConnection;
use crate::error::{check, syntax_error};
use crate::ffi;
use crate::types;
use sqlqueue_core::{ColumnInfo, Error, FromValue, QueryError, QueryErrorKind, Result, Row, Value};
use std::ffi::{CString, c_int};
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::Arc;

/// Named parameter prefixes SQLite recognizes.
const PARAM_PREFIXES: [char; 3] = [':', '@', '$'];

/// A compiled SQL statement bound to one connection.
pub struct Statement<'conn> {
    db: *mut ffi::sqlite3,
    stmt: NonNull<ffi::sqlite3_stmt>,
    sql: String,
    columns: Arc<ColumnInfo>,
    _conn: PhantomData<&'conn SqliteConnection>,
}

impl<'conn> Statement<'conn> {
    /// Compile the first statement in `sql`.
    pub fn prepare(conn: &'conn SqliteConnection, sql: &str) -> Result<Self> {
        let db = conn.handle()?;
        let c_sql = CString::new(sql).map_err(|_| syntax_error(sql, "SQL contains null byte"))?;
        let len = c_int::try_from(c_sql.as_bytes().len())
            .map_err(|_| syntax_error(sql, "SQL text too long"))?;

        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        // SAFETY: db is open; all pointers are valid for the call
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(db, c_sql.as_ptr(), len, &mut stmt, ptr::null_mut())
        };
        // SAFETY: db is open
        unsafe { check(db, rc, Some(sql))? };

        let stmt = NonNull::new(stmt).ok_or_else(|| syntax_error(sql, "SQL contains no statement"))?;

        // SAFETY: stmt was just compiled successfully
        let col_count = unsafe { ffi::sqlite3_column_count(stmt.as_ptr()) };
        let names = (0..col_count)
            .map(|i| {
                // SAFETY: i is within the column count
                unsafe { types::column_name(stmt.as_ptr(), i) }.unwrap_or_else(|| format!("col{i}"))
            })
            .collect();

        tracing::trace!(sql = %sql, "Prepared statement");

        Ok(Self {
            db,
            stmt,
            sql: sql.to_string(),
            columns: Arc::new(ColumnInfo::new(names)),
            _conn: PhantomData,
        })
    }

    /// The SQL text this statement was prepared from.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of parameter placeholders.
    pub fn parameter_count(&self) -> usize {
        // SAFETY: stmt is valid for the lifetime of self
        let count = unsafe { ffi::sqlite3_bind_parameter_count(self.stmt.as_ptr()) };
        usize::try_from(count).unwrap_or(0)
    }

    /// Result column names in order.
    pub fn column_names(&self) -> &[String] {
        self.columns.names()
    }

    /// Bind positional parameters, replacing any earlier bindings.
    ///
    /// The number of values must equal the number of placeholders.
    pub fn bind(&mut self, params: &[Value]) -> Result<&mut Self> {
        self.clear();
        let expected = self.parameter_count();
        if params.len() != expected {
            return Err(self.binding_error(format!(
                "{} values for {} parameters",
                params.len(),
                expected
            )));
        }
        for (i, value) in params.iter().enumerate() {
            let index = c_int::try_from(i + 1)
                .map_err(|_| self.binding_error("too many parameters".to_string()))?;
            self.bind_at(index, value)?;
        }
        Ok(self)
    }

    /// Bind named parameters, replacing any earlier bindings.
    ///
    /// Names may be given with or without their `:`, `@` or `$` prefix.
    /// Placeholders left unnamed stay NULL.
    pub fn bind_named(&mut self, params: &[(&str, Value)]) -> Result<&mut Self> {
        self.clear();
        for (name, value) in params {
            let index = self.named_index(name)?;
            self.bind_at(index, value)?;
        }
        Ok(self)
    }

    /// Step the statement to completion, discarding any rows.
    pub fn run(&mut self) -> Result<()> {
        self.rewind();
        let result = loop {
            match self.step() {
                Ok(Some(_)) => {}
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.rewind();
        result
    }

    /// Return the first result row.
    ///
    /// Fails with a `NotFound` query error when the statement yields no rows.
    pub fn fetch(&mut self) -> Result<Row> {
        self.first_row()?.ok_or_else(|| {
            Error::Query(QueryError {
                kind: QueryErrorKind::NotFound,
                code: None,
                sql: Some(self.sql.clone()),
                message: "query returned no rows".to_string(),
            })
        })
    }

    /// Return every result row.
    pub fn fetch_all(&mut self) -> Result<Vec<Row>> {
        self.rewind();
        let mut rows = Vec::new();
        let result = loop {
            match self.step() {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => break Ok(rows),
                Err(e) => break Err(e),
            }
        };
        self.rewind();
        result
    }

    /// Extract column 0 of row 0.
    ///
    /// Fails when there is no row, or when the value is NULL and `T` is not
    /// an `Option`.
    pub fn query<T: FromValue>(&mut self) -> Result<T> {
        let row = self.fetch()?;
        row.get_as::<T>(0)
    }

    /// Extract column 0 of row 0, mapping a missing row or NULL to `None`.
    pub fn query_optional<T: FromValue>(&mut self) -> Result<Option<T>> {
        match self.first_row()? {
            Some(row) => row.get_as::<Option<T>>(0),
            None => Ok(None),
        }
    }

    fn first_row(&mut self) -> Result<Option<Row>> {
        self.rewind();
        let row = self.step();
        self.rewind();
        row
    }

    /// Advance one step. `Ok(None)` means the statement is done.
    fn step(&mut self) -> Result<Option<Row>> {
        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(self.stmt.as_ptr()) };
        match rc {
            ffi::SQLITE_ROW => {
                let values = (0..self.columns.len())
                    .map(|i| {
                        // SAFETY: the statement is positioned on a row; i < column count
                        unsafe { types::read_column(self.stmt.as_ptr(), i as c_int) }
                    })
                    .collect();
                Ok(Some(Row::with_columns(Arc::clone(&self.columns), values)))
            }
            ffi::SQLITE_DONE => Ok(None),
            // SAFETY: db is open while the statement is borrowed from it
            _ => unsafe { check(self.db, rc, Some(self.sql.as_str())) }.map(|()| None),
        }
    }

    fn rewind(&mut self) {
        // SAFETY: stmt is valid; the return code repeats the last step's error
        unsafe { ffi::sqlite3_reset(self.stmt.as_ptr()) };
    }

    fn clear(&mut self) {
        self.rewind();
        // SAFETY: stmt is valid
        unsafe { ffi::sqlite3_clear_bindings(self.stmt.as_ptr()) };
    }

    fn bind_at(&mut self, index: c_int, value: &Value) -> Result<()> {
        // SAFETY: stmt is valid and index was checked against the parameter count
        let rc = unsafe { types::bind_value(self.stmt.as_ptr(), index, value) };
        if rc == ffi::SQLITE_OK {
            return Ok(());
        }
        // SAFETY: db is open
        let detail = unsafe { ffi::errmsg(self.db) };
        Err(Error::Query(QueryError {
            kind: QueryErrorKind::Binding,
            code: Some(rc & 0xff),
            sql: Some(self.sql.clone()),
            message: format!("Failed to bind parameter {}: {}", index, detail),
        }))
    }

    fn named_index(&self, name: &str) -> Result<c_int> {
        let candidates: Vec<String> = if name.starts_with(PARAM_PREFIXES) {
            vec![name.to_string()]
        } else {
            PARAM_PREFIXES.iter().map(|p| format!("{p}{name}")).collect()
        };
        for candidate in candidates {
            let Ok(c_name) = CString::new(candidate) else {
                continue;
            };
            // SAFETY: stmt is valid; c_name is NUL-terminated
            let index =
                unsafe { ffi::sqlite3_bind_parameter_index(self.stmt.as_ptr(), c_name.as_ptr()) };
            if index > 0 {
                return Ok(index);
            }
        }
        Err(self.binding_error(format!("no such parameter: {}", name)))
    }

    fn binding_error(&self, message: String) -> Error {
        Error::Query(QueryError {
            kind: QueryErrorKind::Binding,
            code: Some(ffi::SQLITE_RANGE),
            sql: Some(self.sql.clone()),
            message,
        })
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        // SAFETY: stmt is valid and finalized exactly once
        unsafe { ffi::sqlite3_finalize(self.stmt.as_ptr()) };
    }
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("columns", &self.columns.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cars() -> SqliteConnection {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute("CREATE TABLE cars (name TEXT, price REAL)").unwrap();
        conn
    }

    #[test]
    fn test_positional_bind_and_run() {
        let conn = cars();
        let mut stmt = conn.prepare("INSERT INTO cars VALUES (?, ?)").unwrap();
        assert_eq!(stmt.parameter_count(), 2);
        stmt.bind(&[Value::from("Tesla"), Value::from(40_000.0)]).unwrap().run().unwrap();
        stmt.bind(&[Value::from("Audi"), Value::Null]).unwrap().run().unwrap();
        drop(stmt);

        let count: i64 = conn.query("SELECT count(*) FROM cars", &[]).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_bind_count_mismatch() {
        let conn = cars();
        let mut stmt = conn.prepare("INSERT INTO cars VALUES (?, ?)").unwrap();
        let err = stmt.bind(&[Value::from("Tesla")]).unwrap_err();
        match err {
            Error::Query(q) => {
                assert_eq!(q.kind, QueryErrorKind::Binding);
                assert_eq!(q.message, "1 values for 2 parameters");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_named_bind_with_and_without_prefix() {
        let conn = cars();
        let mut stmt = conn
            .prepare("INSERT INTO cars (name, price) VALUES (:name, @price)")
            .unwrap();
        stmt.bind_named(&[("name", Value::from("BMW")), ("@price", Value::from(1.5))])
            .unwrap()
            .run()
            .unwrap();
        drop(stmt);

        let price: f64 = conn
            .query_named("SELECT price FROM cars WHERE name = $n", &[("n", Value::from("BMW"))])
            .unwrap();
        assert!((price - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_named_parameter() {
        let conn = cars();
        let mut stmt = conn.prepare("SELECT * FROM cars WHERE name = :name").unwrap();
        let err = stmt.bind_named(&[("nope", Value::Null)]).unwrap_err();
        assert!(err.to_string().contains("no such parameter: nope"));
    }

    #[test]
    fn test_fetch_requires_a_row() {
        let conn = cars();
        let mut stmt = conn.prepare("SELECT name FROM cars").unwrap();
        let err = stmt.fetch().unwrap_err();
        assert!(matches!(err, Error::Query(ref q) if q.kind == QueryErrorKind::NotFound));
        assert!(stmt.fetch_all().unwrap().is_empty());
    }

    #[test]
    fn test_query_vs_query_optional() {
        let conn = cars();
        conn.execute("INSERT INTO cars VALUES ('Fiat', NULL)").unwrap();

        let mut stmt = conn.prepare("SELECT price FROM cars").unwrap();
        assert!(stmt.query::<f64>().is_err());
        assert_eq!(stmt.query::<Option<f64>>().unwrap(), None);
        assert_eq!(stmt.query_optional::<f64>().unwrap(), None);

        let mut empty = conn.prepare("SELECT price FROM cars WHERE 0").unwrap();
        assert!(empty.query::<f64>().is_err());
        assert_eq!(empty.query_optional::<f64>().unwrap(), None);
    }

    #[test]
    fn test_column_names_and_rows() {
        let conn = cars();
        conn.execute("INSERT INTO cars VALUES ('A', 1), ('B', 2)").unwrap();
        let mut stmt = conn.prepare("SELECT name, price AS cost FROM cars ORDER BY name").unwrap();
        assert_eq!(stmt.column_names(), ["name", "cost"]);

        let rows = stmt.fetch_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get_named::<String>("name").unwrap(), "B");

        // Re-running after a full read starts from the first row again.
        let first = stmt.fetch().unwrap();
        assert_eq!(first.get_as::<String>(0).unwrap(), "A");
    }

    #[test]
    fn test_prepare_errors() {
        let conn = cars();
        assert!(conn.prepare("SELEC nonsense").is_err());
        assert!(conn.prepare("SELECT '\0'").is_err());
        assert!(conn.prepare("   ").is_err());
    }

    #[test]
    fn test_step_error_is_reported() {
        let conn = cars();
        conn.execute("CREATE UNIQUE INDEX cars_name ON cars(name)").unwrap();
        conn.execute("INSERT INTO cars VALUES ('A', 1)").unwrap();
        let err = conn
            .run("INSERT INTO cars VALUES (?, ?)", &[Value::from("A"), Value::from(2)])
            .unwrap_err();
        assert!(matches!(err, Error::Query(ref q) if q.kind == QueryErrorKind::Constraint));
    }
}
