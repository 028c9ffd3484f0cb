//! Serialized, transaction-aware access to a single SQLite connection.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! This crate wraps one libsqlite3 handle in a [`SqliteConnection`] and hands
//! it to a [`SerializedAccessQueue`], which runs every unit of work on a
//! dedicated worker thread in submission order. Any number of threads may
//! submit; none of them ever touch the handle directly.
//!
//! # Features
//!
//! - Transactions with automatic rollback on error or panic
//! - Nestable savepoints with safely quoted names
//! - Positional and named parameter binding
//! - In-memory, temporary and file-based databases, plus `ATTACH`/`DETACH`
//! - Statement tracing with expanded parameter values
//!
//! # Example
//!
//! ```rust,no_run
//! use sqlqueue_sqlite::{SerializedAccessQueue, SqliteConnection, TransactionKind, Value};
//!
//! # fn main() -> sqlqueue_sqlite::Result<()> {
//! let conn = SqliteConnection::open_memory()?;
//! let queue = SerializedAccessQueue::new(conn)?;
//!
//! queue.submit(|c| c.execute("CREATE TABLE cars (name TEXT, price REAL)"))?;
//! queue.submit_transaction(TransactionKind::Immediate, |c| {
//!     c.run("INSERT INTO cars VALUES (?, ?)", &[Value::from("Tesla"), Value::from(40_000.0)])
//! })?;
//!
//! let count: i64 = queue.submit(|c| c.query("SELECT count(*) FROM cars", &[]))?;
//! assert_eq!(count, 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Type Mapping
//!
//! | Rust Type | SQLite Type |
//! |-----------|-------------|
//! | `bool` | INTEGER (0/1) |
//! | `i8`, `i16`, `i32`, `i64` | INTEGER |
//! | `f32`, `f64` | REAL |
//! | `String` | TEXT |
//! | `Vec<u8>` | BLOB |
//! | `serde_json::Value` | TEXT |
//! | `Option<T>` | NULL or T |
//!
//! # Thread Safety
//!
//! `SqliteConnection` is `Send` but not `Sync`. Share it between threads by
//! moving it into a `SerializedAccessQueue`, whose handles are cheap to clone.

pub mod config;
pub mod connection;
pub mod error;
pub mod ffi;
pub mod location;
pub mod queue;
pub mod statement;
pub mod trace;
pub mod types;

pub use config::{OpenFlags, QueueConfig, SqliteConfig, TransactionKind};
pub use connection::SqliteConnection;
pub use error::{error_for_code, kind_for_code};
pub use location::DatabaseLocation;
pub use queue::SerializedAccessQueue;
pub use statement::Statement;
pub use trace::TraceCallback;

pub use sqlqueue_core::{
    ColumnInfo, Error, FromValue, QueryErrorKind, QueueErrorKind, Result, Row,
    TransactionErrorKind, Value,
};

/// Re-export the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// Re-export the SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}
