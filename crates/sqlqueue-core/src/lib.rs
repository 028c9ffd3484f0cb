//! Core types for the sqlqueue SQLite access layer.
//!
//! This crate holds everything that does not touch the native engine:
//!
//! - [`Error`] and the structured error payloads
//! - [`Value`], the dynamically typed bindable/readable SQL value
//! - [`Row`] and [`FromValue`] for typed column extraction
//! - identifier and literal quoting used when caller text enters SQL

pub mod error;
pub mod identifiers;
pub mod row;
pub mod value;

pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, QueryError, QueryErrorKind,
    QueueError, QueueErrorKind, Result, TransactionError, TransactionErrorKind, TypeError,
};
pub use identifiers::{checked_ident, quote_ident, quote_literal};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
