//! SQL identifier and literal quoting.
//!
//! Savepoint names, attached schema names and attached file paths are the
//! only caller-controlled text that ends up inside generated SQL rather than
//! being bound as a parameter. Everything in this module exists so that text
//! can never terminate the surrounding statement.

use crate::error::{Error, QueryError, QueryErrorKind};

/// Quote a SQL identifier using ANSI double-quoting.
///
/// Embedded double-quotes are escaped by doubling them (`"` → `""`).
///
/// ```
/// use sqlqueue_core::quote_ident;
///
/// assert_eq!(quote_ident("s1"), "\"s1\"");
/// assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a SQL string literal using single quotes.
///
/// Embedded single quotes are escaped by doubling them (`'` → `''`).
///
/// ```
/// use sqlqueue_core::quote_literal;
///
/// assert_eq!(quote_literal("/tmp/it's.db"), "'/tmp/it''s.db'");
/// ```
#[inline]
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Validate a caller-supplied identifier and return it quoted.
///
/// Empty names and names containing NUL are rejected; everything else is
/// accepted and escaped by [`quote_ident`].
pub fn checked_ident(name: &str) -> Result<String, Error> {
    if name.is_empty() {
        return Err(invalid_identifier(name, "identifier must not be empty"));
    }
    if name.contains('\0') {
        return Err(invalid_identifier(
            name,
            "identifier must not contain NUL bytes",
        ));
    }
    Ok(quote_ident(name))
}

fn invalid_identifier(name: &str, message: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        code: None,
        sql: None,
        message: format!("invalid identifier {:?}: {}", name, message),
    })
}
