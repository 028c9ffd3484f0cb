//! Error types for sqlqueue operations.

use std::fmt;

/// The primary error type for all sqlqueue operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-level errors (open failure, use after close)
    Connection(ConnectionError),
    /// Statement execution errors, including transaction control statements
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Transaction coordination errors
    Transaction(TransactionError),
    /// Serialized queue misuse
    Queue(QueueError),
    /// Configuration errors
    Config(ConfigError),
    /// I/O errors
    Io(std::io::Error),
    /// Custom error with message, typically raised from a caller's closure
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    /// Primary native result code, if the error came from the engine
    pub code: Option<i32>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to open the database
    Connect,
    /// The connection has already been closed
    Closed,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    /// Primary native result code, if the error came from the engine
    pub code: Option<i32>,
    pub sql: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error or malformed SQL text
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// No row, table, column or savepoint with that name
    NotFound,
    /// Permission denied or read-only database
    Permission,
    /// Data too large
    DataTruncation,
    /// Database is busy or locked
    Busy,
    /// Parameter binding failed
    Binding,
    /// Statement was interrupted
    Cancelled,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

/// A transaction or savepoint whose compensating rollback failed.
///
/// `cause` is the error that triggered the rollback; `rollback` is the error
/// the rollback statement itself produced.
#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
    pub cause: Box<Error>,
    pub rollback: Box<Error>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// `ROLLBACK` after a failed transaction body or commit failed
    RollbackFailed,
    /// `ROLLBACK TO SAVEPOINT` or the following release failed
    SavepointRollbackFailed,
}

#[derive(Debug)]
pub struct QueueError {
    pub kind: QueueErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueErrorKind {
    /// The queue no longer accepts work
    Closed,
    /// Work was submitted from inside a unit of work on the same queue
    Reentrant,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl Error {
    /// Build a `Custom` error from any displayable message.
    pub fn custom(message: impl Into<String>) -> Self {
        Error::Custom(message.into())
    }

    /// Is this a busy/locked error where a retry may succeed?
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Query(q) if q.kind == QueryErrorKind::Busy)
    }

    /// Did the queue refuse the submission because it was closed?
    pub fn is_queue_closed(&self) -> bool {
        matches!(self, Error::Queue(q) if q.kind == QueueErrorKind::Closed)
    }

    /// Native result code carried by this error, if any.
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Connection(e) => e.code,
            Error::Query(e) => e.code,
            Error::Transaction(e) => e.cause.code(),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    /// The error that triggered a failed rollback, or `self` otherwise.
    pub fn original(&self) -> &Error {
        match self {
            Error::Transaction(e) => e.cause.original(),
            other => other,
        }
    }

    /// The secondary error of a failed compensating rollback, if any.
    pub fn rollback_error(&self) -> Option<&Error> {
        match self {
            Error::Transaction(e) => Some(&e.rollback),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e),
            Error::Query(e) => write!(f, "Query error: {}", e),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Transaction(e) => write!(f, "Transaction error: {}", e),
            Error::Queue(e) => write!(f, "Queue error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transaction(e) => Some(e.cause.as_ref()),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (rollback also failed: {})",
            self.message, self.cause, self.rollback
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<QueueError> for Error {
    fn from(err: QueueError) -> Self {
        Error::Queue(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for sqlqueue operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn busy() -> Error {
        Error::Query(QueryError {
            kind: QueryErrorKind::Busy,
            code: Some(5),
            sql: Some("COMMIT TRANSACTION".to_string()),
            message: "database is locked".to_string(),
        })
    }

    #[test]
    fn code_and_sql_helpers() {
        let err = busy();
        assert_eq!(err.code(), Some(5));
        assert_eq!(err.sql(), Some("COMMIT TRANSACTION"));
        assert!(err.is_retryable());
        assert!(!err.is_queue_closed());
    }

    #[test]
    fn rollback_failure_keeps_original_cause() {
        let err = Error::Transaction(TransactionError {
            kind: TransactionErrorKind::RollbackFailed,
            message: "transaction rolled back".to_string(),
            cause: Box::new(Error::custom("boom")),
            rollback: Box::new(busy()),
        });

        assert!(matches!(err.original(), Error::Custom(m) if m == "boom"));
        assert_eq!(err.rollback_error().and_then(Error::code), Some(5));

        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "boom");
        assert!(err.to_string().contains("rollback also failed"));
    }

    #[test]
    fn original_of_plain_error_is_itself() {
        let err = busy();
        assert!(std::ptr::eq(err.original(), &err));
        assert!(err.rollback_error().is_none());
    }

    #[test]
    fn queue_closed_flag() {
        let err = Error::Queue(QueueError {
            kind: QueueErrorKind::Closed,
            message: "queue is closed".to_string(),
        });
        assert!(err.is_queue_closed());
        assert_eq!(err.to_string(), "Queue error: queue is closed");
    }

    #[test]
    fn connection_error_display_includes_code() {
        let err = Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Connect,
            code: Some(14),
            message: "unable to open database file".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Connection error: unable to open database file (code 14)"
        );
    }
}
