//! Connection, transaction and queue configuration.

use crate::ffi;
use crate::location::DatabaseLocation;
use serde::{Deserialize, Serialize};
use std::ffi::c_int;

/// Configuration for opening a SQLite connection.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Where the database lives.
    pub location: DatabaseLocation,
    /// Open flags (read-only, read-write, create, threading, cache).
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds; 0 disables the busy handler.
    pub busy_timeout_ms: u32,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Multi-thread mode: the engine does not lock the connection itself.
    pub no_mutex: bool,
    /// Serialized mode: the engine locks the connection on every call.
    pub full_mutex: bool,
    /// Enable shared cache mode.
    pub shared_cache: bool,
    /// Disable shared cache mode.
    pub private_cache: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    /// Use serialized threading mode.
    pub fn full_mutex(mut self) -> Self {
        self.full_mutex = true;
        self.no_mutex = false;
        self
    }

    /// Use multi-thread mode.
    pub fn no_mutex(mut self) -> Self {
        self.no_mutex = true;
        self.full_mutex = false;
        self
    }

    /// Use a shared page cache.
    pub fn shared_cache(mut self) -> Self {
        self.shared_cache = true;
        self.private_cache = false;
        self
    }

    pub(crate) fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.no_mutex {
            flags |= ffi::SQLITE_OPEN_NOMUTEX;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }
        if self.shared_cache {
            flags |= ffi::SQLITE_OPEN_SHAREDCACHE;
        }
        if self.private_cache {
            flags |= ffi::SQLITE_OPEN_PRIVATECACHE;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            location: DatabaseLocation::InMemory,
            flags: OpenFlags::create_read_write().full_mutex(),
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    /// Config for a database at the given location.
    pub fn new(location: DatabaseLocation) -> Self {
        Self {
            location,
            ..Default::default()
        }
    }

    /// Config for a file-based database.
    pub fn file(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(DatabaseLocation::file(path))
    }

    /// Config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Config for a temporary on-disk database.
    pub fn temporary() -> Self {
        Self::new(DatabaseLocation::Temporary)
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

/// Lock acquisition strategy for `BEGIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Locks are acquired when the database is first read or written.
    #[default]
    Deferred,
    /// A write lock is acquired immediately.
    Immediate,
    /// An exclusive lock is acquired immediately.
    Exclusive,
}

impl TransactionKind {
    /// Get the SQL keyword for this kind.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            TransactionKind::Deferred => "DEFERRED",
            TransactionKind::Immediate => "IMMEDIATE",
            TransactionKind::Exclusive => "EXCLUSIVE",
        }
    }

    /// The full `BEGIN` statement for this kind.
    #[must_use]
    pub fn begin_sql(&self) -> String {
        format!("BEGIN {} TRANSACTION", self.as_sql())
    }
}

/// Configuration for a [`SerializedAccessQueue`](crate::SerializedAccessQueue).
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of accepted-but-unstarted units; `None` is unbounded.
    pub mailbox_capacity: Option<usize>,
    /// Name given to the worker thread.
    pub thread_name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: None,
            thread_name: "sqlqueue-worker".to_string(),
        }
    }
}

impl QueueConfig {
    /// Bound the mailbox; submitters block while it is full.
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = Some(capacity);
        self
    }

    /// Set the worker thread name.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flags_create_read_write() {
        let flags = OpenFlags::default().to_sqlite_flags();
        assert_ne!(flags & ffi::SQLITE_OPEN_READWRITE, 0);
        assert_ne!(flags & ffi::SQLITE_OPEN_CREATE, 0);
    }

    #[test]
    fn test_read_only_flags() {
        let flags = OpenFlags::read_only().to_sqlite_flags();
        assert_eq!(flags & ffi::SQLITE_OPEN_READWRITE, 0);
        assert_ne!(flags & ffi::SQLITE_OPEN_READONLY, 0);
    }

    #[test]
    fn test_threading_modes_are_exclusive() {
        let flags = OpenFlags::read_write().full_mutex().no_mutex();
        assert!(flags.no_mutex);
        assert!(!flags.full_mutex);
        let bits = flags.to_sqlite_flags();
        assert_eq!(bits & ffi::SQLITE_OPEN_FULLMUTEX, 0);
    }

    #[test]
    fn test_config_builders() {
        let config = SqliteConfig::file("/tmp/x.db").busy_timeout(10);
        assert_eq!(config.busy_timeout_ms, 10);
        assert_eq!(config.location, DatabaseLocation::file("/tmp/x.db"));
        assert_eq!(SqliteConfig::temporary().location, DatabaseLocation::Temporary);
    }

    #[test]
    fn test_transaction_kind_sql() {
        assert_eq!(TransactionKind::default(), TransactionKind::Deferred);
        assert_eq!(
            TransactionKind::Immediate.begin_sql(),
            "BEGIN IMMEDIATE TRANSACTION"
        );
        assert_eq!(TransactionKind::Exclusive.as_sql(), "EXCLUSIVE");
    }

    #[test]
    fn test_queue_config() {
        let config = QueueConfig::default().mailbox_capacity(4).thread_name("cars");
        assert_eq!(config.mailbox_capacity, Some(4));
        assert_eq!(config.thread_name, "cars");
    }
}
