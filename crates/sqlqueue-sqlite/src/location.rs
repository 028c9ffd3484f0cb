//! Where a database lives.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The storage behind a connection or an attached database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseLocation {
    /// A database file on disk, created on open when the flags allow it.
    OnDisk(PathBuf),
    /// A private in-memory database that disappears when the connection closes.
    #[default]
    InMemory,
    /// A temporary on-disk database, deleted automatically on close.
    Temporary,
}

impl DatabaseLocation {
    /// Location of a database file.
    pub fn file(path: impl AsRef<Path>) -> Self {
        DatabaseLocation::OnDisk(path.as_ref().to_path_buf())
    }

    /// The filename SQLite understands for this location.
    pub fn connection_string(&self) -> String {
        match self {
            DatabaseLocation::OnDisk(path) => path.to_string_lossy().into_owned(),
            DatabaseLocation::InMemory => ":memory:".to_string(),
            DatabaseLocation::Temporary => String::new(),
        }
    }

    /// Whether other connections can open the same database by name.
    pub fn is_shareable(&self) -> bool {
        !matches!(self, DatabaseLocation::Temporary)
    }
}

impl fmt::Display for DatabaseLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseLocation::OnDisk(path) => write!(f, "{}", path.display()),
            DatabaseLocation::InMemory => write!(f, ":memory:"),
            DatabaseLocation::Temporary => write!(f, "(temporary)"),
        }
    }
}
