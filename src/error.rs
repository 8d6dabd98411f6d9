//! Error types shared across the crate.
//!
//! Filesystem failures keep the originating [`std::io::Error`] as their
//! source so callers can still get at the OS-level detail. The only
//! non-fatal kind is [`Error::BadFilename`], which is raised *after*
//! the write that triggered it has completed; see [`Error::is_warning`].

use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Convenience wrapper around `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by load-order and active-plugin operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A file that must be UTF-8 (`loadorder.txt`) contained invalid bytes.
    #[error("\"{path}\" is not encoded in valid UTF-8")]
    NotUtf8 { path: Utf8PathBuf },

    /// A file could not be opened or read.
    #[error("\"{path}\" could not be read")]
    FileRead {
        path: Utf8PathBuf,
        source: io::Error,
    },

    /// A file could not be created or written.
    #[error("\"{path}\" could not be written")]
    FileWrite {
        path: Utf8PathBuf,
        source: io::Error,
    },

    /// Renaming a ghosted plugin back to its plain name failed.
    #[error("\"{path}\" could not be renamed")]
    Rename {
        path: Utf8PathBuf,
        source: io::Error,
    },

    /// Querying a file or folder modification time failed.
    #[error("the timestamp of \"{path}\" could not be read")]
    TimestampRead {
        path: Utf8PathBuf,
        source: io::Error,
    },

    /// Updating a plugin file modification time failed.
    #[error("the timestamp of \"{path}\" could not be updated")]
    TimestampWrite {
        path: Utf8PathBuf,
        source: io::Error,
    },

    /// A plugin name could not be encoded in Windows-1252 while saving
    /// the active-plugins file. The file was still written, minus the
    /// offending entry.
    #[error("\"{name}\" cannot be encoded in Windows-1252")]
    BadFilename { name: String },

    /// The caller passed an argument that breaks an invariant: an
    /// invalid plugin name, an out-of-range position, a duplicate
    /// entry, or an order that mixes masters and non-masters.
    #[error("{message}")]
    InvalidArgs { message: String },
}

impl Error {
    pub(crate) fn invalid_args(message: impl Into<String>) -> Self {
        Error::InvalidArgs {
            message: message.into(),
        }
    }

    /// True for kinds that leave the operation's on-disk effect intact.
    ///
    /// Currently only [`Error::BadFilename`]: the active-plugins file
    /// has been written in full apart from the unencodable name.
    pub fn is_warning(&self) -> bool {
        matches!(self, Error::BadFilename { .. })
    }
}
