//! cinder-persistence: durability for the cinder key-value server.
//!
//! Two complementary mechanisms:
//!
//! - [`snapshot`]: binary point-in-time files. The whole keyspace is
//!   serialized to a temp file and atomically renamed into place.
//! - [`aof`]: an append-only log of write commands in their wire form,
//!   with configurable fsync discipline, best-effort replay, and a
//!   logical rewrite that regenerates the log from the current store.

pub mod aof;
pub mod snapshot;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised by the snapshot codec and the command log.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The snapshot file's magic or version tag didn't match.
    #[error("invalid snapshot header")]
    InvalidHeader,

    /// The snapshot selected a database other than 0.
    #[error("unsupported database index {0}")]
    UnsupportedDb(u32),

    /// An entry carried a type byte this reader doesn't know.
    #[error("unknown value type byte {0:#04x}")]
    UnknownType(u8),

    /// A length prefix used an undefined special form.
    #[error("invalid length encoding")]
    InvalidLength,

    /// A field that must be text (key, member, hash field) wasn't UTF-8.
    #[error("{0} is not valid utf-8")]
    NotUtf8(&'static str),

    /// A log entry decoded to something other than a command array.
    #[error("log entry is not a command array")]
    NotACommand,

    /// The log contained a malformed wire frame.
    #[error("malformed log frame: {0}")]
    Protocol(#[from] cinder_protocol::ProtocolError),

    /// Underlying filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Removes an in-progress temp file on drop unless [`disarm`] was
/// called after the atomic rename. A save or rewrite that errors out
/// partway must not leave its `.tmp` sibling on disk.
///
/// [`disarm`]: TmpGuard::disarm
pub(crate) struct TmpGuard {
    path: PathBuf,
    armed: bool,
}

impl TmpGuard {
    pub(crate) fn new(path: &Path) -> TmpGuard {
        TmpGuard {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    /// The temp file has been renamed into place; nothing to clean up.
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TmpGuard {
    fn drop(&mut self) {
        if self.armed {
            // best-effort: the file may never have been created
            let _ = fs::remove_file(&self.path);
        }
    }
}
