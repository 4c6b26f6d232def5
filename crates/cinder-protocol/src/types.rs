//! RESP frame types.
//!
//! The [`Frame`] enum represents a single parsed RESP value. Bulk
//! strings use `Bytes` for reference-counted storage that avoids
//! copies as frames move between the parser, the store, and the
//! append-only log.

use bytes::Bytes;

/// A single RESP protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Simple string response, e.g. `+OK\r\n`.
    /// Used for short, non-binary status replies.
    Simple(String),

    /// Error response, e.g. `-ERR unknown command\r\n`.
    Error(String),

    /// 64-bit signed integer, e.g. `:42\r\n`.
    Integer(i64),

    /// Bulk (binary-safe) string, e.g. `$5\r\nhello\r\n`.
    Bulk(Bytes),

    /// Ordered array of frames, e.g. `*2\r\n+hello\r\n+world\r\n`.
    Array(Vec<Frame>),

    /// Null bulk string, `$-1\r\n`. The "not found" reply, and the
    /// EXEC conflict signal.
    NullBulk,

    /// Null array, `*-1\r\n`.
    NullArray,
}

impl Frame {
    /// Builds a bulk frame from anything that converts into `Bytes`.
    pub fn bulk(data: impl Into<Bytes>) -> Frame {
        Frame::Bulk(data.into())
    }

    /// Builds an error frame from anything that converts into `String`.
    pub fn error(msg: impl Into<String>) -> Frame {
        Frame::Error(msg.into())
    }

    /// The canonical `+OK\r\n` reply.
    pub fn ok() -> Frame {
        Frame::Simple("OK".into())
    }

    /// Returns `true` for either null form.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::NullBulk | Frame::NullArray)
    }

    /// Returns the bulk payload, or `None` for any other frame kind.
    pub fn as_bulk(&self) -> Option<&Bytes> {
        match self {
            Frame::Bulk(data) => Some(data),
            _ => None,
        }
    }
}
