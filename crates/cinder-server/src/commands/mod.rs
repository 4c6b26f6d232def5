//! Command handlers.
//!
//! Handlers are looked up by uppercased name in a [`CommandTable`] and
//! invoked with the raw argument frames. Each handler does its own
//! arity and type checks and translates store errors into wire error
//! replies (the store error `Display` impls already carry the wire
//! text). Transaction commands never appear here — the session layer
//! intercepts them before dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use cinder_protocol::Frame;

use crate::server::ServerState;

mod conn;
mod hashes;
mod keyspace;
mod lists;
mod persist;
mod sets;
mod strings;
mod zsets;

/// A command handler: shared state plus the argument frames (the
/// command name itself is stripped).
pub type Handler = Box<dyn Fn(&Arc<ServerState>, &[Frame]) -> Frame + Send + Sync>;

/// Name → handler dispatch table.
pub struct CommandTable {
    handlers: HashMap<String, Handler>,
}

impl CommandTable {
    /// Builds an empty table.
    pub fn new() -> CommandTable {
        CommandTable {
            handlers: HashMap::new(),
        }
    }

    /// Builds the full table with every command this server speaks.
    pub fn standard() -> CommandTable {
        let mut table = CommandTable::new();
        conn::register(&mut table);
        keyspace::register(&mut table);
        strings::register(&mut table);
        lists::register(&mut table);
        hashes::register(&mut table);
        sets::register(&mut table);
        zsets::register(&mut table);
        persist::register(&mut table);
        table
    }

    /// Registers a handler under an uppercased name.
    pub fn register(
        &mut self,
        name: &str,
        handler: impl Fn(&Arc<ServerState>, &[Frame]) -> Frame + Send + Sync + 'static,
    ) {
        self.handlers
            .insert(name.to_ascii_uppercase(), Box::new(handler));
    }

    /// Looks up a handler by (already uppercased) name.
    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The complete set of commands whose success must reach the command
/// log and invalidate WATCHers.
pub fn is_write_command(name: &str) -> bool {
    matches!(
        name,
        "SET" | "DEL"
            | "INCR"
            | "DECR"
            | "LPUSH"
            | "RPUSH"
            | "LPOP"
            | "RPOP"
            | "HSET"
            | "HDEL"
            | "SADD"
            | "SREM"
            | "SPOP"
            | "ZADD"
            | "ZREM"
            | "EXPIRE"
            | "PEXPIREAT"
            | "FLUSHDB"
            | "FLUSHALL"
    )
}

// ---------------------------------------------------------------------------
// argument helpers
// ---------------------------------------------------------------------------

/// Unwraps an argument-helper result, or returns the error reply from
/// the enclosing handler.
macro_rules! arg {
    ($e:expr) => {
        match $e {
            Ok(value) => value,
            Err(reply) => return reply,
        }
    };
}
pub(crate) use arg;

/// The standard arity failure reply.
pub(crate) fn arity_error(cmd: &str) -> Frame {
    Frame::error(format!("ERR wrong number of arguments for '{cmd}' command"))
}

/// Extracts a UTF-8 bulk-string argument.
pub(crate) fn str_arg<'a>(args: &'a [Frame], index: usize) -> Result<&'a str, Frame> {
    match args.get(index) {
        Some(Frame::Bulk(data)) => {
            std::str::from_utf8(data).map_err(|_| Frame::error("ERR invalid argument type"))
        }
        _ => Err(Frame::error("ERR invalid argument type")),
    }
}

/// Extracts a binary-safe bulk-string argument.
pub(crate) fn bytes_arg(args: &[Frame], index: usize) -> Result<Bytes, Frame> {
    match args.get(index) {
        Some(Frame::Bulk(data)) => Ok(data.clone()),
        _ => Err(Frame::error("ERR invalid argument type")),
    }
}

/// Extracts an integer argument.
pub(crate) fn int_arg(args: &[Frame], index: usize) -> Result<i64, Frame> {
    str_arg(args, index)?
        .parse()
        .map_err(|_| Frame::error("ERR value is not an integer or out of range"))
}
