//! Per-connection session state and the transaction layer.
//!
//! A session owns its transaction queue, watched-key set, and dirty
//! flag. MULTI/EXEC/DISCARD/WATCH/UNWATCH are handled here — before the
//! command table — because they manipulate session state rather than
//! the store. Everything else either queues (inside a transaction) or
//! executes immediately.
//!
//! The dirty flag is shared with the server's watcher index as an
//! `Arc<AtomicBool>`: when any connection writes a watched key, the
//! fan-out sets the flag, and this session's next EXEC aborts with the
//! null-bulk conflict signal (`$-1`) instead of running its queue.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use cinder_protocol::Frame;

use crate::commands::is_write_command;
use crate::server::ServerState;

/// Outcome of dispatching one inbound frame.
#[derive(Debug)]
pub enum Dispatch {
    /// Send this reply and keep the connection open.
    Reply(Frame),
    /// Send this reply and close the connection (protocol error).
    Close(Frame),
}

/// Per-connection state.
pub struct Session {
    id: u64,
    state: Arc<ServerState>,
    in_transaction: bool,
    queue: Vec<Frame>,
    watched: HashSet<String>,
    dirty: Arc<AtomicBool>,
}

impl Session {
    /// Creates a session bound to the shared server state.
    pub fn new(state: Arc<ServerState>) -> Session {
        let id = state.allocate_session_id();
        Session {
            id,
            state,
            in_transaction: false,
            queue: Vec::new(),
            watched: HashSet::new(),
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Processes one inbound frame and produces the reply.
    pub fn dispatch(&mut self, frame: Frame) -> Dispatch {
        let items = match &frame {
            Frame::Array(items) => items,
            _ => {
                return Dispatch::Close(Frame::error("ERR protocol error: expected array"));
            }
        };
        if items.is_empty() {
            return Dispatch::Reply(Frame::error("ERR empty command"));
        }

        let name = match &items[0] {
            Frame::Bulk(data) => match std::str::from_utf8(data) {
                Ok(name) => name.to_ascii_uppercase(),
                Err(_) => {
                    return Dispatch::Close(Frame::error(
                        "ERR protocol error: command must be a bulk string",
                    ));
                }
            },
            _ => {
                return Dispatch::Close(Frame::error(
                    "ERR protocol error: command must be a bulk string",
                ));
            }
        };

        match name.as_str() {
            "MULTI" => return Dispatch::Reply(self.multi()),
            "EXEC" => return Dispatch::Reply(self.exec()),
            "DISCARD" => return Dispatch::Reply(self.discard()),
            "WATCH" => {
                let keys = items[1..].to_vec();
                return Dispatch::Reply(self.watch(&keys));
            }
            "UNWATCH" => {
                self.unwatch_all();
                return Dispatch::Reply(Frame::ok());
            }
            _ => {}
        }

        if self.in_transaction {
            self.queue.push(frame);
            return Dispatch::Reply(Frame::Simple("QUEUED".into()));
        }

        Dispatch::Reply(self.execute(frame))
    }

    fn multi(&mut self) -> Frame {
        if self.in_transaction {
            return Frame::error("ERR MULTI calls can not be nested");
        }
        self.in_transaction = true;
        self.queue.clear();
        Frame::ok()
    }

    fn exec(&mut self) -> Frame {
        if !self.in_transaction {
            return Frame::error("ERR EXEC without MULTI");
        }

        if self.dirty.load(Ordering::SeqCst) {
            // a watched key was modified: abort without running anything
            self.in_transaction = false;
            self.queue.clear();
            self.unwatch_all();
            return Frame::NullBulk;
        }

        let queue = std::mem::take(&mut self.queue);
        let results: Vec<Frame> = queue.into_iter().map(|cmd| self.execute(cmd)).collect();

        self.in_transaction = false;
        self.unwatch_all();
        Frame::Array(results)
    }

    fn discard(&mut self) -> Frame {
        if !self.in_transaction {
            return Frame::error("ERR DISCARD without MULTI");
        }
        self.in_transaction = false;
        self.queue.clear();
        self.unwatch_all();
        Frame::ok()
    }

    fn watch(&mut self, keys: &[Frame]) -> Frame {
        if self.in_transaction {
            return Frame::error("ERR WATCH inside MULTI is not allowed");
        }
        if keys.is_empty() {
            return Frame::error("ERR wrong number of arguments for 'watch' command");
        }
        for key in keys {
            let key = match key {
                Frame::Bulk(data) => match std::str::from_utf8(data) {
                    Ok(key) => key,
                    Err(_) => return Frame::error("ERR protocol error: invalid key"),
                },
                _ => return Frame::error("ERR protocol error: invalid key"),
            };
            self.state
                .register_watch(self.id, self.dirty.clone(), key);
            self.watched.insert(key.to_owned());
        }
        Frame::ok()
    }

    fn unwatch_all(&mut self) {
        self.state.unregister_watches(self.id, &self.watched);
        self.watched.clear();
        self.dirty.store(false, Ordering::SeqCst);
    }

    /// Looks up and runs the handler for a command array, appending the
    /// original wire image to the command log when the command is a
    /// successful write.
    pub fn execute(&mut self, frame: Frame) -> Frame {
        let items = match &frame {
            Frame::Array(items) if !items.is_empty() => items,
            _ => return Frame::error("ERR protocol error: expected array"),
        };
        let name = match &items[0] {
            Frame::Bulk(data) => match std::str::from_utf8(data) {
                Ok(name) => name.to_ascii_uppercase(),
                Err(_) => return Frame::error("ERR protocol error: command must be a bulk string"),
            },
            _ => return Frame::error("ERR protocol error: command must be a bulk string"),
        };

        let handler = match self.state.commands.get(&name) {
            Some(handler) => handler,
            None => return Frame::error(format!("ERR unknown command '{name}'")),
        };

        let result = handler(&self.state, &items[1..]);

        if !matches!(result, Frame::Error(_)) && is_write_command(&name) {
            if let Some(aof) = self.state.aof.lock().as_ref() {
                if let Err(err) = aof.append(&frame) {
                    warn!(command = %name, error = %err, "failed to append to command log");
                }
            }
        }

        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // a vanished connection must not leave stale watch registrations
        self.unwatch_all();
    }
}
