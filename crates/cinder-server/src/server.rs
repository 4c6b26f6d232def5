//! Shared server state and the TCP accept loop.
//!
//! [`ServerState`] ties the pieces together: the store behind its
//! reader/writer lock, the command table, the optional command log, and
//! the WATCH inverse index. The store's key-modified callback routes
//! back here so any session watching a mutated key gets its dirty flag
//! set, whichever connection performed the write.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, error, info};

use cinder_core::Store;
use cinder_persistence::aof::AofWriter;
use cinder_protocol::{parse_frame, Frame};

use crate::commands::CommandTable;
use crate::config::ServerConfig;
use crate::session::{Dispatch, Session};

/// Initial per-connection buffer capacity.
const BUF_CAPACITY: usize = 4096;

/// Maximum read buffer size before the client is disconnected. Bounds
/// the memory one slow or malicious client can pin with an incomplete
/// frame.
const MAX_BUF_SIZE: usize = 64 * 1024 * 1024;

/// Everything a command handler or session can reach.
pub struct ServerState {
    /// The keyspace. Accessors that can observe expiry go through the
    /// write half; pure enumeration takes the read half.
    pub store: RwLock<Store>,
    /// Name → handler dispatch table.
    pub commands: CommandTable,
    /// The command log, present when `appendonly` is on. Installed
    /// after replay so reloading the log doesn't re-append it.
    pub aof: Mutex<Option<AofWriter>>,
    /// Runtime-visible configuration.
    pub config: Mutex<ServerConfig>,
    /// Signalled by SHUTDOWN; the accept loop exits on it.
    pub shutdown: Notify,
    /// key → (session id → dirty flag) for WATCH invalidation.
    watchers: Mutex<HashMap<String, HashMap<u64, Arc<AtomicBool>>>>,
    next_session_id: AtomicU64,
    bgsave_running: AtomicBool,
    rewrite_running: AtomicBool,
}

impl ServerState {
    /// Builds the shared state and installs the store's key-modified
    /// callback. The callback holds a weak reference, so dropping the
    /// returned `Arc` tears everything down.
    pub fn new(config: ServerConfig, store: Store) -> Arc<ServerState> {
        let state = Arc::new(ServerState {
            store: RwLock::new(store),
            commands: CommandTable::standard(),
            aof: Mutex::new(None),
            config: Mutex::new(config),
            shutdown: Notify::new(),
            watchers: Mutex::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
            bgsave_running: AtomicBool::new(false),
            rewrite_running: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&state);
        state
            .store
            .write()
            .set_key_modified_handler(Arc::new(move |key| {
                if let Some(state) = weak.upgrade() {
                    state.mark_key_modified(key);
                }
            }));

        state
    }

    /// Marks every session watching `key` dirty.
    pub fn mark_key_modified(&self, key: &str) {
        let watchers = self.watchers.lock();
        if let Some(sessions) = watchers.get(key) {
            for flag in sessions.values() {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Registers a session's dirty flag under a watched key.
    pub(crate) fn register_watch(&self, session_id: u64, flag: Arc<AtomicBool>, key: &str) {
        self.watchers
            .lock()
            .entry(key.to_owned())
            .or_default()
            .insert(session_id, flag);
    }

    /// Drops a session's registrations for the given keys, removing
    /// emptied index entries.
    pub(crate) fn unregister_watches(&self, session_id: u64, keys: &HashSet<String>) {
        let mut watchers = self.watchers.lock();
        for key in keys {
            if let Some(sessions) = watchers.get_mut(key) {
                sessions.remove(&session_id);
                if sessions.is_empty() {
                    watchers.remove(key);
                }
            }
        }
    }

    pub(crate) fn allocate_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Claims the single background-save slot. Returns `false` when a
    /// save is already running.
    pub fn try_begin_bgsave(&self) -> bool {
        self.bgsave_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_bgsave(&self) {
        self.bgsave_running.store(false, Ordering::SeqCst);
    }

    /// Claims the single log-rewrite slot. Returns `false` when a
    /// rewrite is already running.
    pub fn try_begin_rewrite(&self) -> bool {
        self.rewrite_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_rewrite(&self) {
        self.rewrite_running.store(false, Ordering::SeqCst);
    }
}

/// Runs the accept loop until SHUTDOWN is signalled.
pub async fn run(state: Arc<ServerState>) -> io::Result<()> {
    let port = state.config.lock().port;
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "client connected");
                        let state = state.clone();
                        tokio::spawn(async move {
                            if let Err(err) = handle_connection(state, stream).await {
                                debug!(%peer, error = %err, "connection ended with error");
                            }
                            debug!(%peer, "client disconnected");
                        });
                    }
                    Err(err) => error!(error = %err, "accept failed"),
                }
            }
            _ = state.shutdown.notified() => {
                info!("shutdown requested, closing listener");
                return Ok(());
            }
        }
    }
}

/// Drives one client connection: read, parse, dispatch, reply.
/// Pipelined commands in a single read are answered in one write.
async fn handle_connection(state: Arc<ServerState>, mut stream: TcpStream) -> io::Result<()> {
    let mut session = Session::new(state);
    let mut buf = BytesMut::with_capacity(BUF_CAPACITY);
    let mut out = BytesMut::with_capacity(BUF_CAPACITY);

    loop {
        if buf.len() > MAX_BUF_SIZE {
            let mut err_buf = BytesMut::new();
            Frame::error("ERR protocol error: frame exceeds maximum size").serialize(&mut err_buf);
            let _ = stream.write_all(&err_buf).await;
            return Ok(());
        }

        // 0 bytes read means the peer closed cleanly
        if stream.read_buf(&mut buf).await? == 0 {
            return Ok(());
        }

        out.clear();
        loop {
            match parse_frame(&buf) {
                Ok(Some((frame, consumed))) => {
                    let _ = buf.split_to(consumed);
                    match session.dispatch(frame) {
                        Dispatch::Reply(reply) => reply.serialize(&mut out),
                        Dispatch::Close(reply) => {
                            reply.serialize(&mut out);
                            stream.write_all(&out).await?;
                            return Ok(());
                        }
                    }
                }
                Ok(None) => break, // need more data
                Err(err) => {
                    Frame::error(format!("ERR protocol error: {err}")).serialize(&mut out);
                    stream.write_all(&out).await?;
                    return Ok(());
                }
            }
        }

        if !out.is_empty() {
            stream.write_all(&out).await?;
        }
    }
}
