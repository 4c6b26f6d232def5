//! Append-only command log.
//!
//! Every successful write command is appended in its wire form — a RESP
//! array exactly as the client sent it — so replay is just "parse and
//! re-dispatch". Three fsync disciplines control the durability window:
//!
//! - `always`: flush and fsync inside every append.
//! - `everysec`: flush on append; a background thread fsyncs once per
//!   second under the append lock.
//! - `no`: leave flushing entirely to the OS.
//!
//! The rewrite pass regenerates the log from a store snapshot as one
//! equivalent command per key (plus `PEXPIREAT` for volatile keys),
//! written to `<path>.tmp` and atomically renamed.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use cinder_core::object::Payload;
use cinder_core::store::StoreSnapshot;
use cinder_protocol::{parse_frame_bytes, Frame};

use crate::{PersistError, TmpGuard};

/// When to force appended data to stable storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FsyncPolicy {
    /// fsync after every append. Safest, slowest.
    Always,
    /// fsync once per second from a background thread.
    #[default]
    EverySec,
    /// Let the OS decide. Fastest, least durable.
    No,
}

impl FsyncPolicy {
    /// Returns the configuration name of this policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            FsyncPolicy::Always => "always",
            FsyncPolicy::EverySec => "everysec",
            FsyncPolicy::No => "no",
        }
    }
}

impl FromStr for FsyncPolicy {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_lowercase().as_str() {
            "always" => Ok(FsyncPolicy::Always),
            "everysec" => Ok(FsyncPolicy::EverySec),
            "no" => Ok(FsyncPolicy::No),
            other => Err(format!("unknown fsync policy '{other}'")),
        }
    }
}

struct AofInner {
    writer: BufWriter<File>,
}

impl AofInner {
    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    fn sync(&mut self) -> std::io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }
}

/// Appender for the command log.
///
/// Safe against concurrent appends: the mutex covers serialize-and-
/// write plus the per-policy flush/fsync, and the `everysec` background
/// thread syncs under the same lock.
pub struct AofWriter {
    inner: Arc<Mutex<AofInner>>,
    policy: FsyncPolicy,
    flusher: Option<(mpsc::Sender<()>, JoinHandle<()>)>,
}

impl AofWriter {
    /// Opens (or creates) the log at `path` in append mode.
    pub fn open(path: impl AsRef<Path>, policy: FsyncPolicy) -> Result<AofWriter, PersistError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        let inner = Arc::new(Mutex::new(AofInner {
            writer: BufWriter::new(file),
        }));

        let flusher = if policy == FsyncPolicy::EverySec {
            let (stop_tx, stop_rx) = mpsc::channel::<()>();
            let shared = inner.clone();
            let handle = std::thread::spawn(move || loop {
                match stop_rx.recv_timeout(Duration::from_secs(1)) {
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        if let Err(err) = shared.lock().sync() {
                            error!(error = %err, "background log sync failed");
                        }
                    }
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => return,
                }
            });
            Some((stop_tx, handle))
        } else {
            None
        };

        info!(path = %path.as_ref().display(), policy = policy.as_str(), "command log open");
        Ok(AofWriter {
            inner,
            policy,
            flusher,
        })
    }

    /// Appends one command (a frame array) in wire form.
    pub fn append(&self, command: &Frame) -> Result<(), PersistError> {
        let mut buf = BytesMut::new();
        command.serialize(&mut buf);

        let mut inner = self.inner.lock();
        inner.writer.write_all(&buf)?;
        match self.policy {
            FsyncPolicy::Always => inner.sync()?,
            FsyncPolicy::EverySec => inner.flush()?,
            FsyncPolicy::No => {}
        }
        Ok(())
    }

    /// Stops the background flusher, flushes, and fsyncs. Further
    /// appends still write but no longer get the `everysec` sync.
    pub fn close(&mut self) -> Result<(), PersistError> {
        if let Some((stop_tx, handle)) = self.flusher.take() {
            let _ = stop_tx.send(());
            let _ = handle.join();
        }
        self.inner.lock().sync()?;
        Ok(())
    }
}

impl Drop for AofWriter {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "error closing command log");
        }
    }
}

/// Replays the log at `path`, handing each decoded command array to
/// `execute`. Executor errors (error-frame results) are skipped; replay
/// is best-effort. A missing file is not an error. A truncated trailing
/// frame (crash mid-append) ends the replay cleanly.
///
/// Returns the number of commands dispatched.
pub fn load<F>(path: impl AsRef<Path>, mut execute: F) -> Result<usize, PersistError>
where
    F: FnMut(Vec<Frame>) -> Frame,
{
    let path = path.as_ref();
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no command log, starting empty");
            return Ok(0);
        }
        Err(err) => return Err(err.into()),
    };

    let mut remaining = Bytes::from(raw);
    let mut count = 0usize;
    while !remaining.is_empty() {
        match parse_frame_bytes(&remaining)? {
            Some((Frame::Array(items), consumed)) => {
                remaining = remaining.slice(consumed..);
                if let Frame::Error(msg) = execute(items) {
                    debug!(error = %msg, "replayed command failed, continuing");
                }
                count += 1;
            }
            Some((frame, _)) => {
                warn!(?frame, "log entry is not a command array");
                return Err(PersistError::NotACommand);
            }
            None => {
                warn!(
                    leftover = remaining.len(),
                    "truncated entry at end of command log, stopping replay"
                );
                break;
            }
        }
    }

    info!(path = %path.display(), commands = count, "command log replayed");
    Ok(count)
}

/// Writes a fresh log to `<path>.tmp` that reconstructs `snapshot` when
/// replayed — one all-in-one command per key plus `PEXPIREAT` for keys
/// with an expiry — then atomically renames it over `path`. Empty
/// containers are skipped.
pub fn rewrite(path: impl AsRef<Path>, snapshot: &StoreSnapshot) -> Result<(), PersistError> {
    let path = path.as_ref();
    let tmp_path = tmp_sibling(path);
    let mut guard = TmpGuard::new(&tmp_path);

    let file = File::create(&tmp_path)?;
    let mut writer = BufWriter::new(file);
    let mut buf = BytesMut::new();

    for (key, obj) in &snapshot.data {
        buf.clear();
        if let Some(command) = command_for(key, obj.payload()) {
            command.serialize(&mut buf);
        }
        if let Some(&at_ms) = snapshot.expires.get(key) {
            Frame::Array(vec![
                Frame::bulk("PEXPIREAT"),
                Frame::bulk(key.clone()),
                Frame::bulk(at_ms.to_string()),
            ])
            .serialize(&mut buf);
        }
        writer.write_all(&buf)?;
    }

    writer.flush()?;
    writer.get_ref().sync_all()?;
    drop(writer);

    fs::rename(&tmp_path, path)?;
    guard.disarm();
    info!(path = %path.display(), keys = snapshot.data.len(), "command log rewritten");
    Ok(())
}

/// Builds the single command that recreates one key's value, or `None`
/// for an empty container.
fn command_for(key: &str, payload: &Payload) -> Option<Frame> {
    let items = match payload {
        Payload::Int(n) => vec![
            Frame::bulk("SET"),
            Frame::bulk(key.to_owned()),
            Frame::bulk(n.to_string()),
        ],
        Payload::Embstr(b) | Payload::Raw(b) => vec![
            Frame::bulk("SET"),
            Frame::bulk(key.to_owned()),
            Frame::Bulk(b.clone()),
        ],
        Payload::List(list) => {
            if list.is_empty() {
                return None;
            }
            let mut items = vec![Frame::bulk("RPUSH"), Frame::bulk(key.to_owned())];
            items.extend(list.iter().map(|entry| Frame::Bulk(entry.clone())));
            items
        }
        Payload::Hash(map) => {
            if map.is_empty() {
                return None;
            }
            let mut items = vec![Frame::bulk("HSET"), Frame::bulk(key.to_owned())];
            for (field, value) in map {
                items.push(Frame::bulk(field.clone()));
                items.push(Frame::Bulk(value.clone()));
            }
            items
        }
        Payload::Set(set) => {
            if set.is_empty() {
                return None;
            }
            let mut items = vec![Frame::bulk("SADD"), Frame::bulk(key.to_owned())];
            items.extend(set.iter().map(|member| Frame::bulk(member.clone())));
            items
        }
        Payload::SortedSet(zset) => {
            if zset.is_empty() {
                return None;
            }
            let mut items = vec![Frame::bulk("ZADD"), Frame::bulk(key.to_owned())];
            for (member, score) in zset.iter() {
                items.push(Frame::bulk(format_score(score)));
                items.push(Frame::bulk(member.to_owned()));
            }
            items
        }
    };
    Some(Frame::Array(items))
}

/// Formats a score with enough precision to round-trip, without
/// trailing decoration for whole numbers.
fn format_score(score: f64) -> String {
    if score == score.trunc() && score.is_finite() && score.abs() < 1e15 {
        format!("{}", score as i64)
    } else {
        format!("{score}")
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
