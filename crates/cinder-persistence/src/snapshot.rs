//! Point-in-time snapshot files.
//!
//! File layout (big-endian unless noted):
//!
//! ```text
//! "REDIS" + 4-digit version tag
//! { 0xFA, key, value }*              aux fields (strings)
//! 0xFE, db-number                    only db 0 is accepted on load
//! 0xFB, data-size, expires-size      sizing hint, skipped on load
//! { [0xFC, unix-ms: i64 LE]?, type-byte, key, value }*
//! 0xFF, 8-byte checksum              CRC32 in the low four bytes;
//!                                    readers skip the field entirely
//! ```
//!
//! Lengths use a variable prefix selected by the top two bits of the
//! first byte: `00` → 6-bit value, `01` → 14 bits (top six in the first
//! byte), `10` → 4-byte big-endian u32, `11` → a "special" string form
//! holding a little-endian int8/int16/int32 rendered as decimal text on
//! read. Strings are a length prefix followed by raw bytes.
//!
//! Writes go to `<path>.tmp`, are flushed and fsynced, then atomically
//! renamed — a failed save never corrupts the previous snapshot.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info};

use cinder_core::object::{Object, Payload};
use cinder_core::store::{Store, StoreSnapshot};
use cinder_core::types::quicklist::Quicklist;
use cinder_core::types::sorted_set::SortedSet;
use cinder_core::time;

use crate::{PersistError, TmpGuard};

/// Version rendered into the header tag ("REDIS0009").
pub const SNAPSHOT_VERSION: u32 = 9;

const OP_EOF: u8 = 0xFF;
const OP_SELECT_DB: u8 = 0xFE;
const OP_EXPIRE_SECS: u8 = 0xFD;
const OP_EXPIRE_MS: u8 = 0xFC;
const OP_RESIZE_DB: u8 = 0xFB;
const OP_AUX: u8 = 0xFA;

const TYPE_STRING: u8 = 0;
const TYPE_LIST: u8 = 1;
const TYPE_SET: u8 = 2;
const TYPE_ZSET: u8 = 3;
const TYPE_HASH: u8 = 4;
const TYPE_ZSET_2: u8 = 5;
const TYPE_QUICKLIST: u8 = 14;

// ---------------------------------------------------------------------------
// writer
// ---------------------------------------------------------------------------

/// Serializes snapshot sections into an inner writer, keeping a running
/// CRC over everything written.
pub struct SnapshotWriter<W: Write> {
    writer: W,
    hasher: crc32fast::Hasher,
}

impl<W: Write> SnapshotWriter<W> {
    /// Wraps a writer. Call the section methods in file order.
    pub fn new(writer: W) -> SnapshotWriter<W> {
        SnapshotWriter {
            writer,
            hasher: crc32fast::Hasher::new(),
        }
    }

    fn put(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.hasher.update(bytes);
        self.writer.write_all(bytes)
    }

    fn put_u8(&mut self, byte: u8) -> io::Result<()> {
        self.put(&[byte])
    }

    /// Writes the magic plus zero-padded version tag.
    pub fn write_header(&mut self) -> io::Result<()> {
        let header = format!("REDIS{SNAPSHOT_VERSION:04}");
        self.put(header.as_bytes())
    }

    /// Writes one auxiliary key/value field.
    pub fn write_aux(&mut self, key: &str, value: &str) -> io::Result<()> {
        self.put_u8(OP_AUX)?;
        self.write_string(key.as_bytes())?;
        self.write_string(value.as_bytes())
    }

    /// Writes the database selector.
    pub fn write_select_db(&mut self, db: u64) -> io::Result<()> {
        self.put_u8(OP_SELECT_DB)?;
        self.write_length(db)
    }

    /// Writes the keyspace sizing hint.
    pub fn write_resize_db(&mut self, data_size: u64, expires_size: u64) -> io::Result<()> {
        self.put_u8(OP_RESIZE_DB)?;
        self.write_length(data_size)?;
        self.write_length(expires_size)
    }

    /// Writes one entry: optional expiry opcode, type byte, key, value.
    pub fn write_entry(
        &mut self,
        key: &str,
        obj: &Object,
        expire_at_ms: Option<u64>,
    ) -> io::Result<()> {
        if let Some(at_ms) = expire_at_ms {
            self.put_u8(OP_EXPIRE_MS)?;
            self.put(&(at_ms as i64).to_le_bytes())?;
        }

        match obj.payload() {
            Payload::Int(_) | Payload::Embstr(_) | Payload::Raw(_) => {
                self.put_u8(TYPE_STRING)?;
                self.write_string(key.as_bytes())?;
                let value = obj.string_bytes().unwrap_or_default();
                self.write_string(&value)
            }
            Payload::List(list) => {
                self.put_u8(TYPE_QUICKLIST)?;
                self.write_string(key.as_bytes())?;
                self.write_length(list.len() as u64)?;
                for entry in list.iter() {
                    self.write_string(entry)?;
                }
                Ok(())
            }
            Payload::Set(set) => {
                self.put_u8(TYPE_SET)?;
                self.write_string(key.as_bytes())?;
                self.write_length(set.len() as u64)?;
                for member in set {
                    self.write_string(member.as_bytes())?;
                }
                Ok(())
            }
            Payload::Hash(map) => {
                self.put_u8(TYPE_HASH)?;
                self.write_string(key.as_bytes())?;
                self.write_length(map.len() as u64)?;
                for (field, value) in map {
                    self.write_string(field.as_bytes())?;
                    self.write_string(value)?;
                }
                Ok(())
            }
            Payload::SortedSet(zset) => {
                self.put_u8(TYPE_ZSET_2)?;
                self.write_string(key.as_bytes())?;
                self.write_length(zset.len() as u64)?;
                for (member, score) in zset.iter() {
                    self.write_string(member.as_bytes())?;
                    self.put(&score.to_le_bytes())?;
                }
                Ok(())
            }
        }
    }

    /// Writes the EOF opcode and the 8-byte checksum field (CRC32 of
    /// everything before it, zero-padded to eight bytes).
    pub fn write_eof(mut self) -> io::Result<W> {
        self.put_u8(OP_EOF)?;
        let crc = self.hasher.clone().finalize();
        let mut trailer = [0u8; 8];
        trailer[..4].copy_from_slice(&crc.to_le_bytes());
        self.writer.write_all(&trailer)?;
        Ok(self.writer)
    }

    fn write_length(&mut self, len: u64) -> io::Result<()> {
        if len < 64 {
            self.put_u8(len as u8)
        } else if len < 16384 {
            self.put_u8(0x40 | (len >> 8) as u8)?;
            self.put_u8((len & 0xFF) as u8)
        } else {
            self.put_u8(0x80)?;
            self.put(&(len as u32).to_be_bytes())
        }
    }

    fn write_string(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_length(data.len() as u64)?;
        self.put(data)
    }
}

/// Serializes a store snapshot to `path` via a temp file and atomic
/// rename.
pub fn save(path: impl AsRef<Path>, snapshot: &StoreSnapshot) -> Result<(), PersistError> {
    let path = path.as_ref();
    let tmp_path = tmp_sibling(path);
    let mut guard = TmpGuard::new(&tmp_path);

    let file = File::create(&tmp_path)?;
    let mut writer = SnapshotWriter::new(BufWriter::new(file));

    writer.write_header()?;
    writer.write_aux("redis-ver", "7.0.0")?;
    writer.write_aux("redis-bits", "64")?;
    writer.write_aux("ctime", &(time::now_ms() / 1000).to_string())?;
    writer.write_select_db(0)?;
    writer.write_resize_db(snapshot.data.len() as u64, snapshot.expires.len() as u64)?;

    for (key, obj) in &snapshot.data {
        writer.write_entry(key, obj, snapshot.expires.get(key).copied())?;
    }

    let mut buffered = writer.write_eof()?;
    buffered.flush()?;
    buffered.get_ref().sync_all()?;
    drop(buffered);

    fs::rename(&tmp_path, path)?;
    guard.disarm();
    info!(path = %path.display(), keys = snapshot.data.len(), "snapshot saved");
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

// ---------------------------------------------------------------------------
// reader
// ---------------------------------------------------------------------------

/// Streams entries out of a snapshot file.
pub struct SnapshotReader<R: Read> {
    reader: R,
}

impl<R: Read> SnapshotReader<R> {
    /// Wraps a reader positioned at the start of the file.
    pub fn new(reader: R) -> SnapshotReader<R> {
        SnapshotReader { reader }
    }

    fn read_u8(&mut self) -> Result<u8, PersistError> {
        let mut buf = [0u8; 1];
        self.reader.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, PersistError> {
        let mut buf = vec![0u8; n];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Verifies the magic and version tag.
    pub fn read_header(&mut self) -> Result<(), PersistError> {
        let header = self.read_exact(9)?;
        let expected = format!("REDIS{SNAPSHOT_VERSION:04}");
        if header != expected.as_bytes() {
            return Err(PersistError::InvalidHeader);
        }
        Ok(())
    }

    /// Decodes a length prefix. The bool marks the "special" integer
    /// string form; the value is then the sub-type selector.
    fn read_length(&mut self) -> Result<(u32, bool), PersistError> {
        let b = self.read_u8()?;
        match (b & 0xC0) >> 6 {
            0 => Ok(((b & 0x3F) as u32, false)),
            1 => {
                let next = self.read_u8()?;
                Ok((((b & 0x3F) as u32) << 8 | next as u32, false))
            }
            2 => {
                let buf = self.read_exact(4)?;
                Ok((u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]), false))
            }
            _ => Ok(((b & 0x3F) as u32, true)),
        }
    }

    /// Reads a length-prefixed string, rendering the special integer
    /// forms as decimal text.
    fn read_string(&mut self) -> Result<Vec<u8>, PersistError> {
        let (length, special) = self.read_length()?;
        if special {
            return match length {
                0 => {
                    let b = self.read_u8()?;
                    Ok((b as i8).to_string().into_bytes())
                }
                1 => {
                    let buf = self.read_exact(2)?;
                    Ok(i16::from_le_bytes([buf[0], buf[1]]).to_string().into_bytes())
                }
                2 => {
                    let buf = self.read_exact(4)?;
                    Ok(i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
                        .to_string()
                        .into_bytes())
                }
                _ => Err(PersistError::InvalidLength),
            };
        }
        self.read_exact(length as usize)
    }

    fn read_text(&mut self, what: &'static str) -> Result<String, PersistError> {
        String::from_utf8(self.read_string()?).map_err(|_| PersistError::NotUtf8(what))
    }

    fn read_value(&mut self, type_byte: u8) -> Result<Object, PersistError> {
        match type_byte {
            TYPE_STRING => {
                let value = self.read_string()?;
                Ok(Object::new_string(Bytes::from(value)))
            }
            TYPE_LIST | TYPE_QUICKLIST => {
                let (count, _) = self.read_length()?;
                let mut list = Quicklist::new();
                for _ in 0..count {
                    list.push_tail(Bytes::from(self.read_string()?));
                }
                Ok(Object::from_payload(Payload::List(list)))
            }
            TYPE_SET => {
                let (count, _) = self.read_length()?;
                let mut set = std::collections::HashSet::with_capacity(count as usize);
                for _ in 0..count {
                    set.insert(self.read_text("set member")?);
                }
                Ok(Object::from_payload(Payload::Set(set)))
            }
            TYPE_HASH => {
                let (count, _) = self.read_length()?;
                let mut map = std::collections::HashMap::with_capacity(count as usize);
                for _ in 0..count {
                    let field = self.read_text("hash field")?;
                    let value = self.read_string()?;
                    map.insert(field, Bytes::from(value));
                }
                Ok(Object::from_payload(Payload::Hash(map)))
            }
            TYPE_ZSET | TYPE_ZSET_2 => {
                let (count, _) = self.read_length()?;
                let mut zset = SortedSet::new();
                for _ in 0..count {
                    let member = self.read_text("sorted-set member")?;
                    let buf = self.read_exact(8)?;
                    let score = f64::from_le_bytes([
                        buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
                    ]);
                    zset.add(score, &member);
                }
                Ok(Object::from_payload(Payload::SortedSet(zset)))
            }
            other => Err(PersistError::UnknownType(other)),
        }
    }
}

/// Loads a snapshot file into `store`. A missing file is not an error —
/// the store is simply left as is. Returns the number of keys loaded.
pub fn load(path: impl AsRef<Path>, store: &mut Store) -> Result<usize, PersistError> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no snapshot file, starting empty");
            return Ok(0);
        }
        Err(err) => return Err(err.into()),
    };

    let mut reader = SnapshotReader::new(BufReader::new(file));
    reader.read_header()?;

    let mut loaded = 0usize;
    // expiry opcodes latch a timestamp consumed by the next entry
    let mut pending_expiry: Option<u64> = None;

    loop {
        let opcode = reader.read_u8()?;
        match opcode {
            OP_EOF => {
                // trailing checksum is best-effort; a short read here is
                // still a clean end of file
                let mut trailer = [0u8; 8];
                let _ = reader.reader.read_exact(&mut trailer);
                break;
            }
            OP_SELECT_DB => {
                let (db, _) = reader.read_length()?;
                if db != 0 {
                    return Err(PersistError::UnsupportedDb(db));
                }
            }
            OP_EXPIRE_SECS => {
                let buf = reader.read_exact(4)?;
                let secs = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
                pending_expiry = Some(secs as u64 * 1000);
            }
            OP_EXPIRE_MS => {
                let buf = reader.read_exact(8)?;
                let ms = i64::from_le_bytes([
                    buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
                ]);
                pending_expiry = Some(ms.max(0) as u64);
            }
            OP_RESIZE_DB => {
                reader.read_length()?;
                reader.read_length()?;
            }
            OP_AUX => {
                let key = reader.read_string()?;
                let value = reader.read_string()?;
                debug!(
                    key = %String::from_utf8_lossy(&key),
                    value = %String::from_utf8_lossy(&value),
                    "snapshot aux field"
                );
            }
            type_byte => {
                let key = reader.read_text("key")?;
                let obj = reader.read_value(type_byte)?;
                store.set_object(&key, obj);
                // an already-past expiry is dropped; the key itself is
                // still created
                if let Some(at_ms) = pending_expiry.take() {
                    if at_ms > time::now_ms() {
                        store.set_object_expire(&key, at_ms);
                    }
                }
                loaded += 1;
            }
        }
    }

    info!(path = %path.display(), keys = loaded, "snapshot loaded");
    Ok(loaded)
}
