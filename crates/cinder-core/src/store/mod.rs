//! The keyspace.
//!
//! A [`Store`] owns two maps — `data` (key → object) and `expires`
//! (key → absolute expiry) — and every typed accessor the command layer
//! uses. A key is live iff present in `data` and not past its expiry;
//! any accessor that observes an expired key deletes it in place and
//! reports "not found" (lazy expiry). Because of that, accessors that
//! can observe expiry take `&mut self`; the server wraps the store in a
//! reader/writer lock and routes them through the write half.
//!
//! Every mutation fires the key-modified callback (installed by the
//! server for WATCH invalidation) before returning. Memory usage is
//! tracked incrementally on every mutation for eviction and stats.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use thiserror::Error;

use crate::eviction::EvictionConfig;
use crate::memory;
use crate::object::{Encoding, Object, ObjectKind};
use crate::time;

mod hash;
mod list;
mod set;
mod string;
mod zset;

pub use string::SetResult;

/// One error type for every way a store accessor can fail. The
/// `Display` text is the exact wire error string, so the command layer
/// replies with `to_string()` and nothing else.
///
/// Read accessors only ever produce [`StoreError::WrongType`]; the
/// remaining variants come out of writes (eviction shortfall) and the
/// arithmetic in INCR/DECR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The operation doesn't apply to the type stored under this key.
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    /// Over the memory limit and eviction couldn't free enough.
    #[error("OOM command not allowed when used memory > 'maxmemory'")]
    OutOfMemory,

    /// The stored string doesn't parse as a signed 64-bit integer.
    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    /// The increment would step outside the i64 range.
    #[error("ERR increment or decrement would overflow")]
    Overflow,
}

/// Callback fired on every key mutation, installed by the server so
/// WATCHing sessions can be marked dirty. Registered at construction
/// time rather than through a global, so independent stores can coexist
/// in tests.
pub type KeyModifiedCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// A decoupled point-in-time copy of the keyspace. Container payloads
/// are deep-cloned, so the live store may keep mutating while a
/// background save serializes this.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    /// Live entries at snapshot time.
    pub data: AHashMap<String, Object>,
    /// Absolute expiries (unix ms) for the keys that have one.
    pub expires: AHashMap<String, u64>,
}

/// Aggregate counters for INFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of live keys.
    pub keys: usize,
    /// Number of live keys with an expiry set.
    pub expires: usize,
    /// Estimated memory usage in bytes.
    pub used_memory: u64,
    /// Cumulative count of keys removed by lazy expiration.
    pub expired_total: u64,
    /// Cumulative count of keys removed by eviction.
    pub evicted_total: u64,
}

/// The keyspace: key → object plus key → expiry.
pub struct Store {
    pub(crate) data: AHashMap<String, Object>,
    pub(crate) expires: AHashMap<String, u64>,
    pub(crate) eviction: Option<EvictionConfig>,
    /// Signed so transient rollback arithmetic can't underflow.
    pub(crate) used_memory: i64,
    pub(crate) expired_total: u64,
    pub(crate) evicted_total: u64,
    on_modified: Option<KeyModifiedCallback>,
}

impl Store {
    /// Creates an empty store with no memory limit.
    pub fn new() -> Store {
        Store {
            data: AHashMap::new(),
            expires: AHashMap::new(),
            eviction: None,
            used_memory: 0,
            expired_total: 0,
            evicted_total: 0,
            on_modified: None,
        }
    }

    /// Creates an empty store with the given eviction configuration.
    pub fn with_eviction(config: EvictionConfig) -> Store {
        let mut store = Store::new();
        store.eviction = Some(config);
        store
    }

    /// Installs the key-modified callback.
    pub fn set_key_modified_handler(&mut self, handler: KeyModifiedCallback) {
        self.on_modified = Some(handler);
    }

    /// Installs or replaces the eviction configuration.
    pub fn set_eviction_config(&mut self, config: EvictionConfig) {
        self.eviction = Some(config);
    }

    /// Returns the eviction configuration, if any.
    pub fn eviction_config(&self) -> Option<&EvictionConfig> {
        self.eviction.as_ref()
    }

    pub(crate) fn notify_modified(&self, key: &str) {
        if let Some(handler) = &self.on_modified {
            handler(key);
        }
    }

    /// Checks whether `key` has a passed expiry and removes it if so.
    /// Returns `true` if the key was expired (and is now gone).
    pub(crate) fn remove_if_expired(&mut self, key: &str) -> bool {
        let expired = self
            .expires
            .get(key)
            .is_some_and(|&at_ms| time::has_passed(at_ms));
        if expired {
            self.remove_entry(key);
            self.expired_total += 1;
        }
        expired
    }

    /// Removes a key from both maps and updates memory accounting.
    /// Does not fire the modified callback.
    pub(crate) fn remove_entry(&mut self, key: &str) -> Option<Object> {
        let obj = self.data.remove(key)?;
        self.expires.remove(key);
        self.used_memory -= memory::entry_size(key, &obj) as i64;
        Some(obj)
    }

    /// Returns the live object under `key` for reading or in-place
    /// mutation, running lazy expiry first and stamping the access
    /// clock.
    pub(crate) fn live_object_mut(&mut self, key: &str) -> Option<&mut Object> {
        if self.remove_if_expired(key) {
            return None;
        }
        let obj = self.data.get_mut(key)?;
        obj.touch();
        Some(obj)
    }

    /// Is the key live: present and not past its expiry?
    fn is_live(&self, key: &str) -> bool {
        self.data.contains_key(key)
            && !self
                .expires
                .get(key)
                .is_some_and(|&at_ms| time::has_passed(at_ms))
    }

    // -- keyspace operations --

    /// Returns `true` if the key exists and hasn't expired.
    pub fn exists(&mut self, key: &str) -> bool {
        if self.remove_if_expired(key) {
            return false;
        }
        self.data.contains_key(key)
    }

    /// Removes a key. Returns `true` if the key existed (and wasn't
    /// expired).
    pub fn del(&mut self, key: &str) -> bool {
        if self.remove_if_expired(key) {
            return false;
        }
        if self.remove_entry(key).is_some() {
            self.notify_modified(key);
            true
        } else {
            false
        }
    }

    /// Returns the logical type of the value under `key`.
    pub fn kind(&mut self, key: &str) -> Option<ObjectKind> {
        if self.remove_if_expired(key) {
            return None;
        }
        self.data.get(key).map(Object::kind)
    }

    /// Returns the physical encoding of the value under `key`.
    pub fn encoding(&mut self, key: &str) -> Option<Encoding> {
        if self.remove_if_expired(key) {
            return None;
        }
        self.data.get(key).map(Object::encoding)
    }

    /// Sets an expiry `ttl` from now on an existing key. Returns `true`
    /// if the key exists.
    pub fn expire_in(&mut self, key: &str, ttl: Duration) -> bool {
        self.expire_at_ms(key, time::expiry_in(ttl))
    }

    /// Sets an absolute expiry (unix ms) on an existing key. Returns
    /// `true` if the key exists.
    pub fn expire_at_ms(&mut self, key: &str, at_ms: u64) -> bool {
        if self.remove_if_expired(key) {
            return false;
        }
        if !self.data.contains_key(key) {
            return false;
        }
        self.expires.insert(key.to_owned(), at_ms);
        self.notify_modified(key);
        true
    }

    /// Returns the absolute expiry (unix ms) of a live key, or `None`
    /// when the key is absent or has no expiry.
    pub fn expiry_of(&mut self, key: &str) -> Option<u64> {
        if self.remove_if_expired(key) {
            return None;
        }
        self.expires.get(key).copied()
    }

    /// Returns all live keys. Expired-but-not-yet-collected keys are
    /// skipped without being deleted, so this can run under a shared
    /// borrow.
    pub fn keys(&self) -> Vec<String> {
        if self.data.len() > 10_000 {
            tracing::warn!(key_count = self.data.len(), "KEYS scan on large keyspace");
        }
        self.data
            .keys()
            .filter(|key| self.is_live(key))
            .cloned()
            .collect()
    }

    /// Returns the number of live keys.
    pub fn len(&self) -> usize {
        self.data.keys().filter(|key| self.is_live(key)).count()
    }

    /// Returns `true` if the store holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Removes every key and resets accounting.
    pub fn flush(&mut self) {
        let keys: Vec<String> = self.data.keys().cloned().collect();
        self.data.clear();
        self.expires.clear();
        self.used_memory = 0;
        for key in &keys {
            self.notify_modified(key);
        }
    }

    /// Returns the estimated memory usage in bytes.
    pub fn used_memory(&self) -> u64 {
        self.used_memory.max(0) as u64
    }

    /// Returns aggregate counters.
    pub fn stats(&self) -> StoreStats {
        let keys = self.len();
        let expires = self
            .expires
            .keys()
            .filter(|key| self.is_live(key))
            .count();
        StoreStats {
            keys,
            expires,
            used_memory: self.used_memory(),
            expired_total: self.expired_total,
            evicted_total: self.evicted_total,
        }
    }

    /// Returns a decoupled copy of the live keyspace. Subsequent store
    /// mutations are not visible in the returned snapshot.
    pub fn snapshot(&self) -> StoreSnapshot {
        let mut data = AHashMap::with_capacity(self.data.len());
        let mut expires = AHashMap::new();
        for (key, obj) in &self.data {
            if !self.is_live(key) {
                continue;
            }
            data.insert(key.clone(), obj.clone());
            if let Some(&at_ms) = self.expires.get(key) {
                expires.insert(key.clone(), at_ms);
            }
        }
        StoreSnapshot { data, expires }
    }

    /// Replaces the entire keyspace with a snapshot's contents and
    /// recomputes memory accounting. Load path only.
    pub fn restore_snapshot(&mut self, snapshot: StoreSnapshot) {
        self.used_memory = snapshot
            .data
            .iter()
            .map(|(key, obj)| memory::entry_size(key, obj) as i64)
            .sum();
        self.data = snapshot.data;
        self.expires = snapshot.expires;
    }

    /// Installs an object under a key, replacing any existing value.
    /// Load path: bypasses NX/XX and expiry clearing, but keeps memory
    /// accounting coherent and fires the modified callback.
    pub fn set_object(&mut self, key: &str, obj: Object) {
        let new_size = memory::entry_size(key, &obj) as i64;
        let old_size = self
            .data
            .get(key)
            .map(|old| memory::entry_size(key, old) as i64)
            .unwrap_or(0);
        self.used_memory += new_size - old_size;
        self.data.insert(key.to_owned(), obj);
        self.notify_modified(key);
    }

    /// Installs an absolute expiry for a key. Load path only.
    pub fn set_object_expire(&mut self, key: &str, at_ms: u64) {
        self.expires.insert(key.to_owned(), at_ms);
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;

    use super::*;

    fn set(store: &mut Store, key: &str, value: &str) {
        assert_eq!(
            store.set(key, Bytes::copy_from_slice(value.as_bytes()), None, false, false),
            SetResult::Ok
        );
    }

    #[test]
    fn del_existing() {
        let mut store = Store::new();
        set(&mut store, "key", "val");
        assert!(store.del("key"));
        assert_eq!(store.get("key").unwrap(), None);
    }

    #[test]
    fn del_missing() {
        let mut store = Store::new();
        assert!(!store.del("nope"));
    }

    #[test]
    fn exists_present_and_absent() {
        let mut store = Store::new();
        set(&mut store, "yes", "here");
        assert!(store.exists("yes"));
        assert!(!store.exists("no"));
    }

    #[test]
    fn kind_and_encoding() {
        let mut store = Store::new();
        set(&mut store, "s", "hello");
        set(&mut store, "n", "42");
        store.rpush("l", &[Bytes::from("a")]).unwrap();
        store.zadd("z", &[(1.0, "m".into())]).unwrap();

        assert_eq!(store.kind("s"), Some(ObjectKind::String));
        assert_eq!(store.encoding("s"), Some(Encoding::Embstr));
        assert_eq!(store.encoding("n"), Some(Encoding::Int));
        assert_eq!(store.kind("l"), Some(ObjectKind::List));
        assert_eq!(store.encoding("l"), Some(Encoding::Quicklist));
        assert_eq!(store.kind("z"), Some(ObjectKind::SortedSet));
        assert_eq!(store.encoding("z"), Some(Encoding::Skiplist));
        assert_eq!(store.kind("missing"), None);
    }

    #[test]
    fn expired_key_reads_as_absent() {
        let mut store = Store::new();
        let past = time::now_ms().saturating_sub(10);
        store.set("temp", Bytes::from("v"), Some(past), false, false);
        assert_eq!(store.get("temp").unwrap(), None);
        assert!(!store.exists("temp"));
        // lazy delete removed it from both maps
        assert!(store.data.get("temp").is_none());
        assert!(store.expires.get("temp").is_none());
    }

    #[test]
    fn expire_on_existing_key() {
        let mut store = Store::new();
        set(&mut store, "key", "val");
        assert!(store.expire_in("key", Duration::from_secs(60)));
        let at = store.expiry_of("key").unwrap();
        assert!(at > time::now_ms());
    }

    #[test]
    fn expire_on_missing_key() {
        let mut store = Store::new();
        assert!(!store.expire_in("missing", Duration::from_secs(60)));
    }

    #[test]
    fn expires_map_only_holds_data_keys() {
        let mut store = Store::new();
        store.set("a", Bytes::from("1"), Some(time::now_ms() + 60_000), false, false);
        store.del("a");
        assert!(store.expires.is_empty());
    }

    #[test]
    fn keys_skips_expired_without_deleting() {
        let mut store = Store::new();
        set(&mut store, "live", "1");
        store.set("dead", Bytes::from("2"), Some(time::now_ms().saturating_sub(1)), false, false);

        assert_eq!(store.keys(), vec!["live".to_owned()]);
        // the expired entry is still physically present until a
        // mutating accessor touches it
        assert!(store.data.contains_key("dead"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn flush_clears_everything() {
        let mut store = Store::new();
        set(&mut store, "a", "1");
        store.rpush("l", &[Bytes::from("x")]).unwrap();
        store.flush();
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.used_memory(), 0);
    }

    #[test]
    fn modified_callback_fires_on_writes() {
        let mut store = Store::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        store.set_key_modified_handler(Arc::new(move |_key| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        set(&mut store, "k", "v"); // 1
        store.del("k"); // 2
        store.rpush("l", &[Bytes::from("a")]).unwrap(); // 3
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn modified_callback_not_fired_on_reads() {
        let mut store = Store::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        set(&mut store, "k", "v");
        store.set_key_modified_handler(Arc::new(move |_key| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let _ = store.get("k");
        let _ = store.exists("k");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn memory_tracks_set_and_del() {
        let mut store = Store::new();
        assert_eq!(store.used_memory(), 0);
        set(&mut store, "key", "value");
        let after_set = store.used_memory();
        assert!(after_set > 0);
        store.del("key");
        assert_eq!(store.used_memory(), 0);
    }

    #[test]
    fn memory_adjusts_on_overwrite() {
        let mut store = Store::new();
        set(&mut store, "key", "short");
        let small = store.used_memory();
        set(&mut store, "key", &"x".repeat(200));
        assert!(store.used_memory() > small);
        store.del("key");
        assert_eq!(store.used_memory(), 0);
    }

    #[test]
    fn snapshot_is_decoupled_from_live_store() {
        let mut store = Store::new();
        set(&mut store, "k", "before");
        store.rpush("l", &[Bytes::from("a")]).unwrap();

        let snap = store.snapshot();
        set(&mut store, "k", "after");
        store.rpush("l", &[Bytes::from("b")]).unwrap();
        store.del("l");

        assert_eq!(
            snap.data.get("k").and_then(Object::string_bytes),
            Some(Bytes::from("before"))
        );
        match snap.data.get("l").map(|o| o.payload()) {
            Some(crate::object::Payload::List(q)) => assert_eq!(q.len(), 1),
            other => panic!("expected list in snapshot, got {other:?}"),
        }
    }

    #[test]
    fn snapshot_skips_expired_entries() {
        let mut store = Store::new();
        set(&mut store, "live", "1");
        store.set("dead", Bytes::from("2"), Some(time::now_ms().saturating_sub(1)), false, false);

        let snap = store.snapshot();
        assert!(snap.data.contains_key("live"));
        assert!(!snap.data.contains_key("dead"));
    }

    #[test]
    fn restore_snapshot_replaces_contents() {
        let mut source = Store::new();
        set(&mut source, "a", "1");
        source.set("b", Bytes::from("2"), Some(time::now_ms() + 60_000), false, false);
        let snap = source.snapshot();

        let mut target = Store::new();
        set(&mut target, "stale", "x");
        target.restore_snapshot(snap);

        assert_eq!(target.get("a").unwrap(), Some(Bytes::from("1")));
        assert_eq!(target.get("b").unwrap(), Some(Bytes::from("2")));
        assert_eq!(target.get("stale").unwrap(), None);
        assert!(target.expiry_of("b").is_some());
        assert!(target.used_memory() > 0);
    }

    #[test]
    fn set_object_accounts_memory() {
        let mut store = Store::new();
        store.set_object("k", Object::new_string(Bytes::from("hello")));
        assert!(store.used_memory() > 0);
        store.set_object("k", Object::new_string(Bytes::from("hi")));
        store.del("k");
        assert_eq!(store.used_memory(), 0);
    }

    #[test]
    fn set_object_expire_in_past_expires_on_read() {
        let mut store = Store::new();
        store.set_object("k", Object::new_string(Bytes::from("v")));
        store.set_object_expire("k", time::now_ms().saturating_sub(5));
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn stats_counts_live_keys_and_expiries() {
        let mut store = Store::new();
        set(&mut store, "a", "1");
        store.set("b", Bytes::from("2"), Some(time::now_ms() + 60_000), false, false);
        let stats = store.stats();
        assert_eq!(stats.keys, 2);
        assert_eq!(stats.expires, 1);
        assert!(stats.used_memory > 0);
    }
}
