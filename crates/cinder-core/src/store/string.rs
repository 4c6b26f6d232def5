//! String accessors.

use bytes::Bytes;

use super::*;
use crate::object::Payload;

/// Result of a SET that may be conditional (NX/XX) or memory-limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetResult {
    /// The key was stored.
    Ok,
    /// NX/XX condition was not met (key existed for NX, or didn't for XX).
    Blocked,
    /// Memory limit reached and eviction couldn't free enough space.
    OutOfMemory,
}

impl Store {
    /// Stores a string value under `key`, replacing whatever was there.
    ///
    /// - `expires_at_ms`: absolute expiry to install; `None` clears any
    ///   prior expiry (a whole-value replace drops the old TTL).
    /// - `nx`: only set if the key does NOT already exist.
    /// - `xx`: only set if the key DOES already exist.
    pub fn set(
        &mut self,
        key: &str,
        value: Bytes,
        expires_at_ms: Option<u64>,
        nx: bool,
        xx: bool,
    ) -> SetResult {
        self.remove_if_expired(key);

        let key_exists = self.data.contains_key(key);
        if nx && key_exists {
            return SetResult::Blocked;
        }
        if xx && !key_exists {
            return SetResult::Blocked;
        }

        let new_obj = Object::new_string(value);
        let new_size = memory::entry_size(key, &new_obj) as i64;
        let old_size = self
            .data
            .get(key)
            .map(|old| memory::entry_size(key, old) as i64)
            .unwrap_or(0);

        if self.charge(key, new_size - old_size).is_err() {
            return SetResult::OutOfMemory;
        }

        self.data.insert(key.to_owned(), new_obj);
        match expires_at_ms {
            Some(at_ms) => {
                self.expires.insert(key.to_owned(), at_ms);
            }
            None => {
                self.expires.remove(key);
            }
        }
        self.notify_modified(key);
        SetResult::Ok
    }

    /// Retrieves the string value for `key`: base-10 text for the
    /// integer encoding, the original bytes otherwise. `None` if the
    /// key is missing or expired; a wrong-type error for container
    /// keys.
    ///
    /// Successful reads stamp the access clock.
    pub fn get(&mut self, key: &str) -> Result<Option<Bytes>, StoreError> {
        if self.remove_if_expired(key) {
            return Ok(None);
        }
        match self.data.get_mut(key) {
            Some(obj) => match obj.string_bytes() {
                Some(bytes) => {
                    obj.touch();
                    Ok(Some(bytes))
                }
                None => Err(StoreError::WrongType),
            },
            None => Ok(None),
        }
    }

    /// Adds `delta` to the integer value of `key`, creating it at 0 if
    /// absent. Returns the new value.
    ///
    /// A typed string mutation: an existing expiry is preserved, unlike
    /// a plain SET.
    pub fn incr_by(&mut self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.remove_if_expired(key);

        let current = match self.data.get(key) {
            Some(obj) => match obj.payload() {
                Payload::Int(n) => *n,
                Payload::Embstr(b) | Payload::Raw(b) => std::str::from_utf8(b)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or(StoreError::NotAnInteger)?,
                _ => return Err(StoreError::WrongType),
            },
            None => 0,
        };

        let new_val = current.checked_add(delta).ok_or(StoreError::Overflow)?;
        let new_obj = Object::new_string(Bytes::from(new_val.to_string()));

        let new_size = memory::entry_size(key, &new_obj) as i64;
        let old_size = self
            .data
            .get(key)
            .map(|old| memory::entry_size(key, old) as i64)
            .unwrap_or(0);
        if self.charge(key, new_size - old_size).is_err() {
            return Err(StoreError::OutOfMemory);
        }

        // expires entry left alone: TTL survives the increment
        self.data.insert(key.to_owned(), new_obj);
        self.notify_modified(key);
        Ok(new_val)
    }
}
