//! Hash accessors.

use bytes::Bytes;

use super::*;
use crate::memory::{HASH_ENTRY_COST, OBJECT_BASE_OVERHEAD};
use crate::object::Payload;

impl Store {
    /// Sets field/value pairs on the hash at `key`, creating it on
    /// demand. Returns the number of fields that were newly created
    /// (updates of existing fields don't count).
    pub fn hset(&mut self, key: &str, pairs: &[(String, Bytes)]) -> Result<usize, StoreError> {
        self.remove_if_expired(key);

        let existing = match self.data.get(key) {
            None => None,
            Some(obj) => match obj.payload() {
                Payload::Hash(map) => Some(map),
                _ => return Err(StoreError::WrongType),
            },
        };

        // count genuinely new fields for the memory reservation,
        // de-duplicating repeats within this call
        let mut seen = std::collections::HashSet::new();
        let mut new_fields = 0usize;
        for (field, _) in pairs {
            let already = existing.is_some_and(|map| map.contains_key(field));
            if !already && seen.insert(field.as_str()) {
                new_fields += 1;
            }
        }

        let is_new_key = existing.is_none();
        let delta = new_fields * HASH_ENTRY_COST
            + if is_new_key {
                memory::key_size(key) + OBJECT_BASE_OVERHEAD
            } else {
                0
            };
        self.charge(key, delta as i64)?;

        let obj = self
            .data
            .entry(key.to_owned())
            .or_insert_with(Object::new_hash);
        obj.touch();
        let mut created = 0;
        match obj.payload_mut() {
            Payload::Hash(map) => {
                for (field, value) in pairs {
                    if map.insert(field.clone(), value.clone()).is_none() {
                        created += 1;
                    }
                }
            }
            _ => return Err(StoreError::WrongType),
        }

        self.notify_modified(key);
        Ok(created)
    }

    /// Returns the value of `field` in the hash at `key`.
    pub fn hget(&mut self, key: &str, field: &str) -> Result<Option<Bytes>, StoreError> {
        match self.live_object_mut(key) {
            Some(obj) => match obj.payload() {
                Payload::Hash(map) => Ok(map.get(field).cloned()),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(None),
        }
    }

    /// Removes fields from the hash at `key`. Returns the number
    /// actually removed. Deletes the key when the hash empties.
    pub fn hdel(&mut self, key: &str, fields: &[String]) -> Result<usize, StoreError> {
        if self.remove_if_expired(key) {
            return Ok(0);
        }
        let (removed, emptied) = match self.data.get_mut(key) {
            Some(obj) => {
                obj.touch();
                match obj.payload_mut() {
                    Payload::Hash(map) => {
                        let mut removed = 0;
                        for field in fields {
                            if map.remove(field).is_some() {
                                removed += 1;
                            }
                        }
                        (removed, map.is_empty())
                    }
                    _ => return Err(StoreError::WrongType),
                }
            }
            None => return Ok(0),
        };

        self.used_memory -= (removed * HASH_ENTRY_COST) as i64;
        if emptied {
            self.remove_entry(key);
        }
        if removed > 0 {
            self.notify_modified(key);
        }
        Ok(removed)
    }

    /// Returns `true` if `field` exists in the hash at `key`.
    pub fn hexists(&mut self, key: &str, field: &str) -> Result<bool, StoreError> {
        match self.live_object_mut(key) {
            Some(obj) => match obj.payload() {
                Payload::Hash(map) => Ok(map.contains_key(field)),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(false),
        }
    }

    /// Returns the number of fields in the hash at `key`; 0 when absent.
    pub fn hlen(&mut self, key: &str) -> Result<usize, StoreError> {
        match self.live_object_mut(key) {
            Some(obj) => match obj.payload() {
                Payload::Hash(map) => Ok(map.len()),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(0),
        }
    }

    /// Returns all field/value pairs of the hash at `key`.
    pub fn hgetall(&mut self, key: &str) -> Result<Vec<(String, Bytes)>, StoreError> {
        match self.live_object_mut(key) {
            Some(obj) => match obj.payload() {
                Payload::Hash(map) => Ok(map
                    .iter()
                    .map(|(field, value)| (field.clone(), value.clone()))
                    .collect()),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(Vec::new()),
        }
    }

    /// Returns all field names of the hash at `key`.
    pub fn hkeys(&mut self, key: &str) -> Result<Vec<String>, StoreError> {
        match self.live_object_mut(key) {
            Some(obj) => match obj.payload() {
                Payload::Hash(map) => Ok(map.keys().cloned().collect()),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(Vec::new()),
        }
    }

    /// Returns all values of the hash at `key`.
    pub fn hvals(&mut self, key: &str) -> Result<Vec<Bytes>, StoreError> {
        match self.live_object_mut(key) {
            Some(obj) => match obj.payload() {
                Payload::Hash(map) => Ok(map.values().cloned().collect()),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(Vec::new()),
        }
    }
}
