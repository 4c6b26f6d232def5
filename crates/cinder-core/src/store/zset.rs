//! Sorted-set accessors.

use super::*;
use crate::memory::{OBJECT_BASE_OVERHEAD, ZSET_ENTRY_COST};
use crate::object::Payload;

impl Store {
    /// Adds or rescores (score, member) pairs on the sorted set at
    /// `key`, creating it on demand. Returns the number of members that
    /// were newly added (rescores don't count).
    pub fn zadd(&mut self, key: &str, pairs: &[(f64, String)]) -> Result<usize, StoreError> {
        self.remove_if_expired(key);

        let existing = match self.data.get(key) {
            None => None,
            Some(obj) => match obj.payload() {
                Payload::SortedSet(zset) => Some(zset),
                _ => return Err(StoreError::WrongType),
            },
        };

        let mut seen = std::collections::HashSet::new();
        let mut new_members = 0usize;
        for (_, member) in pairs {
            let already = existing.is_some_and(|zset| zset.contains(member));
            if !already && seen.insert(member.as_str()) {
                new_members += 1;
            }
        }

        let is_new_key = existing.is_none();
        let delta = new_members * ZSET_ENTRY_COST
            + if is_new_key {
                memory::key_size(key) + OBJECT_BASE_OVERHEAD
            } else {
                0
            };
        self.charge(key, delta as i64)?;

        let obj = self
            .data
            .entry(key.to_owned())
            .or_insert_with(Object::new_sorted_set);
        obj.touch();
        let mut added = 0;
        match obj.payload_mut() {
            Payload::SortedSet(zset) => {
                for (score, member) in pairs {
                    if zset.add(*score, member) {
                        added += 1;
                    }
                }
            }
            _ => return Err(StoreError::WrongType),
        }

        self.notify_modified(key);
        Ok(added)
    }

    /// Removes members from the sorted set at `key`. Returns the number
    /// actually removed. Deletes the key when the set empties.
    pub fn zrem(&mut self, key: &str, members: &[String]) -> Result<usize, StoreError> {
        if self.remove_if_expired(key) {
            return Ok(0);
        }
        let (removed, emptied) = match self.data.get_mut(key) {
            Some(obj) => {
                obj.touch();
                match obj.payload_mut() {
                    Payload::SortedSet(zset) => {
                        let mut removed = 0;
                        for member in members {
                            if zset.remove(member) {
                                removed += 1;
                            }
                        }
                        (removed, zset.is_empty())
                    }
                    _ => return Err(StoreError::WrongType),
                }
            }
            None => return Ok(0),
        };

        self.used_memory -= (removed * ZSET_ENTRY_COST) as i64;
        if emptied {
            self.remove_entry(key);
        }
        if removed > 0 {
            self.notify_modified(key);
        }
        Ok(removed)
    }

    /// Returns the score of `member` in the sorted set at `key`.
    pub fn zscore(&mut self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        match self.live_object_mut(key) {
            Some(obj) => match obj.payload() {
                Payload::SortedSet(zset) => Ok(zset.score(member)),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(None),
        }
    }

    /// Returns the cardinality of the sorted set at `key`; 0 when
    /// absent.
    pub fn zcard(&mut self, key: &str) -> Result<usize, StoreError> {
        match self.live_object_mut(key) {
            Some(obj) => match obj.payload() {
                Payload::SortedSet(zset) => Ok(zset.len()),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(0),
        }
    }

    /// Returns the 0-based rank of `member` (lowest score first), or
    /// `None` when the member or key is absent.
    pub fn zrank(&mut self, key: &str, member: &str) -> Result<Option<usize>, StoreError> {
        match self.live_object_mut(key) {
            Some(obj) => match obj.payload() {
                Payload::SortedSet(zset) => Ok(zset.rank(member)),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(None),
        }
    }

    /// Returns (member, score) pairs between 0-based ranks `start` and
    /// `stop` inclusive, negative indices counting from the end.
    pub fn zrange(
        &mut self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        match self.live_object_mut(key) {
            Some(obj) => match obj.payload() {
                Payload::SortedSet(zset) => Ok(zset.range(start, stop)),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(Vec::new()),
        }
    }
}
