//! List accessors.

use bytes::Bytes;

use super::*;
use crate::memory::{LIST_ENTRY_COST, OBJECT_BASE_OVERHEAD};
use crate::object::Payload;

impl Store {
    /// Prepends values to the list at `key`, creating it on demand.
    /// Returns the list length after the pushes.
    pub fn lpush(&mut self, key: &str, values: &[Bytes]) -> Result<usize, StoreError> {
        self.push_list(key, values, true)
    }

    /// Appends values to the list at `key`, creating it on demand.
    /// Returns the list length after the pushes.
    pub fn rpush(&mut self, key: &str, values: &[Bytes]) -> Result<usize, StoreError> {
        self.push_list(key, values, false)
    }

    fn push_list(&mut self, key: &str, values: &[Bytes], head: bool) -> Result<usize, StoreError> {
        self.remove_if_expired(key);

        let is_new = match self.data.get(key) {
            None => true,
            Some(obj) => match obj.payload() {
                Payload::List(_) => false,
                _ => return Err(StoreError::WrongType),
            },
        };

        let delta = values.len() * LIST_ENTRY_COST
            + if is_new {
                memory::key_size(key) + OBJECT_BASE_OVERHEAD
            } else {
                0
            };
        self.charge(key, delta as i64)?;

        let obj = self
            .data
            .entry(key.to_owned())
            .or_insert_with(Object::new_list);
        obj.touch();
        let len = match obj.payload_mut() {
            Payload::List(list) => {
                for value in values {
                    if head {
                        list.push_head(value.clone());
                    } else {
                        list.push_tail(value.clone());
                    }
                }
                list.len()
            }
            _ => return Err(StoreError::WrongType),
        };

        self.notify_modified(key);
        Ok(len)
    }

    /// Pops the first element of the list at `key`. Deletes the key
    /// when the last element is removed.
    pub fn lpop(&mut self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.pop_list(key, true)
    }

    /// Pops the last element of the list at `key`. Deletes the key when
    /// the last element is removed.
    pub fn rpop(&mut self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.pop_list(key, false)
    }

    fn pop_list(&mut self, key: &str, head: bool) -> Result<Option<Bytes>, StoreError> {
        if self.remove_if_expired(key) {
            return Ok(None);
        }
        let (value, emptied) = match self.data.get_mut(key) {
            Some(obj) => {
                obj.touch();
                match obj.payload_mut() {
                    Payload::List(list) => {
                        let popped = if head { list.pop_head() } else { list.pop_tail() };
                        match popped {
                            Some(value) => (value, list.is_empty()),
                            None => return Ok(None),
                        }
                    }
                    _ => return Err(StoreError::WrongType),
                }
            }
            None => return Ok(None),
        };

        self.used_memory -= LIST_ENTRY_COST as i64;
        if emptied {
            self.remove_entry(key);
        }
        self.notify_modified(key);
        Ok(Some(value))
    }

    /// Returns the length of the list at `key`; 0 when absent.
    pub fn llen(&mut self, key: &str) -> Result<usize, StoreError> {
        match self.live_object_mut(key) {
            Some(obj) => match obj.payload() {
                Payload::List(list) => Ok(list.len()),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(0),
        }
    }

    /// Returns the elements between `start` and `stop` inclusive,
    /// resolving negative indices; empty when the key is absent.
    pub fn lrange(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<Bytes>, StoreError> {
        match self.live_object_mut(key) {
            Some(obj) => match obj.payload() {
                Payload::List(list) => Ok(list.range(start, stop)),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(Vec::new()),
        }
    }
}
