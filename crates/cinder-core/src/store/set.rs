//! Set accessors.

use rand::seq::IteratorRandom;

use super::*;
use crate::memory::{OBJECT_BASE_OVERHEAD, SET_MEMBER_COST};
use crate::object::Payload;

impl Store {
    /// Adds members to the set at `key`, creating it on demand.
    /// Returns the number of members that were newly added.
    pub fn sadd(&mut self, key: &str, members: &[String]) -> Result<usize, StoreError> {
        self.remove_if_expired(key);

        let existing = match self.data.get(key) {
            None => None,
            Some(obj) => match obj.payload() {
                Payload::Set(set) => Some(set),
                _ => return Err(StoreError::WrongType),
            },
        };

        let mut seen = std::collections::HashSet::new();
        let mut new_members = 0usize;
        for member in members {
            let already = existing.is_some_and(|set| set.contains(member));
            if !already && seen.insert(member.as_str()) {
                new_members += 1;
            }
        }

        let is_new_key = existing.is_none();
        let delta = new_members * SET_MEMBER_COST
            + if is_new_key {
                memory::key_size(key) + OBJECT_BASE_OVERHEAD
            } else {
                0
            };
        self.charge(key, delta as i64)?;

        let obj = self
            .data
            .entry(key.to_owned())
            .or_insert_with(Object::new_set);
        obj.touch();
        let mut added = 0;
        match obj.payload_mut() {
            Payload::Set(set) => {
                for member in members {
                    if set.insert(member.clone()) {
                        added += 1;
                    }
                }
            }
            _ => return Err(StoreError::WrongType),
        }

        if added > 0 {
            self.notify_modified(key);
        }
        Ok(added)
    }

    /// Removes members from the set at `key`. Returns the number
    /// actually removed. Deletes the key when the set empties.
    pub fn srem(&mut self, key: &str, members: &[String]) -> Result<usize, StoreError> {
        if self.remove_if_expired(key) {
            return Ok(0);
        }
        let (removed, emptied) = match self.data.get_mut(key) {
            Some(obj) => {
                obj.touch();
                match obj.payload_mut() {
                    Payload::Set(set) => {
                        let mut removed = 0;
                        for member in members {
                            if set.remove(member) {
                                removed += 1;
                            }
                        }
                        (removed, set.is_empty())
                    }
                    _ => return Err(StoreError::WrongType),
                }
            }
            None => return Ok(0),
        };

        self.used_memory -= (removed * SET_MEMBER_COST) as i64;
        if emptied {
            self.remove_entry(key);
        }
        if removed > 0 {
            self.notify_modified(key);
        }
        Ok(removed)
    }

    /// Returns `true` if `member` is in the set at `key`.
    pub fn sismember(&mut self, key: &str, member: &str) -> Result<bool, StoreError> {
        match self.live_object_mut(key) {
            Some(obj) => match obj.payload() {
                Payload::Set(set) => Ok(set.contains(member)),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(false),
        }
    }

    /// Returns all members of the set at `key`.
    pub fn smembers(&mut self, key: &str) -> Result<Vec<String>, StoreError> {
        match self.live_object_mut(key) {
            Some(obj) => match obj.payload() {
                Payload::Set(set) => Ok(set.iter().cloned().collect()),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(Vec::new()),
        }
    }

    /// Returns the cardinality of the set at `key`; 0 when absent.
    pub fn scard(&mut self, key: &str) -> Result<usize, StoreError> {
        match self.live_object_mut(key) {
            Some(obj) => match obj.payload() {
                Payload::Set(set) => Ok(set.len()),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(0),
        }
    }

    /// Removes and returns a uniformly random member of the set at
    /// `key`. Deletes the key when the set empties.
    pub fn spop(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        if self.remove_if_expired(key) {
            return Ok(None);
        }
        let (member, emptied) = match self.data.get_mut(key) {
            Some(obj) => {
                obj.touch();
                match obj.payload_mut() {
                    Payload::Set(set) => {
                        let mut rng = rand::rng();
                        let victim = match set.iter().choose(&mut rng).cloned() {
                            Some(member) => member,
                            None => return Ok(None),
                        };
                        set.remove(&victim);
                        (victim, set.is_empty())
                    }
                    _ => return Err(StoreError::WrongType),
                }
            }
            None => return Ok(None),
        };

        self.used_memory -= SET_MEMBER_COST as i64;
        if emptied {
            self.remove_entry(key);
        }
        self.notify_modified(key);
        Ok(Some(member))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn members(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn sadd_counts_new_members() {
        let mut store = Store::new();
        assert_eq!(store.sadd("s", &members(&["a", "b", "c"])).unwrap(), 3);
        assert_eq!(store.sadd("s", &members(&["b", "c", "d"])).unwrap(), 1);
        assert_eq!(store.scard("s").unwrap(), 4);
    }

    #[test]
    fn sadd_dedupes_within_one_call() {
        let mut store = Store::new();
        assert_eq!(store.sadd("s", &members(&["x", "x", "x"])).unwrap(), 1);
        assert_eq!(store.scard("s").unwrap(), 1);
    }

    #[test]
    fn sismember() {
        let mut store = Store::new();
        store.sadd("s", &members(&["a"])).unwrap();
        assert!(store.sismember("s", "a").unwrap());
        assert!(!store.sismember("s", "b").unwrap());
        assert!(!store.sismember("missing", "a").unwrap());
    }

    #[test]
    fn smembers_returns_all() {
        let mut store = Store::new();
        store.sadd("s", &members(&["a", "b"])).unwrap();
        let mut got = store.smembers("s").unwrap();
        got.sort();
        assert_eq!(got, members(&["a", "b"]));
        assert!(store.smembers("missing").unwrap().is_empty());
    }

    #[test]
    fn srem_removes_and_counts() {
        let mut store = Store::new();
        store.sadd("s", &members(&["a", "b", "c"])).unwrap();
        assert_eq!(store.srem("s", &members(&["a", "ghost"])).unwrap(), 1);
        assert_eq!(store.scard("s").unwrap(), 2);
    }

    #[test]
    fn removing_last_member_deletes_key() {
        let mut store = Store::new();
        store.sadd("s", &members(&["only"])).unwrap();
        assert_eq!(store.srem("s", &members(&["only"])).unwrap(), 1);
        assert!(!store.exists("s"));
        assert_eq!(store.used_memory(), 0);
    }

    #[test]
    fn spop_drains_the_set() {
        let mut store = Store::new();
        store.sadd("s", &members(&["a", "b", "c"])).unwrap();
        let mut popped = Vec::new();
        while let Some(member) = store.spop("s").unwrap() {
            popped.push(member);
        }
        popped.sort();
        assert_eq!(popped, members(&["a", "b", "c"]));
        assert!(!store.exists("s"));
        assert_eq!(store.spop("s").unwrap(), None);
    }

    #[test]
    fn wrong_type_on_string_key() {
        let mut store = Store::new();
        store.set("str", Bytes::from("v"), None, false, false);
        assert_eq!(store.sadd("str", &members(&["a"])), Err(StoreError::WrongType));
        assert_eq!(store.srem("str", &members(&["a"])), Err(StoreError::WrongType));
        assert_eq!(store.smembers("str"), Err(StoreError::WrongType));
        assert_eq!(store.spop("str"), Err(StoreError::WrongType));
    }
}
