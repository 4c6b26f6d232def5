//! Memory estimation for eviction accounting.
//!
//! The store tracks an estimated byte footprint per entry so the
//! evictor can enforce `maxmemory` without scanning. The estimates are
//! a fixed heuristic — a per-object base overhead plus a per-element
//! approximation — not an exact allocator measurement. Precision isn't
//! the goal; consistency is: the same entry always estimates to the
//! same size, so add/remove pairs cancel exactly.

use crate::object::{Object, Payload};

/// Fixed overhead charged for every object (enum tag, clock, map slot).
pub const OBJECT_BASE_OVERHEAD: usize = 32;

/// Fixed overhead charged for every key on top of its length.
pub const KEY_OVERHEAD: usize = 32;

/// Approximate cost per list entry.
pub const LIST_ENTRY_COST: usize = 50;

/// Approximate cost per hash field (field + value + bucket).
pub const HASH_ENTRY_COST: usize = 100;

/// Approximate cost per set member.
pub const SET_MEMBER_COST: usize = 50;

/// Approximate cost per sorted-set member (stored in two structures).
pub const ZSET_ENTRY_COST: usize = 100;

/// Estimates the byte footprint of a stored object.
pub fn object_size(obj: &Object) -> usize {
    let payload = match obj.payload() {
        Payload::Int(_) => 8,
        Payload::Embstr(b) | Payload::Raw(b) => b.len(),
        Payload::List(q) => q.len() * LIST_ENTRY_COST,
        Payload::Hash(m) => m.len() * HASH_ENTRY_COST,
        Payload::Set(s) => s.len() * SET_MEMBER_COST,
        Payload::SortedSet(z) => z.len() * ZSET_ENTRY_COST,
    };
    OBJECT_BASE_OVERHEAD + payload
}

/// Estimates the byte footprint of a key.
pub fn key_size(key: &str) -> usize {
    key.len() + KEY_OVERHEAD
}

/// Estimates the total footprint of a keyspace entry.
pub fn entry_size(key: &str, obj: &Object) -> usize {
    key_size(key) + object_size(obj)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::object::Object;

    #[test]
    fn string_size_includes_payload_bytes() {
        let obj = Object::new_string(Bytes::from("hello"));
        assert_eq!(object_size(&obj), OBJECT_BASE_OVERHEAD + 5);
    }

    #[test]
    fn int_string_charges_eight_bytes() {
        let obj = Object::new_string(Bytes::from("1234567890123"));
        assert_eq!(object_size(&obj), OBJECT_BASE_OVERHEAD + 8);
    }

    #[test]
    fn list_size_scales_with_entries() {
        let mut obj = Object::new_list();
        if let Payload::List(q) = obj.payload_mut() {
            q.push_tail(Bytes::from("a"));
            q.push_tail(Bytes::from("b"));
        }
        assert_eq!(object_size(&obj), OBJECT_BASE_OVERHEAD + 2 * LIST_ENTRY_COST);
    }

    #[test]
    fn hash_and_zset_use_heavier_entries() {
        let mut hash = Object::new_hash();
        if let Payload::Hash(m) = hash.payload_mut() {
            m.insert("f".into(), Bytes::from("v"));
        }
        let mut zset = Object::new_sorted_set();
        if let Payload::SortedSet(z) = zset.payload_mut() {
            z.add(1.0, "m");
        }
        assert_eq!(object_size(&hash), OBJECT_BASE_OVERHEAD + HASH_ENTRY_COST);
        assert_eq!(object_size(&zset), OBJECT_BASE_OVERHEAD + ZSET_ENTRY_COST);
    }

    #[test]
    fn key_size_adds_fixed_overhead() {
        assert_eq!(key_size("abc"), 3 + KEY_OVERHEAD);
        assert_eq!(key_size(""), KEY_OVERHEAD);
    }

    #[test]
    fn entry_size_is_key_plus_object() {
        let obj = Object::new_string(Bytes::from("xy"));
        assert_eq!(entry_size("k", &obj), key_size("k") + object_size(&obj));
    }
}
