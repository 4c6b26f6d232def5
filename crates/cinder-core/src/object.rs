//! The uniform object model.
//!
//! Every stored value is an [`Object`]: a payload that is a tagged sum
//! over the five data types, plus a 32-bit last-access clock for the
//! approximate-LRU evictor. The payload tag doubles as the physical
//! encoding — strings have three encodings (`Int`, `Embstr`, `Raw`),
//! container types have one each.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;

use crate::time;
use crate::types::quicklist::Quicklist;
use crate::types::sorted_set::SortedSet;

/// Strings at or below this length use the inline `Embstr` encoding.
pub const EMBSTR_MAX_LEN: usize = 44;

/// The logical type of a stored value, as reported by TYPE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    String,
    List,
    Hash,
    Set,
    SortedSet,
}

impl ObjectKind {
    /// Returns the type name matching Redis TYPE command output.
    pub fn type_name(&self) -> &'static str {
        match self {
            ObjectKind::String => "string",
            ObjectKind::List => "list",
            ObjectKind::Hash => "hash",
            ObjectKind::Set => "set",
            ObjectKind::SortedSet => "zset",
        }
    }
}

/// The physical representation of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// String that parses exactly as a signed 64-bit integer.
    Int,
    /// Short string (≤ 44 bytes), inline-allocation semantics.
    Embstr,
    /// Longer string.
    Raw,
    /// Chunked doubly-linked list.
    Quicklist,
    /// Field→value (or membership) hash table.
    HashTable,
    /// Span-indexed skiplist plus member→score map.
    Skiplist,
}

impl Encoding {
    /// Returns the encoding name matching OBJECT ENCODING conventions.
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Int => "int",
            Encoding::Embstr => "embstr",
            Encoding::Raw => "raw",
            Encoding::Quicklist => "quicklist",
            Encoding::HashTable => "hashtable",
            Encoding::Skiplist => "skiplist",
        }
    }
}

/// A stored value: the payload sum over the five data types, with the
/// string encodings split out as their own variants.
#[derive(Debug, Clone)]
pub enum Payload {
    /// String holding an exact 64-bit integer.
    Int(i64),
    /// Short string, ≤ [`EMBSTR_MAX_LEN`] bytes.
    Embstr(Bytes),
    /// String longer than [`EMBSTR_MAX_LEN`] bytes.
    Raw(Bytes),
    /// List of binary-safe elements.
    List(Quicklist),
    /// Field→value mapping.
    Hash(HashMap<String, Bytes>),
    /// Unordered set of unique members.
    Set(HashSet<String>),
    /// Members ordered by (score, member).
    SortedSet(SortedSet),
}

/// A value stored under a key: payload plus last-access clock.
#[derive(Debug, Clone)]
pub struct Object {
    payload: Payload,
    lru: u32,
}

impl Object {
    /// Wraps a payload, stamping the access clock.
    pub fn from_payload(payload: Payload) -> Object {
        Object {
            payload,
            lru: time::lru_clock(),
        }
    }

    /// Builds a string object, selecting the encoding from the input:
    /// exact signed-integer text becomes `Int`, short strings `Embstr`,
    /// longer strings `Raw`.
    pub fn new_string(value: Bytes) -> Object {
        let payload = match parse_exact_i64(&value) {
            Some(n) => Payload::Int(n),
            None if value.len() <= EMBSTR_MAX_LEN => Payload::Embstr(value),
            None => Payload::Raw(value),
        };
        Object::from_payload(payload)
    }

    /// Builds an empty list object.
    pub fn new_list() -> Object {
        Object::from_payload(Payload::List(Quicklist::new()))
    }

    /// Builds an empty hash object.
    pub fn new_hash() -> Object {
        Object::from_payload(Payload::Hash(HashMap::new()))
    }

    /// Builds an empty set object.
    pub fn new_set() -> Object {
        Object::from_payload(Payload::Set(HashSet::new()))
    }

    /// Builds an empty sorted-set object.
    pub fn new_sorted_set() -> Object {
        Object::from_payload(Payload::SortedSet(SortedSet::new()))
    }

    /// Returns the logical type of this object.
    pub fn kind(&self) -> ObjectKind {
        match &self.payload {
            Payload::Int(_) | Payload::Embstr(_) | Payload::Raw(_) => ObjectKind::String,
            Payload::List(_) => ObjectKind::List,
            Payload::Hash(_) => ObjectKind::Hash,
            Payload::Set(_) => ObjectKind::Set,
            Payload::SortedSet(_) => ObjectKind::SortedSet,
        }
    }

    /// Returns the physical encoding of this object.
    pub fn encoding(&self) -> Encoding {
        match &self.payload {
            Payload::Int(_) => Encoding::Int,
            Payload::Embstr(_) => Encoding::Embstr,
            Payload::Raw(_) => Encoding::Raw,
            Payload::List(_) => Encoding::Quicklist,
            Payload::Hash(_) | Payload::Set(_) => Encoding::HashTable,
            Payload::SortedSet(_) => Encoding::Skiplist,
        }
    }

    /// Returns the payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Returns the payload for in-place mutation.
    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    /// Returns the last-access clock value.
    pub fn lru(&self) -> u32 {
        self.lru
    }

    /// Stamps the access clock with the current time.
    pub fn touch(&mut self) {
        self.lru = time::lru_clock();
    }

    /// Returns the externally observable string value: base-10 text for
    /// `Int`, the original bytes otherwise. `None` for container types.
    pub fn string_bytes(&self) -> Option<Bytes> {
        match &self.payload {
            Payload::Int(n) => {
                let mut buf = itoa::Buffer::new();
                Some(Bytes::copy_from_slice(buf.format(*n).as_bytes()))
            }
            Payload::Embstr(b) | Payload::Raw(b) => Some(b.clone()),
            _ => None,
        }
    }

    /// Returns `true` for container objects whose payload holds no
    /// elements. Strings are never considered empty for this purpose.
    pub fn is_empty_container(&self) -> bool {
        match &self.payload {
            Payload::List(q) => q.is_empty(),
            Payload::Hash(m) => m.is_empty(),
            Payload::Set(s) => s.is_empty(),
            Payload::SortedSet(z) => z.is_empty(),
            _ => false,
        }
    }
}

/// Parses a byte string as an i64 only if it is the exact canonical
/// decimal rendering: no leading zeros (other than "0" itself), no '+',
/// no surrounding whitespace.
fn parse_exact_i64(value: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(value).ok()?;
    let parsed: i64 = text.parse().ok()?;
    let mut buf = itoa::Buffer::new();
    (buf.format(parsed) == text).then_some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_string_uses_int_encoding() {
        let obj = Object::new_string(Bytes::from("12345"));
        assert_eq!(obj.kind(), ObjectKind::String);
        assert_eq!(obj.encoding(), Encoding::Int);
        assert_eq!(obj.string_bytes(), Some(Bytes::from("12345")));
    }

    #[test]
    fn negative_integer_uses_int_encoding() {
        let obj = Object::new_string(Bytes::from("-42"));
        assert_eq!(obj.encoding(), Encoding::Int);
        assert_eq!(obj.string_bytes(), Some(Bytes::from("-42")));
    }

    #[test]
    fn extreme_integers_round_trip() {
        for text in ["9223372036854775807", "-9223372036854775808", "0"] {
            let obj = Object::new_string(Bytes::from(text));
            assert_eq!(obj.encoding(), Encoding::Int, "{text}");
            assert_eq!(obj.string_bytes(), Some(Bytes::from(text)));
        }
    }

    #[test]
    fn leading_zeros_are_not_integers() {
        assert_eq!(Object::new_string(Bytes::from("007")).encoding(), Encoding::Embstr);
        assert_eq!(Object::new_string(Bytes::from("-0")).encoding(), Encoding::Embstr);
        assert_eq!(Object::new_string(Bytes::from("+5")).encoding(), Encoding::Embstr);
    }

    #[test]
    fn overflowing_integer_falls_back_to_string() {
        let obj = Object::new_string(Bytes::from("9223372036854775808"));
        assert_eq!(obj.encoding(), Encoding::Embstr);
    }

    #[test]
    fn short_string_is_embstr() {
        let obj = Object::new_string(Bytes::from("hello"));
        assert_eq!(obj.encoding(), Encoding::Embstr);
        assert_eq!(obj.string_bytes(), Some(Bytes::from("hello")));
    }

    #[test]
    fn embstr_boundary_at_44_bytes() {
        let at = "x".repeat(EMBSTR_MAX_LEN);
        let over = "x".repeat(EMBSTR_MAX_LEN + 1);
        assert_eq!(Object::new_string(Bytes::from(at)).encoding(), Encoding::Embstr);
        assert_eq!(Object::new_string(Bytes::from(over)).encoding(), Encoding::Raw);
    }

    #[test]
    fn binary_string_is_not_integer() {
        let obj = Object::new_string(Bytes::from(vec![0u8, 255, 1]));
        assert_eq!(obj.encoding(), Encoding::Embstr);
        assert_eq!(obj.string_bytes(), Some(Bytes::from(vec![0u8, 255, 1])));
    }

    #[test]
    fn container_kinds() {
        assert_eq!(Object::new_list().kind(), ObjectKind::List);
        assert_eq!(Object::new_hash().kind(), ObjectKind::Hash);
        assert_eq!(Object::new_set().kind(), ObjectKind::Set);
        assert_eq!(Object::new_sorted_set().kind(), ObjectKind::SortedSet);
        assert_eq!(Object::new_list().encoding(), Encoding::Quicklist);
        assert_eq!(Object::new_sorted_set().encoding(), Encoding::Skiplist);
    }

    #[test]
    fn containers_have_no_string_bytes() {
        assert_eq!(Object::new_list().string_bytes(), None);
        assert_eq!(Object::new_hash().string_bytes(), None);
    }

    #[test]
    fn empty_container_detection() {
        assert!(Object::new_list().is_empty_container());
        assert!(!Object::new_string(Bytes::from("")).is_empty_container());
    }

    #[test]
    fn type_names() {
        assert_eq!(ObjectKind::String.type_name(), "string");
        assert_eq!(ObjectKind::SortedSet.type_name(), "zset");
    }
}
