//! Chunked list container.
//!
//! A quicklist is a doubly-linked sequence of nodes, each node holding
//! a small run of entries plus a running byte total. New entries append
//! to the head or tail node while it has room; otherwise a fresh node
//! is linked on. The chunking keeps per-entry overhead low for long
//! lists while preserving O(1) push/pop at both ends.
//!
//! Expressed here as a `VecDeque` of nodes rather than a pointer-linked
//! list — same shape, no unsafe.

use std::collections::VecDeque;

use bytes::Bytes;

use super::normalize_range;

/// Maximum number of entries a single node may hold.
pub const NODE_MAX_ENTRIES: usize = 512;

/// Maximum total payload bytes a single node may hold.
pub const NODE_MAX_BYTES: usize = 8192;

#[derive(Debug, Clone)]
struct Node {
    entries: VecDeque<Bytes>,
    bytes: usize,
}

impl Node {
    fn with_entry(value: Bytes) -> Node {
        let bytes = value.len();
        let mut entries = VecDeque::new();
        entries.push_back(value);
        Node { entries, bytes }
    }

    /// A node accepts a new entry while it is under BOTH caps.
    fn can_hold(&self, value: &Bytes) -> bool {
        self.entries.len() < NODE_MAX_ENTRIES && self.bytes + value.len() <= NODE_MAX_BYTES
    }
}

/// A chunked list of binary-safe entries.
#[derive(Debug, Clone, Default)]
pub struct Quicklist {
    nodes: VecDeque<Node>,
    len: usize,
}

impl Quicklist {
    /// Creates an empty list.
    pub fn new() -> Quicklist {
        Quicklist::default()
    }

    /// Returns the total number of entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the list holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of nodes. Exposed for tests and memory
    /// estimation; not part of the list's logical state.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Prepends an entry, reusing the head node when it has room.
    pub fn push_head(&mut self, value: Bytes) {
        match self.nodes.front_mut() {
            Some(node) if node.can_hold(&value) => {
                node.bytes += value.len();
                node.entries.push_front(value);
            }
            _ => self.nodes.push_front(Node::with_entry(value)),
        }
        self.len += 1;
    }

    /// Appends an entry, reusing the tail node when it has room.
    pub fn push_tail(&mut self, value: Bytes) {
        match self.nodes.back_mut() {
            Some(node) if node.can_hold(&value) => {
                node.bytes += value.len();
                node.entries.push_back(value);
            }
            _ => self.nodes.push_back(Node::with_entry(value)),
        }
        self.len += 1;
    }

    /// Removes and returns the first entry. Unlinks the head node when
    /// it empties.
    pub fn pop_head(&mut self) -> Option<Bytes> {
        let node = self.nodes.front_mut()?;
        let value = node.entries.pop_front()?;
        node.bytes -= value.len();
        if node.entries.is_empty() {
            self.nodes.pop_front();
        }
        self.len -= 1;
        Some(value)
    }

    /// Removes and returns the last entry. Unlinks the tail node when
    /// it empties.
    pub fn pop_tail(&mut self) -> Option<Bytes> {
        let node = self.nodes.back_mut()?;
        let value = node.entries.pop_back()?;
        node.bytes -= value.len();
        if node.entries.is_empty() {
            self.nodes.pop_back();
        }
        self.len -= 1;
        Some(value)
    }

    /// Returns the entries between `start` and `stop` inclusive,
    /// resolving negative indices against the length and clamping to
    /// the valid range. Out-of-range or inverted indices yield an
    /// empty result.
    pub fn range(&self, start: i64, stop: i64) -> Vec<Bytes> {
        let (start, stop) = normalize_range(start, stop, self.len as i64);
        if start > stop {
            return Vec::new();
        }
        let (start, stop) = (start as usize, stop as usize);

        let mut result = Vec::with_capacity(stop - start + 1);
        let mut index = 0usize;
        for node in &self.nodes {
            let node_len = node.entries.len();
            // node overlaps [start, stop]?
            if index + node_len > start && index <= stop {
                let from = start.saturating_sub(index);
                let to = (stop - index).min(node_len - 1);
                for entry in node.entries.iter().skip(from).take(to - from + 1) {
                    result.push(entry.clone());
                }
            }
            index += node_len;
            if index > stop {
                break;
            }
        }
        result
    }

    /// Returns the entry at `index`, resolving a negative index against
    /// the length. `None` when the normalized index is out of bounds.
    pub fn get(&self, index: i64) -> Option<Bytes> {
        let len = self.len as i64;
        let index = if index < 0 { len + index } else { index };
        if index < 0 || index >= len {
            return None;
        }
        let mut index = index as usize;
        for node in &self.nodes {
            if index < node.entries.len() {
                return node.entries.get(index).cloned();
            }
            index -= node.entries.len();
        }
        None
    }

    /// Returns all entries in order.
    pub fn to_vec(&self) -> Vec<Bytes> {
        self.iter().cloned().collect()
    }

    /// Iterates over all entries in order.
    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.nodes.iter().flat_map(|node| node.entries.iter())
    }
}
