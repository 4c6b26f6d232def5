//! Sorted set: a span skiplist paired with a member→score map.
//!
//! The skiplist provides ordered traversal and O(log n) rank queries;
//! the map provides O(1) member→score lookup. The two structures are
//! kept in lockstep: a member is in the map iff the skiplist holds
//! exactly one node with that (score, member).

use std::collections::HashMap;

use super::normalize_range;
use super::skiplist::Skiplist;

/// A set of unique string members, each carrying an `f64` score,
/// ordered by (score, member).
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    dict: HashMap<String, f64>,
    list: Skiplist,
}

impl SortedSet {
    /// Creates an empty sorted set.
    pub fn new() -> SortedSet {
        SortedSet::default()
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.dict.len()
    }

    /// Returns `true` if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    /// Adds a member or updates its score. Returns `true` if the member
    /// is new, `false` if an existing member was (possibly) rescored.
    pub fn add(&mut self, score: f64, member: &str) -> bool {
        match self.dict.get(member) {
            Some(&old_score) => {
                if old_score != score {
                    self.list.delete(old_score, member);
                    self.list.insert(score, member.to_owned());
                    self.dict.insert(member.to_owned(), score);
                }
                false
            }
            None => {
                self.list.insert(score, member.to_owned());
                self.dict.insert(member.to_owned(), score);
                true
            }
        }
    }

    /// Removes a member. Returns `true` if it existed.
    pub fn remove(&mut self, member: &str) -> bool {
        match self.dict.remove(member) {
            Some(score) => {
                self.list.delete(score, member);
                true
            }
            None => false,
        }
    }

    /// Returns the score of a member, or `None` when absent.
    pub fn score(&self, member: &str) -> Option<f64> {
        self.dict.get(member).copied()
    }

    /// Returns `true` if the member is present.
    pub fn contains(&self, member: &str) -> bool {
        self.dict.contains_key(member)
    }

    /// Returns the 0-based rank of a member (lowest score first), or
    /// `None` when absent.
    pub fn rank(&self, member: &str) -> Option<usize> {
        let score = *self.dict.get(member)?;
        match self.list.rank(score, member) {
            0 => None,
            rank => Some(rank - 1),
        }
    }

    /// Returns members between 0-based ranks `start` and `stop`,
    /// inclusive. Negative indices count back from the end (-1 = last).
    pub fn range(&self, start: i64, stop: i64) -> Vec<(String, f64)> {
        let (start, stop) = normalize_range(start, stop, self.len() as i64);
        if start > stop {
            return Vec::new();
        }
        self.list
            .range(start + 1, stop + 1)
            .into_iter()
            .map(|(member, score)| (member.to_owned(), score))
            .collect()
    }

    /// Iterates over (member, score) pairs in (score, member) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.list.iter()
    }
}
