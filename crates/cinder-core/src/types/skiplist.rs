//! Span-indexed probabilistic skiplist.
//!
//! Orders (score, member) pairs by score ascending with ties broken by
//! member bytes ascending. Every forward pointer carries a `span` — the
//! number of bottom-level nodes it skips — which turns rank queries and
//! rank-indexed lookup into the same O(log n) walk as search.
//!
//! Nodes live in an arena (`Vec` plus a free list) and link by index,
//! so the structure needs no unsafe pointer plumbing. Slot 0 is the
//! header and is never exposed.
//!
//! Ranks are 1-based here; the sorted-set wrapper translates to the
//! 0-based public convention.

use rand::Rng;

/// Maximum node height.
pub const MAX_LEVEL: usize = 32;

/// Probability of promoting a node one more level.
const P: f64 = 0.25;

/// Arena index of the header node.
const HEAD: usize = 0;

#[derive(Debug, Clone, Copy, Default)]
struct Level {
    forward: Option<usize>,
    span: usize,
}

#[derive(Debug, Clone)]
struct Node {
    member: String,
    score: f64,
    levels: Vec<Level>,
}

impl Node {
    fn vacant() -> Node {
        Node {
            member: String::new(),
            score: 0.0,
            levels: Vec::new(),
        }
    }
}

/// An ordered collection of (score, member) pairs with O(log n)
/// insert, delete, rank, and rank-indexed lookup.
#[derive(Debug, Clone)]
pub struct Skiplist {
    nodes: Vec<Node>,
    free: Vec<usize>,
    level: usize,
    len: usize,
}

impl Skiplist {
    /// Creates an empty skiplist.
    pub fn new() -> Skiplist {
        let header = Node {
            member: String::new(),
            score: 0.0,
            levels: vec![Level::default(); MAX_LEVEL],
        };
        Skiplist {
            nodes: vec![header],
            free: Vec::new(),
            level: 1,
            len: 0,
        }
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the skiplist holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Draws a node height: 1 + geometric(p = 0.25), capped at
    /// [`MAX_LEVEL`].
    fn random_level() -> usize {
        let mut rng = rand::rng();
        let mut level = 1;
        while level < MAX_LEVEL && rng.random::<f64>() < P {
            level += 1;
        }
        level
    }

    /// Ordering walk predicate: does `node` sort strictly before
    /// (score, member)?
    fn precedes(node: &Node, score: f64, member: &str) -> bool {
        node.score < score || (node.score == score && node.member.as_str() < member)
    }

    fn alloc(&mut self, score: f64, member: String, height: usize) -> usize {
        let node = Node {
            member,
            score,
            levels: vec![Level::default(); height],
        };
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, id: usize) {
        self.nodes[id] = Node::vacant();
        self.free.push(id);
    }

    /// Inserts a (score, member) pair. The caller guarantees the pair
    /// is not already present (the sorted-set wrapper enforces this via
    /// its member map).
    pub fn insert(&mut self, score: f64, member: String) {
        let mut update = [HEAD; MAX_LEVEL];
        let mut rank = [0usize; MAX_LEVEL];

        let mut x = HEAD;
        for i in (0..self.level).rev() {
            rank[i] = if i == self.level - 1 { 0 } else { rank[i + 1] };
            while let Some(next) = self.nodes[x].levels[i].forward {
                if Self::precedes(&self.nodes[next], score, &member) {
                    rank[i] += self.nodes[x].levels[i].span;
                    x = next;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        let height = Self::random_level();
        if height > self.level {
            // levels above the current height start at the header and
            // span the whole list until the splice below adjusts them
            for i in self.level..height {
                rank[i] = 0;
                update[i] = HEAD;
                self.nodes[HEAD].levels[i].span = self.len;
            }
            self.level = height;
        }

        let id = self.alloc(score, member, height);
        for i in 0..height {
            let upd_forward = self.nodes[update[i]].levels[i].forward;
            let upd_span = self.nodes[update[i]].levels[i].span;

            let node_level = &mut self.nodes[id].levels[i];
            node_level.forward = upd_forward;
            node_level.span = upd_span - (rank[0] - rank[i]);

            let upd_level = &mut self.nodes[update[i]].levels[i];
            upd_level.forward = Some(id);
            upd_level.span = (rank[0] - rank[i]) + 1;
        }

        // untouched higher levels now skip one more node
        for i in height..self.level {
            self.nodes[update[i]].levels[i].span += 1;
        }

        self.len += 1;
    }

    /// Removes a (score, member) pair. Returns `true` if it was present.
    pub fn delete(&mut self, score: f64, member: &str) -> bool {
        let mut update = [HEAD; MAX_LEVEL];

        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.nodes[x].levels[i].forward {
                if Self::precedes(&self.nodes[next], score, member) {
                    x = next;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        let target = match self.nodes[x].levels[0].forward {
            Some(id) if self.nodes[id].score == score && self.nodes[id].member == member => id,
            _ => return false,
        };

        for i in 0..self.level {
            if self.nodes[update[i]].levels[i].forward == Some(target) {
                let target_span = self.nodes[target].levels[i].span;
                let target_forward = self.nodes[target].levels[i].forward;
                let upd_level = &mut self.nodes[update[i]].levels[i];
                upd_level.span += target_span - 1;
                upd_level.forward = target_forward;
            } else {
                self.nodes[update[i]].levels[i].span -= 1;
            }
        }

        while self.level > 1 && self.nodes[HEAD].levels[self.level - 1].forward.is_none() {
            self.level -= 1;
        }

        self.len -= 1;
        self.release(target);
        true
    }

    /// Returns the 1-based rank of (score, member), or 0 when absent.
    pub fn rank(&self, score: f64, member: &str) -> usize {
        let mut rank = 0;
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.nodes[x].levels[i].forward {
                let n = &self.nodes[next];
                if n.score < score || (n.score == score && n.member.as_str() <= member) {
                    rank += self.nodes[x].levels[i].span;
                    x = next;
                } else {
                    break;
                }
            }
            if x != HEAD && self.nodes[x].score == score && self.nodes[x].member == member {
                return rank;
            }
        }
        0
    }

    /// Returns the element at the 1-based `rank`, or `None` when the
    /// rank is outside `[1, len]`.
    pub fn by_rank(&self, rank: usize) -> Option<(&str, f64)> {
        if rank == 0 || rank > self.len {
            return None;
        }

        let mut traversed = 0;
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.nodes[x].levels[i].forward {
                if traversed + self.nodes[x].levels[i].span <= rank {
                    traversed += self.nodes[x].levels[i].span;
                    x = next;
                } else {
                    break;
                }
            }
            if traversed == rank {
                let n = &self.nodes[x];
                return Some((n.member.as_str(), n.score));
            }
        }
        None
    }

    /// Returns the elements between 1-based ranks `start` and `stop`,
    /// inclusive. Empty when `start ≤ 0`, `start > len`, or
    /// `start > stop`; `stop` is capped at the length.
    pub fn range(&self, start: i64, stop: i64) -> Vec<(&str, f64)> {
        if start <= 0 || start as usize > self.len {
            return Vec::new();
        }
        let start = start as usize;
        let stop = if stop < 0 {
            return Vec::new();
        } else {
            (stop as usize).min(self.len)
        };
        if start > stop {
            return Vec::new();
        }

        // descend to the last node with rank < start
        let mut traversed = 0;
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.nodes[x].levels[i].forward {
                if traversed + self.nodes[x].levels[i].span < start {
                    traversed += self.nodes[x].levels[i].span;
                    x = next;
                } else {
                    break;
                }
            }
        }

        let mut result = Vec::with_capacity(stop - start + 1);
        let mut cur = self.nodes[x].levels[0].forward;
        let mut pos = traversed + 1;
        while let Some(id) = cur {
            if pos > stop {
                break;
            }
            let n = &self.nodes[id];
            result.push((n.member.as_str(), n.score));
            cur = n.levels[0].forward;
            pos += 1;
        }
        result
    }

    /// Iterates over all elements in (score, member) order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cur: self.nodes[HEAD].levels[0].forward,
        }
    }
}

impl Default for Skiplist {
    fn default() -> Self {
        Self::new()
    }
}

/// Level-0 traversal over a [`Skiplist`].
#[derive(Debug)]
pub struct Iter<'a> {
    list: &'a Skiplist,
    cur: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cur?;
        let node = &self.list.nodes[id];
        self.cur = node.levels[0].forward;
        Some((node.member.as_str(), node.score))
    }
}
