//! The HAMT map-vector.
//!
//! One structure serving two roles: an insertion-ordered vector of
//! nodes (the environment's slots, an array's elements) and a 64-ary
//! hash-array-mapped trie indexing those slots by a 64-bit hash.
//!
//! The trie is an arena of [`TrieNode`]s inside the map. A branch
//! holds a 64-bit occupancy bitmap and one packed child word per set
//! bit; a leaf keys on the full 64-bit hash and holds a chain of
//! vector indices. Tagging is one bit per word:
//!
//! - child/root words: low bit set = branch, clear = leaf; the arena
//!   index is stored shifted left by one
//! - leaf entries: the vector index is stored shifted left by one,
//!   and the low bit is the "last" flag - set on every entry except
//!   the final one
//!
//! Lookup walks six hash bits per level, most significant first, so
//! depth k consumes `6*k` bits; two distinct hashes always split
//! within eleven levels. Colliding keys chain in insertion order and
//! are resolved by a caller-supplied comparator, first match wins.

use koan_util::bits::{detag, entag, is_tagged, popcount64, tag, untag};

use crate::ast::NodeId;

const NONE: u32 = u32::MAX;

/// One trie node. For a branch, `key` is the occupancy bitmap and
/// `children` holds tagged arena references. For a leaf, `key` is the
/// full hash and `children` holds tagged vector indices.
#[derive(Debug, Default)]
struct TrieNode {
    key: u64,
    children: Vec<u32>,
}

#[derive(Debug)]
pub struct MapVec {
    items: Vec<NodeId>,
    trie: Vec<TrieNode>,
    root: u32,
}

impl Default for MapVec {
    fn default() -> Self {
        MapVec::new()
    }
}

#[inline]
fn window(hash: u64, depth: usize) -> usize {
    let shift = 58usize.saturating_sub(6 * depth);
    ((hash >> shift) & 63) as usize
}

#[inline]
fn branch_ref(index: usize) -> u32 {
    tag(entag(index as u32))
}

#[inline]
fn leaf_ref(index: usize) -> u32 {
    entag(index as u32)
}

#[inline]
fn is_last_entry(entry: u32) -> bool {
    !is_tagged(entry)
}

/// Where a child word lives: the root slot or a branch's child array.
#[derive(Clone, Copy)]
enum Slot {
    Root,
    Child(usize, usize),
}

impl MapVec {
    pub fn new() -> Self {
        MapVec { items: Vec::new(), trie: Vec::new(), root: NONE }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn at(&self, index: usize) -> Option<NodeId> {
        self.items.get(index).copied()
    }

    #[inline]
    pub fn set(&mut self, index: usize, id: NodeId) {
        self.items[index] = id;
    }

    #[inline]
    pub fn items(&self) -> &[NodeId] {
        &self.items
    }

    /// Append without indexing (array-style use).
    pub fn push(&mut self, id: NodeId) -> usize {
        let index = self.items.len();
        self.items.push(id);
        index
    }

    fn read(&self, slot: Slot) -> u32 {
        match slot {
            Slot::Root => self.root,
            Slot::Child(node, i) => self.trie[node].children[i],
        }
    }

    fn write(&mut self, slot: Slot, word: u32) {
        match slot {
            Slot::Root => self.root = word,
            Slot::Child(node, i) => self.trie[node].children[i] = word,
        }
    }

    fn new_trie_node(&mut self, key: u64, children: Vec<u32>) -> usize {
        self.trie.push(TrieNode { key, children });
        self.trie.len() - 1
    }

    /// Register `index` under `hash`. Idempotent for an index already
    /// present under that hash; a distinct colliding index is appended
    /// after the chain's current last entry.
    pub fn map_index(&mut self, hash: u64, index: usize) {
        let entry = entag(index as u32);

        if self.root == NONE {
            let leaf = self.new_trie_node(hash, vec![entry]);
            self.root = leaf_ref(leaf);
            return;
        }

        let mut slot = Slot::Root;
        let mut depth = 0usize;
        loop {
            let word = self.read(slot);
            if !is_tagged(word) {
                let leaf = detag(word) as usize;
                if self.trie[leaf].key == hash {
                    self.append_to_leaf(leaf, entry);
                    return;
                }
                // Distinct hash: push this leaf down one level behind a
                // fresh branch, then retry the same slot as a branch.
                let below = window(self.trie[leaf].key, depth);
                let branch = self.new_trie_node(1u64 << below, vec![leaf_ref(leaf)]);
                self.write(slot, branch_ref(branch));
                continue;
            }

            let branch = detag(word) as usize;
            let i = window(hash, depth);
            let bit = 1u64 << i;
            let map = self.trie[branch].key;
            let at = popcount64(map & (bit - 1)) as usize;

            if map & bit == 0 {
                let leaf = self.new_trie_node(hash, vec![entry]);
                self.trie[branch].key |= bit;
                self.trie[branch].children.insert(at, leaf_ref(leaf));
                return;
            }

            slot = Slot::Child(branch, at);
            depth += 1;
        }
    }

    fn append_to_leaf(&mut self, leaf: usize, entry: u32) {
        let chain = &mut self.trie[leaf].children;
        for i in 0..chain.len() {
            if untag(chain[i]) == entry {
                return; // already present
            }
            if is_last_entry(chain[i]) {
                chain[i] = tag(chain[i]);
                chain.insert(i + 1, entry);
                return;
            }
        }
        chain.push(entry);
    }

    /// Find the first vector index registered under `hash` for which
    /// `accept` holds. Colliding indices are visited in insertion
    /// order; the scan stops at the chain's last entry.
    pub fn get_index<F: FnMut(usize) -> bool>(&self, hash: u64, mut accept: F) -> Option<usize> {
        if self.root == NONE {
            return None;
        }
        let mut word = self.root;
        let mut depth = 0usize;
        loop {
            if !is_tagged(word) {
                let leaf = detag(word) as usize;
                if self.trie[leaf].key != hash {
                    return None;
                }
                for &entry in &self.trie[leaf].children {
                    let index = detag(entry) as usize;
                    if accept(index) {
                        return Some(index);
                    }
                    if is_last_entry(entry) {
                        return None;
                    }
                }
                return None;
            }

            let branch = detag(word) as usize;
            let i = window(hash, depth);
            let bit = 1u64 << i;
            let map = self.trie[branch].key;
            if map & bit == 0 {
                return None;
            }
            let at = popcount64(map & (bit - 1)) as usize;
            word = self.trie[branch].children[at];
            depth += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use koan_util::memhash;

    fn id(n: u32) -> NodeId {
        NodeId(n)
    }

    #[test]
    fn test_insert_and_find() {
        let mut m = MapVec::new();
        for i in 0..100u32 {
            let index = m.push(id(i));
            m.map_index(memhash(format!("k{}", i).as_bytes(), 0), index);
        }
        for i in 0..100u32 {
            let h = memhash(format!("k{}", i).as_bytes(), 0);
            let found = m.get_index(h, |_| true);
            assert_eq!(found, Some(i as usize), "key k{}", i);
        }
        assert_eq!(m.get_index(memhash(b"missing", 0), |_| true), None);
    }

    #[test]
    fn test_map_index_is_idempotent() {
        let mut m = MapVec::new();
        let index = m.push(id(1));
        m.map_index(42, index);
        m.map_index(42, index);
        let mut visits = 0;
        m.get_index(42, |_| {
            visits += 1;
            false
        });
        assert_eq!(visits, 1);
    }

    #[test]
    fn test_collisions_resolve_in_insertion_order() {
        // Identical 64-bit hash: the chain must preserve insertion
        // order and defer to the comparator.
        let mut m = MapVec::new();
        for i in 0..10u32 {
            let index = m.push(id(i));
            m.map_index(0xDEAD_BEEF, index);
        }
        let first = m.get_index(0xDEAD_BEEF, |_| true);
        assert_eq!(first, Some(0));
        let seventh = m.get_index(0xDEAD_BEEF, |i| i == 7);
        assert_eq!(seventh, Some(7));
        let none = m.get_index(0xDEAD_BEEF, |_| false);
        assert_eq!(none, None);
    }

    #[test]
    fn test_first_window_collisions_split_below() {
        // Hashes equal in their top six bits force a branch chain.
        let a = 0x8000_0000_0000_0001u64;
        let b = 0x8000_0000_0000_0002u64;
        let mut m = MapVec::new();
        let ia = m.push(id(1));
        m.map_index(a, ia);
        let ib = m.push(id(2));
        m.map_index(b, ib);
        assert_eq!(m.get_index(a, |_| true), Some(0));
        assert_eq!(m.get_index(b, |_| true), Some(1));
    }

    #[test]
    fn test_large_random_population() {
        // Pseudo-random keys; every inserted index must be retrievable.
        let n = 100_000usize;
        let mut m = MapVec::new();
        let mut keys = Vec::with_capacity(n);
        let mut state = 0x2545_F491_4F6C_DD1Du64;
        for i in 0..n {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            keys.push(state);
            let index = m.push(id(i as u32));
            m.map_index(state, index);
        }
        for (i, &k) in keys.iter().enumerate() {
            assert_eq!(m.get_index(k, |x| x == i), Some(i));
        }
    }
}
