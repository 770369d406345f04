//! B+-tree node model: leaf and internal nodes.
//!
//! A node of degree `d` holds at most `d - 1` keys. Leaves pair each key
//! with an opaque payload pointer `P` and chain to the next leaf through a
//! successor reference; internal nodes hold one child reference more than
//! keys. The reference type `R` is supplied by the node-access backend
//! (an arena id in memory, a store location on disk), so nodes serialize
//! cleanly and carry no parent links.

use serde::{Deserialize, Serialize};
use std::fmt;

use banyan_common::{BanyanError, Result};

/// A tree node: either a leaf or an internal node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node<K, P, R> {
    Leaf(LeafNode<K, P, R>),
    Internal(InternalNode<K, R>),
}

impl<K, P, R> Node<K, P, R> {
    /// Returns the number of keys stored in this node.
    pub fn key_count(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.key_count(),
            Node::Internal(node) => node.key_count(),
        }
    }

    /// Returns true if this is a leaf node.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// Returns the leaf variant, if this is a leaf.
    pub fn as_leaf(&self) -> Option<&LeafNode<K, P, R>> {
        match self {
            Node::Leaf(leaf) => Some(leaf),
            Node::Internal(_) => None,
        }
    }

    /// Returns the internal variant, if this is an internal node.
    pub fn as_internal(&self) -> Option<&InternalNode<K, R>> {
        match self {
            Node::Internal(node) => Some(node),
            Node::Leaf(_) => None,
        }
    }

    /// Returns the key at the given index.
    pub fn key(&self, i: usize) -> Option<&K> {
        match self {
            Node::Leaf(leaf) => leaf.key(i),
            Node::Internal(node) => node.key(i),
        }
    }

    /// Whether this node holds fewer keys than the minimum occupancy
    /// `ceil(d / 2)` and needs merging or redistribution.
    pub fn is_under_utilized(&self, degree: usize) -> bool {
        self.key_count() < degree.div_ceil(2)
    }

    /// Whether this node's contents fit into one node together with the
    /// sibling's. Siblings of different variants never merge.
    pub fn mergeable(&self, other: &Node<K, P, R>, degree: usize) -> bool {
        match (self, other) {
            (Node::Leaf(a), Node::Leaf(b)) => a.mergeable(b, degree),
            (Node::Internal(a), Node::Internal(b)) => a.mergeable(b, degree),
            _ => false,
        }
    }
}

/// A leaf node: sorted `(key, payload)` pairs plus the next-leaf link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafNode<K, P, R> {
    keys: Vec<K>,
    pointers: Vec<P>,
    successor: Option<R>,
}

impl<K, P, R> Default for LeafNode<K, P, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P, R> LeafNode<K, P, R> {
    /// Creates a new empty leaf.
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            pointers: Vec::new(),
            successor: None,
        }
    }

    /// Returns the number of entries.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Returns the stored keys in ascending order.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Returns the key at the given index.
    pub fn key(&self, i: usize) -> Option<&K> {
        self.keys.get(i)
    }

    /// Returns the payload pointer at the given index.
    pub fn pointer(&self, i: usize) -> Option<&P> {
        self.pointers.get(i)
    }

    /// Returns the first key, if any.
    pub fn first_key(&self) -> Option<&K> {
        self.keys.first()
    }

    /// Iterates over the entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&K, &P)> {
        self.keys.iter().zip(self.pointers.iter())
    }

    /// Returns the next-leaf link.
    pub fn successor(&self) -> Option<&R> {
        self.successor.as_ref()
    }

    /// Sets the next-leaf link.
    pub fn set_successor(&mut self, successor: Option<R>) {
        self.successor = successor;
    }

    /// A leaf is full once it holds `d - 1` entries.
    pub fn is_full(&self, degree: usize) -> bool {
        self.keys.len() >= degree - 1
    }

    /// Below the minimum occupancy `ceil(d / 2)`.
    pub fn is_under_utilized(&self, degree: usize) -> bool {
        self.keys.len() < degree.div_ceil(2)
    }

    /// Whether this leaf's entries and the sibling's fit in one leaf.
    pub fn mergeable(&self, other: &LeafNode<K, P, R>, degree: usize) -> bool {
        self.keys.len() + other.keys.len() <= degree - 1
    }
}

impl<K: Ord, P, R> LeafNode<K, P, R> {
    /// Returns true if the leaf stores the key.
    pub fn contains(&self, key: &K) -> bool {
        self.keys.binary_search(key).is_ok()
    }

    /// Returns the payload pointer stored under the key.
    pub fn search(&self, key: &K) -> Option<&P> {
        self.keys
            .binary_search(key)
            .ok()
            .and_then(|i| self.pointers.get(i))
    }

    /// Places `(key, pointer)` in sorted position.
    ///
    /// The tree engine guarantees the leaf is not full and the key absent.
    pub fn insert(&mut self, key: K, pointer: P) {
        debug_assert!(!self.contains(&key));
        let i = self.keys.partition_point(|k| k < &key);
        self.keys.insert(i, key);
        self.pointers.insert(i, pointer);
    }

    /// Removes the key and its paired payload pointer.
    pub fn remove(&mut self, key: &K) -> Result<P>
    where
        K: fmt::Debug,
    {
        match self.keys.binary_search(key) {
            Ok(i) => {
                self.keys.remove(i);
                Ok(self.pointers.remove(i))
            }
            Err(_) => Err(BanyanError::InvalidDeletion {
                key: format!("{key:?}"),
            }),
        }
    }

    /// Splits off the entries from `at` onward into a new right leaf.
    ///
    /// The successor link moves to the right leaf; the caller chains this
    /// leaf to the right one once it has an address.
    pub fn split_off(&mut self, at: usize) -> LeafNode<K, P, R> {
        LeafNode {
            keys: self.keys.split_off(at),
            pointers: self.pointers.split_off(at),
            successor: self.successor.take(),
        }
    }

    /// Appends every entry of `right` and takes over its successor link.
    pub fn absorb(&mut self, right: LeafNode<K, P, R>) {
        self.keys.extend(right.keys);
        self.pointers.extend(right.pointers);
        self.successor = right.successor;
    }

    /// Removes and returns the first entry.
    pub fn pop_front_entry(&mut self) -> Option<(K, P)> {
        if self.keys.is_empty() {
            return None;
        }
        Some((self.keys.remove(0), self.pointers.remove(0)))
    }

    /// Removes and returns the last entry.
    pub fn pop_back_entry(&mut self) -> Option<(K, P)> {
        match (self.keys.pop(), self.pointers.pop()) {
            (Some(k), Some(p)) => Some((k, p)),
            _ => None,
        }
    }
}

/// An internal node: sorted separator keys and `key_count + 1` children.
///
/// All keys under `children[i]` are `< keys[i]`; all keys under
/// `children[i + 1]` are `>= keys[i]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalNode<K, R> {
    keys: Vec<K>,
    children: Vec<R>,
}

impl<K, R> InternalNode<K, R> {
    /// Creates an internal node over two children and their separator.
    pub fn with_children(left: R, key: K, right: R) -> Self {
        Self {
            keys: vec![key],
            children: vec![left, right],
        }
    }

    /// Returns the number of separator keys.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Returns the number of children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Returns the stored separators in ascending order.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Returns the separator key at the given index.
    pub fn key(&self, i: usize) -> Option<&K> {
        self.keys.get(i)
    }

    /// Returns the child reference at the given index.
    pub fn child(&self, i: usize) -> Option<&R> {
        self.children.get(i)
    }

    /// Iterates over the child references.
    pub fn children(&self) -> impl Iterator<Item = &R> {
        self.children.iter()
    }

    /// An internal node is full once it holds `d - 1` separators
    /// (`d` children).
    pub fn is_full(&self, degree: usize) -> bool {
        self.keys.len() >= degree - 1
    }

    /// Below the minimum occupancy `ceil(d / 2)`.
    pub fn is_under_utilized(&self, degree: usize) -> bool {
        self.keys.len() < degree.div_ceil(2)
    }

    /// Whether this node and the sibling can merge. Merging re-introduces
    /// one separator from the parent, hence the wider bound than for
    /// leaves.
    pub fn mergeable(&self, other: &InternalNode<K, R>, degree: usize) -> bool {
        self.keys.len() + other.keys.len() <= degree
    }
}

impl<K: Ord, R> InternalNode<K, R> {
    /// Returns the index of the child responsible for the key.
    ///
    /// A key equal to a separator routes to the right of it; the tree holds
    /// no duplicates, so either direction would find the key, and right
    /// matches the separator invariant (`keys >= k_i` live under
    /// `p_{i + 1}`).
    pub fn child_index(&self, key: &K) -> usize {
        self.keys.partition_point(|k| k <= key)
    }

    /// Returns the child reference responsible for the key.
    pub fn child_for(&self, key: &K) -> Option<&R> {
        self.children.get(self.child_index(key))
    }

    /// Inserts `key` and `child` immediately to the right of the existing
    /// child `after`.
    pub fn insert_after(&mut self, key: K, child: R, after: &R) -> Result<()>
    where
        R: PartialEq + fmt::Debug,
    {
        let Some(i) = self.children.iter().position(|c| c == after) else {
            return Err(BanyanError::Corrupted(format!(
                "child {after:?} not present in parent during split propagation"
            )));
        };
        self.keys.insert(i, key);
        self.children.insert(i + 1, child);
        Ok(())
    }

    /// Removes a separator key and the child pointer to its right.
    ///
    /// Returns the removed child reference.
    pub fn remove(&mut self, key: &K) -> Result<R>
    where
        K: fmt::Debug,
    {
        match self.keys.binary_search(key) {
            Ok(i) => {
                self.keys.remove(i);
                Ok(self.children.remove(i + 1))
            }
            Err(_) => Err(BanyanError::InvalidDeletion {
                key: format!("{key:?}"),
            }),
        }
    }

    /// Splits off everything from child index `at` onward into a new right
    /// node and promotes the separator between the halves.
    ///
    /// Afterwards this node keeps `at - 1` keys and `at` children; the
    /// returned node holds the rest. `at` must satisfy
    /// `0 < at <= key_count`.
    pub fn split_promote(&mut self, at: usize) -> (K, InternalNode<K, R>) {
        let keys = self.keys.split_off(at);
        let children = self.children.split_off(at);
        let promoted = self.keys.remove(at - 1);
        (promoted, InternalNode { keys, children })
    }

    /// Appends the parent separator, then all of `right`'s separators and
    /// children.
    pub fn absorb(&mut self, separator: K, right: InternalNode<K, R>) {
        self.keys.push(separator);
        self.keys.extend(right.keys);
        self.children.extend(right.children);
    }

    /// Rewrites an existing separator in place.
    pub fn replace_key(&mut self, old: &K, new: K) -> Result<()>
    where
        K: fmt::Debug,
    {
        match self.keys.binary_search(old) {
            Ok(i) => {
                self.keys[i] = new;
                Ok(())
            }
            Err(_) => Err(BanyanError::Corrupted(format!(
                "separator {old:?} not present during redistribution"
            ))),
        }
    }

    /// Inserts a separator and child at the front.
    pub fn insert_entry_front(&mut self, key: K, child: R) {
        self.keys.insert(0, key);
        self.children.insert(0, child);
    }

    /// Appends a separator and child at the back.
    pub fn push_entry_back(&mut self, key: K, child: R) {
        self.keys.push(key);
        self.children.push(child);
    }

    /// Removes and returns the first separator and first child.
    pub fn pop_front_entry(&mut self) -> Option<(K, R)> {
        if self.keys.is_empty() || self.children.is_empty() {
            return None;
        }
        Some((self.keys.remove(0), self.children.remove(0)))
    }

    /// Removes and returns the last separator and last child.
    pub fn pop_back_entry(&mut self) -> Option<(K, R)> {
        match (self.keys.pop(), self.children.pop()) {
            (Some(k), Some(c)) => Some((k, c)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestLeaf = LeafNode<&'static str, u32, u32>;
    type TestInternal = InternalNode<&'static str, u32>;

    fn leaf(entries: &[(&'static str, u32)]) -> TestLeaf {
        let mut node = TestLeaf::new();
        for (k, p) in entries {
            node.insert(k, *p);
        }
        node
    }

    fn internal(keys: &[&'static str], children: &[u32]) -> TestInternal {
        assert_eq!(children.len(), keys.len() + 1);
        let mut node = TestInternal::with_children(children[0], keys[0], children[1]);
        for i in 1..keys.len() {
            node.push_entry_back(keys[i], children[i + 1]);
        }
        node
    }

    #[test]
    fn test_leaf_insert_keeps_order() {
        let node = leaf(&[("pear", 3), ("apple", 1), ("mango", 2)]);
        assert_eq!(node.keys(), &["apple", "mango", "pear"]);
        assert_eq!(node.search(&"mango"), Some(&2));
        assert_eq!(node.search(&"kiwi"), None);
        assert!(node.contains(&"apple"));
        assert_eq!(node.pointer(0), Some(&1));
        assert_eq!(node.pointer(3), None);
    }

    #[test]
    fn test_leaf_remove_missing_key() {
        let mut node = leaf(&[("a", 1)]);
        let err = node.remove(&"b").unwrap_err();
        assert!(err.to_string().contains("invalid deletion"));
        assert_eq!(node.key_count(), 1);

        assert_eq!(node.remove(&"a").unwrap(), 1);
        assert_eq!(node.key_count(), 0);
    }

    #[test]
    fn test_leaf_split_off_carries_successor() {
        let mut node = leaf(&[("a", 1), ("b", 2), ("c", 3)]);
        node.set_successor(Some(9));

        let right = node.split_off(2);
        assert_eq!(node.keys(), &["a", "b"]);
        assert_eq!(right.keys(), &["c"]);
        assert_eq!(right.successor(), Some(&9));
        assert_eq!(node.successor(), None);
    }

    #[test]
    fn test_leaf_absorb() {
        let mut left = leaf(&[("a", 1), ("b", 2)]);
        let mut right = leaf(&[("c", 3)]);
        right.set_successor(Some(7));

        left.absorb(right);
        assert_eq!(left.keys(), &["a", "b", "c"]);
        assert_eq!(left.successor(), Some(&7));
        assert_eq!(
            left.entries().map(|(_, p)| *p).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_leaf_pop_entries() {
        let mut node = leaf(&[("a", 1), ("b", 2), ("c", 3)]);
        assert_eq!(node.pop_front_entry(), Some(("a", 1)));
        assert_eq!(node.pop_back_entry(), Some(("c", 3)));
        assert_eq!(node.keys(), &["b"]);

        let mut empty = TestLeaf::new();
        assert_eq!(empty.pop_front_entry(), None);
        assert_eq!(empty.pop_back_entry(), None);
    }

    #[test]
    fn test_leaf_capacity_predicates() {
        let degree = 3;
        let mut node = leaf(&[("a", 1)]);
        assert!(!node.is_full(degree));
        assert!(node.is_under_utilized(degree)); // 1 < ceil(3/2) = 2

        node.insert("b", 2);
        assert!(node.is_full(degree)); // 2 == d - 1
        assert!(!node.is_under_utilized(degree));

        let one = leaf(&[("x", 9)]);
        assert!(one.mergeable(&node, 4)); // 1 + 2 <= 3
        assert!(!one.mergeable(&node, 3)); // 1 + 2 > 2
    }

    #[test]
    fn test_child_index_routing() {
        let node = internal(&["j", "t"], &[10, 20, 30]);

        // Below the first separator.
        assert_eq!(node.child_index(&"a"), 0);
        // Equality routes right.
        assert_eq!(node.child_index(&"j"), 1);
        // Between separators.
        assert_eq!(node.child_index(&"m"), 1);
        // Above the last separator.
        assert_eq!(node.child_index(&"z"), 2);

        assert_eq!(node.child_for(&"z"), Some(&30));
    }

    #[test]
    fn test_insert_after() {
        let mut node = internal(&["j"], &[10, 20]);
        node.insert_after("t", 30, &20).unwrap();
        assert_eq!(node.keys(), &["j", "t"]);
        assert_eq!(node.children().copied().collect::<Vec<_>>(), vec![10, 20, 30]);

        // Insert after an interior child shifts the tail right.
        node.insert_after("m", 25, &20).unwrap();
        assert_eq!(node.keys(), &["j", "m", "t"]);
        assert_eq!(
            node.children().copied().collect::<Vec<_>>(),
            vec![10, 20, 25, 30]
        );

        let err = node.insert_after("x", 40, &99).unwrap_err();
        assert!(err.to_string().contains("corrupted"));
    }

    #[test]
    fn test_internal_remove_takes_right_child() {
        let mut node = internal(&["j", "t"], &[10, 20, 30]);
        let removed = node.remove(&"j").unwrap();
        assert_eq!(removed, 20);
        assert_eq!(node.keys(), &["t"]);
        assert_eq!(node.children().copied().collect::<Vec<_>>(), vec![10, 30]);

        let err = node.remove(&"q").unwrap_err();
        assert!(matches!(err, BanyanError::InvalidDeletion { .. }));
    }

    #[test]
    fn test_split_promote() {
        // Degree-4 node that just went over capacity: 4 keys, 5 children.
        let mut node = internal(&["d", "h", "m", "r"], &[1, 2, 3, 4, 5]);

        // The engine splits at ceil((d + 1) / 2); for d = 4 that is 3.
        let (promoted, right) = node.split_promote(3);
        assert_eq!(promoted, "m");
        assert_eq!(node.keys(), &["d", "h"]);
        assert_eq!(node.children().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(right.keys(), &["r"]);
        assert_eq!(right.children().copied().collect::<Vec<_>>(), vec![4, 5]);
    }

    #[test]
    fn test_internal_absorb() {
        let mut left = internal(&["d"], &[1, 2]);
        let right = internal(&["r"], &[3, 4]);

        left.absorb("m", right);
        assert_eq!(left.keys(), &["d", "m", "r"]);
        assert_eq!(
            left.children().copied().collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn test_replace_key() {
        let mut node = internal(&["d", "m"], &[1, 2, 3]);
        node.replace_key(&"m", "k").unwrap();
        assert_eq!(node.keys(), &["d", "k"]);

        let err = node.replace_key(&"z", "y").unwrap_err();
        assert!(matches!(err, BanyanError::Corrupted(_)));
    }

    #[test]
    fn test_internal_front_back_entries() {
        let mut node = internal(&["d", "m"], &[1, 2, 3]);

        assert_eq!(node.pop_back_entry(), Some(("m", 3)));
        node.insert_entry_front("a", 0);
        assert_eq!(node.keys(), &["a", "d"]);
        assert_eq!(node.children().copied().collect::<Vec<_>>(), vec![0, 1, 2]);

        assert_eq!(node.pop_front_entry(), Some(("a", 0)));
        assert_eq!(node.keys(), &["d"]);
    }

    #[test]
    fn test_node_variant_helpers() {
        let node: Node<&str, u32, u32> = Node::Leaf(leaf(&[("a", 1)]));
        assert!(node.is_leaf());
        assert!(node.as_leaf().is_some());
        assert!(node.as_internal().is_none());
        assert_eq!(node.key_count(), 1);
        assert_eq!(node.key(0), Some(&"a"));

        let inner: Node<&str, u32, u32> = Node::Internal(internal(&["j"], &[1, 2]));
        assert!(!inner.is_leaf());
        assert!(!node.mergeable(&inner, 5));
    }
}
