//! The B+-tree engine.
//!
//! Search, insertion, and deletion are implemented once against the
//! [`NodeStore`] capability; the in-memory and persistent trees are the
//! same engine over different node storage. Every operation loads owned
//! copies of the nodes it touches, mutates them, and writes them back, so
//! a mutation is durable exactly when the backend's `save` is.
//!
//! Descent records an operation-scoped stack of `(node, child index)`
//! frames in place of parent pointers; the stack dies with the operation,
//! which keeps nodes free of parent links and serialization-friendly.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

use banyan_common::{BanyanError, FileId, Result};
use banyan_store::RecordStore;

use crate::arena::NodeArena;
use crate::node::{InternalNode, LeafNode, Node};
use crate::persist::PersistentNodes;
use crate::store::NodeStore;

/// Smallest accepted tree degree.
pub const MIN_DEGREE: usize = 3;

/// A B+-tree mapping ordered keys to opaque payload pointers.
///
/// `degree` is the maximum number of children per internal node; leaves
/// hold at most `degree - 1` entries. Keys are unique.
pub struct BPlusTree<K, P, S> {
    degree: usize,
    nodes: S,
    _marker: std::marker::PhantomData<fn() -> (K, P)>,
}

/// A B+-tree whose nodes live in an in-memory arena.
pub type MemoryBPlusTree<K, P> = BPlusTree<K, P, NodeArena<K, P>>;

/// A B+-tree whose nodes live in an external record store.
pub type PersistentBPlusTree<K, P, S> = BPlusTree<K, P, PersistentNodes<K, P, S>>;

/// Descent stack: for every internal node on the path, its reference and
/// the index of the child the operation descended into.
type Path<Ptr> = Vec<(Ptr, usize)>;

impl<K, P> MemoryBPlusTree<K, P>
where
    K: Ord + Clone + fmt::Debug,
    P: Clone,
{
    /// Creates an empty in-memory tree.
    pub fn in_memory(degree: usize) -> Result<Self> {
        Self::new(degree, NodeArena::new())
    }
}

impl<K, P, S> PersistentBPlusTree<K, P, S>
where
    K: Ord + Clone + fmt::Debug + Serialize + DeserializeOwned,
    P: Clone + Serialize + DeserializeOwned,
    S: RecordStore,
{
    /// Opens the tree stored under `file` in the record store.
    ///
    /// A store that has never held this tree yields an empty tree; an
    /// existing root pointer at the store's first location is picked up
    /// as-is.
    pub fn persistent(degree: usize, store: S, file: FileId) -> Result<Self> {
        Self::new(degree, PersistentNodes::new(store, file))
    }

    /// Consumes the tree and gives the record store back.
    pub fn into_store(self) -> S {
        self.nodes.into_store()
    }
}

impl<K, P, S> BPlusTree<K, P, S>
where
    K: Ord + Clone + fmt::Debug,
    P: Clone,
    S: NodeStore<K, P>,
{
    /// Creates a tree of the given degree over the given node storage.
    pub fn new(degree: usize, nodes: S) -> Result<Self> {
        if degree < MIN_DEGREE {
            return Err(BanyanError::InvalidDegree { degree });
        }
        Ok(Self {
            degree,
            nodes,
            _marker: std::marker::PhantomData,
        })
    }

    /// Returns the tree degree.
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Returns the root node, or `None` if the tree has never held a key.
    pub fn root(&mut self) -> Result<Option<Node<K, P, S::Ptr>>> {
        match self.nodes.root()? {
            Some(ptr) => Ok(Some(self.nodes.load(ptr)?)),
            None => Ok(None),
        }
    }

    /// Returns child `i` of an internal node, or `None` for an empty slot.
    pub fn child(
        &mut self,
        node: &InternalNode<K, S::Ptr>,
        i: usize,
    ) -> Result<Option<Node<K, P, S::Ptr>>> {
        match node.child(i) {
            Some(&ptr) => Ok(Some(self.nodes.load(ptr)?)),
            None => Ok(None),
        }
    }

    /// Returns the payload pointer stored under `key`.
    pub fn search(&mut self, key: &K) -> Result<Option<P>> {
        if self.nodes.root()?.is_none() {
            return Ok(None);
        }
        let (_, leaf, _) = self.descend(key)?;
        Ok(leaf.search(key).cloned())
    }

    /// Enumerates all entries in ascending key order by walking the leaf
    /// chain.
    pub fn scan(&mut self) -> Result<Vec<(K, P)>> {
        let Some(mut ptr) = self.nodes.root()? else {
            return Ok(Vec::new());
        };
        let mut leaf = loop {
            match self.nodes.load(ptr)? {
                Node::Leaf(leaf) => break leaf,
                Node::Internal(node) => match node.child(0) {
                    Some(&child) => ptr = child,
                    None => {
                        return Err(BanyanError::Corrupted(
                            "internal node without children".to_string(),
                        ))
                    }
                },
            }
        };

        let mut entries = Vec::new();
        loop {
            for (k, p) in leaf.entries() {
                entries.push((k.clone(), p.clone()));
            }
            match leaf.successor().copied() {
                Some(next) => leaf = self.load_leaf(next)?,
                None => break,
            }
        }
        Ok(entries)
    }

    /// Inserts `(key, payload)`.
    ///
    /// Fails with `InvalidInsertion` if the key is already present; the
    /// tree is left unchanged in that case.
    pub fn insert(&mut self, key: K, payload: P) -> Result<()> {
        if self.nodes.root()?.is_none() {
            let mut leaf = LeafNode::new();
            leaf.insert(key, payload);
            let ptr = self.nodes.alloc(Node::Leaf(leaf))?;
            self.nodes.set_root(ptr)?;
            return Ok(());
        }

        let (leaf_ptr, mut leaf, mut path) = self.descend(&key)?;
        if leaf.contains(&key) {
            return Err(BanyanError::InvalidInsertion {
                key: format!("{key:?}"),
            });
        }

        if !leaf.is_full(self.degree) {
            leaf.insert(key, payload);
            return self.nodes.save(leaf_ptr, Node::Leaf(leaf));
        }

        // Full leaf: the loaded copy becomes the oversize working node.
        // It temporarily holds `degree` entries, one over capacity, and is
        // split before anything is written back.
        leaf.insert(key, payload);
        let split = self.degree.div_ceil(2);
        let right = leaf.split_off(split);
        let separator = match right.first_key() {
            Some(k) => k.clone(),
            None => {
                return Err(BanyanError::Corrupted(
                    "leaf split produced an empty right half".to_string(),
                ))
            }
        };
        let right_ptr = self.nodes.alloc(Node::Leaf(right))?;
        leaf.set_successor(Some(right_ptr));
        self.nodes.save(leaf_ptr, Node::Leaf(leaf))?;
        tracing::debug!(separator = ?separator, "leaf split");
        self.insert_in_parent(leaf_ptr, separator, right_ptr, &mut path)
    }

    /// Deletes `key` and its payload pointer.
    ///
    /// Fails with `InvalidDeletion` if the key is absent; the tree is left
    /// unchanged in that case.
    pub fn delete(&mut self, key: &K) -> Result<()> {
        if self.nodes.root()?.is_none() {
            return Err(BanyanError::InvalidDeletion {
                key: format!("{key:?}"),
            });
        }
        let (leaf_ptr, leaf, mut path) = self.descend(key)?;
        self.delete_entry(leaf_ptr, Node::Leaf(leaf), key, &mut path)
    }

    /// Walks from the root to the leaf responsible for `key`, recording
    /// the descent stack.
    fn descend(
        &mut self,
        key: &K,
    ) -> Result<(S::Ptr, LeafNode<K, P, S::Ptr>, Path<S::Ptr>)> {
        let Some(mut ptr) = self.nodes.root()? else {
            return Err(BanyanError::Corrupted(
                "descent into an empty tree".to_string(),
            ));
        };
        let mut path = Path::new();
        loop {
            match self.nodes.load(ptr)? {
                Node::Leaf(leaf) => return Ok((ptr, leaf, path)),
                Node::Internal(node) => {
                    let idx = node.child_index(key);
                    let child = match node.child(idx) {
                        Some(&c) => c,
                        None => {
                            return Err(BanyanError::Corrupted(format!(
                                "internal node {ptr:?} has no child at index {idx}"
                            )))
                        }
                    };
                    path.push((ptr, idx));
                    ptr = child;
                }
            }
        }
    }

    /// Links a freshly split-off right node into the parent of `left`,
    /// splitting upward as needed.
    fn insert_in_parent(
        &mut self,
        left: S::Ptr,
        key: K,
        right: S::Ptr,
        path: &mut Path<S::Ptr>,
    ) -> Result<()> {
        let Some((parent_ptr, _)) = path.pop() else {
            // `left` was the root; grow a new one above it.
            let root = InternalNode::with_children(left, key, right);
            let root_ptr = self.nodes.alloc(Node::Internal(root))?;
            self.nodes.set_root(root_ptr)?;
            tracing::debug!("grew a new root");
            return Ok(());
        };

        let mut parent = self.load_internal(parent_ptr)?;
        if !parent.is_full(self.degree) {
            parent.insert_after(key, right, &left)?;
            return self.nodes.save(parent_ptr, Node::Internal(parent));
        }

        // Full parent: the loaded copy is the oversize working node with
        // `degree` keys after the insert; split it and promote the middle
        // key to the grandparent.
        parent.insert_after(key, right, &left)?;
        let split = (self.degree + 1).div_ceil(2);
        let (promoted, right_half) = parent.split_promote(split);
        let right_ptr = self.nodes.alloc(Node::Internal(right_half))?;
        self.nodes.save(parent_ptr, Node::Internal(parent))?;
        tracing::debug!(promoted = ?promoted, "internal split");
        self.insert_in_parent(parent_ptr, promoted, right_ptr, path)
    }

    /// Removes `key` from the loaded `node` and restores the occupancy
    /// invariants, propagating structural changes toward the root.
    fn delete_entry(
        &mut self,
        ptr: S::Ptr,
        mut node: Node<K, P, S::Ptr>,
        key: &K,
        path: &mut Path<S::Ptr>,
    ) -> Result<()> {
        match &mut node {
            Node::Leaf(leaf) => {
                leaf.remove(key)?;
            }
            Node::Internal(inner) => {
                inner.remove(key)?;
            }
        }

        let Some((parent_ptr, idx)) = path.pop() else {
            // Root. An internal root reduced to a single child collapses;
            // a root leaf may become arbitrarily small, even empty.
            if let Node::Internal(inner) = &node {
                if inner.child_count() == 1 {
                    match inner.child(0) {
                        Some(&child) => {
                            self.nodes.set_root(child)?;
                            self.nodes.free(ptr)?;
                            tracing::debug!("root collapsed");
                            return Ok(());
                        }
                        None => {
                            return Err(BanyanError::Corrupted(
                                "internal root without children".to_string(),
                            ))
                        }
                    }
                }
            }
            return self.nodes.save(ptr, node);
        };

        if !node.is_under_utilized(self.degree) {
            return self.nodes.save(ptr, node);
        }

        // Under-utilized: pick a sibling (left if one exists) and the
        // separator between the two, then merge or redistribute.
        let mut parent = self.load_internal(parent_ptr)?;
        let left_biased = idx > 0;
        let sibling_idx = if left_biased { idx - 1 } else { idx + 1 };
        let separator_idx = if left_biased { idx - 1 } else { idx };
        let sibling_ptr = match parent.child(sibling_idx) {
            Some(&c) => c,
            None => {
                return Err(BanyanError::Corrupted(
                    "under-utilized node has no sibling".to_string(),
                ))
            }
        };
        let separator = match parent.key(separator_idx) {
            Some(k) => k.clone(),
            None => {
                return Err(BanyanError::Corrupted(
                    "no separator between siblings".to_string(),
                ))
            }
        };
        let sibling = self.nodes.load(sibling_ptr)?;

        if node.mergeable(&sibling, self.degree) {
            // Canonical merge order: the left of the two absorbs the right.
            let (left_ptr, mut left, right_ptr, right) = if left_biased {
                (sibling_ptr, sibling, ptr, node)
            } else {
                (ptr, node, sibling_ptr, sibling)
            };
            match (&mut left, right) {
                (Node::Leaf(l), Node::Leaf(r)) => l.absorb(r),
                (Node::Internal(l), Node::Internal(r)) => l.absorb(separator.clone(), r),
                _ => {
                    return Err(BanyanError::Corrupted(
                        "merge across node variants".to_string(),
                    ))
                }
            }
            self.nodes.save(left_ptr, left)?;
            self.nodes.free(right_ptr)?;
            tracing::debug!(separator = ?separator, "merged siblings");
            // The separator between the merged nodes, and the pointer to
            // the absorbed right node, leave the parent.
            self.delete_entry(parent_ptr, Node::Internal(parent), &separator, path)
        } else {
            self.redistribute(
                &mut node,
                sibling_ptr,
                sibling,
                &mut parent,
                &separator,
                left_biased,
            )?;
            self.nodes.save(ptr, node)?;
            self.nodes.save(parent_ptr, Node::Internal(parent))?;
            tracing::debug!(separator = ?separator, "redistributed with sibling");
            Ok(())
        }
    }

    /// Borrows one entry across the sibling boundary into `node` and
    /// rewrites the parent separator. Saves the sibling; the caller saves
    /// `node` and the parent.
    fn redistribute(
        &mut self,
        node: &mut Node<K, P, S::Ptr>,
        sibling_ptr: S::Ptr,
        sibling: Node<K, P, S::Ptr>,
        parent: &mut InternalNode<K, S::Ptr>,
        separator: &K,
        left_biased: bool,
    ) -> Result<()> {
        let empty_sibling =
            || BanyanError::Corrupted("empty sibling during redistribution".to_string());

        match (node, sibling) {
            (Node::Leaf(node), Node::Leaf(mut sibling)) => {
                if left_biased {
                    // The left sibling's last entry becomes this node's
                    // first and the new separator.
                    let (k, p) = sibling.pop_back_entry().ok_or_else(empty_sibling)?;
                    parent.replace_key(separator, k.clone())?;
                    node.insert(k, p);
                } else {
                    // The right sibling's first entry moves over; its new
                    // first key becomes the separator.
                    let (k, p) = sibling.pop_front_entry().ok_or_else(empty_sibling)?;
                    node.insert(k, p);
                    let next = sibling.first_key().cloned().ok_or_else(empty_sibling)?;
                    parent.replace_key(separator, next)?;
                }
                self.nodes.save(sibling_ptr, Node::Leaf(sibling))
            }
            (Node::Internal(node), Node::Internal(mut sibling)) => {
                if left_biased {
                    // The left sibling's last child moves to the front of
                    // this node under the old separator; the key it
                    // leaves behind replaces the separator.
                    let (k, c) = sibling.pop_back_entry().ok_or_else(empty_sibling)?;
                    node.insert_entry_front(separator.clone(), c);
                    parent.replace_key(separator, k)?;
                } else {
                    // Mirror image: the right sibling's first child moves
                    // to the back of this node.
                    let (k, c) = sibling.pop_front_entry().ok_or_else(empty_sibling)?;
                    node.push_entry_back(separator.clone(), c);
                    parent.replace_key(separator, k)?;
                }
                self.nodes.save(sibling_ptr, Node::Internal(sibling))
            }
            _ => Err(BanyanError::Corrupted(
                "redistribution across node variants".to_string(),
            )),
        }
    }

    fn load_internal(&mut self, ptr: S::Ptr) -> Result<InternalNode<K, S::Ptr>> {
        match self.nodes.load(ptr)? {
            Node::Internal(node) => Ok(node),
            Node::Leaf(_) => Err(BanyanError::Corrupted(format!(
                "expected an internal node at {ptr:?}"
            ))),
        }
    }

    fn load_leaf(&mut self, ptr: S::Ptr) -> Result<LeafNode<K, P, S::Ptr>> {
        match self.nodes.load(ptr)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(_) => Err(BanyanError::Corrupted(format!(
                "expected a leaf at {ptr:?}"
            ))),
        }
    }

    /// Walks the whole tree and verifies its structural invariants:
    /// strict key order, separator bounds, uniform leaf depth, non-empty
    /// non-root nodes, and a successor chain that enumerates exactly the
    /// in-order leaves without duplicates.
    pub fn check_invariants(&mut self) -> Result<()> {
        let Some(root_ptr) = self.nodes.root()? else {
            return Ok(());
        };

        let mut leaves = Vec::new();
        let mut keys = Vec::new();
        let mut leaf_depth = None;
        self.check_node(
            root_ptr,
            0,
            None,
            None,
            true,
            &mut leaf_depth,
            &mut leaves,
            &mut keys,
        )?;

        for pair in keys.windows(2) {
            if pair[0] >= pair[1] {
                return Err(BanyanError::Corrupted(format!(
                    "keys out of order across the tree: {:?} then {:?}",
                    pair[0], pair[1]
                )));
            }
        }

        // The successor chain from the leftmost leaf must visit the
        // in-order leaves exactly once each.
        let Some(&first) = leaves.first() else {
            return Ok(());
        };
        let mut chain = Vec::new();
        let mut current = Some(first);
        while let Some(ptr) = current {
            if chain.len() > leaves.len() {
                return Err(BanyanError::Corrupted(
                    "successor chain longer than the leaf count".to_string(),
                ));
            }
            chain.push(ptr);
            current = self.load_leaf(ptr)?.successor().copied();
        }
        if chain != leaves {
            return Err(BanyanError::Corrupted(
                "successor chain does not match the in-order leaves".to_string(),
            ));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn check_node(
        &mut self,
        ptr: S::Ptr,
        depth: usize,
        lower: Option<&K>,
        upper: Option<&K>,
        is_root: bool,
        leaf_depth: &mut Option<usize>,
        leaves: &mut Vec<S::Ptr>,
        keys: &mut Vec<K>,
    ) -> Result<()> {
        let node = self.nodes.load(ptr)?;
        if !is_root && node.key_count() == 0 {
            return Err(BanyanError::Corrupted(format!(
                "empty non-root node at {ptr:?}"
            )));
        }

        match node {
            Node::Leaf(leaf) => {
                match *leaf_depth {
                    None => *leaf_depth = Some(depth),
                    Some(expected) if expected != depth => {
                        return Err(BanyanError::Corrupted(format!(
                            "leaf at depth {depth}, expected {expected}"
                        )))
                    }
                    Some(_) => {}
                }
                for key in leaf.keys() {
                    if lower.is_some_and(|lo| key < lo) {
                        return Err(BanyanError::Corrupted(format!(
                            "leaf key {key:?} below its separator bound"
                        )));
                    }
                    if upper.is_some_and(|hi| key >= hi) {
                        return Err(BanyanError::Corrupted(format!(
                            "leaf key {key:?} at or above its separator bound"
                        )));
                    }
                }
                keys.extend(leaf.keys().iter().cloned());
                leaves.push(ptr);
                Ok(())
            }
            Node::Internal(inner) => {
                if inner.child_count() != inner.key_count() + 1 {
                    return Err(BanyanError::Corrupted(format!(
                        "internal node with {} keys but {} children",
                        inner.key_count(),
                        inner.child_count()
                    )));
                }
                for sep in inner.keys() {
                    if lower.is_some_and(|lo| sep <= lo) || upper.is_some_and(|hi| sep >= hi) {
                        return Err(BanyanError::Corrupted(format!(
                            "separator {sep:?} outside its bounds"
                        )));
                    }
                }
                let count = inner.child_count();
                for i in 0..count {
                    let child = match inner.child(i) {
                        Some(&c) => c,
                        None => {
                            return Err(BanyanError::Corrupted(
                                "missing child during invariant walk".to_string(),
                            ))
                        }
                    };
                    let child_lower = if i == 0 { lower } else { inner.key(i - 1) };
                    let child_upper = if i == count - 1 { upper } else { inner.key(i) };
                    self.check_node(
                        child,
                        depth + 1,
                        child_lower,
                        child_upper,
                        false,
                        leaf_depth,
                        leaves,
                        keys,
                    )?;
                }
                Ok(())
            }
        }
    }
}
