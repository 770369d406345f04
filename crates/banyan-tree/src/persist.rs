//! Record-store-backed node storage.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

use banyan_common::{BanyanError, FileId, Result};
use banyan_store::RecordStore;

use crate::node::Node;
use crate::store::NodeStore;

/// A record as persisted in the backing store.
///
/// The distinguished `first()` location holds a `Root` record pointing at
/// the current root node; every other occupied location holds a `Node`
/// record. Node records embed child locations of the store's own location
/// type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Record<K, P, L> {
    /// The location of the current root node.
    Root(L),
    /// A node body.
    Node(Node<K, P, L>),
}

/// Node storage over an external record store.
///
/// Nodes are serialized into byte records and addressed by store
/// locations; the root pointer lives at the store's `first()` location.
/// Loading a node deserializes a fresh owned copy, so a put/get round
/// trip through the store is exercised on every access.
pub struct PersistentNodes<K, P, S> {
    store: S,
    file: FileId,
    _marker: PhantomData<fn() -> (K, P)>,
}

impl<K, P, S> PersistentNodes<K, P, S> {
    /// Creates node storage for one tree (`file`) inside the store.
    pub fn new(store: S, file: FileId) -> Self {
        Self {
            store,
            file,
            _marker: PhantomData,
        }
    }

    /// Returns the file id this tree occupies in the store.
    pub fn file(&self) -> FileId {
        self.file
    }

    /// Gives the store back, consuming the node storage.
    pub fn into_store(self) -> S {
        self.store
    }
}

fn encode<T: Serialize>(record: &T) -> Result<Bytes> {
    let buf = serde_json::to_vec(record)
        .map_err(|e| BanyanError::Corrupted(format!("record encoding failed: {e}")))?;
    Ok(Bytes::from(buf))
}

fn decode<T: DeserializeOwned>(bytes: &Bytes) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| BanyanError::Corrupted(format!("record decoding failed: {e}")))
}

impl<K, P, S> NodeStore<K, P> for PersistentNodes<K, P, S>
where
    K: Serialize + DeserializeOwned,
    P: Serialize + DeserializeOwned,
    S: RecordStore,
{
    type Ptr = S::Loc;

    fn root(&mut self) -> Result<Option<S::Loc>> {
        let first = self.store.first();
        match self.store.get(self.file, first)? {
            None => Ok(None),
            Some(bytes) => match decode::<Record<K, P, S::Loc>>(&bytes)? {
                Record::Root(loc) => Ok(Some(loc)),
                Record::Node(_) => Err(BanyanError::Corrupted(
                    "root-pointer slot holds a node body".to_string(),
                )),
            },
        }
    }

    fn set_root(&mut self, ptr: S::Loc) -> Result<()> {
        let first = self.store.first();
        let record: Record<K, P, S::Loc> = Record::Root(ptr);
        self.store.put(self.file, first, encode(&record)?)?;
        Ok(())
    }

    fn load(&mut self, ptr: S::Loc) -> Result<Node<K, P, S::Loc>> {
        match self.store.get(self.file, ptr)? {
            Some(bytes) => match decode::<Record<K, P, S::Loc>>(&bytes)? {
                Record::Node(node) => Ok(node),
                Record::Root(_) => Err(BanyanError::Corrupted(format!(
                    "location {ptr:?} holds a root pointer, not a node"
                ))),
            },
            None => Err(BanyanError::Corrupted(format!(
                "dangling node location {ptr:?}"
            ))),
        }
    }

    fn alloc(&mut self, node: Node<K, P, S::Loc>) -> Result<S::Loc> {
        self.store.add(self.file, encode(&Record::Node(node))?)
    }

    fn save(&mut self, ptr: S::Loc, node: Node<K, P, S::Loc>) -> Result<()> {
        self.store.put(self.file, ptr, encode(&Record::Node(node))?)?;
        Ok(())
    }

    fn free(&mut self, ptr: S::Loc) -> Result<()> {
        self.store.remove(self.file, ptr)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::LeafNode;
    use banyan_store::MemoryStore;

    fn test_nodes() -> PersistentNodes<String, u32, MemoryStore> {
        PersistentNodes::new(MemoryStore::new(), FileId::new(0))
    }

    fn leaf_node(key: &str, payload: u32) -> Node<String, u32, u64> {
        let mut leaf = LeafNode::new();
        leaf.insert(key.to_string(), payload);
        Node::Leaf(leaf)
    }

    #[test]
    fn test_node_roundtrip_through_store() {
        let mut nodes = test_nodes();

        let loc = nodes.alloc(leaf_node("apple", 1)).unwrap();
        let restored = nodes.load(loc).unwrap();

        let leaf = restored.as_leaf().unwrap();
        assert_eq!(leaf.search(&"apple".to_string()), Some(&1));
        assert_eq!(leaf.successor(), None);
    }

    #[test]
    fn test_save_overwrites_in_place() {
        let mut nodes = test_nodes();

        let loc = nodes.alloc(leaf_node("a", 1)).unwrap();
        nodes.save(loc, leaf_node("b", 2)).unwrap();

        let restored = nodes.load(loc).unwrap();
        assert_eq!(restored.key(0), Some(&"b".to_string()));
    }

    #[test]
    fn test_root_pointer_at_first_location() {
        let mut nodes = test_nodes();
        assert_eq!(nodes.root().unwrap(), None);

        let loc = nodes.alloc(leaf_node("a", 1)).unwrap();
        nodes.set_root(loc).unwrap();
        assert_eq!(nodes.root().unwrap(), Some(loc));

        // The root slot itself must not load as a node.
        let first = nodes.store.first();
        assert!(nodes.load(first).is_err());
    }

    #[test]
    fn test_free_leaves_dangling_location() {
        let mut nodes = test_nodes();

        let loc = nodes.alloc(leaf_node("a", 1)).unwrap();
        nodes.free(loc).unwrap();

        let err = nodes.load(loc).unwrap_err();
        assert!(err.to_string().contains("dangling"));
    }

    #[test]
    fn test_successor_links_survive_roundtrip() {
        let mut nodes = test_nodes();

        let right = nodes.alloc(leaf_node("m", 2)).unwrap();
        let mut left = LeafNode::new();
        left.insert("a".to_string(), 1);
        left.set_successor(Some(right));
        let left_loc = nodes.alloc(Node::Leaf(left)).unwrap();

        let restored = nodes.load(left_loc).unwrap();
        assert_eq!(restored.as_leaf().unwrap().successor(), Some(&right));
    }
}
