//! Generic B+-tree library with interchangeable node storage.
//!
//! This crate provides:
//! - The node model: leaf and internal nodes over generic keys and opaque
//!   payload pointers
//! - The tree engine: search, insert, and delete with split, merge, and
//!   redistribution, written once against the [`NodeStore`] capability
//! - [`NodeArena`], in-memory node storage with arena-allocated nodes
//! - [`PersistentNodes`], node storage over any
//!   [`RecordStore`](banyan_store::RecordStore)
//! - A line-oriented script runner for replaying insert/delete workloads
//!
//! ```
//! use banyan_tree::MemoryBPlusTree;
//!
//! let mut tree: MemoryBPlusTree<&str, u64> = MemoryBPlusTree::in_memory(4)?;
//! tree.insert("fern", 1)?;
//! tree.insert("moss", 2)?;
//! assert_eq!(tree.search(&"fern")?, Some(1));
//! # banyan_common::Result::Ok(())
//! ```
//!
//! Both tree flavors run the same algorithms; for any script of
//! operations they produce leaf chains enumerating the same key sequence.

mod arena;
mod node;
mod persist;
mod script;
mod store;
mod tree;

pub use arena::{NodeArena, NodeId};
pub use node::{InternalNode, LeafNode, Node};
pub use persist::{PersistentNodes, Record};
pub use script::{parse_line, run_script, Command, ScriptReport};
pub use store::NodeStore;
pub use tree::{BPlusTree, MemoryBPlusTree, PersistentBPlusTree, MIN_DEGREE};
