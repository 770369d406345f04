//! Record stores for Banyan.
//!
//! This crate provides:
//! - The [`RecordStore`] contract the persistent B+-tree backend consumes
//! - [`MemoryStore`], an in-memory store for tests and ephemeral trees
//! - [`FileStore`], a slotted record file store for durable trees
//!
//! A record store maps opaque locations to opaque byte records, namespaced
//! by a [`FileId`] so several trees can share one store. One location,
//! [`RecordStore::first`], is distinguished: it is reserved to hold the
//! pointer to a tree's current root and never holds a node body.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::hash::Hash;

use banyan_common::{FileId, Result};

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// A store of opaque byte records addressed by opaque locations.
///
/// The store is assumed quiescent for the duration of a single tree
/// operation: reads and writes against one location are atomic, and no
/// other writer touches the tree's `FileId` mid-operation.
pub trait RecordStore {
    /// Location handle type. Locations end up embedded inside serialized
    /// node records (internal nodes store the locations of their children),
    /// so they must round-trip through serde.
    type Loc: Copy + Eq + Ord + Hash + fmt::Debug + Serialize + DeserializeOwned;

    /// Returns the distinguished location reserved for the root pointer.
    fn first(&self) -> Self::Loc;

    /// Stores a record at a fresh location and returns that location.
    fn add(&mut self, file: FileId, record: Bytes) -> Result<Self::Loc>;

    /// Retrieves the record at a location.
    ///
    /// Returns `None` for a location that was never written or has been
    /// removed.
    fn get(&mut self, file: FileId, loc: Self::Loc) -> Result<Option<Bytes>>;

    /// Overwrites the record at an existing location, returning the
    /// displaced record.
    fn put(&mut self, file: FileId, loc: Self::Loc, record: Bytes) -> Result<Option<Bytes>>;

    /// Clears a location, returning the prior record if any.
    fn remove(&mut self, file: FileId, loc: Self::Loc) -> Result<Option<Bytes>>;
}
