//! In-memory record storage.

use bytes::Bytes;
use std::collections::BTreeMap;

use banyan_common::{FileId, Result};

use crate::RecordStore;

/// In-memory record store.
///
/// Records live in a per-file ordered map keyed by location. Location 0 is
/// the distinguished root-pointer slot; `add` allocates locations above the
/// highest one in use, so 0 is never handed out as a record location.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: BTreeMap<FileId, BTreeMap<u64, Bytes>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of occupied locations for a file.
    pub fn len(&self, file: FileId) -> usize {
        self.files.get(&file).map_or(0, BTreeMap::len)
    }

    /// Returns true if the file holds no records.
    pub fn is_empty(&self, file: FileId) -> bool {
        self.len(file) == 0
    }
}

impl RecordStore for MemoryStore {
    type Loc = u64;

    fn first(&self) -> u64 {
        0
    }

    fn add(&mut self, file: FileId, record: Bytes) -> Result<u64> {
        let first = self.first();
        let records = self.files.entry(file).or_default();
        let loc = match records.last_key_value() {
            Some((last, _)) => last + 1,
            None => first + 1,
        };
        records.insert(loc, record);
        Ok(loc)
    }

    fn get(&mut self, file: FileId, loc: u64) -> Result<Option<Bytes>> {
        Ok(self
            .files
            .get(&file)
            .and_then(|records| records.get(&loc).cloned()))
    }

    fn put(&mut self, file: FileId, loc: u64, record: Bytes) -> Result<Option<Bytes>> {
        Ok(self.files.entry(file).or_default().insert(loc, record))
    }

    fn remove(&mut self, file: FileId, loc: u64) -> Result<Option<Bytes>> {
        Ok(self
            .files
            .get_mut(&file)
            .and_then(|records| records.remove(&loc)))
    }
}
