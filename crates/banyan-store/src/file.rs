//! File-backed record storage.

use bytes::Bytes;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use banyan_common::{BanyanError, FileId, Result, StoreConfig};

use crate::RecordStore;

/// Size of the per-slot length header in bytes.
const LEN_HEADER: usize = 4;

/// File-backed record store.
///
/// Each `FileId` maps to one file under the configured data directory,
/// divided into fixed-size slots. A slot holds `[len: u32-le][payload]`;
/// a zero length marks an empty slot. Locations are slot indices, with
/// slot 0 reserved for the root pointer.
pub struct FileStore {
    config: StoreConfig,
    handles: HashMap<FileId, FileHandle>,
}

/// Handle for an open record file.
struct FileHandle {
    file: File,
    num_slots: u64,
}

impl FileStore {
    /// Opens a store rooted at the configured data directory, creating the
    /// directory if needed.
    pub fn open(config: StoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        Ok(Self {
            config,
            handles: HashMap::new(),
        })
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn file_path(&self, file: FileId) -> PathBuf {
        self.config.data_dir.join(format!("{:08}.rec", file.as_u32()))
    }

    fn handle(&mut self, file: FileId) -> Result<&mut FileHandle> {
        if !self.handles.contains_key(&file) {
            let path = self.file_path(file);
            let f = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?;
            let num_slots = f.metadata()?.len() / self.config.slot_size as u64;
            self.handles.insert(file, FileHandle { file: f, num_slots });
        }
        // Just inserted above when absent.
        match self.handles.get_mut(&file) {
            Some(handle) => Ok(handle),
            None => Err(BanyanError::Corrupted(format!(
                "record file {file} vanished from the handle table"
            ))),
        }
    }

    fn read_slot(&mut self, file: FileId, slot: u64) -> Result<Option<Bytes>> {
        let slot_size = self.config.slot_size;
        let max = self.config.max_record_size();
        let handle = self.handle(file)?;

        if slot >= handle.num_slots {
            return Ok(None);
        }

        handle.file.seek(SeekFrom::Start(slot * slot_size as u64))?;
        let mut buf = vec![0u8; slot_size];
        handle.file.read_exact(&mut buf)?;

        let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if len == 0 {
            return Ok(None);
        }
        if len > max {
            return Err(BanyanError::Corrupted(format!(
                "slot {slot} in file {file} claims {len} bytes (slot payload max {max})"
            )));
        }
        Ok(Some(Bytes::copy_from_slice(
            &buf[LEN_HEADER..LEN_HEADER + len],
        )))
    }

    fn write_slot(&mut self, file: FileId, slot: u64, record: &Bytes) -> Result<()> {
        let slot_size = self.config.slot_size;
        let max = self.config.max_record_size();
        if record.len() > max {
            return Err(BanyanError::RecordTooLarge {
                size: record.len(),
                max,
            });
        }

        let sync = self.config.sync_writes;
        let handle = self.handle(file)?;

        let mut buf = vec![0u8; slot_size];
        buf[..LEN_HEADER].copy_from_slice(&(record.len() as u32).to_le_bytes());
        buf[LEN_HEADER..LEN_HEADER + record.len()].copy_from_slice(record);

        handle.file.seek(SeekFrom::Start(slot * slot_size as u64))?;
        handle.file.write_all(&buf)?;
        if sync {
            handle.file.sync_all()?;
        }

        if slot >= handle.num_slots {
            handle.num_slots = slot + 1;
        }
        Ok(())
    }

    /// Flushes all open record files.
    pub fn flush(&mut self) -> Result<()> {
        for handle in self.handles.values() {
            handle.file.sync_all()?;
        }
        Ok(())
    }
}

impl RecordStore for FileStore {
    type Loc = u64;

    fn first(&self) -> u64 {
        0
    }

    fn add(&mut self, file: FileId, record: Bytes) -> Result<u64> {
        // Slot 0 is the root-pointer slot; fresh records start at 1.
        let slot = self.handle(file)?.num_slots.max(1);
        self.write_slot(file, slot, &record)?;
        Ok(slot)
    }

    fn get(&mut self, file: FileId, loc: u64) -> Result<Option<Bytes>> {
        self.read_slot(file, loc)
    }

    fn put(&mut self, file: FileId, loc: u64, record: Bytes) -> Result<Option<Bytes>> {
        let num_slots = self.handle(file)?.num_slots;
        if loc >= num_slots && loc != self.first() {
            return Err(BanyanError::InvalidLocation {
                location: format!("{loc} (file {file} has {num_slots} slots)"),
            });
        }
        let prior = self.read_slot(file, loc)?;
        self.write_slot(file, loc, &record)?;
        Ok(prior)
    }

    fn remove(&mut self, file: FileId, loc: u64) -> Result<Option<Bytes>> {
        let prior = self.read_slot(file, loc)?;
        if prior.is_some() {
            let sync = self.config.sync_writes;
            let slot_size = self.config.slot_size as u64;
            let handle = self.handle(file)?;
            handle.file.seek(SeekFrom::Start(loc * slot_size))?;
            handle.file.write_all(&0u32.to_le_bytes())?;
            if sync {
                handle.file.sync_all()?;
            }
        }
        Ok(prior)
    }
}
