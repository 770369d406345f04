//! Configuration structures for Banyan stores.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default record slot size in bytes (4 KB).
pub const DEFAULT_SLOT_SIZE: usize = 4096;

/// Configuration for the file-backed record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory for record files.
    pub data_dir: PathBuf,
    /// Size of each record slot in bytes.
    pub slot_size: usize,
    /// Enable fsync after writes.
    pub sync_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            slot_size: DEFAULT_SLOT_SIZE,
            sync_writes: true,
        }
    }
}

impl StoreConfig {
    /// Returns the largest record payload that fits in one slot.
    ///
    /// Each slot carries a 4-byte length header ahead of the payload.
    pub fn max_record_size(&self) -> usize {
        self.slot_size.saturating_sub(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.slot_size, DEFAULT_SLOT_SIZE);
        assert_eq!(config.slot_size, 4096);
        assert!(config.sync_writes);
    }

    #[test]
    fn test_store_config_custom() {
        let config = StoreConfig {
            data_dir: PathBuf::from("/var/lib/banyan"),
            slot_size: 8192,
            sync_writes: false,
        };

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/banyan"));
        assert_eq!(config.slot_size, 8192);
        assert!(!config.sync_writes);
    }

    #[test]
    fn test_max_record_size() {
        let config = StoreConfig::default();
        assert_eq!(config.max_record_size(), 4096 - 4);

        let tiny = StoreConfig {
            slot_size: 2,
            ..Default::default()
        };
        assert_eq!(tiny.max_record_size(), 0);
    }

    #[test]
    fn test_store_config_clone() {
        let config1 = StoreConfig::default();
        let config2 = config1.clone();
        assert_eq!(config1.slot_size, config2.slot_size);
        assert_eq!(config1.data_dir, config2.data_dir);
    }

    #[test]
    fn test_store_config_serde_roundtrip() {
        let original = StoreConfig::default();
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: StoreConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(original.data_dir, deserialized.data_dir);
        assert_eq!(original.slot_size, deserialized.slot_size);
        assert_eq!(original.sync_writes, deserialized.sync_writes);
    }
}
