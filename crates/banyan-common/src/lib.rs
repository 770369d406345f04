//! Banyan common types, errors, and configuration.
//!
//! This crate provides the shared definitions used across all Banyan
//! components.

pub mod config;
pub mod error;
pub mod types;

pub use config::StoreConfig;
pub use error::{BanyanError, Result};
pub use types::FileId;
