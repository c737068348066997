//! Vault module: encrypted record storage.
//!
//! This module provides:
//! - `RecordId`, `RecordFormat`, `StoredRecord` and `RecordMetadata` (`record`)
//! - Signature entries produced by repeat signing (`signature`)
//! - Binary container format with A/B header slots and chained frame MACs (`format`)
//! - Advisory file locking (`lock`)
//! - In-memory label/tag index (`index`)
//! - High-level `Vault` for creating, opening and mutating vaults (`store`)

pub mod format;
pub mod index;
pub mod lock;
pub mod record;
pub mod signature;
pub mod store;

// Re-export the most commonly used items.
pub use index::SearchIndex;
pub use record::{RecordFormat, RecordId, RecordMetadata, SignPolicy, StoredRecord};
pub use signature::SignatureEntry;
pub use store::{Vault, VaultOptions, DEFAULT_LOCK_TIMEOUT};
