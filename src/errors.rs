use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::vault::RecordId;

/// All errors that can occur in SealVault.
///
/// Messages never carry plaintext, ciphertext or key material.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Crypto errors ---
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Authentication failed — data was tampered with or corrupted")]
    Authentication,

    // --- Container errors ---
    #[error("Wrong passphrase — the vault header did not authenticate")]
    WrongPassphrase,

    #[error("Corrupt vault: {0}")]
    CorruptVault(String),

    #[error("Vault not found at {0}")]
    NotFound(PathBuf),

    #[error("Vault already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("Vault at {path} is busy (lock not acquired within {waited:?})")]
    VaultBusy { path: PathBuf, waited: Duration },

    // --- Record errors ---
    #[error("Record {0} not found")]
    RecordNotFound(RecordId),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    Config(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    Serialization(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

/// Convenience type alias for SealVault results.
pub type Result<T> = std::result::Result<T, VaultError>;
