//! Cryptographic primitives for SealVault.
//!
//! This module provides:
//! - AES-256-GCM encryption and decryption with detached tags (`encryption`)
//! - Argon2id passphrase-based key derivation (`kdf`)
//! - HKDF-based per-record, MAC and signing sub-keys (`keys`)
//! - Ed25519 signatures and key fingerprints (`signing`)

pub mod encryption;
pub mod kdf;
pub mod keys;
pub mod signing;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{encrypt, decrypt, derive_master_key, ...};
pub use encryption::{decrypt, encrypt, encrypt_with, NonceSequence, Sealed};
pub use kdf::{derive_master_key, derive_master_key_with_params, generate_salt, Argon2Params};
pub use keys::{derive_mac_key, derive_record_key, derive_signing_seed, MasterKey};
pub use signing::{fingerprint, key_id, sign, verify, verify_bytes};
