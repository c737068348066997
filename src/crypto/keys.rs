//! Sub-key derivation using HKDF-SHA256.
//!
//! From a single master key we derive:
//! - A unique **per-record** encryption key for each record id.
//! - A dedicated **MAC key** for header and frame integrity.
//! - A **per-record signing seed** for the record's Ed25519 key.
//!
//! HKDF (RFC 5869) uses the master key as input keying material and a
//! context string (`info`) to produce independent sub-keys.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::errors::{Result, VaultError};

use super::kdf::KEY_LEN;

/// Derive the encryption key for one record.
pub fn derive_record_key(master_key: &[u8], record_id: u64) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let info = format!("sealvault-record:{record_id}");
    hkdf_derive(master_key, info.as_bytes())
}

/// Derive the MAC key that authenticates header slots and frames.
pub fn derive_mac_key(master_key: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    hkdf_derive(master_key, b"sealvault-mac-key")
}

/// Derive the 32-byte Ed25519 seed for one record.
pub fn derive_signing_seed(
    master_key: &[u8],
    record_id: u64,
) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let info = format!("sealvault-sign:{record_id}");
    hkdf_derive(master_key, info.as_bytes())
}

/// Run HKDF-SHA256 expand with the given `info`.
///
/// The master key came out of Argon2id so it is already uniformly
/// random; no extract salt is used.
fn hkdf_derive(ikm: &[u8], info: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let hk = Hkdf::<Sha256>::new(None, ikm);

    let mut okm = Zeroizing::new([0u8; KEY_LEN]);
    hk.expand(info, okm.as_mut_slice())
        .map_err(|e| VaultError::KeyDerivation(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}

/// A wrapper around a 32-byte master key that automatically zeroes
/// its memory when dropped.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    /// Create a new `MasterKey` from raw bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Access the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    pub fn derive_record_key(&self, record_id: u64) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        derive_record_key(&self.bytes, record_id)
    }

    pub fn derive_mac_key(&self) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        derive_mac_key(&self.bytes)
    }

    pub fn derive_signing_seed(&self, record_id: u64) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        derive_signing_seed(&self.bytes, record_id)
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}
