//! Passphrase-based key derivation using Argon2id.
//!
//! Argon2id is a memory-hard KDF that protects against brute-force and
//! GPU-based attacks.  The work factors used at `init` are written into
//! the vault preamble so re-opening always derives the same key.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, VaultError};

/// Length of the salt in bytes (256 bits).
pub const SALT_LEN: usize = 32;

/// Length of the derived key in bytes (256 bits, for AES-256).
pub const KEY_LEN: usize = 32;

/// Minimum safe memory cost in KiB (8 MB).
const MIN_MEMORY_KIB: u32 = 8_192;

/// Largest memory cost accepted, in KiB (4 GiB).
pub const MAX_MEMORY_KIB: u32 = 4 * 1024 * 1024;

/// Largest iteration count accepted.
pub const MAX_ITERATIONS: u32 = 64;

/// Largest number of lanes accepted.
pub const MAX_PARALLELISM: u32 = 64;

/// Argon2id work factors.
///
/// These map 1:1 to the fields in `Settings` so the CLI can pass
/// whatever the user configured in `.sealvault.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2Params {
    /// Memory cost in KiB (default: 65 536 = 64 MB).
    pub memory_kib: u32,
    /// Number of iterations (default: 3).
    pub iterations: u32,
    /// Parallelism lanes (default: 4).
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: 65_536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl Argon2Params {
    /// Smallest parameters accepted by the KDF. Only suitable for tests.
    pub const fn minimum() -> Self {
        Self {
            memory_kib: MIN_MEMORY_KIB,
            iterations: 1,
            parallelism: 1,
        }
    }

    /// Check the work factors against the accepted range.
    ///
    /// Params read from a vault preamble are unauthenticated until the
    /// KDF has run, so they must pass this before Argon2 sees them.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(MIN_MEMORY_KIB..=MAX_MEMORY_KIB).contains(&self.memory_kib) {
            return Err(format!(
                "Argon2 memory_kib must be between {MIN_MEMORY_KIB} and {MAX_MEMORY_KIB} (got {})",
                self.memory_kib
            ));
        }
        if !(1..=MAX_ITERATIONS).contains(&self.iterations) {
            return Err(format!(
                "Argon2 iterations must be between 1 and {MAX_ITERATIONS} (got {})",
                self.iterations
            ));
        }
        if !(1..=MAX_PARALLELISM).contains(&self.parallelism) {
            return Err(format!(
                "Argon2 parallelism must be between 1 and {MAX_PARALLELISM} (got {})",
                self.parallelism
            ));
        }
        Ok(())
    }
}

/// Derive a 32-byte master key from a passphrase and salt using Argon2id.
///
/// Uses the default Argon2id parameters (64 MB, 3 iterations, 4 lanes).
pub fn derive_master_key(passphrase: &[u8], salt: &[u8]) -> Result<[u8; KEY_LEN]> {
    derive_master_key_with_params(passphrase, salt, &Argon2Params::default())
}

/// Derive a 32-byte master key with explicit Argon2id parameters.
///
/// The same passphrase + salt + params will always produce the same key.
/// Rejects empty passphrases, salts that are not exactly `SALT_LEN`
/// bytes, and parameters outside [`Argon2Params::validate`]'s range.
pub fn derive_master_key_with_params(
    passphrase: &[u8],
    salt: &[u8],
    argon2_params: &Argon2Params,
) -> Result<[u8; KEY_LEN]> {
    if passphrase.is_empty() {
        return Err(VaultError::KeyDerivation(
            "passphrase must not be empty".into(),
        ));
    }
    if salt.len() != SALT_LEN {
        return Err(VaultError::KeyDerivation(format!(
            "salt must be {SALT_LEN} bytes (got {})",
            salt.len()
        )));
    }
    argon2_params.validate().map_err(VaultError::KeyDerivation)?;

    let params = Params::new(
        argon2_params.memory_kib,
        argon2_params.iterations,
        argon2_params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| VaultError::KeyDerivation(format!("invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(passphrase, salt, &mut key)
        .map_err(|e| VaultError::KeyDerivation(format!("Argon2id hashing failed: {e}")))?;

    Ok(key)
}

/// Generate a cryptographically random 32-byte salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_passphrase_is_rejected() {
        let salt = [7u8; SALT_LEN];
        let err = derive_master_key_with_params(b"", &salt, &Argon2Params::minimum());
        assert!(matches!(err, Err(VaultError::KeyDerivation(_))));
    }

    #[test]
    fn short_salt_is_rejected() {
        let err = derive_master_key_with_params(b"pw", &[1u8; 16], &Argon2Params::minimum());
        assert!(matches!(err, Err(VaultError::KeyDerivation(_))));
    }

    #[test]
    fn weak_memory_cost_is_rejected() {
        let params = Argon2Params {
            memory_kib: 1024,
            ..Argon2Params::minimum()
        };
        let err = derive_master_key_with_params(b"pw", &[1u8; SALT_LEN], &params);
        assert!(matches!(err, Err(VaultError::KeyDerivation(_))));
    }

    #[test]
    fn oversized_work_factors_are_rejected() {
        let floor = Argon2Params::minimum();
        let too_slow = Argon2Params {
            iterations: MAX_ITERATIONS + 1,
            ..floor
        };
        let too_big = Argon2Params {
            memory_kib: MAX_MEMORY_KIB + 1,
            ..floor
        };
        let too_wide = Argon2Params {
            parallelism: MAX_PARALLELISM + 1,
            ..floor
        };
        for params in [too_slow, too_big, too_wide] {
            assert!(params.validate().is_err());
            let err = derive_master_key_with_params(b"pw", &[1u8; SALT_LEN], &params);
            assert!(matches!(err, Err(VaultError::KeyDerivation(_))));
        }
    }

    #[test]
    fn default_params_are_in_range() {
        assert!(Argon2Params::default().validate().is_ok());
        assert!(Argon2Params::minimum().validate().is_ok());
    }

    #[test]
    fn salts_are_random() {
        assert_ne!(generate_salt(), generate_salt());
    }
}
