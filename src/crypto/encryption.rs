//! AES-256-GCM authenticated encryption with a detached tag.
//!
//! Ciphertext, nonce and tag travel together as a [`Sealed`] value so a
//! ciphertext can never be stored or opened without its pairing.
//!
//! Nonces come from one of two sources:
//! - [`encrypt`] draws 12 fresh random bytes per call.
//! - [`encrypt_with`] draws from a [`NonceSequence`]: a random 4-byte
//!   prefix chosen once per sequence followed by a 64-bit counter, so a
//!   sequence can never hand out the same nonce twice.

use aes_gcm::aead::{AeadInPlace, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce, Tag};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::errors::{Result, VaultError};

/// Size of the AES-256-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Size of the AES-256-GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Length of the random per-sequence nonce prefix.
const PREFIX_LEN: usize = NONCE_LEN - 8;

/// Output of an encryption: the three pieces needed to decrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
}

/// Monotonic nonce source owned by a single vault handle.
#[derive(Debug)]
pub struct NonceSequence {
    prefix: [u8; PREFIX_LEN],
    counter: u64,
}

impl NonceSequence {
    /// Start a new sequence with a random prefix.
    pub fn new() -> Self {
        let mut prefix = [0u8; PREFIX_LEN];
        rand::rng().fill_bytes(&mut prefix);
        Self { prefix, counter: 0 }
    }

    /// Hand out the next nonce. Fails once the counter is exhausted.
    pub fn next_nonce(&mut self) -> Result<[u8; NONCE_LEN]> {
        let value = self.counter;
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or_else(|| VaultError::Encryption("nonce sequence exhausted".into()))?;

        let mut nonce = [0u8; NONCE_LEN];
        nonce[..PREFIX_LEN].copy_from_slice(&self.prefix);
        nonce[PREFIX_LEN..].copy_from_slice(&value.to_be_bytes());
        Ok(nonce)
    }
}

impl Default for NonceSequence {
    fn default() -> Self {
        Self::new()
    }
}

/// Encrypt `plaintext` under a 32-byte `key` with a fresh random nonce.
///
/// `aad` is authenticated but not encrypted.
pub fn encrypt(key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Sealed> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&nonce);
    seal(key, nonce_bytes, plaintext, aad)
}

/// Encrypt `plaintext` using the next nonce from `nonces`.
pub fn encrypt_with(
    key: &[u8],
    nonces: &mut NonceSequence,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Sealed> {
    let nonce = nonces.next_nonce()?;
    seal(key, nonce, plaintext, aad)
}

fn seal(key: &[u8], nonce: [u8; NONCE_LEN], plaintext: &[u8], aad: &[u8]) -> Result<Sealed> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| VaultError::Encryption(format!("invalid key length: {e}")))?;

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), aad, &mut buffer)
        .map_err(|e| VaultError::Encryption(format!("encryption error: {e}")))?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);

    Ok(Sealed {
        ciphertext: buffer,
        nonce,
        tag: tag_bytes,
    })
}

/// Decrypt a [`Sealed`] value.
///
/// Returns [`VaultError::Authentication`] if the tag does not verify;
/// nothing of the candidate plaintext is returned in that case.
pub fn decrypt(key: &[u8], sealed: &Sealed, aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| VaultError::Authentication)?;

    // The buffer is wiped on drop, including on the failure path.
    let mut buffer = Zeroizing::new(sealed.ciphertext.clone());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&sealed.nonce),
            aad,
            &mut buffer,
            Tag::from_slice(&sealed.tag),
        )
        .map_err(|_| VaultError::Authentication)?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_never_repeats() {
        let mut seq = NonceSequence::new();
        let a = seq.next_nonce().unwrap();
        let b = seq.next_nonce().unwrap();
        assert_ne!(a, b);
        assert_eq!(a[..PREFIX_LEN], b[..PREFIX_LEN]);
    }

    #[test]
    fn sequence_reports_exhaustion() {
        let mut seq = NonceSequence {
            prefix: [0; PREFIX_LEN],
            counter: u64::MAX,
        };
        assert!(matches!(seq.next_nonce(), Err(VaultError::Encryption(_))));
    }

    #[test]
    fn aad_is_authenticated() {
        let key = [3u8; 32];
        let sealed = encrypt(&key, b"payload", b"record:1").unwrap();
        assert!(matches!(
            decrypt(&key, &sealed, b"record:2"),
            Err(VaultError::Authentication)
        ));
    }
}
