//! Ed25519 signing, verification and key fingerprints.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Length of an Ed25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length of an Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;

/// Number of fingerprint bytes that make up a key identifier.
const KEY_ID_BYTES: usize = 8;

/// Build a signing key from a 32-byte seed.
///
/// `SigningKey` wipes its secret on drop.
pub fn signing_key_from_seed(seed: &[u8; 32]) -> SigningKey {
    SigningKey::from_bytes(seed)
}

pub fn sign(key: &SigningKey, message: &[u8]) -> Signature {
    key.sign(message)
}

/// Verify `signature` over `message`. Uses strict verification, which
/// rejects small-order keys and non-canonical signatures.
pub fn verify(public: &VerifyingKey, message: &[u8], signature: &Signature) -> bool {
    public.verify_strict(message, signature).is_ok()
}

/// Verify from raw byte encodings. Malformed keys or signatures verify
/// as `false`.
pub fn verify_bytes(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(public_key) = <[u8; PUBLIC_KEY_LEN]>::try_from(public_key) else {
        return false;
    };
    let Ok(public) = VerifyingKey::from_bytes(&public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    verify(&public, message, &signature)
}

/// Lowercase hex SHA-256 of a public key.
pub fn fingerprint(public_key: &[u8]) -> String {
    hex::encode(Sha256::digest(public_key))
}

/// Short identifier for a public key: the first 8 fingerprint bytes.
pub fn key_id(public_key: &[u8]) -> String {
    let digest = Sha256::digest(public_key);
    hex::encode(&digest[..KEY_ID_BYTES])
}

/// Append a length-prefixed field (u32 LE length, then bytes) to a
/// canonical statement.
pub fn push_field(buf: &mut Vec<u8>, field: &[u8]) {
    let len = u32::try_from(field.len()).unwrap_or(u32::MAX);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(field);
}

/// Compare two fingerprints in constant time.
pub fn fingerprints_equal(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_bytes() {
        let key = signing_key_from_seed(&[9u8; 32]);
        let public = key.verifying_key().to_bytes();
        let sig = sign(&key, b"hello").to_bytes();

        assert!(verify_bytes(&public, b"hello", &sig));
        assert!(!verify_bytes(&public, b"hullo", &sig));
        assert!(!verify_bytes(&public[..31], b"hello", &sig));
        assert!(!verify_bytes(&public, b"hello", &sig[..63]));
    }

    #[test]
    fn key_id_is_fingerprint_prefix() {
        let public = signing_key_from_seed(&[1u8; 32]).verifying_key().to_bytes();
        let fp = fingerprint(&public);
        assert_eq!(fp.len(), 64);
        assert!(fp.starts_with(&key_id(&public)));
        assert_eq!(key_id(&public).len(), 16);
    }

    #[test]
    fn fields_are_length_prefixed() {
        let mut buf = Vec::new();
        push_field(&mut buf, b"ab");
        push_field(&mut buf, b"");
        assert_eq!(buf, vec![2, 0, 0, 0, b'a', b'b', 0, 0, 0, 0]);
    }

    #[test]
    fn fingerprint_comparison() {
        assert!(fingerprints_equal("abcd", "abcd"));
        assert!(!fingerprints_equal("abcd", "abce"));
        assert!(!fingerprints_equal("abcd", "abc"));
    }
}
