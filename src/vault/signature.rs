//! Signature entries produced by `Vault::sign`.
//!
//! Each entry signs its own canonical statement instead of the bare
//! message:
//!
//! ```text
//! "sealvault-signature-v1" | record id | counter | nonce | signed_at (µs) | SHA-256(message)
//! ```
//!
//! (every field length-prefixed). The counter and the random nonce make
//! every entry of a repeat batch a distinct signing event, even though
//! Ed25519 itself is deterministic.

use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::format::{base64_decode, base64_encode};
use super::record::RecordId;
use crate::crypto::signing::{self, push_field};

/// Length of the per-entry random nonce.
pub const SIGNATURE_NONCE_LEN: usize = 16;

const STATEMENT_DOMAIN: &[u8] = b"sealvault-signature-v1";

/// One recorded signing event. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub record_id: RecordId,

    /// Identifier of the record's signing key (see `signing::key_id`).
    pub key_id: String,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub public_key: Vec<u8>,

    /// Position of this entry among the record's signatures (0-based).
    pub counter: u64,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub nonce: Vec<u8>,

    /// Lowercase hex SHA-256 of the signed message.
    pub message_digest: String,

    pub signed_at: DateTime<Utc>,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub signature: Vec<u8>,
}

impl SignatureEntry {
    /// Sign `message` as the `counter`-th event for `record_id`.
    pub(crate) fn create(
        key: &SigningKey,
        record_id: RecordId,
        counter: u64,
        signed_at: DateTime<Utc>,
        message: &[u8],
    ) -> Self {
        let mut nonce = vec![0u8; SIGNATURE_NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let digest: [u8; 32] = Sha256::digest(message).into();
        let statement = statement(record_id, counter, &nonce, signed_at, &digest);
        let public_key = key.verifying_key().to_bytes();

        Self {
            record_id,
            key_id: signing::key_id(&public_key),
            public_key: public_key.to_vec(),
            counter,
            nonce,
            message_digest: hex::encode(digest),
            signed_at,
            signature: signing::sign(key, &statement).to_bytes().to_vec(),
        }
    }

    /// Verify this entry against the message it claims to sign.
    pub fn verify(&self, message: &[u8]) -> bool {
        let digest = hex::encode(Sha256::digest(message));
        signing::fingerprints_equal(&digest, &self.message_digest) && self.verify_statement()
    }

    /// Verify the signature over the stored digest, without the message.
    pub fn verify_statement(&self) -> bool {
        let Ok(digest) = hex::decode(&self.message_digest) else {
            return false;
        };
        if signing::key_id(&self.public_key) != self.key_id {
            return false;
        }
        let statement = statement(
            self.record_id,
            self.counter,
            &self.nonce,
            self.signed_at,
            &digest,
        );
        signing::verify_bytes(&self.public_key, &statement, &self.signature)
    }
}

fn statement(
    record_id: RecordId,
    counter: u64,
    nonce: &[u8],
    signed_at: DateTime<Utc>,
    digest: &[u8],
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128);
    push_field(&mut buf, STATEMENT_DOMAIN);
    push_field(&mut buf, &record_id.get().to_le_bytes());
    push_field(&mut buf, &counter.to_le_bytes());
    push_field(&mut buf, nonce);
    push_field(&mut buf, &signed_at.timestamp_micros().to_le_bytes());
    push_field(&mut buf, digest);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signing::signing_key_from_seed;

    fn entry(counter: u64) -> SignatureEntry {
        let key = signing_key_from_seed(&[5u8; 32]);
        SignatureEntry::create(&key, RecordId(1), counter, Utc::now(), b"message")
    }

    #[test]
    fn entry_verifies_against_its_message() {
        let e = entry(0);
        assert!(e.verify(b"message"));
        assert!(!e.verify(b"other"));
    }

    #[test]
    fn changing_the_counter_breaks_the_signature() {
        let mut e = entry(0);
        e.counter = 1;
        assert!(!e.verify_statement());
    }

    #[test]
    fn entries_over_the_same_message_differ() {
        let a = entry(0);
        let b = entry(1);
        assert_ne!(a.signature, b.signature);
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn json_roundtrip_keeps_entry_verifiable() {
        let e = entry(3);
        let json = serde_json::to_string(&e).unwrap();
        let back: SignatureEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
        assert!(back.verify(b"message"));
    }
}
