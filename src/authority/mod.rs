//! Authority bindings and their verification against a pinned root.
//!
//! A binding links a subordinate Ed25519 key to a root fingerprint. The
//! subordinate key signs the canonical statement
//!
//! ```text
//! "sealvault-authority-v1" | key_id | public key (32 raw bytes) | root fingerprint (hex)
//! ```
//!
//! with every field length-prefixed (u32 LE). Verification checks the
//! link only: whoever holds the root key is trusted by configuration.
//!
//! Bindings come from outside the vault, either the set compiled into
//! the binary or a JSON file, and are never written by it.

use std::fmt;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::signing::{
    self, fingerprints_equal, push_field, signing_key_from_seed, PUBLIC_KEY_LEN,
};
use crate::errors::{Result, VaultError};

/// Fingerprint of the root the packaged bindings chain to.
pub const DEFAULT_ROOT_FINGERPRINT: &str =
    "b356cff40e28f3e13753b0d56aaca87a5a8f3e06d97b65015f4d20beee11b781";

const STATEMENT_DOMAIN: &[u8] = b"sealvault-authority-v1";

/// Seed material of the demonstration key behind `authority --example`.
const EXAMPLE_SEED_LABEL: &[u8] = b"sealvault-example-binding";

/// Bindings shipped with the binary.
const PACKAGED_BINDINGS: &str = include_str!("bindings.json");

/// A signed statement linking a subordinate key to a root fingerprint.
///
/// Fields are kept as the strings found in the input so a malformed
/// binding can still be loaded, displayed and reported as `Invalid`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityBinding {
    #[serde(default)]
    pub key_id: String,

    /// Base64 Ed25519 public key of the subordinate.
    #[serde(default)]
    pub public_key: String,

    /// Lowercase hex SHA-256 of the root public key.
    #[serde(default)]
    pub root_fingerprint: String,

    /// Base64 Ed25519 signature over the canonical statement.
    #[serde(default)]
    pub signature: String,
}

/// Outcome of checking one binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationResult {
    Valid,
    /// Forged, corrupted or malformed.
    Invalid,
    /// Well-formed and correctly signed, but for another trust domain.
    RootMismatch,
}

impl VerificationResult {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationResult::Valid => "valid",
            VerificationResult::Invalid => "invalid",
            VerificationResult::RootMismatch => "root_mismatch",
        }
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a binding under inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingState {
    #[default]
    Unverified,
    Verified(VerificationResult),
}

/// A binding paired with where it is in its verification lifecycle.
#[derive(Debug, Clone)]
pub struct InspectedBinding {
    pub binding: AuthorityBinding,
    pub state: BindingState,
}

impl InspectedBinding {
    pub fn new(binding: AuthorityBinding) -> Self {
        Self {
            binding,
            state: BindingState::Unverified,
        }
    }

    /// Resolve the state once; later calls return the stored result.
    pub fn resolve(&mut self, verifier: &AuthorityVerifier) -> VerificationResult {
        match self.state {
            BindingState::Verified(result) => result,
            BindingState::Unverified => {
                let result = verifier.verify(&self.binding);
                self.state = BindingState::Verified(result);
                result
            }
        }
    }
}

impl AuthorityBinding {
    /// Create a binding for `signing_key` under `root_fingerprint`.
    ///
    /// `key_id` defaults to the key's own identifier.
    pub fn sign(key_id: Option<&str>, signing_key: &SigningKey, root_fingerprint: &str) -> Self {
        let public_key = signing_key.verifying_key().to_bytes();
        let key_id = key_id
            .map(str::to_string)
            .unwrap_or_else(|| signing::key_id(&public_key));
        let root_fingerprint = root_fingerprint.to_ascii_lowercase();

        let statement = statement(&key_id, &public_key, &root_fingerprint);
        let signature = signing::sign(signing_key, &statement);

        Self {
            key_id,
            public_key: BASE64.encode(public_key),
            root_fingerprint,
            signature: BASE64.encode(signature.to_bytes()),
        }
    }
}

/// Verify one binding against `pinned`. Pure; never fails.
///
/// The signature is checked first. Only a correctly signed binding can
/// be a `RootMismatch`.
pub fn verify_binding(binding: &AuthorityBinding, pinned: &str) -> VerificationResult {
    let Some(public_key) = decode_public_key(&binding.public_key) else {
        return VerificationResult::Invalid;
    };
    let Ok(signature) = BASE64.decode(binding.signature.trim()) else {
        return VerificationResult::Invalid;
    };
    if !is_fingerprint(&binding.root_fingerprint) || binding.key_id.is_empty() {
        return VerificationResult::Invalid;
    }

    let statement = statement(&binding.key_id, &public_key, &binding.root_fingerprint);
    if !signing::verify_bytes(&public_key, &statement, &signature) {
        return VerificationResult::Invalid;
    }

    if fingerprints_equal(&binding.root_fingerprint, &pinned.trim().to_ascii_lowercase()) {
        VerificationResult::Valid
    } else {
        VerificationResult::RootMismatch
    }
}

/// Verifier for one trust domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityVerifier {
    pinned_root: String,
}

impl AuthorityVerifier {
    pub fn new(pinned_root: &str) -> Result<Self> {
        let pinned_root = pinned_root.trim().to_ascii_lowercase();
        if !is_fingerprint(&pinned_root) {
            return Err(VaultError::InvalidInput(format!(
                "'{pinned_root}' is not a SHA-256 fingerprint (64 hex characters)"
            )));
        }
        Ok(Self { pinned_root })
    }

    pub fn pinned_root(&self) -> &str {
        &self.pinned_root
    }

    pub fn verify(&self, binding: &AuthorityBinding) -> VerificationResult {
        verify_binding(binding, &self.pinned_root)
    }

    /// Verify a list of bindings, keeping their order.
    pub fn verify_all<'a>(
        &self,
        bindings: &'a [AuthorityBinding],
    ) -> Vec<(&'a AuthorityBinding, VerificationResult)> {
        bindings.iter().map(|b| (b, self.verify(b))).collect()
    }
}

/// Parse a JSON array of bindings.
pub fn parse_bindings(json: &str) -> Result<Vec<AuthorityBinding>> {
    serde_json::from_str(json)
        .map_err(|e| VaultError::Serialization(format!("authority bindings: {e}")))
}

/// Load bindings from a JSON file.
pub fn load_bindings(path: &Path) -> Result<Vec<AuthorityBinding>> {
    let json = std::fs::read_to_string(path)?;
    parse_bindings(&json)
}

/// The bindings compiled into the binary.
pub fn packaged_bindings() -> Result<Vec<AuthorityBinding>> {
    parse_bindings(PACKAGED_BINDINGS)
}

/// A template binding signed by a fixed demonstration key.
///
/// Handy to see the expected shape. The demo key is public, so this
/// binding proves nothing.
pub fn example_binding(pinned: &str) -> AuthorityBinding {
    let seed: [u8; 32] = Sha256::digest(EXAMPLE_SEED_LABEL).into();
    let key = signing_key_from_seed(&seed);
    AuthorityBinding::sign(None, &key, pinned)
}

fn statement(key_id: &str, public_key: &[u8], root_fingerprint: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(160);
    push_field(&mut buf, STATEMENT_DOMAIN);
    push_field(&mut buf, key_id.as_bytes());
    push_field(&mut buf, public_key);
    push_field(&mut buf, root_fingerprint.as_bytes());
    buf
}

fn decode_public_key(encoded: &str) -> Option<[u8; PUBLIC_KEY_LEN]> {
    let bytes = BASE64.decode(encoded.trim()).ok()?;
    bytes.try_into().ok()
}

/// 64 lowercase hex characters.
fn is_fingerprint(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
