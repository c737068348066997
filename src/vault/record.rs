//! Record types stored inside a vault.
//!
//! A [`StoredRecord`] is the frame body written to disk: plaintext
//! metadata (label, format, tags, policy) next to the encrypted payload.
//! The binary fields use the base64 serde helpers from `format.rs` so
//! they serialize as strings in JSON rather than raw byte arrays.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::format::{base64_decode, base64_encode};
use crate::crypto::encryption::{Sealed, NONCE_LEN, TAG_LEN};
use crate::errors::{Result, VaultError};

/// Maximum label length in characters.
const MAX_LABEL_LEN: usize = 256;

/// Maximum tag length in characters.
const MAX_TAG_LEN: usize = 64;

/// Immutable record identifier. Allocated monotonically, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl RecordId {
    pub fn get(self) -> u64 {
        self.0
    }

    pub(crate) fn next(self) -> RecordId {
        RecordId(self.0 + 1)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .ok()
            .filter(|id| *id > 0)
            .map(RecordId)
            .ok_or_else(|| VaultError::InvalidInput(format!("'{s}' is not a record id")))
    }
}

/// Declared encoding of a record's payload at the import boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// Hex text, optionally `0x`-prefixed. Stored decoded.
    Hex,
    /// Bytes taken verbatim.
    Raw,
    /// Standard base64 text. Stored decoded.
    Base64,
}

impl RecordFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordFormat::Hex => "hex",
            RecordFormat::Raw => "raw",
            RecordFormat::Base64 => "base64",
        }
    }

    /// Validate and decode caller input into the payload bytes to seal.
    pub fn decode_input(self, input: &[u8]) -> Result<Vec<u8>> {
        let payload = match self {
            RecordFormat::Raw => input.to_vec(),
            RecordFormat::Hex => {
                let text = text_input(input, self)?;
                let digits = text
                    .strip_prefix("0x")
                    .or_else(|| text.strip_prefix("0X"))
                    .unwrap_or(text);
                hex::decode(digits)
                    .map_err(|e| VaultError::InvalidFormat(format!("invalid hex payload: {e}")))?
            }
            RecordFormat::Base64 => {
                let text = text_input(input, self)?;
                BASE64
                    .decode(text)
                    .map_err(|e| VaultError::InvalidFormat(format!("invalid base64 payload: {e}")))?
            }
        };

        if payload.is_empty() {
            return Err(VaultError::InvalidFormat("payload must not be empty".into()));
        }
        Ok(payload)
    }

    /// Render decrypted payload bytes back into the declared encoding.
    pub fn encode_output(self, payload: &[u8]) -> Vec<u8> {
        match self {
            RecordFormat::Raw => payload.to_vec(),
            RecordFormat::Hex => hex::encode(payload).into_bytes(),
            RecordFormat::Base64 => BASE64.encode(payload).into_bytes(),
        }
    }
}

fn text_input(input: &[u8], format: RecordFormat) -> Result<&str> {
    std::str::from_utf8(input)
        .map(str::trim)
        .map_err(|_| VaultError::InvalidFormat(format!("{} payload must be text", format.as_str())))
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordFormat {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hex" => Ok(RecordFormat::Hex),
            "raw" => Ok(RecordFormat::Raw),
            "base64" | "b64" => Ok(RecordFormat::Base64),
            other => Err(VaultError::InvalidFormat(format!(
                "unknown format '{other}' (expected hex, raw or base64)"
            ))),
        }
    }
}

/// Signing limits fixed when a record is imported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignPolicy {
    /// Maximum number of signatures over the record's lifetime (0 = unlimited).
    #[serde(default)]
    pub max_sign_uses: u32,

    /// Minimum seconds between two signing batches (0 = no cooldown).
    #[serde(default)]
    pub cooldown_secs: u64,

    /// Seconds after import during which the record may sign (0 = no expiry).
    #[serde(default)]
    pub max_age_secs: u64,
}

impl SignPolicy {
    /// Instant after which a record created at `created_at` refuses to
    /// sign. `None` when the policy sets no age limit.
    pub fn expires_at(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.max_age_secs == 0 {
            return None;
        }
        i64::try_from(self.max_age_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|age| created_at.checked_add_signed(age))
    }
}

/// A single encrypted record as stored in a vault frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,

    pub label: String,

    pub format: RecordFormat,

    pub tags: BTreeSet<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub policy: SignPolicy,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub ciphertext: Vec<u8>,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub nonce: Vec<u8>,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub tag: Vec<u8>,
}

impl StoredRecord {
    /// Reassemble the sealed payload. A nonce or tag of the wrong
    /// length means the frame was altered.
    pub fn sealed(&self) -> Result<Sealed> {
        let nonce: [u8; NONCE_LEN] = self
            .nonce
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::Authentication)?;
        let tag: [u8; TAG_LEN] = self
            .tag
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::Authentication)?;
        Ok(Sealed {
            ciphertext: self.ciphertext.clone(),
            nonce,
            tag,
        })
    }

    /// Associated data binding a ciphertext to its record id.
    pub fn aad(id: RecordId) -> Vec<u8> {
        format!("sealvault-record:{id}").into_bytes()
    }
}

/// Metadata about a record (no ciphertext).
///
/// Returned by search and export so callers can display records
/// without touching any encrypted material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordMetadata {
    pub id: RecordId,
    pub label: String,
    pub format: RecordFormat,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub use_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub policy: SignPolicy,
}

/// Validate a record label.
pub fn validate_label(label: &str) -> Result<()> {
    if label.trim().is_empty() {
        return Err(VaultError::InvalidFormat("label cannot be empty".into()));
    }
    if label.chars().count() > MAX_LABEL_LEN {
        return Err(VaultError::InvalidFormat(format!(
            "label cannot exceed {MAX_LABEL_LEN} characters"
        )));
    }
    if label.chars().any(char::is_control) {
        return Err(VaultError::InvalidFormat(
            "label cannot contain control characters".into(),
        ));
    }
    Ok(())
}

/// Trim, validate and deduplicate a set of tags.
///
/// Tags are matched exactly, so case is preserved. Allowed: any
/// non-whitespace, non-control character except `,`.
pub fn normalize_tags<I, S>(tags: I) -> Result<BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut set = BTreeSet::new();
    for raw in tags {
        let tag = raw.as_ref().trim();
        if tag.is_empty() {
            return Err(VaultError::InvalidFormat("tags cannot be empty".into()));
        }
        if tag.chars().count() > MAX_TAG_LEN {
            return Err(VaultError::InvalidFormat(format!(
                "tag '{tag}' exceeds {MAX_TAG_LEN} characters"
            )));
        }
        if tag
            .chars()
            .any(|c| c == ',' || c.is_whitespace() || c.is_control())
        {
            return Err(VaultError::InvalidFormat(format!(
                "tag '{tag}' contains invalid characters"
            )));
        }
        set.insert(tag.to_string());
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_input_accepts_prefix_and_whitespace() {
        let bytes = RecordFormat::Hex.decode_input(b"  0xdeadBEEF\n").unwrap();
        assert_eq!(bytes, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn hex_input_rejects_odd_length() {
        assert!(matches!(
            RecordFormat::Hex.decode_input(b"abc"),
            Err(VaultError::InvalidFormat(_))
        ));
    }

    #[test]
    fn base64_renders_back() {
        let bytes = RecordFormat::Base64.decode_input(b"aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(RecordFormat::Base64.encode_output(&bytes), b"aGVsbG8=");
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert!(RecordFormat::Raw.decode_input(b"").is_err());
        assert!(RecordFormat::Hex.decode_input(b"0x").is_err());
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("HEX".parse::<RecordFormat>().unwrap(), RecordFormat::Hex);
        assert!("wif".parse::<RecordFormat>().is_err());
    }

    #[test]
    fn tags_are_deduplicated_and_trimmed() {
        let tags = normalize_tags([" lab", "lab", "test "]).unwrap();
        assert_eq!(tags.into_iter().collect::<Vec<_>>(), vec!["lab", "test"]);
    }

    #[test]
    fn tags_with_separators_are_rejected() {
        assert!(normalize_tags(["a,b"]).is_err());
        assert!(normalize_tags(["a b"]).is_err());
        assert!(normalize_tags([""]).is_err());
    }

    #[test]
    fn labels_are_validated() {
        assert!(validate_label("alpha-one").is_ok());
        assert!(validate_label("   ").is_err());
        assert!(validate_label("bad\nlabel").is_err());
        assert!(validate_label(&"x".repeat(257)).is_err());
    }

    #[test]
    fn label_limit_counts_characters() {
        // 256 two-byte characters: 512 bytes, still within the limit.
        assert!(validate_label(&"é".repeat(256)).is_ok());
        assert!(validate_label(&"é".repeat(257)).is_err());
        assert!(normalize_tags(["ü".repeat(64)]).is_ok());
        assert!(normalize_tags(["ü".repeat(65)]).is_err());
    }

    #[test]
    fn expiry_follows_max_age() {
        let created = Utc::now();
        assert_eq!(SignPolicy::default().expires_at(created), None);

        let policy = SignPolicy {
            max_age_secs: 90,
            ..SignPolicy::default()
        };
        assert_eq!(
            policy.expires_at(created),
            Some(created + TimeDelta::seconds(90))
        );

        let unbounded = SignPolicy {
            max_age_secs: u64::MAX,
            ..SignPolicy::default()
        };
        assert_eq!(unbounded.expires_at(created), None);
    }

    #[test]
    fn record_ids_parse() {
        assert_eq!("7".parse::<RecordId>().unwrap(), RecordId(7));
        assert!("0".parse::<RecordId>().is_err());
        assert!("abc".parse::<RecordId>().is_err());
    }
}
