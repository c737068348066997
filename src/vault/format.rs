//! Binary vault container format and integrity verification.
//!
//! A vault file has this layout:
//!
//! ```text
//! [preamble: 52 bytes][slot 0: 96 bytes][slot 1: 96 bytes][frame][frame]...
//! ```
//!
//! - **Preamble**: `SVLT` magic, format version, three reserved bytes,
//!   Argon2 work factors (3 × u32 LE) and the 32-byte salt. Written once
//!   at `init` and never changed.
//! - **Header slots**: two alternating copies of the commit header. A slot
//!   holds `generation`, `frame_count`, `record_count`, `committed_len`
//!   (all u64 LE), the chain MAC of the last committed frame, and an
//!   HMAC-SHA256 over the preamble plus the first 64 slot bytes.
//!   Generation `g` always lives in slot `g % 2`.
//! - **Frames**: `[len: u32 LE][kind: u8][JSON body][chain MAC: 32 bytes]`
//!   where `len` covers kind + body + MAC. Each frame MAC is
//!   `HMAC(prev_chain_mac || kind || body)`, starting from 32 zero bytes,
//!   so frames cannot be dropped, reordered or spliced in.
//!
//! A commit appends frames after `committed_len`, syncs, and only then
//! writes the next generation into the other slot. Bytes beyond the
//! committed length are ignored on open and truncated by the next writer,
//! so a crash at any point leaves either the whole batch visible or none.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::path::Path;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::record::StoredRecord;
use super::signature::SignatureEntry;
use crate::crypto::kdf::{Argon2Params, SALT_LEN};
use crate::errors::{Result, VaultError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic bytes at the start of every vault file.
const MAGIC: &[u8; 4] = b"SVLT";

/// Current binary format version.
pub const CURRENT_VERSION: u8 = 1;

/// Size of the fixed preamble.
pub const PREAMBLE_LEN: usize = 52;

/// Size of one header slot.
pub const SLOT_LEN: usize = 96;

/// Authenticated part of a slot (everything before its HMAC).
const SLOT_BODY_LEN: usize = 64;

/// Offset of the first frame.
pub const DATA_OFFSET: u64 = (PREAMBLE_LEN + 2 * SLOT_LEN) as u64;

/// Size of an HMAC-SHA256 tag.
pub const MAC_LEN: usize = 32;

/// Upper bound for a single frame. Larger lengths are treated as corruption.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Chain value that precedes the first frame.
pub const GENESIS_CHAIN: [u8; MAC_LEN] = [0u8; MAC_LEN];

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// Preamble
// ---------------------------------------------------------------------------

/// Immutable container parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preamble {
    pub version: u8,
    pub kdf: Argon2Params,
    pub salt: [u8; SALT_LEN],
}

impl Preamble {
    pub fn new(kdf: Argon2Params, salt: [u8; SALT_LEN]) -> Self {
        Self {
            version: CURRENT_VERSION,
            kdf,
            salt,
        }
    }

    pub fn encode(&self) -> [u8; PREAMBLE_LEN] {
        let mut buf = [0u8; PREAMBLE_LEN];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = self.version;
        // bytes 5..8 reserved
        buf[8..12].copy_from_slice(&self.kdf.memory_kib.to_le_bytes());
        buf[12..16].copy_from_slice(&self.kdf.iterations.to_le_bytes());
        buf[16..20].copy_from_slice(&self.kdf.parallelism.to_le_bytes());
        buf[20..52].copy_from_slice(&self.salt);
        buf
    }

    /// Parse the preamble at the start of `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < DATA_OFFSET as usize {
            return Err(VaultError::CorruptVault(
                "file too small to be a valid vault".into(),
            ));
        }
        if &data[0..4] != MAGIC {
            return Err(VaultError::CorruptVault("missing SVLT magic bytes".into()));
        }

        let version = data[4];
        if version != CURRENT_VERSION {
            return Err(VaultError::CorruptVault(format!(
                "unsupported version {version}, expected {CURRENT_VERSION}"
            )));
        }

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&data[20..52]);

        let kdf = Argon2Params {
            memory_kib: read_u32(data, 8),
            iterations: read_u32(data, 12),
            parallelism: read_u32(data, 16),
        };
        kdf.validate()
            .map_err(|e| VaultError::CorruptVault(format!("stored KDF parameters: {e}")))?;

        Ok(Self { version, kdf, salt })
    }
}

// ---------------------------------------------------------------------------
// Header slots
// ---------------------------------------------------------------------------

/// One committed state of the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSlot {
    pub generation: u64,
    pub frame_count: u64,
    pub record_count: u64,
    pub committed_len: u64,
    pub chain_mac: [u8; MAC_LEN],
}

/// Result of inspecting one slot position.
#[derive(Debug)]
enum SlotState {
    /// Never written (all zero bytes).
    Empty,
    /// Written, but the HMAC does not verify under this key.
    Unauthenticated,
    Valid(HeaderSlot),
}

impl HeaderSlot {
    /// Header of a freshly initialised, empty vault.
    pub fn initial() -> Self {
        Self {
            generation: 1,
            frame_count: 0,
            record_count: 0,
            committed_len: DATA_OFFSET,
            chain_mac: GENESIS_CHAIN,
        }
    }

    /// File offset of the slot that holds `generation`.
    pub fn offset_for(generation: u64) -> u64 {
        PREAMBLE_LEN as u64 + (generation % 2) * SLOT_LEN as u64
    }

    /// The header that results from committing `batch` on top of `self`.
    pub fn advance(&self, batch: &FrameBatch) -> Self {
        Self {
            generation: self.generation + 1,
            frame_count: self.frame_count + batch.frame_count,
            record_count: self.record_count + batch.record_count,
            committed_len: self.committed_len + batch.bytes.len() as u64,
            chain_mac: batch.chain,
        }
    }

    fn body(&self) -> [u8; SLOT_BODY_LEN] {
        let mut buf = [0u8; SLOT_BODY_LEN];
        buf[0..8].copy_from_slice(&self.generation.to_le_bytes());
        buf[8..16].copy_from_slice(&self.frame_count.to_le_bytes());
        buf[16..24].copy_from_slice(&self.record_count.to_le_bytes());
        buf[24..32].copy_from_slice(&self.committed_len.to_le_bytes());
        buf[32..64].copy_from_slice(&self.chain_mac);
        buf
    }

    /// Serialize and authenticate this slot.
    pub fn seal(&self, mac_key: &[u8], preamble: &[u8]) -> Result<[u8; SLOT_LEN]> {
        let body = self.body();
        let mut mac = new_mac(mac_key)?;
        mac.update(preamble);
        mac.update(&body);
        let tag = mac.finalize().into_bytes();

        let mut buf = [0u8; SLOT_LEN];
        buf[..SLOT_BODY_LEN].copy_from_slice(&body);
        buf[SLOT_BODY_LEN..].copy_from_slice(&tag);
        Ok(buf)
    }

    fn inspect(bytes: &[u8], position: u64, mac_key: &[u8], preamble: &[u8]) -> Result<SlotState> {
        if bytes.iter().all(|b| *b == 0) {
            return Ok(SlotState::Empty);
        }

        let mut mac = new_mac(mac_key)?;
        mac.update(preamble);
        mac.update(&bytes[..SLOT_BODY_LEN]);
        if mac.verify_slice(&bytes[SLOT_BODY_LEN..SLOT_LEN]).is_err() {
            return Ok(SlotState::Unauthenticated);
        }

        let mut chain_mac = [0u8; MAC_LEN];
        chain_mac.copy_from_slice(&bytes[32..64]);
        let slot = HeaderSlot {
            generation: read_u64(bytes, 0),
            frame_count: read_u64(bytes, 8),
            record_count: read_u64(bytes, 16),
            committed_len: read_u64(bytes, 24),
            chain_mac,
        };

        // An authentic slot in the wrong position was copied there.
        if slot.generation % 2 != position {
            return Ok(SlotState::Unauthenticated);
        }
        Ok(SlotState::Valid(slot))
    }
}

/// Pick the newest authentic header slot.
///
/// If slots were written but none authenticates, the passphrase is wrong
/// (a torn write only ever damages one slot at a time).
pub fn select_slot(data: &[u8], mac_key: &[u8]) -> Result<HeaderSlot> {
    let preamble = &data[..PREAMBLE_LEN];
    let mut best: Option<HeaderSlot> = None;
    let mut written = false;

    for position in 0..2u64 {
        let start = PREAMBLE_LEN + position as usize * SLOT_LEN;
        let bytes = &data[start..start + SLOT_LEN];
        match HeaderSlot::inspect(bytes, position, mac_key, preamble)? {
            SlotState::Empty => {}
            SlotState::Unauthenticated => {
                written = true;
                tracing::debug!(position, "header slot did not authenticate");
            }
            SlotState::Valid(slot) => {
                written = true;
                if best.as_ref().is_none_or(|b| slot.generation > b.generation) {
                    best = Some(slot);
                }
            }
        }
    }

    match best {
        Some(slot) => Ok(slot),
        None if written => Err(VaultError::WrongPassphrase),
        None => Err(VaultError::CorruptVault(
            "no header slot has been written".into(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// Discriminant byte of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Record = 1,
    Signature = 2,
}

impl FrameKind {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(FrameKind::Record),
            2 => Some(FrameKind::Signature),
            _ => None,
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone)]
pub enum Frame {
    Record(StoredRecord),
    Signature(SignatureEntry),
}

impl Frame {
    fn kind(&self) -> FrameKind {
        match self {
            Frame::Record(_) => FrameKind::Record,
            Frame::Signature(_) => FrameKind::Signature,
        }
    }

    fn body(&self) -> Result<Vec<u8>> {
        let body = match self {
            Frame::Record(r) => serde_json::to_vec(r),
            Frame::Signature(s) => serde_json::to_vec(s),
        };
        body.map_err(|e| VaultError::Serialization(format!("frame body: {e}")))
    }
}

/// Frames encoded and chained, ready to be committed in one go.
#[derive(Debug)]
pub struct FrameBatch {
    pub bytes: Vec<u8>,
    pub chain: [u8; MAC_LEN],
    pub frame_count: u64,
    pub record_count: u64,
}

impl FrameBatch {
    /// Start a batch that continues the chain after `chain`.
    pub fn new(chain: [u8; MAC_LEN]) -> Self {
        Self {
            bytes: Vec::new(),
            chain,
            frame_count: 0,
            record_count: 0,
        }
    }

    pub fn push(&mut self, mac_key: &[u8], frame: &Frame) -> Result<()> {
        let kind = frame.kind();
        let body = frame.body()?;
        let mac = chain_mac(mac_key, &self.chain, kind as u8, &body)?;

        let len = 1 + body.len() + MAC_LEN;
        if len > MAX_FRAME_LEN {
            return Err(VaultError::InvalidInput(format!(
                "frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit"
            )));
        }

        // len <= MAX_FRAME_LEN, which fits in u32.
        self.bytes.extend_from_slice(&(len as u32).to_le_bytes());
        self.bytes.push(kind as u8);
        self.bytes.extend_from_slice(&body);
        self.bytes.extend_from_slice(&mac);

        self.chain = mac;
        self.frame_count += 1;
        if kind == FrameKind::Record {
            self.record_count += 1;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count == 0
    }
}

fn chain_mac(mac_key: &[u8], prev: &[u8; MAC_LEN], kind: u8, body: &[u8]) -> Result<[u8; MAC_LEN]> {
    let mut mac = new_mac(mac_key)?;
    mac.update(prev);
    mac.update(&[kind]);
    mac.update(body);
    let mut out = [0u8; MAC_LEN];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Decode and authenticate every committed frame described by `slot`.
pub fn decode_frames(data: &[u8], slot: &HeaderSlot, mac_key: &[u8]) -> Result<Vec<Frame>> {
    let end = usize::try_from(slot.committed_len).map_err(|_| {
        VaultError::CorruptVault("committed length exceeds platform address space".into())
    })?;
    if slot.committed_len < DATA_OFFSET {
        return Err(VaultError::CorruptVault(
            "committed length points inside the header".into(),
        ));
    }
    if end > data.len() {
        return Err(VaultError::CorruptVault(format!(
            "committed frames missing: header expects {end} bytes, file has {}",
            data.len()
        )));
    }

    let mut frames = Vec::new();
    let mut chain = GENESIS_CHAIN;
    let mut records = 0u64;
    let mut offset = DATA_OFFSET as usize;

    while offset < end {
        if end - offset < 4 {
            return Err(VaultError::CorruptVault(format!(
                "truncated frame length at offset {offset}"
            )));
        }
        let len = read_u32(data, offset) as usize;
        let start = offset + 4;
        if len < 1 + MAC_LEN || len > MAX_FRAME_LEN || len > end - start {
            return Err(VaultError::CorruptVault(format!(
                "invalid frame length {len} at offset {offset}"
            )));
        }

        let kind_byte = data[start];
        let body = &data[start + 1..start + len - MAC_LEN];
        let stored_mac = &data[start + len - MAC_LEN..start + len];

        let expected = chain_mac(mac_key, &chain, kind_byte, body)?;
        if !bool::from(expected.ct_eq(stored_mac)) {
            tracing::warn!(offset, "frame failed authentication");
            return Err(VaultError::Authentication);
        }

        let frame = match FrameKind::from_byte(kind_byte) {
            Some(FrameKind::Record) => {
                records += 1;
                Frame::Record(parse_body(body, offset)?)
            }
            Some(FrameKind::Signature) => Frame::Signature(parse_body(body, offset)?),
            None => {
                return Err(VaultError::CorruptVault(format!(
                    "unknown frame kind {kind_byte} at offset {offset}"
                )))
            }
        };

        frames.push(frame);
        chain = expected;
        offset = start + len;
    }

    if frames.len() as u64 != slot.frame_count || records != slot.record_count {
        return Err(VaultError::CorruptVault(format!(
            "header expects {} frames / {} records, found {} / {records}",
            slot.frame_count,
            slot.record_count,
            frames.len()
        )));
    }
    if !bool::from(chain.ct_eq(&slot.chain_mac)) {
        return Err(VaultError::Authentication);
    }

    Ok(frames)
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &[u8], offset: usize) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| VaultError::CorruptVault(format!("frame at offset {offset}: {e}")))
}

// ---------------------------------------------------------------------------
// Disk I/O
// ---------------------------------------------------------------------------

/// Read the whole vault file.
pub fn read_container(path: &Path) -> Result<Vec<u8>> {
    match fs::read(path) {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(VaultError::NotFound(path.to_path_buf())),
        Err(e) => Err(e.into()),
    }
}

/// Write a brand-new, empty container **atomically**.
///
/// The file is assembled in a temp file in the same directory and then
/// renamed over the target, so readers never see a half-written vault.
pub fn write_new_container(path: &Path, preamble: &Preamble, mac_key: &[u8]) -> Result<HeaderSlot> {
    let preamble_bytes = preamble.encode();
    let slot = HeaderSlot::initial();
    let sealed = slot.seal(mac_key, &preamble_bytes)?;

    let mut buf = vec![0u8; DATA_OFFSET as usize];
    buf[..PREAMBLE_LEN].copy_from_slice(&preamble_bytes);
    let at = HeaderSlot::offset_for(slot.generation) as usize;
    buf[at..at + SLOT_LEN].copy_from_slice(&sealed);

    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&buf)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms)?;
    }

    Ok(slot)
}

/// Durably append `batch` after `current` and publish the next header.
///
/// Returns the new committed header. Must run under the exclusive lock.
pub fn commit_batch(
    path: &Path,
    preamble: &Preamble,
    current: &HeaderSlot,
    batch: &FrameBatch,
    mac_key: &[u8],
) -> Result<HeaderSlot> {
    let next = current.advance(batch);
    let sealed = next.seal(mac_key, &preamble.encode())?;

    let mut file = OpenOptions::new().read(true).write(true).open(path)?;

    // Drop whatever a crashed writer left past the committed end.
    file.set_len(current.committed_len)?;
    file.seek(SeekFrom::Start(current.committed_len))?;
    file.write_all(&batch.bytes)?;
    file.sync_data()?;

    file.seek(SeekFrom::Start(HeaderSlot::offset_for(next.generation)))?;
    file.write_all(&sealed)?;
    file.sync_data()?;

    tracing::debug!(
        generation = next.generation,
        frames = batch.frame_count,
        committed_len = next.committed_len,
        "committed frame batch"
    );
    Ok(next)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_mac(mac_key: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(mac_key)
        .map_err(|e| VaultError::Encryption(format!("invalid MAC key: {e}")))
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(buf)
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded Vec<u8> fields
// ---------------------------------------------------------------------------

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub(crate) fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let encoded = BASE64.encode(data);
    serializer.serialize_str(&encoded)
}

pub(crate) fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}
