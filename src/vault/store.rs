//! High-level vault operations used by CLI commands.
//!
//! `Vault` wraps the container format, the lock and the crypto layer so
//! the rest of the application works with simple calls like
//! `vault.append_record("deploy-key", b"0xdead", RecordFormat::Hex, ["prod"])`.
//!
//! The committed state is loaded once at `open`. Writers take the
//! exclusive lock, refresh from disk if another handle committed in the
//! meantime, append their frames, and only then update memory.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::encryption::{decrypt, encrypt_with, NonceSequence};
use crate::crypto::kdf::{derive_master_key_with_params, generate_salt, Argon2Params, KEY_LEN};
use crate::crypto::keys::MasterKey;
use crate::crypto::signing::signing_key_from_seed;
use crate::errors::{Result, VaultError};

use super::format::{self, Frame, FrameBatch, HeaderSlot, Preamble};
use super::index::SearchIndex;
use super::lock::{LockMode, VaultLock};
use super::record::{
    normalize_tags, validate_label, RecordFormat, RecordId, RecordMetadata, SignPolicy,
    StoredRecord,
};
use super::signature::SignatureEntry;

/// Default time to wait for the vault lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for creating and opening a vault.
#[derive(Debug, Clone)]
pub struct VaultOptions {
    /// Argon2id work factors used by `init`. `open` always uses the
    /// parameters stored in the vault.
    pub kdf: Argon2Params,

    /// How long to wait for the lock before failing with `VaultBusy`.
    pub lock_timeout: Duration,

    /// Let `init` replace an existing vault.
    pub overwrite: bool,
}

impl Default for VaultOptions {
    fn default() -> Self {
        Self {
            kdf: Argon2Params::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            overwrite: false,
        }
    }
}

/// Everything decoded from the committed frames.
#[derive(Debug)]
struct Contents {
    header: HeaderSlot,
    records: BTreeMap<RecordId, StoredRecord>,
    signatures: HashMap<RecordId, Vec<SignatureEntry>>,
    index: SearchIndex,
    next_id: RecordId,
}

impl Contents {
    fn empty(header: HeaderSlot) -> Self {
        Self {
            header,
            records: BTreeMap::new(),
            signatures: HashMap::new(),
            index: SearchIndex::new(),
            next_id: RecordId(1),
        }
    }

    /// Authenticate and decode a full container image.
    fn load(data: &[u8], mac_key: &[u8]) -> Result<Self> {
        let header = format::select_slot(data, mac_key)?;
        let frames = format::decode_frames(data, &header, mac_key)?;

        let trailing = (data.len() as u64).saturating_sub(header.committed_len);
        if trailing > 0 {
            tracing::warn!(
                bytes = trailing,
                "ignoring uncommitted bytes after the last commit"
            );
        }

        let mut contents = Self::empty(header);
        for frame in frames {
            contents.apply(frame)?;
        }
        contents.index = SearchIndex::rebuild(contents.records.values());
        Ok(contents)
    }

    /// Fold one frame into the state, checking it continues the sequence.
    fn apply(&mut self, frame: Frame) -> Result<()> {
        match frame {
            Frame::Record(record) => {
                if record.id != self.next_id {
                    return Err(VaultError::CorruptVault(format!(
                        "record id {} out of sequence (expected {})",
                        record.id, self.next_id
                    )));
                }
                self.next_id = record.id.next();
                self.records.insert(record.id, record);
            }
            Frame::Signature(entry) => {
                if !self.records.contains_key(&entry.record_id) {
                    return Err(VaultError::CorruptVault(format!(
                        "signature references unknown record {}",
                        entry.record_id
                    )));
                }
                let list = self.signatures.entry(entry.record_id).or_default();
                if entry.counter != list.len() as u64 {
                    return Err(VaultError::CorruptVault(format!(
                        "signature counter {} out of sequence for record {}",
                        entry.counter, entry.record_id
                    )));
                }
                list.push(entry);
            }
        }
        Ok(())
    }
}

/// The main vault handle. Create one with `Vault::init` or `Vault::open`.
pub struct Vault {
    /// Path to the `.vault` file on disk.
    path: PathBuf,

    /// Immutable container parameters (version, KDF params, salt).
    preamble: Preamble,

    contents: Contents,

    /// The derived master key (zeroized on drop).
    master_key: MasterKey,

    /// Key for header and frame MACs (zeroized on drop).
    mac_key: Zeroizing<[u8; KEY_LEN]>,

    nonces: NonceSequence,

    lock_timeout: Duration,
}

impl Vault {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create a brand-new, empty vault at `path`.
    ///
    /// Generates a random salt, derives the master key from the
    /// passphrase and writes an authenticated empty header. Parent
    /// directories are created as needed.
    pub fn init(path: &Path, passphrase: &[u8], options: &VaultOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let _lock = VaultLock::acquire(path, LockMode::Exclusive, options.lock_timeout)?;

        if path.exists() && !options.overwrite {
            return Err(VaultError::AlreadyExists(path.to_path_buf()));
        }

        let salt = generate_salt();
        let master_key = master_key_from(passphrase, &salt, &options.kdf)?;
        let mac_key = master_key.derive_mac_key()?;

        let preamble = Preamble::new(options.kdf, salt);
        let header = format::write_new_container(path, &preamble, mac_key.as_slice())?;

        tracing::info!(
            path = %path.display(),
            memory_kib = options.kdf.memory_kib,
            iterations = options.kdf.iterations,
            parallelism = options.kdf.parallelism,
            "vault initialised"
        );

        Ok(Self {
            path: path.to_path_buf(),
            preamble,
            contents: Contents::empty(header),
            master_key,
            mac_key,
            nonces: NonceSequence::new(),
            lock_timeout: options.lock_timeout,
        })
    }

    /// Open an existing vault, verifying its header and every frame.
    ///
    /// Derives the master key with the Argon2 parameters stored in the
    /// preamble, then authenticates the newest header slot and the frame
    /// chain it commits to.
    pub fn open(path: &Path, passphrase: &[u8], options: &VaultOptions) -> Result<Self> {
        if !path.exists() {
            return Err(VaultError::NotFound(path.to_path_buf()));
        }

        let _lock = VaultLock::acquire(path, LockMode::Shared, options.lock_timeout)?;

        let data = format::read_container(path)?;
        let preamble = Preamble::decode(&data)?;
        let master_key = master_key_from(passphrase, &preamble.salt, &preamble.kdf)?;
        let mac_key = master_key.derive_mac_key()?;

        let contents = Contents::load(&data, mac_key.as_slice())?;

        tracing::debug!(
            path = %path.display(),
            generation = contents.header.generation,
            records = contents.records.len(),
            "vault opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            preamble,
            contents,
            master_key,
            mac_key,
            nonces: NonceSequence::new(),
            lock_timeout: options.lock_timeout,
        })
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    /// Encrypt and append a record with no signing limits.
    ///
    /// `payload` is given in the declared `format` and stored decoded;
    /// see [`RecordFormat::decode_input`].
    pub fn append_record<I, S>(
        &mut self,
        label: &str,
        payload: &[u8],
        format: RecordFormat,
        tags: I,
    ) -> Result<RecordId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.append_record_with_policy(label, payload, format, tags, SignPolicy::default())
    }

    /// Encrypt and append a record carrying a signing policy.
    pub fn append_record_with_policy<I, S>(
        &mut self,
        label: &str,
        payload: &[u8],
        format: RecordFormat,
        tags: I,
        policy: SignPolicy,
    ) -> Result<RecordId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        validate_label(label)?;
        let tags = normalize_tags(tags)?;
        let plaintext = Zeroizing::new(format.decode_input(payload)?);

        let _lock = self.lock(LockMode::Exclusive)?;
        self.refresh_locked()?;

        let id = self.contents.next_id;
        let record_key = self.master_key.derive_record_key(id.get())?;
        let sealed = encrypt_with(
            record_key.as_slice(),
            &mut self.nonces,
            &plaintext,
            &StoredRecord::aad(id),
        )?;

        let record = StoredRecord {
            id,
            label: label.to_string(),
            format,
            tags,
            created_at: Utc::now(),
            policy,
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce.to_vec(),
            tag: sealed.tag.to_vec(),
        };

        self.commit(vec![Frame::Record(record)])?;

        tracing::info!(record = %id, %format, "record appended");
        Ok(id)
    }

    /// Decrypt a record's payload. The buffer is wiped when dropped.
    pub fn read_record(&self, id: RecordId) -> Result<Zeroizing<Vec<u8>>> {
        let record = self.record(id)?;
        self.decrypt_record(record)
    }

    /// Ids of records matching `query` and carrying every tag in `tags`.
    pub fn find(&self, query: &str, tags: &BTreeSet<String>) -> Vec<RecordId> {
        self.contents.index.find(query, tags)
    }

    /// Like [`Vault::find`], returning metadata instead of ids.
    pub fn find_records(&self, query: &str, tags: &BTreeSet<String>) -> Vec<RecordMetadata> {
        self.find(query, tags)
            .into_iter()
            .filter_map(|id| self.contents.records.get(&id))
            .map(|record| self.metadata_for(record))
            .collect()
    }

    pub fn record_metadata(&self, id: RecordId) -> Result<RecordMetadata> {
        self.record(id).map(|record| self.metadata_for(record))
    }

    /// Metadata for every record, in id order. Contains no ciphertext.
    pub fn export_metadata(&self) -> Vec<RecordMetadata> {
        self.contents
            .records
            .values()
            .map(|record| self.metadata_for(record))
            .collect()
    }

    // ------------------------------------------------------------------
    // Signing
    // ------------------------------------------------------------------

    /// Sign a record `repeat` times and persist the entries in one commit.
    ///
    /// The message defaults to the record's decrypted payload. Each entry
    /// gets its own counter and nonce. The record's policy is checked
    /// against the whole batch before anything is written.
    pub fn sign(
        &mut self,
        id: RecordId,
        message: Option<&[u8]>,
        repeat: u32,
    ) -> Result<Vec<SignatureEntry>> {
        if repeat == 0 {
            return Err(VaultError::InvalidInput(
                "repeat count must be at least 1".into(),
            ));
        }

        let _lock = self.lock(LockMode::Exclusive)?;
        self.refresh_locked()?;

        let record = self.record(id)?;
        let existing = self.signatures_for(id)?;
        let use_count = existing.len() as u64;
        let now = Utc::now();
        check_policy(
            id,
            &record.policy,
            record.created_at,
            use_count,
            existing.last().map(|e| e.signed_at),
            repeat,
            now,
        )?;

        let payload;
        let message = match message {
            Some(m) => m,
            None => {
                payload = self.decrypt_record(record)?;
                payload.as_slice()
            }
        };

        let seed = self.master_key.derive_signing_seed(id.get())?;
        let signing_key = signing_key_from_seed(&seed);
        let entries: Vec<SignatureEntry> = (0..u64::from(repeat))
            .map(|i| SignatureEntry::create(&signing_key, id, use_count + i, now, message))
            .collect();
        drop(signing_key);

        self.commit(entries.iter().cloned().map(Frame::Signature).collect())?;

        tracing::info!(record = %id, count = repeat, "record signed");
        Ok(entries)
    }

    /// All signature entries for a record, oldest first.
    pub fn signatures_for(&self, id: RecordId) -> Result<&[SignatureEntry]> {
        self.record(id)?;
        Ok(self
            .contents
            .signatures
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or(&[]))
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Re-read the committed state if another handle changed it.
    /// Returns `true` when something was reloaded.
    pub fn refresh(&mut self) -> Result<bool> {
        let _lock = self.lock(LockMode::Shared)?;
        self.refresh_locked()
    }

    /// Drop key material now instead of at end of scope.
    pub fn close(self) {
        tracing::debug!(path = %self.path.display(), "vault closed");
    }

    fn refresh_locked(&mut self) -> Result<bool> {
        let data = format::read_container(&self.path)?;
        if Preamble::decode(&data)? != self.preamble {
            return Err(VaultError::CorruptVault(
                "vault was re-initialised by another process".into(),
            ));
        }

        let header = format::select_slot(&data, self.mac_key.as_slice())?;
        if header == self.contents.header {
            return Ok(false);
        }

        tracing::debug!(
            from = self.contents.header.generation,
            to = header.generation,
            "vault changed on disk, reloading"
        );
        self.contents = Contents::load(&data, self.mac_key.as_slice())?;
        Ok(true)
    }

    /// Append `frames` durably, then fold them into memory.
    fn commit(&mut self, frames: Vec<Frame>) -> Result<()> {
        let mut batch = FrameBatch::new(self.contents.header.chain_mac);
        for frame in &frames {
            batch.push(self.mac_key.as_slice(), frame)?;
        }

        let header = format::commit_batch(
            &self.path,
            &self.preamble,
            &self.contents.header,
            &batch,
            self.mac_key.as_slice(),
        )?;

        self.contents.header = header;
        for frame in frames {
            if let Frame::Record(record) = &frame {
                self.contents
                    .index
                    .insert(record.id, &record.label, &record.tags);
            }
            self.contents.apply(frame)?;
        }
        Ok(())
    }

    fn lock(&self, mode: LockMode) -> Result<VaultLock> {
        VaultLock::acquire(&self.path, mode, self.lock_timeout)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_count(&self) -> usize {
        self.contents.records.len()
    }

    /// Number of committed writes since `init` (starts at 1).
    pub fn generation(&self) -> u64 {
        self.contents.header.generation
    }

    pub fn kdf_params(&self) -> Argon2Params {
        self.preamble.kdf
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.contents.records.contains_key(&id)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn record(&self, id: RecordId) -> Result<&StoredRecord> {
        self.contents
            .records
            .get(&id)
            .ok_or(VaultError::RecordNotFound(id))
    }

    fn decrypt_record(&self, record: &StoredRecord) -> Result<Zeroizing<Vec<u8>>> {
        let record_key = self.master_key.derive_record_key(record.id.get())?;
        let sealed = record.sealed()?;
        decrypt(record_key.as_slice(), &sealed, &StoredRecord::aad(record.id))
    }

    fn metadata_for(&self, record: &StoredRecord) -> RecordMetadata {
        let signatures = self.contents.signatures.get(&record.id);
        RecordMetadata {
            id: record.id,
            label: record.label.clone(),
            format: record.format,
            tags: record.tags.iter().cloned().collect(),
            created_at: record.created_at,
            use_count: signatures.map_or(0, |s| s.len() as u64),
            last_used_at: signatures.and_then(|s| s.last()).map(|e| e.signed_at),
            expires_at: record.policy.expires_at(record.created_at),
            policy: record.policy,
        }
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("path", &self.path)
            .field("generation", &self.contents.header.generation)
            .field("records", &self.contents.records.len())
            .finish_non_exhaustive()
    }
}

fn master_key_from(passphrase: &[u8], salt: &[u8], params: &Argon2Params) -> Result<MasterKey> {
    let mut bytes = derive_master_key_with_params(passphrase, salt, params)?;
    let master_key = MasterKey::new(bytes);
    bytes.zeroize();
    Ok(master_key)
}

/// Reject a signing batch the record's policy does not allow.
fn check_policy(
    id: RecordId,
    policy: &SignPolicy,
    created_at: DateTime<Utc>,
    use_count: u64,
    last_used_at: Option<DateTime<Utc>>,
    repeat: u32,
    now: DateTime<Utc>,
) -> Result<()> {
    if let Some(expires_at) = policy.expires_at(created_at) {
        if now >= expires_at {
            return Err(VaultError::PolicyViolation(format!(
                "record {id} expired at {}",
                expires_at.to_rfc3339()
            )));
        }
    }

    let max = u64::from(policy.max_sign_uses);
    if max > 0 && use_count + u64::from(repeat) > max {
        return Err(VaultError::PolicyViolation(format!(
            "record {id} allows {max} signatures; {use_count} used, {repeat} requested"
        )));
    }

    if policy.cooldown_secs > 0 {
        if let Some(last) = last_used_at {
            let elapsed = (now - last).num_seconds().max(0) as u64;
            if elapsed < policy.cooldown_secs {
                return Err(VaultError::PolicyViolation(format!(
                    "record {id} is cooling down ({}s remaining)",
                    policy.cooldown_secs - elapsed
                )));
            }
        }
    }
    Ok(())
}
