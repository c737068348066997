use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::authority::DEFAULT_ROOT_FINGERPRINT;
use crate::crypto::kdf::Argon2Params;
use crate::errors::{Result, VaultError};
use crate::vault::VaultOptions;

/// Environment variable that overrides the pinned root fingerprint.
pub const ROOT_FINGERPRINT_ENV: &str = "SEALVAULT_ROOT_FINGERPRINT";

/// Project-level configuration, loaded from `.sealvault.toml`.
///
/// Every field has a sensible default so SealVault works out-of-the-box
/// without any config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Vault file, relative to the project root unless absolute.
    #[serde(default = "default_vault_path")]
    pub vault_path: String,

    /// Argon2 memory cost in KiB (default: 64 MB).
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    /// Argon2 iteration count (default: 3).
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Argon2 parallelism degree (default: 4).
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,

    /// How long to wait for the vault lock, in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Root fingerprint that authority bindings must chain to.
    #[serde(default)]
    pub pinned_root_fingerprint: Option<String>,

    /// JSON file of authority bindings to use instead of the packaged set.
    #[serde(default)]
    pub authority_data: Option<String>,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_vault_path() -> String {
    ".sealvault/default.vault".to_string()
}

fn default_argon2_memory_kib() -> u32 {
    65_536 // 64 MB
}

fn default_argon2_iterations() -> u32 {
    3
}

fn default_argon2_parallelism() -> u32 {
    4
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            vault_path: default_vault_path(),
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
            lock_timeout_ms: default_lock_timeout_ms(),
            pinned_root_fingerprint: None,
            authority_data: None,
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the project root.
    pub const FILE_NAME: &'static str = ".sealvault.toml";

    /// Load settings from `<project_dir>/.sealvault.toml`.
    ///
    /// If the file does not exist, sensible defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            VaultError::Config(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        tracing::debug!(path = %config_path.display(), "loaded config");
        Ok(settings)
    }

    /// Full path to the vault file.
    ///
    /// Example: `project_dir/.sealvault/default.vault`
    pub fn vault_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.vault_path)
    }

    /// Convert the Argon2 settings into crypto-layer params.
    pub fn argon2_params(&self) -> Argon2Params {
        Argon2Params {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Vault options built from these settings.
    pub fn vault_options(&self, overwrite: bool) -> VaultOptions {
        VaultOptions {
            kdf: self.argon2_params(),
            lock_timeout: self.lock_timeout(),
            overwrite,
        }
    }

    /// Pick the pinned root: `flag`, then `env`, then the config file,
    /// then the compiled-in default.
    pub fn resolve_pinned_root(&self, flag: Option<&str>, env: Option<&str>) -> String {
        non_blank(flag)
            .or_else(|| non_blank(env))
            .or_else(|| non_blank(self.pinned_root_fingerprint.as_deref()))
            .unwrap_or(DEFAULT_ROOT_FINGERPRINT)
            .to_ascii_lowercase()
    }

    /// [`Settings::resolve_pinned_root`] reading `SEALVAULT_ROOT_FINGERPRINT`.
    pub fn pinned_root(&self, flag: Option<&str>) -> String {
        let env = std::env::var(ROOT_FINGERPRINT_ENV).ok();
        self.resolve_pinned_root(flag, env.as_deref())
    }

    /// Authority data file, relative to the project root unless absolute.
    pub fn authority_data_path(&self, project_dir: &Path) -> Option<PathBuf> {
        self.authority_data
            .as_deref()
            .map(|p| project_dir.join(p))
    }
}

/// `value` trimmed, or `None` when absent or blank.
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// ── Tests ────────────────────────────────────────────────────────────
