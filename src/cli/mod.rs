//! CLI module: Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::errors::{Result, VaultError};
use crate::vault::record::normalize_tags;
use crate::vault::{RecordFormat, RecordId};

/// Environment variable read before prompting for the passphrase.
pub const PASSPHRASE_ENV: &str = "SEALVAULT_PASSPHRASE";

/// Minimum passphrase length accepted by `init`.
const MIN_PASSPHRASE_LEN: usize = 8;

/// SealVault CLI: encrypted, searchable, signable record vault.
#[derive(Parser)]
#[command(
    name = "sealvault",
    about = "Encrypted, searchable, signable record vault",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Vault file (default: from .sealvault.toml, else .sealvault/default.vault)
    #[arg(long, env = "SEALVAULT_PATH", global = true)]
    pub vault: Option<PathBuf>,

    /// More diagnostics on stderr (repeat for more)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Create a new, empty vault
    Init {
        /// Replace an existing vault
        #[arg(long)]
        force: bool,
    },

    /// Encrypt and store a record
    Import {
        /// Human-readable label (not required to be unique)
        #[arg(short, long)]
        label: String,

        /// Payload encoding: hex, raw or base64
        #[arg(short, long)]
        format: RecordFormat,

        /// Comma-separated tags
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Payload value (read from stdin if omitted)
        #[arg(long)]
        value: Option<String>,

        /// Maximum number of signatures (0 = unlimited)
        #[arg(long, default_value_t = 0)]
        max_sign_uses: u32,

        /// Minimum seconds between signing batches
        #[arg(long, default_value_t = 0)]
        cooldown: u64,

        /// Seconds after import during which the record may sign (0 = no expiry)
        #[arg(long, default_value_t = 0)]
        max_age: u64,
    },

    /// Search records by label and tags
    Find {
        /// Case-insensitive label substring
        #[arg(short = 'Q', long, default_value = "")]
        query: String,

        /// Comma-separated tags that must all be present
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Decrypt a record and print it in its declared format
    Get {
        /// Record id
        id: RecordId,
    },

    /// Sign a record's payload (or an explicit message)
    Sign {
        /// Record id
        id: RecordId,

        /// Sign this text instead of the record payload
        #[arg(long, conflicts_with = "message_hex")]
        message: Option<String>,

        /// Sign these hex-encoded bytes instead of the record payload
        #[arg(long)]
        message_hex: Option<String>,

        /// Number of independent signatures to produce
        #[arg(short, long, default_value_t = 1)]
        repeat: u32,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Export record metadata (never payloads) as JSON
    Export {
        /// Output file path (prints to stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify authority bindings against the pinned root
    Authority {
        /// Print JSON instead of a table
        #[arg(long, conflicts_with = "example")]
        json: bool,

        /// Print an example binding signed by a demonstration key
        #[arg(long)]
        example: bool,

        /// JSON file of bindings (default: packaged bindings)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Pinned root fingerprint (overrides env and config)
        #[arg(long)]
        root: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Get the vault passphrase, trying in order:
/// 1. `SEALVAULT_PASSPHRASE` env var (CI/CD)
/// 2. Interactive prompt
///
/// Returns `Zeroizing<String>` so the passphrase is wiped from memory on drop.
pub fn prompt_passphrase() -> Result<Zeroizing<String>> {
    if let Some(pw) = passphrase_from_env() {
        return Ok(pw);
    }

    let pw = dialoguer::Password::new()
        .with_prompt("Enter vault passphrase")
        .interact()
        .map_err(|e| VaultError::CommandFailed(format!("passphrase prompt: {e}")))?;
    Ok(Zeroizing::new(pw))
}

/// Prompt for a new passphrase with confirmation (used during `init`).
///
/// Also respects `SEALVAULT_PASSPHRASE` for scripted/CI usage.
/// Enforces a minimum length.
pub fn prompt_new_passphrase() -> Result<Zeroizing<String>> {
    if let Some(pw) = passphrase_from_env() {
        if pw.len() < MIN_PASSPHRASE_LEN {
            return Err(VaultError::CommandFailed(format!(
                "passphrase must be at least {MIN_PASSPHRASE_LEN} characters"
            )));
        }
        return Ok(pw);
    }

    loop {
        let passphrase = dialoguer::Password::new()
            .with_prompt("Choose vault passphrase")
            .with_confirmation(
                "Confirm vault passphrase",
                "Passphrases do not match, try again",
            )
            .interact()
            .map_err(|e| VaultError::CommandFailed(format!("passphrase prompt: {e}")))?;

        if passphrase.len() < MIN_PASSPHRASE_LEN {
            output::warning(&format!(
                "Passphrase must be at least {MIN_PASSPHRASE_LEN} characters. Try again."
            ));
            continue;
        }

        return Ok(Zeroizing::new(passphrase));
    }
}

fn passphrase_from_env() -> Option<Zeroizing<String>> {
    std::env::var(PASSPHRASE_ENV)
        .ok()
        .filter(|pw| !pw.is_empty())
        .map(Zeroizing::new)
}

/// Settings from `.sealvault.toml` in the working directory.
pub fn load_settings() -> Result<(PathBuf, Settings)> {
    let cwd = std::env::current_dir()?;
    let settings = Settings::load(&cwd)?;
    Ok((cwd, settings))
}

/// Resolve the vault file: `--vault` / `SEALVAULT_PATH`, else config.
pub fn vault_path(cli: &Cli, cwd: &Path, settings: &Settings) -> PathBuf {
    match &cli.vault {
        Some(path) => cwd.join(path),
        None => settings.vault_path(cwd),
    }
}

/// Normalize tags given on the command line.
pub fn parse_tags(raw: &[String]) -> Result<BTreeSet<String>> {
    normalize_tags(raw.iter().filter(|t| !t.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn import_parses_tags_and_format() {
        let cli = Cli::try_parse_from([
            "sealvault", "import", "--label", "k", "--format", "hex", "--tags", "lab,prod",
        ])
        .unwrap();
        match cli.command {
            Commands::Import { format, tags, .. } => {
                assert_eq!(format, RecordFormat::Hex);
                assert_eq!(tags, vec!["lab", "prod"]);
            }
            _ => panic!("expected import"),
        }
    }

    #[test]
    fn sign_rejects_two_message_sources() {
        let result = Cli::try_parse_from([
            "sealvault", "sign", "1", "--message", "a", "--message-hex", "00",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_tags_skips_blank_entries() {
        let tags = parse_tags(&["lab".into(), " ".into(), "lab".into()]).unwrap();
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn verbosity_counts() {
        let cli = Cli::try_parse_from(["sealvault", "-vv", "find"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
