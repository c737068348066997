//! `sealvault export`: dump record metadata as JSON.
//!
//! Only metadata leaves the vault: labels, tags, formats, policies and
//! usage. Payloads and ciphertexts are never exported.

use std::fs;
use std::path::Path;

use crate::cli::output;
use crate::cli::{load_settings, prompt_passphrase, vault_path, Cli};
use crate::errors::{Result, VaultError};
use crate::vault::{RecordMetadata, Vault};

/// Execute the `export` command.
pub fn execute(cli: &Cli, output_path: Option<&Path>) -> Result<()> {
    let (cwd, settings) = load_settings()?;
    let path = vault_path(cli, &cwd, &settings);

    let passphrase = prompt_passphrase()?;
    let vault = Vault::open(&path, passphrase.as_bytes(), &settings.vault_options(false))?;

    let records = vault.export_metadata();
    let content = format_as_json(&records)?;

    match output_path {
        Some(dest) => {
            // Safety: refuse to overwrite vault files.
            if dest
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("vault"))
            {
                return Err(VaultError::CommandFailed(
                    "refusing to export over a .vault file".into(),
                ));
            }

            fs::write(dest, &content).map_err(|e| {
                VaultError::CommandFailed(format!("failed to write export file: {e}"))
            })?;

            output::success(&format!(
                "Exported metadata of {} records to {}",
                records.len(),
                dest.display()
            ));
        }
        None => {
            // Write to stdout (no success message, just raw output).
            println!("{content}");
        }
    }

    vault.close();
    Ok(())
}

fn format_as_json(records: &[RecordMetadata]) -> Result<String> {
    serde_json::to_string_pretty(records)
        .map_err(|e| VaultError::Serialization(format!("JSON export: {e}")))
}
