//! `sealvault find`: search records by label and tags.
//!
//! Answers from the index only; no record is decrypted.

use serde::Serialize;

use crate::cli::output;
use crate::cli::{load_settings, parse_tags, prompt_passphrase, vault_path, Cli};
use crate::errors::{Result, VaultError};
use crate::vault::{RecordId, RecordMetadata, Vault};

/// One search hit as printed by `--json`.
#[derive(Debug, Serialize)]
struct FindHit<'a> {
    id: RecordId,
    label: &'a str,
    tags: &'a [String],
}

/// Execute the `find` command.
pub fn execute(cli: &Cli, query: &str, tags: &[String], json: bool) -> Result<()> {
    let (cwd, settings) = load_settings()?;
    let path = vault_path(cli, &cwd, &settings);
    let tags = parse_tags(tags)?;
    let query = query.trim();

    let passphrase = prompt_passphrase()?;
    let vault = Vault::open(&path, passphrase.as_bytes(), &settings.vault_options(false))?;

    let records = vault.find_records(query, &tags);
    tracing::debug!(query, tags = tags.len(), hits = records.len(), "search finished");

    if json {
        println!("{}", hits_json(&records)?);
    } else {
        output::print_records_table(&records);
    }

    vault.close();
    Ok(())
}

fn hits_json(records: &[RecordMetadata]) -> Result<String> {
    let hits: Vec<FindHit<'_>> = records
        .iter()
        .map(|r| FindHit {
            id: r.id,
            label: &r.label,
            tags: &r.tags,
        })
        .collect();
    serde_json::to_string_pretty(&hits)
        .map_err(|e| VaultError::Serialization(format!("JSON output: {e}")))
}
