//! `sealvault sign`: produce signature entries for a record.

use crate::cli::output;
use crate::cli::{load_settings, prompt_passphrase, vault_path, Cli};
use crate::errors::{Result, VaultError};
use crate::vault::{RecordId, Vault};

/// Execute the `sign` command.
pub fn execute(
    cli: &Cli,
    id: RecordId,
    message: Option<&str>,
    message_hex: Option<&str>,
    repeat: u32,
    json: bool,
) -> Result<()> {
    let message = explicit_message(message, message_hex)?;

    let (cwd, settings) = load_settings()?;
    let path = vault_path(cli, &cwd, &settings);

    let passphrase = prompt_passphrase()?;
    let mut vault = Vault::open(&path, passphrase.as_bytes(), &settings.vault_options(false))?;

    let entries = vault.sign(id, message.as_deref(), repeat)?;

    if json {
        let out = serde_json::to_string_pretty(&entries)
            .map_err(|e| VaultError::Serialization(format!("JSON output: {e}")))?;
        println!("{out}");
    } else {
        output::print_signatures_table(&entries);
        output::success(&format!(
            "Recorded {} signature(s) for record {id}",
            entries.len()
        ));
    }

    vault.close();
    Ok(())
}

/// The message to sign when one was given on the command line.
fn explicit_message(text: Option<&str>, hex_input: Option<&str>) -> Result<Option<Vec<u8>>> {
    match (text, hex_input) {
        (Some(t), _) => Ok(Some(t.as_bytes().to_vec())),
        (None, Some(h)) => {
            let digits = h.trim();
            let digits = digits.strip_prefix("0x").unwrap_or(digits);
            hex::decode(digits)
                .map(Some)
                .map_err(|e| VaultError::InvalidInput(format!("--message-hex: {e}")))
        }
        (None, None) => Ok(None),
    }
}
