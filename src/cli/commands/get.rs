//! `sealvault get`: decrypt one record and print it.

use std::io::Write;

use crate::cli::{load_settings, prompt_passphrase, vault_path, Cli};
use crate::errors::Result;
use crate::vault::{RecordFormat, RecordId, Vault};

/// Execute the `get` command.
pub fn execute(cli: &Cli, id: RecordId) -> Result<()> {
    let (cwd, settings) = load_settings()?;
    let path = vault_path(cli, &cwd, &settings);

    // Open the vault (requires passphrase).
    let passphrase = prompt_passphrase()?;
    let vault = Vault::open(&path, passphrase.as_bytes(), &settings.vault_options(false))?;

    let format = vault.record_metadata(id)?.format;
    let payload = vault.read_record(id)?;
    let rendered = zeroize::Zeroizing::new(format.encode_output(&payload));

    // Render in the declared format; raw bytes go out untouched.
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&rendered)?;
    if format != RecordFormat::Raw {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;

    vault.close();
    Ok(())
}
