//! `sealvault init`: create a new, empty vault.

use crate::cli::output;
use crate::cli::{load_settings, prompt_new_passphrase, vault_path, Cli};
use crate::errors::{Result, VaultError};
use crate::vault::Vault;

/// Execute the `init` command.
pub fn execute(cli: &Cli, force: bool) -> Result<()> {
    let (cwd, settings) = load_settings()?;
    let path = vault_path(cli, &cwd, &settings);

    // Fail before prompting if the vault is already there.
    if path.exists() && !force {
        output::tip("Use `sealvault init --force` to replace it.");
        return Err(VaultError::AlreadyExists(path));
    }

    let passphrase = prompt_new_passphrase()?;
    let vault = Vault::init(&path, passphrase.as_bytes(), &settings.vault_options(force))?;

    output::success(&format!("Vault created at {}", vault.path().display()));
    output::tip("Run `sealvault import --label <LABEL> --format <FORMAT>` to add a record.");
    output::tip("Run `sealvault find` to list records.");

    vault.close();
    Ok(())
}
