//! `sealvault import`: encrypt a payload and append it as a record.
//!
//! The payload comes from `--value` or, if omitted, from stdin. Text
//! formats (`hex`, `base64`) are trimmed; `raw` is taken byte for byte.

use std::io::Read;

use zeroize::Zeroizing;

use crate::cli::output;
use crate::cli::{load_settings, parse_tags, prompt_passphrase, vault_path, Cli};
use crate::errors::Result;
use crate::vault::{RecordFormat, SignPolicy, Vault};

/// Arguments of the `import` command.
pub struct ImportArgs<'a> {
    pub label: &'a str,
    pub format: RecordFormat,
    pub tags: &'a [String],
    pub value: Option<&'a str>,
    pub policy: SignPolicy,
}

/// Execute the `import` command.
pub fn execute(cli: &Cli, args: ImportArgs<'_>) -> Result<()> {
    let (cwd, settings) = load_settings()?;
    let path = vault_path(cli, &cwd, &settings);
    let tags = parse_tags(args.tags)?;

    let payload = match args.value {
        Some(v) => Zeroizing::new(v.as_bytes().to_vec()),
        None => read_stdin()?,
    };

    let passphrase = prompt_passphrase()?;
    let mut vault = Vault::open(&path, passphrase.as_bytes(), &settings.vault_options(false))?;

    let id = vault.append_record_with_policy(
        args.label,
        &payload,
        args.format,
        &tags,
        args.policy,
    )?;

    output::success(&format!(
        "Stored record {id} ('{}', {}) in {}",
        args.label,
        args.format,
        vault.path().display()
    ));

    vault.close();
    Ok(())
}

fn read_stdin() -> Result<Zeroizing<Vec<u8>>> {
    let mut buf = Zeroizing::new(Vec::new());
    std::io::stdin().read_to_end(&mut buf)?;
    Ok(buf)
}
