//! `sealvault authority`: verify authority bindings against the pinned root.
//!
//! Needs no vault and no passphrase. Bindings come from `--data`, then
//! the `authority_data` config entry, then the set packaged with the
//! binary.

use std::path::PathBuf;

use serde::Serialize;

use crate::authority::{
    example_binding, load_bindings, packaged_bindings, AuthorityBinding, AuthorityVerifier,
    InspectedBinding, VerificationResult,
};
use crate::cli::{load_settings, output};
use crate::errors::{Result, VaultError};

/// Arguments of the `authority` command.
pub struct AuthorityArgs {
    pub json: bool,
    pub example: bool,
    pub data: Option<PathBuf>,
    pub root: Option<String>,
}

/// One binding with its result, as printed by `--json`.
#[derive(Debug, Serialize)]
struct BindingReport<'a> {
    #[serde(flatten)]
    binding: &'a AuthorityBinding,
    status: VerificationResult,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    pinned_root: &'a str,
    bindings: Vec<BindingReport<'a>>,
}

/// Execute the `authority` command.
pub fn execute(args: AuthorityArgs) -> Result<()> {
    let (cwd, settings) = load_settings()?;
    let verifier = AuthorityVerifier::new(&settings.pinned_root(args.root.as_deref()))?;

    if args.example {
        let binding = example_binding(verifier.pinned_root());
        println!("{}", to_json(&binding)?);
        return Ok(());
    }

    let data = args
        .data
        .map(|p| cwd.join(p))
        .or_else(|| settings.authority_data_path(&cwd));
    let bindings = match &data {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading authority bindings");
            load_bindings(path)?
        }
        None => packaged_bindings()?,
    };

    let mut inspected: Vec<InspectedBinding> =
        bindings.into_iter().map(InspectedBinding::new).collect();
    let results: Vec<VerificationResult> =
        inspected.iter_mut().map(|b| b.resolve(&verifier)).collect();
    let rows: Vec<(&AuthorityBinding, VerificationResult)> = inspected
        .iter()
        .map(|b| &b.binding)
        .zip(results)
        .collect();

    for (binding, result) in &rows {
        if *result != VerificationResult::Valid {
            tracing::warn!(key_id = %binding.key_id, status = %result, "binding did not verify");
        }
    }

    if args.json {
        let report = Report {
            pinned_root: verifier.pinned_root(),
            bindings: rows
                .iter()
                .map(|(binding, status)| BindingReport {
                    binding,
                    status: *status,
                })
                .collect(),
        };
        println!("{}", to_json(&report)?);
    } else {
        output::info(&format!("Pinned root: {}", verifier.pinned_root()));
        output::print_bindings_table(&rows);
    }

    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| VaultError::Serialization(format!("JSON output: {e}")))
}
