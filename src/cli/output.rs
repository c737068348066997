//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.

use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::authority::{AuthorityBinding, VerificationResult};
use crate::vault::{RecordMetadata, SignatureEntry};

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

/// Print a table of record metadata (Id, Label, Format, Tags, Signed, Created).
pub fn print_records_table(records: &[RecordMetadata]) {
    if records.is_empty() {
        info("No matching records.");
        tip("Run `sealvault import --label <LABEL> --format <FORMAT>` to add one.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Id", "Label", "Format", "Tags", "Signed", "Created"]);

    for r in records {
        table.add_row(vec![
            r.id.to_string(),
            r.label.clone(),
            r.format.to_string(),
            r.tags.join(","),
            r.use_count.to_string(),
            r.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }

    println!("{table}");
}

/// Print a table of signature entries (Counter, Key, Digest, Signature).
pub fn print_signatures_table(entries: &[SignatureEntry]) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Counter", "Key", "Message SHA-256", "Signature"]);

    for e in entries {
        table.add_row(vec![
            e.counter.to_string(),
            e.key_id.clone(),
            short_hex(&e.message_digest),
            short_hex(&hex::encode(&e.signature)),
        ]);
    }

    println!("{table}");
}

/// Print bindings with their verification result.
pub fn print_bindings_table(rows: &[(&AuthorityBinding, VerificationResult)]) {
    if rows.is_empty() {
        info("No authority bindings found.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Key", "Root", "Status"]);

    for (binding, result) in rows {
        let status = match result {
            VerificationResult::Valid => style(result.as_str()).green(),
            VerificationResult::RootMismatch => style(result.as_str()).yellow(),
            VerificationResult::Invalid => style(result.as_str()).red(),
        };
        table.add_row(vec![
            binding.key_id.clone(),
            short_hex(&binding.root_fingerprint),
            status.to_string(),
        ]);
    }

    println!("{table}");
}

/// First 16 characters of a long hex string, with an ellipsis.
fn short_hex(s: &str) -> String {
    match s.get(..16) {
        Some(prefix) if s.len() > 16 => format!("{prefix}\u{2026}"),
        _ => s.to_string(),
    }
}
