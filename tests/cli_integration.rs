//! Integration tests for the SealVault CLI.
//!
//! These tests exercise the binary end-to-end using `assert_cmd`. The
//! passphrase comes from `SEALVAULT_PASSPHRASE` and every temp project
//! gets a `.sealvault.toml` with light Argon2 parameters.

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

const PASS: &str = "integration-passphrase";

const FAST_CONFIG: &str = r#"
argon2_memory_kib = 8192
argon2_iterations = 1
argon2_parallelism = 1
lock_timeout_ms = 2000
"#;

/// Helper: get a Command pointing at the sealvault binary.
fn sealvault() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("sealvault").expect("binary should exist");
    cmd.env_remove("SEALVAULT_PATH")
        .env_remove("SEALVAULT_PASSPHRASE")
        .env_remove("SEALVAULT_ROOT_FINGERPRINT")
        .env_remove("RUST_LOG");
    cmd
}

/// A command run inside `project` with the test passphrase.
fn in_project(project: &TempDir) -> Command {
    let mut cmd = sealvault();
    cmd.current_dir(project.path()).env("SEALVAULT_PASSPHRASE", PASS);
    cmd
}

/// A temp project with fast KDF settings and an initialised vault.
fn project_with_vault() -> TempDir {
    let project = TempDir::new().unwrap();
    project.child(".sealvault.toml").write_str(FAST_CONFIG).unwrap();
    in_project(&project).arg("init").assert().success();
    project
}

fn import(project: &TempDir, label: &str, format: &str, value: &str, tags: &str) {
    in_project(project)
        .args(["import", "--label", label, "--format", format, "--value", value])
        .args(["--tags", tags])
        .assert()
        .success();
}

// ---------------------------------------------------------------------------
// Help and usage
// ---------------------------------------------------------------------------

#[test]
fn help_flag_shows_usage() {
    sealvault()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Encrypted, searchable, signable record vault",
        ))
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("find"))
        .stdout(predicate::str::contains("sign"))
        .stdout(predicate::str::contains("authority"));
}

#[test]
fn version_flag_shows_version() {
    sealvault()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sealvault"));
}

#[test]
fn no_args_shows_help() {
    sealvault()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

// ---------------------------------------------------------------------------
// Vault lifecycle
// ---------------------------------------------------------------------------

#[test]
fn init_creates_vault_in_default_location() {
    let project = project_with_vault();
    project
        .child(".sealvault/default.vault")
        .assert(predicate::path::exists());
}

#[test]
fn init_twice_fails_without_force() {
    let project = project_with_vault();

    in_project(&project)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    in_project(&project).args(["init", "--force"]).assert().success();
}

#[test]
fn init_rejects_short_passphrase() {
    let project = TempDir::new().unwrap();
    project.child(".sealvault.toml").write_str(FAST_CONFIG).unwrap();
    sealvault()
        .current_dir(project.path())
        .env("SEALVAULT_PASSPHRASE", "short")
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 8"));
}

#[test]
fn vault_flag_overrides_config() {
    let project = TempDir::new().unwrap();
    project.child(".sealvault.toml").write_str(FAST_CONFIG).unwrap();
    in_project(&project)
        .args(["--vault", "custom/keys.vault", "init"])
        .assert()
        .success();
    project
        .child("custom/keys.vault")
        .assert(predicate::path::exists());
}

#[test]
fn find_on_missing_vault_fails() {
    let project = TempDir::new().unwrap();
    in_project(&project)
        .arg("find")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn wrong_passphrase_is_reported() {
    let project = project_with_vault();
    import(&project, "a", "raw", "1", "t");

    sealvault()
        .current_dir(project.path())
        .env("SEALVAULT_PASSPHRASE", "not-the-passphrase")
        .arg("find")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Wrong passphrase"));
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[test]
fn import_then_get_renders_declared_format() {
    let project = project_with_vault();
    in_project(&project)
        .args(["import", "--label", "deploy", "--format", "hex", "--value", "0xDEADBEEF"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stored record 1"));

    in_project(&project)
        .args(["get", "1"])
        .assert()
        .success()
        .stdout("deadbeef\n");
}

#[test]
fn import_reads_stdin_when_no_value() {
    let project = project_with_vault();
    in_project(&project)
        .args(["import", "--label", "piped", "--format", "raw"])
        .write_stdin("from stdin")
        .assert()
        .success();

    in_project(&project)
        .args(["get", "1"])
        .assert()
        .success()
        .stdout("from stdin");
}

#[test]
fn import_rejects_bad_hex() {
    let project = project_with_vault();
    in_project(&project)
        .args(["import", "--label", "x", "--format", "hex", "--value", "xyz"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid format"));
}

#[test]
fn find_filters_by_query_and_tags() {
    let project = project_with_vault();
    import(&project, "alpha-one", "raw", "1", "lab");
    import(&project, "alpha-two", "raw", "2", "prod");
    import(&project, "beta", "raw", "3", "lab");

    let out = in_project(&project)
        .args(["find", "--query", "alpha", "--tags", "lab", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());

    let hits: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["id"], 1);
    assert_eq!(hits[0]["label"], "alpha-one");
    assert_eq!(hits[0]["tags"][0], "lab");
}

#[test]
fn find_trims_the_query_flag() {
    let project = project_with_vault();
    import(&project, "alpha-one", "raw", "1", "lab");

    let out = in_project(&project)
        .args(["find", "--query", " alpha ", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let hits: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(hits.as_array().unwrap().len(), 1);
}

#[test]
fn get_unknown_record_fails() {
    let project = project_with_vault();
    in_project(&project)
        .args(["get", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Record 42 not found"));
}

#[test]
fn export_writes_metadata_only() {
    let project = project_with_vault();
    import(&project, "exported", "raw", "super-secret-bytes", "x");

    in_project(&project)
        .args(["export", "--output", "meta.json"])
        .assert()
        .success();

    let meta = project.child("meta.json");
    meta.assert(predicate::str::contains("\"exported\""));
    meta.assert(predicate::str::contains("super-secret-bytes").not());
    meta.assert(predicate::str::contains("ciphertext").not());
}

#[test]
fn export_refuses_to_overwrite_a_vault_file() {
    let project = project_with_vault();
    in_project(&project)
        .args(["export", "--output", "other.vault"])
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

#[test]
fn sign_repeat_emits_distinct_entries() {
    let project = project_with_vault();
    import(&project, "signer", "raw", "payload", "t");

    let out = in_project(&project)
        .args(["sign", "1", "--repeat", "3", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());

    let entries: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[2]["counter"], 2);
    assert_ne!(entries[0]["signature"], entries[1]["signature"]);
    assert_ne!(entries[0]["nonce"], entries[1]["nonce"]);
}

#[test]
fn sign_limit_is_enforced() {
    let project = project_with_vault();
    in_project(&project)
        .args(["import", "--label", "once", "--format", "raw", "--value", "v"])
        .args(["--max-sign-uses", "1"])
        .assert()
        .success();

    in_project(&project).args(["sign", "1"]).assert().success();
    in_project(&project)
        .args(["sign", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Policy violation"));
}

#[test]
fn max_age_is_recorded_in_the_policy() {
    let project = project_with_vault();
    in_project(&project)
        .args(["import", "--label", "ttl", "--format", "raw", "--value", "v"])
        .args(["--max-age", "3600"])
        .assert()
        .success();

    // Within its age limit the record still signs.
    in_project(&project).args(["sign", "1"]).assert().success();

    let out = in_project(&project).arg("export").output().unwrap();
    assert!(out.status.success());
    let records: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(records[0]["policy"]["max_age_secs"], 3600);
    assert!(records[0]["expires_at"].is_string());
}

#[test]
fn sign_zero_repeat_fails() {
    let project = project_with_vault();
    import(&project, "k", "raw", "v", "t");
    in_project(&project)
        .args(["sign", "1", "--repeat", "0"])
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// Authority
// ---------------------------------------------------------------------------

#[test]
fn authority_json_needs_no_passphrase() {
    let project = TempDir::new().unwrap();
    let out = sealvault()
        .current_dir(project.path())
        .args(["authority", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());

    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let bindings = report["bindings"].as_array().unwrap();
    assert!(!bindings.is_empty());
    for binding in bindings {
        assert_eq!(binding["status"], "valid");
    }
}

#[test]
fn authority_with_foreign_root_reports_mismatch() {
    let project = TempDir::new().unwrap();
    let foreign = "ab".repeat(32);
    sealvault()
        .current_dir(project.path())
        .args(["authority", "--json", "--root", &foreign])
        .assert()
        .success()
        .stdout(predicate::str::contains("root_mismatch"));
}

#[test]
fn authority_root_from_env() {
    let project = TempDir::new().unwrap();
    sealvault()
        .current_dir(project.path())
        .env("SEALVAULT_ROOT_FINGERPRINT", "cd".repeat(32))
        .args(["authority", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("root_mismatch"));
}

#[test]
fn authority_example_prints_a_binding() {
    let project = TempDir::new().unwrap();
    sealvault()
        .current_dir(project.path())
        .args(["authority", "--example"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"key_id\""))
        .stdout(predicate::str::contains("\"signature\""));
}

#[test]
fn authority_reads_data_file() {
    let project = TempDir::new().unwrap();
    let data = project.child("bindings.json");
    data.write_str(r#"[{"key_id": "deadbeefdeadbeef", "public_key": "AAAA", "signature": "AAAA"}]"#)
        .unwrap();

    sealvault()
        .current_dir(project.path())
        .args(["authority", "--json", "--data", "bindings.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"invalid\""));
}

#[test]
fn authority_rejects_malformed_root() {
    let project = TempDir::new().unwrap();
    sealvault()
        .current_dir(project.path())
        .args(["authority", "--root", "not-a-fingerprint"])
        .assert()
        .failure();
}
