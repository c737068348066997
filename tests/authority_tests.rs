//! Integration tests for authority binding verification.

use assert_fs::prelude::*;
use assert_fs::TempDir;
use sealvault::authority::{
    load_bindings, packaged_bindings, verify_binding, AuthorityBinding, AuthorityVerifier,
    VerificationResult, DEFAULT_ROOT_FINGERPRINT,
};
use sealvault::crypto::fingerprint;
use sealvault::crypto::signing::signing_key_from_seed;

fn root_fingerprint(seed: u8) -> String {
    let root = signing_key_from_seed(&[seed; 32]);
    fingerprint(&root.verifying_key().to_bytes())
}

#[test]
fn same_binding_resolves_to_each_outcome() {
    let pinned = root_fingerprint(1);
    let foreign = root_fingerprint(2);
    let subordinate = signing_key_from_seed(&[7u8; 32]);

    let binding = AuthorityBinding::sign(None, &subordinate, &pinned);
    assert_eq!(verify_binding(&binding, &pinned), VerificationResult::Valid);

    // One byte flipped in the signature.
    let mut forged = binding.clone();
    let mut chars: Vec<char> = forged.signature.chars().collect();
    chars[5] = if chars[5] == 'A' { 'B' } else { 'A' };
    forged.signature = chars.into_iter().collect();
    assert_eq!(verify_binding(&forged, &pinned), VerificationResult::Invalid);

    // Correctly signed for another root.
    let elsewhere = AuthorityBinding::sign(None, &subordinate, &foreign);
    assert_eq!(
        verify_binding(&elsewhere, &pinned),
        VerificationResult::RootMismatch
    );
}

#[test]
fn verifiers_for_different_roots_do_not_interfere() {
    let root_a = root_fingerprint(1);
    let root_b = root_fingerprint(2);
    let key = signing_key_from_seed(&[9u8; 32]);
    let binding = AuthorityBinding::sign(Some("ops-2026"), &key, &root_a);

    let a = AuthorityVerifier::new(&root_a).unwrap();
    let b = AuthorityVerifier::new(&root_b).unwrap();
    assert_eq!(a.verify(&binding), VerificationResult::Valid);
    assert_eq!(b.verify(&binding), VerificationResult::RootMismatch);
    assert_eq!(a.verify(&binding), VerificationResult::Valid);
}

#[test]
fn substituted_public_key_is_invalid() {
    let pinned = root_fingerprint(1);
    let binding = AuthorityBinding::sign(None, &signing_key_from_seed(&[3u8; 32]), &pinned);
    let other = AuthorityBinding::sign(None, &signing_key_from_seed(&[4u8; 32]), &pinned);

    let swapped = AuthorityBinding {
        public_key: other.public_key.clone(),
        ..binding
    };
    assert_eq!(verify_binding(&swapped, &pinned), VerificationResult::Invalid);
}

#[test]
fn bindings_load_from_a_json_file() {
    let tmp = TempDir::new().unwrap();
    let pinned = root_fingerprint(1);
    let key = signing_key_from_seed(&[5u8; 32]);
    let bindings = vec![
        AuthorityBinding::sign(None, &key, &pinned),
        AuthorityBinding::sign(None, &key, &root_fingerprint(2)),
    ];

    let file = tmp.child("bindings.json");
    file.write_str(&serde_json::to_string(&bindings).unwrap())
        .unwrap();

    let loaded = load_bindings(file.path()).unwrap();
    assert_eq!(loaded, bindings);

    let verifier = AuthorityVerifier::new(&pinned).unwrap();
    let results: Vec<_> = verifier.verify_all(&loaded).into_iter().map(|(_, r)| r).collect();
    assert_eq!(
        results,
        vec![VerificationResult::Valid, VerificationResult::RootMismatch]
    );
}

#[test]
fn malformed_json_file_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.child("bindings.json");
    file.write_str("{ not json").unwrap();
    assert!(load_bindings(file.path()).is_err());
}

#[test]
fn packaged_bindings_are_valid_for_default_root_only() {
    let bindings = packaged_bindings().unwrap();
    for binding in &bindings {
        assert_eq!(
            verify_binding(binding, DEFAULT_ROOT_FINGERPRINT),
            VerificationResult::Valid
        );
        assert_eq!(
            verify_binding(binding, &root_fingerprint(1)),
            VerificationResult::RootMismatch
        );
    }
}
