//! Vault journey: the three key-derivation modes, redaction, and the lazy
//! legacy migration.

use mnemo_core::{CredentialInput, CredentialVault, VaultError};
use tempfile::tempdir;

const KEY: &str = "a sufficiently long vault password";

fn cred(service: &str, value: &str) -> CredentialInput {
    CredentialInput {
        service: service.into(),
        cred_type: "api_key".into(),
        value: value.into(),
        url: Some(format!("https://{}.example.com", service)),
        notes: None,
        expires: None,
    }
}

#[test]
fn encrypted_vault_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vault.db");

    {
        let vault = CredentialVault::open(&path, Some(KEY)).unwrap();
        vault.store(&cred("github", "ghp_secret_token")).unwrap();
        assert_eq!(vault.stats().unwrap().kdf_version, 2);
    }

    // Secrets survive a reopen with the same key
    let vault = CredentialVault::open(&path, Some(KEY)).unwrap();
    let entry = vault.get("github", "api_key").unwrap();
    assert_eq!(entry.value.as_deref(), Some("ghp_secret_token"));
    assert_eq!(entry.url.as_deref(), Some("https://github.example.com"));

    // Listings stay redacted
    assert!(vault.list().unwrap()[0].value.is_none());
}

#[test]
fn short_key_selects_plaintext_mode() {
    let dir = tempdir().unwrap();
    let vault = CredentialVault::open(dir.path().join("vault.db"), Some("tiny")).unwrap();
    assert_eq!(vault.stats().unwrap().kdf_version, 0);

    vault.store(&cred("svc", "value")).unwrap();
    assert_eq!(
        vault.get("svc", "api_key").unwrap().value.as_deref(),
        Some("value")
    );
}

#[test]
fn wrong_key_cannot_read() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vault.db");
    {
        let vault = CredentialVault::open(&path, Some(KEY)).unwrap();
        vault.store(&cred("github", "sealed")).unwrap();
    }

    let vault = CredentialVault::open(&path, Some("another long password here")).unwrap();
    assert!(matches!(
        vault.get("github", "api_key"),
        Err(VaultError::Decrypt)
    ));
}

#[test]
fn store_if_new_and_aliases() {
    let dir = tempdir().unwrap();
    let vault = CredentialVault::open(dir.path().join("vault.db"), Some(KEY)).unwrap();

    assert!(vault.store_if_new(&cred("openai_api", "first")).unwrap());
    // Hyphenated spelling of the same service is the same credential
    assert!(!vault.store_if_new(&cred("openai-api", "second")).unwrap());
    assert_eq!(
        vault.get("openai_api", "api_key").unwrap().value.as_deref(),
        Some("first")
    );
}

#[test]
fn exists_delete_and_stats() {
    let dir = tempdir().unwrap();
    let vault = CredentialVault::open(dir.path().join("vault.db"), Some(KEY)).unwrap();

    vault.store(&cred("a", "1")).unwrap();
    vault.store(&cred("b", "2")).unwrap();
    assert_eq!(vault.stats().unwrap().entries, 2);
    assert!(vault.exists("a", "api_key").unwrap());

    assert!(vault.delete("a", "api_key").unwrap());
    assert!(!vault.exists("a", "api_key").unwrap());
    assert_eq!(vault.stats().unwrap().entries, 1);

    let all = vault.list_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].value.as_deref(), Some("2"));
}
