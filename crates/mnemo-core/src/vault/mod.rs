//! Credential Vault
//!
//! Opt-in encrypted storage of per-service credentials in a dedicated
//! database file. Secrets are sealed with AES-256-GCM (12-byte IV, 16-byte
//! tag) under a scrypt-derived key; the packed value layout is
//! `IV || TAG || ciphertext`.
//!
//! Three modes, recorded in `vault_meta.kdf_version`:
//! - 0: plaintext (empty or short key)
//! - 1: legacy scrypt (N=8192, r=8, p=1)
//! - 2: current scrypt (N=16384, r=8, p=1)
//!
//! A vault opened in legacy mode re-encrypts itself to v2 on the first
//! successful `get`, once the supplied password has been proven correct by
//! decrypting a record.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use chrono::{DateTime, Utc};
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use scrypt::Params as ScryptParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Keys shorter than this are treated as "no key" (plaintext mode)
pub const MIN_KEY_LEN: usize = 16;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const SALT_LEN: usize = 32;
const DERIVED_KEY_LEN: usize = 32;

/// Legacy vaults predate stored salts; they derived with this fixed salt
const LEGACY_V1_SALT: [u8; SALT_LEN] = [0u8; SALT_LEN];

// ============================================================================
// ERROR TYPES
// ============================================================================

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Vault is locked: {0}")]
    Locked(String),
    #[error("Decryption failed - wrong key or corrupted data")]
    Decrypt,
    #[error("Encryption failed: {0}")]
    Encrypt(String),
    #[error("Key derivation failed: {0}")]
    Kdf(String),
    #[error("Credential not found: {service}/{cred_type}")]
    NotFound { service: String, cred_type: String },
}

pub type Result<T> = std::result::Result<T, VaultError>;

// ============================================================================
// ENTRY
// ============================================================================

/// A stored credential. `value` is `None` unless explicitly decrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialEntry {
    pub service: String,
    pub cred_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

/// Input for storing a credential
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CredentialInput {
    pub service: String,
    pub cred_type: String,
    pub value: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
}

/// Vault statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultStats {
    pub entries: i64,
    pub kdf_version: u32,
}

// ============================================================================
// MODE
// ============================================================================

#[derive(Clone)]
enum VaultMode {
    Plaintext,
    Encrypted { key: [u8; DERIVED_KEY_LEN], kdf_version: u32 },
}

impl VaultMode {
    fn kdf_version(&self) -> u32 {
        match self {
            VaultMode::Plaintext => 0,
            VaultMode::Encrypted { kdf_version, .. } => *kdf_version,
        }
    }
}

fn scrypt_params(kdf_version: u32) -> Result<ScryptParams> {
    // v1: N=8192 (2^13), v2: N=16384 (2^14); r=8, p=1 for both
    let log_n = match kdf_version {
        1 => 13,
        2 => 14,
        other => return Err(VaultError::Kdf(format!("unknown kdf version {}", other))),
    };
    ScryptParams::new(log_n, 8, 1, DERIVED_KEY_LEN).map_err(|e| VaultError::Kdf(e.to_string()))
}

fn derive_key(password: &str, salt: &[u8], kdf_version: u32) -> Result<[u8; DERIVED_KEY_LEN]> {
    let mut key = [0u8; DERIVED_KEY_LEN];
    scrypt::scrypt(password.as_bytes(), salt, &scrypt_params(kdf_version)?, &mut key)
        .map_err(|e| VaultError::Kdf(e.to_string()))?;
    Ok(key)
}

// ============================================================================
// SEALING
// ============================================================================

/// Seal a secret: `IV(12) || TAG(16) || ciphertext`
fn seal(key: &[u8; DERIVED_KEY_LEN], plaintext: &str) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    // aes-gcm appends the tag to the ciphertext; repack as IV || TAG || body
    let sealed = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| VaultError::Encrypt(e.to_string()))?;
    let (body, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    let mut packed = Vec::with_capacity(NONCE_LEN + TAG_LEN + body.len());
    packed.extend_from_slice(&nonce_bytes);
    packed.extend_from_slice(tag);
    packed.extend_from_slice(body);
    Ok(packed)
}

fn unseal(key: &[u8; DERIVED_KEY_LEN], packed: &[u8]) -> Result<String> {
    if packed.len() < NONCE_LEN + TAG_LEN {
        return Err(VaultError::Decrypt);
    }
    let (nonce_bytes, rest) = packed.split_at(NONCE_LEN);
    let (tag, body) = rest.split_at(TAG_LEN);

    let mut sealed = Vec::with_capacity(body.len() + TAG_LEN);
    sealed.extend_from_slice(body);
    sealed.extend_from_slice(tag);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), sealed.as_ref())
        .map_err(|_| VaultError::Decrypt)?;
    String::from_utf8(plaintext).map_err(|_| VaultError::Decrypt)
}

// ============================================================================
// VAULT
// ============================================================================

/// Encrypted service-credential store
pub struct CredentialVault {
    conn: Mutex<Connection>,
    mode: Mutex<VaultMode>,
    /// Password retained only while a legacy vault awaits migration
    pending_migration: Mutex<Option<String>>,
    path: PathBuf,
}

impl CredentialVault {
    /// Open (or create) the vault. An empty or short `key` selects
    /// plaintext mode.
    pub fn open(path: impl AsRef<Path>, key: Option<&str>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;

             CREATE TABLE IF NOT EXISTS vault_meta (
                 key TEXT PRIMARY KEY,
                 value TEXT NOT NULL
             );

             CREATE TABLE IF NOT EXISTS credentials (
                 service TEXT NOT NULL,
                 cred_type TEXT NOT NULL,
                 value BLOB NOT NULL,
                 url TEXT,
                 notes TEXT,
                 created INTEGER NOT NULL,
                 updated INTEGER NOT NULL,
                 expires INTEGER,
                 PRIMARY KEY (service, cred_type)
             );",
        )?;

        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        let password = key.filter(|k| k.len() >= MIN_KEY_LEN);
        let stored_version = Self::read_meta(&conn, "kdf_version")?
            .and_then(|v| v.parse::<u32>().ok());
        let row_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM credentials", [], |row| row.get(0))?;

        let mut pending_migration = None;
        let mode = match (stored_version, password) {
            // Explicit plaintext vault: a supplied key is ignored
            (Some(0), supplied) => {
                if supplied.is_some() {
                    tracing::warn!(
                        "Vault at {} is marked plaintext; the supplied key is ignored",
                        path.display()
                    );
                }
                VaultMode::Plaintext
            }
            (Some(version @ (1 | 2)), Some(password)) => {
                let salt = Self::read_salt(&conn)?;
                VaultMode::Encrypted {
                    key: derive_key(password, &salt, version)?,
                    kdf_version: version,
                }
            }
            (Some(version @ (1 | 2)), None) => {
                return Err(VaultError::Locked(format!(
                    "vault uses kdf v{} but no key was supplied",
                    version
                )));
            }
            (Some(other), _) => {
                return Err(VaultError::Locked(format!(
                    "vault uses unsupported kdf v{}",
                    other
                )));
            }
            // Fresh vault: stamp the current mode
            (None, supplied) if row_count == 0 => match supplied {
                Some(password) => {
                    let mut salt = [0u8; SALT_LEN];
                    rand::thread_rng().fill_bytes(&mut salt);
                    Self::write_meta(&conn, 2, &salt)?;
                    VaultMode::Encrypted {
                        key: derive_key(password, &salt, 2)?,
                        kdf_version: 2,
                    }
                }
                None => {
                    Self::write_meta(&conn, 0, &[])?;
                    VaultMode::Plaintext
                }
            },
            // Pre-metadata vault with rows: legacy v1, migrate lazily
            (None, Some(password)) => {
                tracing::info!(
                    "Vault at {} has no metadata; assuming legacy v1 and scheduling migration",
                    path.display()
                );
                pending_migration = Some(password.to_string());
                VaultMode::Encrypted {
                    key: derive_key(password, &LEGACY_V1_SALT, 1)?,
                    kdf_version: 1,
                }
            }
            (None, None) => {
                return Err(VaultError::Locked(
                    "vault has existing rows and no metadata; refusing to open without a key"
                        .into(),
                ));
            }
        };

        Ok(Self {
            conn: Mutex::new(conn),
            mode: Mutex::new(mode),
            pending_migration: Mutex::new(pending_migration),
            path,
        })
    }

    /// Store (insert or replace) a credential
    pub fn store(&self, input: &CredentialInput) -> Result<()> {
        let sealed = self.seal_value(&input.value)?;
        let now = Utc::now().timestamp();
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO credentials (service, cred_type, value, url, notes, created, updated, expires)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7)
             ON CONFLICT(service, cred_type) DO UPDATE SET
                 value = excluded.value,
                 url = excluded.url,
                 notes = excluded.notes,
                 updated = excluded.updated,
                 expires = excluded.expires",
            params![
                input.service,
                input.cred_type,
                sealed,
                input.url,
                input.notes,
                now,
                input.expires.map(|t| t.timestamp()),
            ],
        )?;
        Ok(())
    }

    /// Store only when no credential exists for (service, type), including
    /// under the underscore/hyphen spelling of the service used by older
    /// installs. Returns true when a row was inserted.
    pub fn store_if_new(&self, input: &CredentialInput) -> Result<bool> {
        {
            let conn = self.lock_conn()?;
            for alias in service_aliases(&input.service) {
                let exists: Option<i64> = conn
                    .query_row(
                        "SELECT 1 FROM credentials WHERE service = ?1 AND cred_type = ?2",
                        params![alias, input.cred_type],
                        |row| row.get(0),
                    )
                    .optional()?;
                if exists.is_some() {
                    return Ok(false);
                }
            }
        }

        let sealed = self.seal_value(&input.value)?;
        let now = Utc::now().timestamp();
        let conn = self.lock_conn()?;
        let inserted = conn.execute(
            "INSERT INTO credentials (service, cred_type, value, url, notes, created, updated, expires)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7)
             ON CONFLICT(service, cred_type) DO NOTHING",
            params![
                input.service,
                input.cred_type,
                sealed,
                input.url,
                input.notes,
                now,
                input.expires.map(|t| t.timestamp()),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Fetch and decrypt one credential. The first successful decrypt of a
    /// legacy vault triggers the v2 re-encryption migration.
    pub fn get(&self, service: &str, cred_type: &str) -> Result<CredentialEntry> {
        let row = {
            let conn = self.lock_conn()?;
            conn.query_row(
                "SELECT service, cred_type, value, url, notes, created, updated, expires
                 FROM credentials WHERE service = ?1 AND cred_type = ?2",
                params![service, cred_type],
                Self::row_to_raw,
            )
            .optional()?
        };

        let (mut entry, sealed) = row.ok_or_else(|| VaultError::NotFound {
            service: service.to_string(),
            cred_type: cred_type.to_string(),
        })?;

        entry.value = Some(self.unseal_value(&sealed)?);

        // Password proven correct; finish the legacy migration if one is due
        self.migrate_if_pending()?;

        Ok(entry)
    }

    /// True when a credential exists for (service, type)
    pub fn exists(&self, service: &str, cred_type: &str) -> Result<bool> {
        let conn = self.lock_conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM credentials WHERE service = ?1 AND cred_type = ?2",
                params![service, cred_type],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Metadata-only listing; secret values stay redacted
    pub fn list(&self) -> Result<Vec<CredentialEntry>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT service, cred_type, value, url, notes, created, updated, expires
             FROM credentials ORDER BY service, cred_type",
        )?;
        let entries = stmt
            .query_map([], Self::row_to_raw)?
            .filter_map(|r| r.ok())
            .map(|(entry, _)| entry)
            .collect();
        Ok(entries)
    }

    /// Decrypted listing; used sparingly (export paths)
    pub fn list_all(&self) -> Result<Vec<CredentialEntry>> {
        let raw: Vec<(CredentialEntry, Vec<u8>)> = {
            let conn = self.lock_conn()?;
            let mut stmt = conn.prepare(
                "SELECT service, cred_type, value, url, notes, created, updated, expires
                 FROM credentials ORDER BY service, cred_type",
            )?;
            let collected = stmt
                .query_map([], Self::row_to_raw)?
                .filter_map(|r| r.ok())
                .collect();
            collected
        };

        let mut entries = Vec::with_capacity(raw.len());
        for (mut entry, sealed) in raw {
            entry.value = Some(self.unseal_value(&sealed)?);
            entries.push(entry);
        }
        self.migrate_if_pending()?;
        Ok(entries)
    }

    /// Delete a credential; returns true when a row was removed
    pub fn delete(&self, service: &str, cred_type: &str) -> Result<bool> {
        let conn = self.lock_conn()?;
        let deleted = conn.execute(
            "DELETE FROM credentials WHERE service = ?1 AND cred_type = ?2",
            params![service, cred_type],
        )?;
        Ok(deleted > 0)
    }

    pub fn stats(&self) -> Result<VaultStats> {
        let entries = {
            let conn = self.lock_conn()?;
            conn.query_row("SELECT COUNT(*) FROM credentials", [], |row| row.get(0))?
        };
        let kdf_version = self.lock_mode()?.kdf_version();
        Ok(VaultStats { entries, kdf_version })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| VaultError::Locked("connection lock poisoned".into()))
    }

    fn lock_mode(&self) -> Result<std::sync::MutexGuard<'_, VaultMode>> {
        self.mode
            .lock()
            .map_err(|_| VaultError::Locked("mode lock poisoned".into()))
    }

    fn seal_value(&self, value: &str) -> Result<Vec<u8>> {
        match &*self.lock_mode()? {
            VaultMode::Plaintext => Ok(value.as_bytes().to_vec()),
            VaultMode::Encrypted { key, .. } => seal(key, value),
        }
    }

    fn unseal_value(&self, sealed: &[u8]) -> Result<String> {
        match &*self.lock_mode()? {
            VaultMode::Plaintext => {
                String::from_utf8(sealed.to_vec()).map_err(|_| VaultError::Decrypt)
            }
            VaultMode::Encrypted { key, .. } => unseal(key, sealed),
        }
    }

    /// Re-encrypt every row under a fresh v2 key in one transaction, then
    /// forget the retained password.
    fn migrate_if_pending(&self) -> Result<()> {
        let password = {
            let mut pending = self
                .pending_migration
                .lock()
                .map_err(|_| VaultError::Locked("migration lock poisoned".into()))?;
            match pending.take() {
                Some(p) => p,
                None => return Ok(()),
            }
        };

        let old_key = match &*self.lock_mode()? {
            VaultMode::Encrypted { key, .. } => *key,
            VaultMode::Plaintext => return Ok(()),
        };

        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let new_key = derive_key(&password, &salt, 2)?;

        {
            let mut conn = self.lock_conn()?;
            let tx = conn.transaction()?;
            let rows: Vec<(String, String, Vec<u8>)> = {
                let mut stmt =
                    tx.prepare("SELECT service, cred_type, value FROM credentials")?;
                let collected = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                    .filter_map(|r| r.ok())
                    .collect();
                collected
            };

            for (service, cred_type, sealed) in rows {
                let plaintext = unseal(&old_key, &sealed)?;
                let resealed = seal(&new_key, &plaintext)?;
                tx.execute(
                    "UPDATE credentials SET value = ?1 WHERE service = ?2 AND cred_type = ?3",
                    params![resealed, service, cred_type],
                )?;
            }

            tx.execute(
                "INSERT INTO vault_meta (key, value) VALUES ('kdf_version', '2')
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [],
            )?;
            tx.execute(
                "INSERT INTO vault_meta (key, value) VALUES ('salt', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![hex_encode(&salt)],
            )?;
            tx.commit()?;
        }

        *self.lock_mode()? = VaultMode::Encrypted {
            key: new_key,
            kdf_version: 2,
        };
        tracing::info!("Vault migrated to kdf v2");
        Ok(())
    }

    fn read_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
        Ok(conn
            .query_row(
                "SELECT value FROM vault_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn read_salt(conn: &Connection) -> Result<Vec<u8>> {
        match Self::read_meta(conn, "salt")? {
            Some(hex) => hex_decode(&hex).ok_or_else(|| VaultError::Kdf("corrupt salt".into())),
            None => Ok(LEGACY_V1_SALT.to_vec()),
        }
    }

    fn write_meta(conn: &Connection, kdf_version: u32, salt: &[u8]) -> Result<()> {
        conn.execute(
            "INSERT INTO vault_meta (key, value) VALUES ('kdf_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![kdf_version.to_string()],
        )?;
        if !salt.is_empty() {
            conn.execute(
                "INSERT INTO vault_meta (key, value) VALUES ('salt', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![hex_encode(salt)],
            )?;
        }
        Ok(())
    }

    fn row_to_raw(row: &rusqlite::Row) -> rusqlite::Result<(CredentialEntry, Vec<u8>)> {
        let sealed: Vec<u8> = row.get(2)?;
        let created: i64 = row.get(5)?;
        let updated: i64 = row.get(6)?;
        let expires: Option<i64> = row.get(7)?;
        Ok((
            CredentialEntry {
                service: row.get(0)?,
                cred_type: row.get(1)?,
                value: None,
                url: row.get(3)?,
                notes: row.get(4)?,
                created: DateTime::from_timestamp(created, 0).unwrap_or_else(Utc::now),
                updated: DateTime::from_timestamp(updated, 0).unwrap_or_else(Utc::now),
                expires: expires.and_then(|t| DateTime::from_timestamp(t, 0)),
            },
            sealed,
        ))
    }
}

/// The service name and its underscore/hyphen-swapped spelling
fn service_aliases(service: &str) -> Vec<String> {
    let mut aliases = vec![service.to_string()];
    if service.contains('_') {
        aliases.push(service.replace('_', "-"));
    }
    if service.contains('-') {
        aliases.push(service.replace('-', "_"));
    }
    aliases
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const KEY: &str = "correct horse battery staple";

    fn input(service: &str, value: &str) -> CredentialInput {
        CredentialInput {
            service: service.to_string(),
            cred_type: "api_key".to_string(),
            value: value.to_string(),
            url: None,
            notes: None,
            expires: None,
        }
    }

    #[test]
    fn test_seal_unseal_roundtrip() {
        let key = [0x42u8; DERIVED_KEY_LEN];
        let packed = seal(&key, "hunter42").unwrap();
        assert!(packed.len() > NONCE_LEN + TAG_LEN);
        assert_eq!(unseal(&key, &packed).unwrap(), "hunter42");

        let wrong = [0x43u8; DERIVED_KEY_LEN];
        assert!(matches!(unseal(&wrong, &packed), Err(VaultError::Decrypt)));
    }

    #[test]
    fn test_store_get_roundtrip_encrypted() {
        let dir = tempdir().unwrap();
        let vault = CredentialVault::open(dir.path().join("vault.db"), Some(KEY)).unwrap();

        vault.store(&input("github", "ghp_secret")).unwrap();
        let entry = vault.get("github", "api_key").unwrap();
        assert_eq!(entry.value.as_deref(), Some("ghp_secret"));
        assert_eq!(vault.stats().unwrap().kdf_version, 2);
    }

    #[test]
    fn test_short_key_is_plaintext() {
        let dir = tempdir().unwrap();
        let vault = CredentialVault::open(dir.path().join("vault.db"), Some("short")).unwrap();
        assert_eq!(vault.stats().unwrap().kdf_version, 0);

        vault.store(&input("github", "visible")).unwrap();
        assert_eq!(
            vault.get("github", "api_key").unwrap().value.as_deref(),
            Some("visible")
        );
    }

    #[test]
    fn test_list_redacts_values() {
        let dir = tempdir().unwrap();
        let vault = CredentialVault::open(dir.path().join("vault.db"), Some(KEY)).unwrap();
        vault.store(&input("github", "secret")).unwrap();

        let listed = vault.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].value.is_none());

        let full = vault.list_all().unwrap();
        assert_eq!(full[0].value.as_deref(), Some("secret"));
    }

    #[test]
    fn test_store_if_new_respects_aliases() {
        let dir = tempdir().unwrap();
        let vault = CredentialVault::open(dir.path().join("vault.db"), Some(KEY)).unwrap();

        assert!(vault.store_if_new(&input("my_service", "v1")).unwrap());
        // Hyphen spelling of the same service counts as existing
        assert!(!vault.store_if_new(&input("my-service", "v2")).unwrap());
        // Exact duplicate also skipped
        assert!(!vault.store_if_new(&input("my_service", "v3")).unwrap());

        assert_eq!(
            vault.get("my_service", "api_key").unwrap().value.as_deref(),
            Some("v1")
        );
    }

    #[test]
    fn test_wrong_key_fails_decrypt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.db");
        {
            let vault = CredentialVault::open(&path, Some(KEY)).unwrap();
            vault.store(&input("github", "secret")).unwrap();
        }
        let vault = CredentialVault::open(&path, Some("a different long password")).unwrap();
        assert!(matches!(
            vault.get("github", "api_key"),
            Err(VaultError::Decrypt)
        ));
    }

    #[test]
    fn test_plaintext_vault_ignores_supplied_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.db");
        {
            let vault = CredentialVault::open(&path, None).unwrap();
            vault.store(&input("github", "open")).unwrap();
        }
        // Reopen with a key: metadata says plaintext, key is ignored
        let vault = CredentialVault::open(&path, Some(KEY)).unwrap();
        assert_eq!(vault.stats().unwrap().kdf_version, 0);
        assert_eq!(
            vault.get("github", "api_key").unwrap().value.as_deref(),
            Some("open")
        );
    }

    #[test]
    fn test_refuses_rows_without_metadata_or_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE vault_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
                 CREATE TABLE credentials (
                     service TEXT NOT NULL, cred_type TEXT NOT NULL, value BLOB NOT NULL,
                     url TEXT, notes TEXT, created INTEGER NOT NULL, updated INTEGER NOT NULL,
                     expires INTEGER, PRIMARY KEY (service, cred_type));
                 INSERT INTO credentials VALUES ('svc', 'api_key', x'00', NULL, NULL, 0, 0, NULL);",
            )
            .unwrap();
        }
        assert!(matches!(
            CredentialVault::open(&path, None),
            Err(VaultError::Locked(_))
        ));
    }

    #[test]
    fn test_legacy_vault_migrates_on_first_get() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.db");

        // Build a legacy vault: rows sealed under the v1 fixed-salt key,
        // no metadata at all.
        let legacy_key = derive_key(KEY, &LEGACY_V1_SALT, 1).unwrap();
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE vault_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
                 CREATE TABLE credentials (
                     service TEXT NOT NULL, cred_type TEXT NOT NULL, value BLOB NOT NULL,
                     url TEXT, notes TEXT, created INTEGER NOT NULL, updated INTEGER NOT NULL,
                     expires INTEGER, PRIMARY KEY (service, cred_type));",
            )
            .unwrap();
            let sealed = seal(&legacy_key, "legacy_secret").unwrap();
            conn.execute(
                "INSERT INTO credentials (service, cred_type, value, created, updated)
                 VALUES ('old', 'api_key', ?1, 0, 0)",
                params![sealed],
            )
            .unwrap();
        }

        let vault = CredentialVault::open(&path, Some(KEY)).unwrap();
        assert_eq!(vault.stats().unwrap().kdf_version, 1);

        // First successful get proves the password and migrates
        let entry = vault.get("old", "api_key").unwrap();
        assert_eq!(entry.value.as_deref(), Some("legacy_secret"));
        assert_eq!(vault.stats().unwrap().kdf_version, 2);

        // Reopen: metadata now drives v2 and the secret still decrypts
        drop(vault);
        let vault = CredentialVault::open(&path, Some(KEY)).unwrap();
        assert_eq!(vault.stats().unwrap().kdf_version, 2);
        assert_eq!(
            vault.get("old", "api_key").unwrap().value.as_deref(),
            Some("legacy_secret")
        );
    }

    #[test]
    fn test_delete_and_exists() {
        let dir = tempdir().unwrap();
        let vault = CredentialVault::open(dir.path().join("vault.db"), Some(KEY)).unwrap();

        vault.store(&input("github", "x")).unwrap();
        assert!(vault.exists("github", "api_key").unwrap());
        assert!(vault.delete("github", "api_key").unwrap());
        assert!(!vault.exists("github", "api_key").unwrap());
        assert!(!vault.delete("github", "api_key").unwrap());
    }
}
