//! Ephemeral build keychain management
//!
//! A build gets exactly one throwaway keychain: created before the first
//! signing step, destroyed by cleanup afterwards. The keychain lives under a
//! build-local directory (`.build/keychain` by default) with a random file
//! name and a random password that is held only in memory for the lifetime of
//! the run — never written to disk, never logged.
//!
//! The actual `security` invocations are behind the [`KeychainService`] trait
//! so the lifecycle can be exercised without touching the host keychain
//! subsystem.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use rand::Rng;
use thiserror::Error;

/// File extension for build keychains
pub const KEYCHAIN_EXTENSION: &str = "keychain";

/// Errors from keychain operations
#[derive(Debug, Error)]
pub enum KeychainError {
    #[error("keychain creation failed: {0}")]
    CreationFailed(String),

    #[error("certificate import failed for {}: {reason}", .certificate.display())]
    ImportFailed {
        /// Path of the certificate bundle that failed to import
        certificate: PathBuf,
        /// Collaborator-reported reason
        reason: String,
    },

    #[error("keychain deletion failed for {}: {reason}", .path.display())]
    DeletionFailed {
        /// Path of the keychain that could not be deleted
        path: PathBuf,
        /// Collaborator-reported reason
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// External keychain-management collaborator.
///
/// The host keychain subsystem is treated as an opaque service invoked by
/// name, path, and password. Implementations must not retain the passwords
/// they are handed.
pub trait KeychainService {
    /// Create, unlock, and register a keychain for search, with no auto-lock
    /// timeout.
    fn create_keychain(&self, path: &Path, password: &str) -> Result<(), KeychainError>;

    /// Import one certificate bundle into the keychain.
    fn import_certificate(
        &self,
        keychain_path: &Path,
        keychain_password: &str,
        certificate_path: &Path,
        certificate_password: &str,
    ) -> Result<(), KeychainError>;

    /// Delete the keychain. Deleting an already-deleted keychain is expected
    /// to surface an error from the subsystem; policy belongs to the caller.
    fn delete_keychain(&self, path: &Path) -> Result<(), KeychainError>;
}

/// `KeychainService` backed by the macOS `security` command-line tool.
#[derive(Debug, Default)]
pub struct SecurityCli;

impl SecurityCli {
    fn run(&self, args: &[&str]) -> Result<(), KeychainError> {
        let output = Command::new("security")
            .args(args)
            .output()
            .map_err(|e| KeychainError::CreationFailed(format!("failed to run security: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(KeychainError::CreationFailed(format!(
                "security {} failed: {}",
                args[0],
                stderr.trim()
            )));
        }

        Ok(())
    }
}

impl KeychainService for SecurityCli {
    fn create_keychain(&self, path: &Path, password: &str) -> Result<(), KeychainError> {
        let path_str = path.to_string_lossy();

        self.run(&["create-keychain", "-p", password, &path_str])?;
        self.run(&["unlock-keychain", "-p", password, &path_str])?;

        // No auto-lock timeout: omitting -t disables the lock timer entirely.
        self.run(&["set-keychain-settings", &path_str])?;

        // Register the keychain in the user search list so the signing tools
        // can find the imported identities.
        let list = Command::new("security")
            .args(["list-keychains", "-d", "user"])
            .output()
            .map_err(|e| KeychainError::CreationFailed(format!("failed to run security: {e}")))?;

        let mut keychains: Vec<String> = String::from_utf8_lossy(&list.stdout)
            .lines()
            .map(|line| line.trim().trim_matches('"').to_string())
            .filter(|line| !line.is_empty())
            .collect();
        keychains.push(path_str.to_string());

        let mut args = vec!["list-keychains", "-d", "user", "-s"];
        args.extend(keychains.iter().map(|s| s.as_str()));
        self.run(&args)?;

        Ok(())
    }

    fn import_certificate(
        &self,
        keychain_path: &Path,
        keychain_password: &str,
        certificate_path: &Path,
        certificate_password: &str,
    ) -> Result<(), KeychainError> {
        let output = Command::new("security")
            .arg("import")
            .arg(certificate_path)
            .args(["-P", certificate_password])
            .arg("-k")
            .arg(keychain_path)
            .args(["-T", "/usr/bin/codesign", "-T", "/usr/bin/security"])
            .output()
            .map_err(|e| KeychainError::ImportFailed {
                certificate: certificate_path.to_path_buf(),
                reason: format!("failed to run security: {e}"),
            })?;

        if !output.status.success() {
            return Err(KeychainError::ImportFailed {
                certificate: certificate_path.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        // Allow codesign to use the imported key without a UI prompt.
        let partition = Command::new("security")
            .args([
                "set-key-partition-list",
                "-S",
                "apple-tool:,apple:,codesign:",
                "-s",
                "-k",
                keychain_password,
            ])
            .arg(keychain_path)
            .output()
            .map_err(|e| KeychainError::ImportFailed {
                certificate: certificate_path.to_path_buf(),
                reason: format!("failed to run security: {e}"),
            })?;

        if !partition.status.success() {
            return Err(KeychainError::ImportFailed {
                certificate: certificate_path.to_path_buf(),
                reason: String::from_utf8_lossy(&partition.stderr).trim().to_string(),
            });
        }

        Ok(())
    }

    fn delete_keychain(&self, path: &Path) -> Result<(), KeychainError> {
        let output = Command::new("security")
            .arg("delete-keychain")
            .arg(path)
            .output()
            .map_err(|e| KeychainError::DeletionFailed {
                path: path.to_path_buf(),
                reason: format!("failed to run security: {e}"),
            })?;

        if !output.status.success() {
            return Err(KeychainError::DeletionFailed {
                path: path.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// The ephemeral credential for one build.
///
/// Exclusively owned by the lifecycle that created it. The password is
/// intentionally not serializable and not printed by `Debug`.
pub struct Credential {
    /// Path of the keychain file
    pub keychain_path: PathBuf,
    /// Keychain unlock password, held in memory only
    pub keychain_password: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("keychain_path", &self.keychain_path)
            .field("keychain_password", &"<redacted>")
            .finish()
    }
}

/// Creates, provisions, and destroys the build keychain via an injected
/// [`KeychainService`].
pub struct CredentialStore<K: KeychainService> {
    service: K,
    keychain_dir: PathBuf,
}

impl<K: KeychainService> CredentialStore<K> {
    /// Create a store that places keychains under `keychain_dir`.
    pub fn new(service: K, keychain_dir: PathBuf) -> Self {
        Self {
            service,
            keychain_dir,
        }
    }

    /// Directory the store creates keychains in
    pub fn keychain_dir(&self) -> &Path {
        &self.keychain_dir
    }

    /// The underlying keychain service
    pub fn service(&self) -> &K {
        &self.service
    }

    /// Create the build keychain.
    ///
    /// Generates a random file name and password (8 random bytes each, hex
    /// encoded) and asks the service to create, unlock, and register it.
    pub fn create(&self) -> Result<Credential, KeychainError> {
        fs::create_dir_all(&self.keychain_dir)?;

        let keychain_path = self
            .keychain_dir
            .join(format!("{}.{KEYCHAIN_EXTENSION}", random_hex()));
        let keychain_password = random_hex();

        self.service.create_keychain(&keychain_path, &keychain_password)?;

        Ok(Credential {
            keychain_path,
            keychain_password,
        })
    }

    /// Import one certificate into the credential's keychain.
    ///
    /// Fail-fast: the error propagates to the caller, which must not attempt
    /// further imports. A partially-provisioned keychain is not usable.
    pub fn import_certificate(
        &self,
        credential: &Credential,
        certificate_path: &Path,
        certificate_password: &str,
    ) -> Result<(), KeychainError> {
        self.service.import_certificate(
            &credential.keychain_path,
            &credential.keychain_password,
            certificate_path,
            certificate_password,
        )
    }

    /// Delete the keychain at `path`.
    ///
    /// Not idempotent: deleting a keychain that no longer exists surfaces the
    /// subsystem's error. The lifecycle layer decides whether that is fatal.
    pub fn destroy(&self, path: &Path) -> Result<(), KeychainError> {
        self.service.delete_keychain(path)
    }
}

/// 8 random bytes, hex encoded (64 bits of entropy)
fn random_hex() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{KeychainOp, MockKeychain};
    use tempfile::TempDir;

    #[test]
    fn test_random_hex_length_and_charset() {
        let value = random_hex();
        assert_eq!(value.len(), 16);
        assert!(value.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(value, random_hex());
    }

    #[test]
    fn test_create_generates_fresh_identity() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(MockKeychain::default(), dir.path().join("keychain"));

        let first = store.create().unwrap();
        let second = store.create().unwrap();

        assert_ne!(first.keychain_path, second.keychain_path);
        assert_ne!(first.keychain_password, second.keychain_password);
        assert!(first
            .keychain_path
            .to_string_lossy()
            .ends_with(".keychain"));
        assert!(first.keychain_path.starts_with(dir.path().join("keychain")));
    }

    #[test]
    fn test_create_ensures_directory() {
        let dir = TempDir::new().unwrap();
        let keychain_dir = dir.path().join("nested/keychain");
        let store = CredentialStore::new(MockKeychain::default(), keychain_dir.clone());

        store.create().unwrap();
        assert!(keychain_dir.is_dir());
    }

    #[test]
    fn test_create_records_service_call() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(MockKeychain::default(), dir.path().to_path_buf());

        let credential = store.create().unwrap();
        let ops = store.service.operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            &ops[0],
            KeychainOp::Create { path } if *path == credential.keychain_path
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let credential = Credential {
            keychain_path: PathBuf::from("/tmp/x.keychain"),
            keychain_password: "topsecret".to_string(),
        };
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("topsecret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_destroy_propagates_service_error() {
        let dir = TempDir::new().unwrap();
        let mock = MockKeychain::default();
        mock.fail_next_delete("no such keychain");
        let store = CredentialStore::new(mock, dir.path().to_path_buf());

        let err = store.destroy(Path::new("/tmp/gone.keychain")).unwrap_err();
        assert!(matches!(err, KeychainError::DeletionFailed { .. }));
    }
}
