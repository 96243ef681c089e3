//! Test doubles for the external collaborators
//!
//! Deterministic, in-memory substitutes for the keychain subsystem, the
//! archiver, and the mount table. Each mock records the operations it was
//! asked to perform and supports one-shot failure injection, so tests can
//! assert both the happy path and the partial-failure policy without touching
//! the host system.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::keychain::{KeychainError, KeychainService};
use crate::publish::{ArchiveError, ArchiveService, MountCheck};

/// A recorded keychain operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeychainOp {
    Create { path: PathBuf },
    Import { certificate: PathBuf },
    Delete { path: PathBuf },
}

/// Injectable failures for [`MockKeychain`]
#[derive(Debug, Default)]
struct KeychainFailures {
    create: Option<String>,
    delete: Option<String>,
    /// Certificate file names whose import should fail
    imports: Vec<String>,
}

/// Recording keychain service.
///
/// Creating a keychain writes a marker file at the requested path and
/// deleting removes it, so tests can assert the on-disk lifetime invariant.
#[derive(Debug, Default)]
pub struct MockKeychain {
    operations: Mutex<Vec<KeychainOp>>,
    failures: Mutex<KeychainFailures>,
}

impl MockKeychain {
    /// All operations performed so far, in order
    pub fn operations(&self) -> Vec<KeychainOp> {
        self.operations.lock().unwrap().clone()
    }

    /// Certificate paths imported so far, in order
    pub fn imported(&self) -> Vec<PathBuf> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                KeychainOp::Import { certificate } => Some(certificate),
                _ => None,
            })
            .collect()
    }

    /// Make the next create call fail with `reason`
    pub fn fail_next_create(&self, reason: &str) {
        self.failures.lock().unwrap().create = Some(reason.to_string());
    }

    /// Make the next delete call fail with `reason`
    pub fn fail_next_delete(&self, reason: &str) {
        self.failures.lock().unwrap().delete = Some(reason.to_string());
    }

    /// Make imports of the given certificate file name fail
    pub fn fail_import_of(&self, file_name: &str) {
        self.failures
            .lock()
            .unwrap()
            .imports
            .push(file_name.to_string());
    }

    fn record(&self, op: KeychainOp) {
        self.operations.lock().unwrap().push(op);
    }
}

impl KeychainService for MockKeychain {
    fn create_keychain(&self, path: &Path, _password: &str) -> Result<(), KeychainError> {
        if let Some(reason) = self.failures.lock().unwrap().create.take() {
            return Err(KeychainError::CreationFailed(reason));
        }

        std::fs::write(path, b"mock keychain")?;
        self.record(KeychainOp::Create {
            path: path.to_path_buf(),
        });
        Ok(())
    }

    fn import_certificate(
        &self,
        _keychain_path: &Path,
        _keychain_password: &str,
        certificate_path: &Path,
        _certificate_password: &str,
    ) -> Result<(), KeychainError> {
        let file_name = certificate_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if self.failures.lock().unwrap().imports.contains(&file_name) {
            return Err(KeychainError::ImportFailed {
                certificate: certificate_path.to_path_buf(),
                reason: "injected import failure".to_string(),
            });
        }

        self.record(KeychainOp::Import {
            certificate: certificate_path.to_path_buf(),
        });
        Ok(())
    }

    fn delete_keychain(&self, path: &Path) -> Result<(), KeychainError> {
        if let Some(reason) = self.failures.lock().unwrap().delete.take() {
            return Err(KeychainError::DeletionFailed {
                path: path.to_path_buf(),
                reason,
            });
        }

        if !path.exists() {
            return Err(KeychainError::DeletionFailed {
                path: path.to_path_buf(),
                reason: "keychain does not exist".to_string(),
            });
        }

        std::fs::remove_file(path)?;
        self.record(KeychainOp::Delete {
            path: path.to_path_buf(),
        });
        Ok(())
    }
}

/// Recording archiver that writes a stub archive instead of invoking `zip`
#[derive(Debug, Default)]
pub struct MockArchiver {
    archived: Mutex<Vec<(PathBuf, PathBuf)>>,
    fail: Mutex<Option<String>>,
}

impl MockArchiver {
    /// (directory, output) pairs archived so far
    pub fn archived(&self) -> Vec<(PathBuf, PathBuf)> {
        self.archived.lock().unwrap().clone()
    }

    /// Make the next archive call fail with `reason`
    pub fn fail_next(&self, reason: &str) {
        *self.fail.lock().unwrap() = Some(reason.to_string());
    }
}

impl ArchiveService for MockArchiver {
    fn zip_directory(&self, directory: &Path, output: &Path) -> Result<(), ArchiveError> {
        if let Some(reason) = self.fail.lock().unwrap().take() {
            return Err(ArchiveError::CommandFailed(reason));
        }

        std::fs::write(output, b"mock archive")?;
        self.archived
            .lock()
            .unwrap()
            .push((directory.to_path_buf(), output.to_path_buf()));
        Ok(())
    }
}

/// Mount table stub with a fixed answer
#[derive(Debug)]
pub struct MockMount {
    mounted: bool,
}

impl MockMount {
    pub fn mounted() -> Self {
        Self { mounted: true }
    }

    pub fn unmounted() -> Self {
        Self { mounted: false }
    }
}

impl MountCheck for MockMount {
    fn is_mounted(&self, _destination: &Path) -> Result<bool, ArchiveError> {
        Ok(self.mounted)
    }
}
