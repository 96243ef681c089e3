//! Certificate unlock-password resolution
//!
//! Each `.p12` certificate bundle in the vault is accompanied by a sibling
//! `.pass` file sharing its base name. The pass file holds the bundle's
//! unlock password; there is no fallback and no default password, because
//! importing a certificate we cannot unlock would leave the build keychain
//! silently unusable.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Recognized certificate bundle extension
pub const CERTIFICATE_EXTENSION: &str = "p12";

/// Extension of the sibling password file
pub const PASSFILE_EXTENSION: &str = "pass";

/// Errors during password resolution
#[derive(Debug, Error)]
pub enum SecretError {
    /// The certificate name does not carry the `.p12` extension
    #[error("unrecognized certificate bundle name '{0}' (expected a '.{CERTIFICATE_EXTENSION}' file)")]
    UnrecognizedCertificate(String),

    /// No sibling `.pass` file exists for the certificate
    #[error(
        "no .pass file found for {certificate}. To fix this, create a file at \
         {} containing the password for {certificate}",
        .expected_path.display()
    )]
    MissingSecretFile {
        /// The certificate the password was requested for
        certificate: String,
        /// Where the pass file was expected
        expected_path: PathBuf,
    },

    #[error("failed to read pass file: {0}")]
    Io(#[from] io::Error),
}

/// Resolve the unlock password for a certificate bundle.
///
/// Looks for `<base>.pass` next to `<base>.p12` in `source` and returns its
/// trimmed contents. Purely a read; no side effects.
pub fn resolve_certificate_password(
    source: &Path,
    certificate_name: &str,
) -> Result<String, SecretError> {
    let name = Path::new(certificate_name);
    if name.extension().and_then(|e| e.to_str()) != Some(CERTIFICATE_EXTENSION) {
        return Err(SecretError::UnrecognizedCertificate(
            certificate_name.to_string(),
        ));
    }

    let passfile = source.join(name.with_extension(PASSFILE_EXTENSION));
    if !passfile.exists() {
        return Err(SecretError::MissingSecretFile {
            certificate: certificate_name.to_string(),
            expected_path: passfile,
        });
    }

    let contents = fs::read_to_string(&passfile)?;
    Ok(contents.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolves_trimmed_password() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("dist.p12"), b"binary").unwrap();
        fs::write(dir.path().join("dist.pass"), "s3cret\n").unwrap();

        let password = resolve_certificate_password(dir.path(), "dist.p12").unwrap();
        assert_eq!(password, "s3cret");
    }

    #[test]
    fn test_missing_pass_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("dist.p12"), b"binary").unwrap();

        let err = resolve_certificate_password(dir.path(), "dist.p12").unwrap_err();
        match err {
            SecretError::MissingSecretFile {
                certificate,
                expected_path,
            } => {
                assert_eq!(certificate, "dist.p12");
                assert_eq!(expected_path, dir.path().join("dist.pass"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_pass_file_message_names_remedy() {
        let dir = TempDir::new().unwrap();
        let err = resolve_certificate_password(dir.path(), "dist.p12").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("dist.pass"));
        assert!(message.contains("create a file"));
    }

    #[test]
    fn test_rejects_non_p12_name() {
        let dir = TempDir::new().unwrap();
        let err = resolve_certificate_password(dir.path(), "dist.cer").unwrap_err();
        assert!(matches!(err, SecretError::UnrecognizedCertificate(_)));
    }

    #[test]
    fn test_pass_file_does_not_need_certificate_present() {
        // Resolution only reads the pass file; the .p12 itself is checked by
        // the import step.
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("adhoc.pass"), "pw").unwrap();

        let password = resolve_certificate_password(dir.path(), "adhoc.p12").unwrap();
        assert_eq!(password, "pw");
    }
}
