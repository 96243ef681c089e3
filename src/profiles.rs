//! Provisioning profile staging
//!
//! Profiles are opaque files copied from a source vault into the platform
//! profile directory (`~/Library/MobileDevice/Provisioning Profiles`) before
//! the build and removed again afterwards. Order is preserved: a later entry
//! with the same file name legitimately overwrites an earlier one on disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Platform profile directory, relative to the user's home
pub const PROFILE_DIR_SUFFIX: &str = "Library/MobileDevice/Provisioning Profiles";

/// Errors from profile staging
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("no home directory found for provisioning profile destination")]
    NoHomeDirectory,

    #[error("failed to copy profile {name} from {}: {reason}", .source_dir.display())]
    CopyFailed {
        /// Profile file name
        name: String,
        /// Source directory it was copied from
        source_dir: PathBuf,
        /// Underlying IO failure
        reason: io::Error,
    },

    #[error("failed to remove staged profile(s): {}", .paths.join(", "))]
    RemovalFailed {
        /// Display paths of the profiles that could not be removed
        paths: Vec<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Copies profiles into, and removes them from, the platform directory.
pub struct ProfileStager {
    destination: PathBuf,
}

impl ProfileStager {
    /// Stager targeting the platform profile directory.
    pub fn new() -> Result<Self, ProfileError> {
        let destination = dirs::home_dir()
            .ok_or(ProfileError::NoHomeDirectory)?
            .join(PROFILE_DIR_SUFFIX);
        Ok(Self { destination })
    }

    /// Stager targeting an explicit directory. Used by tests and by callers
    /// that relocate the profile directory.
    pub fn with_destination(destination: PathBuf) -> Self {
        Self { destination }
    }

    /// Directory profiles are staged into
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Copy each named profile from `source` into the destination, in order.
    ///
    /// The first copy failure aborts the remaining copies and propagates;
    /// profiles staged earlier in the list stay staged (no rollback), so a
    /// subsequent unstage can still remove them.
    pub fn stage(&self, source: &Path, names: &[String]) -> Result<(), ProfileError> {
        fs::create_dir_all(&self.destination)?;

        for name in names {
            let from = source.join(name);
            let to = self.destination.join(name);
            fs::copy(&from, &to).map_err(|reason| ProfileError::CopyFailed {
                name: name.clone(),
                source_dir: source.to_path_buf(),
                reason,
            })?;
        }

        Ok(())
    }

    /// Remove each named profile from the destination.
    ///
    /// A profile that is already absent is not an error (supports partial and
    /// repeated cleanup). Every name is attempted; removal failures are
    /// collected and reported together.
    pub fn unstage(&self, names: &[String]) -> Result<(), ProfileError> {
        let mut failed = Vec::new();

        for name in names {
            let path = self.destination.join(name);
            if !path.exists() {
                continue;
            }
            if fs::remove_file(&path).is_err() {
                failed.push(path.display().to_string());
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(ProfileError::RemovalFailed { paths: failed })
        }
    }
}
