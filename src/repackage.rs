//! Archive repackaging for security scanning
//!
//! Static-analysis scanners expect an uploaded iOS archive in a particular
//! shape: the `Products/Applications` directory renamed to `Payload` at the
//! archive root, and the whole archive contents compressed into a single
//! file. These operations restructure an `.xcarchive` accordingly and hand
//! the compression to the same [`ArchiveService`] the publisher uses.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::publish::{ArchiveError, ArchiveService};

/// Errors during repackaging
#[derive(Debug, Error)]
pub enum RepackageError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("archive has no {missing} directory: {}", .archive.display())]
    MalformedArchive {
        /// What was expected inside the archive
        missing: &'static str,
        /// The archive that was inspected
        archive: PathBuf,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Move `Products/Applications` to `Payload` at the archive root and remove
/// the then-empty `Products` directory.
pub fn flatten_archive(xcarchive_path: &Path) -> Result<(), RepackageError> {
    if xcarchive_path.as_os_str().is_empty() {
        return Err(RepackageError::InvalidConfiguration(
            "a non-empty xcarchive path must be provided".to_string(),
        ));
    }

    let products = xcarchive_path.join("Products");
    let applications = products.join("Applications");
    if !applications.is_dir() {
        return Err(RepackageError::MalformedArchive {
            missing: "Products/Applications",
            archive: xcarchive_path.to_path_buf(),
        });
    }

    fs::rename(&applications, xcarchive_path.join("Payload"))?;
    fs::remove_dir(&products)?;

    Ok(())
}

/// Compress the archive contents into `../<output_name>.<extension>` next to
/// the archive and return the output path.
pub fn compress_archive<A: ArchiveService>(
    archiver: &A,
    xcarchive_path: &Path,
    output_name: &str,
    extension: &str,
) -> Result<PathBuf, RepackageError> {
    if xcarchive_path.as_os_str().is_empty() {
        return Err(RepackageError::InvalidConfiguration(
            "a non-empty xcarchive path must be provided".to_string(),
        ));
    }
    if output_name.is_empty() {
        return Err(RepackageError::InvalidConfiguration(
            "a non-empty output file name must be provided".to_string(),
        ));
    }
    if !xcarchive_path.is_dir() {
        return Err(RepackageError::MalformedArchive {
            missing: "archive root",
            archive: xcarchive_path.to_path_buf(),
        });
    }

    let parent = xcarchive_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let output = parent.join(format!("{output_name}.{extension}"));

    archiver.zip_directory(xcarchive_path, &output)?;

    Ok(output)
}
