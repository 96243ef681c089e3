//! Artifact publishing to network-attached storage
//!
//! Discovers build outputs by extension and test-result directories, then
//! copies them under `<destination_root>/<project>/ios-builds/<identifier>`
//! and `.../ios-tests/<identifier>`. Missing inputs are not errors — a build
//! that produced nothing simply publishes nothing. The destination is a
//! network mount, so the publisher can optionally verify it is mounted before
//! touching it instead of silently copying into an absent mount point.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use globset::{Glob, GlobSetBuilder};
use thiserror::Error;
use walkdir::WalkDir;

/// Destination subdirectory for build artifacts
pub const BUILDS_SUBDIR: &str = "ios-builds";

/// Destination subdirectory for test artifacts
pub const TESTS_SUBDIR: &str = "ios-tests";

/// Errors from the external archive/mount collaborators
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// External compression collaborator.
pub trait ArchiveService {
    /// Compress the contents of `directory` into the zip archive at `output`.
    fn zip_directory(&self, directory: &Path, output: &Path) -> Result<(), ArchiveError>;
}

/// `ArchiveService` backed by the `zip` command-line tool.
#[derive(Debug, Default)]
pub struct ZipCli;

impl ArchiveService for ZipCli {
    fn zip_directory(&self, directory: &Path, output: &Path) -> Result<(), ArchiveError> {
        let output_abs = if output.is_absolute() {
            output.to_path_buf()
        } else {
            std::env::current_dir()?.join(output)
        };

        let result = Command::new("zip")
            .arg("-r")
            .arg(&output_abs)
            .arg(".")
            .current_dir(directory)
            .output()
            .map_err(|e| ArchiveError::CommandFailed(format!("failed to run zip: {e}")))?;

        if !result.status.success() {
            return Err(ArchiveError::CommandFailed(format!(
                "zip -r {} failed: {}",
                output_abs.display(),
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }

        Ok(())
    }
}

/// Checks whether a destination path is currently backed by a mount.
pub trait MountCheck {
    fn is_mounted(&self, destination: &Path) -> Result<bool, ArchiveError>;
}

/// `MountCheck` reading the system mount table via `mount`.
#[derive(Debug, Default)]
pub struct MountTable;

impl MountCheck for MountTable {
    fn is_mounted(&self, destination: &Path) -> Result<bool, ArchiveError> {
        let output = Command::new("mount")
            .output()
            .map_err(|e| ArchiveError::CommandFailed(format!("failed to run mount: {e}")))?;

        let needle = destination.to_string_lossy();
        let table = String::from_utf8_lossy(&output.stdout);
        Ok(table.lines().any(|line| line.contains(needle.as_ref())))
    }
}

/// Errors during publishing
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid artifact extension pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// What a publish call actually did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Files were copied to the destination
    Published {
        /// Number of files placed at the destination
        copied: usize,
    },
    /// No artifacts were found; nothing was copied
    NothingToPublish,
    /// Mount verification was required and the destination is not mounted
    DestinationNotMounted,
}

/// Discover build outputs in `directory` matching any of `extensions`.
///
/// Globs `directory/*.<ext>` per extension and unions the results, sorted.
/// No matches (or a missing directory) is a valid, empty result.
pub fn discover_build_artifacts(
    directory: &Path,
    extensions: &[String],
) -> Result<Vec<PathBuf>, PublishError> {
    let mut builder = GlobSetBuilder::new();
    for extension in extensions {
        builder.add(Glob::new(&format!("*.{extension}"))?);
    }
    let matcher = builder.build()?;

    let mut artifacts = Vec::new();
    if directory.is_dir() {
        for entry in fs::read_dir(directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if matcher.is_match(entry.file_name()) {
                artifacts.push(entry.path());
            }
        }
    }

    artifacts.sort();
    Ok(artifacts)
}

/// Copies and archives build outputs to the destination root.
pub struct ArtifactPublisher<A: ArchiveService, M: MountCheck> {
    archiver: A,
    mount: M,
    /// Verify the destination is mounted before any copy
    require_mounted: bool,
    verbose: bool,
}

impl<A: ArchiveService, M: MountCheck> ArtifactPublisher<A, M> {
    pub fn new(archiver: A, mount: M) -> Self {
        Self {
            archiver,
            mount,
            require_mounted: false,
            verbose: false,
        }
    }

    /// Require mount verification before publishing
    pub fn with_mount_verification(mut self, require: bool) -> Self {
        self.require_mounted = require;
        self
    }

    /// Emit progress messages to stderr while running
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Copy each discovered artifact into
    /// `destination_root/project/ios-builds/identifier`, overwriting
    /// pre-existing files of the same name. An empty artifact set publishes
    /// nothing and succeeds.
    pub fn publish_build(
        &self,
        artifacts: &[PathBuf],
        destination_root: &Path,
        project: &str,
        identifier: &str,
    ) -> Result<PublishOutcome, PublishError> {
        validate_destination(destination_root, project, identifier)?;

        if artifacts.is_empty() {
            if self.verbose {
                eprintln!("No build artifacts found; skipping publish.");
            }
            return Ok(PublishOutcome::NothingToPublish);
        }

        if let Some(outcome) = self.check_mount(destination_root)? {
            return Ok(outcome);
        }

        let destination = destination_root
            .join(project)
            .join(BUILDS_SUBDIR)
            .join(identifier);
        fs::create_dir_all(&destination)?;

        for artifact in artifacts {
            let file_name = artifact.file_name().ok_or_else(|| {
                PublishError::InvalidConfiguration(format!(
                    "artifact path has no file name: {}",
                    artifact.display()
                ))
            })?;

            if self.verbose {
                eprintln!(
                    "Copying {} to {} ...",
                    artifact.display(),
                    destination.display()
                );
            }
            fs::copy(artifact, destination.join(file_name))?;
        }

        Ok(PublishOutcome::Published {
            copied: artifacts.len(),
        })
    }

    /// Archive the test-output directory and copy the archive into
    /// `destination_root/project/ios-tests/identifier`.
    ///
    /// The archive is created inside the test-output directory, copied out,
    /// and then removed locally — it is a transient artifact that must not
    /// persist alongside the raw test output. A missing or empty test-output
    /// directory publishes nothing and succeeds.
    pub fn publish_tests(
        &self,
        test_output_dir: &Path,
        destination_root: &Path,
        project: &str,
        identifier: &str,
        archive_name: &str,
    ) -> Result<PublishOutcome, PublishError> {
        validate_destination(destination_root, project, identifier)?;
        if archive_name.is_empty() {
            return Err(PublishError::InvalidConfiguration(
                "archive_name must not be empty".to_string(),
            ));
        }

        if !directory_has_files(test_output_dir) {
            if self.verbose {
                eprintln!(
                    "Test output directory {} is empty; skipping publish.",
                    test_output_dir.display()
                );
            }
            return Ok(PublishOutcome::NothingToPublish);
        }

        if let Some(outcome) = self.check_mount(destination_root)? {
            return Ok(outcome);
        }

        let archive_path = test_output_dir.join(format!("{archive_name}.zip"));
        if self.verbose {
            eprintln!("Archiving {} ...", test_output_dir.display());
        }
        self.archiver.zip_directory(test_output_dir, &archive_path)?;

        let destination = destination_root
            .join(project)
            .join(TESTS_SUBDIR)
            .join(identifier);

        let copy_result: Result<(), PublishError> = (|| {
            fs::create_dir_all(&destination)?;
            fs::copy(&archive_path, destination.join(format!("{archive_name}.zip")))?;
            Ok(())
        })();

        // The local archive is removed whether or not the copy succeeded.
        let _ = fs::remove_file(&archive_path);
        copy_result?;

        Ok(PublishOutcome::Published { copied: 1 })
    }

    fn check_mount(&self, destination_root: &Path) -> Result<Option<PublishOutcome>, PublishError> {
        if !self.require_mounted {
            return Ok(None);
        }

        if self.mount.is_mounted(destination_root)? {
            if self.verbose {
                eprintln!("Destination {} is mounted.", destination_root.display());
            }
            Ok(None)
        } else {
            eprintln!(
                "Destination {} is not mounted; unable to transfer artifacts.",
                destination_root.display()
            );
            Ok(Some(PublishOutcome::DestinationNotMounted))
        }
    }
}

fn validate_destination(
    destination_root: &Path,
    project: &str,
    identifier: &str,
) -> Result<(), PublishError> {
    if destination_root.as_os_str().is_empty() {
        return Err(PublishError::InvalidConfiguration(
            "destination_root must not be empty".to_string(),
        ));
    }
    if project.is_empty() {
        return Err(PublishError::InvalidConfiguration(
            "project_name must not be empty".to_string(),
        ));
    }
    if identifier.is_empty() {
        return Err(PublishError::InvalidConfiguration(
            "identifier must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn directory_has_files(directory: &Path) -> bool {
    if !directory.is_dir() {
        return false;
    }
    WalkDir::new(directory)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .any(|entry| entry.file_type().is_file())
}
