//! Lane configuration
//!
//! Optional TOML configuration (`ios-lane.toml`) with built-in defaults
//! matching the conventional vault layout. Every value can also be supplied
//! or overridden on the command line; presence/non-emptiness of the required
//! inputs is validated by the component that consumes them, not here.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name
pub const DEFAULT_CONFIG_FILE: &str = "ios-lane.toml";

/// Errors loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Full lane configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    pub setup: SetupSection,
    pub cleanup: CleanupSection,
    pub publish: PublishSection,
}

/// Configuration for the setup/cleanup lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupSection {
    /// Directory containing the `.p12` bundles and `.pass` files
    pub certificate_source: PathBuf,

    /// Certificate file names to import, including the `.p12` extension
    pub certificate_names: Vec<String>,

    /// Directory containing the provisioning profiles
    pub provisioning_profile_source: PathBuf,

    /// Profile file names to stage, including the extension
    pub provisioning_profile_names: Vec<String>,

    /// Build-local directory the keychain (and lane context) live under
    pub keychain_directory: PathBuf,

    /// Emit progress messages while running
    pub verbose: bool,
}

impl Default for SetupSection {
    fn default() -> Self {
        Self {
            certificate_source: PathBuf::from("./ios-p12-vault"),
            certificate_names: Vec::new(),
            provisioning_profile_source: PathBuf::from("./ios-provisioning-profile-vault"),
            provisioning_profile_names: Vec::new(),
            keychain_directory: PathBuf::from(".build/keychain"),
            verbose: false,
        }
    }
}

/// Configuration for cleanup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupSection {
    /// Treat cleanup-without-setup as a no-op instead of an error
    pub fail_silently: bool,
}

/// Configuration for artifact publishing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishSection {
    /// Root directory on the artifact store all artifacts are placed under
    pub destination_root: PathBuf,

    /// Project name on the artifact store
    pub project_name: String,

    /// Directory the build places its outputs in
    pub build_output_directory: PathBuf,

    /// File extensions treated as build artifacts
    pub build_output_extensions: Vec<String>,

    /// Directory the test run places its output in
    pub test_output_directory: PathBuf,

    /// Base name of the test-result archive (without `.zip`)
    pub archive_name: String,

    /// Verify the destination is mounted before publishing
    pub require_mounted_destination: bool,
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            destination_root: PathBuf::new(),
            project_name: String::new(),
            build_output_directory: PathBuf::from(".build"),
            build_output_extensions: vec!["ipa".to_string(), "zip".to_string()],
            test_output_directory: PathBuf::from("test_output"),
            archive_name: "TestResults".to_string(),
            require_mounted_destination: false,
        }
    }
}

impl LaneConfig {
    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Load from `path` if given, from [`DEFAULT_CONFIG_FILE`] if it exists,
    /// or fall back to the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}
