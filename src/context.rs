//! Cross-step build context
//!
//! Setup and cleanup run as separate steps of one build pipeline and hand the
//! keychain path and staged profile names across through this context. The
//! two facts are a single unit: they are recorded together when setup
//! configures the build and cleared together when cleanup tears it down.
//! Modeling the pair as one enum variant makes the "one key without the
//! other" state unrepresentable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Schema version for lane_context.json
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "ios-build-lane/lane_context@1";

/// File name the context is persisted under
pub const CONTEXT_FILE_NAME: &str = "lane_context.json";

/// Errors for context operations
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration state of the lane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ContextState {
    /// Nothing to clean up: before setup, or after cleanup
    Unconfigured,

    /// Setup has created the build credential and staged profiles
    Configured {
        /// Path of the build keychain
        keychain_path: PathBuf,
        /// Staged profile file names, in staging order
        profile_names: Vec<String>,
    },
}

/// Cross-step context (lane_context.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneContext {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// When the context was created
    pub created_at: DateTime<Utc>,

    /// When the state last changed
    pub updated_at: DateTime<Utc>,

    /// Current configuration state
    #[serde(flatten)]
    pub state: ContextState,
}

impl Default for LaneContext {
    fn default() -> Self {
        Self::new()
    }
}

impl LaneContext {
    /// Fresh, unconfigured context
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: now,
            updated_at: now,
            state: ContextState::Unconfigured,
        }
    }

    /// Record the keychain path and profile names as a pair.
    pub fn configure(&mut self, keychain_path: PathBuf, profile_names: Vec<String>) {
        self.state = ContextState::Configured {
            keychain_path,
            profile_names,
        };
        self.updated_at = Utc::now();
    }

    /// Clear both facts, returning them if the context was configured.
    pub fn clear(&mut self) -> Option<(PathBuf, Vec<String>)> {
        match std::mem::replace(&mut self.state, ContextState::Unconfigured) {
            ContextState::Unconfigured => None,
            ContextState::Configured {
                keychain_path,
                profile_names,
            } => {
                self.updated_at = Utc::now();
                Some((keychain_path, profile_names))
            }
        }
    }

    /// Borrow the configured pair, if any.
    pub fn configured(&self) -> Option<(&Path, &[String])> {
        match &self.state {
            ContextState::Unconfigured => None,
            ContextState::Configured {
                keychain_path,
                profile_names,
            } => Some((keychain_path.as_path(), profile_names.as_slice())),
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.state, ContextState::Configured { .. })
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write atomically to file (write-then-rename)
    pub fn write_to_file(&self, path: &Path) -> Result<(), ContextError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = self.to_json()?;
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &json)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Load from file, or a fresh unconfigured context when the file does
    /// not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self, ContextError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let json = fs::read_to_string(path)?;
        Ok(Self::from_json(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_context_is_unconfigured() {
        let context = LaneContext::new();
        assert!(!context.is_configured());
        assert!(context.configured().is_none());
        assert_eq!(context.schema_id, SCHEMA_ID);
    }

    #[test]
    fn test_configure_records_pair() {
        let mut context = LaneContext::new();
        context.configure(
            PathBuf::from("/tmp/build.keychain"),
            vec!["app.mobileprovision".to_string()],
        );

        let (keychain, profiles) = context.configured().unwrap();
        assert_eq!(keychain, Path::new("/tmp/build.keychain"));
        assert_eq!(profiles, ["app.mobileprovision".to_string()]);
    }

    #[test]
    fn test_clear_returns_pair_once() {
        let mut context = LaneContext::new();
        context.configure(PathBuf::from("/tmp/a.keychain"), vec!["p".to_string()]);

        let (keychain, profiles) = context.clear().unwrap();
        assert_eq!(keychain, PathBuf::from("/tmp/a.keychain"));
        assert_eq!(profiles, vec!["p".to_string()]);

        // Second clear has nothing to return.
        assert!(context.clear().is_none());
        assert!(!context.is_configured());
    }

    #[test]
    fn test_json_round_trip() {
        let mut context = LaneContext::new();
        context.configure(
            PathBuf::from("/tmp/b.keychain"),
            vec!["one".to_string(), "two".to_string()],
        );

        let json = context.to_json().unwrap();
        assert!(json.contains("\"state\": \"configured\""));

        let parsed = LaneContext::from_json(&json).unwrap();
        assert_eq!(parsed.state, context.state);
    }

    #[test]
    fn test_load_missing_file_yields_unconfigured() {
        let dir = TempDir::new().unwrap();
        let context = LaneContext::load_or_default(&dir.path().join(CONTEXT_FILE_NAME)).unwrap();
        assert!(!context.is_configured());
    }

    #[test]
    fn test_write_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONTEXT_FILE_NAME);

        let mut context = LaneContext::new();
        context.configure(PathBuf::from("/tmp/c.keychain"), vec!["p".to_string()]);
        context.write_to_file(&path).unwrap();

        let loaded = LaneContext::load_or_default(&path).unwrap();
        assert_eq!(loaded.state, context.state);
        // No stray temp file left behind.
        assert!(!path.with_extension("tmp").exists());
    }
}
