//! Build credential lifecycle
//!
//! Orchestrates the keychain store and profile stager into a paired
//! setup/cleanup flow:
//!
//! - `setup` stages profiles, creates the build keychain, records both facts
//!   in the lane context, then imports certificates. Profiles come first
//!   because certificate import is the step most likely to fail at runtime
//!   (a missing `.pass` file, a malformed bundle); whatever setup managed to
//!   create must always remain undoable by cleanup.
//! - `cleanup` reads the context back, destroys the keychain, unstages the
//!   profiles, and clears the context. Both teardown steps are attempted
//!   even when one fails, and all failures are reported together.

use std::path::PathBuf;

use thiserror::Error;

use crate::context::{ContextError, LaneContext};
use crate::keychain::{Credential, CredentialStore, KeychainError, KeychainService};
use crate::profiles::{ProfileError, ProfileStager};
use crate::secret::{resolve_certificate_password, SecretError};

/// Errors during setup
#[derive(Debug, Error)]
pub enum SetupError {
    /// A required input is missing or empty; nothing was created.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Keychain(#[from] KeychainError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error("failed to persist lane context: {0}")]
    Context(#[from] ContextError),
}

/// Errors during cleanup
#[derive(Debug, Error)]
pub enum CleanupError {
    /// Cleanup ran without a prior setup (or after a previous cleanup).
    #[error(
        "no build keychain or provisioning profiles requiring cleanup found; \
         run setup before cleanup"
    )]
    NothingToCleanUp,

    /// Both teardown steps were attempted; at least one failed.
    #[error("teardown attempted every step but {} failed: {}", .failures.len(), .failures.join("; "))]
    TeardownPartialFailure {
        /// Rendered messages of each failed step
        failures: Vec<String>,
    },

    #[error("failed to persist lane context: {0}")]
    Context(#[from] ContextError),
}

/// Validated inputs for setup
#[derive(Debug, Clone)]
pub struct SetupRequest {
    /// Directory holding the `.p12` bundles and their `.pass` files
    pub certificate_source: PathBuf,

    /// Certificate file names to import, in order
    pub certificate_names: Vec<String>,

    /// Directory holding the provisioning profiles
    pub profile_source: PathBuf,

    /// Profile file names to stage, in order
    pub profile_names: Vec<String>,
}

impl SetupRequest {
    /// Check all four inputs are present and non-empty.
    fn validate(&self) -> Result<(), SetupError> {
        if self.certificate_source.as_os_str().is_empty() {
            return Err(SetupError::InvalidConfiguration(
                "certificate_source must not be empty".to_string(),
            ));
        }
        if self.certificate_names.is_empty() {
            return Err(SetupError::InvalidConfiguration(
                "certificate_names must contain at least one certificate".to_string(),
            ));
        }
        if self.profile_source.as_os_str().is_empty() {
            return Err(SetupError::InvalidConfiguration(
                "provisioning_profile_source must not be empty".to_string(),
            ));
        }
        if self.profile_names.is_empty() {
            return Err(SetupError::InvalidConfiguration(
                "provisioning_profile_names must contain at least one profile".to_string(),
            ));
        }
        Ok(())
    }
}

/// Paired setup/cleanup orchestrator for one build's signing credentials.
pub struct BuildCredentialLifecycle<K: KeychainService> {
    store: CredentialStore<K>,
    stager: ProfileStager,
    /// File the lane context is persisted to between pipeline steps, if any
    context_file: Option<PathBuf>,
    verbose: bool,
}

impl<K: KeychainService> BuildCredentialLifecycle<K> {
    pub fn new(store: CredentialStore<K>, stager: ProfileStager) -> Self {
        Self {
            store,
            stager,
            context_file: None,
            verbose: false,
        }
    }

    /// Persist the context to `path` at each state change, so setup and
    /// cleanup can run as separate pipeline invocations.
    pub fn with_context_file(mut self, path: PathBuf) -> Self {
        self.context_file = Some(path);
        self
    }

    /// Emit progress messages to stderr while running
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// The credential store backing this lifecycle
    pub fn store(&self) -> &CredentialStore<K> {
        &self.store
    }

    /// Provision the build: stage profiles, create the keychain, record both
    /// in the context, then import every certificate in order.
    ///
    /// The context is recorded (and persisted) before certificate import, so
    /// a mid-import failure leaves a configured, cleanable state behind — the
    /// error propagates, but cleanup can still undo everything setup created.
    pub fn setup(
        &self,
        request: &SetupRequest,
        context: &mut LaneContext,
    ) -> Result<Credential, SetupError> {
        request.validate()?;

        if self.verbose {
            eprintln!(
                "Staging {} provisioning profile(s) from {} ...",
                request.profile_names.len(),
                request.profile_source.display()
            );
        }
        self.stager
            .stage(&request.profile_source, &request.profile_names)?;

        if self.verbose {
            eprintln!(
                "Creating build keychain under {} ...",
                self.store.keychain_dir().display()
            );
        }
        let credential = self.store.create()?;

        context.configure(
            credential.keychain_path.clone(),
            request.profile_names.clone(),
        );
        self.persist(context)?;

        for name in &request.certificate_names {
            let certificate_path = request.certificate_source.join(name);
            let certificate_password =
                resolve_certificate_password(&request.certificate_source, name)?;

            if self.verbose {
                eprintln!("Importing {} ...", certificate_path.display());
            }
            self.store
                .import_certificate(&credential, &certificate_path, &certificate_password)?;
        }

        if self.verbose {
            eprintln!(
                "Finished build setup; keychain at {}.",
                credential.keychain_path.display()
            );
        }

        Ok(credential)
    }

    /// Tear down whatever setup created.
    ///
    /// With nothing recorded in the context, fails with
    /// [`CleanupError::NothingToCleanUp`] unless `fail_silently` — then it is
    /// a successful no-op. Otherwise both the keychain deletion and the
    /// profile removal are attempted regardless of each other's outcome, the
    /// context is cleared either way, and any failures are reported together.
    pub fn cleanup(
        &self,
        context: &mut LaneContext,
        fail_silently: bool,
    ) -> Result<(), CleanupError> {
        let Some((keychain_path, profile_names)) = context.clear() else {
            if fail_silently {
                return Ok(());
            }
            return Err(CleanupError::NothingToCleanUp);
        };

        // The context is cleared before teardown runs so a repeated cleanup
        // reports NothingToCleanUp instead of deleting twice.
        self.persist(context)?;

        if self.verbose {
            eprintln!("Deleting build keychain at {} ...", keychain_path.display());
        }
        let keychain_result = self.store.destroy(&keychain_path);

        if self.verbose {
            eprintln!("Removing {} staged profile(s) ...", profile_names.len());
        }
        let profile_result = self.stager.unstage(&profile_names);

        let failures: Vec<String> = [
            keychain_result.err().map(|e| e.to_string()),
            profile_result.err().map(|e| e.to_string()),
        ]
        .into_iter()
        .flatten()
        .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CleanupError::TeardownPartialFailure { failures })
        }
    }

    fn persist(&self, context: &LaneContext) -> Result<(), ContextError> {
        if let Some(path) = &self.context_file {
            context.write_to_file(path)?;
        }
        Ok(())
    }
}
