//! iOS Build Lane - ephemeral signing credentials and artifact publishing
//!
//! This crate automates the credential chores around an iOS build pipeline:
//! it provisions a throwaway signing keychain and stages provisioning
//! profiles before the build, guarantees their removal afterwards, and
//! publishes build and test artifacts to a network-attached store.

pub mod config;
pub mod context;
pub mod keychain;
pub mod lifecycle;
pub mod mock;
pub mod profiles;
pub mod publish;
pub mod repackage;
pub mod secret;

pub use config::LaneConfig;
pub use context::{ContextState, LaneContext};
pub use keychain::{Credential, CredentialStore, KeychainService, SecurityCli};
pub use lifecycle::{BuildCredentialLifecycle, CleanupError, SetupError, SetupRequest};
pub use profiles::ProfileStager;
pub use publish::{discover_build_artifacts, ArtifactPublisher, MountTable, PublishOutcome, ZipCli};
