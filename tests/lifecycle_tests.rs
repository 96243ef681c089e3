//! Credential lifecycle integration tests
//!
//! Exercises the full setup/cleanup pair through the persisted lane context,
//! the way consecutive pipeline invocations would: each step loads the
//! context from disk, acts, and persists it back.

use std::fs;
use std::path::{Path, PathBuf};

use ios_build_lane::context::{LaneContext, CONTEXT_FILE_NAME};
use ios_build_lane::keychain::CredentialStore;
use ios_build_lane::lifecycle::{BuildCredentialLifecycle, CleanupError, SetupRequest};
use ios_build_lane::mock::{KeychainOp, MockKeychain};
use ios_build_lane::profiles::ProfileStager;
use tempfile::TempDir;

struct Pipeline {
    root: TempDir,
}

impl Pipeline {
    fn new() -> Self {
        let pipeline = Self {
            root: TempDir::new().unwrap(),
        };
        fs::create_dir_all(pipeline.certificate_source()).unwrap();
        fs::create_dir_all(pipeline.profile_source()).unwrap();
        pipeline
    }

    fn certificate_source(&self) -> PathBuf {
        self.root.path().join("ios-p12-vault")
    }

    fn profile_source(&self) -> PathBuf {
        self.root.path().join("ios-provisioning-profile-vault")
    }

    fn profile_destination(&self) -> PathBuf {
        self.root.path().join("Provisioning Profiles")
    }

    fn keychain_dir(&self) -> PathBuf {
        self.root.path().join(".build/keychain")
    }

    fn context_path(&self) -> PathBuf {
        self.keychain_dir().join(CONTEXT_FILE_NAME)
    }

    fn add_certificate(&self, name: &str, password: Option<&str>) {
        fs::write(self.certificate_source().join(name), b"p12").unwrap();
        if let Some(password) = password {
            let base = name.trim_end_matches(".p12");
            fs::write(
                self.certificate_source().join(format!("{base}.pass")),
                password,
            )
            .unwrap();
        }
    }

    fn add_profile(&self, name: &str) {
        fs::write(self.profile_source().join(name), b"profile").unwrap();
    }

    fn lifecycle(&self) -> BuildCredentialLifecycle<MockKeychain> {
        let store = CredentialStore::new(MockKeychain::default(), self.keychain_dir());
        let stager = ProfileStager::with_destination(self.profile_destination());
        BuildCredentialLifecycle::new(store, stager).with_context_file(self.context_path())
    }

    fn request(&self, certificates: &[&str], profiles: &[&str]) -> SetupRequest {
        SetupRequest {
            certificate_source: self.certificate_source(),
            certificate_names: certificates.iter().map(|s| s.to_string()).collect(),
            profile_source: self.profile_source(),
            profile_names: profiles.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn load_context(&self) -> LaneContext {
        LaneContext::load_or_default(&self.context_path()).unwrap()
    }
}

fn keychain_file_in(dir: &Path) -> Option<PathBuf> {
    fs::read_dir(dir).ok()?.find_map(|entry| {
        let path = entry.ok()?.path();
        (path.extension().and_then(|e| e.to_str()) == Some("keychain")).then_some(path)
    })
}

#[test]
fn test_setup_and_cleanup_across_invocations() {
    let pipeline = Pipeline::new();
    pipeline.add_certificate("dist.p12", Some("pw"));
    pipeline.add_profile("app.mobileprovision");

    // Invocation 1: setup.
    {
        let lifecycle = pipeline.lifecycle();
        let mut context = pipeline.load_context();
        lifecycle
            .setup(
                &pipeline.request(&["dist.p12"], &["app.mobileprovision"]),
                &mut context,
            )
            .unwrap();
    }

    // The keychain exists on disk and is recorded in the persisted context.
    let keychain = keychain_file_in(&pipeline.keychain_dir()).expect("keychain file");
    let persisted = pipeline.load_context();
    let (recorded, _) = persisted.configured().expect("configured context");
    assert_eq!(recorded, keychain);

    // Invocation 2: cleanup, against a freshly loaded context.
    {
        let lifecycle = pipeline.lifecycle();
        let mut context = pipeline.load_context();
        lifecycle.cleanup(&mut context, false).unwrap();
    }

    assert!(keychain_file_in(&pipeline.keychain_dir()).is_none());
    assert!(!pipeline
        .profile_destination()
        .join("app.mobileprovision")
        .exists());
    assert!(!pipeline.load_context().is_configured());
}

#[test]
fn test_second_cleanup_invocation_reports_nothing_to_clean_up() {
    let pipeline = Pipeline::new();
    pipeline.add_certificate("dist.p12", Some("pw"));
    pipeline.add_profile("app.mobileprovision");

    let lifecycle = pipeline.lifecycle();
    let mut context = pipeline.load_context();
    lifecycle
        .setup(
            &pipeline.request(&["dist.p12"], &["app.mobileprovision"]),
            &mut context,
        )
        .unwrap();
    lifecycle.cleanup(&mut context, false).unwrap();

    // A second pipeline invocation loads the cleared context from disk.
    let lifecycle = pipeline.lifecycle();
    let mut context = pipeline.load_context();
    let err = lifecycle.cleanup(&mut context, false).unwrap_err();
    assert!(matches!(err, CleanupError::NothingToCleanUp));
}

#[test]
fn test_cleanup_without_setup_honors_fail_silently() {
    let pipeline = Pipeline::new();

    let lifecycle = pipeline.lifecycle();
    let mut context = pipeline.load_context();
    assert!(matches!(
        lifecycle.cleanup(&mut context, false),
        Err(CleanupError::NothingToCleanUp)
    ));

    let mut context = pipeline.load_context();
    lifecycle.cleanup(&mut context, true).unwrap();
}

#[test]
fn test_failed_import_is_recoverable_by_cleanup() {
    let pipeline = Pipeline::new();
    pipeline.add_certificate("A.p12", Some("pw-a"));
    pipeline.add_certificate("B.p12", None); // missing B.pass
    pipeline.add_profile("app.mobileprovision");

    // Setup fails after importing A, before attempting B.
    {
        let lifecycle = pipeline.lifecycle();
        let mut context = pipeline.load_context();
        lifecycle
            .setup(
                &pipeline.request(&["A.p12", "B.p12"], &["app.mobileprovision"]),
                &mut context,
            )
            .unwrap_err();

        let imported = lifecycle.store().service().imported();
        assert_eq!(imported.len(), 1);
        assert!(imported[0].ends_with("A.p12"));
    }

    // The persisted context still knows what to undo.
    let persisted = pipeline.load_context();
    let (_, profiles) = persisted.configured().expect("configured context");
    assert_eq!(profiles, ["app.mobileprovision".to_string()]);

    // A later cleanup invocation undoes everything setup created.
    let lifecycle = pipeline.lifecycle();
    let mut context = pipeline.load_context();
    lifecycle.cleanup(&mut context, false).unwrap();

    assert!(keychain_file_in(&pipeline.keychain_dir()).is_none());
    assert!(!pipeline
        .profile_destination()
        .join("app.mobileprovision")
        .exists());
}

#[test]
fn test_teardown_reports_every_failure() {
    let pipeline = Pipeline::new();
    pipeline.add_certificate("dist.p12", Some("pw"));
    pipeline.add_profile("app.mobileprovision");

    let lifecycle = pipeline.lifecycle();
    let mut context = pipeline.load_context();
    lifecycle
        .setup(
            &pipeline.request(&["dist.p12"], &["app.mobileprovision"]),
            &mut context,
        )
        .unwrap();

    lifecycle
        .store()
        .service()
        .fail_next_delete("keychain is locked");

    let err = lifecycle.cleanup(&mut context, false).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("keychain is locked"));

    // Profile unstaging still ran despite the keychain failure.
    assert!(!pipeline
        .profile_destination()
        .join("app.mobileprovision")
        .exists());

    // The operation log shows no delete was recorded (it failed), but the
    // create happened exactly once.
    let ops = lifecycle.store().service().operations();
    let creates = ops
        .iter()
        .filter(|op| matches!(op, KeychainOp::Create { .. }))
        .count();
    assert_eq!(creates, 1);
}

#[test]
fn test_profiles_staged_in_order_overwrite_duplicates() {
    let pipeline = Pipeline::new();
    pipeline.add_certificate("dist.p12", Some("pw"));

    // Two sources are modeled by staging the same name twice; the later copy
    // wins on disk.
    fs::write(
        pipeline.profile_source().join("app.mobileprovision"),
        b"v2",
    )
    .unwrap();

    let lifecycle = pipeline.lifecycle();
    let mut context = pipeline.load_context();
    lifecycle
        .setup(
            &pipeline.request(
                &["dist.p12"],
                &["app.mobileprovision", "app.mobileprovision"],
            ),
            &mut context,
        )
        .unwrap();

    assert_eq!(
        fs::read(pipeline.profile_destination().join("app.mobileprovision")).unwrap(),
        b"v2"
    );

    // Cleanup removes the single staged file and tolerates the duplicate
    // name on the second pass.
    lifecycle.cleanup(&mut context, false).unwrap();
    assert!(!pipeline
        .profile_destination()
        .join("app.mobileprovision")
        .exists());
}
