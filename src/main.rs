//! iOS Build Lane CLI
//!
//! Entry point for the `ios-lane` command-line tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use ios_build_lane::config::LaneConfig;
use ios_build_lane::context::{LaneContext, CONTEXT_FILE_NAME};
use ios_build_lane::keychain::{CredentialStore, SecurityCli};
use ios_build_lane::lifecycle::{BuildCredentialLifecycle, SetupRequest};
use ios_build_lane::profiles::ProfileStager;
use ios_build_lane::publish::{
    discover_build_artifacts, ArtifactPublisher, MountTable, PublishOutcome, ZipCli,
};
use ios_build_lane::repackage;

#[derive(Parser)]
#[command(name = "ios-lane")]
#[command(about = "iOS build pipeline lane: signing credentials and artifact publishing", version)]
struct Cli {
    /// Path to config file (default: ios-lane.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Emit progress messages while running
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the build keychain, import certificates, stage profiles
    Setup {
        /// Directory containing the .p12 bundles and .pass files
        #[arg(long)]
        certificate_source: Option<PathBuf>,

        /// Certificate file name to import (repeatable, in order)
        #[arg(long = "certificate")]
        certificate_names: Vec<String>,

        /// Directory containing the provisioning profiles
        #[arg(long)]
        profile_source: Option<PathBuf>,

        /// Provisioning profile file name to stage (repeatable, in order)
        #[arg(long = "profile")]
        profile_names: Vec<String>,
    },

    /// Delete the build keychain and remove staged profiles
    Cleanup {
        /// Succeed as a no-op when there is nothing to clean up
        #[arg(long)]
        fail_silently: bool,
    },

    /// Publish build or test artifacts to the artifact store
    Publish {
        #[command(subcommand)]
        kind: PublishCommands,
    },

    /// Repackage an .xcarchive for a security scanner
    Repackage {
        /// Path to the .xcarchive
        xcarchive: PathBuf,

        /// Output file name, without extension
        #[arg(long)]
        output_name: String,

        /// Produce a .bca file instead of .zip
        #[arg(long)]
        bca: bool,

        /// Move Products/Applications to Payload before compressing
        #[arg(long)]
        flatten: bool,
    },
}

#[derive(Subcommand)]
enum PublishCommands {
    /// Copy build outputs (.ipa, .zip, ...) to the store
    Build {
        /// Identifier for this artifact set (build number or branch)
        #[arg(long)]
        identifier: String,
    },

    /// Archive the test output directory and copy it to the store
    Tests {
        /// Identifier for this artifact set (build number or branch)
        #[arg(long)]
        identifier: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match LaneConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(1);
        }
    };

    let verbose = cli.verbose || config.setup.verbose;

    match cli.command {
        Commands::Setup {
            certificate_source,
            certificate_names,
            profile_source,
            profile_names,
        } => {
            run_setup(
                &config,
                certificate_source,
                certificate_names,
                profile_source,
                profile_names,
                verbose,
            );
        }
        Commands::Cleanup { fail_silently } => {
            run_cleanup(&config, fail_silently || config.cleanup.fail_silently, verbose);
        }
        Commands::Publish { kind } => match kind {
            PublishCommands::Build { identifier } => {
                run_publish_build(&config, &identifier, verbose);
            }
            PublishCommands::Tests { identifier } => {
                run_publish_tests(&config, &identifier, verbose);
            }
        },
        Commands::Repackage {
            xcarchive,
            output_name,
            bca,
            flatten,
        } => {
            run_repackage(&xcarchive, &output_name, bca, flatten);
        }
    }
}

fn lifecycle(config: &LaneConfig, verbose: bool) -> BuildCredentialLifecycle<SecurityCli> {
    let store = CredentialStore::new(SecurityCli, config.setup.keychain_directory.clone());
    let stager = match ProfileStager::new() {
        Ok(stager) => stager,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    BuildCredentialLifecycle::new(store, stager)
        .with_context_file(config.setup.keychain_directory.join(CONTEXT_FILE_NAME))
        .with_verbose(verbose)
}

fn load_context(config: &LaneConfig) -> LaneContext {
    let path = config.setup.keychain_directory.join(CONTEXT_FILE_NAME);
    match LaneContext::load_or_default(&path) {
        Ok(context) => context,
        Err(e) => {
            eprintln!("Error loading lane context: {e}");
            process::exit(1);
        }
    }
}

fn run_setup(
    config: &LaneConfig,
    certificate_source: Option<PathBuf>,
    certificate_names: Vec<String>,
    profile_source: Option<PathBuf>,
    profile_names: Vec<String>,
    verbose: bool,
) {
    let request = SetupRequest {
        certificate_source: certificate_source
            .unwrap_or_else(|| config.setup.certificate_source.clone()),
        certificate_names: if certificate_names.is_empty() {
            config.setup.certificate_names.clone()
        } else {
            certificate_names
        },
        profile_source: profile_source
            .unwrap_or_else(|| config.setup.provisioning_profile_source.clone()),
        profile_names: if profile_names.is_empty() {
            config.setup.provisioning_profile_names.clone()
        } else {
            profile_names
        },
    };

    let lifecycle = lifecycle(config, verbose);
    let mut context = load_context(config);

    match lifecycle.setup(&request, &mut context) {
        Ok(credential) => {
            println!("Build keychain ready: {}", credential.keychain_path.display());
        }
        Err(e) => {
            eprintln!("Setup failed: {e}");
            process::exit(1);
        }
    }
}

fn run_cleanup(config: &LaneConfig, fail_silently: bool, verbose: bool) {
    let lifecycle = lifecycle(config, verbose);
    let mut context = load_context(config);

    match lifecycle.cleanup(&mut context, fail_silently) {
        Ok(()) => {
            println!("Build cleanup complete.");
        }
        Err(e) => {
            eprintln!("Cleanup failed: {e}");
            process::exit(1);
        }
    }
}

fn run_publish_build(config: &LaneConfig, identifier: &str, verbose: bool) {
    let publisher = ArtifactPublisher::new(ZipCli, MountTable)
        .with_mount_verification(config.publish.require_mounted_destination)
        .with_verbose(verbose);

    let artifacts = match discover_build_artifacts(
        &config.publish.build_output_directory,
        &config.publish.build_output_extensions,
    ) {
        Ok(artifacts) => artifacts,
        Err(e) => {
            eprintln!("Artifact discovery failed: {e}");
            process::exit(1);
        }
    };

    match publisher.publish_build(
        &artifacts,
        &config.publish.destination_root,
        &config.publish.project_name,
        identifier,
    ) {
        Ok(outcome) => report_outcome(&outcome),
        Err(e) => {
            eprintln!("Publish failed: {e}");
            process::exit(1);
        }
    }
}

fn run_publish_tests(config: &LaneConfig, identifier: &str, verbose: bool) {
    let publisher = ArtifactPublisher::new(ZipCli, MountTable)
        .with_mount_verification(config.publish.require_mounted_destination)
        .with_verbose(verbose);

    match publisher.publish_tests(
        &config.publish.test_output_directory,
        &config.publish.destination_root,
        &config.publish.project_name,
        identifier,
        &config.publish.archive_name,
    ) {
        Ok(outcome) => report_outcome(&outcome),
        Err(e) => {
            eprintln!("Publish failed: {e}");
            process::exit(1);
        }
    }
}

fn report_outcome(outcome: &PublishOutcome) {
    match outcome {
        PublishOutcome::Published { copied } => {
            println!("Published {copied} artifact(s).");
        }
        PublishOutcome::NothingToPublish => {
            println!("Nothing to publish.");
        }
        // The publisher already reported the missing mount on stderr.
        PublishOutcome::DestinationNotMounted => {}
    }
}

fn run_repackage(xcarchive: &PathBuf, output_name: &str, bca: bool, flatten: bool) {
    if flatten {
        if let Err(e) = repackage::flatten_archive(xcarchive) {
            eprintln!("Repackage failed: {e}");
            process::exit(1);
        }
    }

    let extension = if bca { "bca" } else { "zip" };
    match repackage::compress_archive(&ZipCli, xcarchive, output_name, extension) {
        Ok(output) => {
            println!("{}", output.display());
        }
        Err(e) => {
            eprintln!("Repackage failed: {e}");
            process::exit(1);
        }
    }
}
