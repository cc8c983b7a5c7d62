//! rocrate-validator CLI binary entry point.
//! Resolves configuration, loads profiles, runs validation and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use rocrate_validator::checks::PredicateRegistry;
use rocrate_validator::cli::{Cli, Commands, ProfilesCmd};
use rocrate_validator::config::{self, CliOverrides, Effective};
use rocrate_validator::output;
use rocrate_validator::resolver::ProfileRegistry;
use rocrate_validator::validator::{ValidationRequest, Validator};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit code for usage, configuration and profile-loading errors.
const EXIT_USAGE: i32 = 2;

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = if verbose == 0 {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    } else {
        EnvFilter::new(default)
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn error_prefix() -> String {
    if std::env::var_os("NO_COLOR").is_some() {
        "error:".to_string()
    } else {
        "error:".red().bold().to_string()
    }
}

fn load_registry(eff: &Effective) -> Result<Arc<ProfileRegistry>> {
    let predicates = PredicateRegistry::with_builtins();
    let registry = match &eff.profiles_path {
        Some(root) => ProfileRegistry::load(root, &predicates)
            .with_context(|| format!("loading profiles from {}", root.display()))?,
        None => ProfileRegistry::bundled(&predicates).context("loading bundled profiles")?,
    };
    Ok(Arc::new(registry))
}

fn run(cli: Cli) -> Result<i32> {
    match cli.cmd {
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
        Commands::Validate {
            crate_path,
            root,
            profiles_path,
            profile,
            no_inherit,
            no_override,
            severity,
            fail_fast,
            skip_checks,
            timeout,
            output,
        } => {
            let explicit_profile = profile.clone();
            let eff = config::resolve_effective(CliOverrides {
                root,
                profiles_path,
                profile,
                inherit: no_inherit.then_some(false),
                allow_override: no_override.then_some(false),
                severity,
                fail_fast: fail_fast.then_some(true),
                skip_checks,
                output,
                timeout_secs: timeout,
            })?;
            let registry = load_registry(&eff)?;
            let mut validator = Validator::new(registry);
            if let Some(p) = &eff.profile {
                validator = validator.with_default_profile(p.clone());
            }
            let request = ValidationRequest {
                crate_location: crate_path,
                // A configured profile only applies when `conformsTo` names none.
                profile: explicit_profile,
                inherit: eff.inherit,
                allow_override: eff.allow_override,
                severity: eff.severity,
                fail_fast: eff.fail_fast,
                skip_checks: eff.skip_checks.clone(),
                timeout: eff.timeout,
                cancel: None,
            };
            let result = validator.validate(&request)?;
            output::print_result(&result, &eff.output)?;
            Ok(if result.passed_at_run_severity() { 0 } else { 1 })
        }
        Commands::Profiles { cmd } => match cmd {
            ProfilesCmd::List {
                root,
                profiles_path,
                output,
            } => {
                let eff = config::resolve_effective(CliOverrides {
                    root,
                    profiles_path,
                    output,
                    ..Default::default()
                })?;
                let registry = load_registry(&eff)?;
                output::print_profiles(&registry.list(), &eff.output)?;
                Ok(0)
            }
            ProfilesCmd::Describe {
                profile,
                root,
                profiles_path,
                no_inherit,
                output,
            } => {
                let eff = config::resolve_effective(CliOverrides {
                    root,
                    profiles_path,
                    inherit: no_inherit.then_some(false),
                    output,
                    ..Default::default()
                })?;
                let registry = load_registry(&eff)?;
                let description = registry.describe(&profile, eff.inherit)?;
                output::print_description(&description, &eff.output)?;
                Ok(0)
            }
        },
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", error_prefix(), e);
            std::process::exit(EXIT_USAGE);
        }
    }
}
