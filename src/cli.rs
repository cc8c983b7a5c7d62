//! CLI argument parsing via `clap`.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "rocrate-validator",
    version,
    about = "Validate RO-Crates against profiles",
    long_about = "rocrate-validator checks a research object crate (directory or tar archive) against a named profile of severity-ranked requirements.\n\nConfiguration precedence: CLI > rocrate-validator.toml > defaults.",
    after_help = "Examples:\n  rocrate-validator validate ./my-crate\n  rocrate-validator validate crate.tar.gz --profile workflow-ro-crate --severity SHOULD\n  rocrate-validator profiles list\n  rocrate-validator profiles describe ro-crate --output json",
    arg_required_else_help = true
)]
/// Top-level CLI options and subcommands.
pub struct Cli {
    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "Increase log verbosity (-v debug, -vv trace)")]
    pub verbose: u8,
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show version
    #[command(
        about = "Show version",
        long_about = "Print the current rocrate-validator version."
    )]
    Version,
    /// Validate a crate
    #[command(
        about = "Validate a crate",
        long_about = "Resolve the profile (and its ancestors), run every check at or above the requested severity, and report failed requirements. Exit code 0 when no issue reaches the severity, 1 otherwise.",
        after_help = "Examples:\n  rocrate-validator validate ./crate\n  rocrate-validator validate ./crate --fail-fast --skip-checks ro-crate.descriptor-size\n  rocrate-validator validate ./crate --output json"
    )]
    Validate {
        #[arg(help = "Crate directory or .tar/.tar.gz/.tgz archive")]
        crate_path: String,
        #[arg(long, help = "Directory holding configuration (default: current dir)")]
        root: Option<String>,
        #[arg(long, help = "Profile root directory (default: bundled profiles)")]
        profiles_path: Option<String>,
        #[arg(long, help = "Profile identifier (default: detected from conformsTo)")]
        profile: Option<String>,
        #[arg(long, action = clap::ArgAction::SetTrue, help = "Validate only the profile's own requirements")]
        no_inherit: bool,
        #[arg(long, action = clap::ArgAction::SetTrue, help = "Reject requirements redefined by a child profile")]
        no_override: bool,
        #[arg(long, help = "Minimum severity: REQUIRED|RECOMMENDED|OPTIONAL or MUST|SHOULD|MAY")]
        severity: Option<String>,
        #[arg(long, action = clap::ArgAction::SetTrue, help = "Stop at the first failed check")]
        fail_fast: bool,
        #[arg(long, value_delimiter = ',', help = "Check ids to skip (id or profile.id), comma-separated")]
        skip_checks: Vec<String>,
        #[arg(long, help = "Abort the run after this many seconds")]
        timeout: Option<u64>,
        #[arg(long, help = "Output mode: human|json (default: human)")]
        output: Option<String>,
    },
    /// Profile inspection (list/describe)
    Profiles {
        #[command(subcommand)]
        cmd: ProfilesCmd,
    },
}

#[derive(Subcommand)]
/// Subcommands for `rocrate-validator profiles`
pub enum ProfilesCmd {
    #[command(
        about = "List profiles",
        long_about = "List every profile found under the profile root with its parent and check counts."
    )]
    List {
        #[arg(long, help = "Directory holding configuration (default: current dir)")]
        root: Option<String>,
        #[arg(long, help = "Profile root directory (default: bundled profiles)")]
        profiles_path: Option<String>,
        #[arg(long, help = "Output mode: human|json (default: human)")]
        output: Option<String>,
    },
    #[command(
        about = "Describe a profile",
        long_about = "Show a profile's metadata and its effective requirements in execution order."
    )]
    Describe {
        #[arg(help = "Profile identifier")]
        profile: String,
        #[arg(long, help = "Directory holding configuration (default: current dir)")]
        root: Option<String>,
        #[arg(long, help = "Profile root directory (default: bundled profiles)")]
        profiles_path: Option<String>,
        #[arg(long, action = clap::ArgAction::SetTrue, help = "Show only the profile's own requirements")]
        no_inherit: bool,
        #[arg(long, help = "Output mode: human|json (default: human)")]
        output: Option<String>,
    },
}
