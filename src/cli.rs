use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "accord")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Reconcile Unix accounts, groups, SSH keys and sudo grants", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file
    #[arg(long, global = true, env = "ACCORD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Reconcile the machine against the manifest
    Apply(ApplyArgs),

    /// Show what the store says was last applied
    Status(StatusArgs),

    /// Download and unpack the manifest bundles without applying them
    Fetch(SourceArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Remove every managed user, group and sudo grant
    #[arg(long)]
    pub delete: bool,

    /// Skip the confirmation prompt for --delete
    #[arg(short, long)]
    pub yes: bool,

    /// Print the commands that would run without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Record failing entities and carry on instead of stopping
    #[arg(long)]
    pub keep_going: bool,

    /// Read an already unpacked manifest instead of fetching one
    #[arg(long, value_name = "DIR")]
    pub manifest: Option<PathBuf>,

    /// Remove the work directory after a successful run
    #[arg(long)]
    pub clean: bool,

    /// Record store path
    #[arg(long, value_name = "PATH", env = "ACCORD_STORE")]
    pub store: Option<PathBuf>,

    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Args)]
pub struct SourceArgs {
    /// Directory the manifest bundles are unpacked into
    #[arg(long, value_name = "DIR", env = "WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// URL of the main manifest bundle (gzip tar)
    #[arg(long, value_name = "URL", env = "MASTER_URL")]
    pub master_url: Option<String>,

    /// URL of the user bundle, unpacked into data_bags
    #[arg(long, value_name = "URL", env = "USER_URL")]
    pub user_url: Option<String>,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Record store path
    #[arg(long, value_name = "PATH", env = "ACCORD_STORE")]
    pub store: Option<PathBuf>,
}
