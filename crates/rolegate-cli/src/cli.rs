use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "rolegate")]
#[command(about = "Rolegate CLI: check admin console permissions from the terminal")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Console backend URL (overrides config and ROLEGATE_URL env var)
    #[arg(short, long, global = true, env = "ROLEGATE_URL")]
    pub server: Option<String>,

    /// Read metadata from a local JSON file instead of the backend
    #[arg(short, long, global = true)]
    pub metadata: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store a subject identity and its permission grant
    Login(LoginArgs),
    /// Remove the stored identity and grant
    Logout,
    /// Show the stored identity
    Whoami,
    /// Check whether the stored identity may perform an action on a resource
    Can(CanArgs),
    /// Print the compiled policy set
    Policies,
}

#[derive(clap::Args)]
pub struct LoginArgs {
    /// Subject identity (bearer credential issued by the console)
    #[arg(long)]
    pub subject: String,
    /// Grant as JSON ({"<resource id>": ["<permission id>", ...]}) or @path to a JSON file
    #[arg(long)]
    pub grant: String,
}

#[derive(clap::Args)]
pub struct CanArgs {
    /// Resource name (e.g. "User Management")
    pub resource: String,
    /// Action name (e.g. read)
    pub action: String,
}
