//! CLI entry point for crestwatch.

pub mod store;
pub mod watch;

use clap::{Parser, Subcommand};

/// Watch an EVE Online character's location through CREST
#[derive(Parser, Debug)]
#[command(name = "crestwatch", version, about = "EVE CREST session and location watcher")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in and print status, character and location changes
    Watch(WatchArgs),
    /// Delete the stored refresh token
    Forget,
}

/// Arguments for `crestwatch watch`.
#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Application client id (falls back to CRESTWATCH_CLIENT_ID)
    #[arg(long)]
    pub client_id: Option<String>,

    /// Application secret (falls back to CRESTWATCH_SECRET)
    #[arg(long)]
    pub secret: Option<String>,

    /// Local port for the SSO redirect
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Ignore the stored refresh token and log in through the browser
    #[arg(long)]
    pub fresh: bool,
}
