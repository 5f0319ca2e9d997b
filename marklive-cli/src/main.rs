//! marklive — live markdown preview in the browser.
//!
//! # Usage
//!
//! ```text
//! marklive start <path> [--port <port>] [--open]
//! marklive send <key> <data|->
//! marklive stop [<path-or-id>]
//! marklive status [--json]
//! marklive id <path-or-key-or-id>
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    id::IdArgs, send::SendArgs, start::StartArgs, status::StatusArgs, stop::StopArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "marklive",
    version,
    about = "Preview markdown files and piped text live in the browser",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Track a markdown file, starting the daemon in the foreground if needed.
    Start(StartArgs),

    /// Publish markdown under a key (use `-` to read stdin).
    Send(SendArgs),

    /// Stop tracking one resource, or shut the daemon down.
    Stop(StopArgs),

    /// Show tracked resources and their subscribers.
    Status(StatusArgs),

    /// Print the resource id for a path, memory key or id.
    Id(IdArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Start(args) => args.run(),
        Commands::Send(args) => args.run(),
        Commands::Stop(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Id(args) => args.run(),
    }
}
