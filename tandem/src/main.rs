//! Tandem - take turns on a shared dev container from several machines.
//!
//! Each machine keeps a local checkout synced to one remote copy that a
//! container mounts. A remote lock decides which machine is driving, the
//! first push claims ownership of the remote copy, and a local session
//! record marks who has a shell open.

#![forbid(unsafe_code)]

mod commands;
mod context;
mod engines;
mod output;
mod prompt;

use anyhow::Result;
use clap::{Parser, Subcommand};
use context::Context;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tandem_common::{LogConfig, init_logging};

#[derive(Parser)]
#[command(name = "tandem")]
#[command(author, version, about = "Take turns on a shared dev container from several machines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Fail instead of prompting for confirmation
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Configuration file (default: the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Take the lock, then bring up sync and the container
    Start {
        project: String,

        /// Take over a lock held by another machine without asking
        #[arg(long)]
        takeover: bool,
    },

    /// Flush and pause sync, stop the container, release the lock
    Stop { project: String },

    /// Upload a local directory as the remote copy
    ///
    /// The first push claims the remote copy for the current user; later
    /// pushes from other accounts are refused.
    Push {
        path: PathBuf,

        /// Project name (default: the directory name)
        name: Option<String>,

        /// Skip the confirmation prompts
        #[arg(long)]
        force: bool,
    },

    /// Stop tracking a project on this machine
    ///
    /// Local source files are never deleted.
    Remove {
        project: String,

        /// Also delete the container, the remote copy and the lock
        #[arg(long)]
        remote: bool,

        /// Skip the confirmation prompts
        #[arg(long)]
        force: bool,
    },

    /// Open a shell in the project container
    Shell {
        project: String,

        /// Override another machine's active session
        #[arg(long)]
        force: bool,
    },

    /// Show lock, ownership, session and engine state
    Status { project: String },

    /// Delete a project lock regardless of holder
    Unlock {
        project: String,

        /// Do not ask when another machine holds the lock
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let mut log_config = LogConfig::from_env("warn").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = match init_logging(&log_config) {
        Ok(guards) => Some(guards),
        Err(e) => {
            eprintln!("tandem: logging disabled: {e}");
            None
        }
    };

    match run(cli.command, cli.config.as_deref(), cli.non_interactive, cli.json).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => ExitCode::from(output::report_error(&err, cli.json)),
    }
}

async fn run(
    command: Commands,
    config: Option<&Path>,
    non_interactive: bool,
    json: bool,
) -> Result<u8> {
    let mut ctx = Context::load(config, non_interactive)?;
    match command {
        Commands::Start { project, takeover } => {
            commands::start(&ctx, &project, takeover, json).await
        }
        Commands::Stop { project } => commands::stop(&ctx, &project, json).await,
        Commands::Push { path, name, force } => {
            commands::push(&mut ctx, &path, name.as_deref(), force, json).await
        }
        Commands::Remove {
            project,
            remote,
            force,
        } => commands::remove(&mut ctx, &project, remote, force, json).await,
        Commands::Shell { project, force } => commands::shell(&ctx, &project, force, json).await,
        Commands::Status { project } => commands::status(&ctx, &project, json).await,
        Commands::Unlock { project, force } => commands::unlock(&ctx, &project, force, json).await,
    }
}
