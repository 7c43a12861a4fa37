//! jip - Stacked PRs for Jujutsu and GitHub
//!
//! CLI binary: each change in a jj stack becomes exactly one pull request.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;

#[derive(Parser)]
#[command(name = "jip")]
#[command(about = "Stacked PRs for jj and GitHub")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update PRs for a stack of changes
    #[command(alias = "s")]
    Send {
        /// Revsets to send (default @-)
        revsets: Vec<String>,

        /// Base branch
        #[arg(long, short = 'b', default_value = "main")]
        base: String,

        /// Push remote name
        #[arg(long, default_value = "origin")]
        remote: String,

        /// Upstream remote name or URL (where PRs are opened)
        #[arg(long, short = 'u')]
        upstream: Option<String>,

        /// Show what would happen without making changes
        #[arg(long, short = 'n')]
        dry_run: bool,

        /// Add reviewers (repeatable, comma-separated)
        #[arg(long, short = 'r', value_delimiter = ',')]
        reviewer: Vec<String>,

        /// Create PRs as drafts
        #[arg(long, short = 'd')]
        draft: bool,

        /// Only update PRs that already exist (skip new ones)
        #[arg(long, short = 'x')]
        existing: bool,

        /// Send only the tip of each stack as a single PR
        #[arg(long)]
        no_stack: bool,

        /// Rebase the revsets onto the base branch first
        #[arg(long)]
        rebase: bool,
    },

    /// Authentication management
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Print the version
    Version,
}

#[derive(Subcommand)]
enum AuthAction {
    /// Authenticate with GitHub using the OAuth device flow
    Login,
    /// Show current authentication status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    match args.command {
        Commands::Send {
            revsets,
            base,
            remote,
            upstream,
            dry_run,
            reviewer,
            draft,
            existing,
            no_stack,
            rebase,
        } => {
            cli::run_send(cli::SendArgs {
                revsets,
                base,
                remote,
                upstream,
                dry_run,
                reviewers: reviewer,
                draft,
                existing,
                no_stack,
                rebase,
            })
            .await?;
        }
        Commands::Auth { action } => match action {
            AuthAction::Login => cli::run_auth_login().await?,
            AuthAction::Status => cli::run_auth_status().await?,
        },
        Commands::Version => {
            println!("jip version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
