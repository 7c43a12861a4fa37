//! Send command - create or update PRs for a stack of changes.

use anyhow::{Context, Result};
use jip::auth::{resolve_token, CredentialStore, DEFAULT_HOST};
use jip::error::Error;
use jip::github::{parse_repo_from_url, GitHubClient, GitHubService};
use jip::jj::{parse_remote_list, JjRunner, Runner};
use jip::send::{execute_send, SendOptions};

/// Parsed command-line arguments for `jip send`.
pub struct SendArgs {
    pub revsets: Vec<String>,
    pub base: String,
    pub remote: String,
    pub upstream: Option<String>,
    pub dry_run: bool,
    pub reviewers: Vec<String>,
    pub draft: bool,
    pub existing: bool,
    pub no_stack: bool,
    pub rebase: bool,
}

/// Runs the send command: resolve auth, discover remotes, and hand off to
/// the pipeline.
pub async fn run_send(args: SendArgs) -> Result<()> {
    // Trim whitespace from each reviewer (e.g. "-r alice, bob").
    let reviewers: Vec<String> = args
        .reviewers
        .iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();

    let revsets = if args.revsets.is_empty() {
        vec!["@-".to_string()]
    } else {
        args.revsets
    };

    // Resolve auth.
    let store = CredentialStore::new();
    let Some((token, source)) = resolve_token(DEFAULT_HOST, &store).await else {
        return Err(Error::NotAuthenticated.into());
    };
    println!("Auth: {source}");

    // Detect repo from remote.
    let cwd = std::env::current_dir().context("getting cwd")?;
    let runner = JjRunner::new(cwd);

    let remote_data = runner.git_remote_list().await.context("listing remotes")?;
    let remotes = parse_remote_list(&remote_data);
    let Some(remote_url) = remotes.get(&args.remote) else {
        return Err(Error::RemoteNotFound {
            name: args.remote.clone(),
            available: remotes.keys().cloned().collect(),
        }
        .into());
    };

    // Resolve upstream: if set, PRs target that repo; otherwise the push
    // remote.
    let mut upstream_url = remote_url.clone();
    let mut upstream_remote = None;
    if let Some(upstream) = &args.upstream {
        if upstream.contains("://") || upstream.contains('@') {
            upstream_url = upstream.clone();
        } else if let Some(url) = remotes.get(upstream) {
            upstream_url = url.clone();
            upstream_remote = Some(upstream.clone());
        } else {
            return Err(Error::RemoteNotFound {
                name: upstream.clone(),
                available: remotes.keys().cloned().collect(),
            }
            .into());
        }
    }

    let api_url = std::env::var("GITHUB_API_URL").ok();
    let client = GitHubClient::new(&token, &upstream_url, api_url.as_deref())?;
    println!("Repo: {}/{}", client.owner(), client.repo());

    // For cross-fork PRs, the head ref is prefixed with the push remote's
    // owner.
    let push_owner = if args.upstream.is_some() {
        let (owner, _) = parse_repo_from_url(remote_url).context("parsing push remote URL")?;
        Some(owner)
    } else {
        None
    };

    let opts = SendOptions {
        base: args.base,
        remote: args.remote,
        upstream_remote,
        push_owner,
        dry_run: args.dry_run,
        draft: args.draft,
        existing_only: args.existing,
        no_stack: args.no_stack,
        rebase: args.rebase,
        reviewers,
        revsets,
    };

    let mut stdout = std::io::stdout();
    execute_send(&runner, &client, &opts, &mut stdout).await?;
    Ok(())
}
