//! GitHub credential resolution and storage.
//!
//! Token resolution order: `GH_TOKEN`, `GITHUB_TOKEN`, the `gh` CLI, then
//! jip's own credentials file. First hit wins.

mod device;
mod store;

pub use device::login;
pub use store::CredentialStore;

use std::env;
use std::fmt;
use tokio::process::Command;
use tracing::debug;

/// The default GitHub host.
pub const DEFAULT_HOST: &str = "github.com";

/// Where a token was obtained from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    GhTokenEnv,
    GithubTokenEnv,
    GhCli,
    ConfigFile,
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenSource::GhTokenEnv => "GH_TOKEN",
            TokenSource::GithubTokenEnv => "GITHUB_TOKEN",
            TokenSource::GhCli => "gh CLI",
            TokenSource::ConfigFile => "jip config",
        };
        f.write_str(s)
    }
}

/// Tries to find a GitHub token for the given host. Returns the token and
/// its source, or None when the whole chain comes up empty.
pub async fn resolve_token(host: &str, store: &CredentialStore) -> Option<(String, TokenSource)> {
    debug!("checking GH_TOKEN env var");
    if let Ok(token) = env::var("GH_TOKEN") {
        let token = token.trim().to_string();
        if !token.is_empty() {
            return Some((token, TokenSource::GhTokenEnv));
        }
    }

    debug!("checking GITHUB_TOKEN env var");
    if let Ok(token) = env::var("GITHUB_TOKEN") {
        let token = token.trim().to_string();
        if !token.is_empty() {
            return Some((token, TokenSource::GithubTokenEnv));
        }
    }

    debug!("trying gh CLI");
    if let Some(token) = gh_cli_token(host).await {
        return Some((token, TokenSource::GhCli));
    }

    debug!("trying jip credentials file");
    if let Ok(config) = store.load() {
        if let Some(host_cfg) = config.get(host) {
            if !host_cfg.oauth_token.is_empty() {
                return Some((host_cfg.oauth_token.clone(), TokenSource::ConfigFile));
            }
        }
    }

    None
}

async fn gh_cli_token(host: &str) -> Option<String> {
    let output = Command::new("gh")
        .args(["auth", "token", "--hostname", host])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
