//! Auth commands - login and status.

use anyhow::{bail, Result};
use jip::auth::{login, resolve_token, CredentialStore, DEFAULT_HOST};
use jip::github::viewer_login;

/// Runs the OAuth device flow and stores the token.
pub async fn run_auth_login() -> Result<()> {
    let store = CredentialStore::new();
    login(&store).await?;
    Ok(())
}

/// Shows the current authentication status by resolving the token chain and
/// verifying it against the API.
pub async fn run_auth_status() -> Result<()> {
    let store = CredentialStore::new();
    let Some((token, source)) = resolve_token(DEFAULT_HOST, &store).await else {
        bail!("not authenticated. Run 'jip auth login' or 'gh auth login' or set GH_TOKEN");
    };

    let api_url = std::env::var("GITHUB_API_URL").ok();
    let login = viewer_login(&token, api_url.as_deref()).await?;
    println!("Authenticated as {login} (via {source})");
    Ok(())
}
