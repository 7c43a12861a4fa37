//! Owner/repo extraction from git remote URLs.

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

static HTTPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^/]+/([^/]+)/([^/.]+)").unwrap());

static SSH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^@]+@[^:]+:([^/]+)/([^/.]+)").unwrap());

/// Extracts owner and repo name from a GitHub remote URL. Supports HTTPS
/// (`https://host/owner/repo[.git]`) and SSH (`user@host:owner/repo[.git]`).
pub fn parse_repo_from_url(url: &str) -> Result<(String, String)> {
    let url = url.trim();
    let url = url.strip_suffix(".git").unwrap_or(url);

    if let Some(m) = HTTPS_RE.captures(url) {
        return Ok((m[1].to_string(), m[2].to_string()));
    }
    if let Some(m) = SSH_RE.captures(url) {
        return Ok((m[1].to_string(), m[2].to_string()));
    }
    Err(Error::Parse(format!(
        "cannot parse owner/repo from URL: {url}"
    )))
}
