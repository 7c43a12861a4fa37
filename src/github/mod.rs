//! GitHub integration: repository URL parsing, the API client, and PR body
//! composition.

mod body;
mod client;
mod repo;

pub use body::{build_diff_comment, build_stack_block, build_stacked_pr_body};
pub use client::{viewer_login, GitHubClient, GitHubService, PrInfo, UpdatePrOpts};
pub use repo::parse_repo_from_url;
