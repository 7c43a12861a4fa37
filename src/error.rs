//! Error types for the jip library.

use thiserror::Error;

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the jip library.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed jj output, remote URL, or credentials file.
    #[error("parse error: {0}")]
    Parse(String),

    /// No token found via the resolution chain.
    #[error("not authenticated — run 'jip auth login' or set GH_TOKEN")]
    NotAuthenticated,

    /// A named remote (push or upstream) is not configured.
    #[error("remote {name:?} not found (available: {available:?})")]
    RemoteNotFound {
        name: String,
        available: Vec<String>,
    },

    /// Duplicate change ID or cycle in the change graph.
    #[error("{0}")]
    Graph(String),

    /// `--no-stack` on a DAG whose leaf count is not exactly one.
    #[error("--no-stack requires a linear stack (found {0} tips in one DAG)")]
    Topology(usize),

    /// At least one change was skipped due to unsafe bookmark state.
    #[error("{0} change(s) skipped due to diverged or behind bookmarks")]
    Skipped(usize),

    /// Invalid command-line argument combination.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// GitHub API or network error after retries.
    #[error("GitHub API error: {0}")]
    Api(String),

    /// A jj invocation failed; the message carries the command's stderr.
    #[error("jj: {0}")]
    Jj(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<octocrab::Error> for Error {
    fn from(e: octocrab::Error) -> Self {
        Error::Api(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Api(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}
