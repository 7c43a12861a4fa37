//! Command execution against a jj repository.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// jj template that outputs one JSON object per change, one per line.
const LOG_TEMPLATE: &str = concat!(
    r#""{" ++"#,
    r#""\"change_id\":" ++ json(change_id) ++"#,
    r#"",\"commit_id\":" ++ json(commit_id) ++"#,
    r#"",\"description\":" ++ json(description.first_line()) ++"#,
    r#"",\"parent_ids\":[" ++ parents.map(|c| json(c.change_id())).join(",") ++ "]" ++"#,
    r#"",\"bookmarks\":[" ++ local_bookmarks.map(|r| json(r.name())).join(",") ++ "]" ++"#,
    r#"",\"conflict\":" ++ if(conflict, "true", "false") ++"#,
    r#""}\n""#,
);

/// jj template that outputs one JSON object per bookmark entry (local or
/// remote). Local entries have remote=null. The internal "git" remote is
/// filtered out during parsing, not here.
const BOOKMARK_LIST_TEMPLATE: &str = concat!(
    r#""{" ++"#,
    r#""\"name\":" ++ json(name) ++"#,
    r#"",\"remote\":" ++ if(remote, json(remote), "null") ++"#,
    r#"",\"present\":" ++ if(present, "true", "false") ++"#,
    r#"",\"conflict\":" ++ if(conflict, "true", "false") ++"#,
    r#"",\"target\":" ++ if(present && !conflict, json(normal_target.commit_id()), "\"\"") ++"#,
    r#"",\"change_id\":" ++ if(present && !conflict, json(normal_target.change_id()), "\"\"") ++"#,
    r#"",\"tracked\":" ++ if(remote && tracked, "true", "false") ++"#,
    r#"",\"ahead\":" ++ if(remote && tracked, if(tracking_ahead_count.exact(), tracking_ahead_count.exact(), "0"), "0") ++"#,
    r#"",\"behind\":" ++ if(remote && tracked, if(tracking_behind_count.exact(), tracking_behind_count.exact(), "0"), "0") ++"#,
    r#""}\n""#,
);

/// Executes jj commands and returns their output. The send pipeline only
/// talks to jj through this trait, which is also the seam for test doubles.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Runs `jj log` with the given revset and returns raw JSONL output.
    async fn log(&self, revset: &str) -> Result<Vec<u8>>;

    /// Runs `jj bookmark list --all-remotes` and returns raw JSONL output.
    async fn bookmark_list(&self) -> Result<Vec<u8>>;

    /// Creates or moves a bookmark to the given revision.
    async fn bookmark_set(&self, name: &str, rev: &str) -> Result<()>;

    /// Returns the output of `jj git remote list`.
    async fn git_remote_list(&self) -> Result<Vec<u8>>;

    /// Fetches from the given remote.
    async fn git_fetch(&self, remote: &str) -> Result<()>;

    /// Pushes the given bookmarks. `allow_new` permits new remote branches.
    async fn git_push(&self, bookmarks: &[String], allow_new: bool, remote: &str) -> Result<()>;

    /// Returns the diff between two revisions using `jj interdiff --git`.
    async fn interdiff(&self, from: &str, to: &str) -> Result<String>;

    /// Rebases the given revsets onto the destination revision.
    async fn rebase(&self, revsets: &[String], destination: &str) -> Result<()>;
}

/// Runner that executes the real jj binary in a repository directory.
pub struct JjRunner {
    repo_dir: PathBuf,
    // repo_dir rendered for the -R flag, computed once.
    repo_arg: String,
}

impl JjRunner {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        let repo_dir = repo_dir.into();
        let repo_arg = repo_dir.to_string_lossy().into_owned();
        Self { repo_dir, repo_arg }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        debug!(?args, "running jj");
        let output = Command::new("jj")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Jj(format!(
                "jj {} failed: {}",
                args.first().copied().unwrap_or(""),
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl Runner for JjRunner {
    async fn log(&self, revset: &str) -> Result<Vec<u8>> {
        self.run(&[
            "log",
            "--no-graph",
            "-R",
            self.repo_arg.as_str(),
            "-r",
            revset,
            "-T",
            LOG_TEMPLATE,
        ])
        .await
    }

    async fn bookmark_list(&self) -> Result<Vec<u8>> {
        self.run(&[
            "bookmark",
            "list",
            "--all-remotes",
            "--quiet",
            "-R",
            self.repo_arg.as_str(),
            "-T",
            BOOKMARK_LIST_TEMPLATE,
        ])
        .await
    }

    async fn bookmark_set(&self, name: &str, rev: &str) -> Result<()> {
        self.run(&["bookmark", "set", "-R", self.repo_arg.as_str(), name, "-r", rev])
            .await?;
        Ok(())
    }

    async fn git_remote_list(&self) -> Result<Vec<u8>> {
        self.run(&["git", "remote", "list", "-R", self.repo_arg.as_str()])
            .await
    }

    async fn git_fetch(&self, remote: &str) -> Result<()> {
        self.run(&["git", "fetch", "-R", self.repo_arg.as_str(), "--remote", remote])
            .await?;
        Ok(())
    }

    async fn git_push(&self, bookmarks: &[String], allow_new: bool, remote: &str) -> Result<()> {
        let mut args = vec!["git", "push", "-R", self.repo_arg.as_str()];
        if !remote.is_empty() {
            args.push("--remote");
            args.push(remote);
        }
        for b in bookmarks {
            args.push("-b");
            args.push(b);
        }
        if allow_new {
            args.push("--allow-new");
        }
        self.run(&args).await?;
        Ok(())
    }

    async fn interdiff(&self, from: &str, to: &str) -> Result<String> {
        let out = self
            .run(&[
                "interdiff",
                "--git",
                "-R",
                self.repo_arg.as_str(),
                "--from",
                from,
                "--to",
                to,
            ])
            .await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    async fn rebase(&self, revsets: &[String], destination: &str) -> Result<()> {
        let mut args = vec!["rebase", "-R", self.repo_arg.as_str(), "-d", destination];
        for rev in revsets {
            args.push("-b");
            args.push(rev);
        }
        self.run(&args).await?;
        Ok(())
    }
}

/// Parses the output of `jj git remote list` into a name-to-URL map.
pub fn parse_remote_list(data: &[u8]) -> BTreeMap<String, String> {
    let mut remotes = BTreeMap::new();
    for line in String::from_utf8_lossy(data).lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((name, url)) = line.split_once(' ') {
            remotes.insert(name.trim().to_string(), url.trim().to_string());
        }
    }
    remotes
}
