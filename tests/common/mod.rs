//! Common test utilities: a scripted jj runner and an in-memory GitHub
//! service.

// Not every test binary uses every helper.
#![allow(dead_code)]

use async_trait::async_trait;
use jip::error::{Error, Result};
use jip::github::{GitHubService, PrInfo, UpdatePrOpts};
use jip::jj::{Change, Runner};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Builds a Change fixture.
pub fn change(id: &str, commit: &str, desc: &str, parents: &[&str]) -> Change {
    Change {
        change_id: id.to_string(),
        commit_id: commit.to_string(),
        description: desc.to_string(),
        parent_ids: parents.iter().map(|s| s.to_string()).collect(),
        bookmarks: Vec::new(),
        conflict: false,
    }
}

/// A local bookmark list row as emitted by the jj template.
pub fn local_row(name: &str, target: &str, change_id: &str) -> serde_json::Value {
    json!({
        "name": name,
        "remote": null,
        "present": true,
        "conflict": false,
        "target": target,
        "change_id": change_id,
        "tracked": false,
        "ahead": 0,
        "behind": 0,
    })
}

/// A remote bookmark list row as emitted by the jj template.
pub fn remote_row(
    name: &str,
    remote: &str,
    target: &str,
    ahead: u32,
    behind: u32,
) -> serde_json::Value {
    json!({
        "name": name,
        "remote": remote,
        "present": true,
        "conflict": false,
        "target": target,
        "change_id": "",
        "tracked": true,
        "ahead": ahead,
        "behind": behind,
    })
}

/// In-memory repository state backing [`MockRunner`].
#[derive(Default)]
pub struct RepoState {
    pub changes: Vec<Change>,
    pub bookmark_rows: Vec<serde_json::Value>,
    pub fetched: Vec<String>,
    pub pushed: Vec<(Vec<String>, String)>,
    pub created_bookmarks: Vec<(String, String)>,
    pub interdiffs: HashMap<(String, String), String>,
    pub rebases: Vec<(Vec<String>, String)>,
}

/// Scripted [`Runner`] with an in-memory repository model. `bookmark_set`
/// adds a local row and tags the change; `git_push` upserts remote rows so
/// a second send sees an in-sync repository.
pub struct MockRunner {
    pub state: Mutex<RepoState>,
}

impl MockRunner {
    pub fn new(state: RepoState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    fn jsonl(values: impl IntoIterator<Item = serde_json::Value>) -> Vec<u8> {
        let mut out = Vec::new();
        for v in values {
            out.extend_from_slice(v.to_string().as_bytes());
            out.push(b'\n');
        }
        out
    }
}

#[async_trait]
impl Runner for MockRunner {
    async fn log(&self, _revset: &str) -> Result<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let values = state
            .changes
            .iter()
            .map(|c| serde_json::to_value(c).unwrap());
        Ok(Self::jsonl(values.collect::<Vec<_>>()))
    }

    async fn bookmark_list(&self) -> Result<Vec<u8>> {
        let state = self.state.lock().unwrap();
        Ok(Self::jsonl(state.bookmark_rows.clone()))
    }

    async fn bookmark_set(&self, name: &str, rev: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let commit = state
            .changes
            .iter()
            .find(|c| c.change_id == rev)
            .map(|c| c.commit_id.clone())
            .ok_or_else(|| Error::Jj(format!("unknown revision {rev}")))?;
        state.bookmark_rows.push(local_row(name, &commit, rev));
        if let Some(c) = state.changes.iter_mut().find(|c| c.change_id == rev) {
            c.bookmarks.push(name.to_string());
        }
        state
            .created_bookmarks
            .push((name.to_string(), rev.to_string()));
        Ok(())
    }

    async fn git_remote_list(&self) -> Result<Vec<u8>> {
        Ok(b"origin https://github.com/testowner/testrepo.git\n".to_vec())
    }

    async fn git_fetch(&self, remote: &str) -> Result<()> {
        self.state.lock().unwrap().fetched.push(remote.to_string());
        Ok(())
    }

    async fn git_push(&self, bookmarks: &[String], _allow_new: bool, remote: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for name in bookmarks {
            let target = state
                .bookmark_rows
                .iter()
                .find(|r| r["name"] == name.as_str() && r["remote"].is_null())
                .map(|r| r["target"].as_str().unwrap_or_default().to_string());
            let Some(target) = target else { continue };
            // Upsert the tracking row so the remote looks in sync.
            state
                .bookmark_rows
                .retain(|r| !(r["name"] == name.as_str() && r["remote"] == remote));
            state
                .bookmark_rows
                .push(remote_row(name, remote, &target, 0, 0));
        }
        state.pushed.push((bookmarks.to_vec(), remote.to_string()));
        Ok(())
    }

    async fn interdiff(&self, from: &str, to: &str) -> Result<String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .interdiffs
            .get(&(from.to_string(), to.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn rebase(&self, revsets: &[String], destination: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .rebases
            .push((revsets.to_vec(), destination.to_string()));
        Ok(())
    }
}

/// In-memory PR state backing [`MockService`].
#[derive(Default)]
pub struct ServiceState {
    pub prs: BTreeMap<u64, PrInfo>,
    pub comments: HashMap<u64, Vec<String>>,
    pub reviewers: HashMap<u64, Vec<String>>,
    pub next_pr: u64,
}

/// In-memory [`GitHubService`] double.
pub struct MockService {
    pub state: Mutex<ServiceState>,
    owner: String,
    repo: String,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServiceState {
                next_pr: 1,
                ..Default::default()
            }),
            owner: "testowner".to_string(),
            repo: "testrepo".to_string(),
        }
    }

    /// Seeds an open PR and returns its number.
    pub fn seed_pr(&self, head: &str, base: &str, title: &str, body: &str) -> u64 {
        let mut state = self.state.lock().unwrap();
        let number = state.next_pr;
        state.next_pr += 1;
        state.prs.insert(
            number,
            PrInfo {
                number,
                state: "OPEN".to_string(),
                url: format!("https://github.com/{}/{}/pull/{number}", self.owner, self.repo),
                title: title.to_string(),
                body: body.to_string(),
                head_ref_name: head.to_string(),
                base_ref_name: base.to_string(),
                is_draft: false,
            },
        );
        number
    }
}

#[async_trait]
impl GitHubService for MockService {
    async fn create_pr(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
        draft: bool,
    ) -> Result<PrInfo> {
        let mut state = self.state.lock().unwrap();
        let number = state.next_pr;
        state.next_pr += 1;
        let pr = PrInfo {
            number,
            state: "OPEN".to_string(),
            url: format!("https://github.com/{}/{}/pull/{number}", self.owner, self.repo),
            title: title.to_string(),
            body: body.to_string(),
            head_ref_name: head.to_string(),
            base_ref_name: base.to_string(),
            is_draft: draft,
        };
        state.prs.insert(number, pr.clone());
        Ok(pr)
    }

    async fn update_pr(&self, number: u64, opts: UpdatePrOpts) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(pr) = state.prs.get_mut(&number) {
            if let Some(title) = opts.title {
                pr.title = title;
            }
            if let Some(body) = opts.body {
                pr.body = body;
            }
            if let Some(base) = opts.base {
                pr.base_ref_name = base;
            }
            if let Some(draft) = opts.draft {
                pr.is_draft = draft;
            }
        }
        Ok(())
    }

    async fn comment_on_pr(&self, number: u64, body: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .comments
            .entry(number)
            .or_default()
            .push(body.to_string());
        Ok(())
    }

    async fn request_reviewers(&self, number: u64, reviewers: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .reviewers
            .entry(number)
            .or_default()
            .extend(reviewers.iter().cloned());
        Ok(())
    }

    async fn get_viewer(&self) -> Result<String> {
        Ok("testuser".to_string())
    }

    async fn lookup_prs_by_branch(&self, branches: &[String]) -> Result<HashMap<String, PrInfo>> {
        let state = self.state.lock().unwrap();
        let mut result = HashMap::new();
        for branch in branches {
            if let Some(pr) = state
                .prs
                .values()
                .find(|pr| pr.head_ref_name == *branch && pr.state == "OPEN")
            {
                result.insert(branch.clone(), pr.clone());
            }
        }
        Ok(result)
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn repo(&self) -> &str {
        &self.repo
    }
}
