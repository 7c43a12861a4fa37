//! Bookmark state, sync classification, and assignment to changes.

use crate::error::{Error, Result};
use crate::jj::change::ChangeDag;
use crate::jj::runner::Runner;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// How a local bookmark relates to a remote copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    Unknown,
    /// Local and remote point to the same commit.
    InSync,
    /// Local has commits not on the remote (remote is behind).
    Ahead,
    /// Remote has commits not on local (remote is ahead).
    Behind,
    /// Both sides have unique commits.
    Diverged,
    /// Bookmark exists locally only.
    LocalOnly,
    /// Bookmark exists on the remote only.
    RemoteOnly,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncState::InSync => "in-sync",
            SyncState::Ahead => "ahead",
            SyncState::Behind => "behind",
            SyncState::Diverged => "diverged",
            SyncState::LocalOnly => "local-only",
            SyncState::RemoteOnly => "remote-only",
            SyncState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A bookmark's state on a specific remote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteBookmarkState {
    /// Commit ID on the remote.
    pub target: String,
    /// Whether this remote ref is tracked by jj.
    pub tracked: bool,
    /// Commits the remote is ahead of local.
    pub ahead: u32,
    /// Commits the remote is behind local.
    pub behind: u32,
}

/// The full state of a named bookmark across local and remotes.
#[derive(Debug, Clone, Default)]
pub struct BookmarkInfo {
    pub name: String,
    /// Local commit ID ("" if remote-only or conflicted).
    pub target: String,
    /// Local change ID ("" if remote-only or conflicted).
    pub change_id: String,
    /// Has a local target.
    pub present: bool,
    /// Bookmark is in conflicted state (multiple targets).
    pub conflict: bool,
    pub remotes: HashMap<String, RemoteBookmarkState>,
}

impl BookmarkInfo {
    /// Returns the sync state of this bookmark relative to the given remote.
    ///
    /// Note the inversion: a remote that is behind means the local bookmark
    /// is ahead, and vice versa. States are labeled from the local actor's
    /// viewpoint.
    pub fn sync_with(&self, remote: &str) -> SyncState {
        if self.conflict {
            return SyncState::Diverged;
        }
        let Some(rs) = self.remotes.get(remote) else {
            if self.present {
                return SyncState::LocalOnly;
            }
            return SyncState::Unknown;
        };
        if !self.present {
            return SyncState::RemoteOnly;
        }
        if rs.ahead > 0 && rs.behind > 0 {
            return SyncState::Diverged;
        }
        if rs.behind > 0 {
            return SyncState::Ahead;
        }
        if rs.ahead > 0 {
            return SyncState::Behind;
        }
        SyncState::InSync
    }
}

/// JSON structure of one `jj bookmark list` template row.
#[derive(Debug, Deserialize)]
struct RawBookmarkEntry {
    name: String,
    /// None for local entries.
    remote: Option<String>,
    present: bool,
    conflict: bool,
    target: String,
    change_id: String,
    #[serde(default)]
    tracked: bool,
    #[serde(default)]
    ahead: u32,
    #[serde(default)]
    behind: u32,
}

/// Parses JSONL output from `jj bookmark list --all-remotes` into grouped
/// [`BookmarkInfo`] entries. Rows for jj's internal "git" remote are
/// discarded. Grouping preserves first-occurrence order.
pub fn parse_bookmark_list(data: &[u8]) -> Result<Vec<BookmarkInfo>> {
    let text = std::str::from_utf8(data)
        .map_err(|e| Error::Parse(format!("invalid UTF-8 in bookmark list: {e}")))?;

    let mut result: Vec<BookmarkInfo> = Vec::new();
    let mut index_by_name: HashMap<String, usize> = HashMap::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let e: RawBookmarkEntry = serde_json::from_str(line)
            .map_err(|err| Error::Parse(format!("parsing bookmark entry: {err}")))?;

        if e.remote.as_deref() == Some("git") {
            continue;
        }

        let idx = match index_by_name.get(&e.name) {
            Some(&i) => i,
            None => {
                index_by_name.insert(e.name.clone(), result.len());
                result.push(BookmarkInfo {
                    name: e.name.clone(),
                    ..Default::default()
                });
                result.len() - 1
            }
        };
        let info = &mut result[idx];

        match e.remote {
            None => {
                info.present = e.present;
                info.conflict = e.conflict;
                info.target = e.target;
                info.change_id = e.change_id;
            }
            Some(remote) => {
                info.remotes.insert(
                    remote,
                    RemoteBookmarkState {
                        target: e.target,
                        tracked: e.tracked,
                        ahead: e.ahead,
                        behind: e.behind,
                    },
                );
            }
        }
    }

    Ok(result)
}

/// Returns a map from change ID to the bookmarks pointing at that change.
/// Matching is done via commit ID (local target); bookmarks that are not
/// present or have an empty target are skipped.
pub fn match_bookmarks_to_changes<'a>(
    dag: &ChangeDag,
    bookmarks: &'a [BookmarkInfo],
) -> HashMap<String, Vec<&'a BookmarkInfo>> {
    let commit_to_change: HashMap<&str, &str> = dag
        .changes
        .iter()
        .map(|c| (c.commit_id.as_str(), c.change_id.as_str()))
        .collect();

    let mut result: HashMap<String, Vec<&BookmarkInfo>> = HashMap::new();
    for b in bookmarks {
        if !b.present || b.target.is_empty() {
            continue;
        }
        if let Some(&change_id) = commit_to_change.get(b.target.as_str()) {
            result.entry(change_id.to_string()).or_default().push(b);
        }
    }
    result
}

/// The bookmark assignment for one change.
#[derive(Debug, Clone, Default)]
pub struct ChangeBookmark {
    pub change_id: String,
    pub bookmark: String,
    /// Bookmark was created by this run (not pre-existing).
    pub is_new: bool,
    /// Sync state relative to the push remote.
    pub sync_state: SyncState,
    /// Bookmark has conflicting targets (true divergence).
    pub conflict: bool,
    /// A bookmark with the generated name exists but no longer points at
    /// this change's commit.
    pub displaced: bool,
}

/// Assigns a bookmark to each change in the DAG. Changes that already have a
/// matching bookmark reuse it, subject to the `should_use_existing`
/// predicate. Changes without one get a bookmark with the canonical jip name,
/// created through the runner when `create_new` is set.
///
/// `should_use_existing` is called for each existing bookmark on a change in
/// encounter order; the first accepted bookmark wins. This is the extension
/// point for preferring branches that already have a PR.
///
/// With `dry_run`, assignments are computed (including generated names for
/// changes that would get a new bookmark) but nothing is created.
pub async fn ensure_bookmarks(
    runner: &dyn Runner,
    dag: &ChangeDag,
    bookmarks: &[BookmarkInfo],
    push_remote: &str,
    mut should_use_existing: impl FnMut(&str, &str) -> bool,
    create_new: bool,
    dry_run: bool,
) -> Result<Vec<ChangeBookmark>> {
    let matched = match_bookmarks_to_changes(dag, bookmarks);

    // Name lookup for detecting bookmarks that exist but point to a
    // different commit (e.g. after a fetch fast-forwarded the bookmark).
    let by_name: HashMap<&str, &BookmarkInfo> =
        bookmarks.iter().map(|b| (b.name.as_str(), b)).collect();

    let mut result = Vec::new();
    for change in &dag.changes {
        let existing = matched.get(change.change_id.as_str());

        let chosen = existing.and_then(|candidates| {
            candidates
                .iter()
                .find(|b| should_use_existing(&change.change_id, &b.name))
        });

        if let Some(b) = chosen {
            result.push(ChangeBookmark {
                change_id: change.change_id.clone(),
                bookmark: b.name.clone(),
                is_new: false,
                sync_state: b.sync_with(push_remote),
                conflict: b.conflict,
                displaced: false,
            });
            continue;
        }

        // No matching bookmark. Generate the canonical name and check
        // whether a bookmark by that name already exists pointing elsewhere.
        let short_id = &change.change_id[..change.change_id.len().min(8)];
        let name = generate_bookmark_name(&change.description, short_id);

        if let Some(bi) = by_name.get(name.as_str()) {
            result.push(ChangeBookmark {
                change_id: change.change_id.clone(),
                bookmark: name,
                is_new: false,
                sync_state: bi.sync_with(push_remote),
                conflict: bi.conflict,
                displaced: true,
            });
            continue;
        }

        if !create_new {
            continue;
        }

        if !dry_run {
            runner.bookmark_set(&name, &change.change_id).await?;
        }
        result.push(ChangeBookmark {
            change_id: change.change_id.clone(),
            bookmark: name,
            is_new: true,
            sync_state: SyncState::LocalOnly,
            conflict: false,
            displaced: false,
        });
    }
    Ok(result)
}

/// Creates a bookmark name following the jip convention:
/// `jip/<slugified-description>/<short-change-id>`.
pub fn generate_bookmark_name(description: &str, short_change_id: &str) -> String {
    let mut slug = slugify(description);
    if slug.is_empty() {
        slug = "change".to_string();
    }
    format!("jip/{slug}/{short_change_id}")
}

static CONVENTIONAL_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z]+(\([^)]*\))?!?:\s*").unwrap());

static NON_ALNUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

const MAX_SLUG_LEN: usize = 30;

/// Converts a commit description into a bookmark-safe slug: strips a
/// conventional-commit prefix, lowercases, collapses non-alphanumeric runs
/// to single hyphens, and truncates at a word boundary.
fn slugify(s: &str) -> String {
    let s = CONVENTIONAL_PREFIX_RE.replace(s, "");
    let s = s.to_lowercase();
    let s = NON_ALNUM_RE.replace_all(&s, "-");
    let mut s = s.trim_matches('-').to_string();

    // The slug is pure ASCII at this point, so byte truncation is safe.
    if s.len() > MAX_SLUG_LEN {
        s.truncate(MAX_SLUG_LEN);
        if let Some(i) = s.rfind('-') {
            if i > MAX_SLUG_LEN / 2 {
                s.truncate(i);
            }
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_row(name: &str, target: &str, change_id: &str) -> String {
        format!(
            r#"{{"name":"{name}","remote":null,"present":true,"conflict":false,"target":"{target}","change_id":"{change_id}","tracked":false,"ahead":0,"behind":0}}"#
        )
    }

    fn remote_row(name: &str, remote: &str, target: &str, ahead: u32, behind: u32) -> String {
        format!(
            r#"{{"name":"{name}","remote":"{remote}","present":true,"conflict":false,"target":"{target}","change_id":"","tracked":true,"ahead":{ahead},"behind":{behind}}}"#
        )
    }

    #[test]
    fn parse_groups_local_and_remote_rows() {
        let data = [
            local_row("feat", "aaa", "zzz"),
            remote_row("feat", "origin", "aaa", 0, 0),
        ]
        .join("\n");
        let bookmarks = parse_bookmark_list(data.as_bytes()).unwrap();
        assert_eq!(bookmarks.len(), 1);
        let b = &bookmarks[0];
        assert_eq!(b.name, "feat");
        assert!(b.present);
        assert_eq!(b.target, "aaa");
        assert_eq!(b.change_id, "zzz");
        assert_eq!(b.remotes["origin"].target, "aaa");
        assert!(b.remotes["origin"].tracked);
    }

    #[test]
    fn parse_filters_internal_git_remote() {
        let data = [
            local_row("feat", "aaa", "zzz"),
            remote_row("feat", "git", "aaa", 0, 0),
        ]
        .join("\n");
        let bookmarks = parse_bookmark_list(data.as_bytes()).unwrap();
        assert!(bookmarks[0].remotes.is_empty());
    }

    #[test]
    fn parse_preserves_first_occurrence_order() {
        let data = [
            local_row("second", "bbb", "yyy"),
            local_row("first", "aaa", "zzz"),
        ]
        .join("\n");
        let bookmarks = parse_bookmark_list(data.as_bytes()).unwrap();
        assert_eq!(bookmarks[0].name, "second");
        assert_eq!(bookmarks[1].name, "first");
    }

    #[test]
    fn parse_rejects_malformed_rows() {
        assert!(parse_bookmark_list(b"{oops\n").is_err());
    }

    #[test]
    fn sync_with_conflict_is_diverged() {
        let b = BookmarkInfo {
            conflict: true,
            present: true,
            ..Default::default()
        };
        assert_eq!(b.sync_with("origin"), SyncState::Diverged);
    }

    #[test]
    fn sync_with_no_remote_entry() {
        let present = BookmarkInfo {
            present: true,
            ..Default::default()
        };
        assert_eq!(present.sync_with("origin"), SyncState::LocalOnly);

        let absent = BookmarkInfo::default();
        assert_eq!(absent.sync_with("origin"), SyncState::Unknown);
    }

    fn with_remote(ahead: u32, behind: u32, present: bool) -> BookmarkInfo {
        let mut b = BookmarkInfo {
            present,
            ..Default::default()
        };
        b.remotes.insert(
            "origin".to_string(),
            RemoteBookmarkState {
                target: "ccc".to_string(),
                tracked: true,
                ahead,
                behind,
            },
        );
        b
    }

    #[test]
    fn sync_with_remote_present_never_unknown() {
        // Invariant: with a remote entry the result is never Unknown.
        for (ahead, behind) in [(0, 0), (1, 0), (0, 1), (2, 3)] {
            for present in [true, false] {
                let b = with_remote(ahead, behind, present);
                assert_ne!(b.sync_with("origin"), SyncState::Unknown);
            }
        }
    }

    #[test]
    fn sync_with_labels_from_local_viewpoint() {
        assert_eq!(with_remote(0, 0, true).sync_with("origin"), SyncState::InSync);
        // Remote behind means local is ahead.
        assert_eq!(with_remote(0, 2, true).sync_with("origin"), SyncState::Ahead);
        // Remote ahead means local is behind.
        assert_eq!(with_remote(2, 0, true).sync_with("origin"), SyncState::Behind);
        assert_eq!(
            with_remote(1, 1, true).sync_with("origin"),
            SyncState::Diverged
        );
        assert_eq!(
            with_remote(0, 0, false).sync_with("origin"),
            SyncState::RemoteOnly
        );
    }

    #[test]
    fn slugify_strips_conventional_prefix() {
        assert_eq!(slugify("feat: add login page"), "add-login-page");
        assert_eq!(slugify("fix(parser)!: handle EOF"), "handle-eof");
    }

    #[test]
    fn slugify_collapses_special_characters() {
        assert_eq!(slugify("Hello,  World!!"), "hello-world");
        assert_eq!(slugify("--already--dashed--"), "already-dashed");
    }

    #[test]
    fn slugify_truncates_at_word_boundary() {
        let slug = slugify("this is a very long description that keeps going");
        assert!(slug.len() <= 30);
        assert!(!slug.starts_with('-'));
        assert!(!slug.ends_with('-'));
        // Cut lands on a word boundary, not mid-word.
        assert_eq!(slug, "this-is-a-very-long");
    }

    #[test]
    fn slugify_charset_invariant() {
        for desc in ["feat: X", "über café", "!!!", "a", ""] {
            let slug = slugify(desc);
            assert!(slug.len() <= 30);
            assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            assert!(!slug.starts_with('-') && !slug.ends_with('-'));
        }
    }

    #[test]
    fn generate_bookmark_name_empty_description() {
        assert_eq!(generate_bookmark_name("", "abcd1234"), "jip/change/abcd1234");
    }

    #[test]
    fn generate_bookmark_name_is_deterministic() {
        let a = generate_bookmark_name("feat: add thing", "12345678");
        let b = generate_bookmark_name("feat: add thing", "12345678");
        assert_eq!(a, b);
        assert_eq!(a, "jip/add-thing/12345678");
    }
}
