//! The send pipeline: resolve stacks, ensure bookmarks, push branches, and
//! create or update PRs.

mod stack;

pub use stack::compute_stack_prs;

use crate::error::{Error, Result};
use crate::github::{build_diff_comment, build_stacked_pr_body, GitHubService, PrInfo, UpdatePrOpts};
use crate::jj::{
    ensure_bookmarks, parse_bookmark_list, resolve_stacks, Change, ChangeBookmark, ChangeDag,
    Runner, SyncState,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Write;
use tracing::warn;

/// Configuration for one send run.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Base branch PRs target.
    pub base: String,
    /// Push remote name.
    pub remote: String,
    /// Upstream as a named remote (for fetching); None when the upstream is
    /// a bare URL or absent.
    pub upstream_remote: Option<String>,
    /// Owner parsed from the push remote, set for cross-fork PRs to prefix
    /// the head ref.
    pub push_owner: Option<String>,
    pub dry_run: bool,
    pub draft: bool,
    /// Only update PRs that already exist.
    pub existing_only: bool,
    /// Send only the tip of each stack as a single PR.
    pub no_stack: bool,
    /// Rebase the revsets onto the base before resolving.
    pub rebase: bool,
    pub reviewers: Vec<String>,
    pub revsets: Vec<String>,
}

/// Per-change working record maintained by the pipeline.
#[derive(Debug, Clone)]
pub struct ChangeState {
    pub change: Change,
    pub bookmark: ChangeBookmark,
    /// None if no existing PR.
    pub pr: Option<PrInfo>,
    /// PR was created by this run.
    pub is_new: bool,
    /// Existing PR was modified by this run (title, body, or interdiff).
    pub changed: bool,
}

/// Why a change was skipped during send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// An ancestor in the set was skipped; cites the root cause.
    AncestorSkipped { ancestor: String },
    /// A bookmark with the generated name exists but points elsewhere.
    Displaced,
    /// The bookmark has conflicting targets.
    Diverged,
    /// The remote is ahead of local.
    Behind,
    /// jj reports the commit as conflicted.
    HasConflicts,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::AncestorSkipped { .. } => "skipped because ancestor was skipped",
            SkipReason::Displaced => "remote is ahead of local — pull changes or reset the bookmark",
            SkipReason::Diverged => {
                "local and remote have diverged — resolve with `jj bookmark set` or force-push"
            }
            SkipReason::Behind => "remote is ahead of local — pull changes first",
            SkipReason::HasConflicts => "has conflicts",
        };
        f.write_str(s)
    }
}

fn short12(id: &str) -> &str {
    &id[..id.len().min(12)]
}

/// Runs the core send algorithm: resolve stacks, ensure bookmarks, push
/// branches, and create or update PRs. Progress and the final summary are
/// written to `w`.
pub async fn execute_send(
    runner: &dyn Runner,
    client: &dyn GitHubService,
    opts: &SendOptions,
    w: &mut dyn Write,
) -> Result<()> {
    // Fetch from the push remote (and the upstream if it's a distinct
    // named remote).
    writeln!(w, "Fetching {}...", opts.remote)?;
    runner.git_fetch(&opts.remote).await?;
    if let Some(upstream) = &opts.upstream_remote {
        if upstream != &opts.remote {
            writeln!(w, "Fetching {upstream}...")?;
            runner.git_fetch(upstream).await?;
        }
    }

    if opts.rebase {
        writeln!(w, "Rebasing onto {}...", opts.base)?;
        runner.rebase(&opts.revsets, &opts.base).await?;
    }

    let repo_full_name = format!("{}/{}", client.owner(), client.repo());

    // Resolve stacks.
    let mut dags = resolve_stacks(runner, &opts.revsets, &opts.base).await?;
    if dags.is_empty() {
        writeln!(w, "No changes to send.")?;
        return Ok(());
    }

    // With --no-stack, reduce each DAG to its tip (leaf) change only.
    if opts.no_stack {
        let mut reduced = Vec::with_capacity(dags.len());
        for dag in dags {
            let leaves = dag.leaf_changes();
            if leaves.len() != 1 {
                return Err(Error::Topology(leaves.len()));
            }
            let tip = leaves[0].clone();
            reduced.push(ChangeDag::singleton(tip));
        }
        dags = reduced;
    }

    // Bookmark inventory.
    let bookmark_data = runner.bookmark_list().await?;
    let bookmarks = parse_bookmark_list(&bookmark_data)?;
    let bookmark_by_name: HashMap<&str, &crate::jj::BookmarkInfo> =
        bookmarks.iter().map(|b| (b.name.as_str(), b)).collect();

    // Collect all remote branches referenced by any change, then look up
    // existing PRs in one query.
    let mut remote_branches = Vec::new();
    let mut seen = HashSet::new();
    for dag in &dags {
        for change in &dag.changes {
            for name in &change.bookmarks {
                let Some(bi) = bookmark_by_name.get(name.as_str()) else {
                    continue;
                };
                if bi.remotes.contains_key(&opts.remote) && seen.insert(name.clone()) {
                    remote_branches.push(name.clone());
                }
            }
        }
    }

    let pr_map = client.lookup_prs_by_branch(&remote_branches).await?;

    // Assign bookmarks per DAG and build the flat state list.
    let mut all_states: Vec<ChangeState> = Vec::new();
    for dag in &dags {
        // Prefer bookmarks that already have a PR, then any jip/ bookmark.
        let should_use =
            |_change_id: &str, name: &str| pr_map.contains_key(name) || name.starts_with("jip/");

        let results = ensure_bookmarks(
            runner,
            dag,
            &bookmarks,
            &opts.remote,
            should_use,
            !opts.existing_only,
            opts.dry_run,
        )
        .await?;

        let mut bm_by_change: HashMap<&str, &ChangeBookmark> =
            HashMap::with_capacity(results.len());
        for r in &results {
            bm_by_change.insert(r.change_id.as_str(), r);
        }

        for change in &dag.changes {
            let bm = bm_by_change
                .get(change.change_id.as_str())
                .map(|r| (*r).clone())
                .unwrap_or_default();
            let existing_pr = pr_map.get(&bm.bookmark).cloned();
            all_states.push(ChangeState {
                change: change.clone(),
                bookmark: bm,
                pr: existing_pr,
                is_new: false,
                changed: false,
            });
        }
    }

    // Filter to existing PRs only when --existing is set.
    if opts.existing_only {
        let before = all_states.len();
        all_states.retain(|s| s.pr.is_some());
        let skipped = before - all_states.len();
        if skipped > 0 {
            writeln!(w, "\nSkipping {skipped} change(s) without existing PRs.")?;
        }
        if all_states.is_empty() {
            writeln!(w, "No existing PRs to update.")?;
            return Ok(());
        }
    }

    // Detect unsafe bookmarks and skip them plus all their descendants.
    // Topological iteration makes the cascade order-independent.
    let mut skipped_ids: HashMap<String, SkipReason> = HashMap::new();
    for s in &all_states {
        let ancestor = s
            .change
            .parent_ids
            .iter()
            .find(|pid| skipped_ids.contains_key(pid.as_str()));
        if let Some(pid) = ancestor {
            skipped_ids.insert(
                s.change.change_id.clone(),
                SkipReason::AncestorSkipped {
                    ancestor: pid.clone(),
                },
            );
            continue;
        }
        let reason = if s.bookmark.displaced {
            Some(SkipReason::Displaced)
        } else if s.bookmark.conflict {
            Some(SkipReason::Diverged)
        } else if s.bookmark.sync_state == SyncState::Behind {
            Some(SkipReason::Behind)
        } else if s.change.conflict {
            Some(SkipReason::HasConflicts)
        } else {
            None
        };
        if let Some(r) = reason {
            skipped_ids.insert(s.change.change_id.clone(), r);
        }
    }

    let (skipped_states, mut active_states): (Vec<ChangeState>, Vec<ChangeState>) = all_states
        .into_iter()
        .partition(|s| skipped_ids.contains_key(s.change.change_id.as_str()));

    if opts.dry_run {
        writeln!(
            w,
            "\nDry run — {} change(s) would be sent:\n",
            active_states.len()
        )?;
        for s in &active_states {
            let action = match &s.pr {
                Some(pr) => format!("UPDATE #{}", pr.number),
                None => "CREATE".to_string(),
            };
            let bm_status = if s.bookmark.is_new { "new" } else { "existing" };
            writeln!(
                w,
                "  {action}  {}  {}",
                short12(&s.change.change_id),
                s.change.description
            )?;
            writeln!(w, "         bookmark: {} ({bm_status})", s.bookmark.bookmark)?;
        }
        if !skipped_states.is_empty() {
            print_skipped_changes(w, &skipped_states, &skipped_ids)?;
            return Err(Error::Skipped(skipped_states.len()));
        }
        return Ok(());
    }

    if !active_states.is_empty() {
        // Push all bookmarks in one invocation.
        let push_bookmarks: Vec<String> = active_states
            .iter()
            .map(|s| s.bookmark.bookmark.clone())
            .collect();
        writeln!(w, "\nPushing {} bookmark(s)...", push_bookmarks.len())?;
        runner.git_push(&push_bookmarks, true, &opts.remote).await?;

        // Create or update PRs in topological order.
        for i in 0..active_states.len() {
            let (change, bookmark, existing_pr) = {
                let s = &active_states[i];
                (s.change.clone(), s.bookmark.clone(), s.pr.clone())
            };

            if let Some(pr) = existing_pr {
                // Existing PR: update the title if it drifted, then post an
                // interdiff comment when the remote commit differs.
                if pr.title != change.description {
                    client
                        .update_pr(
                            pr.number,
                            UpdatePrOpts {
                                title: Some(change.description.clone()),
                                ..Default::default()
                            },
                        )
                        .await
                        .map_err(|e| {
                            Error::Api(format!("updating PR #{} title: {e}", pr.number))
                        })?;
                    active_states[i].changed = true;
                }

                if let Some(bi) = bookmark_by_name.get(bookmark.bookmark.as_str()) {
                    if let Some(rs) = bi.remotes.get(&opts.remote) {
                        if !rs.target.is_empty() && rs.target != change.commit_id {
                            match runner.interdiff(&rs.target, &change.commit_id).await {
                                Err(e) => {
                                    warn!(pr = pr.number, error = %e, "interdiff failed");
                                    writeln!(
                                        w,
                                        "  warning: interdiff failed for #{}: {e}",
                                        pr.number
                                    )?;
                                }
                                Ok(diff) => {
                                    let comment = build_diff_comment(
                                        &diff,
                                        &repo_full_name,
                                        &opts.base,
                                        &rs.target,
                                        &change.commit_id,
                                    );
                                    client.comment_on_pr(pr.number, &comment).await.map_err(
                                        |e| {
                                            Error::Api(format!(
                                                "commenting on PR #{}: {e}",
                                                pr.number
                                            ))
                                        },
                                    )?;
                                    active_states[i].changed = true;
                                }
                            }
                        }
                    }
                }
            } else {
                // New PR.
                let title = if change.description.is_empty() {
                    format!("jip: {}", short12(&change.change_id))
                } else {
                    change.description.clone()
                };
                let head = match &opts.push_owner {
                    Some(owner) => format!("{owner}:{}", bookmark.bookmark),
                    None => bookmark.bookmark.clone(),
                };
                let pr = client
                    .create_pr(&head, &opts.base, &title, "", opts.draft)
                    .await
                    .map_err(|e| {
                        Error::Api(format!("creating PR for {}: {e}", change.change_id))
                    })?;
                let number = pr.number;
                active_states[i].pr = Some(pr);
                active_states[i].is_new = true;

                if !opts.reviewers.is_empty() {
                    if let Err(e) = client.request_reviewers(number, &opts.reviewers).await {
                        warn!(pr = number, error = %e, "failed to add reviewers");
                        writeln!(w, "  warning: failed to add reviewers to #{number}: {e}")?;
                    }
                }
            }
        }

        // Update all PR bodies with stack navigation (skipped with
        // --no-stack). Each PR's stack only includes its ancestors and
        // descendants, not unrelated branches in the same DAG.
        if !opts.no_stack {
            let per_change_stack = compute_stack_prs(&active_states);

            for i in 0..active_states.len() {
                let Some(pr) = active_states[i].pr.clone() else {
                    continue;
                };
                let body = build_stacked_pr_body(
                    &active_states[i].change.commit_id,
                    &repo_full_name,
                    pr.number,
                    &per_change_stack[i],
                    // Only the first line of the message is available here.
                    "",
                );
                if body != pr.body {
                    client
                        .update_pr(
                            pr.number,
                            UpdatePrOpts {
                                body: Some(body),
                                ..Default::default()
                            },
                        )
                        .await
                        .map_err(|e| {
                            Error::Api(format!("updating PR #{} body: {e}", pr.number))
                        })?;
                    active_states[i].changed = true;
                }
            }
        }

        // Summary.
        writeln!(w, "\n{} PR(s) sent:\n", active_states.len())?;
        for s in &active_states {
            let action = if s.is_new {
                "created"
            } else if s.changed {
                "updated"
            } else {
                "up-to-date"
            };
            let (number, url) = match &s.pr {
                Some(pr) => (pr.number, pr.url.as_str()),
                None => (0, ""),
            };
            writeln!(w, "  #{number:<4} {action}  {url}")?;
            writeln!(
                w,
                "         {}  {}",
                short12(&s.change.change_id),
                s.change.description
            )?;
        }
    }

    if !skipped_states.is_empty() {
        print_skipped_changes(w, &skipped_states, &skipped_ids)?;
        return Err(Error::Skipped(skipped_states.len()));
    }
    Ok(())
}

/// Reports changes that were skipped due to unsafe bookmark state.
fn print_skipped_changes(
    w: &mut dyn Write,
    skipped: &[ChangeState],
    reasons: &HashMap<String, SkipReason>,
) -> Result<()> {
    writeln!(w, "\nSkipped {} change(s):\n", skipped.len())?;
    for s in skipped {
        writeln!(
            w,
            "  {}  {}",
            short12(&s.change.change_id),
            s.change.description
        )?;
        if let Some(r) = reasons.get(s.change.change_id.as_str()) {
            writeln!(w, "         {r}")?;
        }
    }
    Ok(())
}
