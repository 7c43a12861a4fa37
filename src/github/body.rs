//! PR body and comment composition.

use std::fmt::Write;

/// Maximum total changed lines before file sections are collapsed by
/// default in interdiff comments.
const COLLAPSE_THRESHOLD: usize = 20;

/// Generates the markdown stack navigation block showing the current PR's
/// position in the stack. Renders empty for a single PR.
pub fn build_stack_block(pr_numbers: &[u64], current: u64) -> String {
    if pr_numbers.len() <= 1 {
        return String::new();
    }

    let mut b = String::from("PRs:\n");
    // Display top-to-bottom (newest first).
    for num in pr_numbers.iter().rev() {
        if *num == current {
            let _ = writeln!(b, "* ➡️ #{num}");
        } else {
            let _ = writeln!(b, "* #{num}");
        }
    }
    b
}

/// Generates the full body for a stacked PR. For a stack of one, the body
/// is exactly the commit body.
pub fn build_stacked_pr_body(
    commit_hash: &str,
    repo_full_name: &str,
    pr_number: u64,
    all_prs: &[u64],
    commit_body: &str,
) -> String {
    if all_prs.len() <= 1 {
        return commit_body.to_string();
    }

    let short_hash = &commit_hash[..commit_hash.len().min(7)];
    let commit_link =
        format!("https://github.com/{repo_full_name}/pull/{pr_number}/commits/{commit_hash}");

    let mut b = String::new();
    let _ = write!(
        b,
        "This is a stacked PR[^1]. Only review commit [{short_hash}]({commit_link}).\n\n"
    );

    b.push_str(&build_stack_block(all_prs, pr_number));

    if !commit_body.is_empty() {
        b.push_str("\n---\n\n");
        b.push_str(commit_body);
        b.push('\n');
    }

    b.push_str("\n[^1]: A stacked PR is a pull request that depends on other pull requests. ");
    b.push_str("The current PR depends on the ones listed below it and MUST NOT be merged before they are merged. ");
    b.push_str("The PRs listed above the current one in turn depend on it and won't be merged until the current one is. ");
    b.push_str("Learn more about [why](https://github.com/omarkohl/jip/blob/main/docs/why.md) and [how to review](https://github.com/omarkohl/jip/blob/main/docs/reviewing.md).\n");

    b
}

/// A single file's section of a unified diff.
struct FileDiff {
    /// The `b/` path extracted from the `diff --git` line.
    header: String,
    body: String,
}

/// Generates a PR comment with interdiff output, using collapsible sections
/// per file. An all-whitespace diff renders as a "No code changes" note.
pub fn build_diff_comment(
    code_diff: &str,
    repo_name: &str,
    base_branch: &str,
    old_commit: &str,
    new_commit: &str,
) -> String {
    let footer = range_diff_footer(repo_name, base_branch, old_commit, new_commit);

    if code_diff.trim().is_empty() {
        return format!(
            "### Changes since last push\n\n**No code changes** (likely just a rebase).\n{footer}"
        );
    }

    let files = parse_git_diff(code_diff);

    // Collapse everything when the total changed-line count (added plus
    // removed, excluding the +++/--- file headers) exceeds the threshold.
    let total_changed: usize = files
        .iter()
        .map(|f| {
            let (a, r) = diff_stats(&f.body);
            a + r
        })
        .sum();
    let expand = total_changed <= COLLAPSE_THRESHOLD;

    let mut b = String::from("### Changes since last push\n");
    for f in &files {
        let (added, removed) = diff_stats(&f.body);
        let open_attr = if expand { " open" } else { "" };
        let _ = write!(
            b,
            "\n<details{open_attr}>\n<summary><code>{}</code> (+{added}, -{removed})</summary>\n\n```diff\n{}\n```\n\n</details>\n",
            f.header, f.body
        );
    }

    b.push_str(&footer);
    b
}

/// Builds a footer with a GitHub compare link and local range-diff hints.
fn range_diff_footer(repo_name: &str, base_branch: &str, old_commit: &str, new_commit: &str) -> String {
    if old_commit.is_empty() || new_commit.is_empty() || repo_name.is_empty() {
        return String::new();
    }
    let old_short = &old_commit[..old_commit.len().min(7)];
    let new_short = &new_commit[..new_commit.len().min(7)];
    let compare_url = format!("https://github.com/{repo_name}/compare/{old_commit}..{new_commit}");
    format!(
        "\n---\n<sub>View the diff on [GitHub]({compare_url}) \
         (may include unrelated changes due to rebases since GitHub does not currently implement `git range-diff`).\n\
         View the diff locally (will only work if you fetched the older commit at some point):\n\
         `git range-diff {base_branch} {old_short} {new_short}`\n\
         `jj interdiff -f {old_short} -t {new_short}`\n\
         </sub>\n"
    )
}

/// Splits a unified diff into per-file sections on `diff --git ` lines.
fn parse_git_diff(diff: &str) -> Vec<FileDiff> {
    let mut files = Vec::new();
    let mut current: Option<FileDiff> = None;

    for line in diff.split('\n') {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            if let Some(mut f) = current.take() {
                f.body = f.body.trim_end_matches('\n').to_string();
                files.push(f);
            }
            // Keep the b/ path from "diff --git a/path b/path".
            let header = match rest.split_once(" b/") {
                Some((_, b_path)) => b_path.to_string(),
                None => line.to_string(),
            };
            current = Some(FileDiff {
                header,
                body: String::new(),
            });
            continue;
        }
        if let Some(f) = current.as_mut() {
            f.body.push_str(line);
            f.body.push('\n');
        }
    }
    if let Some(mut f) = current.take() {
        f.body = f.body.trim_end_matches('\n').to_string();
        files.push(f);
    }
    files
}

/// Counts added and removed lines in a diff chunk, excluding the
/// `+++`/`---` file headers.
fn diff_stats(chunk: &str) -> (usize, usize) {
    let mut added = 0;
    let mut removed = 0;
    for line in chunk.split('\n') {
        if line.starts_with('+') && !line.starts_with("+++") {
            added += 1;
        } else if line.starts_with('-') && !line.starts_with("---") {
            removed += 1;
        }
    }
    (added, removed)
}
