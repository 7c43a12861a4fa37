//! Change records and DAG construction.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// A single jj change in a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub change_id: String,
    pub commit_id: String,
    /// First line of the commit message.
    pub description: String,
    pub parent_ids: Vec<String>,
    /// Local bookmark names pointing at this change.
    pub bookmarks: Vec<String>,
    /// Whether jj reports the commit as conflicted.
    #[serde(default)]
    pub conflict: bool,
}

/// A connected DAG of changes, topologically sorted with roots (closest to
/// the base) first.
#[derive(Debug, Clone)]
pub struct ChangeDag {
    pub changes: Vec<Change>,
    by_id: HashMap<String, usize>,
}

impl ChangeDag {
    /// Builds a DAG holding a single change.
    pub fn singleton(change: Change) -> Self {
        let mut by_id = HashMap::new();
        by_id.insert(change.change_id.clone(), 0);
        Self {
            changes: vec![change],
            by_id,
        }
    }

    pub fn get(&self, change_id: &str) -> Option<&Change> {
        self.by_id.get(change_id).map(|&i| &self.changes[i])
    }

    pub fn contains(&self, change_id: &str) -> bool {
        self.by_id.contains_key(change_id)
    }

    /// Returns changes that have no children within this DAG (the "tips"),
    /// in input order.
    pub fn leaf_changes(&self) -> Vec<&Change> {
        let mut has_child: HashMap<&str, bool> = HashMap::new();
        for c in &self.changes {
            for pid in &c.parent_ids {
                if self.by_id.contains_key(pid) {
                    has_child.insert(pid.as_str(), true);
                }
            }
        }
        self.changes
            .iter()
            .filter(|c| !has_child.contains_key(c.change_id.as_str()))
            .collect()
    }
}

/// Parses JSONL output from `jj log` into a list of changes. Blank lines
/// are tolerated.
pub fn parse_changes(data: &[u8]) -> Result<Vec<Change>> {
    let text = std::str::from_utf8(data)
        .map_err(|e| Error::Parse(format!("invalid UTF-8 in jj log output: {e}")))?;
    let mut changes = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let c: Change = serde_json::from_str(line)
            .map_err(|e| Error::Parse(format!("parsing change: {e}")))?;
        changes.push(c);
    }
    Ok(changes)
}

/// Splits a flat list of changes into connected components and returns each
/// as a topologically sorted [`ChangeDag`].
///
/// Parent IDs that don't appear in the input are ignored for component
/// detection; they reference changes outside the resolved range (e.g. the
/// base branch).
pub fn build_dags(changes: Vec<Change>) -> Result<Vec<ChangeDag>> {
    if changes.is_empty() {
        return Ok(Vec::new());
    }

    // Index all known change IDs, rejecting duplicates.
    let mut known: HashMap<&str, usize> = HashMap::with_capacity(changes.len());
    for (i, c) in changes.iter().enumerate() {
        if known.insert(c.change_id.as_str(), i).is_some() {
            return Err(Error::Graph(format!(
                "duplicate change ID {:?}",
                c.change_id
            )));
        }
    }

    // Union-find over parent-child edges within the known set.
    let mut parent: Vec<usize> = (0..changes.len()).collect();
    fn find(parent: &mut Vec<usize>, x: usize) -> usize {
        if parent[x] != x {
            let root = find(parent, parent[x]);
            parent[x] = root;
        }
        parent[x]
    }
    for i in 0..changes.len() {
        for pid in &changes[i].parent_ids {
            if let Some(&j) = known.get(pid.as_str()) {
                let ri = find(&mut parent, i);
                let rj = find(&mut parent, j);
                if ri != rj {
                    parent[ri] = rj;
                }
            }
        }
    }

    // Group members by component root. BTreeMap keeps roots sorted so the
    // output order is deterministic.
    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..changes.len() {
        let r = find(&mut parent, i);
        components.entry(r).or_default().push(i);
    }

    let mut dags = Vec::with_capacity(components.len());
    for members in components.into_values() {
        dags.push(topo_sort(&changes, &members)?);
    }
    Ok(dags)
}

/// Kahn's algorithm over one component, returning a DAG ordered roots-first.
/// Ties are broken lexicographically on change ID.
fn topo_sort(all: &[Change], member_indices: &[usize]) -> Result<ChangeDag> {
    let in_component: HashMap<&str, usize> = member_indices
        .iter()
        .map(|&i| (all[i].change_id.as_str(), i))
        .collect();

    // In-degree counts only parents within the component.
    let mut in_degree: HashMap<&str, usize> = HashMap::with_capacity(member_indices.len());
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for &i in member_indices {
        let c = &all[i];
        in_degree.entry(c.change_id.as_str()).or_insert(0);
        for pid in &c.parent_ids {
            if in_component.contains_key(pid.as_str()) {
                *in_degree.entry(c.change_id.as_str()).or_insert(0) += 1;
                children
                    .entry(pid.as_str())
                    .or_default()
                    .push(c.change_id.as_str());
            }
        }
    }

    // Seed with zero in-degree nodes, sorted for determinism.
    let mut queue: VecDeque<&str> = member_indices
        .iter()
        .map(|&i| all[i].change_id.as_str())
        .filter(|id| in_degree[id] == 0)
        .collect();
    queue.make_contiguous().sort_unstable();

    let mut sorted = Vec::with_capacity(member_indices.len());
    let mut by_id = HashMap::with_capacity(member_indices.len());
    while let Some(id) = queue.pop_front() {
        let idx = in_component[id];
        by_id.insert(id.to_string(), sorted.len());
        sorted.push(all[idx].clone());

        let mut kids = children.remove(id).unwrap_or_default();
        kids.sort_unstable();
        for kid in kids {
            if let Some(d) = in_degree.get_mut(kid) {
                *d -= 1;
                if *d == 0 {
                    queue.push_back(kid);
                }
            }
        }
    }

    if sorted.len() != member_indices.len() {
        return Err(Error::Graph(format!(
            "cycle detected in change graph ({} of {} changes sorted)",
            sorted.len(),
            member_indices.len()
        )));
    }

    Ok(ChangeDag {
        changes: sorted,
        by_id,
    })
}
