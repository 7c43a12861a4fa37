//! Per-change stack membership.

use crate::send::ChangeState;
use std::collections::{HashMap, HashSet};

/// Computes per-change stack PR number lists. Each change's stack includes
/// only its ancestors and descendants (the dependency chain), not unrelated
/// branches in the same DAG. PR numbers are returned in the same topological
/// order as the input states.
pub fn compute_stack_prs(states: &[ChangeState]) -> Vec<Vec<u64>> {
    let idx_by_change: HashMap<&str, usize> = states
        .iter()
        .enumerate()
        .map(|(i, s)| (s.change.change_id.as_str(), i))
        .collect();

    // Child edges (parent -> children) within the known set.
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for s in states {
        for pid in &s.change.parent_ids {
            if idx_by_change.contains_key(pid.as_str()) {
                children
                    .entry(pid.as_str())
                    .or_default()
                    .push(s.change.change_id.as_str());
            }
        }
    }

    let mut result = Vec::with_capacity(states.len());
    for s in states {
        let own_id = s.change.change_id.as_str();
        let mut relevant: HashSet<&str> = HashSet::new();
        relevant.insert(own_id);

        // Walk ancestors (follow parent edges).
        let mut stack = vec![own_id];
        while let Some(cur) = stack.pop() {
            for pid in &states[idx_by_change[cur]].change.parent_ids {
                if idx_by_change.contains_key(pid.as_str()) && relevant.insert(pid.as_str()) {
                    stack.push(pid.as_str());
                }
            }
        }

        // Walk descendants (follow child edges).
        let mut stack = vec![own_id];
        while let Some(cur) = stack.pop() {
            if let Some(kids) = children.get(cur) {
                for &kid in kids {
                    if relevant.insert(kid) {
                        stack.push(kid);
                    }
                }
            }
        }

        // Collect PR numbers preserving topological order.
        let prs = states
            .iter()
            .filter(|st| relevant.contains(st.change.change_id.as_str()))
            .filter_map(|st| st.pr.as_ref().map(|p| p.number))
            .collect();
        result.push(prs);
    }
    result
}
