//! Revset resolution into stacks.

use crate::error::{Error, Result};
use crate::jj::change::{build_dags, parse_changes, ChangeDag};
use crate::jj::runner::Runner;

/// Resolves one or more revsets against a base branch and returns the
/// changes organized into connected DAGs. Each DAG is an independent stack
/// of changes between the base and the given revsets.
pub async fn resolve_stacks(
    runner: &dyn Runner,
    revsets: &[String],
    base: &str,
) -> Result<Vec<ChangeDag>> {
    if revsets.is_empty() {
        return Err(Error::InvalidArgument("no revsets provided".to_string()));
    }
    if base.is_empty() {
        return Err(Error::InvalidArgument("no base revset provided".to_string()));
    }

    // Combined revset: (base)..(rev1 | rev2 | ...)
    let heads = revsets.join(" | ");
    let revset = format!("({base})..({heads})");

    let out = runner.log(&revset).await?;
    let changes = parse_changes(&out)?;
    build_dags(changes)
}
