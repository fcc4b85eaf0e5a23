use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::debug;

use crate::errors::ScoutResult;
use crate::query::SearchQuery;

/// A source of candidate files for a single keyword.
///
/// Candidates are a superset filter: a file returned for a keyword may still fail
/// verification, but a file containing the keyword must never be left out.
pub trait CandidateDiscovery {
    /// Short name used in log messages
    fn name(&self) -> &'static str;

    /// Files that may contain `keyword` under the flags of `query`
    fn candidates_for(&self, keyword: &str, query: &SearchQuery)
        -> ScoutResult<BTreeSet<PathBuf>>;
}

/// Intersects the per-keyword candidate sets of every query keyword.
///
/// Stops asking the discovery as soon as the running intersection is empty.
pub fn intersect_candidates(
    discovery: &dyn CandidateDiscovery,
    query: &SearchQuery,
) -> ScoutResult<BTreeSet<PathBuf>> {
    let mut running: Option<BTreeSet<PathBuf>> = None;
    for keyword in query.keywords() {
        let found = discovery.candidates_for(keyword, query)?;
        debug!(
            "{}: {} candidates for '{}'",
            discovery.name(),
            found.len(),
            keyword
        );
        let next = match running {
            None => found,
            Some(current) => current.intersection(&found).cloned().collect(),
        };
        if next.is_empty() {
            debug!("{}: intersection is empty after '{}'", discovery.name(), keyword);
            return Ok(next);
        }
        running = Some(next);
    }
    Ok(running.unwrap_or_default())
}
