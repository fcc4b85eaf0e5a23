use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::cache::ResultCache;
use crate::config::SearchConfig;
use crate::errors::{ScoutResult, SearchError};
use crate::filters::{collect_candidates, resolve_root};
use crate::index::{IndexStatus, IndexStore, SearchIndex};
use crate::progress::{
    CancellationSignal, NeverCancel, NoProgress, ProgressSink, ProgressUpdate, COMPLETE,
    DISCOVERY_DONE, SCAN_DONE,
};
use crate::query::SearchQuery;
use crate::results::{SearchOutput, SearchResult, SearchSource};
use crate::search::fast_path::{search_fast_path, RipgrepDiscovery};
use crate::search::processor::FileProcessor;
use crate::search::scheduler::{worker_count, ScanScheduler};

/// Owns everything one workspace search needs: its configuration, the result cache and
/// the index handle.
///
/// A query is routed through, in order:
/// 1. the result cache, when the query refines the previous one
/// 2. the persisted index, when `use_index` is set (rebuilt if missing or stale)
/// 3. the `rg` fast path, when `use_fast_path` is set and `rg` is installed
/// 4. the internal scanner
///
/// Failures in steps 2 and 3 fall through to the next step. Every route verifies files
/// with the same matcher and returns results sorted by relative path.
#[derive(Debug)]
pub struct SearchSession {
    config: SearchConfig,
    root: PathBuf,
    cache: ResultCache,
    index: IndexStore,
}

impl SearchSession {
    /// Opens a session on `config.root_path`, which must be an existing directory
    pub fn new(config: SearchConfig) -> ScoutResult<Self> {
        let root = resolve_root(&config.root_path)?;
        let index = IndexStore::for_config(&root, &config);
        debug!("Opened search session on {}", root.display());
        Ok(Self {
            config,
            root,
            cache: ResultCache::new(),
            index,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn index_store(&self) -> &IndexStore {
        &self.index
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Searches for files containing every keyword, using the configured flags
    pub fn search<I, S>(&mut self, keywords: I) -> ScoutResult<SearchOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let query = SearchQuery::from_config(keywords, &self.config)?;
        self.search_query(&query, &NoProgress, &NeverCancel)
    }

    /// Runs `query`, reporting progress and polling `cancel` between batches.
    ///
    /// A cancelled query returns the results found so far and is not cached.
    pub fn search_query(
        &mut self,
        query: &SearchQuery,
        progress: &dyn ProgressSink,
        cancel: &dyn CancellationSignal,
    ) -> ScoutResult<SearchOutput> {
        if !self.root.is_dir() {
            return Err(SearchError::no_workspace(&self.root));
        }
        info!("Searching {} for {:?}", self.root.display(), query.keywords());

        if let Some(output) = self.cache.refine(query) {
            info!("Answered from cached results ({} files)", output.len());
            progress.report(ProgressUpdate::at(COMPLETE, "Refined previous results"));
            self.cache.store(query.clone(), &output);
            return Ok(output);
        }

        progress.report(ProgressUpdate::at(0.0, "Discovering files"));
        let candidates = collect_candidates(&self.root, &self.config)?;
        progress.report(ProgressUpdate::at(
            DISCOVERY_DONE,
            format!("Found {} files", candidates.len()),
        ));

        let (source, results) = self.route(query, &candidates, progress, cancel)?;

        progress.report(ProgressUpdate::at(SCAN_DONE, "Finalizing"));
        let output = SearchOutput::from_results(source, results, candidates.len());
        progress.report(ProgressUpdate::at(
            COMPLETE,
            format!("{} matching files", output.len()),
        ));
        info!(
            "Found {} files with {} matches via {}",
            output.len(),
            output.total_matches,
            source
        );

        if cancel.is_cancelled() {
            debug!("Query was cancelled, not caching partial results");
        } else {
            self.cache.store(query.clone(), &output);
        }
        Ok(output)
    }

    fn route(
        &mut self,
        query: &SearchQuery,
        candidates: &[PathBuf],
        progress: &dyn ProgressSink,
        cancel: &dyn CancellationSignal,
    ) -> ScoutResult<(SearchSource, Vec<SearchResult>)> {
        if self.config.use_index {
            let answer = self
                .index
                .ensure_fresh(candidates, &self.config)
                .and_then(|index| index.search(query, &self.config));
            match answer {
                Ok(results) => return Ok((SearchSource::Index, results)),
                Err(e) => warn!("Index unavailable, searching files instead: {}", e),
            }
        }

        let processor = FileProcessor::new(query, &self.config, &self.root);
        let scheduler = ScanScheduler::new(&processor, worker_count(self.config.thread_count));

        if self.config.use_fast_path {
            let delegate = RipgrepDiscovery::new(&self.root, &self.config);
            match search_fast_path(&delegate, query, candidates, &scheduler, progress, cancel) {
                Ok(results) => return Ok((SearchSource::FastPath, results)),
                Err(e) => debug!("Fast path unavailable, scanning instead: {}", e),
            }
        }

        let results = scheduler.run(candidates.to_vec(), progress, cancel)?;
        Ok((SearchSource::Scan, results))
    }

    /// Builds the index for the current tree and persists it
    pub fn build_index(&mut self) -> ScoutResult<&SearchIndex> {
        if !self.root.is_dir() {
            return Err(SearchError::no_workspace(&self.root));
        }
        let candidates = collect_candidates(&self.root, &self.config)?;
        self.index.build(&candidates, &self.config)
    }

    pub fn index_status(&self) -> ScoutResult<IndexStatus> {
        self.index.status()
    }

    /// Deletes the persisted index. Returns whether there was one.
    pub fn clear_index(&mut self) -> ScoutResult<bool> {
        self.index.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::CancellationToken;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn corpus() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("A.txt"), "alpha beta\ngamma").unwrap();
        fs::write(dir.path().join("B.txt"), "alpha only").unwrap();
        fs::write(dir.path().join("C.txt"), "beta only").unwrap();
        dir
    }

    fn config(root: &Path) -> SearchConfig {
        SearchConfig {
            root_path: root.to_path_buf(),
            use_fast_path: false,
            ..SearchConfig::default()
        }
    }

    #[test]
    fn test_missing_root() {
        let dir = tempdir().unwrap();
        let result = SearchSession::new(config(&dir.path().join("nope")));
        assert!(matches!(result, Err(SearchError::NoWorkspace(_))));
    }

    #[test]
    fn test_root_removed_after_open() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("work");
        fs::create_dir(&root).unwrap();
        let mut session = SearchSession::new(config(&root)).unwrap();
        fs::remove_dir(&root).unwrap();
        assert!(matches!(
            session.search(["alpha"]),
            Err(SearchError::NoWorkspace(_))
        ));
    }

    #[test]
    fn test_scan_then_cache() {
        let dir = corpus();
        let mut session = SearchSession::new(config(dir.path())).unwrap();

        let first = session.search(["alpha"]).unwrap();
        assert_eq!(first.source, SearchSource::Scan);
        assert_eq!(first.relative_paths(), vec!["A.txt", "B.txt"]);
        assert_eq!(first.files_searched, 3);

        let refined = session.search(["alpha", "beta"]).unwrap();
        assert_eq!(refined.source, SearchSource::Cache);
        assert_eq!(refined.relative_paths(), vec!["A.txt"]);

        // the refined answer becomes the cached one
        let again = session.search(["alpha", "beta", "gamma"]).unwrap();
        assert_eq!(again.source, SearchSource::Cache);
        assert_eq!(again.relative_paths(), vec!["A.txt"]);

        session.clear_cache();
        let fresh = session.search(["alpha", "beta", "gamma", "delta"]).unwrap();
        assert_eq!(fresh.source, SearchSource::Scan);
        assert!(fresh.is_empty());
    }

    #[test]
    fn test_invalid_query() {
        let dir = corpus();
        let mut session = SearchSession::new(config(dir.path())).unwrap();
        assert!(matches!(
            session.search(["  "]),
            Err(SearchError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_index_route() {
        let dir = corpus();
        let cfg = SearchConfig {
            use_index: true,
            ..config(dir.path())
        };
        let mut session = SearchSession::new(cfg).unwrap();
        let output = session.search(["beta", "alpha"]).unwrap();
        assert_eq!(output.source, SearchSource::Index);
        assert_eq!(output.relative_paths(), vec!["A.txt"]);
        assert!(session.index_store().exists());

        let status = session.index_status().unwrap();
        assert_eq!(status.total_files, 3);

        // corrupt index is rebuilt transparently
        fs::write(session.index_store().location(), "{").unwrap();
        session.clear_cache();
        let mut reopened = SearchSession::new(session.config().clone()).unwrap();
        let output = reopened.search(["gamma"]).unwrap();
        assert_eq!(output.source, SearchSource::Index);
        assert_eq!(output.relative_paths(), vec!["A.txt"]);

        assert!(reopened.clear_index().unwrap());
        assert!(!reopened.index_store().exists());
    }

    #[test]
    fn test_index_sees_new_files() {
        let dir = corpus();
        let cfg = SearchConfig {
            use_index: true,
            ..config(dir.path())
        };
        let mut session = SearchSession::new(cfg).unwrap();
        session.build_index().unwrap();

        fs::write(dir.path().join("D.txt"), "beta and alpha").unwrap();
        let output = session.search(["alpha", "beta"]).unwrap();
        assert_eq!(output.source, SearchSource::Index);
        assert_eq!(output.relative_paths(), vec!["A.txt", "D.txt"]);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let dir = corpus();
        let mut session = SearchSession::new(config(dir.path())).unwrap();
        let seen = Mutex::new(Vec::new());
        let sink = |u: ProgressUpdate| seen.lock().unwrap().push(u.increment.unwrap());

        let query = SearchQuery::new(["alpha"], false, false).unwrap();
        session.search_query(&query, &sink, &NeverCancel).unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.first(), Some(&0.0));
        assert_eq!(seen.last(), Some(&100.0));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_cancelled_query_is_not_cached() {
        let dir = corpus();
        let mut session = SearchSession::new(config(dir.path())).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let query = SearchQuery::new(["alpha"], false, false).unwrap();
        let output = session
            .search_query(&query, &NoProgress, &token)
            .unwrap();
        assert!(output.is_empty());
        assert!(session.cache().is_empty());
    }

    #[test]
    fn test_fast_path_falls_back_or_agrees() {
        let dir = corpus();
        let cfg = SearchConfig {
            use_fast_path: true,
            ..config(dir.path())
        };
        let mut session = SearchSession::new(cfg).unwrap();
        let output = session.search(["alpha", "beta"]).unwrap();
        assert!(matches!(
            output.source,
            SearchSource::FastPath | SearchSource::Scan
        ));
        assert_eq!(output.relative_paths(), vec!["A.txt"]);
    }
}
