//! Persistent inverted index: word → files, plus each file's cached lines.
//!
//! The index is a candidate filter. A query looks up every keyword, intersects the
//! candidate sets and then verifies each surviving file with the same matcher the
//! scanner uses, against the lines captured at build time. Answers are therefore the
//! same as a scan of the same tree, provided the index is fresh; [`IndexStore`]
//! rebuilds it whenever it is missing, unreadable or stale.

mod store;
mod tokenizer;

pub use store::{IndexDocument, IndexStatus, IndexStore};
pub use tokenizer::{lookup_pieces, tokenize, MIN_TOKEN_LEN};

use dashmap::DashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, trace};

use crate::config::{EncodingMode, SearchConfig};
use crate::errors::{ScoutResult, SearchError};
use crate::filters::{extension_tag, relative_path};
use crate::query::SearchQuery;
use crate::reader::StreamingReader;
use crate::results::{sort_results, SearchResult};
use crate::search::discovery::{intersect_candidates, CandidateDiscovery};
use crate::search::matcher::KeywordMatcher;
use crate::search::processor::{verify_lines, FileFacts, FileProcessor};

/// Version of the persisted document layout and of the token folding
pub const SCHEMA_VERSION: u32 = 2;

/// One indexed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIndexEntry {
    pub path: PathBuf,
    pub relative_path: String,
    pub modified: SystemTime,
    pub size: u64,
    pub extension: String,
    /// Distinct lowercase tokens
    pub words: BTreeSet<String>,
    pub lines: Vec<String>,
    pub encoding: String,
}

/// Settings that change what gets indexed. An index built under different settings
/// is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSettings {
    pub max_file_size: u64,
    pub encoding_mode: EncodingMode,
}

impl IndexSettings {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            max_file_size: config.max_file_size(),
            encoding_mode: config.encoding_mode,
        }
    }
}

/// Modification time, or the epoch when it cannot be read
fn mtime(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(UNIX_EPOCH)
}

enum Indexed {
    File(Box<FileIndexEntry>),
    Skipped(PathBuf, SystemTime),
}

/// In-memory inverted index over one root
#[derive(Debug, Clone, PartialEq)]
pub struct SearchIndex {
    pub schema_version: u32,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    pub root: PathBuf,
    pub settings: IndexSettings,
    files: BTreeMap<PathBuf, FileIndexEntry>,
    words: BTreeMap<String, BTreeSet<PathBuf>>,
    /// Candidates that could not be indexed (oversized or unreadable), with their mtime
    skipped: BTreeMap<PathBuf, SystemTime>,
}

impl SearchIndex {
    /// Indexes `candidates` in parallel.
    ///
    /// Files over the size ceiling or that fail to read or decode are remembered as
    /// skipped, so they do not make the index look stale on the next check.
    pub fn build(root: &Path, candidates: &[PathBuf], config: &SearchConfig) -> Self {
        let settings = IndexSettings::from_config(config);
        let reader = StreamingReader::new(settings.max_file_size, settings.encoding_mode);
        let words: DashMap<String, BTreeSet<PathBuf>> = DashMap::new();
        info!("Building index over {} files", candidates.len());

        let indexed: Vec<Indexed> = candidates
            .par_iter()
            .map(|path| {
                let modified = mtime(path);
                let content = match reader.read(path) {
                    Ok(content) => content,
                    Err(e) => {
                        trace!("Not indexing {}: {}", path.display(), e);
                        return Indexed::Skipped(path.clone(), modified);
                    }
                };
                let lines: Vec<String> = content.lines().into_iter().map(String::from).collect();
                let tokens = tokenize(lines.as_slice());
                for token in &tokens {
                    words
                        .entry(token.clone())
                        .or_default()
                        .insert(path.clone());
                }
                Indexed::File(Box::new(FileIndexEntry {
                    path: path.clone(),
                    relative_path: relative_path(root, path),
                    modified,
                    size: content.size,
                    extension: extension_tag(path),
                    words: tokens,
                    lines,
                    encoding: content.encoding.to_string(),
                }))
            })
            .collect();

        let mut files = BTreeMap::new();
        let mut skipped = BTreeMap::new();
        for item in indexed {
            match item {
                Indexed::File(entry) => {
                    files.insert(entry.path.clone(), *entry);
                }
                Indexed::Skipped(path, modified) => {
                    skipped.insert(path, modified);
                }
            }
        }

        let now = SystemTime::now();
        let index = Self {
            schema_version: SCHEMA_VERSION,
            created_at: now,
            updated_at: now,
            root: root.to_path_buf(),
            settings,
            files,
            words: words.into_iter().collect(),
            skipped,
        };
        info!(
            "Indexed {} files ({} words, {} skipped)",
            index.total_files(),
            index.total_words(),
            index.skipped.len()
        );
        index
    }

    pub fn total_files(&self) -> usize {
        self.files.len()
    }

    pub fn total_words(&self) -> usize {
        self.words.len()
    }

    pub fn files(&self) -> &BTreeMap<PathBuf, FileIndexEntry> {
        &self.files
    }

    pub fn words(&self) -> &BTreeMap<String, BTreeSet<PathBuf>> {
        &self.words
    }

    pub fn skipped(&self) -> &BTreeMap<PathBuf, SystemTime> {
        &self.skipped
    }

    pub fn entry(&self, path: &Path) -> Option<&FileIndexEntry> {
        self.files.get(path)
    }

    /// True when the index no longer describes `candidates`: a different file count, a
    /// file the index has never seen, a changed mtime, or different index settings.
    pub fn is_stale(&self, candidates: &[PathBuf], config: &SearchConfig) -> bool {
        if self.settings != IndexSettings::from_config(config) {
            debug!("Index settings changed");
            return true;
        }
        if candidates.len() != self.files.len() + self.skipped.len() {
            debug!(
                "Index covers {} files, tree has {}",
                self.files.len() + self.skipped.len(),
                candidates.len()
            );
            return true;
        }
        candidates.iter().any(|path| {
            let recorded = match self.files.get(path) {
                Some(entry) => entry.modified,
                None => match self.skipped.get(path) {
                    Some(modified) => *modified,
                    None => {
                        debug!("Index is missing {}", path.display());
                        return true;
                    }
                },
            };
            let changed = mtime(path) != recorded;
            if changed {
                debug!("{} changed since indexing", path.display());
            }
            changed
        })
    }

    /// Files that may contain `keyword`: the union of every indexed word that contains
    /// each lookup piece, intersected across pieces
    pub fn candidates_for(&self, keyword: &str) -> BTreeSet<PathBuf> {
        let pieces = lookup_pieces(keyword);
        if pieces.is_empty() {
            return self.files.keys().cloned().collect();
        }
        let mut running: Option<BTreeSet<PathBuf>> = None;
        for piece in pieces {
            let found: BTreeSet<PathBuf> = self
                .words
                .iter()
                .filter(|(word, _)| word.contains(piece.as_str()))
                .flat_map(|(_, paths)| paths.iter().cloned())
                .collect();
            let next = match running {
                None => found,
                Some(current) => current.intersection(&found).cloned().collect(),
            };
            if next.is_empty() {
                return next;
            }
            running = Some(next);
        }
        running.unwrap_or_default()
    }

    /// Answers `query` from the index.
    ///
    /// Candidates are verified against their cached lines. A candidate whose mtime no
    /// longer matches is read again from disk instead.
    pub fn search(
        &self,
        query: &SearchQuery,
        config: &SearchConfig,
    ) -> ScoutResult<Vec<SearchResult>> {
        let found = intersect_candidates(&IndexDiscovery::new(self), query)?;
        let matcher = KeywordMatcher::new(query);
        let live = FileProcessor::new(query, config, &self.root);

        let mut results: Vec<SearchResult> = found
            .par_iter()
            .filter_map(|path| {
                let entry = self.files.get(path)?;
                if mtime(path) != entry.modified {
                    debug!("{} changed since indexing, reading it again", path.display());
                    return live.process_file(path).ok().flatten();
                }
                let facts = FileFacts {
                    path: entry.path.clone(),
                    relative_path: entry.relative_path.clone(),
                    size: entry.size,
                    modified: entry.modified,
                };
                verify_lines(&matcher, facts, entry.lines.as_slice())
            })
            .collect();
        sort_results(&mut results);
        debug!("Index answered with {} of {} candidates", results.len(), found.len());
        Ok(results)
    }

    pub(crate) fn from_parts(
        header: IndexHeader,
        files: BTreeMap<PathBuf, FileIndexEntry>,
        words: BTreeMap<String, BTreeSet<PathBuf>>,
        skipped: BTreeMap<PathBuf, SystemTime>,
    ) -> ScoutResult<Self> {
        if header.schema_version != SCHEMA_VERSION {
            return Err(SearchError::index_version_mismatch(
                header.schema_version,
                SCHEMA_VERSION,
            ));
        }
        Ok(Self {
            schema_version: header.schema_version,
            created_at: header.created_at,
            updated_at: header.updated_at,
            root: header.root,
            settings: header.settings,
            files,
            words,
            skipped,
        })
    }
}

/// Metadata persisted alongside the index tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHeader {
    pub schema_version: u32,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    pub root: PathBuf,
    pub settings: IndexSettings,
}

/// Candidate discovery backed by a loaded [`SearchIndex`]
pub struct IndexDiscovery<'a> {
    index: &'a SearchIndex,
}

impl<'a> IndexDiscovery<'a> {
    pub fn new(index: &'a SearchIndex) -> Self {
        Self { index }
    }
}

impl CandidateDiscovery for IndexDiscovery<'_> {
    fn name(&self) -> &'static str {
        "index"
    }

    fn candidates_for(
        &self,
        keyword: &str,
        _query: &SearchQuery,
    ) -> ScoutResult<BTreeSet<PathBuf>> {
        Ok(self.index.candidates_for(keyword))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{collect_candidates, resolve_root};
    use crate::progress::{NeverCancel, NoProgress};
    use crate::search::scheduler::ScanScheduler;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn corpus() -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("A.txt"), "alpha beta\nmore text").unwrap();
        fs::write(dir.path().join("B.txt"), "alpha only").unwrap();
        fs::write(dir.path().join("C.txt"), "beta only").unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(
            dir.path().join("src/lib.rs"),
            "fn concatenate() {}\nlet cat = Code::new();\n",
        )
        .unwrap();
        let root = resolve_root(dir.path()).unwrap();
        (dir, root)
    }

    fn build(root: &Path) -> (SearchIndex, Vec<PathBuf>) {
        let config = SearchConfig::default();
        let candidates = collect_candidates(root, &config).unwrap();
        (SearchIndex::build(root, &candidates, &config), candidates)
    }

    fn scan(root: &Path, query: &SearchQuery) -> Vec<SearchResult> {
        let config = SearchConfig::default();
        let candidates = collect_candidates(root, &config).unwrap();
        let processor = FileProcessor::new(query, &config, root);
        ScanScheduler::new(&processor, 2)
            .run(candidates, &NoProgress, &NeverCancel)
            .unwrap()
    }

    #[test]
    fn test_build_records_words_and_lines() {
        let (_dir, root) = corpus();
        let (index, _) = build(&root);
        assert_eq!(index.total_files(), 4);
        assert_eq!(index.words()["alpha"].len(), 2);
        let entry = index.entry(&root.join("A.txt")).unwrap();
        assert_eq!(entry.lines, vec!["alpha beta", "more text"]);
        assert_eq!(entry.relative_path, "A.txt");
        assert!(entry.words.contains("alpha") && entry.words.contains("text"));
        let lib = index.entry(&root.join("src/lib.rs")).unwrap();
        assert!(lib.words.contains("code"));
        assert!(lib.words.contains("concatenate"));
    }

    #[test]
    fn test_index_matches_scan() {
        let (_dir, root) = corpus();
        let (index, _) = build(&root);
        let config = SearchConfig::default();

        for (keywords, cs, ww) in [
            (vec!["alpha", "beta"], false, false),
            (vec!["alpha"], false, false),
            (vec!["cat"], false, true),
            (vec!["cat"], false, false),
            (vec!["Code"], true, false),
            (vec!["code"], true, false),
            (vec!["ncat", "::"], false, false),
            (vec!["a"], false, false),
        ] {
            let query = SearchQuery::new(keywords.clone(), cs, ww).unwrap();
            let from_index = index.search(&query, &config).unwrap();
            assert_eq!(from_index, scan(&root, &query), "query {:?}", keywords);
        }
    }

    #[test]
    fn test_non_ascii_index_matches_scan() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("g.txt"), "xΣy\nΟΔΟΣ x_ΟΔΟΣ").unwrap();
        fs::write(dir.path().join("h.txt"), "xσy straße").unwrap();
        fs::write(dir.path().join("i.txt"), "xΣ end STRASSE").unwrap();
        let root = resolve_root(dir.path()).unwrap();
        let (index, _) = build(&root);
        let config = SearchConfig::default();

        for (keywords, cs, ww) in [
            (vec!["xΣ"], true, false),
            (vec!["xΣ"], false, false),
            (vec!["xς"], false, false),
            (vec!["xσ"], false, false),
            (vec!["x_οδος"], false, false),
            (vec!["x_ΟΔΟΣ"], true, true),
            (vec!["Straße"], false, false),
            (vec!["xΣ", "end"], false, true),
        ] {
            let query = SearchQuery::new(keywords.clone(), cs, ww).unwrap();
            let from_index = index.search(&query, &config).unwrap();
            assert_eq!(from_index, scan(&root, &query), "query {:?}", keywords);
        }

        let query = SearchQuery::new(["xΣ"], true, false).unwrap();
        let found: Vec<String> = index
            .search(&query, &config)
            .unwrap()
            .into_iter()
            .map(|r| r.relative_path)
            .collect();
        assert_eq!(found, vec!["g.txt", "i.txt"]);
    }

    #[test]
    fn test_whole_word_lookup() {
        let (_dir, root) = corpus();
        let (index, _) = build(&root);
        let query = SearchQuery::new(["cat"], false, true).unwrap();
        let results = index.search(&query, &SearchConfig::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].matches[0].positions.len(), 1);
        assert_eq!(results[0].matches[0].positions[0].line, 2);
    }

    #[test]
    fn test_staleness() {
        let (_dir, root) = corpus();
        let (index, candidates) = build(&root);
        let config = SearchConfig::default();
        assert!(!index.is_stale(&candidates, &config));
        assert!(!index.is_stale(&candidates, &config));

        // new file
        let extra = root.join("D.txt");
        fs::write(&extra, "delta").unwrap();
        let grown = collect_candidates(&root, &config).unwrap();
        assert!(index.is_stale(&grown, &config));

        // changed mtime
        let (index, candidates) = build(&root);
        let file = fs::File::options().write(true).open(&extra).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
        assert!(index.is_stale(&candidates, &config));

        // different settings
        let (index, candidates) = build(&root);
        let smaller = SearchConfig {
            max_file_size_kb: 1,
            ..SearchConfig::default()
        };
        assert!(index.is_stale(&candidates, &smaller));
    }

    #[test]
    fn test_oversized_files_are_skipped_not_stale() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("big.txt"), "x".repeat(4096)).unwrap();
        fs::write(dir.path().join("small.txt"), "x").unwrap();
        let root = resolve_root(dir.path()).unwrap();
        let config = SearchConfig {
            max_file_size_kb: 1,
            ..SearchConfig::default()
        };
        let candidates = collect_candidates(&root, &config).unwrap();
        let index = SearchIndex::build(&root, &candidates, &config);
        assert_eq!(index.total_files(), 1);
        assert_eq!(index.skipped().len(), 1);
        assert!(!index.is_stale(&candidates, &config));
    }

    #[test]
    fn test_changed_file_is_read_again() {
        let (_dir, root) = corpus();
        let (index, _) = build(&root);
        let path = root.join("B.txt");
        fs::write(&path, "alpha and now beta").unwrap();
        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();

        // B.txt has no "beta" token in the index, so it is not a candidate
        let query = SearchQuery::new(["alpha", "beta"], false, false).unwrap();
        let results = index.search(&query, &SearchConfig::default()).unwrap();
        assert_eq!(results.len(), 1);

        // but a candidate that changed is verified against its new contents
        let query = SearchQuery::new(["alpha"], false, false).unwrap();
        let results = index.search(&query, &SearchConfig::default()).unwrap();
        let b = results.iter().find(|r| r.relative_path == "B.txt").unwrap();
        assert_eq!(b.matches[0].positions[0].line_text, "alpha and now beta");
    }
}
