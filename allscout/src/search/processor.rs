use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::trace;

use super::matcher::KeywordMatcher;
use super::preview::build_preview;
use crate::config::SearchConfig;
use crate::errors::{ScoutResult, SearchError};
use crate::filters::{extension_tag, relative_path};
use crate::metrics::ScanMetrics;
use crate::query::SearchQuery;
use crate::reader::{StreamingReader, SMALL_FILE_THRESHOLD};
use crate::results::SearchResult;

/// File facts carried into a result
#[derive(Debug, Clone)]
pub struct FileFacts {
    pub path: PathBuf,
    pub relative_path: String,
    pub size: u64,
    pub modified: SystemTime,
}

/// Runs the full matcher over `lines` and, if every keyword is present, assembles the
/// result with its preview.
pub fn verify_lines<S: AsRef<str>>(
    matcher: &KeywordMatcher,
    facts: FileFacts,
    lines: &[S],
) -> Option<SearchResult> {
    let matches = matcher.match_lines(lines)?;
    let preview = build_preview(lines, &matches, matcher);
    Some(SearchResult {
        extension: extension_tag(&facts.path),
        path: facts.path,
        relative_path: facts.relative_path,
        matches,
        size: facts.size,
        modified: facts.modified,
        preview: Some(preview),
    })
}

/// Reads one file and matches it against the query
#[derive(Debug)]
pub struct FileProcessor {
    matcher: KeywordMatcher,
    reader: StreamingReader,
    root: PathBuf,
    metrics: ScanMetrics,
}

impl FileProcessor {
    pub fn new(query: &SearchQuery, config: &SearchConfig, root: &Path) -> Self {
        Self {
            matcher: KeywordMatcher::new(query),
            reader: StreamingReader::new(config.max_file_size(), config.encoding_mode),
            root: root.to_path_buf(),
            metrics: ScanMetrics::new(),
        }
    }

    pub fn matcher(&self) -> &KeywordMatcher {
        &self.matcher
    }

    pub fn metrics(&self) -> &ScanMetrics {
        &self.metrics
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Processes a file: `Ok(None)` when it does not contain every keyword.
    ///
    /// Files under [`SMALL_FILE_THRESHOLD`] are read directly. Larger files are first
    /// streamed through the containment pre-check so non-matching files never get a
    /// line array.
    pub fn process_file(&self, path: &Path) -> ScoutResult<Option<SearchResult>> {
        trace!("Processing file: {}", path.display());
        let metadata = std::fs::metadata(path).map_err(|e| SearchError::from_io(path, e))?;
        let size = metadata.len();
        if size > self.reader.limit() {
            return Err(SearchError::size_exceeded(path, size, self.reader.limit()));
        }
        self.metrics.record_file(size);

        if size >= SMALL_FILE_THRESHOLD && !self.reader.precheck(path, &self.matcher)? {
            trace!("Pre-check rejected {}", path.display());
            self.metrics.record_precheck_rejection();
            return Ok(None);
        }

        let content = self.reader.read(path)?;
        self.metrics.record_bytes(content.size);

        let facts = FileFacts {
            path: path.to_path_buf(),
            relative_path: relative_path(&self.root, path),
            size: content.size,
            modified: metadata.modified()?,
        };
        let lines = content.lines();
        let result = verify_lines(&self.matcher, facts, lines.as_slice());
        if result.is_some() {
            self.metrics.record_match();
        }
        Ok(result)
    }
}
