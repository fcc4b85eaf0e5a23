use std::time::{Duration, Instant};
use tracing::debug;

use crate::query::SearchQuery;
use crate::results::{KeywordMatch, Preview, SearchOutput, SearchResult, SearchSource};
use crate::search::matcher::KeywordMatcher;
use crate::search::preview::refresh_preview;

/// How long a cached answer may be refined
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct CachedQuery {
    query: SearchQuery,
    results: Vec<SearchResult>,
    files_searched: usize,
    captured_at: Instant,
}

/// The last completed query of a session, kept so that a follow-up query adding
/// keywords can be answered by filtering instead of searching again.
///
/// Refinement only looks at what the cached results carry: the relative path and the
/// preview snippets. A file whose only occurrence of an added keyword lies outside its
/// preview windows is dropped, and one that mentions it only in its path is kept with
/// no positions for it.
#[derive(Debug)]
pub struct ResultCache {
    entry: Option<CachedQuery>,
    ttl: Duration,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultCache {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { entry: None, ttl }
    }

    /// Replaces the cached query
    pub fn store(&mut self, query: SearchQuery, output: &SearchOutput) {
        debug!(
            "Caching {} results for {:?}",
            output.results.len(),
            query.keywords()
        );
        self.entry = Some(CachedQuery {
            query,
            results: output.results.clone(),
            files_searched: output.files_searched,
            captured_at: Instant::now(),
        });
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    /// Keywords of the cached query, if any
    pub fn keywords(&self) -> Option<&[String]> {
        self.entry.as_ref().map(|e| e.query.keywords())
    }

    /// Answers `query` from the cache when it has the same flags as the cached query,
    /// strictly extends its keywords and the entry is younger than the TTL.
    pub fn refine(&self, query: &SearchQuery) -> Option<SearchOutput> {
        let cached = self.entry.as_ref()?;
        if cached.captured_at.elapsed() >= self.ttl {
            debug!("Cached results expired");
            return None;
        }
        if !query.same_flags(&cached.query) {
            return None;
        }
        let added = query.added_keywords(cached.query.keywords())?;
        let added_matcher = KeywordMatcher::new(&query.with_keywords(&added).ok()?);
        let full_matcher = KeywordMatcher::new(query);

        let results: Vec<SearchResult> = cached
            .results
            .iter()
            .filter_map(|result| refine_result(result, query, &added_matcher, &full_matcher))
            .collect();
        debug!(
            "Refined {} cached results to {} with {:?}",
            cached.results.len(),
            results.len(),
            added
        );
        Some(SearchOutput::from_results(
            SearchSource::Cache,
            results,
            cached.files_searched,
        ))
    }
}

fn refine_result(
    result: &SearchResult,
    query: &SearchQuery,
    added: &KeywordMatcher,
    full: &KeywordMatcher,
) -> Option<SearchResult> {
    let preview_text = result.preview.as_ref().map(Preview::text).unwrap_or_default();
    let haystack = format!("{}\n{}", result.relative_path, preview_text);
    if !added.contains_all(&haystack) {
        return None;
    }

    let mut refined = result.clone();
    for idx in 0..added.len() {
        let positions = result
            .preview
            .iter()
            .flat_map(|preview| &preview.snippets)
            .flat_map(|snippet| {
                let lines: Vec<&str> = snippet.content.split('\n').collect();
                added.positions(idx, lines.as_slice(), snippet.start_line)
            })
            .collect();
        refined.matches.push(KeywordMatch {
            keyword: added.keyword(idx).to_string(),
            positions,
        });
    }

    let keywords = query.keywords();
    refined.matches.sort_by_key(|m| {
        keywords
            .iter()
            .position(|k| *k == m.keyword)
            .unwrap_or(usize::MAX)
    });
    if let Some(preview) = refined.preview.as_mut() {
        refresh_preview(preview, full);
    }
    Some(refined)
}
