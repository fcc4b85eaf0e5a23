/// Search result types.
///
/// A [`SearchResult`] only exists for a file that contains every query keyword, so
/// `matches` always holds exactly one [`KeywordMatch`] per keyword. Results are built
/// once by the matching pipeline and never mutated afterwards, except by the result
/// cache, which extends copies of them when refining a query.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

/// One occurrence of a keyword
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPosition {
    /// 1-based line number
    pub line: usize,
    /// 1-based column, counted in characters
    pub column: usize,
    /// The source line, trimmed
    pub line_text: String,
}

/// All occurrences of one keyword in one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordMatch {
    pub keyword: String,
    pub positions: Vec<MatchPosition>,
}

impl KeywordMatch {
    pub fn count(&self) -> usize {
        self.positions.len()
    }
}

/// A context window around one or more matched lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewSnippet {
    /// 1-based, inclusive
    pub start_line: usize,
    /// 1-based, inclusive
    pub end_line: usize,
    /// Raw lines joined with `\n`
    pub content: String,
    /// HTML-escaped content with `<mark class="hl-N">` around keyword occurrences
    pub highlighted: String,
    /// Query keywords occurring inside this snippet
    pub keywords: Vec<String>,
}

/// Bounded set of snippets for a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    pub snippets: Vec<PreviewSnippet>,
    pub total_lines: usize,
}

impl Preview {
    /// Raw text of every snippet, joined with newlines
    pub fn text(&self) -> String {
        self.snippets
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A file that contains all query keywords
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub path: PathBuf,
    pub relative_path: String,
    pub matches: Vec<KeywordMatch>,
    pub size: u64,
    pub modified: SystemTime,
    pub extension: String,
    pub preview: Option<Preview>,
}

impl SearchResult {
    /// Occurrences across all keywords
    pub fn total_matches(&self) -> usize {
        self.matches.iter().map(KeywordMatch::count).sum()
    }

    /// Occurrences of one keyword
    pub fn match_count(&self, keyword: &str) -> usize {
        self.matches
            .iter()
            .find(|m| m.keyword == keyword)
            .map_or(0, KeywordMatch::count)
    }
}

/// Which engine answered a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    Cache,
    Index,
    FastPath,
    Scan,
}

impl fmt::Display for SearchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchSource::Cache => "cache",
            SearchSource::Index => "index",
            SearchSource::FastPath => "fast path",
            SearchSource::Scan => "scan",
        };
        f.write_str(name)
    }
}

/// The complete answer to a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutput {
    /// Matching files, sorted by relative path
    pub results: Vec<SearchResult>,
    /// Total keyword occurrences across all results
    pub total_matches: usize,
    /// Candidate files considered
    pub files_searched: usize,
    pub source: SearchSource,
}

impl SearchOutput {
    /// Creates an empty output for `source`
    pub fn new(source: SearchSource) -> Self {
        Self {
            results: Vec::new(),
            total_matches: 0,
            files_searched: 0,
            source,
        }
    }

    /// Wraps results, sorting them by relative path
    pub fn from_results(
        source: SearchSource,
        results: Vec<SearchResult>,
        files_searched: usize,
    ) -> Self {
        let mut output = Self::new(source);
        output.files_searched = files_searched;
        for result in results {
            output.add_result(result);
        }
        sort_results(&mut output.results);
        output
    }

    /// Adds a result and updates statistics
    pub fn add_result(&mut self, result: SearchResult) {
        self.total_matches += result.total_matches();
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Relative paths of every result, in order
    pub fn relative_paths(&self) -> Vec<&str> {
        self.results
            .iter()
            .map(|r| r.relative_path.as_str())
            .collect()
    }
}

/// Sorts results by relative path, ascending
pub fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
}
