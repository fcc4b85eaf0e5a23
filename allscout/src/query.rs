use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::errors::{ScoutResult, SearchError};

/// A validated intersection query: every keyword must occur in a file for it to match.
///
/// Keywords are trimmed and deduplicated on construction (first occurrence wins).
/// Their order does not affect which files match; it only matters when comparing a
/// query against a cached one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    keywords: Vec<String>,
    pub case_sensitive: bool,
    pub whole_word: bool,
}

impl SearchQuery {
    pub fn new<I, S>(keywords: I, case_sensitive: bool, whole_word: bool) -> ScoutResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cleaned: Vec<String> = Vec::new();
        for keyword in keywords {
            let trimmed = keyword.as_ref().trim();
            if trimmed.is_empty() {
                return Err(SearchError::invalid_query("keywords must not be blank"));
            }
            if !cleaned.iter().any(|k| k == trimmed) {
                cleaned.push(trimmed.to_string());
            }
        }
        if cleaned.is_empty() {
            return Err(SearchError::invalid_query(
                "at least one keyword is required",
            ));
        }
        Ok(Self {
            keywords: cleaned,
            case_sensitive,
            whole_word,
        })
    }

    /// Builds a query using the flags from `config`
    pub fn from_config<I, S>(keywords: I, config: &SearchConfig) -> ScoutResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(keywords, config.case_sensitive, config.whole_word)
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Same case and whole-word flags
    pub fn same_flags(&self, other: &SearchQuery) -> bool {
        self.case_sensitive == other.case_sensitive && self.whole_word == other.whole_word
    }

    /// Returns the keywords this query adds on top of `base`, when this query is a
    /// strict superset of it (contains every base keyword and at least one more).
    pub fn added_keywords(&self, base: &[String]) -> Option<Vec<String>> {
        if self.keywords.len() <= base.len() {
            return None;
        }
        if !base.iter().all(|k| self.keywords.contains(k)) {
            return None;
        }
        Some(
            self.keywords
                .iter()
                .filter(|k| !base.contains(k))
                .cloned()
                .collect(),
        )
    }

    /// A query over a subset of keywords, keeping the flags
    pub fn with_keywords(&self, keywords: &[String]) -> ScoutResult<SearchQuery> {
        Self::new(keywords, self.case_sensitive, self.whole_word)
    }
}
