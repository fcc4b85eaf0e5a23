use std::borrow::Cow;

use crate::query::SearchQuery;
use crate::results::{KeywordMatch, MatchPosition};

/// Word characters for whole-word boundaries: letters, digits and `_`.
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_bounded(haystack: &str, start: usize, end: usize) -> bool {
    let before = haystack[..start].chars().next_back();
    let after = haystack[end..].chars().next();
    !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
}

/// Keeps the last `n` characters of `s`
fn tail_chars(s: &str, n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    let start = s.char_indices().rev().nth(n - 1).map_or(0, |(i, _)| i);
    s[start..].to_string()
}

#[derive(Debug, Clone)]
struct Needle {
    keyword: String,
    folded: String,
}

/// Decides whether text contains every keyword, and where.
///
/// Case-insensitive matching lowercases both sides with [`str::to_lowercase`]. This is
/// simple case mapping, not Unicode case folding, so a few scripts compare differently
/// than a locale-aware search would.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    needles: Vec<Needle>,
    case_sensitive: bool,
    whole_word: bool,
}

impl KeywordMatcher {
    pub fn new(query: &SearchQuery) -> Self {
        let needles = query
            .keywords()
            .iter()
            .map(|keyword| Needle {
                keyword: keyword.clone(),
                folded: if query.case_sensitive {
                    keyword.clone()
                } else {
                    keyword.to_lowercase()
                },
            })
            .collect();
        Self {
            needles,
            case_sensitive: query.case_sensitive,
            whole_word: query.whole_word,
        }
    }

    pub fn len(&self) -> usize {
        self.needles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.needles.is_empty()
    }

    pub fn keyword(&self, idx: usize) -> &str {
        &self.needles[idx].keyword
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.needles.iter().map(|n| n.keyword.as_str())
    }

    pub fn whole_word(&self) -> bool {
        self.whole_word
    }

    /// Applies the case rule to `text`
    pub fn fold<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.case_sensitive {
            Cow::Borrowed(text)
        } else {
            Cow::Owned(text.to_lowercase())
        }
    }

    /// Length in characters of the longest folded keyword
    pub fn longest_keyword_chars(&self) -> usize {
        self.needles
            .iter()
            .map(|n| n.folded.chars().count())
            .max()
            .unwrap_or(0)
    }

    /// Byte offset of the next occurrence of keyword `idx` in `folded` at or after `from`
    fn next_occurrence(&self, idx: usize, folded: &str, mut from: usize) -> Option<usize> {
        let needle = self.needles[idx].folded.as_str();
        while from <= folded.len() {
            let start = from + folded[from..].find(needle)?;
            if !self.whole_word || is_bounded(folded, start, start + needle.len()) {
                return Some(start);
            }
            from = start + folded[start..].chars().next().map_or(1, char::len_utf8);
        }
        None
    }

    /// Byte offsets of every occurrence of keyword `idx` in an already folded haystack.
    ///
    /// In substring mode scanning resumes one character after each match start, so
    /// overlapping occurrences (`aa` in `aaa`) are all reported. Whole-word matches
    /// never overlap.
    pub fn find_folded(&self, idx: usize, folded: &str) -> Vec<usize> {
        let needle_len = self.needles[idx].folded.len();
        let mut hits = Vec::new();
        let mut from = 0;
        while let Some(start) = self.next_occurrence(idx, folded, from) {
            hits.push(start);
            from = if self.whole_word && needle_len > 0 {
                start + needle_len
            } else {
                start + folded[start..].chars().next().map_or(1, char::len_utf8)
            };
        }
        hits
    }

    /// Whether keyword `idx` occurs in `text`
    pub fn contains(&self, idx: usize, text: &str) -> bool {
        let folded = self.fold(text);
        self.next_occurrence(idx, &folded, 0).is_some()
    }

    /// Whether every keyword occurs in `text`
    pub fn contains_all(&self, text: &str) -> bool {
        let folded = self.fold(text);
        (0..self.needles.len()).all(|idx| self.next_occurrence(idx, &folded, 0).is_some())
    }

    /// Full mode: positions of every keyword, or `None` as soon as one keyword is missing.
    ///
    /// Keywords are tested in query order; positions are never computed for keywords
    /// after the first missing one.
    pub fn match_lines<S: AsRef<str>>(&self, lines: &[S]) -> Option<Vec<KeywordMatch>> {
        let folded: Vec<Cow<'_, str>> = lines.iter().map(|l| self.fold(l.as_ref())).collect();
        let mut matches = Vec::with_capacity(self.needles.len());

        for (idx, needle) in self.needles.iter().enumerate() {
            let positions = self.positions_folded(idx, lines, &folded, 1);
            if positions.is_empty() {
                return None;
            }
            matches.push(KeywordMatch {
                keyword: needle.keyword.clone(),
                positions,
            });
        }

        Some(matches)
    }

    /// Positions of keyword `idx` in `lines`, numbering the first line `first_line`
    pub fn positions<S: AsRef<str>>(
        &self,
        idx: usize,
        lines: &[S],
        first_line: usize,
    ) -> Vec<MatchPosition> {
        let folded: Vec<Cow<'_, str>> = lines.iter().map(|l| self.fold(l.as_ref())).collect();
        self.positions_folded(idx, lines, &folded, first_line)
    }

    fn positions_folded<S: AsRef<str>>(
        &self,
        idx: usize,
        lines: &[S],
        folded: &[Cow<'_, str>],
        first_line: usize,
    ) -> Vec<MatchPosition> {
        let mut positions = Vec::new();
        for (offset, (line, haystack)) in lines.iter().zip(folded).enumerate() {
            for start in self.find_folded(idx, haystack) {
                positions.push(MatchPosition {
                    line: first_line + offset,
                    column: haystack[..start].chars().count() + 1,
                    line_text: line.as_ref().trim().to_string(),
                });
            }
        }
        positions
    }

    /// Character ranges `[start, end)` of keyword `idx` in `line`.
    ///
    /// Empty when folding changed the number of characters in the line, since the
    /// folded offsets would not line up with the original text.
    pub fn char_ranges(&self, idx: usize, line: &str) -> Vec<(usize, usize)> {
        let folded = self.fold(line);
        if !self.case_sensitive && folded.chars().count() != line.chars().count() {
            return Vec::new();
        }
        let width = self.needles[idx].folded.chars().count();
        self.find_folded(idx, &folded)
            .into_iter()
            .map(|start| {
                let column = folded[..start].chars().count();
                (column, column + width)
            })
            .collect()
    }

    /// Starts a streaming containment check
    pub fn partial(&self) -> PartialMatch<'_> {
        PartialMatch {
            matcher: self,
            seen: vec![false; self.needles.len()],
            remaining: self.needles.len(),
            tail: String::new(),
            keep: self.longest_keyword_chars().saturating_sub(1),
        }
    }
}

/// Pre-check mode: tracks which keywords have been seen across streamed chunks.
///
/// The last `longest keyword - 1` characters of each window are carried into the next
/// one so an occurrence straddling a chunk boundary is still found. Whole-word rules
/// are not applied here; this only rules files out.
#[derive(Debug)]
pub struct PartialMatch<'m> {
    matcher: &'m KeywordMatcher,
    seen: Vec<bool>,
    remaining: usize,
    tail: String,
    keep: usize,
}

impl PartialMatch<'_> {
    /// Feeds the next chunk. Returns true once every keyword has been seen.
    pub fn feed(&mut self, chunk: &str) -> bool {
        if self.remaining == 0 {
            return true;
        }
        let matcher = self.matcher;
        let mut window = std::mem::take(&mut self.tail);
        window.push_str(&matcher.fold(chunk));

        for (idx, seen) in self.seen.iter_mut().enumerate() {
            if !*seen && window.contains(matcher.needles[idx].folded.as_str()) {
                *seen = true;
                self.remaining -= 1;
            }
        }

        self.tail = tail_chars(&window, self.keep);
        self.remaining == 0
    }

    pub fn is_satisfied(&self) -> bool {
        self.remaining == 0
    }
}
