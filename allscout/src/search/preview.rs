use super::matcher::KeywordMatcher;
use crate::results::{KeywordMatch, Preview, PreviewSnippet};

/// Lines of context on each side of a matched line
pub const CONTEXT_LINES: usize = 2;
/// Maximum snippets per file
pub const MAX_SNIPPETS: usize = 5;
/// Number of rotating highlight classes
pub const HIGHLIGHT_CLASSES: usize = 4;

/// Builds a bounded preview from a file's lines and its keyword matches.
///
/// Every matched line is widened by [`CONTEXT_LINES`] on each side; windows that
/// overlap or touch are merged. At most [`MAX_SNIPPETS`] snippets are produced.
pub fn build_preview<S: AsRef<str>>(
    lines: &[S],
    matches: &[KeywordMatch],
    matcher: &KeywordMatcher,
) -> Preview {
    let mut matched_lines: Vec<usize> = matches
        .iter()
        .flat_map(|m| m.positions.iter().map(|p| p.line))
        .collect();
    matched_lines.sort_unstable();
    matched_lines.dedup();

    let mut windows: Vec<(usize, usize)> = Vec::new();
    for line in matched_lines {
        let start = line.saturating_sub(CONTEXT_LINES).max(1);
        let end = (line + CONTEXT_LINES).min(lines.len());
        match windows.last_mut() {
            Some(current) if start <= current.1 + 1 => current.1 = current.1.max(end),
            _ => {
                if windows.len() == MAX_SNIPPETS {
                    break;
                }
                windows.push((start, end));
            }
        }
    }

    let snippets = windows
        .into_iter()
        .map(|(start, end)| snippet(&lines[start - 1..end], start, matcher))
        .collect();

    Preview {
        snippets,
        total_lines: lines.len(),
    }
}

fn snippet<S: AsRef<str>>(
    lines: &[S],
    start_line: usize,
    matcher: &KeywordMatcher,
) -> PreviewSnippet {
    let content = lines
        .iter()
        .map(|l| l.as_ref())
        .collect::<Vec<_>>()
        .join("\n");
    let highlighted = highlight_lines(lines, matcher);
    PreviewSnippet {
        start_line,
        end_line: start_line + lines.len() - 1,
        keywords: keywords_in(&content, matcher),
        content,
        highlighted,
    }
}

/// Keywords of `matcher` that occur in `text`, line by line
pub fn keywords_in(text: &str, matcher: &KeywordMatcher) -> Vec<String> {
    (0..matcher.len())
        .filter(|&idx| text.lines().any(|line| matcher.contains(idx, line)))
        .map(|idx| matcher.keyword(idx).to_string())
        .collect()
}

/// Recomputes highlights and keyword subsets of an existing preview for a new matcher
pub fn refresh_preview(preview: &mut Preview, matcher: &KeywordMatcher) {
    for snippet in &mut preview.snippets {
        let lines: Vec<&str> = snippet.content.split('\n').collect();
        snippet.highlighted = highlight_lines(&lines, matcher);
        snippet.keywords = keywords_in(&snippet.content, matcher);
    }
}

fn highlight_lines<S: AsRef<str>>(lines: &[S], matcher: &KeywordMatcher) -> String {
    lines
        .iter()
        .map(|l| highlight_line(l.as_ref(), matcher))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Escapes `line` and wraps every keyword occurrence in a `<mark>` whose class rotates
/// with the keyword index. Overlapping occurrences keep the earliest one.
pub fn highlight_line(line: &str, matcher: &KeywordMatcher) -> String {
    let mut ranges: Vec<(usize, usize, usize)> = (0..matcher.len())
        .flat_map(|idx| {
            matcher
                .char_ranges(idx, line)
                .into_iter()
                .map(move |(start, end)| (start, end, idx))
        })
        .collect();
    ranges.sort_unstable();

    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len() + ranges.len() * 24);
    let mut cursor = 0;
    for (start, end, idx) in ranges {
        if start < cursor {
            continue;
        }
        push_escaped(&mut out, &chars[cursor..start]);
        out.push_str(&format!(
            "<mark class=\"hl-{}\">",
            idx % HIGHLIGHT_CLASSES
        ));
        push_escaped(&mut out, &chars[start..end]);
        out.push_str("</mark>");
        cursor = end;
    }
    push_escaped(&mut out, &chars[cursor..]);
    out
}

fn push_escaped(out: &mut String, chars: &[char]) {
    for &c in chars {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}
