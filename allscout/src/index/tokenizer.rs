use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Shortest token kept in the index
pub const MIN_TOKEN_LEN: usize = 2;

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_]\w*").expect("token pattern is valid"));

/// Lowercases one character at a time, with final sigma folded to `σ`.
///
/// Unlike `str::to_lowercase` this never looks at neighbouring characters, so folding a
/// keyword gives a substring of the folded line whenever the matcher would find it,
/// in either case mode.
pub fn fold_chars(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c == 'ς' { 'σ' } else { c })
        .collect()
}

/// Folded tokens of `text`, at least [`MIN_TOKEN_LEN`] characters long
pub fn tokenize<S: AsRef<str>>(lines: &[S]) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();
    for line in lines {
        let folded = fold_chars(line.as_ref());
        tokens.extend(
            TOKEN
                .find_iter(&folded)
                .map(|m| m.as_str())
                .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
                .map(str::to_string),
        );
    }
    tokens
}

/// Token-shaped pieces of a keyword used to look it up in the index.
///
/// Every piece is contained in some indexed token of any line that contains the keyword,
/// so looking up the pieces never loses a match. An empty result means the keyword has
/// nothing usable and every indexed file is a candidate.
pub fn lookup_pieces(keyword: &str) -> Vec<String> {
    let folded = fold_chars(keyword);
    let mut pieces: Vec<String> = TOKEN
        .find_iter(&folded)
        .map(|m| m.as_str())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect();
    pieces.dedup();
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        let tokens = tokenize(&["fn Main() { let x = foo_bar2; }", "9lives _private"]);
        let expected: BTreeSet<String> = ["fn", "main", "let", "foo_bar2", "lives", "_private"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_lookup_pieces() {
        assert_eq!(lookup_pieces("Foo.bar"), vec!["foo", "bar"]);
        assert_eq!(lookup_pieces("x"), Vec::<String>::new());
        assert_eq!(lookup_pieces("123"), Vec::<String>::new());
        assert_eq!(lookup_pieces("9abc"), vec!["abc"]);
        assert_eq!(lookup_pieces("a-b"), Vec::<String>::new());
    }

    #[test]
    fn test_pieces_are_inside_tokens() {
        let line = "let value = config.max_size9;";
        let tokens = tokenize(&[line]);
        for keyword in ["ax_siz", "Config.Max", "value ="] {
            for piece in lookup_pieces(keyword) {
                assert!(
                    tokens.iter().any(|t| t.contains(&piece)),
                    "{} not covered",
                    piece
                );
            }
        }
    }

    #[test]
    fn test_sigma_folds_the_same_everywhere() {
        assert_eq!(fold_chars("ΟΔΟΣ"), "οδοσ");
        assert_eq!(fold_chars("οδος"), "οδοσ");
        assert_eq!("xΣ".to_lowercase(), "xς");

        let tokens = tokenize(&["xΣy", "the_ΛΟΓΟΣ end"]);
        assert!(tokens.contains("xσy"));
        assert!(tokens.contains("the_λογοσ"));
        for keyword in ["xΣ", "xς", "XΣY", "xσ", "e_λογος"] {
            for piece in lookup_pieces(keyword) {
                assert!(
                    tokens.iter().any(|t| t.contains(&piece)),
                    "{} not covered",
                    piece
                );
            }
        }
        assert_eq!(lookup_pieces("xΣ"), vec!["xσ"]);
    }
}
