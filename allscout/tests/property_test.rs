use allscout::search::RipgrepDiscovery;
use allscout::{SearchConfig, SearchSession, SearchSource};
use glob::Pattern;
use proptest::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const WORDS: &[&str] = &[
    "ab", "abc", "bc", "cat", "Cat", "dog", "x_y", "b", "concat", "Dog9", "xΣ", "xσy", "ΟΔΟΣ",
    "straße", "STRASSE", "été", "ÉTÉ", "TAXİ", "taxi",
];
const KEYWORDS: &[&str] = &[
    "ab", "bc", "cat", "Cat", "dog", "at", "c", "x_y", "og9", "xΣ", "xσ", "xς", "οδος", "ße",
    "été", "ÉT", "taxi", "xi",
];
const SEPARATORS: &[&str] = &[" ", "-", ".", "", "_"];

/// Where the i-th generated file lives, relative to the root
const DIRS: &[&str] = &["", "sub/", "sub/deep/", "a/"];
const EXTENSIONS: &[&str] = &["txt", "md"];

const INCLUDES: &[&[&str]] = &[
    &[],
    &["*.txt"],
    &["sub/*"],
    &["**/*.md", "f0*"],
    &["a/*", "*deep*"],
];
const IGNORES: &[&[&str]] = &[
    &[],
    &["a*"],
    &["*deep*"],
    &["sub/*.md"],
    &["f01.*", "*/f02.*"],
];

fn file_name(i: usize) -> String {
    format!(
        "{}f{:02}.{}",
        DIRS[i % DIRS.len()],
        i,
        EXTENSIONS[(i / DIRS.len()) % EXTENSIONS.len()]
    )
}

fn write_corpus(root: &Path, files: &[String]) {
    for (i, text) in files.iter().enumerate() {
        let path = root.join(file_name(i));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }
}

fn globs(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

/// Reference glob filter: include list (empty means everything), then ignore list
fn selected(relative: &str, include: &[String], ignore: &[String]) -> bool {
    let hit = |p: &String| Pattern::new(p).unwrap().matches(relative);
    (include.is_empty() || include.iter().any(hit)) && !ignore.iter().any(hit)
}

fn dedup(keywords: &[String]) -> Vec<String> {
    let mut deduped: Vec<String> = Vec::new();
    for keyword in keywords {
        if !deduped.contains(keyword) {
            deduped.push(keyword.clone());
        }
    }
    deduped
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Straightforward reference: does `line` contain `keyword` under the flags?
fn line_contains(line: &str, keyword: &str, case_sensitive: bool, whole_word: bool) -> bool {
    let (line, keyword) = if case_sensitive {
        (line.to_string(), keyword.to_string())
    } else {
        (line.to_lowercase(), keyword.to_lowercase())
    };
    line.char_indices().any(|(start, _)| {
        if !line[start..].starts_with(&keyword) {
            return false;
        }
        if !whole_word {
            return true;
        }
        let before = line[..start].chars().next_back();
        let after = line[start + keyword.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

fn file_matches(text: &str, keywords: &[String], case_sensitive: bool, whole_word: bool) -> bool {
    keywords.iter().all(|keyword| {
        text.lines()
            .any(|line| line_contains(line, keyword, case_sensitive, whole_word))
    })
}

fn line_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        (prop::sample::select(WORDS), prop::sample::select(SEPARATORS)),
        0..6,
    )
    .prop_map(|parts| {
        parts
            .into_iter()
            .map(|(word, sep)| format!("{}{}", word, sep))
            .collect::<String>()
    })
}

fn corpus_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop::collection::vec(line_strategy(), 0..5).prop_map(|lines| lines.join("\n")),
        1..8,
    )
}

fn keywords_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(prop::sample::select(KEYWORDS), 1..4)
        .prop_map(|ks| ks.into_iter().map(String::from).collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn scan_and_index_agree_with_reference(
        files in corpus_strategy(),
        keywords in keywords_strategy(),
        case_sensitive in any::<bool>(),
        whole_word in any::<bool>(),
    ) {
        let dir = tempdir().unwrap();
        write_corpus(dir.path(), &files);

        let deduped = dedup(&keywords);
        let mut expected: Vec<String> = files
            .iter()
            .enumerate()
            .filter(|(_, text)| file_matches(text, &deduped, case_sensitive, whole_word))
            .map(|(i, _)| file_name(i))
            .collect();
        expected.sort();

        let config = SearchConfig {
            root_path: dir.path().to_path_buf(),
            case_sensitive,
            whole_word,
            use_fast_path: false,
            ..SearchConfig::default()
        };

        let mut scan = SearchSession::new(config.clone()).unwrap();
        let scanned = scan.search(&keywords).unwrap();
        prop_assert_eq!(scanned.source, SearchSource::Scan);
        prop_assert_eq!(scanned.relative_paths(), expected.iter().map(String::as_str).collect::<Vec<_>>());

        let mut indexed = SearchSession::new(SearchConfig { use_index: true, ..config }).unwrap();
        let from_index = indexed.search(&keywords).unwrap();
        prop_assert_eq!(from_index.source, SearchSource::Index);
        prop_assert_eq!(&from_index.results, &scanned.results);
    }

    #[test]
    fn every_route_honors_globs(
        files in corpus_strategy(),
        keywords in keywords_strategy(),
        include in prop::sample::select(INCLUDES),
        ignore in prop::sample::select(IGNORES),
        case_sensitive in any::<bool>(),
        whole_word in any::<bool>(),
    ) {
        let dir = tempdir().unwrap();
        write_corpus(dir.path(), &files);
        let (include, ignore) = (globs(include), globs(ignore));

        let deduped = dedup(&keywords);
        let mut expected: Vec<String> = files
            .iter()
            .enumerate()
            .map(|(i, text)| (file_name(i), text))
            .filter(|(name, _)| selected(name, &include, &ignore))
            .filter(|(_, text)| file_matches(text, &deduped, case_sensitive, whole_word))
            .map(|(name, _)| name)
            .collect();
        expected.sort();

        let config = SearchConfig {
            root_path: dir.path().to_path_buf(),
            include_patterns: include,
            ignore_patterns: ignore,
            case_sensitive,
            whole_word,
            use_fast_path: false,
            ..SearchConfig::default()
        };

        let mut scan = SearchSession::new(config.clone()).unwrap();
        let scanned = scan.search(&keywords).unwrap();
        prop_assert_eq!(scanned.relative_paths(), expected.iter().map(String::as_str).collect::<Vec<_>>());

        let mut indexed =
            SearchSession::new(SearchConfig { use_index: true, ..config.clone() }).unwrap();
        let from_index = indexed.search(&keywords).unwrap();
        prop_assert_eq!(from_index.source, SearchSource::Index);
        prop_assert_eq!(&from_index.results, &scanned.results);

        let rg_installed = RipgrepDiscovery::new(dir.path(), &config).probe().is_ok();
        let mut fast = SearchSession::new(SearchConfig { use_fast_path: true, ..config }).unwrap();
        let from_fast = fast.search(&keywords).unwrap();
        if rg_installed && (case_sensitive || deduped.iter().all(|k| k.is_ascii())) {
            prop_assert_eq!(from_fast.source, SearchSource::FastPath);
        }
        prop_assert_eq!(&from_fast.results, &scanned.results);
    }

    #[test]
    fn every_result_has_one_match_per_keyword(
        files in corpus_strategy(),
        keywords in keywords_strategy(),
    ) {
        let dir = tempdir().unwrap();
        write_corpus(dir.path(), &files);
        let mut session = SearchSession::new(SearchConfig {
            root_path: dir.path().to_path_buf(),
            use_fast_path: false,
            ..SearchConfig::default()
        })
        .unwrap();

        let output = session.search(&keywords).unwrap();
        for result in &output.results {
            let mut seen: Vec<&str> = Vec::new();
            for m in &result.matches {
                prop_assert!(!m.positions.is_empty());
                prop_assert!(!seen.contains(&m.keyword.as_str()));
                seen.push(&m.keyword);
            }
            prop_assert!(keywords.iter().all(|k| seen.contains(&k.as_str())));
            let preview = result.preview.as_ref().unwrap();
            prop_assert!(preview.snippets.len() <= 5);
        }
    }
}
