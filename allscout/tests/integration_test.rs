use allscout::progress::{CancellationToken, ProgressUpdate};
use allscout::search::scheduler::batch_size;
use allscout::{SearchConfig, SearchQuery, SearchSession, SearchSource};
use anyhow::Result;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

fn create_test_files(dir: &Path, file_count: usize, lines_per_file: usize) -> Result<()> {
    for i in 0..file_count {
        let file_path = dir.join(format!("test_{}.txt", i));
        let mut file = File::create(file_path)?;
        for j in 0..lines_per_file {
            writeln!(file, "Line {} in file {}: TODO implement this", j, i)?;
            writeln!(file, "Another line {} in file {}: nothing special", j, i)?;
            if i % 2 == 0 {
                writeln!(file, "FIXME: This is a bug in file {} line {}", i, j)?;
            }
        }
    }
    Ok(())
}

fn scan_config(root: &Path) -> SearchConfig {
    SearchConfig {
        root_path: root.to_path_buf(),
        use_fast_path: false,
        ..SearchConfig::default()
    }
}

#[test]
fn test_intersection_of_keywords() -> Result<()> {
    let dir = tempdir()?;
    create_test_files(dir.path(), 10, 20)?;

    let mut session = SearchSession::new(scan_config(dir.path()))?;
    let todo = session.search(["TODO"])?;
    assert_eq!(todo.len(), 10);

    session.clear_cache();
    let both = session.search(["TODO", "FIXME"])?;
    assert_eq!(both.len(), 5);
    assert_eq!(both.source, SearchSource::Scan);
    for result in &both.results {
        assert_eq!(result.match_count("TODO"), 20);
        assert_eq!(result.match_count("FIXME"), 20);
    }
    Ok(())
}

#[test]
fn test_abc_corpus() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("A.md"), "# Alpha\nalpha and beta together")?;
    fs::write(dir.path().join("B.md"), "alpha alone")?;
    fs::write(dir.path().join("C.md"), "beta alone")?;

    for use_index in [false, true] {
        let config = SearchConfig {
            use_index,
            ..scan_config(dir.path())
        };
        let mut session = SearchSession::new(config)?;
        let output = session.search(["alpha", "beta"])?;
        assert_eq!(output.relative_paths(), vec!["A.md"]);
        assert_eq!(output.files_searched, 3);

        let a = &output.results[0];
        assert_eq!(a.extension, "md");
        assert_eq!(a.match_count("alpha"), 2);
        assert_eq!(a.matches[0].positions[0].line, 1);
        assert_eq!(a.matches[0].positions[0].column, 3);
    }
    Ok(())
}

#[test]
fn test_whole_word_and_case() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("words.txt"), "concatenate strings\n")?;
    fs::write(dir.path().join("pets.txt"), "the cat sat\n")?;
    fs::write(dir.path().join("code.txt"), "Write some Code\n")?;

    let mut whole_word = SearchSession::new(SearchConfig {
        whole_word: true,
        ..scan_config(dir.path())
    })?;
    assert_eq!(whole_word.search(["cat"])?.relative_paths(), vec!["pets.txt"]);

    let mut substring = SearchSession::new(scan_config(dir.path()))?;
    assert_eq!(
        substring.search(["cat"])?.relative_paths(),
        vec!["pets.txt", "words.txt"]
    );

    let mut insensitive = SearchSession::new(scan_config(dir.path()))?;
    assert_eq!(insensitive.search(["code"])?.relative_paths(), vec!["code.txt"]);

    let mut sensitive = SearchSession::new(SearchConfig {
        case_sensitive: true,
        ..scan_config(dir.path())
    })?;
    assert!(sensitive.search(["code"])?.is_empty());
    assert_eq!(sensitive.search(["Code"])?.relative_paths(), vec!["code.txt"]);
    Ok(())
}

#[test]
fn test_size_ceiling() -> Result<()> {
    let dir = tempdir()?;
    let mut big = File::create(dir.path().join("big.log"))?;
    let line = "needle in a very large haystack of repeated text............\n";
    while big.metadata()?.len() < 2 * 1024 * 1024 {
        big.write_all(line.as_bytes())?;
    }
    drop(big);
    fs::write(dir.path().join("small.log"), "needle")?;

    let mut session = SearchSession::new(SearchConfig {
        max_file_size_kb: 1024,
        ..scan_config(dir.path())
    })?;
    let output = session.search(["needle"])?;
    assert_eq!(output.relative_paths(), vec!["small.log"]);
    Ok(())
}

#[test]
fn test_ignore_rules() -> Result<()> {
    let dir = tempdir()?;
    fs::create_dir_all(dir.path().join("src"))?;
    fs::create_dir_all(dir.path().join("target/debug"))?;
    fs::create_dir_all(dir.path().join("generated"))?;
    fs::write(dir.path().join("src/main.rs"), "fn main() { marker(); }")?;
    fs::write(dir.path().join("target/debug/out.rs"), "marker")?;
    fs::write(dir.path().join("generated/api.rs"), "marker")?;
    fs::write(dir.path().join("notes.txt"), "marker")?;
    fs::write(dir.path().join("image.png"), "marker")?;
    fs::write(dir.path().join(".gitignore"), "generated/\n")?;

    let mut session = SearchSession::new(SearchConfig {
        include_patterns: vec!["**/*.rs".to_string()],
        ..scan_config(dir.path())
    })?;
    assert_eq!(session.search(["marker"])?.relative_paths(), vec!["src/main.rs"]);

    let mut session = SearchSession::new(SearchConfig {
        ignore_patterns: vec!["**/*.txt".to_string()],
        ..scan_config(dir.path())
    })?;
    assert_eq!(session.search(["marker"])?.relative_paths(), vec!["src/main.rs"]);
    Ok(())
}

#[test]
fn test_cancellation_returns_partial_results() -> Result<()> {
    let dir = tempdir()?;
    for i in 0..1000 {
        fs::write(
            dir.path().join(format!("file_{:04}.txt", i)),
            "alpha beta gamma",
        )?;
    }

    let mut session = SearchSession::new(SearchConfig {
        thread_count: std::num::NonZeroUsize::new(4),
        ..scan_config(dir.path())
    })?;
    let token = CancellationToken::new();
    let trigger = token.clone();
    let cancel_once_scanning = move |update: ProgressUpdate| {
        if update.increment.is_some_and(|p| p > 10.0) {
            trigger.cancel();
        }
    };

    let query = SearchQuery::new(["alpha", "beta"], false, false)?;
    let output = session.search_query(&query, &cancel_once_scanning, &token)?;
    assert!(output.len() < 1000);
    assert!(output.len() <= 4 * batch_size(1000, 4));
    assert!(session.cache().is_empty());
    Ok(())
}

#[test]
fn test_lossy_encoding() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("latin1.txt"), b"caf\xe9 alpha beta")?;

    let mut strict = SearchSession::new(scan_config(dir.path()))?;
    assert!(strict.search(["alpha"])?.is_empty());

    let mut lossy = SearchSession::new(SearchConfig {
        encoding_mode: allscout::EncodingMode::Lossy,
        ..scan_config(dir.path())
    })?;
    assert_eq!(lossy.search(["alpha", "beta"])?.len(), 1);
    Ok(())
}

#[test]
fn test_index_survives_new_session() -> Result<()> {
    let dir = tempdir()?;
    create_test_files(dir.path(), 6, 5)?;
    let config = SearchConfig {
        use_index: true,
        ..scan_config(dir.path())
    };

    let mut first = SearchSession::new(config.clone())?;
    let built = first.build_index()?.total_files();
    assert_eq!(built, 6);

    let mut second = SearchSession::new(config)?;
    let output = second.search(["FIXME", "TODO"])?;
    assert_eq!(output.source, SearchSource::Index);
    assert_eq!(output.len(), 3);
    assert_eq!(second.index_status()?.total_files, 6);
    Ok(())
}
