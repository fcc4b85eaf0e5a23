/// Candidate file discovery: a `.gitignore`-aware walk of the project root, narrowed by
/// include globs, ignore globs and a list of extensions that are never text.
///
/// Glob patterns are matched against the path relative to the root, using `/` as the
/// separator on every platform, so `src/**/*.rs` means the same thing on Windows.
use glob::Pattern;
use ignore::WalkBuilder;
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace, warn};

use crate::config::{SearchConfig, WORKSPACE_DIR};
use crate::errors::{ScoutResult, SearchError};

/// Directory names that are never searched.
pub(crate) const EXCLUDED_DIRS: &[&str] = &[".git", "target", "node_modules", WORKSPACE_DIR];

/// Compiled include/ignore globs.
#[derive(Debug, Clone, Default)]
pub struct GlobFilter {
    include: Vec<Pattern>,
    ignore: Vec<Pattern>,
}

impl GlobFilter {
    /// Compiles the patterns. Invalid globs are logged and skipped.
    pub fn new(include_patterns: &[String], ignore_patterns: &[String]) -> Self {
        Self {
            include: compile_patterns(include_patterns),
            ignore: compile_patterns(ignore_patterns),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(&config.include_patterns, &config.ignore_patterns)
    }

    /// Checks the include list. An empty list includes everything.
    pub fn is_included(&self, relative: &str) -> bool {
        self.include.is_empty() || self.include.iter().any(|p| p.matches(relative))
    }

    /// Checks the ignore list
    pub fn is_ignored(&self, relative: &str) -> bool {
        self.ignore.iter().any(|p| p.matches(relative))
    }
}

fn compile_patterns(patterns: &[String]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|pattern| match Pattern::new(pattern) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("Ignoring invalid glob '{}': {}", pattern, e);
                None
            }
        })
        .collect()
}

/// Path of `path` relative to `root`, with `/` separators
pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Lowercased extension of `path`, or an empty string
pub fn extension_tag(path: &Path) -> String {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Checks whether a directory name is always excluded
pub fn is_excluded_dir(name: &OsStr) -> bool {
    name.to_str()
        .is_some_and(|n| EXCLUDED_DIRS.iter().any(|d| d.eq_ignore_ascii_case(n)))
}

/// Checks if a file should be ignored based on its relative path
pub fn should_ignore(relative: &str, filter: &GlobFilter) -> bool {
    if relative
        .split('/')
        .any(|part| is_excluded_dir(OsStr::new(part)))
    {
        return true;
    }
    filter.is_ignored(relative)
}

/// Checks if a file is likely to be binary
pub fn is_likely_binary(path: &Path) -> bool {
    const BINARY_EXTENSIONS: &[&str] = &[
        "exe", "dll", "so", "dylib", "bin", "obj", "o", "a", "lib", "class", "jar", "war", "ear",
        "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "pdf", "doc", "docx", "xls", "xlsx",
        "zip", "tar", "gz", "7z", "rar", "wasm", "mp3", "mp4", "woff", "woff2", "ttf",
    ];

    if let Some(ext) = path.extension() {
        if let Some(ext_str) = ext.to_str() {
            return BINARY_EXTENSIONS
                .iter()
                .any(|&bin_ext| bin_ext.eq_ignore_ascii_case(ext_str));
        }
    }
    false
}

/// Determines if a file should be included in the search
pub fn should_include_file(path: &Path, relative: &str, filter: &GlobFilter) -> bool {
    !is_likely_binary(path) && filter.is_included(relative) && !should_ignore(relative, filter)
}

/// Resolves and validates the workspace root
pub fn resolve_root(root: &Path) -> ScoutResult<PathBuf> {
    if !root.is_dir() {
        return Err(SearchError::no_workspace(root));
    }
    Ok(crate::errors::unify_path(root))
}

/// Walks `root` and returns the deduplicated, sorted list of files to search.
///
/// Honors `.gitignore`, `.ignore` and hidden-file rules (with or without a git
/// repository), the always-excluded directories, and the configured globs.
pub fn collect_candidates(root: &Path, config: &SearchConfig) -> ScoutResult<Vec<PathBuf>> {
    let root = resolve_root(root)?;
    let filter = GlobFilter::from_config(config);

    let mut builder = WalkBuilder::new(&root);
    builder
        .hidden(true)
        .standard_filters(true)
        .require_git(false)
        .filter_entry(|entry| entry.depth() == 0 || !is_excluded_dir(entry.file_name()));

    debug!("Scanning directory: {}", root.display());
    let mut files = BTreeSet::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let relative = relative_path(&root, entry.path());
        if should_include_file(entry.path(), &relative, &filter) {
            trace!("Candidate: {}", relative);
            files.insert(entry.into_path());
        }
    }

    debug!("Found {} candidate files", files.len());
    Ok(files.into_iter().collect())
}
