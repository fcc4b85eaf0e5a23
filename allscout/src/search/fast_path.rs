/// Fast-path candidate discovery through an external `rg` (ripgrep) binary.
///
/// `rg` only narrows the candidate list. It is asked for a superset of the files our
/// matcher accepts: ignore files, hidden-file rules and the configured globs are left
/// to the enumerator, and every file `rg` reports is restricted to the enumerated
/// candidates and verified by our own matcher. Any failure here is returned to the
/// session, which falls back to scanning.
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use super::discovery::{intersect_candidates, CandidateDiscovery};
use super::scheduler::ScanScheduler;
use crate::config::SearchConfig;
use crate::errors::{ScoutResult, SearchError};
use crate::filters::EXCLUDED_DIRS;
use crate::progress::{CancellationSignal, ProgressSink};
use crate::query::SearchQuery;
use crate::results::SearchResult;

const DEFAULT_PROGRAM: &str = "rg";
/// Deadline for `rg --version`
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// Deadline for one per-keyword search
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs `cmd` with stdout captured on a reader thread, killing it at the deadline.
fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> ScoutResult<(ExitStatus, Vec<u8>)> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                SearchError::subprocess_unavailable(format!("{}: {}", program, e))
            }
            _ => SearchError::subprocess_failed(format!("failed to start {}: {}", program, e)),
        })?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| SearchError::subprocess_failed("stdout was not captured"))?;
    let reader = thread::spawn(move || {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).map(|_| buf)
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                debug!("{} timed out after {:?}", program, timeout);
                return Err(SearchError::SubprocessTimeout(timeout));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                return Err(SearchError::subprocess_failed(e.to_string()));
            }
        }
    };

    let output = reader
        .join()
        .map_err(|_| SearchError::subprocess_failed("stdout reader panicked"))?
        .map_err(|e| SearchError::subprocess_failed(format!("reading {}: {}", program, e)))?;
    Ok((status, output))
}

/// Candidate discovery backed by `rg --files-with-matches`
#[derive(Debug, Clone)]
pub struct RipgrepDiscovery {
    program: OsString,
    root: PathBuf,
    max_file_size_kb: u64,
    timeout: Duration,
}

/// How one keyword is handed to `rg`
#[derive(Debug, Clone, PartialEq, Eq)]
enum RgPattern {
    Fixed(String),
    Regex(String),
}

impl RgPattern {
    /// `None` when `rg`'s case folding could miss a file the matcher accepts.
    ///
    /// Case-insensitive matching lowercases whole lines, so `İ` becomes `i` followed by
    /// a combining dot, which `rg`'s simple case folding never equates with `i`. ASCII
    /// keywords only meet that at their last character; other non-ASCII folds are not
    /// delegated at all.
    fn for_keyword(keyword: &str, case_sensitive: bool) -> Option<Self> {
        if case_sensitive {
            return Some(Self::Fixed(keyword.to_string()));
        }
        if !keyword.is_ascii() {
            return None;
        }
        match keyword.strip_suffix(|c: char| c == 'i' || c == 'I') {
            Some(head) => Some(Self::Regex(format!(
                r"{}(?:i|\x{{130}})",
                regex::escape(head)
            ))),
            None => Some(Self::Fixed(keyword.to_string())),
        }
    }
}

impl RipgrepDiscovery {
    pub fn new(root: &Path, config: &SearchConfig) -> Self {
        Self {
            program: OsString::from(DEFAULT_PROGRAM),
            root: root.to_path_buf(),
            max_file_size_kb: config.max_file_size_kb,
            timeout: SEARCH_TIMEOUT,
        }
    }

    /// Uses another executable in place of `rg`
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks that the binary runs, returning its version line
    pub fn probe(&self) -> ScoutResult<String> {
        let (status, stdout) =
            run_with_timeout(Command::new(&self.program).arg("--version"), PROBE_TIMEOUT)?;
        if !status.success() {
            return Err(SearchError::subprocess_unavailable(format!(
                "{} --version exited with {}",
                self.program.to_string_lossy(),
                status
            )));
        }
        let version = String::from_utf8_lossy(&stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        debug!("Fast path available: {}", version);
        Ok(version)
    }

    /// Arguments for one per-keyword search, `None` when the keyword cannot be delegated
    fn args(&self, keyword: &str, query: &SearchQuery) -> Option<Vec<OsString>> {
        let pattern = RgPattern::for_keyword(keyword, query.case_sensitive)?;
        let mut args: Vec<OsString> = [
            "--files-with-matches",
            "--text",
            "--no-messages",
            "--no-config",
            "--no-ignore",
            "--hidden",
            "--encoding",
            "none",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push("--max-filesize".into());
        args.push(format!("{}K", self.max_file_size_kb).into());
        args.push(if query.case_sensitive {
            "--case-sensitive".into()
        } else {
            "--ignore-case".into()
        });
        for dir in EXCLUDED_DIRS {
            args.push("--glob".into());
            args.push(format!("!{}", dir).into());
        }
        let pattern = match pattern {
            RgPattern::Fixed(text) => {
                args.push("--fixed-strings".into());
                text
            }
            RgPattern::Regex(text) => text,
        };
        args.push("--".into());
        args.push(pattern.into());
        args.push(self.root.clone().into_os_string());
        Some(args)
    }

    /// One path per output line; relative paths are resolved against the root
    fn parse_paths(&self, stdout: &[u8]) -> BTreeSet<PathBuf> {
        String::from_utf8_lossy(stdout)
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let path = PathBuf::from(line);
                if path.is_absolute() {
                    path
                } else {
                    self.root.join(path)
                }
            })
            .collect()
    }
}

impl CandidateDiscovery for RipgrepDiscovery {
    fn name(&self) -> &'static str {
        "fast path"
    }

    fn candidates_for(
        &self,
        keyword: &str,
        query: &SearchQuery,
    ) -> ScoutResult<BTreeSet<PathBuf>> {
        let args = self
            .args(keyword, query)
            .ok_or_else(|| SearchError::subprocess_unavailable(undelegable(keyword)))?;
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        let (status, stdout) = run_with_timeout(&mut cmd, self.timeout)?;
        match status.code() {
            Some(0) => Ok(self.parse_paths(&stdout)),
            Some(1) => Ok(BTreeSet::new()),
            _ => Err(SearchError::subprocess_failed(format!(
                "{} exited with {} for '{}'",
                self.program.to_string_lossy(),
                status,
                keyword
            ))),
        }
    }
}

fn undelegable(keyword: &str) -> String {
    format!("'{}' needs case folding rg does not do", keyword)
}

/// Keeps the enumerated candidates that discovery also reported, in candidate order
pub fn restrict_to(candidates: &[PathBuf], found: &BTreeSet<PathBuf>) -> Vec<PathBuf> {
    candidates
        .iter()
        .filter(|path| found.contains(*path))
        .cloned()
        .collect()
}

/// Answers a query through `rg`: probe, intersect per-keyword file sets, restrict them
/// to the enumerated candidates and verify the survivors with the scheduler.
pub fn search_fast_path(
    delegate: &RipgrepDiscovery,
    query: &SearchQuery,
    candidates: &[PathBuf],
    scheduler: &ScanScheduler<'_>,
    progress: &dyn ProgressSink,
    cancel: &dyn CancellationSignal,
) -> ScoutResult<Vec<SearchResult>> {
    if let Some(keyword) = query
        .keywords()
        .iter()
        .find(|k| RgPattern::for_keyword(k, query.case_sensitive).is_none())
    {
        return Err(SearchError::subprocess_unavailable(undelegable(keyword)));
    }
    delegate.probe()?;
    let found = intersect_candidates(delegate, query)?;
    let narrowed = restrict_to(candidates, &found);
    debug!(
        "Fast path narrowed {} candidates to {}",
        candidates.len(),
        narrowed.len()
    );
    scheduler.run(narrowed, progress, cancel)
}
