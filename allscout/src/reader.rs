use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{trace, warn};

use crate::config::EncodingMode;
use crate::errors::{ScoutResult, SearchError};
use crate::search::matcher::KeywordMatcher;

/// Bytes read per chunk
pub const CHUNK_SIZE: usize = 64 * 1024;
/// Files below this size are read directly; larger ones are pre-checked first
pub const SMALL_FILE_THRESHOLD: u64 = 32 * 1024;

pub const ENCODING_UTF8: &str = "utf-8";
pub const ENCODING_UTF8_LOSSY: &str = "utf-8-lossy";

/// Decoded file contents
#[derive(Debug, Clone)]
pub struct FileContent {
    pub text: String,
    pub size: u64,
    /// `utf-8`, or `utf-8-lossy` when invalid sequences were replaced
    pub encoding: &'static str,
}

impl FileContent {
    pub fn lines(&self) -> Vec<&str> {
        split_lines(&self.text)
    }
}

/// Splits text into lines on `\n`, dropping a trailing `\r`
pub fn split_lines(text: &str) -> Vec<&str> {
    text.lines().collect()
}

/// Decodes bytes into a String according to the encoding mode
fn decode_bytes(
    bytes: Vec<u8>,
    path: &Path,
    encoding_mode: EncodingMode,
) -> ScoutResult<(String, &'static str)> {
    match String::from_utf8(bytes) {
        Ok(text) => Ok((text, ENCODING_UTF8)),
        Err(err) => match encoding_mode {
            EncodingMode::FailFast => Err(SearchError::encoding_error(path, err.utf8_error())),
            EncodingMode::Lossy => {
                warn!("Invalid UTF-8 replaced in file: {}", path.display());
                let text = String::from_utf8_lossy(err.as_bytes()).into_owned();
                Ok((text, ENCODING_UTF8_LOSSY))
            }
        },
    }
}

/// Length of the longest prefix of `bytes` that does not end inside a UTF-8 sequence
fn complete_utf8_prefix(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => bytes.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => {
            // Invalid data somewhere; only hold back a trailing partial sequence.
            let lead = bytes
                .iter()
                .rev()
                .take(4)
                .position(|b| b & 0xC0 != 0x80)
                .map(|back| bytes.len() - 1 - back);
            match lead {
                Some(i) => {
                    let needed = match bytes[i] {
                        b if b >= 0xF0 => 4,
                        b if b >= 0xE0 => 3,
                        b if b >= 0xC0 => 2,
                        _ => 1,
                    };
                    if bytes.len() - i < needed {
                        i
                    } else {
                        bytes.len()
                    }
                }
                None => bytes.len(),
            }
        }
    }
}

/// Reads files in fixed-size chunks under a byte ceiling
#[derive(Debug, Clone)]
pub struct StreamingReader {
    limit: u64,
    encoding_mode: EncodingMode,
}

impl StreamingReader {
    pub fn new(limit: u64, encoding_mode: EncodingMode) -> Self {
        Self {
            limit,
            encoding_mode,
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    fn open(&self, path: &Path) -> ScoutResult<BufReader<File>> {
        let file = File::open(path).map_err(|e| SearchError::from_io(path, e))?;
        if let Ok(metadata) = file.metadata() {
            if metadata.len() > self.limit {
                return Err(SearchError::size_exceeded(path, metadata.len(), self.limit));
            }
        }
        Ok(BufReader::with_capacity(CHUNK_SIZE, file))
    }

    /// Feeds `path` chunk by chunk to `sink` until it returns false or the file ends.
    /// Fails with `SizeExceeded` as soon as the running total passes the ceiling.
    fn stream<F>(&self, path: &Path, mut sink: F) -> ScoutResult<u64>
    where
        F: FnMut(&[u8]) -> bool,
    {
        let mut reader = self.open(path)?;
        let mut chunk = vec![0u8; CHUNK_SIZE];
        let mut total: u64 = 0;
        loop {
            let n = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SearchError::from_io(path, e)),
            };
            total += n as u64;
            if total > self.limit {
                return Err(SearchError::size_exceeded(path, total, self.limit));
            }
            if !sink(&chunk[..n]) {
                break;
            }
        }
        Ok(total)
    }

    /// Reads and decodes the whole file
    pub fn read(&self, path: &Path) -> ScoutResult<FileContent> {
        trace!("Reading file: {}", path.display());
        let mut bytes = Vec::new();
        let size = self.stream(path, |chunk| {
            bytes.extend_from_slice(chunk);
            true
        })?;
        let (text, encoding) = decode_bytes(bytes, path, self.encoding_mode)?;
        Ok(FileContent {
            text,
            size,
            encoding,
        })
    }

    /// Streams the file through the matcher's pre-check and reports whether every
    /// keyword occurs somewhere in it. Stops reading as soon as all have been seen.
    pub fn precheck(&self, path: &Path, matcher: &KeywordMatcher) -> ScoutResult<bool> {
        trace!("Pre-checking file: {}", path.display());
        let mut partial = matcher.partial();
        let mut pending: Vec<u8> = Vec::new();
        self.stream(path, |chunk| {
            pending.extend_from_slice(chunk);
            let complete = complete_utf8_prefix(&pending);
            let done = partial.feed(&String::from_utf8_lossy(&pending[..complete]));
            pending.drain(..complete);
            !done
        })?;
        if !partial.is_satisfied() && !pending.is_empty() {
            partial.feed(&String::from_utf8_lossy(&pending));
        }
        Ok(partial.is_satisfied())
    }
}
