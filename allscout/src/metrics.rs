use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::reader::SMALL_FILE_THRESHOLD;

/// Counters for one scan. Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct ScanMetrics {
    small_files: Arc<AtomicU64>,
    large_files: Arc<AtomicU64>,
    bytes_read: Arc<AtomicU64>,
    oversized_skipped: Arc<AtomicU64>,
    read_failures: Arc<AtomicU64>,
    precheck_rejections: Arc<AtomicU64>,
    matched_files: Arc<AtomicU64>,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a file about to be read, by size class
    pub fn record_file(&self, size: u64) {
        if size < SMALL_FILE_THRESHOLD {
            self.small_files.fetch_add(1, Ordering::Relaxed);
        } else {
            self.large_files.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_bytes(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_oversized(&self) {
        self.oversized_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_precheck_rejection(&self) {
        self.precheck_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_match(&self) {
        self.matched_files.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> ScanStats {
        ScanStats {
            small_files: self.small_files.load(Ordering::Relaxed),
            large_files: self.large_files.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            oversized_skipped: self.oversized_skipped.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            precheck_rejections: self.precheck_rejections.load(Ordering::Relaxed),
            matched_files: self.matched_files.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Scan stats: files (small/large): {}/{}, bytes read: {}, \
             oversized skipped: {}, read failures: {}, pre-check rejections: {}, matched: {}",
            stats.small_files,
            stats.large_files,
            stats.bytes_read,
            stats.oversized_skipped,
            stats.read_failures,
            stats.precheck_rejections,
            stats.matched_files
        );
    }
}

/// Snapshot of [`ScanMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub small_files: u64,
    pub large_files: u64,
    pub bytes_read: u64,
    pub oversized_skipped: u64,
    pub read_failures: u64,
    pub precheck_rejections: u64,
    pub matched_files: u64,
}
