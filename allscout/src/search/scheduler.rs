use rayon::prelude::*;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, info, trace, warn};

use super::processor::FileProcessor;
use crate::errors::{ScoutResult, SearchError};
use crate::progress::{CancellationSignal, ProgressSink, ProgressUpdate};
use crate::results::{sort_results, SearchResult};

/// Upper bound on concurrent scan workers
pub const MAX_WORKERS: usize = 4;
const MIN_BATCH_SIZE: usize = 8;
const MAX_BATCH_SIZE: usize = 64;

/// Number of scan workers: the requested count or the CPU count, capped at [`MAX_WORKERS`]
pub fn worker_count(requested: Option<NonZeroUsize>) -> usize {
    requested
        .map_or_else(num_cpus::get, NonZeroUsize::get)
        .clamp(1, MAX_WORKERS)
}

/// Files per batch, aiming for a few batches per worker
pub fn batch_size(total: usize, workers: usize) -> usize {
    (total / (workers.max(1) * 4)).clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE)
}

/// Drives a [`FileProcessor`] over a candidate list with a fixed pool of workers.
///
/// Workers pop batches from a shared queue, process each batch's files in parallel and
/// append matches to a shared accumulator. Cancellation is checked before every pop;
/// a batch that has started always finishes. A cancelled scan returns what it found so
/// far, with no marker in the results.
pub struct ScanScheduler<'a> {
    processor: &'a FileProcessor,
    workers: usize,
}

impl<'a> ScanScheduler<'a> {
    pub fn new(processor: &'a FileProcessor, workers: usize) -> Self {
        Self {
            processor,
            workers: workers.clamp(1, MAX_WORKERS),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Scans `files` and returns matches sorted by relative path
    pub fn run(
        &self,
        files: Vec<PathBuf>,
        progress: &dyn ProgressSink,
        cancel: &dyn CancellationSignal,
    ) -> ScoutResult<Vec<SearchResult>> {
        let total = files.len();
        let batch = batch_size(total, self.workers);
        info!(
            "Scanning {} files with {} workers (batch size {})",
            total, self.workers, batch
        );

        let queue = Mutex::new(VecDeque::from(files));
        let found = Mutex::new(Vec::new());
        let processed = AtomicUsize::new(0);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("allscout-scan-{}", i))
            .build()
            .map_err(|e| SearchError::config_error(format!("failed to start scan pool: {}", e)))?;

        pool.scope(|scope| {
            for worker in 0..self.workers {
                let queue = &queue;
                let found = &found;
                let processed = &processed;
                scope.spawn(move |_| loop {
                    if cancel.is_cancelled() {
                        debug!("Worker {} observed cancellation", worker);
                        break;
                    }
                    let next: Vec<PathBuf> = {
                        let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
                        let n = batch.min(queue.len());
                        queue.drain(..n).collect()
                    };
                    if next.is_empty() {
                        break;
                    }

                    let matches: Vec<SearchResult> =
                        next.par_iter().filter_map(|path| self.scan_one(path)).collect();

                    // reported under the lock so progress never goes backwards
                    let mut found = found.lock().unwrap_or_else(PoisonError::into_inner);
                    found.extend(matches);
                    let done = processed.fetch_add(next.len(), Ordering::SeqCst) + next.len();
                    progress.report(ProgressUpdate::scanning(done, total));
                });
            }
        });

        let mut results = found.into_inner().unwrap_or_else(PoisonError::into_inner);
        sort_results(&mut results);
        self.processor.metrics().log_stats();
        debug!(
            "Scan finished: {} of {} files processed, {} matched",
            processed.load(Ordering::SeqCst),
            total,
            results.len()
        );
        Ok(results)
    }

    /// Per-file errors never escape: they are logged and count as no match
    fn scan_one(&self, path: &Path) -> Option<SearchResult> {
        match self.processor.process_file(path) {
            Ok(result) => result,
            Err(SearchError::SizeExceeded { size, limit, .. }) => {
                trace!(
                    "Skipping {} ({} bytes, limit {})",
                    path.display(),
                    size,
                    limit
                );
                self.processor.metrics().record_oversized();
                None
            }
            Err(e) if e.is_per_file() => {
                warn!("Failed to search {}: {}", path.display(), e);
                self.processor.metrics().record_failure();
                None
            }
            Err(e) => {
                error!("Unexpected error searching {}: {}", path.display(), e);
                self.processor.metrics().record_failure();
                None
            }
        }
    }
}
