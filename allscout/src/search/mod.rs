//! The matching pipeline shared by every way of answering a query.
//!
//! # Stages
//!
//! 1. **Discovery** narrows the file list: [`fast_path::RipgrepDiscovery`] asks `rg`,
//!    the index asks its word table. Both implement [`discovery::CandidateDiscovery`].
//! 2. **Processing** reads one file and decides whether it contains every keyword
//!    ([`processor::FileProcessor`]). Files of 32 KiB and more are streamed through a
//!    containment pre-check first, so most non-matching large files are never split
//!    into lines.
//! 3. **Verification** computes positions with [`matcher::KeywordMatcher`] and
//!    builds a bounded [`preview`].
//! 4. **Scheduling** spreads processing over at most four workers in batches
//!    ([`scheduler::ScanScheduler`]) and stops between batches when cancelled.
//!
//! ```rust,ignore
//! let processor = FileProcessor::new(&query, &config, &root);
//! let results = ScanScheduler::new(&processor, worker_count(None))
//!     .run(candidates, &NoProgress, &NeverCancel)?;
//! ```

pub mod discovery;
pub mod fast_path;
pub mod matcher;
pub mod preview;
pub mod processor;
pub mod scheduler;

pub use discovery::{intersect_candidates, CandidateDiscovery};
pub use fast_path::RipgrepDiscovery;
pub use matcher::KeywordMatcher;
pub use processor::FileProcessor;
pub use scheduler::{worker_count, ScanScheduler};
