pub mod cache;
pub mod config;
pub mod errors;
pub mod filters;
pub mod index;
pub mod metrics;
pub mod progress;
pub mod query;
pub mod reader;
pub mod results;
pub mod search;
pub mod session;

pub use cache::ResultCache;
pub use config::{EncodingMode, SearchConfig};
pub use errors::{ScoutResult, SearchError};
pub use index::{IndexStatus, IndexStore, SearchIndex};
pub use progress::{
    CancellationSignal, CancellationToken, NeverCancel, NoProgress, ProgressSink, ProgressUpdate,
};
pub use query::SearchQuery;
pub use results::{KeywordMatch, MatchPosition, Preview, SearchOutput, SearchResult, SearchSource};
pub use session::SearchSession;
