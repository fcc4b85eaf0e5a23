use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

use super::{FileIndexEntry, IndexHeader, IndexSettings, SearchIndex, SCHEMA_VERSION};
use crate::config::SearchConfig;
use crate::errors::{ScoutResult, SearchError};

/// On-disk form of a [`SearchIndex`].
///
/// Maps are stored as ordered lists of pairs so the same index always serializes to the
/// same bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub schema_version: u32,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    pub root: PathBuf,
    pub settings: IndexSettings,
    pub total_files: usize,
    pub total_words: usize,
    pub files: Vec<(PathBuf, FileIndexEntry)>,
    pub words: Vec<(String, Vec<PathBuf>)>,
    pub skipped: Vec<(PathBuf, SystemTime)>,
}

/// Just enough of a document to read its version before parsing the rest
#[derive(Deserialize)]
struct VersionProbe {
    schema_version: u32,
}

impl IndexDocument {
    pub fn from_index(index: &SearchIndex) -> Self {
        Self {
            schema_version: index.schema_version,
            created_at: index.created_at,
            updated_at: index.updated_at,
            root: index.root.clone(),
            settings: index.settings,
            total_files: index.total_files(),
            total_words: index.total_words(),
            files: index
                .files()
                .iter()
                .map(|(path, entry)| (path.clone(), entry.clone()))
                .collect(),
            words: index
                .words()
                .iter()
                .map(|(word, paths)| (word.clone(), paths.iter().cloned().collect()))
                .collect(),
            skipped: index
                .skipped()
                .iter()
                .map(|(path, modified)| (path.clone(), *modified))
                .collect(),
        }
    }

    pub fn into_index(self) -> ScoutResult<SearchIndex> {
        if self.files.len() != self.total_files || self.words.len() != self.total_words {
            return Err(SearchError::index_corrupt(format!(
                "document declares {} files and {} words but holds {} and {}",
                self.total_files,
                self.total_words,
                self.files.len(),
                self.words.len()
            )));
        }
        let header = IndexHeader {
            schema_version: self.schema_version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            root: self.root,
            settings: self.settings,
        };
        SearchIndex::from_parts(
            header,
            self.files.into_iter().collect(),
            self.words
                .into_iter()
                .map(|(word, paths)| (word, paths.into_iter().collect()))
                .collect(),
            self.skipped.into_iter().collect(),
        )
    }
}

/// Summary of a persisted index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStatus {
    pub location: PathBuf,
    pub schema_version: u32,
    pub total_files: usize,
    pub total_words: usize,
    pub skipped_files: usize,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Loads, saves and refreshes the index document for one root.
///
/// The last index loaded or built is kept in memory so repeated queries in one session
/// only pay for the staleness check.
#[derive(Debug)]
pub struct IndexStore {
    location: PathBuf,
    root: PathBuf,
    current: Option<SearchIndex>,
}

impl IndexStore {
    pub fn new(location: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            root: root.into(),
            current: None,
        }
    }

    /// Store at the configured location for `root`
    pub fn for_config(root: &Path, config: &SearchConfig) -> Self {
        Self::new(config.index_location(root), root)
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn exists(&self) -> bool {
        self.location.is_file()
    }

    /// Reads the persisted document.
    ///
    /// Fails with `IndexMissing` when there is none, `IndexVersionMismatch` when it was
    /// written by another schema version and `IndexCorrupt` when it does not parse.
    pub fn load(&self) -> ScoutResult<SearchIndex> {
        let data = fs::read(&self.location).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SearchError::IndexMissing(self.location.clone()),
            _ => SearchError::IoError(e),
        })?;

        let probe: VersionProbe = serde_json::from_slice(&data)
            .map_err(|e| SearchError::index_corrupt(e.to_string()))?;
        if probe.schema_version != SCHEMA_VERSION {
            return Err(SearchError::index_version_mismatch(
                probe.schema_version,
                SCHEMA_VERSION,
            ));
        }

        let document: IndexDocument = serde_json::from_slice(&data)
            .map_err(|e| SearchError::index_corrupt(e.to_string()))?;
        let index = document.into_index()?;
        debug!(
            "Loaded index from {} ({} files)",
            self.location.display(),
            index.total_files()
        );
        Ok(index)
    }

    /// Writes the document next to its final location, then renames it into place
    pub fn save(&self, index: &SearchIndex) -> ScoutResult<()> {
        if let Some(parent) = self.location.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.location.with_extension("tmp");
        let data = serde_json::to_vec(&IndexDocument::from_index(index))?;
        fs::write(&tmp_path, data)?;
        fs::rename(&tmp_path, &self.location)?;

        debug!("Saved index to {}", self.location.display());
        Ok(())
    }

    /// Builds a new index over `candidates` and persists it
    pub fn build(
        &mut self,
        candidates: &[PathBuf],
        config: &SearchConfig,
    ) -> ScoutResult<&SearchIndex> {
        let index = SearchIndex::build(&self.root, candidates, config);
        self.save(&index)?;
        Ok(&*self.current.insert(index))
    }

    /// Returns an index that describes `candidates`, loading or rebuilding as needed.
    ///
    /// A missing, corrupt or version-mismatched document is rebuilt; so is one that is
    /// stale. A rebuilt stale index keeps its original creation time.
    pub fn ensure_fresh(
        &mut self,
        candidates: &[PathBuf],
        config: &SearchConfig,
    ) -> ScoutResult<&SearchIndex> {
        let existing = match self.current.take() {
            Some(index) => Ok(index),
            None => self.load(),
        };

        let index = match existing {
            Ok(index) if !index.is_stale(candidates, config) => index,
            Ok(old) => {
                info!("Index is stale, rebuilding");
                let mut index = SearchIndex::build(&self.root, candidates, config);
                index.created_at = old.created_at;
                self.save(&index)?;
                index
            }
            Err(e) if e.is_fallback() => {
                debug!("{}; building a new index", e);
                let index = SearchIndex::build(&self.root, candidates, config);
                self.save(&index)?;
                index
            }
            Err(e) => return Err(e),
        };
        Ok(&*self.current.insert(index))
    }

    /// Deletes the persisted document. Returns whether there was one.
    pub fn clear(&mut self) -> ScoutResult<bool> {
        self.current = None;
        match fs::remove_file(&self.location) {
            Ok(()) => {
                info!("Removed index {}", self.location.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SearchError::IoError(e)),
        }
    }

    /// Summary of the persisted document
    pub fn status(&self) -> ScoutResult<IndexStatus> {
        let index = self.load()?;
        Ok(IndexStatus {
            location: self.location.clone(),
            schema_version: index.schema_version,
            total_files: index.total_files(),
            total_words: index.total_words(),
            skipped_files: index.skipped().len(),
            created_at: index.created_at,
            updated_at: index.updated_at,
        })
    }
}
