use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::errors::{ScoutResult, SearchError};

/// File name of the project-local configuration.
pub const LOCAL_CONFIG_FILE: &str = ".allscout.yaml";

/// Directory under the project root that holds allscout state.
pub const WORKSPACE_DIR: &str = ".allscout";

const INDEX_FILE: &str = "index.json";

/// How to handle files that are not valid UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Skip the file (it is treated as unreadable).
    #[default]
    FailFast,
    /// Replace invalid sequences with U+FFFD and keep going.
    Lossy,
}

/// Configuration for a search session.
///
/// # Configuration Locations
///
/// Sources are layered, later ones overriding earlier ones:
/// 1. Global `$CONFIG_DIR/allscout/config.yaml`
/// 2. Local `.allscout.yaml` in the current directory
/// 3. Custom config file passed to [`SearchConfig::load_from`]
///
/// Every field has a default, so an empty file is a valid configuration.
///
/// ```yaml
/// root_path: "."
/// include_patterns: ["**/*.rs", "**/*.toml"]
/// ignore_patterns: ["target/**", "**/*.min.js"]
/// case_sensitive: false
/// whole_word: false
/// max_file_size_kb: 1024
/// use_fast_path: true
/// use_index: false
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Root directory to search
    pub root_path: PathBuf,

    /// Globs a file must match to be searched. Empty means every file.
    pub include_patterns: Vec<String>,

    /// Globs of files to skip
    /// Examples:
    /// - "target/**": Ignore everything under target/
    /// - "**/*.min.js": Ignore all minified JS files
    pub ignore_patterns: Vec<String>,

    /// Match keyword case exactly
    pub case_sensitive: bool,

    /// Only match keywords bounded by non-word characters
    pub whole_word: bool,

    /// Files larger than this are skipped
    pub max_file_size_kb: u64,

    /// Scan workers. Defaults to min(cpu count, 4)
    pub thread_count: Option<NonZeroUsize>,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Handling of invalid UTF-8
    pub encoding_mode: EncodingMode,

    /// Try the external `rg` binary before the internal scanner
    pub use_fast_path: bool,

    /// Answer queries from the persisted inverted index
    pub use_index: bool,

    /// Where the index document lives. Defaults to `<root>/.allscout/index.json`
    pub index_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("."),
            include_patterns: Vec::new(),
            ignore_patterns: Vec::new(),
            case_sensitive: false,
            whole_word: false,
            max_file_size_kb: 1024,
            thread_count: None,
            log_level: default_log_level(),
            encoding_mode: EncodingMode::default(),
            use_fast_path: true,
            use_index: false,
            index_path: None,
        }
    }
}

impl SearchConfig {
    /// Loads configuration from the default locations
    pub fn load() -> ScoutResult<Self> {
        Self::load_from(None)
    }

    /// Loads configuration from the default locations plus an explicit file
    pub fn load_from(config_path: Option<&Path>) -> ScoutResult<Self> {
        if let Some(path) = config_path {
            if !path.exists() {
                return Err(SearchError::config_error(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
        }

        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("allscout/config.yaml")),
            Some(PathBuf::from(LOCAL_CONFIG_FILE)),
            config_path.map(PathBuf::from),
        ];

        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| SearchError::config_error(e.to_string()))
    }

    /// Merges CLI arguments with configuration file values.
    /// CLI values win whenever they differ from the defaults.
    pub fn merge_with_cli(mut self, cli_config: SearchConfig) -> Self {
        let defaults = SearchConfig::default();
        if cli_config.root_path != defaults.root_path {
            self.root_path = cli_config.root_path;
        }
        if !cli_config.include_patterns.is_empty() {
            self.include_patterns = cli_config.include_patterns;
        }
        if !cli_config.ignore_patterns.is_empty() {
            self.ignore_patterns = cli_config.ignore_patterns;
        }
        if cli_config.case_sensitive {
            self.case_sensitive = true;
        }
        if cli_config.whole_word {
            self.whole_word = true;
        }
        if cli_config.max_file_size_kb != defaults.max_file_size_kb {
            self.max_file_size_kb = cli_config.max_file_size_kb;
        }
        if cli_config.thread_count.is_some() {
            self.thread_count = cli_config.thread_count;
        }
        if cli_config.log_level != defaults.log_level {
            self.log_level = cli_config.log_level;
        }
        if cli_config.encoding_mode != defaults.encoding_mode {
            self.encoding_mode = cli_config.encoding_mode;
        }
        if !cli_config.use_fast_path {
            self.use_fast_path = false;
        }
        if cli_config.use_index {
            self.use_index = true;
        }
        if cli_config.index_path.is_some() {
            self.index_path = cli_config.index_path;
        }
        self
    }

    /// Size ceiling in bytes
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size_kb.saturating_mul(1024)
    }

    /// Location of the persisted index for `root`
    pub fn index_location(&self, root: &Path) -> PathBuf {
        match &self.index_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root.join(path),
            None => root.join(WORKSPACE_DIR).join(INDEX_FILE),
        }
    }

    /// Serializes the configuration as YAML, for `allscout init`
    pub fn to_yaml(&self) -> ScoutResult<String> {
        serde_yaml::to_string(self).map_err(|e| {
            SearchError::config_error(format!("Failed to serialize configuration to YAML: {}", e))
        })
    }
}
