mod render;

use allscout::config::LOCAL_CONFIG_FILE;
use allscout::{EncodingMode, NeverCancel, SearchConfig, SearchError, SearchQuery, SearchSession};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::io::{self, BufRead, IsTerminal, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use render::TerminalProgress;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct WorkspaceArgs {
    /// Root directory to search in
    #[arg(short = 'd', long, default_value = ".")]
    root: PathBuf,

    /// Configuration file layered over the global and local ones
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Clone, Default)]
struct SearchOptions {
    /// Match keyword case exactly
    #[arg(short = 'c', long)]
    case_sensitive: bool,

    /// Match whole words only
    #[arg(short = 'w', long)]
    whole_word: bool,

    /// Only search files matching this glob (repeatable)
    #[arg(long)]
    include: Vec<String>,

    /// Skip files matching this glob (repeatable)
    #[arg(short, long)]
    ignore: Vec<String>,

    /// Skip files larger than this many KiB
    #[arg(long)]
    max_size_kb: Option<u64>,

    /// Answer from the persisted index, building it when needed
    #[arg(long)]
    index: bool,

    /// Never delegate discovery to ripgrep
    #[arg(long)]
    no_fast_path: bool,

    /// Number of threads to use
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// How to handle invalid UTF-8 sequences
    #[arg(long, value_enum)]
    encoding: Option<EncodingArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum EncodingArg {
    /// Skip files that are not valid UTF-8
    Failfast,
    /// Replace invalid sequences and keep searching
    Lossy,
}

impl From<EncodingArg> for EncodingMode {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::Failfast => EncodingMode::FailFast,
            EncodingArg::Lossy => EncodingMode::Lossy,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Find files containing every keyword
    Search {
        /// Keywords that must all occur in a file
        #[arg(required = true)]
        keywords: Vec<String>,

        #[command(flatten)]
        workspace: WorkspaceArgs,

        #[command(flatten)]
        options: SearchOptions,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// Show only statistics, not matches
        #[arg(short, long)]
        stats: bool,
    },

    /// Manage the persisted index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Read one query per line, refining from the previous answer where possible
    Shell {
        #[command(flatten)]
        workspace: WorkspaceArgs,

        #[command(flatten)]
        options: SearchOptions,
    },

    /// Write a default configuration file into the root directory
    Init {
        #[command(flatten)]
        workspace: WorkspaceArgs,

        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Build the index for the current tree
    Build {
        #[command(flatten)]
        workspace: WorkspaceArgs,

        #[command(flatten)]
        options: SearchOptions,
    },
    /// Show what the persisted index holds
    Status {
        #[command(flatten)]
        workspace: WorkspaceArgs,

        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the persisted index
    Clear {
        #[command(flatten)]
        workspace: WorkspaceArgs,
    },
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Search {
            keywords,
            workspace,
            options,
            json,
            stats,
        } => {
            let config = load_config(&workspace, &options)?;
            init_logging(&config);
            let mut session = SearchSession::new(config)?;
            let query = SearchQuery::from_config(&keywords, session.config())?;

            let output = if json || !io::stderr().is_terminal() {
                session.search_query(&query, &allscout::NoProgress, &NeverCancel)?
            } else {
                let progress = TerminalProgress::new();
                let output = session.search_query(&query, &progress, &NeverCancel);
                progress.finish();
                output?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                render::print_output(&output, stats);
            }
            Ok(())
        }
        Commands::Index { action } => run_index(action),
        Commands::Shell { workspace, options } => {
            let config = load_config(&workspace, &options)?;
            init_logging(&config);
            let session = SearchSession::new(config)?;
            run_shell(session)
        }
        Commands::Init { workspace, force } => {
            let path = workspace.root.join(LOCAL_CONFIG_FILE);
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            let yaml = SearchConfig::default().to_yaml()?;
            std::fs::write(&path, yaml)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

fn run_index(action: IndexAction) -> Result<()> {
    match action {
        IndexAction::Build { workspace, options } => {
            let config = load_config(&workspace, &options)?;
            init_logging(&config);
            let mut session = SearchSession::new(config)?;
            let index = session.build_index()?;
            println!(
                "Indexed {} files ({} words, {} skipped)",
                index.total_files(),
                index.total_words(),
                index.skipped().len()
            );
            println!("{}", session.index_store().location().display());
            Ok(())
        }
        IndexAction::Status { workspace, json } => {
            let config = load_config(&workspace, &SearchOptions::default())?;
            init_logging(&config);
            let session = SearchSession::new(config)?;
            match session.index_status() {
                Ok(status) if json => println!("{}", serde_json::to_string_pretty(&status)?),
                Ok(status) => render::print_status(&status),
                Err(SearchError::IndexMissing(path)) => {
                    bail!("no index at {} (run `allscout index build`)", path.display())
                }
                Err(e) => return Err(e.into()),
            }
            Ok(())
        }
        IndexAction::Clear { workspace } => {
            let config = load_config(&workspace, &SearchOptions::default())?;
            init_logging(&config);
            let mut session = SearchSession::new(config)?;
            if session.clear_index()? {
                println!("Removed {}", session.index_store().location().display());
            } else {
                println!("No index to remove");
            }
            Ok(())
        }
    }
}

fn run_shell(mut session: SearchSession) -> Result<()> {
    let interactive = io::stdin().is_terminal();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        if interactive {
            print!("{} ", "allscout>".bold());
            io::stdout().flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        match line.trim() {
            "" => continue,
            ":quit" | ":q" => break,
            ":clear" => {
                session.clear_cache();
                println!("Cache cleared");
            }
            query => match session.search(query.split_whitespace()) {
                Ok(output) => render::print_output(&output, false),
                Err(e @ SearchError::InvalidQuery(_)) => eprintln!("{} {}", "error:".red(), e),
                Err(e) => return Err(e.into()),
            },
        }
    }
    Ok(())
}

/// Layers the configuration files, then the command line on top.
///
/// Values given explicitly on the command line win even when they equal the defaults.
fn load_config(workspace: &WorkspaceArgs, options: &SearchOptions) -> Result<SearchConfig> {
    let local = workspace.root.join(LOCAL_CONFIG_FILE);
    let explicit = match &workspace.config {
        Some(path) => Some(path.clone()),
        None if local.is_file() => Some(local),
        None => None,
    };
    let base =
        SearchConfig::load_from(explicit.as_deref()).context("failed to load configuration")?;

    let defaults = SearchConfig::default();
    let cli_config = SearchConfig {
        root_path: workspace.root.clone(),
        include_patterns: options.include.clone(),
        ignore_patterns: options.ignore.clone(),
        case_sensitive: options.case_sensitive,
        whole_word: options.whole_word,
        thread_count: options.threads,
        use_fast_path: !options.no_fast_path,
        use_index: options.index,
        ..defaults
    };
    let mut config = base.merge_with_cli(cli_config);
    if let Some(kb) = options.max_size_kb {
        config.max_file_size_kb = kb;
    }
    if let Some(encoding) = options.encoding {
        config.encoding_mode = encoding.into();
    }
    Ok(config)
}

/// Logs to stderr, filtered by `RUST_LOG` when set and the configured level otherwise
fn init_logging(config: &SearchConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("allscout={}", config.log_level)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}
