//! CLI entry point.
//!
//! Commands for building the index, querying it, and keeping it current in
//! watch mode. Settings come from `.codeweave/settings.toml` and `CW_`
//! environment variables; a few flags override them per run.

use anyhow::{Context, Result, anyhow};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use codeweave::display::{
    OutputFormat, create_progress_bar, create_spinner, format_symbol, format_timestamp,
    print_statistics,
};
use codeweave::indexing::SweepProgress;
use codeweave::storage::{DiskBackend, IndexBackend};
use codeweave::{
    BuildOptions, CodeIndex, Direction, IndexError, IndexWatcher, QueryResult, QueryStatus, Settings,
    Symbol, SymbolId, SymbolKind,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Multi-provider C code index
#[derive(Parser)]
#[command(
    name = "codeweave",
    version = env!("CARGO_PKG_VERSION"),
    about = "Index C code with several analyzers and query the merged symbols",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project root (defaults to the workspace containing .codeweave, else the current directory)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up the .codeweave directory with default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Build or update the index
    Index {
        /// Directory to index (overrides --root)
        path: Option<PathBuf>,

        /// Number of analysis threads (overrides config)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Show a progress bar
        #[arg(short, long)]
        progress: bool,

        /// Skip the embedding pass
        #[arg(long)]
        no_embed: bool,
    },

    /// Natural-language search over symbols
    #[command(after_help = "Examples:\n  codeweave search \"parse command line options\"\n  codeweave search \"free a linked list\" --limit 5")]
    Search {
        query: String,

        /// Maximum results (defaults to semantic_search.default_limit)
        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Find symbols by exact name
    Find {
        name: String,

        #[arg(long)]
        json: bool,
    },

    /// List symbols of one kind (function, variable, struct, union, enum, typedef, macro, field)
    Kind {
        kind: String,

        #[arg(long)]
        json: bool,
    },

    /// Functions calling a symbol, given by name or id
    Callers {
        target: String,

        #[arg(long)]
        json: bool,
    },

    /// Functions a symbol calls, given by name or id
    Callees {
        target: String,

        #[arg(long)]
        json: bool,
    },

    /// Walk the call graph from a symbol
    Graph {
        target: String,

        #[arg(short, long, value_enum, default_value = "callees")]
        direction: Direction,

        #[arg(long, default_value_t = 3)]
        depth: u32,

        #[arg(long)]
        json: bool,
    },

    /// Symbols declared in one file, in order
    File {
        /// Path relative to the project root
        path: String,

        #[arg(long)]
        json: bool,
    },

    /// Files that include a header
    Includes {
        /// Header name, e.g. util.h or lib/util.h
        header: String,

        #[arg(long)]
        json: bool,
    },

    /// Index statistics
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Re-index whenever sources change
    Watch {
        /// Build once before watching
        #[arg(long)]
        initial: bool,
    },

    /// Display active settings
    Config,
}

fn init_tracing(level: &str, verbose: bool) {
    let default = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    match &cli.config {
        Some(path) => Settings::load_from(path).map_err(|e| {
            anyhow::Error::from(IndexError::Config {
                reason: format!("{e} (loading {})", path.display()),
            })
        }),
        None => Settings::load()
            .map_err(|e| anyhow::Error::from(IndexError::Config { reason: e.to_string() })),
    }
}

fn project_root(cli: &Cli, settings: &Settings) -> Result<PathBuf> {
    match cli.root.clone().or_else(|| settings.workspace_root.clone()) {
        Some(root) => Ok(root),
        None => std::env::current_dir().context("cannot determine the current directory"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(&cli)?;
    init_tracing(&settings.logging.level, cli.verbose);

    let code = match &cli.command {
        Commands::Init { force } => {
            let root = match &cli.root {
                Some(root) => root.clone(),
                None => std::env::current_dir()?,
            };
            let path = Settings::init_config_file(&root, *force).map_err(|e| anyhow!("{e}"))?;
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize providers and semantic search.");
            0
        }

        Commands::Config => {
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            println!("{}", toml::to_string_pretty(&settings)?);
            0
        }

        Commands::Index {
            path,
            threads,
            progress,
            no_embed,
        } => {
            if let Some(threads) = threads {
                settings.indexing.parallel_threads = *threads;
            }
            if *no_embed {
                settings.semantic_search.enabled = false;
            }
            let root = match path {
                Some(path) => path.clone(),
                None => project_root(&cli, &settings)?,
            };
            run_index(root, settings, *progress).await?
        }

        Commands::Watch { initial } => {
            let root = project_root(&cli, &settings)?;
            run_watch(root, settings, *initial).await?
        }

        query => {
            let root = project_root(&cli, &settings)?;
            let index = CodeIndex::open(&root, settings)?;
            run_query(&index, query)?
        }
    };

    std::process::exit(code);
}

async fn run_index(root: PathBuf, settings: Settings, show_progress: bool) -> Result<i32> {
    let loading = show_progress.then(|| create_spinner("Opening index"));
    let index = Arc::new(CodeIndex::open(&root, settings)?);
    if let Some(spinner) = loading {
        spinner.finish_and_clear();
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling after the current file...");
            ctrl_c.cancel();
        }
    });

    let bar = show_progress.then(|| create_progress_bar(0, "Indexing"));
    let progress = bar.clone().map(|bar| {
        Arc::new(move |p: &SweepProgress| {
            bar.set_length(p.total as u64);
            bar.set_position(p.done as u64);
            bar.set_message(p.file.clone());
        }) as Arc<codeweave::indexing::ProgressFn<'static>>
    });

    let options = BuildOptions { cancel, progress };
    let worker = index.clone();
    let summary = tokio::task::spawn_blocking(move || worker.build_index(&options)).await??;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    summary.display();
    if summary.cancelled {
        return Err(IndexError::Cancelled.into());
    }
    Ok(if summary.has_errors() { 1 } else { 0 })
}

async fn run_watch(root: PathBuf, settings: Settings, initial: bool) -> Result<i32> {
    let index = Arc::new(CodeIndex::open(&root, settings)?);
    if initial {
        let worker = index.clone();
        let summary =
            tokio::task::spawn_blocking(move || worker.build_index(&BuildOptions::default())).await??;
        summary.display();
    }

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    eprintln!("Watching {} for changes. Press Ctrl+C to stop.", index.root().display());
    IndexWatcher::new(index)?.watch(shutdown).await?;
    Ok(0)
}

fn run_query(index: &CodeIndex, command: &Commands) -> Result<i32> {
    let code = match command {
        Commands::Search { query, limit, json } => {
            let limit = limit.unwrap_or(index.settings().semantic_search.default_limit);
            let result = index.search_semantic(query, limit);
            emit(&result, *json, |hit| {
                format!("{:.3}  {}", hit.score, format_symbol(&hit.symbol))
            })?
        }
        Commands::Find { name, json } => emit(&index.search_exact(name), *json, format_symbol)?,
        Commands::Kind { kind, json } => {
            let kind: SymbolKind = kind.parse().map_err(|e| anyhow!("{e}: '{kind}'"))?;
            emit(&index.get_symbols_by_kind(kind), *json, format_symbol)?
        }
        Commands::Callers { target, json } => match resolve_target(index, target) {
            Ok(id) => emit(&index.get_callers(id), *json, format_symbol)?,
            Err(status) => report_status(&status),
        },
        Commands::Callees { target, json } => match resolve_target(index, target) {
            Ok(id) => emit(&index.get_callees(id), *json, format_symbol)?,
            Err(status) => report_status(&status),
        },
        Commands::Graph {
            target,
            direction,
            depth,
            json,
        } => match resolve_target(index, target) {
            Ok(id) => emit(
                &index.traverse_calls(id, *direction, *depth),
                *json,
                |(symbol, depth)| format!("{}{}", "  ".repeat(*depth as usize), format_symbol(symbol)),
            )?,
            Err(status) => report_status(&status),
        },
        Commands::File { path, json } => emit(&index.get_file_symbols(path), *json, format_symbol)?,
        Commands::Includes { header, json } => emit(&index.get_files_including(header), *json, |hit| {
            format!("{}  #include {}", hit.file, hit.include)
        })?,
        Commands::Stats { json } => {
            let stats = index.get_statistics();
            if *json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_statistics(&stats);
                print_last_sweep(index.root(), index.settings());
            }
            0
        }
        Commands::Init { .. } | Commands::Index { .. } | Commands::Watch { .. } | Commands::Config => 0,
    };
    Ok(code)
}

fn print_last_sweep(root: &Path, settings: &Settings) {
    let backend = DiskBackend::new(settings.index_dir(root));
    if let Ok(Some(metadata)) = backend.load_metadata() {
        println!("  Last indexed: {}", format_timestamp(metadata.last_modified));
    }
}

/// Symbol id in hex, or a name that matches exactly
fn resolve_target(index: &CodeIndex, target: &str) -> std::result::Result<SymbolId, QueryStatus> {
    if let Ok(id) = target.parse::<SymbolId>() {
        if index.get_symbol(id).is_some() {
            return Ok(id);
        }
    }

    let found = index.search_exact(target);
    if !found.status.is_ok() {
        return Err(found.status);
    }
    let candidates: Vec<&Symbol> = found.items.iter().collect();
    let chosen = candidates
        .iter()
        .find(|s| s.kind == SymbolKind::Function)
        .or_else(|| candidates.first())
        .ok_or(QueryStatus::NotFound)?;
    if candidates.len() > 1 {
        eprintln!(
            "'{target}' matches {} symbols, using {} at {}:{} (pass an id to pick another)",
            candidates.len(),
            chosen.id,
            chosen.file,
            chosen.line
        );
    }
    Ok(chosen.id)
}

fn report_status(status: &QueryStatus) -> i32 {
    eprintln!("{status}");
    status.exit_code()
}

fn emit<T: Serialize>(result: &QueryResult<T>, json: bool, line: impl Fn(&T) -> String) -> Result<i32> {
    match OutputFormat::from_json_flag(json) {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Text => {
            if result.status.is_ok() {
                for item in &result.items {
                    println!("{}", line(item));
                }
                if result.items.is_empty() {
                    eprintln!("no results");
                }
            } else {
                eprintln!("{}", result.status);
            }
        }
    }
    Ok(result.status.exit_code())
}
