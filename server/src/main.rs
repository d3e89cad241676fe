//! filex binary: the CLI surface of §6 (`index` / `search` / `status`) plus
//! a `serve` mode hosting the HTTP surface, matching this lineage's pattern
//! of one binary wearing both hats.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use clap::{Parser, Subcommand};
use regex::Regex;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use filex_core::chunker::FixedSizeChunker;
use filex_core::embedder::{HashingImageEmbedder, HashingTextEmbedder, TextEmbedder};
use filex_core::handler::{ImageFileHandler, TextFileHandler};
use filex_core::{FilexError, HandlerRouter, IndexingController, RepositoryManager, Repository, Result};
use filex_http::folders::{default_folders_path, RegisteredFolders};
use filex_http::AppState;

#[derive(Parser)]
#[command(name = "filex", version, about = "Local content-addressed semantic search", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Default repository root when serving HTTP with no subcommand (informational).
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Port to bind when serving HTTP with no subcommand. Unset: scan 8432..8442 for a free port.
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Bind 0.0.0.0 instead of 127.0.0.1 when serving HTTP with no subcommand.
    #[arg(long, global = true)]
    bind_all: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a file or directory.
    Index {
        /// File or directory to index (default: current directory).
        path: Option<PathBuf>,
        /// Reindex even if unchanged.
        #[arg(long)]
        force: bool,
        /// Don't descend into subdirectories.
        #[arg(long)]
        no_recursive: bool,
        /// Restrict to these extensions (comma-separated, no dot). Default: no filter.
        #[arg(long, value_delimiter = ',')]
        extensions: Option<Vec<String>>,
        /// Embedding model to use (pluggable; unset uses the built-in stand-in).
        #[arg(long)]
        model: Option<String>,
    },
    /// Search the repository reachable from the current directory.
    Search {
        /// Search query. May contain inline `-count N` / `--count N` / `--c N` tokens.
        query: String,
        /// Number of results to return (outer flag wins over an inline token).
        #[arg(long)]
        count: Option<usize>,
        /// Embedding model to use (pluggable; unset uses the built-in stand-in).
        #[arg(long)]
        model: Option<String>,
    },
    /// Print index/search/storage statistics for the current repository.
    Status {
        /// Embedding model to use (pluggable; unset uses the built-in stand-in).
        #[arg(long)]
        model: Option<String>,
    },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("filex=info".parse().unwrap()),
        )
        .with_target(false)
        .init();
}

fn build_router(model: Option<&str>) -> HandlerRouter {
    if let Some(m) = model {
        info!(model = m, "model selection is a pluggable capability; using the built-in hashing stand-in");
    }
    let chunker = Box::new(FixedSizeChunker::new(512, 50).expect("default chunker params are valid"));
    let text_embedder = Arc::new(HashingTextEmbedder::default());
    let image_embedder = Arc::new(HashingImageEmbedder::default());
    HandlerRouter::new(
        TextFileHandler::new(chunker, text_embedder),
        ImageFileHandler::new(image_embedder),
    )
}

fn locate_or_create_repo(start: &Path) -> Result<Repository> {
    match Repository::locate(start) {
        Some(repo) => Ok(repo),
        None => Repository::create(start),
    }
}

fn locate_repo(start: &Path) -> Result<Repository> {
    Repository::locate(start).ok_or_else(|| FilexError::NotFound(start.to_path_buf()))
}

// ---------------------------------------------------------------------------
// `filex index`
// ---------------------------------------------------------------------------

fn run_index(
    path: Option<PathBuf>,
    force: bool,
    no_recursive: bool,
    extensions: Option<Vec<String>>,
    model: Option<String>,
) -> Result<()> {
    let target =
        path.unwrap_or_else(|| std::env::current_dir().expect("current directory must be readable"));
    if !target.exists() {
        return Err(FilexError::NotFound(target));
    }

    let locate_start = if target.is_file() {
        target.parent().unwrap_or_else(|| Path::new(".")).to_path_buf()
    } else {
        target.clone()
    };
    let repo = locate_or_create_repo(&locate_start)?;
    let manager = RepositoryManager::new(repo, build_router(model.as_deref()))?;

    if target.is_file() {
        let result = manager.index_file(&target, force)?;
        println!("{}", serde_json::to_string_pretty(&result).expect("result always serializes"));
    } else {
        let exts: Option<HashSet<String>> = extensions.map(|list| {
            list.into_iter().map(|e| e.trim_start_matches('.').to_lowercase()).collect()
        });
        let outcome = manager.index_directory(&target, !no_recursive, exts.as_ref(), force)?;
        println!("{}", serde_json::to_string_pretty(&outcome).expect("result always serializes"));
        if outcome.errors > 0 {
            for msg in &outcome.error_messages {
                error!("{msg}");
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// `filex search`
// ---------------------------------------------------------------------------

/// Strip an inline `-count N` / `--count N` / `--c N` token out of a raw
/// query string, returning the cleaned query and the count if present.
fn extract_inline_count(query: &str) -> (String, Option<usize>) {
    let re = Regex::new(r"(?:^|\s)(?:--count|--c|-count)\s+(\d+)(?:\s|$)")
        .expect("inline count regex is a compile-time const");
    if let Some(caps) = re.captures(query) {
        let count = caps[1].parse::<usize>().ok();
        let cleaned = re.replace(query, " ").trim().to_string();
        (cleaned, count)
    } else {
        (query.to_string(), None)
    }
}

fn run_search(query: String, count: Option<usize>, model: Option<String>) -> Result<()> {
    let (cleaned_query, inline_count) = extract_inline_count(&query);
    let top_k = count.or(inline_count).unwrap_or(10);
    if top_k == 0 {
        return Err(FilexError::InvalidArgument("count must be > 0".into()));
    }

    let cwd = std::env::current_dir().expect("current directory must be readable");
    let repo = locate_repo(&cwd)?;
    let manager = RepositoryManager::new(repo, build_router(model.as_deref()))?;

    let text_embedder = HashingTextEmbedder::default();
    let query_vector = text_embedder.embed(&cleaned_query)?;
    let results = manager.vector_index.search(top_k, Some(&query_vector), None)?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. {} (chunk {}, similarity {:.4})\n   {}",
            rank + 1,
            result.file_path,
            result.chunk_index,
            result.similarity,
            truncate(&result.chunk_text, 120),
        );
    }
    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}…")
    }
}

// ---------------------------------------------------------------------------
// `filex status`
// ---------------------------------------------------------------------------

fn run_status(model: Option<String>) -> Result<()> {
    let cwd = std::env::current_dir().expect("current directory must be readable");
    let repo = locate_repo(&cwd)?;
    let manager = RepositoryManager::new(repo, build_router(model.as_deref()))?;

    let entries = manager.catalog.get_all_entries()?;
    let (text_rows, image_rows) = manager.vector_index.row_counts();
    let storage_bytes = manager.blob_store.storage_size();

    println!("repository:      {}", manager.repository.repo_path.display());
    println!("work tree:       {}", manager.repository.work_tree_root().display());
    println!("indexed files:   {}", entries.len());
    println!("text vectors:    {text_rows}");
    println!("image vectors:   {image_rows}");
    println!("storage bytes:   {storage_bytes}");
    Ok(())
}

// ---------------------------------------------------------------------------
// `filex serve`
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl+C");
        info!("received Ctrl+C, shutting down");
    }
}

async fn run_serve(root: Option<PathBuf>, port: Option<u16>, bind_all: bool) {
    if let Some(root) = &root {
        info!(root = %root.display(), "default repository root (requests still carry their own repo_path)");
    }

    let folders_path = default_folders_path();
    let folders = RegisteredFolders::load(&folders_path);

    let controller = Arc::new(IndexingController::new(Arc::new(|| build_router(None)), 4));
    let state = AppState {
        controller,
        text_embedder: Arc::new(HashingTextEmbedder::default()),
        image_embedder: Arc::new(HashingImageEmbedder::default()),
        folders: Arc::new(RwLock::new(folders)),
        folders_path: Arc::new(folders_path),
    };

    let app = filex_http::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    let bind_addr = if bind_all { "0.0.0.0" } else { "127.0.0.1" };
    let port = port.or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()));

    let listener = if let Some(port) = port {
        tokio::net::TcpListener::bind(format!("{bind_addr}:{port}")).await.unwrap_or_else(|e| {
            error!(port, error = %e, "could not bind to port");
            std::process::exit(1);
        })
    } else {
        const BASE: u16 = 8432;
        const RANGE: u16 = 10;
        let mut found = None;
        for candidate in BASE..BASE + RANGE {
            if let Ok(l) = tokio::net::TcpListener::bind(format!("{bind_addr}:{candidate}")).await {
                found = Some(l);
                break;
            }
        }
        found.unwrap_or_else(|| {
            error!(range_start = BASE, range_end = BASE + RANGE - 1, "no free port found");
            std::process::exit(1);
        })
    };

    let bound_port = listener.local_addr().expect("bound listener has a local address").port();
    info!(port = bound_port, "http://{bind_addr}:{bound_port}");
    eprintln!("FILEX_PORT={bound_port}");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.unwrap_or_else(|e| {
        error!(error = %e, "server exited with an error");
    });
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    init_logging();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Some(Commands::Index { path, force, no_recursive, extensions, model }) => {
            match run_index(path, force, no_recursive, extensions, model) {
                Ok(()) => 0,
                Err(e) => {
                    eprintln!("{e}");
                    1
                }
            }
        }
        Some(Commands::Search { query, count, model }) => match run_search(query, count, model) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{e}");
                1
            }
        },
        Some(Commands::Status { model }) => match run_status(model) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{e}");
                1
            }
        },
        None => {
            let rt = tokio::runtime::Runtime::new().expect("failed to build tokio runtime");
            rt.block_on(run_serve(cli.root, cli.port, cli.bind_all));
            0
        }
    };

    std::process::exit(exit_code);
}
