//! ultar-browse binary entry point.
//!
//! A thin command-line front end over the ultar-browse library:
//! 1. Parses command-line arguments and environment
//! 2. Initializes logging
//! 3. Builds a `BrowseService`
//! 4. Runs one request-facing operation and prints the result

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use ultar_browse::request::{self, parent_path};
use ultar_browse::{BrowseConfig, BrowseService, BufferedResponse, EntryKind, QueryParams};

#[derive(Debug, Parser)]
#[command(
    name = "ultar-browse",
    about = "Browse ultar dataset shards and extract entries",
    version
)]
struct Cli {
    #[command(flatten)]
    config: BrowseConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List subdirectories and index files
    Ls {
        /// Directory relative to the data path
        #[arg(default_value = "")]
        path: String,
    },
    /// Show the rows of an index file
    Index {
        /// Index file relative to the data path
        path: String,
        /// Print the rendered view as JSON
        #[arg(long)]
        json: bool,
    },
    /// Extract one entry's bytes
    Cat {
        /// Archive file relative to the data path
        #[arg(long)]
        file: String,
        /// Start offset (hex)
        #[arg(long)]
        base: String,
        /// End offset (hex)
        #[arg(long)]
        end: String,
        /// Entry key
        #[arg(long = "key", short = 'k')]
        key: String,
        /// Write to this file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = cli.config;
    // One-shot commands never live long enough to observe a change.
    config.watch = false;

    let service = BrowseService::new(&config).context("failed to open dataset")?;

    match cli.command {
        Command::Ls { path } => {
            let entries = request::browse(&service, &QueryParams::default().with("path", &path))?;
            if parent_path(&path).is_some() {
                println!("⬆️  ..");
            }
            for entry in entries.iter() {
                let icon = match entry.kind {
                    EntryKind::Dir => "📁",
                    EntryKind::File => "📄",
                };
                println!("{icon} {}", entry.relative_path);
            }
        }
        Command::Index { path, json } => {
            let view = request::load_index(&service, &QueryParams::default().with("path", path))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else if view.is_empty() {
                println!("No items found in the index.");
            } else {
                println!("{}", view.archive_path);
                println!("{}", view.columns.join("\t"));
                for row in &view.rows {
                    let cells: Vec<&str> = view
                        .columns
                        .iter()
                        .map(|c| row.fields.get(c).map_or("", String::as_str))
                        .collect();
                    println!("{}", cells.join("\t"));
                }
            }
        }
        Command::Cat {
            file,
            base,
            end,
            key,
            output,
        } => {
            let params: QueryParams = [("file", file), ("base", base), ("end", end), ("k", key)]
                .into_iter()
                .collect();
            let mut response = BufferedResponse::default();
            request::read_bytes(&service, &params, &mut response)?;

            match output {
                Some(path) => std::fs::write(&path, &response.body)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => std::io::stdout().lock().write_all(&response.body)?,
            }
            tracing::info!(
                "Read {} bytes (hint: {})",
                response.body.len(),
                response.mime_hint
            );
        }
    }

    Ok(())
}
