//! Lineage - file-history inspection CLI
//!
//! Debugging front end over the library: builds the committed and
//! working-copy graphs for a local git repository and answers path,
//! history and fragment-trace queries.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lineage::scm::GitHistorySource;
use lineage::{
    CancelToken, DiffLimits, Fragment, FragmentTracer, HistoryView, Revision, RevisionedFile,
    VirtualFileHistoryGraph,
};

/// Lineage - track files and line fragments across repository history
#[derive(Parser, Debug)]
#[command(name = "lineage")]
#[command(
    version,
    about = "Track files and line fragments across adds, deletes, renames and copies"
)]
struct Cli {
    /// Repository to inspect (any directory inside it)
    #[arg(long, default_value = ".", global = true)]
    repo: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every path the history graph tracks
    Paths,
    /// Show the node chain recorded for one path
    History {
        /// Path relative to the repository root
        path: String,
    },
    /// Project a line range forward to its newest locations
    Trace {
        /// Path relative to the repository root
        path: String,
        /// First line of the fragment (1-based)
        start: u32,
        /// Last line of the fragment (inclusive)
        end: u32,
        /// Revision the fragment is anchored at; defaults to the newest
        /// committed revision of the path
        #[arg(long)]
        rev: Option<u64>,
        /// Also report the origin fragment itself
        #[arg(long)]
        include_self: bool,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    run(Cli::parse())
}

fn run(cli: Cli) -> Result<()> {
    let source = GitHistorySource::open(&cli.repo)?;
    let cancel = CancelToken::new();
    let remote = Arc::new(source.remote_graph(&cancel)?);
    let local = Arc::new(source.local_graph()?);
    let graph = VirtualFileHistoryGraph::new(remote, local);

    match cli.command {
        Command::Paths => {
            for path in graph.paths() {
                println!("{path}");
            }
        }
        Command::History { path } => {
            print_history(&source, &graph, &path)?;
        }
        Command::Trace {
            path,
            start,
            end,
            rev,
            include_self,
            json,
        } => {
            let options = TraceArgs {
                path,
                start,
                end,
                rev,
                include_self,
                json,
            };
            trace_fragment(&source, &graph, options)?;
        }
    }
    Ok(())
}

fn print_history(
    source: &GitHistorySource,
    graph: &VirtualFileHistoryGraph,
    path: &str,
) -> Result<()> {
    let mut nodes: Vec<_> = graph
        .remote()
        .nodes_for_path(path)
        .into_iter()
        .map(|node| (node.file().clone(), node.kind()))
        .collect();
    let local = graph.local();
    for node in local.nodes_for_path(path) {
        nodes.push((node.file().clone(), node.kind()));
    }
    if nodes.is_empty() {
        println!("{path}: not tracked");
        return Ok(());
    }

    for (file, kind) in nodes {
        let annotation = match file.revision {
            Revision::Repository(revision) => {
                let summary = source.commit_summary(revision)?;
                format!("{} {} {}", summary.hash, summary.timestamp, summary.message)
            }
            Revision::Working => "working copy".to_string(),
            Revision::Unknown => String::new(),
        };
        println!("{kind:<12} {:<12} {annotation}", file.revision.to_string());
        for edge in graph.ancestor_edges(&file) {
            println!("             {} <- {}", edge.kind, edge.ancestor);
        }
    }
    Ok(())
}

struct TraceArgs {
    path: String,
    start: u32,
    end: u32,
    rev: Option<u64>,
    include_self: bool,
    json: bool,
}

fn trace_fragment(
    source: &GitHistorySource,
    graph: &VirtualFileHistoryGraph,
    args: TraceArgs,
) -> Result<()> {
    anyhow::ensure!(
        args.start >= 1 && args.start <= args.end,
        "invalid line range {}-{}",
        args.start,
        args.end
    );

    let revision = match args.rev {
        Some(revision) => Revision::Repository(revision),
        None => graph
            .remote()
            .nearest_before(&args.path, Revision::Working)
            .map(|node| node.file().revision)
            .with_context(|| format!("no committed history for {}", args.path))?,
    };
    let anchor = RevisionedFile::new(source.repository_id().clone(), args.path, revision);
    let fragment = Fragment::new(anchor, args.start, args.end);

    let provider = source.diff_provider(DiffLimits::default());
    let tracer = FragmentTracer::new(&provider);
    let traced = tracer.trace_fragment(graph, &fragment, args.include_self, &CancelToken::new())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&traced)?);
        return Ok(());
    }
    if traced.is_empty() {
        println!("fragment has no surviving descendants");
    }
    for result in traced {
        println!(
            "{}@{} lines {}-{}",
            result.file.path, result.file.revision, result.start_line, result.end_line
        );
    }
    Ok(())
}
