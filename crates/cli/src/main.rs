mod config;
mod inspect;
mod list;
mod manage;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use thinkt_core::{CancellationToken, Source};
use thinkt_local_store::{Discovery, StoreRegistry};

#[derive(Parser)]
#[command(
    name = "thinkt",
    version,
    about = "Browse AI coding assistant conversations (Claude, Codex, Kimi, Gemini, Copilot, Qwen)"
)]
struct Cli {
    /// Path to thinkt.toml (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every known source and whether its data directory exists
    Sources,

    /// List projects across sources
    Projects {
        /// Only these sources
        #[arg(long = "source", value_parser = parse_source)]
        sources: Vec<Source>,

        /// Include projects whose directory no longer exists
        #[arg(long)]
        include_deleted: bool,
    },

    /// List the sessions of a project
    Sessions {
        /// Project ID, path or trailing path components
        project: String,

        #[arg(long, value_parser = parse_source)]
        source: Option<Source>,
    },

    /// Print the entries of a session
    View {
        /// Session file path, or session ID
        session: String,

        #[arg(long, value_parser = parse_source)]
        source: Option<Source>,

        /// Read up to this many bytes of the file
        #[arg(long, conflicts_with = "all")]
        bytes: Option<i64>,

        /// Read the whole session
        #[arg(long)]
        all: bool,
    },

    /// Export the user prompts of a session
    Prompts {
        /// Session file path, or session ID
        session: String,

        #[arg(long, value_parser = parse_source)]
        source: Option<Source>,

        #[arg(long, value_enum, default_value = "markdown")]
        format: inspect::PromptFormatArg,
    },

    /// Reopen a session in the CLI that recorded it (Claude and Kimi)
    Resume {
        /// Session file path, or session ID
        session: String,

        #[arg(long, value_parser = parse_source)]
        source: Option<Source>,

        /// Print the command instead of running it
        #[arg(long)]
        print: bool,
    },

    /// Resolve a project query, session file or directory to its source
    Resolve {
        query: String,
    },

    /// Delete a project's sessions or a single session file
    Delete {
        #[command(subcommand)]
        target: DeleteTarget,
    },

    /// Copy session files to another directory
    Copy {
        #[command(subcommand)]
        target: CopyTarget,
    },
}

#[derive(Subcommand)]
enum DeleteTarget {
    /// Delete every session of a project
    Project {
        project: String,
        #[arg(long, value_parser = parse_source)]
        source: Option<Source>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete one session file
    Session {
        path: PathBuf,
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum CopyTarget {
    /// Copy every session of a project
    Project {
        project: String,
        target: PathBuf,
        #[arg(long, value_parser = parse_source)]
        source: Option<Source>,
    },
    /// Copy one session file
    Session { path: PathBuf, target: PathBuf },
}

fn parse_source(raw: &str) -> Result<Source, String> {
    raw.parse::<Source>().map_err(|err| err.to_string())
}

/// Everything a command needs: the discovered stores and the shared cancellation token.
pub struct Context {
    pub registry: StoreRegistry,
    pub cancel: CancellationToken,
    pub json: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config::load(cli.config.as_deref())?;
    let cancel = CancellationToken::new();

    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let json = cli.json;
    let command = cli.command;
    let ctx = tokio::task::spawn_blocking(move || -> anyhow::Result<Arc<Context>> {
        let registry = Discovery::new(&config)
            .discover()
            .context("discovering sources")?;
        Ok(Arc::new(Context {
            registry,
            cancel,
            json,
        }))
    })
    .await
    .context("source discovery panicked")??;

    tokio::task::spawn_blocking(move || dispatch(&ctx, command))
        .await
        .context("command panicked")?
}

fn dispatch(ctx: &Context, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Sources => list::run_sources(ctx),
        Commands::Projects {
            sources,
            include_deleted,
        } => list::run_projects(ctx, sources, include_deleted),
        Commands::Sessions { project, source } => list::run_sessions(ctx, &project, source),
        Commands::View {
            session,
            source,
            bytes,
            all,
        } => inspect::run_view(ctx, &session, source, bytes, all),
        Commands::Prompts {
            session,
            source,
            format,
        } => inspect::run_prompts(ctx, &session, source, format),
        Commands::Resume {
            session,
            source,
            print,
        } => inspect::run_resume(ctx, &session, source, print),
        Commands::Resolve { query } => inspect::run_resolve(ctx, &query),
        Commands::Delete { target } => match target {
            DeleteTarget::Project {
                project,
                source,
                yes,
            } => manage::delete_project(ctx, &project, source, yes),
            DeleteTarget::Session { path, yes } => manage::delete_session(ctx, &path, yes),
        },
        Commands::Copy { target } => match target {
            CopyTarget::Project {
                project,
                target,
                source,
            } => manage::copy_project(ctx, &project, source, &target),
            CopyTarget::Session { path, target } => manage::copy_session(ctx, &path, &target),
        },
    }
}
