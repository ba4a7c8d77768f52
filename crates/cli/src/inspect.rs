use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use serde::Serialize;
use thinkt_core::prompts::{self, PromptFormat};
use thinkt_core::{Entry, Project, SessionMeta, Source};
use thinkt_local_store::ResumeInfo;

use crate::output::{format_size, format_time, print_json, render_entry};
use crate::Context;

#[derive(Serialize)]
struct ViewOutput<'a> {
    meta: &'a SessionMeta,
    entries: &'a [Entry],
    has_more: bool,
    bytes_consumed: u64,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Resolved {
    Session { meta: SessionMeta },
    Project { project: Project },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PromptFormatArg {
    Markdown,
    Json,
    Plain,
}

impl PromptFormatArg {
    fn format(self) -> PromptFormat {
        match self {
            Self::Markdown => PromptFormat::Markdown,
            Self::Json => PromptFormat::Json,
            Self::Plain => PromptFormat::Plain,
        }
    }
}

#[derive(Serialize)]
struct ResumeOutput<'a> {
    session: &'a str,
    source: Source,
    #[serde(flatten)]
    resume: &'a ResumeInfo,
}

/// Locate a session file from a path or a session ID.
fn session_path(ctx: &Context, query: &str, source: Option<Source>) -> Result<PathBuf> {
    let path = Path::new(query);
    if path.is_file() {
        return Ok(std::path::absolute(path)?);
    }
    for store in ctx.registry.all() {
        if source.is_some_and(|wanted| wanted != store.source()) {
            continue;
        }
        if let Some(meta) = store.get_session_meta(&ctx.cancel, query)? {
            return Ok(meta.full_path);
        }
    }
    bail!("session not found: {query}")
}

pub fn run_view(
    ctx: &Context,
    query: &str,
    source: Option<Source>,
    bytes: Option<i64>,
    all: bool,
) -> Result<()> {
    let path = session_path(ctx, query, source)?;
    let mut session = ctx
        .registry
        .open_lazy_session_by_path(&ctx.cancel, &path)
        .with_context(|| format!("opening {}", path.display()))?;
    if all {
        session.load_all()?;
    } else if let Some(bytes) = bytes {
        session.load_more(bytes)?;
    }

    if ctx.json {
        print_json(&ViewOutput {
            meta: session.metadata(),
            entries: session.entries(),
            has_more: session.has_more(),
            bytes_consumed: session.bytes_consumed(),
        })?;
        return session.close().map_err(Into::into);
    }

    let meta = session.metadata();
    println!(
        "[{}] {}  {}  {}",
        meta.source,
        meta.id,
        format_time(meta.modified_at),
        format_size(meta.file_size)
    );
    println!();
    for entry in session.entries() {
        println!("{}", render_entry(entry));
        println!();
    }
    if session.has_more() {
        println!(
            "... {} of {} read ({:.0}%). Pass --all or a larger --bytes to see more.",
            format_size(session.bytes_consumed()),
            format_size(meta.file_size),
            session.progress() * 100.0
        );
    }
    session.close()?;
    Ok(())
}

pub fn run_resolve(ctx: &Context, query: &str) -> Result<()> {
    let path = Path::new(query);
    let resolved = if path.is_file() {
        let path = std::path::absolute(path)?;
        let (_, meta) = ctx.registry.resolve_session_by_path(&ctx.cancel, &path)?;
        Resolved::Session { meta }
    } else if path.is_dir() {
        let path = std::path::absolute(path)?;
        let project = ctx
            .registry
            .find_project_for_path(&ctx.cancel, &path)?
            .with_context(|| format!("no project contains {}", path.display()))?;
        Resolved::Project { project }
    } else {
        Resolved::Project {
            project: ctx.registry.resolve_project(&ctx.cancel, query)?,
        }
    };

    if ctx.json {
        return print_json(&resolved);
    }
    match resolved {
        Resolved::Session { meta } => {
            println!("session {} [{}]", meta.id, meta.source);
            println!("  project: {}", meta.project_path);
            println!("  file:    {}", meta.full_path.display());
            println!("  entries: {}", meta.entry_count);
        }
        Resolved::Project { project } => {
            println!("project {} [{}]", project.id, project.source);
            println!("  path:     {}", project.display_path);
            println!("  sessions: {}", project.session_count);
        }
    }
    Ok(())
}

/// Print the user prompts of a session. `--json` wins over `--format`.
pub fn run_prompts(
    ctx: &Context,
    query: &str,
    source: Option<Source>,
    format: PromptFormatArg,
) -> Result<()> {
    let path = session_path(ctx, query, source)?;
    let (store, meta) = ctx.registry.resolve_session_by_path(&ctx.cancel, &path)?;
    let session = store
        .load_session(&ctx.cancel, &meta.full_path.to_string_lossy())?
        .with_context(|| format!("session vanished: {}", path.display()))?;
    let format = if ctx.json {
        PromptFormat::Json
    } else {
        format.format()
    };
    print!("{}", prompts::render(&session, format)?);
    Ok(())
}

/// Reopen a session in the CLI that recorded it, or print the command with `--print`.
pub fn run_resume(
    ctx: &Context,
    query: &str,
    source: Option<Source>,
    print_only: bool,
) -> Result<()> {
    let path = session_path(ctx, query, source)?;
    let (store, meta) = ctx.registry.resolve_session_by_path(&ctx.cancel, &path)?;
    let Some(resume) = store.resume_command(&meta)? else {
        bail!("{} sessions cannot be resumed", meta.source);
    };

    if ctx.json {
        return print_json(&ResumeOutput {
            session: &meta.id,
            source: meta.source,
            resume: &resume,
        });
    }
    if print_only {
        match &resume.dir {
            Some(dir) => println!("cd {} && {}", dir.display(), resume.command_line()),
            None => println!("{}", resume.command_line()),
        }
        return Ok(());
    }

    tracing::debug!(command = %resume.command_line(), dir = ?resume.dir, "resuming session");
    let mut command = std::process::Command::new(&resume.program);
    command.args(&resume.args);
    if let Some(dir) = &resume.dir {
        command.current_dir(dir);
    }
    let status = command
        .status()
        .with_context(|| format!("running {}", resume.program))?;
    if !status.success() {
        bail!("{} exited with {status}", resume.program);
    }
    Ok(())
}
