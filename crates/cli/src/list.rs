use std::path::Path;

use anyhow::{Context as _, Result};
use thinkt_core::{Project, Source};
use thinkt_local_store::ProjectFilter;

use crate::output::{format_size, format_time, print_json};
use crate::Context;

/// Resolve `query` to a project, optionally restricted to one source.
pub fn find_project(ctx: &Context, query: &str, source: Option<Source>) -> Result<Project> {
    let Some(source) = source else {
        return Ok(ctx.registry.resolve_project(&ctx.cancel, query)?);
    };
    let store = ctx
        .registry
        .get(source)
        .with_context(|| format!("{source} is not available on this machine"))?;
    if let Some(project) = store.get_project(&ctx.cancel, query)? {
        return Ok(project);
    }
    let wanted = query.trim_end_matches('/');
    store
        .list_projects(&ctx.cancel)?
        .into_iter()
        .filter(|project| {
            project.path == query || (!wanted.is_empty() && Path::new(&project.path).ends_with(wanted))
        })
        .max_by_key(|project| project.last_modified)
        .with_context(|| format!("no {source} project matches {query:?}"))
}

pub fn run_sources(ctx: &Context) -> Result<()> {
    let infos = ctx.registry.source_status(&ctx.cancel)?;
    if ctx.json {
        return print_json(&infos);
    }
    if infos.is_empty() {
        println!("No AI assistant data found on this machine.");
        println!();
        println!(
            "Supported: {}",
            Source::ALL
                .iter()
                .map(|source| source.description())
                .collect::<Vec<_>>()
                .join(", ")
        );
        return Ok(());
    }
    for info in &infos {
        let status = if info.available { "ok" } else { "missing" };
        println!(
            "{:<8} {:<8} {:>4} project(s)  {}",
            info.source,
            status,
            info.project_count,
            info.base_path.display()
        );
    }
    Ok(())
}

pub fn run_projects(ctx: &Context, sources: Vec<Source>, include_deleted: bool) -> Result<()> {
    let filter = ProjectFilter {
        include_deleted,
        sources,
    };
    let mut projects = ctx.registry.list_all_projects(&ctx.cancel, &filter)?;
    projects.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
    if ctx.json {
        return print_json(&projects);
    }
    if projects.is_empty() {
        println!("No projects found.");
        return Ok(());
    }
    for project in &projects {
        let deleted = if project.path_exists { "" } else { " (deleted)" };
        println!(
            "[{}] {}{}  {} session(s), last {}",
            project.source,
            project.display_path,
            deleted,
            project.session_count,
            format_time(project.last_modified)
        );
    }
    println!();
    println!("Total: {} project(s)", projects.len());
    Ok(())
}

pub fn run_sessions(ctx: &Context, query: &str, source: Option<Source>) -> Result<()> {
    let project = find_project(ctx, query, source)?;
    let store = ctx
        .registry
        .get(project.source)
        .with_context(|| format!("{} is not available", project.source))?;
    let sessions = store.list_sessions(&ctx.cancel, &project.id)?;
    if ctx.json {
        return print_json(&sessions);
    }
    println!("[{}] {}", project.source, project.display_path);
    if sessions.is_empty() {
        println!("  no sessions");
        return Ok(());
    }
    for meta in &sessions {
        println!(
            "  {}  {}  {} entries, {}",
            meta.id,
            format_time(meta.modified_at),
            meta.entry_count,
            format_size(meta.file_size)
        );
        if !meta.first_prompt.is_empty() {
            println!("      {}", meta.first_prompt);
        }
        println!("      {}", meta.full_path.display());
    }
    Ok(())
}
