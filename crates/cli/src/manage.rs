use std::path::Path;

use anyhow::{bail, Result};
use dialoguer::Confirm;
use thinkt_core::Source;
use thinkt_local_store::ops;

use crate::list::find_project;
use crate::Context;

fn confirm(prompt: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

pub fn delete_project(ctx: &Context, query: &str, source: Option<Source>, yes: bool) -> Result<()> {
    let project = find_project(ctx, query, source)?;
    let prompt = format!(
        "Delete {} session(s) of [{}] {}?",
        project.session_count, project.source, project.display_path
    );
    if !confirm(&prompt, yes)? {
        println!("Aborted.");
        return Ok(());
    }
    let removed = ops::delete_project(&ctx.registry, &ctx.cancel, &project)?;
    println!("Deleted {removed} session(s).");
    Ok(())
}

pub fn delete_session(ctx: &Context, path: &Path, yes: bool) -> Result<()> {
    if !path.is_file() {
        bail!("not a session file: {}", path.display());
    }
    let path = std::path::absolute(path)?;
    if !confirm(&format!("Delete {}?", path.display()), yes)? {
        println!("Aborted.");
        return Ok(());
    }
    let meta = ops::delete_session(&ctx.registry, &ctx.cancel, &path)?;
    println!("Deleted session {} [{}].", meta.id, meta.source);
    Ok(())
}

pub fn copy_project(ctx: &Context, query: &str, source: Option<Source>, target: &Path) -> Result<()> {
    let project = find_project(ctx, query, source)?;
    let copied = ops::copy_project(&ctx.registry, &ctx.cancel, &project, target)?;
    println!("Copied {copied} session(s) to {}.", target.display());
    Ok(())
}

pub fn copy_session(ctx: &Context, path: &Path, target: &Path) -> Result<()> {
    let path = std::path::absolute(path)?;
    let (_, meta) = ctx.registry.resolve_session_by_path(&ctx.cancel, &path)?;
    let copied = ops::copy_session(&meta, target)?;
    println!("Copied to {}.", copied.display());
    Ok(())
}
