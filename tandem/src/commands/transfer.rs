use super::resolve;
use crate::context::Context;
use crate::output;
use anyhow::{Context as _, Result};
use std::path::Path;
use tandem_common::config::project_name_from_path;

/// Upload a local tree and register it under `name` (default: directory name).
pub async fn push(
    ctx: &mut Context,
    path: &Path,
    name: Option<&str>,
    force: bool,
    json: bool,
) -> Result<u8> {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    let local = std::fs::canonicalize(&expanded)
        .with_context(|| format!("cannot read project directory {expanded}"))?;
    let name = match name {
        Some(name) => name.to_string(),
        None => project_name_from_path(&local)?,
    };
    let project = ctx.config.project_at(&name, &local)?;
    let report = ctx.coordinator.push(&project, force).await?;

    if ctx.config.register_project(&name, &local)? {
        ctx.save_config()?;
    }

    if json {
        output::print_json(&report)?;
        return Ok(0);
    }
    output::success(format!(
        "Pushed '{}' to {}",
        report.project, report.remote_path
    ));
    if let Some(owner) = &report.ownership_claimed {
        output::note(format!("remote copy is now owned by {}", owner.owner));
    }
    Ok(0)
}

pub async fn remove(
    ctx: &mut Context,
    name: &str,
    remote: bool,
    force: bool,
    json: bool,
) -> Result<u8> {
    let project = resolve(ctx, name)?;
    let report = ctx.coordinator.remove(&project, remote, force).await?;

    if ctx.config.forget_project(name) {
        ctx.save_config()?;
    }

    if json {
        output::print_json(&report)?;
        return Ok(0);
    }
    output::success(format!("Removed '{}' from this machine", report.project));
    if report.sync_terminated {
        output::note("sync session terminated");
    }
    if report.remote_deleted {
        output::note("remote copy, container and lock deleted");
    }
    output::note(format!(
        "local files in {} were not touched",
        project.local_path.display()
    ));
    Ok(0)
}
