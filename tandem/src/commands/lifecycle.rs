use super::resolve;
use crate::context::Context;
use crate::output::{self, local_time};
use anyhow::Result;
use tandem_common::protocol::{ContainerAction, LockDisposition, SyncAction};

pub async fn start(ctx: &Context, name: &str, takeover: bool, json: bool) -> Result<u8> {
    let project = resolve(ctx, name)?;
    let report = ctx.coordinator.start(&project, takeover).await?;
    if json {
        output::print_json(&report)?;
        return Ok(0);
    }

    if let Some(previous) = &report.took_over_from {
        output::warning(format!(
            "took over '{}' from {} (held since {})",
            report.project,
            previous.holder(),
            local_time(&previous.timestamp)
        ));
    }
    let verb = if report.refreshed { "Refreshed" } else { "Acquired" };
    output::success(format!("{verb} lock on '{}'", report.project));
    output::note(match report.sync {
        SyncAction::Created => "sync session created",
        SyncAction::Resumed => "sync session resumed",
        SyncAction::AlreadyRunning => "sync session already running",
    });
    output::note(match report.container {
        ContainerAction::Started => "container started",
        ContainerAction::AlreadyRunning => "container already running",
    });
    Ok(0)
}

pub async fn stop(ctx: &Context, name: &str, json: bool) -> Result<u8> {
    let project = resolve(ctx, name)?;
    let report = ctx.coordinator.stop(&project).await?;
    if json {
        output::print_json(&report)?;
        return Ok(0);
    }

    if !report.flushed {
        output::warning("final sync flush failed; remote copy may be behind");
    }
    match &report.lock {
        LockDisposition::Released => {
            output::success(format!("Stopped '{}' and released the lock", report.project));
        }
        LockDisposition::NotHeld => {
            output::success(format!("Stopped '{}' (no lock was held)", report.project));
        }
        LockDisposition::HeldElsewhere { holder } => {
            output::success(format!("Paused sync for '{}'", report.project));
            output::note(format!(
                "lock is held by {}; container left running",
                holder.holder()
            ));
        }
    }
    if report.container_stopped {
        output::note("container stopped");
    }
    if report.session_cleared {
        output::note("shell session cleared");
    }
    Ok(0)
}

/// Attach a shell; the exit status is the shell's own.
pub async fn shell(ctx: &Context, name: &str, force: bool, json: bool) -> Result<u8> {
    let project = resolve(ctx, name)?;
    let report = ctx.coordinator.enter_shell(&project, force).await?;
    if json {
        output::print_json(&report)?;
    } else if let Some(previous) = &report.overrode {
        output::warning(format!(
            "overrode the session of {} (valid until {})",
            previous.holder(),
            local_time(&previous.expires)
        ));
    }
    Ok(u8::try_from(report.exit_code).unwrap_or(1))
}
