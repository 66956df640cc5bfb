use super::resolve;
use crate::context::Context;
use crate::output::{self, local_time};
use anyhow::Result;
use console::style;
use serde::Serialize;
use tandem_common::protocol::StatusReport;
use tandem_common::{
    ContainerState, LockRecord, OwnershipRecord, Readout, SessionReadout, SessionRecord, SyncState,
};

/// How a record read back, flattened for JSON.
#[derive(Debug, Serialize)]
struct RecordView<T> {
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl<T: Clone> RecordView<T> {
    fn of(readout: &Readout<T>) -> Self {
        match readout {
            Readout::Valid(record) => Self::new("valid", Some(record.clone()), None),
            Readout::Absent => Self::new("absent", None, None),
            Readout::Corrupt(reason) => Self::new("corrupt", None, Some(reason.clone())),
        }
    }

    fn new(state: &'static str, record: Option<T>, reason: Option<String>) -> Self {
        Self {
            state,
            record,
            reason,
        }
    }
}

impl RecordView<SessionRecord> {
    fn of_session(readout: &SessionReadout) -> Self {
        match readout {
            SessionReadout::Valid(record) => Self::new("valid", Some(record.clone()), None),
            SessionReadout::Absent => Self::new("absent", None, None),
            SessionReadout::Corrupt(reason) => Self::new("corrupt", None, Some(reason.clone())),
            SessionReadout::Expired(record) => Self::new("expired", Some(record.clone()), None),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusView {
    project: String,
    lock: RecordView<LockRecord>,
    lock_owned_by_me: bool,
    ownership: RecordView<OwnershipRecord>,
    session: RecordView<SessionRecord>,
    sync: Option<SyncState>,
    container: Option<ContainerState>,
}

impl From<&StatusReport> for StatusView {
    fn from(report: &StatusReport) -> Self {
        Self {
            project: report.project.clone(),
            lock: RecordView::of(&report.lock),
            lock_owned_by_me: report.lock_owned_by_me,
            ownership: RecordView::of(&report.ownership),
            session: RecordView::of_session(&report.session),
            sync: report.sync,
            container: report.container,
        }
    }
}

fn lock_line(report: &StatusReport) -> String {
    match &report.lock {
        Readout::Valid(lock) if report.lock_owned_by_me => format!(
            "{} by this machine since {}",
            style("held").green(),
            local_time(&lock.timestamp)
        ),
        Readout::Valid(lock) => format!(
            "{} by {} since {} (pid {})",
            style("held").yellow(),
            lock.holder(),
            local_time(&lock.timestamp),
            lock.pid
        ),
        Readout::Absent => "free".to_string(),
        Readout::Corrupt(reason) => format!("{} ({reason})", style("damaged, treated as free").red()),
    }
}

fn ownership_line(ownership: &Readout<OwnershipRecord>) -> String {
    match ownership {
        Readout::Valid(o) => format!(
            "{} (first pushed from {} at {})",
            o.owner,
            o.machine,
            local_time(&o.created)
        ),
        Readout::Absent => "unclaimed".to_string(),
        Readout::Corrupt(reason) => format!("{} ({reason})", style("damaged, open to all").red()),
    }
}

fn session_line(session: &SessionReadout) -> String {
    match session {
        SessionReadout::Valid(s) => format!("{} until {}", s.holder(), local_time(&s.expires)),
        SessionReadout::Absent => "none".to_string(),
        SessionReadout::Expired(s) => format!("expired ({})", s.holder()),
        SessionReadout::Corrupt(reason) => format!("{} ({reason})", style("invalid").red()),
    }
}

fn engine_line<T: Serialize>(state: Option<T>) -> String {
    state
        .and_then(|s| serde_json::to_value(s).ok())
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn status(ctx: &Context, name: &str, json: bool) -> Result<u8> {
    let project = resolve(ctx, name)?;
    let report = ctx.coordinator.status(&project).await?;
    if json {
        output::print_json(&StatusView::from(&report))?;
        return Ok(0);
    }

    println!("{}", style(&report.project).bold());
    println!("  lock:       {}", lock_line(&report));
    println!("  owner:      {}", ownership_line(&report.ownership));
    println!("  session:    {}", session_line(&report.session));
    println!("  sync:       {}", engine_line(report.sync));
    println!("  container:  {}", engine_line(report.container));
    Ok(0)
}

#[derive(Debug, Serialize)]
struct UnlockView {
    project: String,
    released: Option<LockRecord>,
}

pub async fn unlock(ctx: &Context, name: &str, force: bool, json: bool) -> Result<u8> {
    let project = resolve(ctx, name)?;
    let released = ctx.coordinator.unlock(&project, force).await?;
    if json {
        output::print_json(&UnlockView {
            project: project.name,
            released,
        })?;
        return Ok(0);
    }
    match released {
        Some(lock) => output::success(format!(
            "Released lock on '{}' held by {}",
            project.name,
            lock.holder()
        )),
        None => output::success(format!("'{}' was not locked", project.name)),
    }
    Ok(0)
}
