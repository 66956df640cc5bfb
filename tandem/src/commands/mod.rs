//! Subcommand handlers. Each returns the process exit status on success.

mod inspect;
mod lifecycle;
mod transfer;

pub use inspect::{status, unlock};
pub use lifecycle::{shell, start, stop};
pub use transfer::{push, remove};

use crate::context::Context;
use anyhow::Result;
use tandem_common::ResolvedProject;

fn resolve(ctx: &Context, name: &str) -> Result<ResolvedProject> {
    Ok(ctx.config.project(name)?)
}
