//! Human and JSON rendering of command results.

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use console::style;
use serde::Serialize;
use tandem_common::{ConfigError, ErrorCode, ProtocolError};

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn success(message: impl AsRef<str>) {
    println!("{} {}", style("✓").green().bold(), message.as_ref());
}

pub fn note(message: impl AsRef<str>) {
    println!("  {}", style(message.as_ref()).dim());
}

pub fn warning(message: impl AsRef<str>) {
    eprintln!("{} {}", style("warning:").yellow().bold(), message.as_ref());
}

/// A timestamp in the local zone for display.
pub fn local_time(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: Option<String>,
    message: String,
    remediation: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorReport {
    error: ErrorBody,
}

fn error_code(err: &anyhow::Error) -> Option<ErrorCode> {
    if let Some(e) = err.downcast_ref::<ProtocolError>() {
        return Some(e.code());
    }
    err.downcast_ref::<ConfigError>().map(ConfigError::code)
}

/// Process exit status for a failed command.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<ProtocolError>()
        .map(ProtocolError::exit_code)
        .and_then(|code| u8::try_from(code).ok())
        .unwrap_or(1)
}

/// Render a failure on stderr (or stdout as JSON) and return the exit status.
pub fn report_error(err: &anyhow::Error, json: bool) -> u8 {
    let code = error_code(err);
    if json {
        let entry = code.map(|c| c.entry());
        let report = ErrorReport {
            error: ErrorBody {
                code: entry.as_ref().map(|e| e.code.clone()),
                message: format!("{err:#}"),
                remediation: entry.map(|e| e.remediation).unwrap_or_default(),
            },
        };
        match serde_json::to_string_pretty(&report) {
            Ok(body) => println!("{body}"),
            Err(_) => eprintln!("{err:#}"),
        }
    } else {
        eprintln!("{} {err:#}", style("error:").red().bold());
        if let Some(code) = code {
            for line in code.entry().format_full().lines().skip(1) {
                eprintln!("{}", style(line).dim());
            }
        }
    }
    exit_code(err)
}
