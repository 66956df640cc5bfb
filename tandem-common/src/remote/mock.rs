//! Scriptable executor for tests.
//!
//! Records every command and can inject transport failures or failed
//! exits for commands matching a substring. Commands that match no rule
//! are passed to an inner executor (typically [`super::LocalExecutor`]
//! pointed at a temp directory), or succeed with empty output.

use super::{ExecOutput, RemoteExecutor, RemoteHost};
use crate::error::RemoteError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum Response {
    Unreachable(String),
    Exit(ExecOutput),
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    response: Response,
}

#[derive(Clone, Default)]
pub struct MockExecutor {
    inner: Option<Arc<dyn RemoteExecutor>>,
    rules: Arc<Mutex<Vec<Rule>>>,
    history: Arc<Mutex<Vec<String>>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward unmatched commands to `inner`.
    pub fn wrapping(inner: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            inner: Some(inner),
            ..Self::default()
        }
    }

    /// Commands containing `pattern` fail as if the host were unreachable.
    pub fn unreachable_on(&self, pattern: impl Into<String>, message: impl Into<String>) {
        self.push_rule(pattern.into(), Response::Unreachable(message.into()));
    }

    /// Every command fails as if the host were unreachable.
    pub fn unreachable(&self, message: impl Into<String>) {
        self.unreachable_on("", message);
    }

    /// Commands containing `pattern` return this output instead of running.
    pub fn respond_on(&self, pattern: impl Into<String>, output: ExecOutput) {
        self.push_rule(pattern.into(), Response::Exit(output));
    }

    /// Drop all scripted responses.
    pub fn clear_rules(&self) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.clear();
        }
    }

    /// Commands executed so far, in order.
    pub fn history(&self) -> Vec<String> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    fn push_rule(&self, pattern: String, response: Response) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule { pattern, response });
        }
    }

    fn matching(&self, command: &str) -> Option<Response> {
        let rules = self.rules.lock().ok()?;
        rules
            .iter()
            .find(|rule| command.contains(&rule.pattern))
            .map(|rule| rule.response.clone())
    }
}

#[async_trait]
impl RemoteExecutor for MockExecutor {
    async fn execute(&self, host: &RemoteHost, command: &str) -> Result<ExecOutput, RemoteError> {
        if let Ok(mut history) = self.history.lock() {
            history.push(command.to_string());
        }

        match self.matching(command) {
            Some(Response::Unreachable(message)) => Err(RemoteError::Connection {
                host: host.destination.clone(),
                message,
            }),
            Some(Response::Exit(output)) => Ok(output),
            None => match &self.inner {
                Some(inner) => inner.execute(host, command).await,
                None => Ok(ExecOutput::ok("")),
            },
        }
    }
}
