use crate::error::ProtocolError;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Asks the operator yes/no questions.
pub trait Prompter: Send + Sync {
    /// `Ok(false)` means the operator declined.
    fn confirm(&self, message: &str) -> Result<bool, ProtocolError>;
}

/// Fails every prompt; used for `--non-interactive` and when stdin is not a TTY.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn confirm(&self, message: &str) -> Result<bool, ProtocolError> {
        Err(ProtocolError::PromptUnavailable(message.to_string()))
    }
}

/// Answers prompts from a queue and records what was asked.
///
/// Running out of answers behaves like [`NonInteractive`].
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, message: &str) -> Result<bool, ProtocolError> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(message.to_string());
        }
        let next = self.answers.lock().ok().and_then(|mut a| a.pop_front());
        next.ok_or_else(|| ProtocolError::PromptUnavailable(message.to_string()))
    }
}
