//! Terminal confirmations.

use dialoguer::console::Term;
use dialoguer::Confirm;
use dialoguer::theme::ColorfulTheme;
use std::io::IsTerminal;
use std::sync::Arc;
use tandem_common::{NonInteractive, Prompter, ProtocolError};

/// Asks on stderr, defaulting to "no".
pub struct DialoguerPrompter {
    theme: ColorfulTheme,
}

impl DialoguerPrompter {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Prompter for DialoguerPrompter {
    fn confirm(&self, message: &str) -> Result<bool, ProtocolError> {
        Confirm::with_theme(&self.theme)
            .with_prompt(message)
            .default(false)
            .interact_on(&Term::stderr())
            .map_err(|e| ProtocolError::PromptUnavailable(format!("{message} ({e})")))
    }
}

/// Dialoguer when a human can answer, otherwise a prompter that fails fast.
pub fn select(non_interactive: bool) -> Arc<dyn Prompter> {
    if non_interactive || !std::io::stdin().is_terminal() {
        Arc::new(NonInteractive)
    } else {
        Arc::new(DialoguerPrompter::new())
    }
}
