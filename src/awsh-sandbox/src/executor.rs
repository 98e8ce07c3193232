//! Runs one command at a time in the shell session and classifies the result.

use std::time::Duration;

use awsh_protocol::{CommandOutcome, CommandResult, PollBudget};
use tracing::{debug, warn};

use crate::session::ShellSession;
use crate::transcript::{self, EXIT_MARKER, PROMPT_MARKER};
use crate::Result;

/// Decides, from a cleaned transcript, whether the command has finished.
///
/// Kept behind a trait so the detection strategy can be substituted without
/// touching the executor.
pub trait CompletionPolicy: Send {
    fn is_complete(&self, text: &str, prompt: &str) -> bool;
}

/// Default policy: the expanded exit marker has appeared, and the shell
/// prompt is observed after it.
///
/// A PS1 containing prompt escapes (`\u`, `\w`, ...) cannot be matched
/// against its rendered form; the expanded exit marker alone terminates
/// then.
pub struct PromptCompletion;

impl CompletionPolicy for PromptCompletion {
    fn is_complete(&self, text: &str, prompt: &str) -> bool {
        let Some(marker_end) = last_expanded_marker(text) else {
            return false;
        };
        if prompt_is_literal(prompt) {
            text[marker_end..].contains(prompt)
        } else {
            true
        }
    }
}

/// End offset of the last `EXIT_CODE:<n>` occurrence whose value parses.
/// The echoed command carries the literal `EXIT_CODE:$?`, which does not.
fn last_expanded_marker(text: &str) -> Option<usize> {
    let mut found = None;
    for (pos, _) in text.match_indices(EXIT_MARKER) {
        let after = &text[pos + EXIT_MARKER.len()..];
        let value = after.split(['\n', '\r']).next().unwrap_or("");
        if value.trim().parse::<i32>().is_ok() {
            found = Some(pos + EXIT_MARKER.len() + value.len());
        }
    }
    found
}

fn prompt_is_literal(prompt: &str) -> bool {
    !prompt.is_empty() && !prompt.contains('\\')
}

/// Single-quote a command for `bash -c`, escaping embedded quotes.
fn shell_quote_single(command: &str) -> String {
    let mut quoted = String::with_capacity(command.len() + 2);
    quoted.push('\'');
    for ch in command.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

pub struct Executor {
    session: ShellSession,
    budget: PollBudget,
    policy: Box<dyn CompletionPolicy>,
    prompt: Option<String>,
}

impl Executor {
    pub fn new(session: ShellSession, budget: PollBudget) -> Self {
        Self {
            session,
            budget,
            policy: Box::new(PromptCompletion),
            prompt: None,
        }
    }

    pub fn with_policy(mut self, policy: Box<dyn CompletionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn session_alive(&mut self) -> bool {
        self.session.is_alive()
    }

    /// Run one command to completion, or detect that it will not complete.
    ///
    /// Classification outcomes are `Ok`; only PTY transport failures are
    /// `Err`, and the server converts those to an error record rather than
    /// exiting.
    pub fn execute(&mut self, command: &str) -> Result<CommandResult> {
        // Leftover bytes from a prior interactive program must not
        // contaminate this transcript.
        let stale = self.session.drain();
        if !stale.is_empty() {
            debug!(bytes = stale.len(), "discarded stale pty output");
        }

        let prompt = match self.prompt.clone() {
            Some(prompt) => prompt,
            None => {
                let prompt = self.query_prompt()?;
                self.prompt = Some(prompt.clone());
                prompt
            }
        };

        let quoted = shell_quote_single(command);
        self.session
            .send_line(&format!("bash -c {quoted}; echo \"{EXIT_MARKER}$?\""))?;

        let mut complete = false;
        for _ in 0..self.budget.max_attempts {
            std::thread::sleep(self.budget.read_timeout);
            let raw = self.session.snapshot();
            let text = String::from_utf8_lossy(&transcript::strip_ansi(&raw)).into_owned();
            if self.policy.is_complete(&text, &prompt) {
                complete = true;
                break;
            }
        }

        if !complete {
            // Assume the program is holding the TTY open; reclaim it. The
            // miss may also mean PS1 changed under us, so re-query next time.
            self.prompt = None;
            warn!(command, "no prompt within poll budget, treating as interactive");
            self.session.interrupt()?;
            std::thread::sleep(self.budget.read_timeout);
            let _ = self.session.drain();
            return Ok(CommandResult::bare(CommandOutcome::Interactive));
        }

        let raw = self.session.drain();
        let text = String::from_utf8_lossy(&transcript::strip_ansi(&raw)).into_owned();
        let exit_code = transcript::extract_exit_code(&text).unwrap_or(1);
        let cleaned = transcript::filter_prompt_echo(&text, command, &prompt);

        if transcript::contains_failure_marker(&cleaned) {
            let outcome = transcript::classify_failed_command(command);
            debug!(command, %outcome, "failure marker in output");
            return Ok(CommandResult {
                outcome,
                stdout: cleaned.into_bytes(),
                stderr: Vec::new(),
            });
        }

        Ok(CommandResult::exited(exit_code, cleaned.into_bytes(), Vec::new()))
    }

    /// Ask the shell for its actual prompt string. The prompt may be
    /// customized, and matching against the real value is the only reliable
    /// termination signal over a PTY transcript. Asked once per session and
    /// cached; re-queried only after a failed completion match.
    fn query_prompt(&mut self) -> Result<String> {
        self.session
            .send_line(&format!("echo \"{PROMPT_MARKER}$PS1\""))?;
        for _ in 0..self.budget.max_attempts {
            std::thread::sleep(self.budget.read_timeout);
            let raw = self.session.snapshot();
            let text = String::from_utf8_lossy(&transcript::strip_ansi(&raw)).into_owned();
            for line in text.lines() {
                if let Some(pos) = line.find(PROMPT_MARKER) {
                    let value = &line[pos + PROMPT_MARKER.len()..];
                    // The echoed query still carries the unexpanded $PS1.
                    if !value.contains("$PS1") {
                        let _ = self.session.drain();
                        return Ok(value.trim_end().to_owned());
                    }
                }
            }
        }
        warn!("prompt query got no answer, falling back to marker detection");
        let _ = self.session.drain();
        Ok(String::new())
    }

    /// Give the shell a short window to settle after spawn.
    pub fn warm_up(&mut self) {
        std::thread::sleep(Duration::from_millis(200));
        let _ = self.session.drain();
    }

    pub fn shutdown(&mut self) {
        self.session.shutdown();
    }

    #[cfg(test)]
    fn cached_prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }
}
