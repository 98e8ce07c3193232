//! Per-line routing decisions.
//!
//! Classification here is cheap and local; the sandbox remains the
//! authority on whether a failed line was really a natural-language query.

use crate::builtins::{BuiltinCommand, ShellBuiltin};

/// Shell metacharacters that veto the natural-language heuristic.
const SHELL_SYNTAX: &[char] = &['|', '>', '<', ';', '&', '$', '(', ')', '`', '*'];

/// First tokens that are obviously commands, never question openers.
const KNOWN_COMMANDS: &[&str] = &[
    "ls", "cd", "pwd", "cat", "grep", "find", "git", "vim", "vi", "nano", "less", "more", "tail",
    "head", "echo", "mkdir", "rm", "cp", "mv", "touch", "chmod", "chown", "ps", "top", "kill",
    "docker", "kubectl", "make", "cargo", "python", "python3", "ssh", "curl", "wget", "tar",
];

/// Question openers that suggest natural language.
const QUESTION_WORDS: &[&str] = &[
    "what", "how", "why", "when", "where", "who", "which", "can", "could", "should", "would",
    "show", "list", "explain", "tell", "help", "is", "are", "does", "do",
];

/// Where a line goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Blank input; just redraw the prompt.
    Empty,

    /// awsh control vocabulary, handled entirely in-process.
    Builtin(BuiltinCommand),

    /// Shell built-ins that must mutate this process (`cd`, `pwd`, `exit`).
    Shell(ShellBuiltin),

    /// Reads as natural language; skip the doomed direct attempt.
    AiQuery,

    /// Everything else: direct attempt, then sandbox classification.
    Command,
}

pub fn route(line: &str) -> Route {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Route::Empty;
    }
    if let Some(builtin) = BuiltinCommand::parse(trimmed) {
        return Route::Builtin(builtin);
    }
    if let Some(shell) = ShellBuiltin::parse(trimmed) {
        return Route::Shell(shell);
    }
    if looks_like_query(trimmed) {
        return Route::AiQuery;
    }
    Route::Command
}

/// Keyword/question-mark heuristic for natural language.
///
/// Purely an optimization to avoid a pointless failed shell invocation; a
/// wrong answer here is corrected by the sandbox classification.
pub fn looks_like_query(line: &str) -> bool {
    if line.contains(SHELL_SYNTAX) {
        return false;
    }
    let mut tokens = line.split_whitespace();
    let Some(first) = tokens.next() else {
        return false;
    };
    let first_lower = first.to_lowercase();
    if KNOWN_COMMANDS.contains(&first_lower.as_str()) {
        return false;
    }
    if line.trim_end().ends_with('?') {
        return true;
    }
    // A lone question word is more likely a typo'd command.
    QUESTION_WORDS.contains(&first_lower.as_str()) && tokens.count() >= 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn blank_lines_are_empty() {
        assert_eq!(route(""), Route::Empty);
        assert_eq!(route("   "), Route::Empty);
    }

    #[test]
    fn control_vocabulary_routes_to_builtins() {
        assert!(matches!(route("awh"), Route::Builtin(_)));
        assert!(matches!(route("awv 2"), Route::Builtin(_)));
        assert!(matches!(route("awm llama3"), Route::Builtin(_)));
    }

    #[test]
    fn process_state_builtins_route_in_process() {
        assert!(matches!(route("cd /tmp"), Route::Shell(_)));
        assert!(matches!(route("pwd"), Route::Shell(_)));
        assert!(matches!(route("exit"), Route::Shell(_)));
    }

    #[test]
    fn plain_commands_route_to_direct_attempt() {
        assert_eq!(route("echo hello"), Route::Command);
        assert_eq!(route("ls -la"), Route::Command);
        assert_eq!(route("thisdoesnotexist123"), Route::Command);
    }

    #[test]
    fn questions_route_to_ai() {
        assert_eq!(route("what files are here"), Route::AiQuery);
        assert_eq!(route("how do I see disk usage?"), Route::AiQuery);
    }

    #[test]
    fn shell_syntax_vetoes_the_query_heuristic() {
        assert_eq!(route("what | grep x"), Route::Command);
        assert_eq!(route("show > out.txt"), Route::Command);
    }

    #[test]
    fn known_commands_veto_question_words() {
        // `find` and `ls` open many questions but are commands first.
        assert_eq!(route("find . -name foo"), Route::Command);
        assert_eq!(route("ls what now"), Route::Command);
    }

    #[test]
    fn lone_question_word_is_not_a_query() {
        assert_eq!(route("explain"), Route::Command);
    }
}
