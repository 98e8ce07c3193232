//! Transcript post-processing.
//!
//! A PTY hands back one interleaved byte stream: the echoed command line,
//! escape sequences, real output, the synthetic exit marker, and the next
//! prompt. These steps turn that into clean output plus an exit code. The
//! line filtering is heuristic by nature; it is kept in named functions so
//! each step can be tightened independently.

use awsh_protocol::CommandOutcome;

/// Marker appended to every command so the exit status survives the PTY.
pub const EXIT_MARKER: &str = "EXIT_CODE:";

/// Marker used when querying the shell's prompt string.
pub const PROMPT_MARKER: &str = "PS1_PROMPT:";

/// Substrings indicating the shell reported a failure even when the exit
/// marker was lost to the transcript noise.
const FAILURE_MARKERS: &[&str] = &[
    "command not found",
    "Permission denied",
    "No such file or directory",
    "bash:",
    "sh:",
    "error:",
    "Error:",
];

/// Token-count classification cap; counting past this is pointless.
const MAX_COUNTED_TOKENS: usize = 10;

/// Remove ANSI escape sequences. Tracks an "in escape" state begun at ESC
/// and ended at a terminator byte; everything between is dropped.
pub fn strip_ansi(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut in_escape = false;
    for &byte in bytes {
        if in_escape {
            if matches!(byte, b'm' | b'l' | b'h' | b'J' | b'K' | b'H') {
                in_escape = false;
            }
        } else if byte == 0x1B {
            in_escape = true;
        } else {
            out.push(byte);
        }
    }
    out
}

/// Last `EXIT_CODE:<n>` line whose value actually parses. The echoed command
/// contains the literal `EXIT_CODE:$?`, which does not parse and is skipped.
pub fn extract_exit_code(text: &str) -> Option<i32> {
    let mut found = None;
    for line in text.lines() {
        if let Some(pos) = line.find(EXIT_MARKER) {
            let value = line[pos + EXIT_MARKER.len()..].trim();
            if let Ok(code) = value.parse::<i32>() {
                found = Some(code);
            }
        }
    }
    found
}

/// Drop transcript lines that are not command output: the echoed command,
/// prompt-query and exit-marker lines, and prompt-bearing lines.
///
/// Known over-strip: a legitimate output line containing `"$ "` or the
/// command text is removed too. Accepted tradeoff; see the module doc.
pub fn filter_prompt_echo(text: &str, command: &str, prompt: &str) -> String {
    let mut kept = Vec::new();
    for line in text.lines() {
        if line.contains(EXIT_MARKER) || line.contains(PROMPT_MARKER) {
            continue;
        }
        if !command.is_empty() && line.contains(command) {
            continue;
        }
        if !prompt.is_empty() && line.contains(prompt) {
            continue;
        }
        if line.contains("$ ") || line.contains("# ") {
            continue;
        }
        kept.push(line);
    }
    // Drop leading/trailing blank lines left behind by the filtering.
    while kept.first().is_some_and(|l| l.trim().is_empty()) {
        kept.remove(0);
    }
    while kept.last().is_some_and(|l| l.trim().is_empty()) {
        kept.pop();
    }
    let mut out = kept.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Whether the cleaned output carries a shell failure message.
pub fn contains_failure_marker(text: &str) -> bool {
    FAILURE_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Route a failed command by token count: three or more whitespace tokens
/// reads as natural language misparsed as shell; one or two as a typo.
/// Coarse on purpose; callers treat this as a replaceable policy.
pub fn classify_failed_command(command: &str) -> CommandOutcome {
    let tokens = command
        .split_whitespace()
        .take(MAX_COUNTED_TOKENS)
        .count();
    if tokens >= 3 {
        CommandOutcome::InvalidLong
    } else {
        CommandOutcome::InvalidShort
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strips_color_and_cursor_sequences() {
        let input = b"\x1b[31mred\x1b[0m plain \x1b[2J\x1b[Hhome";
        assert_eq!(strip_ansi(input), b"red plain home");
    }

    #[test]
    fn strip_ansi_passes_binary_through() {
        let input = [0u8, b'a', 0xFF, b'\n'];
        assert_eq!(strip_ansi(&input), input);
    }

    #[test]
    fn exit_code_skips_the_unexpanded_echo() {
        let transcript = "bash -c 'ls'; echo \"EXIT_CODE:$?\"\nfile.txt\nEXIT_CODE:0\n";
        assert_eq!(extract_exit_code(transcript), Some(0));
    }

    #[test]
    fn exit_code_takes_the_last_parsed_marker() {
        let transcript = "EXIT_CODE:1\nsomething\nEXIT_CODE:127\n";
        assert_eq!(extract_exit_code(transcript), Some(127));
    }

    #[test]
    fn exit_code_absent_when_no_marker_parses() {
        assert_eq!(extract_exit_code("echo \"EXIT_CODE:$?\"\nplain output\n"), None);
    }

    #[test]
    fn filter_keeps_only_real_output() {
        let transcript = "bash -c 'ls'; echo \"EXIT_CODE:$?\"\n\
                          file_a\nfile_b\nEXIT_CODE:0\nuser@host:~$ ";
        let cleaned = filter_prompt_echo(transcript, "ls", "user@host:~$ ");
        assert_eq!(cleaned, "file_a\nfile_b\n");
    }

    #[test]
    fn filter_over_strips_dollar_space_lines() {
        // Documented limitation of the line heuristic.
        let transcript = "price: 5$ each\nplain line\n";
        let cleaned = filter_prompt_echo(transcript, "cat prices.txt", "");
        assert_eq!(cleaned, "plain line\n");
    }

    #[test]
    fn failure_markers_detected() {
        assert!(contains_failure_marker("bash: frobnicate: command not found"));
        assert!(contains_failure_marker("cat: /etc/shadow: Permission denied"));
        assert!(contains_failure_marker("ls: xx: No such file or directory"));
        assert!(!contains_failure_marker("all good here"));
    }

    #[test]
    fn short_commands_classify_as_typos() {
        assert_eq!(
            classify_failed_command("thisdoesnotexist123"),
            CommandOutcome::InvalidShort
        );
        assert_eq!(
            classify_failed_command("gti status"),
            CommandOutcome::InvalidShort
        );
    }

    #[test]
    fn long_commands_classify_as_queries() {
        assert_eq!(
            classify_failed_command("what files are here"),
            CommandOutcome::InvalidLong
        );
        assert_eq!(
            classify_failed_command("show me the biggest directory"),
            CommandOutcome::InvalidLong
        );
    }
}
