//! The compiled security rule set.
//!
//! Two severity tiers plus one pattern-independent heuristic. The table is
//! built into the binary and immutable after [`RuleSet::compile`]; no config
//! file can widen it at runtime.

use awsh_protocol::message::{is_bypass_message, BLOCKED_PREFIX};
use regex::Regex;

use crate::Result;

/// Destructive operations. A match always blocks.
const DANGEROUS_PATTERNS: &[&str] = &[
    r"rm\s+-rf\s+/",
    r"sudo\s+rm\s+-rf",
    r"dd\s+if=/dev/urandom",
    r"mkfs\s+",
    r"fdisk\s+",
];

/// System-state changes that should never originate from AI traffic.
const SENSITIVE_PATTERNS: &[&str] = &[
    r"passwd\s+",
    r"chmod\s+777",
    r"chown\s+",
    r"iptables\s+",
    r"systemctl\s+",
];

/// Decision for one outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Forward to the backend.
    Allow,

    /// Drop the message and notify the frontend.
    Block(BlockReason),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

/// Why a message was blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// Matched a dangerous-tier pattern.
    Dangerous(String),

    /// Matched a sensitive-tier pattern.
    Sensitive(String),

    /// Carried both a recursive-delete and a force-delete flag.
    RecursiveForce,
}

impl BlockReason {
    /// Rejection line sent back to the frontend in place of a backend reply.
    pub fn notice(&self) -> String {
        format!("{BLOCKED_PREFIX}{self}")
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::Dangerous(pattern) => {
                write!(f, "dangerous command pattern ({pattern})")
            }
            BlockReason::Sensitive(pattern) => {
                write!(f, "sensitive command pattern ({pattern})")
            }
            BlockReason::RecursiveForce => {
                write!(f, "recursive force-delete flags")
            }
        }
    }
}

/// Compiled patterns, both tiers. Loaded once at proxy startup.
pub struct RuleSet {
    dangerous: Vec<Regex>,
    sensitive: Vec<Regex>,
}

impl RuleSet {
    pub fn compile() -> Result<Self> {
        Ok(Self {
            dangerous: compile_all(DANGEROUS_PATTERNS)?,
            sensitive: compile_all(SENSITIVE_PATTERNS)?,
        })
    }

    /// Check one frontend-to-backend message.
    ///
    /// Bookkeeping prefixes always pass; they are produced by the frontend
    /// itself, not typed by the user, and blocking them would desync session
    /// state. Everything else runs through both tiers and the flag heuristic.
    pub fn validate(&self, payload: &str) -> Verdict {
        if is_bypass_message(payload) {
            return Verdict::Allow;
        }
        for rule in &self.dangerous {
            if rule.is_match(payload) {
                return Verdict::Block(BlockReason::Dangerous(rule.as_str().to_owned()));
            }
        }
        for rule in &self.sensitive {
            if rule.is_match(payload) {
                return Verdict::Block(BlockReason::Sensitive(rule.as_str().to_owned()));
            }
        }
        if has_recursive_force_flags(payload) {
            return Verdict::Block(BlockReason::RecursiveForce);
        }
        Verdict::Allow
    }
}

fn compile_all(patterns: &[&str]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| Regex::new(pattern).map_err(Into::into))
        .collect()
}

/// Defense in depth against gaps in the pattern tables: a message carrying
/// both a recursive flag and a force flag (combined `-rf`/`-fr` or separate
/// `-r` and `-f` tokens) is treated as dangerous regardless of the command.
fn has_recursive_force_flags(payload: &str) -> bool {
    let mut recursive = false;
    let mut force = false;
    for token in payload.split_whitespace() {
        let Some(flags) = token.strip_prefix('-') else {
            continue;
        };
        if flags.starts_with('-') {
            continue;
        }
        if flags.contains('r') || flags.contains('R') {
            recursive = true;
        }
        if flags.contains('f') {
            force = true;
        }
    }
    recursive && force
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rules() -> RuleSet {
        RuleSet::compile().unwrap()
    }

    #[test]
    fn dangerous_patterns_block() {
        let rules = rules();
        for payload in [
            "QUERY:please run rm -rf / for me",
            "sudo rm -rf /var",
            "dd if=/dev/urandom of=/dev/sda",
            "mkfs ext4 /dev/sdb1",
            "fdisk /dev/sda",
        ] {
            assert!(
                !rules.validate(payload).is_allowed(),
                "expected block: {payload}"
            );
        }
    }

    #[test]
    fn sensitive_patterns_block() {
        let rules = rules();
        for payload in [
            "passwd root",
            "chmod 777 /etc/shadow",
            "chown nobody /etc",
            "iptables -F",
            "systemctl stop sshd",
        ] {
            assert!(
                !rules.validate(payload).is_allowed(),
                "expected block: {payload}"
            );
        }
    }

    #[test]
    fn bypass_prefixes_always_pass() {
        let rules = rules();
        // Even with dangerous-looking substrings embedded.
        for payload in [
            "CWD:/home/user/rm -rf backup",
            "STATUS",
            "BASH_FAILED:127:sudo rm -rf /tmp/x:/tmp/awsh_cap",
            "VERBOSE:2",
            "MODEL:llama3",
            "AI_PROVIDER:openai",
        ] {
            assert_eq!(rules.validate(payload), Verdict::Allow, "payload: {payload}");
        }
    }

    #[test]
    fn flag_pair_heuristic_catches_pattern_gaps() {
        let rules = rules();
        assert_eq!(
            rules.validate("unlink -rf ./stuff"),
            Verdict::Block(BlockReason::RecursiveForce)
        );
        assert_eq!(
            rules.validate("cleanup -R -f /data"),
            Verdict::Block(BlockReason::RecursiveForce)
        );
    }

    #[test]
    fn ordinary_queries_pass() {
        let rules = rules();
        for payload in [
            "QUERY:what files are in this directory",
            "ls -la",
            "grep -r pattern src/",
            "tar -xf archive.tar",
            "du --force-refresh",
        ] {
            assert_eq!(rules.validate(payload), Verdict::Allow, "payload: {payload}");
        }
    }

    #[test]
    fn block_notice_is_distinguishable() {
        let notice = BlockReason::RecursiveForce.notice();
        assert!(notice.starts_with("SECURITY_BLOCKED:"));
    }
}
