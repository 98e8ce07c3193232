//! Timeouts and retry budgets.
//!
//! Every bounded wait in the system reads its ceiling from here. Defaults
//! match the reference tuning; each value can be overridden through an
//! `AWSH_*` environment variable, mainly so tests can shrink the budgets.

use std::time::Duration;

/// Budget for the sandbox executor's PTY read loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    /// Sleep between buffer checks.
    pub read_timeout: Duration,

    /// Checks before the command is declared interactive.
    pub max_attempts: u32,
}

impl PollBudget {
    /// Total time before completion detection gives up.
    pub fn ceiling(&self) -> Duration {
        self.read_timeout * self.max_attempts
    }
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(100),
            max_attempts: 50,
        }
    }
}

/// Runtime settings shared by all awsh processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// 0 = warnings only, 1 = info, 2 = debug.
    pub verbosity: u8,

    pub poll: PollBudget,

    /// Wait for the sandbox socket acknowledgment.
    pub ack_timeout: Duration,

    /// Hard ceiling on one backend request.
    pub backend_ceiling: Duration,

    /// Interval between "still working" dots while waiting on the backend.
    pub progress_interval: Duration,

    /// Prompt context cache lifetime.
    pub prompt_cache_ttl: Duration,

    /// Probe child liveness every Nth prompt render.
    pub health_check_every: u32,

    /// Wait after SIGTERM before escalating to SIGKILL.
    pub shutdown_grace: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            verbosity: 0,
            poll: PollBudget::default(),
            ack_timeout: Duration::from_secs(5),
            backend_ceiling: Duration::from_secs(300),
            progress_interval: Duration::from_secs(5),
            prompt_cache_ttl: Duration::from_secs(5),
            health_check_every: 10,
            shutdown_grace: Duration::from_secs(3),
        }
    }
}

impl Settings {
    /// Defaults with any `AWSH_*` overrides applied. Unparseable values are
    /// ignored rather than fatal.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(v) = env_u64("AWSH_VERBOSE") {
            settings.verbosity = v.min(2) as u8;
        }
        if let Some(ms) = env_u64("AWSH_POLL_TIMEOUT_MS") {
            settings.poll.read_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = env_u64("AWSH_POLL_ATTEMPTS") {
            settings.poll.max_attempts = n as u32;
        }
        if let Some(secs) = env_u64("AWSH_ACK_TIMEOUT_SECS") {
            settings.ack_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("AWSH_BACKEND_TIMEOUT_SECS") {
            settings.backend_ceiling = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("AWSH_PROGRESS_INTERVAL_SECS") {
            settings.progress_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("AWSH_PROMPT_CACHE_TTL_SECS") {
            settings.prompt_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(n) = env_u64("AWSH_HEALTH_CHECK_EVERY") {
            settings.health_check_every = (n as u32).max(1);
        }
        if let Some(secs) = env_u64("AWSH_SHUTDOWN_GRACE_SECS") {
            settings.shutdown_grace = Duration::from_secs(secs);
        }
        settings
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_tuning() {
        let settings = Settings::default();
        assert_eq!(settings.poll.read_timeout, Duration::from_millis(100));
        assert_eq!(settings.poll.max_attempts, 50);
        assert_eq!(settings.poll.ceiling(), Duration::from_secs(5));
        assert_eq!(settings.backend_ceiling, Duration::from_secs(300));
        assert_eq!(settings.health_check_every, 10);
        assert_eq!(settings.shutdown_grace, Duration::from_secs(3));
    }

    #[test]
    fn shutdown_grace_reads_its_override() {
        unsafe { std::env::set_var("AWSH_SHUTDOWN_GRACE_SECS", "9") };
        let settings = Settings::from_env();
        unsafe { std::env::remove_var("AWSH_SHUTDOWN_GRACE_SECS") };
        assert_eq!(settings.shutdown_grace, Duration::from_secs(9));
    }
}
