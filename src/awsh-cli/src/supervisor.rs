//! Supervision of the sandbox, proxy and backend children.
//!
//! Children are spawned detached in their own process group so a Ctrl-C at
//! the prompt never reaches them. Liveness is probed every Nth prompt
//! render, and a dead child is respawned immediately; a child that cannot be
//! respawned shows up in the prompt glyphs rather than as an error.

use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use awsh_protocol::Settings;
use tracing::{debug, info, warn};

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

struct ChildSpec {
    name: &'static str,
    program: PathBuf,
    args: Vec<String>,
    /// Absence of this binary is expected (external backend).
    optional: bool,
}

struct Supervised {
    spec: ChildSpec,
    child: Option<Child>,
}

impl Supervised {
    fn new(spec: ChildSpec) -> Self {
        Self { spec, child: None }
    }

    fn spawn(&mut self) {
        match Command::new(&self.spec.program)
            .args(&self.spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
        {
            Ok(child) => {
                info!(name = self.spec.name, pid = child.id(), "child spawned");
                self.child = Some(child);
            }
            Err(error) => {
                if self.spec.optional {
                    debug!(name = self.spec.name, %error, "optional child not started");
                } else {
                    warn!(name = self.spec.name, %error, "child failed to start");
                }
                self.child = None;
            }
        }
    }

    fn is_alive(&mut self) -> bool {
        match &mut self.child {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn respawn_if_dead(&mut self) {
        if self.is_alive() {
            return;
        }
        if let Some(mut child) = self.child.take() {
            let _ = child.wait();
            warn!(name = self.spec.name, "child died, respawning");
        }
        self.spawn();
    }

    /// SIGTERM, bounded wait, then SIGKILL.
    fn shutdown(&mut self, grace: Duration) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        let pid = nix::unistd::Pid::from_raw(child.id() as i32);
        let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if matches!(child.try_wait(), Ok(Some(_))) {
                debug!(name = self.spec.name, "child exited gracefully");
                return;
            }
            std::thread::sleep(SHUTDOWN_POLL);
        }
        warn!(name = self.spec.name, "child unresponsive, killing");
        let _ = child.kill();
        let _ = child.wait();
    }
}

/// Liveness snapshot for the prompt glyphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
    pub sandbox: bool,
    pub proxy: bool,
    pub backend: bool,
}

pub struct Supervisor {
    sandbox: Supervised,
    proxy: Supervised,
    backend: Supervised,
    prompt_count: u32,
    probe_every: u32,
    grace: Duration,
}

impl Supervisor {
    /// Spawn all children detached. Never blocks waiting for readiness; the
    /// prompt must render while they initialize.
    pub fn start(runtime_dir: Option<&Path>, settings: &Settings) -> Self {
        let forward = |mut args: Vec<String>| {
            if let Some(dir) = runtime_dir {
                args.push("--runtime-dir".to_owned());
                args.push(dir.display().to_string());
            }
            args
        };
        let mut supervisor = Self {
            sandbox: Supervised::new(ChildSpec {
                name: "sandbox",
                program: resolve_sibling("awsh-sandbox"),
                args: forward(Vec::new()),
                optional: false,
            }),
            proxy: Supervised::new(ChildSpec {
                name: "proxy",
                program: resolve_sibling("awsh-proxy"),
                args: forward(Vec::new()),
                optional: false,
            }),
            backend: Supervised::new(ChildSpec {
                name: "backend",
                program: resolve_sibling("awsh-backend"),
                args: Vec::new(),
                optional: true,
            }),
            prompt_count: 0,
            probe_every: settings.health_check_every.max(1),
            grace: settings.shutdown_grace,
        };
        supervisor.sandbox.spawn();
        supervisor.proxy.spawn();
        supervisor.backend.spawn();
        supervisor
    }

    /// Called once per prompt render. Probing every render would cost a
    /// syscall per keystroke cycle, so only every Nth counts.
    pub fn on_prompt(&mut self) {
        self.prompt_count = self.prompt_count.wrapping_add(1);
        if self.prompt_count % self.probe_every != 0 {
            return;
        }
        self.sandbox.respawn_if_dead();
        self.proxy.respawn_if_dead();
        self.backend.respawn_if_dead();
    }

    pub fn health(&mut self) -> Health {
        Health {
            sandbox: self.sandbox.is_alive(),
            proxy: self.proxy.is_alive(),
            backend: self.backend.is_alive(),
        }
    }

    pub fn shutdown(&mut self) {
        self.sandbox.shutdown(self.grace);
        self.proxy.shutdown(self.grace);
        self.backend.shutdown(self.grace);
    }
}

/// Prefer a binary living next to our own executable; fall back to PATH.
fn resolve_sibling(name: &str) -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(name)))
        .filter(|candidate| candidate.exists())
        .unwrap_or_else(|| PathBuf::from(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleeper() -> Supervised {
        Supervised::new(ChildSpec {
            name: "sleeper",
            program: PathBuf::from("sleep"),
            args: vec!["30".to_owned()],
            optional: false,
        })
    }

    #[test]
    fn spawn_probe_and_shutdown() {
        let mut child = sleeper();
        child.spawn();
        assert!(child.is_alive());
        let started = Instant::now();
        child.shutdown(Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!child.is_alive());
    }

    #[test]
    fn respawn_replaces_a_dead_child() {
        let mut child = Supervised::new(ChildSpec {
            name: "oneshot",
            program: PathBuf::from("true"),
            args: Vec::new(),
            optional: false,
        });
        child.spawn();
        // `true` exits immediately; the probe must notice and respawn.
        std::thread::sleep(Duration::from_millis(200));
        assert!(!child.is_alive());
        child.respawn_if_dead();
        assert!(child.child.is_some());
        child.shutdown(Duration::from_millis(200));
    }

    #[test]
    fn missing_binary_is_not_fatal() {
        let mut child = Supervised::new(ChildSpec {
            name: "ghost",
            program: PathBuf::from("/nonexistent/awsh-ghost"),
            args: Vec::new(),
            optional: true,
        });
        child.spawn();
        assert!(!child.is_alive());
    }
}
