//! Terminal-mode transitions.
//!
//! The line editor owns the terminal between prompts. Handing the real TTY
//! to an interactive program and then getting a working editor back requires
//! restoring the attributes saved at startup on every exit path, including a
//! child killed by a signal.

use std::process::{Command, Stdio};

use nix::sys::termios::{tcgetattr, tcsetattr, SetArg, Termios};
use tracing::debug;

/// Saved terminal attributes. `None` when stdin is not a TTY (tests,
/// pipes); restoration is then a no-op.
pub struct TermGuard {
    saved: Option<Termios>,
}

impl TermGuard {
    pub fn capture() -> Self {
        let saved = tcgetattr(&std::io::stdin()).ok();
        if saved.is_none() {
            debug!("stdin is not a tty, terminal guard inactive");
        }
        Self { saved }
    }

    pub fn restore(&self) {
        if let Some(attrs) = &self.saved {
            let _ = tcsetattr(&std::io::stdin(), SetArg::TCSANOW, attrs);
        }
    }
}

impl Drop for TermGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Re-run a command with full terminal control and inherited stdio.
///
/// Attributes are restored unconditionally afterwards, so an editor that
/// died in raw mode cannot leave the prompt loop with a broken terminal.
pub fn run_interactive(command: &str, guard: &TermGuard) -> std::io::Result<i32> {
    guard.restore();
    let status = Command::new("bash")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status();
    guard.restore();
    // Signal deaths have no code; 130 mirrors a Ctrl-C'd shell command.
    status.map(|s| s.code().unwrap_or(130))
}
