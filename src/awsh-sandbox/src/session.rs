//! The persistent shell attached to a pseudo-terminal.
//!
//! One [`ShellSession`] lives for the whole sandbox process. A reader thread
//! drains the PTY master into a shared buffer so the executor can poll with
//! its own timeout instead of blocking on a read.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tracing::{debug, warn};

use crate::{Result, SandboxError};

/// Ctrl-C byte sent to reclaim the TTY from an interactive program.
const INTERRUPT: u8 = 0x03;

pub struct ShellSession {
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
    output: Arc<Mutex<Vec<u8>>>,
    // Dropping the master closes the PTY under the child; keep it alive.
    _master: Box<dyn MasterPty + Send>,
}

impl ShellSession {
    /// Spawn `shell` with `cwd` as its working directory and start draining
    /// its output. Allocation or spawn failure here is fatal to the sandbox.
    pub fn spawn(shell: &str, cwd: &Path) -> Result<Self> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(SandboxError::Pty)?;

        let mut cmd = CommandBuilder::new(shell);
        cmd.cwd(cwd);
        cmd.env("TERM", "dumb");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(SandboxError::Spawn)?;
        drop(pair.slave);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(SandboxError::Pty)?;
        let writer = pair.master.take_writer().map_err(SandboxError::Pty)?;

        let output = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&output);
        std::thread::spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Ok(mut out) = sink.lock() {
                            out.extend_from_slice(&buf[..n]);
                        }
                    }
                }
            }
            debug!("pty reader thread finished");
        });

        Ok(Self {
            child,
            writer,
            output,
            _master: pair.master,
        })
    }

    /// Write a line into the shell's stdin.
    pub fn send_line(&mut self, line: &str) -> Result<()> {
        if !self.is_alive() {
            return Err(SandboxError::ShellExited);
        }
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Send Ctrl-C into the PTY.
    pub fn interrupt(&mut self) -> Result<()> {
        self.writer.write_all(&[INTERRUPT])?;
        self.writer.flush()?;
        Ok(())
    }

    /// Copy of everything read so far without consuming it.
    pub fn snapshot(&self) -> Vec<u8> {
        self.output.lock().map(|out| out.clone()).unwrap_or_default()
    }

    /// Take and clear the accumulated output. Used both to collect a
    /// transcript and to drain stale bytes before the next command.
    pub fn drain(&mut self) -> Vec<u8> {
        self.output
            .lock()
            .map(|mut out| std::mem::take(&mut *out))
            .unwrap_or_default()
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Terminate the child shell. Idempotent; errors only logged.
    pub fn shutdown(&mut self) {
        if self.is_alive() {
            if let Err(error) = self.child.kill() {
                warn!(%error, "could not kill shell child");
            }
            // Reap so the child does not linger as a zombie.
            std::thread::sleep(Duration::from_millis(50));
            let _ = self.child.try_wait();
        }
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
