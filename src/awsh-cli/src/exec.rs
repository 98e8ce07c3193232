//! Direct command execution in the frontend's own environment.
//!
//! The direct attempt runs with captured pipes so its output can double as
//! AI context when the command fails. It is bounded: a command that holds
//! the pipes open past the ceiling is killed and handed to the sandbox for
//! classification, which is how interactive programs get caught.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const WAIT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub struct DirectOutcome {
    /// `None` when the child was killed or died to a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

impl DirectOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Run `bash -c <command>` with captured output, bounded by `ceiling`.
///
/// `cancel` is checked between waits; once set, the child is killed and
/// whatever was captured so far is returned. The caller decides what a
/// cancelled attempt means.
pub fn run_captured(
    command: &str,
    ceiling: Duration,
    cancel: &AtomicBool,
) -> std::io::Result<DirectOutcome> {
    let mut child = Command::new("bash")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Reader threads keep the pipes drained so a chatty child cannot
    // deadlock against a full pipe buffer.
    let stdout = child.stdout.take().map(collect_pipe);
    let stderr = child.stderr.take().map(collect_pipe);

    let started = Instant::now();
    let mut timed_out = false;
    let exit_code = loop {
        match child.try_wait()? {
            Some(status) => break status.code(),
            None if cancel.load(Ordering::SeqCst) => {
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
            None if started.elapsed() >= ceiling => {
                timed_out = true;
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
            None => std::thread::sleep(WAIT_POLL),
        }
    };

    Ok(DirectOutcome {
        exit_code,
        stdout: join_pipe(stdout),
        stderr: join_pipe(stderr),
        timed_out,
    })
}

fn collect_pipe<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_pipe(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn never() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn captures_stdout_and_exit_zero() {
        let outcome = run_captured("echo hello", Duration::from_secs(5), &never()).unwrap();
        assert!(outcome.succeeded());
        assert_eq!(outcome.stdout, b"hello\n");
        assert!(!outcome.timed_out);
    }

    #[test]
    fn captures_nonzero_exit_and_stderr() {
        let outcome =
            run_captured("echo oops >&2; exit 3", Duration::from_secs(5), &never()).unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stderr, b"oops\n");
        assert!(!outcome.succeeded());
    }

    #[test]
    fn kills_commands_that_outlive_the_ceiling() {
        let started = Instant::now();
        let outcome = run_captured("sleep 30", Duration::from_millis(200), &never()).unwrap();
        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn cancel_flag_abandons_a_running_command() {
        let cancel = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&cancel);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            setter.store(true, Ordering::SeqCst);
        });

        let started = Instant::now();
        let outcome = run_captured("sleep 30", Duration::from_secs(30), &cancel).unwrap();
        assert_eq!(outcome.exit_code, None);
        assert!(!outcome.timed_out);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
