//! One-command-per-connection socket server.

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use awsh_protocol::{CommandResult, ResultChannelWriter, ACK_ERROR, ACK_OK, MAX_COMMAND_LEN};
use tracing::{debug, info, warn};

use crate::executor::Executor;
use crate::Result;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SandboxServer {
    listener: UnixListener,
    executor: Executor,
    channel: ResultChannelWriter,
    socket_path: PathBuf,
}

impl SandboxServer {
    /// Bind the command socket, replacing a stale file from a prior run.
    pub fn bind(
        socket_path: &Path,
        executor: Executor,
        channel: ResultChannelWriter,
    ) -> Result<Self> {
        let _ = std::fs::remove_file(socket_path);
        let listener = UnixListener::bind(socket_path)?;
        // Nonblocking accept so the loop can notice a shutdown request.
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            executor,
            channel,
            socket_path: socket_path.to_owned(),
        })
    }

    /// Accept and serve until `shutdown` is raised. Connections are served
    /// strictly one at a time; a second client waits in the kernel queue, so
    /// result-channel writes never interleave.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        info!(socket = %self.socket_path.display(), "sandbox serving");
        while !shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    if let Err(error) = self.serve_one(stream) {
                        warn!(%error, "connection failed");
                    }
                }
                Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL);
                }
                Err(error) => return Err(error.into()),
            }
        }
        info!("sandbox shutting down");
        Ok(())
    }

    /// Read one command, execute it, publish the record, acknowledge.
    ///
    /// The publish must complete before the ack goes out; the ack is the
    /// client's only signal that the channel slot is valid.
    fn serve_one(&mut self, mut stream: UnixStream) -> Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut buf = vec![0u8; MAX_COMMAND_LEN];
        let n = stream.read(&mut buf)?;
        let command = String::from_utf8_lossy(&buf[..n]).trim().to_owned();
        if command.is_empty() {
            self.channel
                .publish(&CommandResult::execution_error("empty command"))?;
            stream.write_all(ACK_ERROR.as_bytes())?;
            return Ok(());
        }

        debug!(command, "executing");
        let ack = match self.executor.execute(&command) {
            Ok(result) => {
                debug!(outcome = %result.outcome, "publishing result");
                self.channel.publish(&result)?;
                ACK_OK
            }
            Err(error) => {
                warn!(%error, "execution failed");
                self.channel
                    .publish(&CommandResult::execution_error(&error.to_string()))?;
                ACK_ERROR
            }
        };
        stream.write_all(ack.as_bytes())?;
        Ok(())
    }

    /// Remove the socket and channel files. Called during orderly shutdown.
    pub fn cleanup(&mut self) {
        self.executor.shutdown();
        self.channel.remove_file();
        let _ = std::fs::remove_file(&self.socket_path);
    }
}
