//! Client for the AI backend, reached through the security proxy.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use awsh_protocol::message::BLOCKED_PREFIX;
use awsh_protocol::{ControlMessage, Settings, STATUS_LOADING, STATUS_READY};
use tracing::debug;

use crate::{FrontendError, Result};

/// Socket read granularity; waits are interleaved with progress signaling
/// rather than ever blocking outright.
const READ_SLICE: Duration = Duration::from_millis(250);

/// Quiet time after which a started response counts as finished.
const RESPONSE_IDLE_DONE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    Ready,
    Loading,
    Unreachable,
}

/// How a query ended.
#[derive(Debug, PartialEq, Eq)]
pub enum QueryReply {
    /// Response text was streamed to the output.
    Answered,

    /// The proxy refused to forward the message; the backend never saw it.
    Blocked(String),

    /// The wait was abandoned on a Ctrl-C; the connection is dropped.
    Interrupted,
}

pub struct BackendClient {
    proxy_socket: PathBuf,
    ceiling: Duration,
    progress_interval: Duration,
}

impl BackendClient {
    pub fn new(proxy_socket: PathBuf, settings: &Settings) -> Self {
        Self {
            proxy_socket,
            ceiling: settings.backend_ceiling,
            progress_interval: settings.progress_interval,
        }
    }

    fn connect(&self) -> std::io::Result<UnixStream> {
        let stream = UnixStream::connect(&self.proxy_socket)?;
        stream.set_read_timeout(Some(READ_SLICE))?;
        Ok(stream)
    }

    /// Quick readiness probe; never blocks the prompt loop for more than one
    /// read slice.
    pub fn status(&self) -> BackendStatus {
        let Ok(mut stream) = self.connect() else {
            return BackendStatus::Unreachable;
        };
        if stream
            .write_all(ControlMessage::Status.encode().as_bytes())
            .is_err()
        {
            return BackendStatus::Unreachable;
        }
        let mut buf = [0u8; 64];
        match stream.read(&mut buf) {
            Ok(n) if n > 0 => {
                let reply = String::from_utf8_lossy(&buf[..n]);
                if reply.contains(STATUS_READY) {
                    BackendStatus::Ready
                } else if reply.contains(STATUS_LOADING) {
                    BackendStatus::Loading
                } else {
                    BackendStatus::Unreachable
                }
            }
            _ => BackendStatus::Unreachable,
        }
    }

    /// Propagate a setting or bookkeeping message. The short ack is read and
    /// dropped; a quiet backend is not an error here.
    pub fn send_control(&self, message: &ControlMessage) -> Result<()> {
        let mut stream = self.connect()?;
        stream.write_all(message.encode().as_bytes())?;
        let mut buf = [0u8; 256];
        let _ = stream.read(&mut buf);
        debug!(message = %message.encode(), "control message sent");
        Ok(())
    }

    /// Send a query and stream the response to `out`.
    ///
    /// While the backend is quiet a progress dot is written every interval
    /// so a long response never looks frozen. The whole exchange is bounded
    /// by the hard ceiling, and a Ctrl-C (`cancel`) abandons it between
    /// read slices.
    pub fn query<W: Write>(
        &self,
        message: &ControlMessage,
        out: &mut W,
        cancel: &AtomicBool,
    ) -> Result<QueryReply> {
        let mut stream = self.connect()?;
        stream.write_all(message.encode().as_bytes())?;

        let started = Instant::now();
        let mut last_activity = Instant::now();
        let mut received = 0usize;
        let mut dots_printed = false;
        let mut buf = [0u8; 8192];

        loop {
            if cancel.load(Ordering::SeqCst) {
                if dots_printed || received > 0 {
                    out.write_all(b"\n")?;
                    out.flush()?;
                }
                return Ok(QueryReply::Interrupted);
            }
            if started.elapsed() >= self.ceiling {
                if received == 0 {
                    return Err(FrontendError::BackendTimeout);
                }
                break;
            }
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = &buf[..n];
                    if received == 0 {
                        if dots_printed {
                            out.write_all(b"\n")?;
                        }
                        if let Some(reason) = blocked_reason(chunk) {
                            return Ok(QueryReply::Blocked(reason));
                        }
                    }
                    received += n;
                    out.write_all(chunk)?;
                    out.flush()?;
                    last_activity = Instant::now();
                }
                Err(error)
                    if matches!(
                        error.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    if received > 0 {
                        if last_activity.elapsed() >= RESPONSE_IDLE_DONE {
                            break;
                        }
                    } else if last_activity.elapsed() >= self.progress_interval {
                        out.write_all(b".")?;
                        out.flush()?;
                        dots_printed = true;
                        last_activity = Instant::now();
                    }
                }
                Err(error) => return Err(error.into()),
            }
        }
        if received > 0 {
            out.write_all(b"\n")?;
            out.flush()?;
        }
        Ok(QueryReply::Answered)
    }
}

fn blocked_reason(chunk: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(chunk).ok()?;
    text.strip_prefix(BLOCKED_PREFIX)
        .map(|reason| reason.trim().to_owned())
}
