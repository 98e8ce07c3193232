//! Client side of the sandbox protocol.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use awsh_protocol::{CommandResult, ResultChannelReader, Settings};
use tracing::debug;

use crate::{FrontendError, Result};

pub struct SandboxClient {
    socket_path: PathBuf,
    reader: ResultChannelReader,
    response_timeout: Duration,
}

impl SandboxClient {
    pub fn new(socket_path: PathBuf, result_file: &Path, settings: &Settings) -> Self {
        // The sandbox may spend its full poll budget twice (prompt query plus
        // the command itself) before acknowledging.
        let response_timeout = settings.ack_timeout + settings.poll.ceiling() * 2;
        Self {
            socket_path,
            reader: ResultChannelReader::new(result_file),
            response_timeout,
        }
    }

    /// Ask the sandbox to classify one command.
    ///
    /// The channel slot is only valid once the acknowledgment has arrived;
    /// reading it earlier would race the writer. Either ack means the slot
    /// holds a record, `ERROR` just means it is an error record.
    pub fn classify(&self, command: &str) -> Result<CommandResult> {
        let mut stream = UnixStream::connect(&self.socket_path)?;
        stream.set_read_timeout(Some(self.response_timeout))?;
        stream.set_write_timeout(Some(self.response_timeout))?;
        stream.write_all(command.as_bytes())?;

        let mut ack = [0u8; 8];
        let n = stream.read(&mut ack)?;
        if n == 0 {
            return Err(FrontendError::NoAck);
        }
        debug!(ack = %String::from_utf8_lossy(&ack[..n]), command, "sandbox answered");
        Ok(self.reader.read()?)
    }
}
