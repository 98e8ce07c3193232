//! The memory-mapped result channel.
//!
//! A single fixed-capacity file holds the record for the most recently
//! executed command. The sandbox is the only writer, the frontend the only
//! reader, and the frontend must not read until it has received the socket
//! acknowledgment for that command; the ack is the happens-before point.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut};
use thiserror::Error;

use crate::outcome::CommandResult;
use crate::record::{decode_record, encode_record, RecordError};

/// Channel file size. Output beyond this is truncated, never an error.
pub const CHANNEL_CAPACITY: usize = 1024 * 1024;

/// Bytes reserved for the record's framing lines.
const FRAMING_SLACK: usize = 96;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("could not open channel file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not map channel file: {0}")]
    Map(std::io::Error),

    #[error("could not flush channel file: {0}")]
    Flush(std::io::Error),

    #[error("channel record is malformed: {0}")]
    Record(#[from] RecordError),
}

/// Sandbox-side handle. Creating the writer sizes and zeroes the file.
pub struct ResultChannelWriter {
    map: MmapMut,
    path: PathBuf,
}

impl ResultChannelWriter {
    pub fn create(path: &Path) -> Result<Self, ChannelError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| ChannelError::Open {
                path: path.to_owned(),
                source,
            })?;
        file.set_len(CHANNEL_CAPACITY as u64)
            .map_err(ChannelError::Map)?;
        // Safety: the file stays open for the lifetime of the map and no
        // other process writes it.
        let map = unsafe { MmapMut::map_mut(&file).map_err(ChannelError::Map)? };
        Ok(Self {
            map,
            path: path.to_owned(),
        })
    }

    /// Overwrite the slot with this result. Oversized output is truncated to
    /// fit; the length prefixes always describe the bytes actually written.
    pub fn publish(&mut self, result: &CommandResult) -> Result<(), ChannelError> {
        let mut encoded = encode_record(result);
        if encoded.len() > CHANNEL_CAPACITY {
            encoded = encode_record(&truncate_to_fit(result));
        }
        self.map[..encoded.len()].copy_from_slice(&encoded);
        self.map
            .flush_range(0, encoded.len())
            .map_err(ChannelError::Flush)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the backing file. Called during orderly shutdown.
    pub fn remove_file(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Frontend-side handle. Re-maps on every read so a writer-side file
/// replacement (sandbox restart) is picked up.
pub struct ResultChannelReader {
    path: PathBuf,
}

impl ResultChannelReader {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_owned(),
        }
    }

    pub fn read(&self) -> Result<CommandResult, ChannelError> {
        let file = OpenOptions::new()
            .read(true)
            .open(&self.path)
            .map_err(|source| ChannelError::Open {
                path: self.path.clone(),
                source,
            })?;
        // Safety: read-only map of a file the single writer only mutates
        // before sending the ack that gates this read.
        let map = unsafe { Mmap::map(&file).map_err(ChannelError::Map)? };
        Ok(decode_record(&map)?)
    }
}

/// Trim stdout first, then stderr, so the encoded record fits the capacity.
fn truncate_to_fit(result: &CommandResult) -> CommandResult {
    let budget = CHANNEL_CAPACITY - FRAMING_SLACK;
    let stdout_len = result.stdout.len().min(budget);
    let stderr_len = result.stderr.len().min(budget - stdout_len);
    CommandResult {
        outcome: result.outcome,
        stdout: result.stdout[..stdout_len].to_vec(),
        stderr: result.stderr[..stderr_len].to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::CommandOutcome;
    use pretty_assertions::assert_eq;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.mmap");
        let mut writer = ResultChannelWriter::create(&path).unwrap();
        let reader = ResultChannelReader::new(&path);

        let result = CommandResult::exited(7, b"some\noutput".to_vec(), b"warn".to_vec());
        writer.publish(&result).unwrap();
        assert_eq!(reader.read().unwrap(), result);
    }

    #[test]
    fn slot_is_overwritten_by_next_publish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.mmap");
        let mut writer = ResultChannelWriter::create(&path).unwrap();
        let reader = ResultChannelReader::new(&path);

        writer
            .publish(&CommandResult::exited(0, vec![b'a'; 512], Vec::new()))
            .unwrap();
        let second = CommandResult::bare(CommandOutcome::Interactive);
        writer.publish(&second).unwrap();
        assert_eq!(reader.read().unwrap(), second);
    }

    #[test]
    fn oversized_output_is_truncated_not_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.mmap");
        let mut writer = ResultChannelWriter::create(&path).unwrap();
        let reader = ResultChannelReader::new(&path);

        let huge = CommandResult::exited(0, vec![b'x'; 2 * CHANNEL_CAPACITY], vec![b'y'; 64]);
        writer.publish(&huge).unwrap();
        let read = reader.read().unwrap();
        assert_eq!(read.outcome, CommandOutcome::Exited(0));
        assert!(read.stdout.len() <= CHANNEL_CAPACITY);
        assert!(read.stdout.iter().all(|&b| b == b'x'));
        assert!(read.stderr.is_empty());
    }

    #[test]
    fn reader_fails_cleanly_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let reader = ResultChannelReader::new(&dir.path().join("absent.mmap"));
        assert!(matches!(reader.read(), Err(ChannelError::Open { .. })));
    }
}
