//! Length-prefixed result record codec.
//!
//! Layout, in order, all prefixes ASCII decimal terminated by `\n`:
//!
//! ```text
//! EXIT_CODE:<int>\n
//! STDOUT_LEN:<uint>\n
//! STDOUT:<STDOUT_LEN bytes>\n
//! STDERR_LEN:<uint>\n
//! STDERR:<STDERR_LEN bytes>\n
//! ```
//!
//! Length prefixes are exact byte counts of the following payload, which may
//! itself contain newlines or NULs. Decoding never scans payload bytes for
//! delimiters.

use thiserror::Error;

use crate::outcome::{CommandOutcome, CommandResult};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record is missing the `{0}` field")]
    MissingField(&'static str),

    #[error("could not parse `{field}` value: {value:?}")]
    BadValue { field: &'static str, value: String },

    #[error("record truncated: `{field}` declares {declared} bytes but only {available} remain")]
    Truncated {
        field: &'static str,
        declared: usize,
        available: usize,
    },

    #[error("payload for `{0}` is not followed by a newline")]
    MissingTerminator(&'static str),
}

/// Serialize a result into the record layout.
pub fn encode_record(result: &CommandResult) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64 + result.stdout.len() + result.stderr.len());
    buf.extend_from_slice(format!("EXIT_CODE:{}\n", result.outcome.wire_code()).as_bytes());
    buf.extend_from_slice(format!("STDOUT_LEN:{}\n", result.stdout.len()).as_bytes());
    buf.extend_from_slice(b"STDOUT:");
    buf.extend_from_slice(&result.stdout);
    buf.push(b'\n');
    buf.extend_from_slice(format!("STDERR_LEN:{}\n", result.stderr.len()).as_bytes());
    buf.extend_from_slice(b"STDERR:");
    buf.extend_from_slice(&result.stderr);
    buf.push(b'\n');
    buf
}

/// Parse a record produced by [`encode_record`]. Trailing bytes after the
/// final newline are ignored, so decoding straight out of a fixed-capacity
/// region is fine.
pub fn decode_record(bytes: &[u8]) -> Result<CommandResult, RecordError> {
    let mut cursor = Cursor::new(bytes);

    let exit_line = cursor.text_line("EXIT_CODE")?;
    let exit_code: i32 = exit_line.parse().map_err(|_| RecordError::BadValue {
        field: "EXIT_CODE",
        value: exit_line.to_owned(),
    })?;

    let stdout = cursor.sized_payload("STDOUT_LEN", "STDOUT")?;
    let stderr = cursor.sized_payload("STDERR_LEN", "STDERR")?;

    Ok(CommandResult {
        outcome: CommandOutcome::from_wire_code(exit_code),
        stdout,
        stderr,
    })
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Consume `<field>:<text>\n` and return the text portion.
    fn text_line(&mut self, field: &'static str) -> Result<&'a str, RecordError> {
        let rest = &self.bytes[self.pos..];
        let prefix = format!("{field}:");
        if !rest.starts_with(prefix.as_bytes()) {
            return Err(RecordError::MissingField(field));
        }
        let after = &rest[prefix.len()..];
        let nl = after
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(RecordError::MissingTerminator(field))?;
        let value = std::str::from_utf8(&after[..nl]).map_err(|_| RecordError::BadValue {
            field,
            value: String::from_utf8_lossy(&after[..nl]).into_owned(),
        })?;
        self.pos += prefix.len() + nl + 1;
        Ok(value)
    }

    /// Consume a `<len_field>:<n>\n<data_field>:<n bytes>\n` pair.
    fn sized_payload(
        &mut self,
        len_field: &'static str,
        data_field: &'static str,
    ) -> Result<Vec<u8>, RecordError> {
        let len_text = self.text_line(len_field)?;
        let len: usize = len_text.parse().map_err(|_| RecordError::BadValue {
            field: len_field,
            value: len_text.to_owned(),
        })?;

        let rest = &self.bytes[self.pos..];
        let prefix = format!("{data_field}:");
        if !rest.starts_with(prefix.as_bytes()) {
            return Err(RecordError::MissingField(data_field));
        }
        let after = &rest[prefix.len()..];
        if after.len() < len + 1 {
            return Err(RecordError::Truncated {
                field: data_field,
                declared: len,
                available: after.len().saturating_sub(1),
            });
        }
        if after[len] != b'\n' {
            return Err(RecordError::MissingTerminator(data_field));
        }
        let payload = after[..len].to_vec();
        self.pos += prefix.len() + len + 1;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trips_plain_output() {
        let result = CommandResult::exited(0, b"hello\n".to_vec(), Vec::new());
        let decoded = decode_record(&encode_record(&result)).unwrap();
        assert_eq!(decoded, result);
    }

    #[test]
    fn round_trips_binary_payloads() {
        let stdout = vec![0u8, b'\n', 0xFF, b'S', b'T', b'D', b'O', b'U', b'T', b':', 0x1B];
        let stderr = b"STDERR_LEN:99\nnot a real field\n".to_vec();
        let result = CommandResult::exited(42, stdout.clone(), stderr.clone());
        let decoded = decode_record(&encode_record(&result)).unwrap();
        assert_eq!(decoded.stdout, stdout);
        assert_eq!(decoded.stderr, stderr);
        assert_eq!(decoded.outcome, CommandOutcome::Exited(42));
    }

    #[test]
    fn round_trips_sentinels() {
        for outcome in [
            CommandOutcome::Interactive,
            CommandOutcome::InvalidLong,
            CommandOutcome::InvalidShort,
        ] {
            let decoded = decode_record(&encode_record(&CommandResult::bare(outcome))).unwrap();
            assert_eq!(decoded.outcome, outcome);
        }
    }

    #[test]
    fn ignores_trailing_garbage() {
        let mut encoded = encode_record(&CommandResult::exited(0, b"out".to_vec(), Vec::new()));
        encoded.extend_from_slice(&[0u8; 128]);
        let decoded = decode_record(&encoded).unwrap();
        assert_eq!(decoded.stdout, b"out");
    }

    #[test]
    fn rejects_truncated_payload() {
        let result = CommandResult::exited(0, b"0123456789".to_vec(), Vec::new());
        let encoded = encode_record(&result);
        let err = decode_record(&encoded[..encoded.len() - 20]).unwrap_err();
        assert!(matches!(err, RecordError::Truncated { .. }));
    }

    #[test]
    fn rejects_missing_exit_code() {
        let err = decode_record(b"STDOUT_LEN:0\n").unwrap_err();
        assert_eq!(err, RecordError::MissingField("EXIT_CODE"));
    }

    #[test]
    fn rejects_non_numeric_length() {
        let err = decode_record(b"EXIT_CODE:0\nSTDOUT_LEN:abc\n").unwrap_err();
        assert!(matches!(err, RecordError::BadValue { field: "STDOUT_LEN", .. }));
    }
}
