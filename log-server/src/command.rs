//! Classification of an accumulated command line.
//!
//! Every line is a write except one that starts with [`SEEK_TAG`], which
//! repositions the session's read cursor instead of appending to the log.

use crate::error::ProtocolError;

/// Prefix that turns a line into a seek command.
pub const SEEK_TAG: &[u8] = b"AESDCHAR_IOCSEEKTO:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Append these bytes, line feed included, as one log entry.
    Write(&'a [u8]),
    /// Move the cursor to byte `offset` of the `index`-th oldest entry.
    Seek { index: usize, offset: usize },
}

impl<'a> Command<'a> {
    /// Parses one complete line as produced by the accumulator.
    ///
    /// # Syntax
    /// `AESDCHAR_IOCSEEKTO:<index>,<offset>\n`, both fields plain decimal
    /// digits. A carriage return before the line feed is tolerated. Lines
    /// with the tag but other arguments are rejected rather than written.
    pub fn parse(line: &'a [u8]) -> Result<Self, ProtocolError> {
        let Some(arguments) = line.strip_prefix(SEEK_TAG) else {
            return Ok(Command::Write(line));
        };

        let arguments = arguments.strip_suffix(b"\n").unwrap_or(arguments);
        let arguments = arguments.strip_suffix(b"\r").unwrap_or(arguments);
        let arguments = std::str::from_utf8(arguments).map_err(|_| ProtocolError::NotUtf8)?;

        let Some((index, offset)) = arguments.split_once(',') else {
            return Err(ProtocolError::MissingSeparator(arguments.to_string()));
        };

        Ok(Command::Seek {
            index: parse_field("entry index", index)?,
            offset: parse_field("byte offset", offset)?,
        })
    }
}

fn parse_field(field: &'static str, value: &str) -> Result<usize, ProtocolError> {
    // `usize::from_str` would also accept a leading `+`.
    if value.is_empty() || !value.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(ProtocolError::InvalidNumber {
            field,
            value: value.to_string(),
        });
    }
    value.parse().map_err(|_| ProtocolError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
