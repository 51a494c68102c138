//! Assembles one newline-terminated command out of partial network reads.
//!
//! The protocol has no pipelining. A command ends at the first line feed of
//! the raw read that completes it, and any bytes after that line feed in the
//! same read are dropped. They are reported back as
//! [`Feed::Complete::discarded`] so the session can log them.

use crate::error::LogError;

/// Outcome of feeding one raw read into the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed {
    /// No line feed yet; more reads are required.
    Incomplete,
    /// A full command, line feed included.
    Complete { command: Vec<u8>, discarded: usize },
}

#[derive(Debug, Default)]
pub struct CommandAccumulator {
    pending: Vec<u8>,
    /// Set after a failed reservation until the failed line's line feed
    /// arrives.
    discarding: bool,
    #[cfg(test)]
    fail_next_reserve: bool,
}

impl CommandAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and hands back the command once a line feed arrives.
    ///
    /// On allocation failure the partial command is dropped, and so is the
    /// rest of its line in later reads. The read after that line feed starts
    /// a fresh command.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Feed, LogError> {
        let newline = chunk.iter().position(|&byte| byte == b'\n');

        if self.discarding {
            if newline.is_some() {
                self.discarding = false;
            }
            return Ok(Feed::Incomplete);
        }

        let (head, discarded) = match newline {
            Some(newline) => (&chunk[..=newline], chunk.len() - newline - 1),
            None => (chunk, 0),
        };

        if !self.reserve(head.len()) {
            let requested = self.pending.len() + head.len();
            self.clear();
            self.discarding = newline.is_none();
            return Err(LogError::Allocation { requested });
        }
        self.pending.extend_from_slice(head);

        if self.pending.last() != Some(&b'\n') {
            return Ok(Feed::Incomplete);
        }
        Ok(Feed::Complete {
            command: std::mem::take(&mut self.pending),
            discarded,
        })
    }

    /// True while the remainder of a failed command is being dropped.
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    /// Bytes received so far for a command that has not ended yet.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending = Vec::new();
        self.discarding = false;
    }

    fn reserve(&mut self, additional: usize) -> bool {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_reserve) {
            return false;
        }
        self.pending.try_reserve(additional).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_read_yields_command() {
        let mut accumulator = CommandAccumulator::new();
        assert_eq!(
            accumulator.feed(b"hello\n"),
            Ok(Feed::Complete {
                command: b"hello\n".to_vec(),
                discarded: 0
            })
        );
        assert_eq!(accumulator.pending_len(), 0);
    }

    #[test]
    fn partial_reads_accumulate_until_line_feed() {
        let mut accumulator = CommandAccumulator::new();
        assert_eq!(accumulator.feed(b"hel"), Ok(Feed::Incomplete));
        assert_eq!(accumulator.feed(b"lo wor"), Ok(Feed::Incomplete));
        assert_eq!(accumulator.pending_len(), 9);
        assert_eq!(
            accumulator.feed(b"ld\n"),
            Ok(Feed::Complete {
                command: b"hello world\n".to_vec(),
                discarded: 0
            })
        );
    }

    #[test]
    fn bytes_after_line_feed_are_discarded_and_counted() {
        let mut accumulator = CommandAccumulator::new();
        assert_eq!(
            accumulator.feed(b"first\nsecond\n"),
            Ok(Feed::Complete {
                command: b"first\n".to_vec(),
                discarded: 7
            })
        );
        assert_eq!(accumulator.pending_len(), 0);
    }

    #[test]
    fn bare_line_feed_is_a_command() {
        let mut accumulator = CommandAccumulator::new();
        assert_eq!(
            accumulator.feed(b"\n"),
            Ok(Feed::Complete {
                command: b"\n".to_vec(),
                discarded: 0
            })
        );
    }

    #[test]
    fn empty_read_keeps_waiting() {
        let mut accumulator = CommandAccumulator::new();
        accumulator.feed(b"abc").expect("feed");
        assert_eq!(accumulator.feed(b""), Ok(Feed::Incomplete));
        assert_eq!(accumulator.pending_len(), 3);
        accumulator.clear();
        assert_eq!(accumulator.pending_len(), 0);
    }

    #[test]
    fn rest_of_a_failed_command_is_not_taken_as_a_new_one() {
        let mut accumulator = CommandAccumulator::new();
        assert_eq!(accumulator.feed(b"AAAA"), Ok(Feed::Incomplete));
        accumulator.fail_next_reserve = true;
        assert_eq!(
            accumulator.feed(b"AAAA"),
            Err(LogError::Allocation { requested: 8 })
        );
        assert!(accumulator.is_discarding());
        assert_eq!(accumulator.pending_len(), 0);

        assert_eq!(accumulator.feed(b"mid"), Ok(Feed::Incomplete));
        assert_eq!(accumulator.feed(b"tail\nnext"), Ok(Feed::Incomplete));
        assert!(!accumulator.is_discarding());
        assert_eq!(accumulator.pending_len(), 0);

        assert_eq!(
            accumulator.feed(b"fresh\n"),
            Ok(Feed::Complete {
                command: b"fresh\n".to_vec(),
                discarded: 0
            })
        );
    }

    #[test]
    fn failed_command_ending_in_the_same_read_discards_nothing_more() {
        let mut accumulator = CommandAccumulator::new();
        accumulator.fail_next_reserve = true;
        assert_eq!(
            accumulator.feed(b"big\n"),
            Err(LogError::Allocation { requested: 4 })
        );
        assert!(!accumulator.is_discarding());
        assert_eq!(
            accumulator.feed(b"next\n"),
            Ok(Feed::Complete {
                command: b"next\n".to_vec(),
                discarded: 0
            })
        );
    }
}
