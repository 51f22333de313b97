//! Locate and validate a single frame inside an arbitrary byte buffer.
//!
//! The parser holds no partial-frame state. Callers that need frames to
//! survive short reads keep their own buffer and use [`FrameParser::scan`],
//! which also says how many leading bytes are safe to drop
//! (see [`super::ReceiveBuffer`]).
use std::collections::BTreeSet;

use super::checksum::{crc16, crc8};
use super::{
    frame_len, CommandId, ParseOutcome, ParsedFrame, MAX_PAYLOAD_LEN, PREAMBLE_LEN, START_BYTE,
};

/// Result of one scan over a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
    /// Number of leading bytes the caller may drop before the next scan.
    pub consumed: usize,
    /// How many of the consumed bytes were noise or a rejected candidate
    /// rather than part of the returned frame.
    pub discarded: usize,
    pub outcome: Result<ParsedFrame, ParseOutcome>,
}

impl Scan {
    fn new(consumed: usize, discarded: usize, outcome: Result<ParsedFrame, ParseOutcome>) -> Self {
        Self {
            consumed,
            discarded,
            outcome,
        }
    }

    fn rejected(consumed: usize, outcome: ParseOutcome) -> Self {
        Self::new(consumed, consumed, Err(outcome))
    }
}

#[derive(Debug, Clone)]
pub struct FrameParser {
    // None accepts every command id.
    known: Option<BTreeSet<CommandId>>,
    max_payload: usize,
}

impl FrameParser {
    /// Parser that accepts the robot position and vulnerability commands.
    pub fn new() -> Self {
        Self::with_commands([CommandId::ROBOT_POSITIONS, CommandId::VULNERABILITY_FLAGS])
    }

    pub fn with_commands<I, C>(commands: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<CommandId>,
    {
        Self {
            known: Some(commands.into_iter().map(Into::into).collect()),
            max_payload: MAX_PAYLOAD_LEN,
        }
    }

    /// Parser that treats every command id as known.
    pub fn permissive() -> Self {
        Self {
            known: None,
            max_payload: MAX_PAYLOAD_LEN,
        }
    }

    /// Reject headers declaring more than `limit` payload bytes.
    pub fn max_payload(mut self, limit: usize) -> Self {
        self.max_payload = limit.min(MAX_PAYLOAD_LEN);
        self
    }

    pub fn add_command(&mut self, command: impl Into<CommandId>) {
        if let Some(known) = self.known.as_mut() {
            known.insert(command.into());
        }
    }

    pub fn is_known(&self, command: CommandId) -> bool {
        self.known.as_ref().map_or(true, |k| k.contains(&command))
    }

    /// Parse the first frame in `buffer`.
    pub fn feed(&self, buffer: &[u8]) -> Result<ParsedFrame, ParseOutcome> {
        self.scan(buffer).outcome
    }

    /// Parse the first frame in `buffer` and report how much of the buffer
    /// has been dealt with.
    pub fn scan(&self, buffer: &[u8]) -> Scan {
        let Some(start) = buffer.iter().position(|&b| b == START_BYTE) else {
            return Scan::rejected(buffer.len(), ParseOutcome::NoStartByte);
        };
        let frame = &buffer[start..];
        // Everything up to and including a rejected start byte is garbage.
        let skip = start + 1;

        if frame.len() < PREAMBLE_LEN {
            return Scan::rejected(start, ParseOutcome::Incomplete);
        }

        let expected = crc8(frame, 4);
        if frame[4] != expected {
            return Scan::rejected(
                skip,
                ParseOutcome::HeaderChecksumMismatch {
                    expected,
                    actual: frame[4],
                },
            );
        }

        // data_length is trustworthy from here on, but still bounded by the buffer.
        let data_len = u16::from_le_bytes([frame[1], frame[2]]) as usize;
        if data_len > self.max_payload {
            return Scan::rejected(
                skip,
                ParseOutcome::PayloadTooLarge {
                    declared: data_len,
                    limit: self.max_payload,
                },
            );
        }
        let total = frame_len(data_len);
        if frame.len() < total {
            return Scan::rejected(start, ParseOutcome::Incomplete);
        }

        let body_end = PREAMBLE_LEN + data_len;
        let command_id = CommandId::from_wire([frame[5], frame[6]]);
        let sequence = frame[3];
        let payload = frame[PREAMBLE_LEN..body_end].to_vec();
        let expected = crc16(frame, body_end);
        let actual = u16::from_le_bytes([frame[body_end], frame[body_end + 1]]);

        if !self.is_known(command_id) {
            // Only skip the whole frame when its trailer vouches for the length.
            let (consumed, discarded) = if expected == actual {
                (start + total, start)
            } else {
                (skip, skip)
            };
            return Scan::new(
                consumed,
                discarded,
                Err(ParseOutcome::UnknownCommand {
                    command_id,
                    sequence,
                    payload,
                }),
            );
        }

        if expected != actual {
            return Scan::rejected(skip, ParseOutcome::BodyChecksumMismatch { expected, actual });
        }

        Scan::new(
            start + total,
            start,
            Ok(ParsedFrame {
                command_id,
                sequence,
                payload,
            }),
        )
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}
