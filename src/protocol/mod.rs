//! # Referee Link Framing
//!
//! Binary framing shared by both directions of the serial link. Every frame
//! has the layout below (multi-byte fields little-endian):
//!
//! ```text
//! +------+-------------+-----+------+------------+-----------------+-------+
//! | 0xA5 | data_length | seq | crc8 | command_id | payload ...     | crc16 |
//! |  1   |      2      |  1  |  1   |     2      | data_length     |   2   |
//! +------+-------------+-----+------+------------+-----------------+-------+
//! ```
//!
//! - [`checksum`] - CRC-8 (header) and CRC-16 (whole frame) tables
//! - [`builder`] - outbound frame construction
//! - [`parser`] - locating and validating one frame in a byte buffer
//! - [`framer`] - owned receive buffer that keeps partial frames between reads
//!
//! ```rust
//! use radarlink::protocol::{CommandId, FrameBuilder, FrameParser};
//!
//! let frame = FrameBuilder::build(&[0x05], 0x01, (0x02, 0x0C)).unwrap();
//! let parsed = FrameParser::new().feed(&frame).unwrap();
//! assert_eq!(parsed.command_id, CommandId::VULNERABILITY_FLAGS);
//! assert_eq!(parsed.payload, vec![0x05]);
//! ```

pub mod builder;
pub mod checksum;
pub mod framer;
pub mod parser;

pub use builder::{BuildError, FrameBuilder};
pub use framer::ReceiveBuffer;
pub use parser::{FrameParser, Scan};

use serde::Serialize;
use std::fmt;

/// First byte of every frame.
pub const START_BYTE: u8 = 0xA5;
/// Start byte, length, sequence and CRC-8.
pub const HEADER_LEN: usize = 5;
/// Header plus command id; the minimum needed before anything is validated.
pub const PREAMBLE_LEN: usize = HEADER_LEN + 2;
/// Trailing CRC-16.
pub const TRAILER_LEN: usize = 2;
/// Largest payload `data_length` can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Total on-wire size of a frame carrying `payload_len` bytes.
pub const fn frame_len(payload_len: usize) -> usize {
    PREAMBLE_LEN + payload_len + TRAILER_LEN
}

/// Two-byte command identifier.
///
/// Commands are written as a `(high, low)` pair in the peer's documentation
/// (`0x020C` is `(0x02, 0x0C)`), and travel low byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CommandId(pub u16);

impl CommandId {
    /// Robot position telemetry sent by the peer (six x/y pairs).
    pub const ROBOT_POSITIONS: CommandId = CommandId(0x0305);
    /// One-byte vulnerability bitmask sent by the console.
    pub const VULNERABILITY_FLAGS: CommandId = CommandId(0x020C);

    pub const fn from_pair(high: u8, low: u8) -> Self {
        CommandId(((high as u16) << 8) | low as u16)
    }

    pub const fn as_pair(self) -> (u8, u8) {
        ((self.0 >> 8) as u8, self.0 as u8)
    }

    /// Bytes as they appear at offsets 5..7 of a frame.
    pub const fn wire_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    pub const fn from_wire(bytes: [u8; 2]) -> Self {
        CommandId(u16::from_le_bytes(bytes))
    }
}

impl From<(u8, u8)> for CommandId {
    fn from((high, low): (u8, u8)) -> Self {
        CommandId::from_pair(high, low)
    }
}

impl From<u16> for CommandId {
    fn from(v: u16) -> Self {
        CommandId(v)
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// A frame that passed both checksums and carries a known command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedFrame {
    pub command_id: CommandId,
    pub sequence: u8,
    pub payload: Vec<u8>,
}

/// Why a buffer did not yield a usable frame.
///
/// None of these are fatal: the caller discards or keeps bytes (see
/// [`Scan::consumed`]) and tries again on the next read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseOutcome {
    #[error("no start byte in buffer")]
    NoStartByte,

    #[error("incomplete frame")]
    Incomplete,

    #[error("header checksum mismatch (expected 0x{expected:02X}, got 0x{actual:02X})")]
    HeaderChecksumMismatch { expected: u8, actual: u8 },

    #[error("frame checksum mismatch (expected 0x{expected:04X}, got 0x{actual:04X})")]
    BodyChecksumMismatch { expected: u16, actual: u16 },

    #[error("unknown command {command_id} ({} byte payload)", payload.len())]
    UnknownCommand {
        command_id: CommandId,
        sequence: u8,
        payload: Vec<u8>,
    },

    #[error("declared payload of {declared} bytes exceeds limit of {limit}")]
    PayloadTooLarge { declared: usize, limit: usize },
}

impl ParseOutcome {
    /// Short stable name, used for stats and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            ParseOutcome::NoStartByte => "no_start_byte",
            ParseOutcome::Incomplete => "incomplete",
            ParseOutcome::HeaderChecksumMismatch { .. } => "header_checksum_mismatch",
            ParseOutcome::BodyChecksumMismatch { .. } => "body_checksum_mismatch",
            ParseOutcome::UnknownCommand { .. } => "unknown_command",
            ParseOutcome::PayloadTooLarge { .. } => "payload_too_large",
        }
    }
}
