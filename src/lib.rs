//! # Radarlink - Serial Link Console for the Radar Station
//!
//! Radarlink talks to the referee-side radar controller over a USB/UART serial
//! link. It frames and unframes the controller's checksummed binary packets,
//! decodes robot position telemetry and sends vulnerability flags back.
//!
//! ## Features
//!
//! - **Framing**: `0xA5` start byte, CRC-8 protected header, little-endian
//!   command id, CRC-16 trailer. Builder and parser agree byte for byte.
//! - **Resynchronisation**: noise, corrupt frames and unknown commands are
//!   skipped; partial frames are carried across reads.
//! - **Telemetry**: robot coordinates clamped to the field, vulnerability
//!   flag bitmasks.
//! - **Console**: monitor, send, encode and decode from the command line.
//!
//! ## Quick Start
//!
//! ```rust
//! use radarlink::protocol::{CommandId, FrameBuilder, FrameParser};
//!
//! let frame = FrameBuilder::build(&[0x05], 0x01, (0x02, 0x0C)).unwrap();
//! assert_eq!(frame, [0xA5, 0x01, 0x00, 0x01, 0x36, 0x0C, 0x02, 0x05, 0xB8, 0xC4]);
//!
//! let parsed = FrameParser::new().feed(&frame).unwrap();
//! assert_eq!(parsed.command_id, CommandId::VULNERABILITY_FLAGS);
//! assert_eq!(parsed.payload, [0x05]);
//! ```
//!
//! ## Module Organization
//!
//! - [`protocol`] - checksums, frame builder, parser and receive buffer
//! - [`telemetry`] - typed views of known payloads
//! - [`session`] - serial session, poll loop and control channel
//! - [`config`] - configuration management and validation
//! - [`metrics`] - per-session link counters
//! - [`logutil`] - hex helpers for logs and the CLI

pub mod config;
pub mod logutil;
pub mod metrics;
pub mod protocol;
pub mod session;
pub mod telemetry;
