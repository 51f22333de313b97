//! Per-session link counters.
//!
//! Owned by the session that updates them; there is no global registry.
use serde::Serialize;
use std::time::Instant;

use crate::protocol::ParseOutcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub bytes_discarded: u64,
    pub frames_ok: u64,
    pub frames_sent: u64,
    pub no_start_byte: u64,
    pub header_checksum_failures: u64,
    pub body_checksum_failures: u64,
    pub unknown_commands: u64,
    pub oversize_headers: u64,
    pub read_errors: u64,
}

impl LinkStats {
    pub fn record_rejection(&mut self, outcome: &ParseOutcome) {
        match outcome {
            ParseOutcome::NoStartByte => self.no_start_byte += 1,
            ParseOutcome::Incomplete => {}
            ParseOutcome::HeaderChecksumMismatch { .. } => self.header_checksum_failures += 1,
            ParseOutcome::BodyChecksumMismatch { .. } => self.body_checksum_failures += 1,
            ParseOutcome::UnknownCommand { .. } => self.unknown_commands += 1,
            ParseOutcome::PayloadTooLarge { .. } => self.oversize_headers += 1,
        }
    }

    pub fn checksum_failures(&self) -> u64 {
        self.header_checksum_failures + self.body_checksum_failures
    }

    /// Fraction of received bytes that ended up in a delivered frame or an
    /// unknown-command frame. `None` before anything arrived.
    pub fn link_quality(&self) -> Option<f64> {
        if self.bytes_received == 0 {
            return None;
        }
        let kept = self.bytes_received.saturating_sub(self.bytes_discarded);
        Some(kept as f64 / self.bytes_received as f64)
    }

    pub fn summary(&self, since: Instant) -> String {
        let quality = self
            .link_quality()
            .map(|q| format!("{:.1}%", q * 100.0))
            .unwrap_or_else(|| "n/a".to_string());
        format!(
            "up {}s rx={}B tx={}B frames ok={} sent={} crc_fail={} unknown={} noise={}B quality={}",
            since.elapsed().as_secs(),
            self.bytes_received,
            self.bytes_sent,
            self.frames_ok,
            self.frames_sent,
            self.checksum_failures(),
            self.unknown_commands,
            self.bytes_discarded,
            quality
        )
    }
}
