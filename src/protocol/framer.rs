//! Incremental receive buffer for the serial link.
//!
//! Serial reads arrive in arbitrary chunks: a read may end halfway through
//! a frame, start with line noise, or carry several frames at once. The
//! buffer accumulates chunks and hands out frames as they complete, keeping
//! any partial frame for the next read. Malformed candidates are dropped one
//! start byte at a time so a real frame hidden behind them is still found.
use bytes::{Buf, BytesMut};
use log::trace;

use super::parser::FrameParser;
use super::{ParseOutcome, ParsedFrame};

pub struct ReceiveBuffer {
    buf: BytesMut,
    parser: FrameParser,
    discarded: u64,
}

impl ReceiveBuffer {
    pub fn new(parser: FrameParser) -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
            parser,
            discarded: 0,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Attempt to extract the next frame.
    ///
    /// Returns `None` when the buffer is empty or only holds the beginning of
    /// a frame. Rejections are returned as `Some(Err(..))` after the offending
    /// bytes have been dropped, so calling again makes progress.
    pub fn next_frame(&mut self) -> Option<Result<ParsedFrame, ParseOutcome>> {
        if self.buf.is_empty() {
            return None;
        }
        let scan = self.parser.scan(&self.buf);
        if scan.discarded > 0 {
            trace!("discarding {} byte(s): {:?}", scan.discarded, scan.outcome);
            self.discarded += scan.discarded as u64;
        }
        self.buf.advance(scan.consumed);
        match scan.outcome {
            Err(ParseOutcome::Incomplete) => None,
            other => Some(other),
        }
    }

    /// Extract everything currently available.
    pub fn drain(&mut self) -> Vec<Result<ParsedFrame, ParseOutcome>> {
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    /// Bytes currently held (a partial frame, usually).
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Total bytes dropped as noise or corrupt frames.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn parser(&self) -> &FrameParser {
        &self.parser
    }

    pub fn clear(&mut self) {
        self.discarded += self.buf.len() as u64;
        self.buf.clear();
    }
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self::new(FrameParser::new())
    }
}
