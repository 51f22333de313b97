//! Outbound frame construction.
use super::checksum::{append_crc16, crc8};
use super::{frame_len, CommandId, MAX_PAYLOAD_LEN, START_BYTE};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("payload of {0} bytes does not fit the 16-bit length field")]
    PayloadTooLarge(usize),
}

/// Builds frames, optionally numbering them.
///
/// [`FrameBuilder::build`] is the stateless form. An instance remembers the
/// sequence number to stamp on the next frame; the peer in the field expects
/// a constant `0x01`, so incrementing is opt-in.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    sequence: u8,
    increment: bool,
}

impl FrameBuilder {
    pub fn new(sequence: u8, increment: bool) -> Self {
        Self { sequence, increment }
    }

    /// Construct one frame.
    ///
    /// The command is given as `(high, low)` (or any [`CommandId`]) and is
    /// written low byte first.
    pub fn build(
        payload: &[u8],
        sequence: u8,
        command_id: impl Into<CommandId>,
    ) -> Result<Vec<u8>, BuildError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(BuildError::PayloadTooLarge(payload.len()));
        }
        let command_id = command_id.into();
        let mut frame = Vec::with_capacity(frame_len(payload.len()));
        frame.push(START_BYTE);
        frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        frame.push(sequence);
        frame.push(crc8(&frame, 4));
        frame.extend_from_slice(&command_id.wire_bytes());
        frame.extend_from_slice(payload);
        append_crc16(&mut frame);
        Ok(frame)
    }

    /// Build with this builder's sequence number, then advance it if enabled.
    pub fn next_frame(
        &mut self,
        command_id: impl Into<CommandId>,
        payload: &[u8],
    ) -> Result<Vec<u8>, BuildError> {
        let frame = Self::build(payload, self.sequence, command_id)?;
        if self.increment {
            self.sequence = self.sequence.wrapping_add(1);
        }
        Ok(frame)
    }

    /// Sequence number the next frame will carry.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new(0x01, false)
    }
}
