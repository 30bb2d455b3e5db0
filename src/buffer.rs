//! Receive buffer for partially delivered AGI frames

use crate::{
    constants::{BUF_CHUNK, MAX_BUFFER_SIZE},
    error::{AgiError, AgiResult},
};

/// Byte buffer with a read cursor.
///
/// Bytes are appended as they arrive from the socket and consumed from the
/// front once a complete frame (line or metadata block) is present.
#[derive(Debug)]
pub struct AgiBuffer {
    data: Vec<u8>,
    position: usize,
}

impl AgiBuffer {
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(BUF_CHUNK),
            position: 0,
        }
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data
            .extend_from_slice(bytes);
    }

    /// Unconsumed bytes.
    pub fn len(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.position..]
    }

    /// Reject peers that stream data without ever sending a terminator.
    pub fn check_size_limits(&self) -> AgiResult<()> {
        if self.len() > MAX_BUFFER_SIZE {
            return Err(AgiError::protocol_error(format!(
                "receive buffer holds {} bytes without a complete frame (limit {})",
                self.len(),
                MAX_BUFFER_SIZE
            )));
        }
        Ok(())
    }

    /// Remove and return everything before `pattern`, consuming the pattern too.
    pub fn extract_until_pattern(&mut self, pattern: &[u8]) -> Option<Vec<u8>> {
        let pos = self
            .as_slice()
            .windows(pattern.len())
            .position(|window| window == pattern)?;
        let start = self.position;
        let frame = self.data[start..start + pos].to_vec();
        self.position = start + pos + pattern.len();
        Some(frame)
    }

    /// Drop consumed bytes so the buffer does not grow across a long call.
    pub fn compact(&mut self) {
        if self.position == 0 {
            return;
        }
        self.data
            .drain(..self.position);
        self.position = 0;
    }
}

impl Default for AgiBuffer {
    fn default() -> Self {
        Self::new()
    }
}
