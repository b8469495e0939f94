//! Raw RGB24 frames from the decoder subprocess
//!
//! The decoder writes frames back to back with no markers:
//! ```text
//! [ W*H*3 bytes: frame 0 ][ W*H*3 bytes: frame 1 ] ...
//! ```
//!
//! Boundaries are purely positional, so a reader must accumulate partial
//! reads until exactly one frame's worth of bytes is available.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use crate::video::frame_len;

/// Errors that can occur while handling frames
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Invalid frame dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

/// A fixed-dimension RGB24 pixel buffer, row-major, no padding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
    /// Number of frames written into this buffer so far
    sequence: u64,
}

impl VideoFrame {
    /// Allocate a black frame of the given size
    pub fn new(width: u32, height: u32) -> Result<Self, FrameError> {
        let len = frame_len(width, height).ok_or(FrameError::InvalidDimensions { width, height })?;
        Ok(Self {
            width,
            height,
            data: vec![0u8; len],
            sequence: 0,
        })
    }

    /// Zero-sized stand-in used when no decoder can produce frames
    pub fn placeholder() -> Self {
        Self {
            width: 0,
            height: 0,
            data: Vec::new(),
            sequence: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// How many frames have overwritten this buffer (0 = never published)
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// True for a placeholder or a frame that has never been written
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() || self.sequence == 0
    }

    /// Overwrite the pixels in place with a freshly decoded frame
    pub fn overwrite(&mut self, pixels: &[u8]) -> Result<(), FrameError> {
        if pixels.len() != self.data.len() {
            return Err(FrameError::SizeMismatch {
                expected: self.data.len(),
                actual: pixels.len(),
            });
        }
        self.data.copy_from_slice(pixels);
        self.sequence += 1;
        Ok(())
    }

    /// RGB value at (x, y), if in bounds
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.data[offset], self.data[offset + 1], self.data[offset + 2]])
    }
}

/// Streaming assembler that cuts a byte stream into fixed-size frames
#[derive(Debug)]
pub struct FrameAssembler {
    frame_len: usize,
    /// Partial frame data being accumulated
    buffer: BytesMut,
}

impl FrameAssembler {
    /// Create an assembler for frames of the given dimensions
    pub fn new(width: u32, height: u32) -> Result<Self, FrameError> {
        let frame_len =
            frame_len(width, height).ok_or(FrameError::InvalidDimensions { width, height })?;
        Ok(Self {
            frame_len,
            buffer: BytesMut::with_capacity(frame_len),
        })
    }

    /// Size in bytes of one complete frame
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Bytes still needed to complete the current frame
    pub fn remaining(&self) -> usize {
        self.frame_len - self.buffer.len()
    }

    /// Bytes accumulated toward the current frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Append bytes, returning how many were taken (never past one frame)
    pub fn extend(&mut self, data: &[u8]) -> usize {
        let take = data.len().min(self.remaining());
        self.buffer.extend_from_slice(&data[..take]);
        take
    }

    /// Take the completed frame, if one is ready
    pub fn next_frame(&mut self) -> Option<Bytes> {
        if self.buffer.len() < self.frame_len {
            return None;
        }
        Some(self.buffer.split_to(self.frame_len).freeze())
    }

    /// Abandon any partially accumulated frame
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
