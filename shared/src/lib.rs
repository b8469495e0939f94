//! QR Drone Bridge Shared Types
//!
//! This crate provides the I/O-free pieces of the bridge: the symbol to
//! wire-command encoding, the raw frame model with its streaming
//! assembler, and the response listener lifecycle.

pub mod command;
pub mod frame;
pub mod state_machine;

pub use command::{encode, Command, CommandKind, UnknownCommand};
pub use frame::{FrameAssembler, FrameError, VideoFrame};
pub use state_machine::{ListenerEvent, ListenerLifecycle, ListenerState, TransitionResult};

/// Wire-level constants for the drone's text command protocol
pub mod wire {
    /// Payload that switches the drone into SDK command mode
    pub const PROBE_COMMAND: &str = "command";

    /// Default drone address on its own access point
    pub const DEFAULT_DRONE_IP: [u8; 4] = [192, 168, 10, 1];

    /// Drone command port
    pub const DEFAULT_COMMAND_PORT: u16 = 8889;

    /// Default local port for drone responses and state datagrams
    pub const DEFAULT_LISTEN_PORT: u16 = 8890;

    /// Default receive-side descriptor for the video elementary stream
    pub const DEFAULT_VIDEO_URL: &str = "udp://0.0.0.0:11111";

    /// Largest datagram the listener will accept
    pub const MAX_DATAGRAM_SIZE: usize = 65_535;
}

/// Video stream defaults
pub mod video {
    /// Default decoded frame width in pixels
    pub const FRAME_WIDTH: u32 = 960;

    /// Default decoded frame height in pixels
    pub const FRAME_HEIGHT: u32 = 720;

    /// RGB24: one byte per channel
    pub const BYTES_PER_PIXEL: usize = 3;

    /// Largest frame the bridge will allocate (8K UHD)
    pub const MAX_FRAME_LEN: usize = 7680 * 4320 * BYTES_PER_PIXEL;

    /// Size in bytes of one tightly packed RGB24 frame
    ///
    /// `None` for zero-sized frames or frames larger than `MAX_FRAME_LEN`.
    pub fn frame_len(width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(BYTES_PER_PIXEL)
            .filter(|&len| len > 0 && len <= MAX_FRAME_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_frame_len() {
        assert_eq!(
            video::frame_len(video::FRAME_WIDTH, video::FRAME_HEIGHT),
            Some(960 * 720 * 3)
        );
    }

    #[test]
    fn test_frame_len_bounds() {
        assert_eq!(video::frame_len(0, 720), None);
        assert_eq!(video::frame_len(7680, 4320), Some(video::MAX_FRAME_LEN));
        assert_eq!(video::frame_len(7681, 4320), None);
        assert_eq!(video::frame_len(u32::MAX, u32::MAX), None);
    }

    #[test]
    fn test_probe_is_bare_token() {
        assert!(!wire::PROBE_COMMAND.contains(' '));
        assert_eq!(wire::PROBE_COMMAND, "command");
    }
}
