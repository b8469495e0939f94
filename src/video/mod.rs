//! Drone video stream decoding
//!
//! Provides the latest decoded frame of the drone's live video to the
//! consumer. Decoding is a capability selected at runtime:
//! - `ffmpeg`: external process reading the UDP elementary stream and
//!   writing raw RGB24 frames on stdout
//! - `disabled`: never produces frames; the current frame stays a placeholder

mod disabled;
mod ffmpeg;
mod reader;

pub use disabled::DisabledDecoder;
pub use ffmpeg::FfmpegDecoder;
pub use reader::{read_frames, FrameMailbox, ReadExit};

use crate::config::{DecoderKind, VideoConfig};
use crate::dispatch::DispatchHandle;
use async_trait::async_trait;
use bytes::Bytes;
use qrdrone_shared::FrameError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised when starting a decoder
#[derive(Error, Debug)]
pub enum DecoderError {
    #[error("Decoder executable not found: {0:?}")]
    MissingExecutable(PathBuf),

    #[error("Failed to spawn decoder {path:?}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid frame size: {0}")]
    InvalidFrame(#[from] FrameError),
}

/// Health of the decoded stream as seen by the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamStatus {
    /// Not started, stopped, or disabled
    #[default]
    Stopped,
    /// Decoder process running
    Running,
    /// Decoder exited unexpectedly and is being restarted
    Crashed { restarts: u32 },
    /// Restart budget exhausted; no more frames until started again
    Failed,
}

/// Consumer-side recipient of decoded frames
pub trait FrameSink: 'static {
    /// Overwrite the current frame with a newly decoded one
    fn publish_frame(&mut self, pixels: Bytes);

    /// Record a change in stream health
    fn stream_status(&mut self, status: StreamStatus);
}

/// A source of decoded frames
#[async_trait]
pub trait VideoStreamDecoder: Send {
    /// Start decoding; a no-op if already running
    async fn start(&mut self) -> Result<(), DecoderError>;

    /// Stop decoding and release the process; safe to call when not started
    async fn stop(&mut self);

    /// Dimensions of the frames this decoder publishes, if it publishes any
    fn frame_dimensions(&self) -> Option<(u32, u32)>;

    /// Check if the decoder is currently producing (or trying to produce) frames
    fn is_running(&self) -> bool;

    /// Human-readable name for this decoder
    fn name(&self) -> &'static str;
}

/// Build the decoder selected by the configuration
pub fn build_decoder<C: FrameSink>(
    config: &VideoConfig,
    dispatch: DispatchHandle<C>,
) -> Box<dyn VideoStreamDecoder> {
    match config.decoder {
        DecoderKind::Ffmpeg => Box::new(FfmpegDecoder::new(config.clone(), dispatch)),
        DecoderKind::Disabled => Box::new(DisabledDecoder::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;

    struct Discard;

    impl FrameSink for Discard {
        fn publish_frame(&mut self, _pixels: Bytes) {}
        fn stream_status(&mut self, _status: StreamStatus) {}
    }

    #[test]
    fn test_build_decoder_by_kind() {
        let dispatcher: Dispatcher<Discard> = Dispatcher::new();

        let config = VideoConfig::default();
        let decoder = build_decoder(&config, dispatcher.handle());
        assert_eq!(decoder.name(), "ffmpeg");
        assert_eq!(decoder.frame_dimensions(), Some((960, 720)));
        assert!(!decoder.is_running());

        let config = VideoConfig {
            decoder: DecoderKind::Disabled,
            ..Default::default()
        };
        let decoder = build_decoder(&config, dispatcher.handle());
        assert_eq!(decoder.name(), "disabled");
        assert_eq!(decoder.frame_dimensions(), None);
    }
}
