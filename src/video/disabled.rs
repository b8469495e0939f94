//! Stand-in decoder for environments without a frame source

use super::{DecoderError, VideoStreamDecoder};
use async_trait::async_trait;
use tracing::info;

/// Decoder that never produces frames
#[derive(Debug, Default)]
pub struct DisabledDecoder;

impl DisabledDecoder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VideoStreamDecoder for DisabledDecoder {
    async fn start(&mut self) -> Result<(), DecoderError> {
        info!("[VIDEO] Video decoding disabled; no frames will be produced");
        Ok(())
    }

    async fn stop(&mut self) {}

    fn frame_dimensions(&self) -> Option<(u32, u32)> {
        None
    }

    fn is_running(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}
