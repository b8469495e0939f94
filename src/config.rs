//! Bridge configuration
//!
//! Every field has a default matching a stock drone on its own access
//! point; the binary overrides individual fields from the command line.

use qrdrone_shared::{video, wire};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration problems detected before a session is opened
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid frame size: {width}x{height}")]
    InvalidFrameSize { width: u32, height: u32 },

    #[error("Scan interval must be greater than zero")]
    ZeroScanInterval,

    #[error("Video source URL is empty")]
    EmptyVideoUrl,

    #[error("Listen address {0} is the drone command address")]
    ListenCollision(SocketAddr),
}

/// Drone network endpoints
#[derive(Debug, Clone)]
pub struct DroneConfig {
    /// Where commands are sent
    pub address: SocketAddr,
    /// Local address the response listener binds
    pub listen_addr: SocketAddr,
}

impl Default for DroneConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from((wire::DEFAULT_DRONE_IP, wire::DEFAULT_COMMAND_PORT)),
            listen_addr: SocketAddr::from(([0, 0, 0, 0], wire::DEFAULT_LISTEN_PORT)),
        }
    }
}

/// Magnitudes substituted into movement commands
#[derive(Debug, Clone)]
pub struct CommandConfig {
    /// Distance for `forward`, in centimeters
    pub forward_distance_cm: u32,
    /// Angle for `left` / `right`, in degrees
    pub turn_angle_deg: u32,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            forward_distance_cm: 20,
            turn_angle_deg: 90,
        }
    }
}

/// Which frame decoder backs the video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderKind {
    /// External ffmpeg process emitting raw RGB24 on stdout
    #[default]
    Ffmpeg,
    /// No decoding; the current frame stays a placeholder
    Disabled,
}

/// Video stream and decoder subprocess settings
#[derive(Debug, Clone)]
pub struct VideoConfig {
    pub decoder: DecoderKind,
    /// Decoder executable; a bare name is resolved through PATH
    pub executable: PathBuf,
    /// Stream descriptor handed to the decoder's `-i`
    pub source_url: String,
    pub width: u32,
    pub height: u32,
    /// Restarts allowed after consecutive decoder crashes
    pub max_restarts: u32,
    /// Delay before the first restart (doubles per consecutive crash)
    pub restart_delay: Duration,
    /// Maximum restart delay
    pub max_restart_delay: Duration,
    /// Time the decoder gets to quit on its own before it is killed
    pub stop_grace: Duration,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            decoder: DecoderKind::Ffmpeg,
            executable: PathBuf::from("ffmpeg"),
            source_url: wire::DEFAULT_VIDEO_URL.into(),
            width: video::FRAME_WIDTH,
            height: video::FRAME_HEIGHT,
            max_restarts: 5,
            restart_delay: Duration::from_secs(1),
            max_restart_delay: Duration::from_secs(30),
            stop_grace: Duration::from_secs(2),
        }
    }
}

/// Symbol scanning cadence
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Poll interval; also the consumer tick in the headless console
    pub interval: Duration,
    /// Consecutive empty scans before a single escalated warning
    pub max_failed_scans: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_failed_scans: 5,
        }
    }
}

/// Complete bridge configuration
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    pub drone: DroneConfig,
    pub command: CommandConfig,
    pub video: VideoConfig,
    pub scan: ScanConfig,
}

impl BridgeConfig {
    /// Check the configuration for values no session can run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.interval.is_zero() {
            return Err(ConfigError::ZeroScanInterval);
        }

        if self.drone.listen_addr == self.drone.address {
            return Err(ConfigError::ListenCollision(self.drone.listen_addr));
        }

        if self.video.decoder == DecoderKind::Ffmpeg {
            if video::frame_len(self.video.width, self.video.height).is_none() {
                return Err(ConfigError::InvalidFrameSize {
                    width: self.video.width,
                    height: self.video.height,
                });
            }
            if self.video.source_url.trim().is_empty() {
                return Err(ConfigError::EmptyVideoUrl);
            }
        }

        Ok(())
    }
}
