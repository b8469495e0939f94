//! QR Drone Bridge
//!
//! Turns decoded QR-code symbols into text commands for a Tello-class
//! drone over UDP, listens for the drone's replies, and keeps the latest
//! decoded frame of the drone's video stream available to the caller.

pub mod config;
pub mod dispatch;
pub mod scan;
pub mod session;
pub mod transport;
pub mod video;

pub use config::BridgeConfig;
pub use session::{DroneSession, StatusLevel, StatusLine, SymbolError};
