//! Symbol scanning
//!
//! Wraps an external QR decoding capability and turns each scan of the
//! current frame into an outcome the session can act on.
//!
//! This module handles:
//! - Matching decoded text against the recognized command tokens
//! - Counting consecutive scans that found no symbol
//! - Escalating once when that count reaches the threshold

use qrdrone_shared::{CommandKind, VideoFrame};
use tracing::{debug, info, warn};

/// External symbol decoding capability
///
/// Returns the text of a symbol found in a tightly packed RGB24 image,
/// or `None` when nothing decodes.
pub trait SymbolDecoder: Send {
    fn decode(&self, pixels: &[u8], width: u32, height: u32) -> Option<String>;
}

/// Result of a single scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A recognized command token
    Command(CommandKind),
    /// A symbol decoded but is not a command; carries the normalized text
    Invalid(String),
    /// Nothing decoded
    NoSymbol {
        /// Consecutive scans without a symbol, including this one
        consecutive: u32,
        /// True only on the scan that reached the threshold
        escalated: bool,
    },
}

/// Tracks scan results across ticks
#[derive(Debug)]
pub struct SymbolScanner {
    threshold: u32,
    failed_scans: u32,
}

impl SymbolScanner {
    /// Create a scanner that escalates after `threshold` consecutive misses
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            failed_scans: 0,
        }
    }

    /// Classify decoded text (or its absence) and update the miss count
    pub fn observe(&mut self, decoded: Option<&str>) -> ScanOutcome {
        let Some(text) = decoded else {
            self.failed_scans = self.failed_scans.saturating_add(1);
            let escalated = self.failed_scans == self.threshold;
            if escalated {
                warn!(
                    "[SCAN] No QR code detected in {} consecutive scans, check the camera",
                    self.failed_scans
                );
            }
            return ScanOutcome::NoSymbol {
                consecutive: self.failed_scans,
                escalated,
            };
        };

        let normalized = text.trim().to_lowercase();
        debug!("[SCAN] Decoded: {}", normalized);

        match CommandKind::parse(&normalized) {
            Ok(kind) => {
                info!("[SCAN] Valid command scanned: {}", kind);
                self.failed_scans = 0;
                ScanOutcome::Command(kind)
            }
            Err(_) => {
                info!("[SCAN] Invalid command: {}", normalized);
                ScanOutcome::Invalid(normalized)
            }
        }
    }

    /// Scan a frame with the given decoder
    ///
    /// Returns `None` for a frame that has never been written, since there
    /// is nothing to look at yet.
    pub fn scan(&mut self, decoder: &dyn SymbolDecoder, frame: &VideoFrame) -> Option<ScanOutcome> {
        if frame.is_empty() {
            return None;
        }

        let decoded = decoder.decode(frame.data(), frame.width(), frame.height());
        Some(self.observe(decoded.as_deref()))
    }

    /// Consecutive scans that found no symbol
    pub fn failed_scans(&self) -> u32 {
        self.failed_scans
    }
}
