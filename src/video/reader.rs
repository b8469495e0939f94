//! Frame reader loop
//!
//! Pulls raw RGB24 bytes from the decoder's output, accumulating partial
//! reads until a full frame is available, and publishes each complete
//! frame. A stream that ends mid-frame loses the partial frame.

use bytes::Bytes;
use qrdrone_shared::FrameAssembler;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;

/// Largest single read from the decoder pipe
const READ_CHUNK: usize = 64 * 1024;

/// Why the reader loop ended
#[derive(Debug)]
pub enum ReadExit {
    /// Shutdown was signalled
    Shutdown { frames: u64 },
    /// The stream returned end-of-file; any partial frame was discarded
    EndOfStream { frames: u64, partial: usize },
    /// A read failed
    Failed { frames: u64, error: io::Error },
}

impl ReadExit {
    /// Complete frames published before the loop ended
    pub fn frames(&self) -> u64 {
        match self {
            ReadExit::Shutdown { frames }
            | ReadExit::EndOfStream { frames, .. }
            | ReadExit::Failed { frames, .. } => *frames,
        }
    }
}

/// Read frames until shutdown, end of stream, or a read error
pub async fn read_frames<R, F>(
    reader: &mut R,
    assembler: &mut FrameAssembler,
    shutdown: &mut oneshot::Receiver<()>,
    mut publish: F,
) -> ReadExit
where
    R: AsyncRead + Unpin + ?Sized,
    F: FnMut(Bytes),
{
    let mut scratch = vec![0u8; assembler.frame_len().min(READ_CHUNK)];
    let mut frames = 0u64;

    loop {
        let want = assembler.remaining().min(scratch.len());

        tokio::select! {
            biased;

            _ = &mut *shutdown => {
                return ReadExit::Shutdown { frames };
            }

            result = reader.read(&mut scratch[..want]) => {
                match result {
                    Ok(0) => {
                        let partial = assembler.pending();
                        assembler.reset();
                        return ReadExit::EndOfStream { frames, partial };
                    }
                    Ok(n) => {
                        assembler.extend(&scratch[..n]);
                        if let Some(frame) = assembler.next_frame() {
                            publish(frame);
                            frames += 1;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(error) => {
                        assembler.reset();
                        return ReadExit::Failed { frames, error };
                    }
                }
            }
        }
    }
}

/// Single-slot hand-off for the newest decoded frame
///
/// The reader posts every frame; the consumer takes whatever is newest.
/// Frames posted before the consumer gets to the previous one replace it,
/// so a slow consumer never builds a backlog.
#[derive(Debug, Clone, Default)]
pub struct FrameMailbox {
    slot: Arc<Mutex<Option<Bytes>>>,
    dropped: Arc<AtomicU64>,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a frame, returning true if the slot was empty
    ///
    /// Only an empty-to-full post needs a consumer wake-up; otherwise a
    /// take is already pending and will pick up this frame instead.
    pub fn post(&self, frame: Bytes) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let was_empty = slot.is_none();
        if !was_empty {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        *slot = Some(frame);
        was_empty
    }

    /// Take the newest frame, leaving the slot empty
    pub fn take(&self) -> Option<Bytes> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Frames overwritten before the consumer saw them
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
