//! ffmpeg subprocess decoder
//!
//! Runs `ffmpeg -i <url> -f rawvideo -pix_fmt rgb24 -s WxH -` and reads
//! fixed-size frames from its stdout. A supervisor task owns the process
//! while it runs: it publishes frames through the dispatcher, restarts the
//! process with exponential backoff when it dies, and hands the process
//! back on shutdown so `stop()` can terminate it.

use super::reader::{read_frames, FrameMailbox, ReadExit};
use super::{DecoderError, FrameSink, StreamStatus, VideoStreamDecoder};
use crate::config::VideoConfig;
use crate::dispatch::DispatchHandle;
use async_trait::async_trait;
use qrdrone_shared::FrameAssembler;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// How long to wait for the process to be reaped after its stdout closes
const EXIT_CHECK_TIMEOUT: Duration = Duration::from_millis(500);

struct Running {
    shutdown_tx: oneshot::Sender<()>,
    /// Resolves to the live process, if there still is one
    task: JoinHandle<Option<Child>>,
}

/// Decoder backed by an external ffmpeg process
pub struct FfmpegDecoder<C> {
    config: VideoConfig,
    dispatch: DispatchHandle<C>,
    running: Option<Running>,
}

impl<C: FrameSink> FfmpegDecoder<C> {
    /// Create a stopped decoder
    pub fn new(config: VideoConfig, dispatch: DispatchHandle<C>) -> Self {
        Self {
            config,
            dispatch,
            running: None,
        }
    }

    fn notify_status(&self, status: StreamStatus) {
        notify_status(&self.dispatch, status);
    }

    /// Wait for a supervisor that is done (or being stopped) and terminate
    /// whatever process it hands back
    async fn join(&self, task: JoinHandle<Option<Child>>) {
        let child = match task.await {
            Ok(child) => child,
            Err(e) => {
                error!("[VIDEO] Supervisor task failed: {}", e);
                None
            }
        };

        if let Some(child) = child {
            let ended = terminate(child, self.config.stop_grace).await;
            debug!("[VIDEO] Decoder termination: {:?}", ended);
        }
    }
}

#[async_trait]
impl<C: FrameSink> VideoStreamDecoder for FfmpegDecoder<C> {
    async fn start(&mut self) -> Result<(), DecoderError> {
        if self.is_running() {
            return Ok(());
        }

        // A supervisor that gave up still needs joining before a fresh start
        if let Some(running) = self.running.take() {
            self.join(running.task).await;
        }

        let assembler = FrameAssembler::new(self.config.width, self.config.height)?;
        let program = resolve_executable(&self.config.executable)?;
        let child = spawn_decoder(&program, &self.config)?;

        info!(
            "[VIDEO] Decoder started: {} reading {} ({}x{})",
            program.display(),
            self.config.source_url,
            self.config.width,
            self.config.height
        );

        // Queued ahead of anything the supervisor reports
        self.notify_status(StreamStatus::Running);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let supervisor = Supervisor {
            program,
            config: self.config.clone(),
            dispatch: self.dispatch.clone(),
            mailbox: FrameMailbox::new(),
            assembler,
        };
        let task = tokio::spawn(supervisor.run(child, shutdown_rx));

        self.running = Some(Running { shutdown_tx, task });
        Ok(())
    }

    async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        // Reader joined first, then the process is terminated
        let _ = running.shutdown_tx.send(());
        self.join(running.task).await;

        self.notify_status(StreamStatus::Stopped);
        info!("[VIDEO] Decoder stopped");
    }

    fn frame_dimensions(&self) -> Option<(u32, u32)> {
        Some((self.config.width, self.config.height))
    }

    fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Owns the decoder process and its output between start and stop
struct Supervisor<C> {
    program: PathBuf,
    config: VideoConfig,
    dispatch: DispatchHandle<C>,
    mailbox: FrameMailbox,
    assembler: FrameAssembler,
}

impl<C: FrameSink> Supervisor<C> {
    async fn run(
        mut self,
        mut child: Child,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> Option<Child> {
        let mut restarts = 0u32;
        let mut delay = self.config.restart_delay;

        loop {
            let Some(mut stdout) = child.stdout.take() else {
                error!("[VIDEO] Decoder stdout not captured");
                return Some(child);
            };

            let mailbox = self.mailbox.clone();
            let dispatch = self.dispatch.clone();
            let exit = read_frames(&mut stdout, &mut self.assembler, &mut shutdown_rx, |frame| {
                if mailbox.post(frame) {
                    let mailbox = mailbox.clone();
                    dispatch.enqueue(move |sink: &mut C| {
                        if let Some(frame) = mailbox.take() {
                            sink.publish_frame(frame);
                        }
                    });
                }
            })
            .await;

            if exit.frames() > 0 {
                restarts = 0;
                delay = self.config.restart_delay;
            }

            match exit {
                ReadExit::Shutdown { frames } => {
                    debug!(
                        "[VIDEO] Reader stopping after {} frame(s), {} dropped",
                        frames,
                        self.mailbox.dropped()
                    );
                    return Some(child);
                }
                ReadExit::Failed { error, .. } => {
                    error!("[VIDEO] Error reading video frames: {}", error);
                    notify_status(&self.dispatch, StreamStatus::Failed);
                    return Some(child);
                }
                ReadExit::EndOfStream { partial, .. } => {
                    if partial > 0 {
                        debug!("[VIDEO] Stream ended mid-frame, dropped {} bytes", partial);
                    }
                }
            }

            // Output closed: either the process died or it closed stdout
            match timeout(EXIT_CHECK_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => warn!("[VIDEO] Decoder exited unexpectedly ({})", status),
                Ok(Err(e)) => warn!("[VIDEO] Decoder exit status unavailable: {}", e),
                Err(_) => {
                    warn!("[VIDEO] Decoder closed its output but is still running");
                    notify_status(&self.dispatch, StreamStatus::Failed);
                    return Some(child);
                }
            }

            // Crashed: restart with backoff until the budget runs out
            loop {
                restarts += 1;
                if restarts > self.config.max_restarts {
                    error!(
                        "[VIDEO] Decoder crashed {} time(s) in a row, giving up",
                        restarts
                    );
                    notify_status(&self.dispatch, StreamStatus::Failed);
                    return None;
                }

                notify_status(&self.dispatch, StreamStatus::Crashed { restarts });
                warn!(
                    "[VIDEO] Restarting decoder in {:?} (attempt {}/{})",
                    delay, restarts, self.config.max_restarts
                );

                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => return None,
                    _ = tokio::time::sleep(delay) => {}
                }

                // Exponential backoff
                delay = next_delay(delay, self.config.max_restart_delay);

                match spawn_decoder(&self.program, &self.config) {
                    Ok(next) => {
                        info!("[VIDEO] Decoder restarted");
                        notify_status(&self.dispatch, StreamStatus::Running);
                        child = next;
                        break;
                    }
                    Err(e) => error!("[VIDEO] Restart failed: {}", e),
                }
            }
        }
    }
}

/// Double the restart delay, capped at `max`
fn next_delay(delay: Duration, max: Duration) -> Duration {
    std::cmp::min(delay.saturating_mul(2), max)
}

fn notify_status<C: FrameSink>(dispatch: &DispatchHandle<C>, status: StreamStatus) {
    dispatch.enqueue(move |sink: &mut C| sink.stream_status(status));
}

/// Check the decoder path before spawning
///
/// Paths with a directory component must exist; bare names are left to
/// the OS search path.
fn resolve_executable(executable: &Path) -> Result<PathBuf, DecoderError> {
    if executable.as_os_str().is_empty() {
        return Err(DecoderError::MissingExecutable(executable.to_path_buf()));
    }

    let is_bare_name = executable.components().count() == 1 && !executable.is_absolute();
    if !is_bare_name && !executable.is_file() {
        return Err(DecoderError::MissingExecutable(executable.to_path_buf()));
    }

    Ok(executable.to_path_buf())
}

/// Decoder command-line arguments for the configured stream
fn decoder_args(config: &VideoConfig) -> Vec<String> {
    vec![
        "-i".into(),
        config.source_url.clone(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-s".into(),
        format!("{}x{}", config.width, config.height),
        "-".into(),
    ]
}

fn spawn_decoder(program: &Path, config: &VideoConfig) -> Result<Child, DecoderError> {
    Command::new(program)
        .args(decoder_args(config))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| DecoderError::Spawn {
            path: program.to_path_buf(),
            source,
        })
}

/// How a decoder process ended on stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    /// Quit on request within the grace period
    Quit,
    /// Ignored the quit request and was killed
    Killed,
    /// Exit could not be confirmed
    Unknown,
}

/// Ask the process to quit, then kill it if it does not
async fn terminate(mut child: Child, grace: Duration) -> Termination {
    // ffmpeg quits cleanly on 'q' from stdin
    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(b"q").await;
    }

    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!("[VIDEO] Decoder exited ({})", status);
            Termination::Quit
        }
        Ok(Err(e)) => {
            warn!("[VIDEO] Failed waiting for decoder: {}", e);
            Termination::Unknown
        }
        Err(_) => {
            warn!("[VIDEO] Decoder ignored quit request, killing it");
            match child.kill().await {
                Ok(()) => Termination::Killed,
                Err(e) => {
                    error!("[VIDEO] Failed to kill decoder: {}", e);
                    Termination::Unknown
                }
            }
        }
    }
}
