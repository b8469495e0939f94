//! Drone session orchestrator
//!
//! This module handles:
//! - Startup ordering: command channel, response listener, probe, video
//! - Turning symbols into commands and sending them
//! - Running queued background work on the caller's context (`tick`)
//! - Teardown in reverse order, every step attempted

use super::state::{SessionState, StatusLevel, StatusLine};
use crate::config::BridgeConfig;
use crate::dispatch::Dispatcher;
use crate::scan::{ScanOutcome, SymbolDecoder, SymbolScanner};
use crate::transport::{ChannelError, CommandChannel, ResponseListener};
use crate::video::{build_decoder, StreamStatus, VideoStreamDecoder};
use anyhow::{Context, Result};
use qrdrone_shared::{Command, UnknownCommand, VideoFrame};
use std::net::SocketAddr;
use thiserror::Error;
use tracing::{error, info, warn};

/// Why a symbol did not reach the drone
#[derive(Error, Debug)]
pub enum SymbolError {
    #[error(transparent)]
    Unknown(#[from] UnknownCommand),

    #[error(transparent)]
    Send(#[from] ChannelError),

    #[error("Drone session is closed")]
    Closed,
}

/// A connected drone: commands out, responses and video in
pub struct DroneSession {
    config: BridgeConfig,
    dispatcher: Dispatcher<SessionState>,
    state: SessionState,
    channel: CommandChannel,
    listener: ResponseListener<SessionState>,
    decoder: Box<dyn VideoStreamDecoder>,
    listen_addr: SocketAddr,
    closed: bool,
}

impl DroneSession {
    /// Open the session
    ///
    /// Socket failures abort the open. The probe and the video decoder are
    /// best effort: their failures are logged and shown on the status line.
    pub async fn open(config: BridgeConfig) -> Result<Self> {
        config.validate().context("Invalid bridge configuration")?;

        let dispatcher: Dispatcher<SessionState> = Dispatcher::new();
        let mut decoder = build_decoder(&config.video, dispatcher.handle());

        // The frame slot lives for the whole session
        let frame = match decoder.frame_dimensions() {
            Some((width, height)) => {
                VideoFrame::new(width, height).context("Failed to allocate frame slot")?
            }
            None => VideoFrame::placeholder(),
        };
        let mut state = SessionState::new(frame);
        state.set_status(
            StatusLevel::Info,
            format!("connecting to {}", config.drone.address),
        );

        info!("[SESSION] Opening session with drone {}", config.drone.address);

        let mut channel = CommandChannel::open(config.drone.address)
            .await
            .context("Failed to open command channel")?;

        let mut listener = ResponseListener::new(dispatcher.handle());
        let listen_addr = match listener.start(config.drone.listen_addr).await {
            Ok(addr) => addr,
            Err(e) => {
                channel.close();
                return Err(e).context("Failed to start response listener");
            }
        };

        // Listener is bound, so an immediate reply cannot be missed
        match channel.probe().await {
            Ok(()) => state.set_status(StatusLevel::Success, "connected to drone"),
            Err(e) => {
                warn!("[SESSION] Probe failed: {}", e);
                state.set_status(StatusLevel::Error, "drone connection failed");
            }
        }

        match decoder.start().await {
            Ok(()) => info!("[SESSION] Video decoder '{}' started", decoder.name()),
            Err(e) => {
                error!("[SESSION] Video decoder '{}' failed to start: {}", decoder.name(), e);
                state.set_status(StatusLevel::Warning, format!("video unavailable: {}", e));
            }
        }

        Ok(Self {
            config,
            dispatcher,
            state,
            channel,
            listener,
            decoder,
            listen_addr,
            closed: false,
        })
    }

    /// Run every queued background delivery; call once per tick
    pub fn tick(&mut self) -> usize {
        self.dispatcher.drain_all(&mut self.state)
    }

    /// Encode a symbol and send it to the drone
    pub async fn send_symbol(&mut self, token: &str) -> Result<Command, SymbolError> {
        if self.closed {
            return Err(SymbolError::Closed);
        }

        let command = match Command::from_symbol(
            token,
            self.config.command.forward_distance_cm,
            self.config.command.turn_angle_deg,
        ) {
            Ok(command) => command,
            Err(e) => {
                warn!("[SESSION] {}", e);
                self.state
                    .set_status(StatusLevel::Error, format!("invalid command: {}", e.0));
                return Err(e.into());
            }
        };

        match self.channel.send(&command.to_wire()).await {
            Ok(()) => {
                info!("[SESSION] Sent command: {}", command);
                self.state
                    .set_status(StatusLevel::Success, format!("command sent: {}", command));
                Ok(command)
            }
            Err(e) => {
                error!("[SESSION] {}", e);
                self.state
                    .set_status(StatusLevel::Error, format!("send failed: {}", command));
                Err(e.into())
            }
        }
    }

    /// Act on a scan result: send commands, report everything else
    pub async fn apply_scan(&mut self, outcome: ScanOutcome) -> Option<Command> {
        match outcome {
            ScanOutcome::Command(kind) => self.send_symbol(kind.token()).await.ok(),
            ScanOutcome::Invalid(text) => {
                self.state
                    .set_status(StatusLevel::Error, format!("invalid command: {}", text));
                None
            }
            ScanOutcome::NoSymbol { escalated, .. } => {
                let text = if escalated {
                    "no QR code detected, adjust the camera"
                } else {
                    "no QR code detected"
                };
                self.state.set_status(StatusLevel::Warning, text);
                None
            }
        }
    }

    /// Scan the current frame and act on the result
    ///
    /// Returns `None` without touching the status line when no frame has
    /// been published yet.
    pub async fn scan_frame(
        &mut self,
        scanner: &mut SymbolScanner,
        decoder: &dyn SymbolDecoder,
    ) -> Option<Command> {
        let outcome = scanner.scan(decoder, self.state.frame())?;
        self.apply_scan(outcome).await
    }

    /// Register a callback for every drone response
    ///
    /// Callbacks run inside `tick`, in arrival order.
    pub fn on_response<F>(&mut self, callback: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.state.subscribe(Box::new(callback));
    }

    /// Most recently published frame; a placeholder when video is disabled
    pub fn current_frame(&self) -> &VideoFrame {
        self.state.frame()
    }

    pub fn status(&self) -> &StatusLine {
        self.state.status()
    }

    pub fn stream_status(&self) -> StreamStatus {
        self.state.stream()
    }

    /// Consumer-side state, for callers that render more than the basics
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// True while commands can be sent and responses received
    pub fn is_connected(&self) -> bool {
        !self.closed && self.channel.is_open() && self.listener.is_running()
    }

    /// Address the response listener is bound to
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Tear the session down: video, then listener, then command channel
    ///
    /// Safe to call more than once.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.decoder.stop().await;
        self.listener.stop().await;
        self.channel.close();

        // Apply the final stream status; stale responses are discarded
        self.dispatcher.drain_all(&mut self.state);
        self.state.set_status(StatusLevel::Info, "disconnected");

        info!("[SESSION] Session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecoderKind;
    use qrdrone_shared::CommandKind;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::time::timeout;

    async fn drone_stub() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    async fn recv_text(socket: &UdpSocket) -> String {
        let mut buf = [0u8; 256];
        let (n, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("timed out waiting for datagram")
            .unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    fn test_config(drone: SocketAddr) -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.drone.address = drone;
        config.drone.listen_addr = "127.0.0.1:0".parse().unwrap();
        config.video.decoder = DecoderKind::Disabled;
        config
    }

    /// Open a session and consume the probe
    async fn open_session() -> (DroneSession, UdpSocket) {
        let (drone, addr) = drone_stub().await;
        let session = DroneSession::open(test_config(addr)).await.unwrap();
        assert_eq!(recv_text(&drone).await, "command");
        (session, drone)
    }

    struct Fixed(Option<&'static str>);

    impl SymbolDecoder for Fixed {
        fn decode(&self, _pixels: &[u8], _width: u32, _height: u32) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    #[tokio::test]
    async fn test_open_probes_and_connects() {
        let (mut session, _drone) = open_session().await;

        assert!(session.is_connected());
        assert_eq!(session.status().level, StatusLevel::Success);
        assert_ne!(session.listen_addr().port(), 0);

        session.close().await;
    }

    #[tokio::test]
    async fn test_send_symbol_encodes_command() {
        let (mut session, drone) = open_session().await;

        let command = session.send_symbol("FORWARD  ").await.unwrap();
        assert_eq!(command.kind, CommandKind::Forward);
        assert_eq!(recv_text(&drone).await, "forward 20");
        assert_eq!(
            session.status(),
            &StatusLine::new(StatusLevel::Success, "command sent: forward 20")
        );

        session.send_symbol("Left").await.unwrap();
        assert_eq!(recv_text(&drone).await, "left 90");

        session.close().await;
    }

    #[tokio::test]
    async fn test_unknown_symbol_sends_nothing() {
        let (mut session, drone) = open_session().await;

        let result = session.send_symbol("up").await;
        assert!(matches!(result, Err(SymbolError::Unknown(_))));
        assert_eq!(session.status().level, StatusLevel::Error);

        let mut buf = [0u8; 64];
        let nothing = timeout(Duration::from_millis(100), drone.recv_from(&mut buf)).await;
        assert!(nothing.is_err(), "no datagram for an unknown symbol");

        session.close().await;
    }

    #[tokio::test]
    async fn test_responses_delivered_on_tick() {
        let (mut session, drone) = open_session().await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        session.on_response(move |r| sink.lock().unwrap().push(r.to_string()));

        for reply in ["ok", "error"] {
            drone
                .send_to(reply.as_bytes(), session.listen_addr())
                .await
                .unwrap();
        }

        for _ in 0..200 {
            session.tick();
            if seen.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(*seen.lock().unwrap(), vec!["ok", "error"]);
        assert_eq!(
            session.status(),
            &StatusLine::new(StatusLevel::Response, "drone response: error")
        );

        session.close().await;
    }

    #[tokio::test]
    async fn test_close_twice_then_send() {
        let (mut session, _drone) = open_session().await;

        session.close().await;
        session.close().await;

        assert!(!session.is_connected());
        assert!(matches!(
            session.send_symbol("forward").await,
            Err(SymbolError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_disabled_video_gives_placeholder() {
        let (mut session, _drone) = open_session().await;

        assert!(session.current_frame().is_empty());
        assert_eq!(session.current_frame().width(), 0);
        assert_eq!(session.stream_status(), StreamStatus::Stopped);

        // Nothing to scan yet
        let mut scanner = SymbolScanner::new(5);
        assert_eq!(session.scan_frame(&mut scanner, &Fixed(Some("left"))).await, None);
        assert_eq!(scanner.failed_scans(), 0);

        session.close().await;
    }

    #[tokio::test]
    async fn test_apply_scan_outcomes() {
        let (mut session, drone) = open_session().await;

        let sent = session
            .apply_scan(ScanOutcome::Command(CommandKind::Right))
            .await;
        assert_eq!(sent.map(|c| c.to_wire()), Some("right 90".to_string()));
        assert_eq!(recv_text(&drone).await, "right 90");

        assert_eq!(session.apply_scan(ScanOutcome::Invalid("up".into())).await, None);
        assert_eq!(
            session.status(),
            &StatusLine::new(StatusLevel::Error, "invalid command: up")
        );

        let outcome = ScanOutcome::NoSymbol {
            consecutive: 5,
            escalated: true,
        };
        assert_eq!(session.apply_scan(outcome).await, None);
        assert_eq!(session.status().level, StatusLevel::Warning);

        session.close().await;
    }

    #[tokio::test]
    async fn test_listen_port_in_use_fails_open() {
        let (_drone, addr) = drone_stub().await;
        let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let mut config = test_config(addr);
        config.drone.listen_addr = taken.local_addr().unwrap();

        assert!(DroneSession::open(config).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_decoder_is_not_fatal() {
        let (drone, addr) = drone_stub().await;
        let mut config = test_config(addr);
        config.video.decoder = DecoderKind::Ffmpeg;
        config.video.executable = "/definitely/not/here/ffmpeg".into();

        let mut session = DroneSession::open(config).await.unwrap();
        assert_eq!(recv_text(&drone).await, "command");
        assert!(session.is_connected());
        assert_eq!(session.status().level, StatusLevel::Warning);

        // Slot allocated at the configured size, never written
        assert_eq!(session.current_frame().width(), 960);
        assert!(session.current_frame().is_empty());

        session.close().await;
    }
}
