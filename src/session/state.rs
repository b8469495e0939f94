//! Consumer-side session state
//!
//! Everything here is touched only by whoever drains the dispatcher:
//! background tasks reach it through queued closures, never directly.

use crate::transport::ResponseSink;
use crate::video::{FrameSink, StreamStatus};
use bytes::Bytes;
use qrdrone_shared::VideoFrame;
use std::fmt;
use tracing::{debug, info, warn};

/// Severity of the status line, for the UI to colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusLevel {
    #[default]
    Info,
    Success,
    Warning,
    Error,
    /// Text relayed from the drone
    Response,
}

/// Single line of operator feedback
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusLine {
    pub text: String,
    pub level: StatusLevel,
}

impl StatusLine {
    pub fn new(level: StatusLevel, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level,
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.level, self.text)
    }
}

/// Callback run for each drone response
pub type ResponseObserver = Box<dyn FnMut(&str) + Send>;

/// State owned by the consumer context
pub struct SessionState {
    /// The single current-frame slot, overwritten in place
    frame: VideoFrame,
    observers: Vec<ResponseObserver>,
    status: StatusLine,
    stream: StreamStatus,
    responses: u64,
    last_response: Option<String>,
}

impl SessionState {
    pub fn new(frame: VideoFrame) -> Self {
        Self {
            frame,
            observers: Vec::new(),
            status: StatusLine::default(),
            stream: StreamStatus::Stopped,
            responses: 0,
            last_response: None,
        }
    }

    /// Latest published frame, possibly stale
    pub fn frame(&self) -> &VideoFrame {
        &self.frame
    }

    pub fn status(&self) -> &StatusLine {
        &self.status
    }

    pub fn set_status(&mut self, level: StatusLevel, text: impl Into<String>) {
        self.status = StatusLine::new(level, text);
    }

    /// Last reported health of the video stream
    pub fn stream(&self) -> StreamStatus {
        self.stream
    }

    /// Responses delivered since the session opened
    pub fn responses_received(&self) -> u64 {
        self.responses
    }

    pub fn last_response(&self) -> Option<&str> {
        self.last_response.as_deref()
    }

    /// Register a callback for every future drone response
    pub fn subscribe(&mut self, observer: ResponseObserver) {
        self.observers.push(observer);
    }
}

impl ResponseSink for SessionState {
    fn deliver_response(&mut self, response: String) {
        self.responses += 1;
        self.set_status(StatusLevel::Response, format!("drone response: {}", response));

        for observer in &mut self.observers {
            observer(&response);
        }

        self.last_response = Some(response);
    }
}

impl FrameSink for SessionState {
    fn publish_frame(&mut self, pixels: Bytes) {
        if let Err(e) = self.frame.overwrite(&pixels) {
            warn!("[SESSION] Discarding frame: {}", e);
        }
    }

    fn stream_status(&mut self, status: StreamStatus) {
        if self.stream != status {
            debug!("[SESSION] Video stream {:?} -> {:?}", self.stream, status);
        }
        if status == StreamStatus::Failed {
            info!("[SESSION] Video stream unavailable");
            self.set_status(StatusLevel::Warning, "video stream unavailable");
        }
        self.stream = status;
    }
}
