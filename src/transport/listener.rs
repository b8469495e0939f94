//! Drone response listener
//!
//! Binds its own UDP port and runs one receive task for as long as it is
//! listening. Every datagram is decoded as ASCII and handed to the
//! consumer through the dispatcher, in arrival order.

use crate::dispatch::DispatchHandle;
use qrdrone_shared::{wire, ListenerEvent, ListenerLifecycle, ListenerState};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Consumer-side recipient of drone responses
pub trait ResponseSink: 'static {
    /// Called on the consumer for each received datagram, in arrival order
    fn deliver_response(&mut self, response: String);
}

/// Errors raised when starting the listener
#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Failed to bind response socket {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Response listener already running on {0}")]
    AlreadyStarted(SocketAddr),
}

/// Why the receive loop ended
#[derive(Debug)]
enum LoopExit {
    /// stop() was called or the listener was dropped
    Shutdown,
    /// The consumer's dispatcher is gone
    DispatcherClosed,
    /// recv_from failed for any other reason
    Failed(io::Error),
}

impl LoopExit {
    /// The receive error that ended the loop, if any
    fn error(&self) -> Option<&io::Error> {
        match self {
            LoopExit::Failed(e) => Some(e),
            LoopExit::Shutdown | LoopExit::DispatcherClosed => None,
        }
    }
}

struct Running {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<LoopExit>,
}

/// Listens for drone responses on a fixed local port
pub struct ResponseListener<C> {
    dispatch: DispatchHandle<C>,
    lifecycle: ListenerLifecycle,
    running: Option<Running>,
    /// Bumped on every stop; deliveries from an older run are discarded
    epoch: Arc<AtomicU64>,
}

impl<C: ResponseSink> ResponseListener<C> {
    /// Create an idle listener that delivers through `dispatch`
    pub fn new(dispatch: DispatchHandle<C>) -> Self {
        Self {
            dispatch,
            lifecycle: ListenerLifecycle::new(),
            running: None,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ListenerState {
        self.lifecycle.state()
    }

    /// Bound address while listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Check if the receive task is still alive
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Bind `addr` and spawn the receive task
    ///
    /// On bind failure nothing is spawned. Returns the bound address,
    /// which differs from `addr` when binding port 0.
    pub async fn start(&mut self, addr: SocketAddr) -> Result<SocketAddr, ListenerError> {
        if let Some(running) = &self.running {
            if !running.task.is_finished() {
                return Err(ListenerError::AlreadyStarted(running.local_addr));
            }
            // The previous loop died on its own; reap it before rebinding
            self.reap().await;
        }

        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;
        let local_addr = socket.local_addr().unwrap_or(addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let dispatch = self.dispatch.clone();
        let epoch = self.epoch.clone();
        let run_epoch = epoch.load(Ordering::SeqCst);

        let task = tokio::spawn(async move {
            receive_loop(socket, dispatch, epoch, run_epoch, shutdown_rx).await
        });

        self.running = Some(Running {
            local_addr,
            shutdown_tx,
            task,
        });
        self.lifecycle.process_event(ListenerEvent::Started);

        info!("[LISTENER] Listening for drone responses on {}", local_addr);
        Ok(local_addr)
    }

    /// Close the socket and wait for the receive task to finish
    ///
    /// Once this returns, no further responses are delivered, including
    /// ones already queued on the dispatcher. Safe to call when idle.
    pub async fn stop(&mut self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);

        let Some(running) = self.running.take() else {
            self.lifecycle.process_event(ListenerEvent::StopRequested);
            return;
        };

        // Receiver gone means the loop already exited
        let _ = running.shutdown_tx.send(());

        match running.task.await {
            Ok(exit) => match exit.error() {
                Some(e) => warn!("[LISTENER] Receive loop had failed: {}", e),
                None => debug!("[LISTENER] Receive loop joined: {:?}", exit),
            },
            Err(e) => error!("[LISTENER] Receive task failed: {}", e),
        }

        self.lifecycle.process_event(ListenerEvent::StopRequested);
        info!("[LISTENER] Stopped listening on {}", running.local_addr);
    }

    /// Join a receive task that already ended by itself
    async fn reap(&mut self) {
        if let Some(running) = self.running.take() {
            match running.task.await {
                Ok(exit) => match exit.error() {
                    Some(e) => warn!("[LISTENER] Previous receive loop failed: {}", e),
                    None => warn!("[LISTENER] Previous receive loop had ended: {:?}", exit),
                },
                Err(e) => error!("[LISTENER] Receive task failed: {}", e),
            }
            self.lifecycle.process_event(ListenerEvent::LoopEnded);
        }
    }
}

/// Decode a datagram as ASCII; non-ASCII bytes become '?'
fn decode_response(payload: &[u8]) -> String {
    payload
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect()
}

async fn receive_loop<C: ResponseSink>(
    socket: UdpSocket,
    dispatch: DispatchHandle<C>,
    epoch: Arc<AtomicU64>,
    run_epoch: u64,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> LoopExit {
    let mut buf = vec![0u8; wire::MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            biased;

            // Sender dropped counts as shutdown too
            _ = &mut shutdown_rx => {
                return LoopExit::Shutdown;
            }

            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((n, from)) => {
                        let response = decode_response(&buf[..n]);
                        debug!("[LISTENER] {} bytes from {}: {:?}", n, from, response);

                        let epoch = epoch.clone();
                        let queued = dispatch.enqueue(move |sink: &mut C| {
                            if epoch.load(Ordering::SeqCst) == run_epoch {
                                sink.deliver_response(response);
                            }
                        });

                        if !queued {
                            warn!("[LISTENER] Dispatcher closed, ending receive loop");
                            return LoopExit::DispatcherClosed;
                        }
                    }
                    Err(e) => {
                        error!("[LISTENER] Receive error: {}", e);
                        return LoopExit::Failed(e);
                    }
                }
            }
        }
    }
}
