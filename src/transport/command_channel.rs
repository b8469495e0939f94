//! Outbound command channel
//!
//! Send-and-forget UDP: every command is one datagram to the fixed drone
//! endpoint. Nothing is acknowledged or retried at this layer.

use qrdrone_shared::wire;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Errors raised by the command channel
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Failed to open command socket: {0}")]
    Open(#[source] io::Error),

    #[error("Failed to send {command:?} to {endpoint}: {source}")]
    Send {
        command: String,
        endpoint: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Command channel is closed")]
    Closed,
}

/// UDP socket bound to an ephemeral port, aimed at the drone
pub struct CommandChannel {
    socket: Option<UdpSocket>,
    endpoint: SocketAddr,
}

impl CommandChannel {
    /// Allocate the outbound socket
    ///
    /// UDP is connectionless, so this says nothing about whether the drone
    /// is reachable; later sends may still fail on routing errors.
    pub async fn open(endpoint: SocketAddr) -> Result<Self, ChannelError> {
        let bind_addr = match endpoint {
            SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
            SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
        };

        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(ChannelError::Open)?;

        info!(
            "[CMD] Command channel open: {} -> {}",
            socket
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "?".into()),
            endpoint
        );

        Ok(Self {
            socket: Some(socket),
            endpoint,
        })
    }

    /// The drone endpoint commands are sent to
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Local address of the outbound socket, while open
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Check if the channel can still send
    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Send one command as a single datagram
    pub async fn send(&self, command: &str) -> Result<(), ChannelError> {
        let socket = self.socket.as_ref().ok_or(ChannelError::Closed)?;

        socket
            .send_to(command.as_bytes(), self.endpoint)
            .await
            .map_err(|source| ChannelError::Send {
                command: command.to_string(),
                endpoint: self.endpoint,
                source,
            })?;

        debug!("[CMD] Sent {:?} to {}", command, self.endpoint);
        Ok(())
    }

    /// Ask the drone to enter command mode
    ///
    /// Advisory only: no reply is awaited. Send this after the response
    /// listener is bound, or an immediate reply can be lost.
    pub async fn probe(&self) -> Result<(), ChannelError> {
        self.send(wire::PROBE_COMMAND).await
    }

    /// Release the socket; safe to call any number of times
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            info!("[CMD] Command channel to {} closed", self.endpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
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
            .expect("datagram should arrive")
            .unwrap();
        String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_send_is_one_datagram() {
        let (drone, addr) = drone_stub().await;
        let channel = CommandChannel::open(addr).await.unwrap();
        assert!(channel.is_open());
        assert_eq!(channel.endpoint(), addr);

        channel.send("forward 20").await.unwrap();
        channel.send("left 90").await.unwrap();

        assert_eq!(recv_text(&drone).await, "forward 20");
        assert_eq!(recv_text(&drone).await, "left 90");
    }

    #[tokio::test]
    async fn test_probe_payload() {
        let (drone, addr) = drone_stub().await;
        let channel = CommandChannel::open(addr).await.unwrap();

        channel.probe().await.unwrap();
        assert_eq!(recv_text(&drone).await, "command");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (_drone, addr) = drone_stub().await;
        let mut channel = CommandChannel::open(addr).await.unwrap();

        channel.close();
        channel.close();
        assert!(!channel.is_open());
        assert!(channel.local_addr().is_none());

        let result = channel.send("forward 20").await;
        assert!(matches!(result, Err(ChannelError::Closed)));
    }
}
