//! Client session boundary.
//!
//! The network transport is an external collaborator. The runtime only needs
//! to push encoded messages at a session and close it; [`ChannelSession`] is
//! the in-process implementation used by the server binary and tests, with a
//! channel standing in for the socket writer.

use crate::error::SessionError;
use crate::message::OutboundMessage;
use std::net::SocketAddr;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tracing::debug;

/// A connected client as seen by its gateway user.
///
/// Sessions are exclusively owned; `close` consumes the session so it can
/// only ever be closed once.
pub trait ClientSession: Send + std::fmt::Debug {
    /// Encodes and sends a structured message.
    fn send(&mut self, message: &OutboundMessage) -> Result<(), SessionError>;

    /// Sends pre-encoded bytes as-is.
    fn send_raw(&mut self, data: &[u8]) -> Result<(), SessionError>;

    /// Closes the underlying connection.
    fn close(self: Box<Self>);
}

/// Session that writes encoded frames into an unbounded channel.
#[derive(Debug)]
pub struct ChannelSession {
    remote_addr: Option<SocketAddr>,
    connected_at: SystemTime,
    sender: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelSession {
    /// Creates a session and the receiving end of its frame channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let session = Self {
            remote_addr: None,
            connected_at: SystemTime::now(),
            sender,
        };
        (session, receiver)
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }
}

impl ClientSession for ChannelSession {
    fn send(&mut self, message: &OutboundMessage) -> Result<(), SessionError> {
        let data = message.to_bytes()?;
        self.send_raw(&data)
    }

    fn send_raw(&mut self, data: &[u8]) -> Result<(), SessionError> {
        self.sender
            .send(data.to_vec())
            .map_err(|_| SessionError::Transport("client disconnected".to_string()))
    }

    fn close(self: Box<Self>) {
        debug!("🔌 Closing client session {:?}", self.remote_addr);
        // Dropping the sender ends the receiver's stream.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_reach_receiver_until_close() {
        let (mut session, mut frames) = ChannelSession::new();
        session
            .send(&OutboundMessage::message("chat", "say", serde_json::json!("hi")))
            .unwrap();
        session.send_raw(b"raw").unwrap();

        let first: serde_json::Value = serde_json::from_slice(&frames.recv().await.unwrap()).unwrap();
        assert_eq!(first["event"], "say");
        assert_eq!(frames.recv().await.unwrap(), b"raw".to_vec());

        let boxed: Box<dyn ClientSession> = Box::new(session);
        boxed.close();
        assert!(frames.recv().await.is_none());
    }

    #[test]
    fn test_send_after_receiver_dropped_is_transport_error() {
        let (mut session, frames) = ChannelSession::new();
        drop(frames);
        let err = session.send_raw(b"x").unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
    }
}
