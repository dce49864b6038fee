//! Transport trait — the abstraction over the chat relay.
//!
//! A Transport connects ShadowBot to the relay the intermediary bot lives on.
//! It frames incoming bytes into lines, answers keepalive probes without
//! surfacing them, and sends raw protocol lines back.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;

/// The core Transport trait.
///
/// Implementations own the connection and any buffering. Every receive is
/// bounded by a timeout so no caller can block forever.
#[async_trait]
pub trait Transport: Send {
    /// Human-readable transport name (e.g., "irc", "scripted").
    fn name(&self) -> &str;

    /// The nick this connection is registered under.
    fn nick(&self) -> &str;

    /// Send one raw protocol line (without the trailing newline).
    async fn send(&mut self, line: &str) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the next complete line.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    async fn receive(&mut self, timeout: Duration) -> Result<Option<String>, TransportError>;

    /// Send a private message to a nick or channel.
    async fn privmsg(&mut self, target: &str, text: &str) -> Result<(), TransportError> {
        if text.is_empty() {
            return Ok(());
        }
        self.send(&format!("PRIVMSG {target} :{text}")).await
    }

    /// Join a channel.
    async fn join(&mut self, channel: &str) -> Result<(), TransportError> {
        self.send(&format!("JOIN {channel}")).await
    }

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}
