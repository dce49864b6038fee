//! Transports for ShadowBot.
//!
//! Each transport connects the worker to the relay the intermediary bot lives
//! on and implements [`shadowbot_core::Transport`].
//!
//! Available transports:
//! - **IRC** — live TCP connection with NickServ identify and PING/PONG
//! - **Scripted** — replays a fixed transcript and records what was sent

pub mod irc;
pub mod scripted;

pub use irc::{IrcTransport, LineFramer, sanitize};
pub use scripted::{ScriptedTransport, SentLog, Step, envelope};
