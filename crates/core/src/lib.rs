//! # ShadowBot Core
//!
//! Domain types, traits, and error definitions for the ShadowBot automation
//! client. This crate has no I/O of its own; it defines the model that the
//! transport, the game logic and the console all build against.
//!
//! ## Design Philosophy
//!
//! The one external seam (the chat transport) is a trait here. Implementations
//! live in `shadowbot-channels`. This enables:
//! - Running the game logic against a scripted transcript in tests
//! - Keeping protocol parsing independent of the network
//! - Clean dependency graph (all crates depend inward on core)

pub mod control;
pub mod error;
pub mod event;
pub mod session;
pub mod transport;

// Re-export key types at crate root for ergonomics
pub use control::{
    Behavior, ControlHandle, ControlReceiver, ControlSignals, OutgoingMessage, TieBreak,
    Tunables, control_channel,
};
pub use error::{Error, Failure, Flow, Halt, Interrupt, ProtocolError, Result, TransportError};
pub use event::{BotEvent, EventBus};
pub use session::{EscortState, LootTally, PendingDeadline, Session};
pub use transport::Transport;
