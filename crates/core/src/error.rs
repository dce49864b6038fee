//! Error types for the ShadowBot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Control flow that used to be signalled by raising (the operator quitting,
//! the character dying, the escorted player saying "stop") is *not* an error:
//! it travels as an [`Interrupt`] inside [`Halt`], so the loop driver can tell
//! a clean unwind from a genuine failure without inspecting messages.

use std::backtrace::Backtrace;

use thiserror::Error;

/// The top-level error type for all ShadowBot operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Transport errors ---
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // --- Game protocol errors ---
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Filesystem ---
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Identify failed for {nick}: {reason}")]
    IdentifyFailed { nick: String, reason: String },

    #[error("Scripted transcript exhausted after {consumed} lines")]
    ScriptExhausted { consumed: usize },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Could not parse {kind} from \"{line}\"")]
    Unparsable { kind: &'static str, line: String },

    #[error("Gave up travelling to {target} after {attempts} attempts")]
    TravelGaveUp { target: String, attempts: u32 },

    #[error("No arrival marker known for {0}")]
    UnknownLocation(String),

    #[error("Location token {0} has no city prefix")]
    MissingCity(String),
}

/// A control-flow signal that unwinds a behavior back to the loop driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The operator asked the worker to quit.
    UserQuit,
    /// The game reported that our character died.
    PlayerDied,
    /// The escorted companion asked us to stop what we are doing.
    EscortStop,
}

impl std::fmt::Display for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interrupt::UserQuit => write!(f, "user quit"),
            Interrupt::PlayerDied => write!(f, "player died"),
            Interrupt::EscortStop => write!(f, "escorted player stop"),
        }
    }
}

/// A failure together with the stack where it was raised.
#[derive(Debug)]
pub struct Failure {
    pub error: Error,
    pub backtrace: Backtrace,
}

impl Failure {
    /// Wrap `error`, capturing the current stack regardless of
    /// `RUST_BACKTRACE`.
    pub fn new(error: Error) -> Self {
        Self {
            error,
            backtrace: Backtrace::force_capture(),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

/// Why a component stopped before producing its value.
#[derive(Debug)]
pub enum Halt {
    /// A control-flow signal, not a failure.
    Interrupted(Interrupt),
    /// A genuine failure that the loop driver records.
    Failed(Failure),
}

impl Halt {
    /// The interrupt carried by this halt, if any.
    pub fn interrupt(&self) -> Option<Interrupt> {
        match self {
            Halt::Interrupted(i) => Some(*i),
            Halt::Failed(_) => None,
        }
    }
}

impl std::fmt::Display for Halt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Halt::Interrupted(i) => write!(f, "interrupted: {i}"),
            Halt::Failed(failure) => write!(f, "{failure}"),
        }
    }
}

impl From<Interrupt> for Halt {
    fn from(i: Interrupt) -> Self {
        Halt::Interrupted(i)
    }
}

impl From<Error> for Halt {
    fn from(e: Error) -> Self {
        Halt::Failed(Failure::new(e))
    }
}

impl From<TransportError> for Halt {
    fn from(e: TransportError) -> Self {
        Error::Transport(e).into()
    }
}

impl From<ProtocolError> for Halt {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e).into()
    }
}

impl From<std::io::Error> for Halt {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e).into()
    }
}

/// Result type for anything that talks to the game and may be interrupted.
pub type Flow<T> = std::result::Result<T, Halt>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_displays_correctly() {
        let err = Error::Transport(TransportError::IdentifyFailed {
            nick: "shadowbot".into(),
            reason: "bad password".into(),
        });
        assert!(err.to_string().contains("shadowbot"));
        assert!(err.to_string().contains("bad password"));
    }

    #[test]
    fn halt_separates_interrupts_from_failures() {
        let halt: Halt = Interrupt::PlayerDied.into();
        assert_eq!(halt.interrupt(), Some(Interrupt::PlayerDied));

        let halt: Halt = ProtocolError::UnknownLocation("Nowhere".into()).into();
        assert!(halt.interrupt().is_none());
        assert!(halt.to_string().contains("Nowhere"));
    }

    #[test]
    fn failures_carry_the_raising_stack() {
        let halt: Halt = Error::Internal("boom".into()).into();
        let Halt::Failed(failure) = halt else {
            panic!("expected a failure");
        };
        assert_eq!(
            failure.backtrace.status(),
            std::backtrace::BacktraceStatus::Captured
        );
        assert_eq!(failure.to_string(), "Internal error: boom");
    }

    #[test]
    fn interrupt_display() {
        assert_eq!(Interrupt::EscortStop.to_string(), "escorted player stop");
    }
}
