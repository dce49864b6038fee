//! The game worker — the heart of ShadowBot.
//!
//! The worker follows a **Classify → Wait → React** cycle:
//!
//! 1. **Receive** a line from the transport (bounded by a timeout)
//! 2. **Classify** it: intermediary, escorted companion, or noise
//! 3. **Match** it against what the current step is waiting for
//! 4. **If it is something else**: answer greetings, fight encounters, note
//!    timing announcements, then keep waiting
//! 5. **Once the awaited line arrives**: continue the behavior
//!
//! Behaviors run one iteration at a time under the loop driver until the
//! operator selects something else or quits.

pub mod behaviors;
pub mod bot;
pub mod classifier;
pub mod combat;
pub mod crash_log;
pub mod driver;
pub mod escort;
pub mod grammar;
pub mod inventory;
pub mod navigator;
pub mod waiter;

#[cfg(test)]
mod test_helpers;

pub use bot::{Bot, Settings};
pub use classifier::{Classified, classify, classify_any};
pub use combat::{Care, Roster, TargetPolicy, choose_care};
pub use crash_log::{CrashEntry, CrashLog};
pub use driver::{IterationOutcome, StopReason};
pub use escort::{DenyCheck, Denylist, EscortCommand};
pub use navigator::{Arrival, arrival_marker, city_of, travel_line};
