//! Control signals — how the operator steers the worker.
//!
//! The operator console never touches worker state directly. Every edit is
//! published as a whole [`ControlSignals`] value through a `tokio::sync::watch`
//! channel, and the worker picks it up at safe points (iteration boundaries,
//! and after each receive for the quit flag). Free-form messages the operator
//! wants sent go through a small outbox queue that the worker drains.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

/// The behaviors the loop driver can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Farm the FatOrk in the Redmond OrkHQ storage room for bacon.
    GetBacon,
    /// Explore the current city and flush the inventory periodically.
    Explore,
    /// Follow remote commands from the escorted companion.
    Escort,
}

impl Behavior {
    /// Every selectable behavior, in menu order.
    pub const ALL: [Behavior; 3] = [Behavior::GetBacon, Behavior::Explore, Behavior::Escort];

    pub fn as_str(&self) -> &'static str {
        match self {
            Behavior::GetBacon => "getbacon",
            Behavior::Explore => "explore",
            Behavior::Escort => "escort",
        }
    }
}

impl std::fmt::Display for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Behavior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "getbacon" | "bacon" => Ok(Behavior::GetBacon),
            "explore" => Ok(Behavior::Explore),
            "escort" => Ok(Behavior::Escort),
            other => Err(format!(
                "unknown behavior '{other}' (available: getbacon, explore, escort)"
            )),
        }
    }
}

/// How ties between equally ranked enemies are broken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Smallest absolute distance from the centre of the battlefield.
    #[default]
    Absolute,
    /// Smallest signed position.
    Raw,
    /// Smallest distance from our own tracked position.
    FromSelf,
}

/// Values the operator may change while the worker runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Tunables {
    /// Keep fewer than this many inventory items; non-positive disables flushing.
    pub retention_threshold: i32,
    /// Phrase said to citizens met on the street.
    pub meet_say: Option<String>,
    /// Remaining quest kills for the quest target.
    pub quest_quota: u32,
    /// Attack the highest level enemy first instead of the lowest.
    pub inverse_priority: bool,
    /// Whether heal/calm spells may be cast.
    pub can_cast: bool,
    pub tie_break: TieBreak,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            retention_threshold: 0,
            meet_say: Some("shadowrun".into()),
            quest_quota: 0,
            inverse_priority: false,
            can_cast: false,
            tie_break: TieBreak::Absolute,
        }
    }
}

impl Tunables {
    /// Apply only the fields the operator changed between `before` and
    /// `after`, leaving values the worker advanced itself untouched.
    pub fn apply_edits(&mut self, before: &Tunables, after: &Tunables) {
        if before.retention_threshold != after.retention_threshold {
            self.retention_threshold = after.retention_threshold;
        }
        if before.meet_say != after.meet_say {
            self.meet_say = after.meet_say.clone();
        }
        if before.quest_quota != after.quest_quota {
            self.quest_quota = after.quest_quota;
        }
        if before.inverse_priority != after.inverse_priority {
            self.inverse_priority = after.inverse_priority;
        }
        if before.can_cast != after.can_cast {
            self.can_cast = after.can_cast;
        }
        if before.tie_break != after.tie_break {
            self.tie_break = after.tie_break;
        }
    }
}

/// The complete set of operator signals, replaced atomically on every edit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlSignals {
    /// The behavior the operator wants running, `None` for idle.
    pub behavior: Option<Behavior>,
    /// Bumped on every behavior selection so the worker can tell a fresh
    /// selection from the one that already failed.
    pub selection: u64,
    /// Abort at the next suspension point.
    pub quit: bool,
    /// Finish the current iteration, then stop.
    pub soft_quit: bool,
    pub tunables: Tunables,
}

/// A message the operator asked the worker to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub target: String,
    pub text: String,
}

/// Operator side of the control channel.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    signals: watch::Sender<ControlSignals>,
    outbox: mpsc::Sender<OutgoingMessage>,
}

/// Worker side of the control channel.
#[derive(Debug)]
pub struct ControlReceiver {
    pub signals: watch::Receiver<ControlSignals>,
    pub outbox: mpsc::Receiver<OutgoingMessage>,
}

/// Create a linked operator handle and worker receiver.
pub fn control_channel(initial: ControlSignals) -> (ControlHandle, ControlReceiver) {
    let (signals_tx, signals_rx) = watch::channel(initial);
    let (outbox_tx, outbox_rx) = mpsc::channel(32);
    (
        ControlHandle {
            signals: signals_tx,
            outbox: outbox_tx,
        },
        ControlReceiver {
            signals: signals_rx,
            outbox: outbox_rx,
        },
    )
}

impl ControlHandle {
    /// Select a behavior (or `None` for idle).
    pub fn select_behavior(&self, behavior: Option<Behavior>) {
        self.signals.send_modify(|s| {
            s.behavior = behavior;
            s.selection += 1;
        });
    }

    /// Abort at the next suspension point.
    pub fn request_quit(&self) {
        self.signals.send_modify(|s| {
            s.behavior = None;
            s.quit = true;
        });
    }

    /// Stop after the current iteration completes.
    pub fn request_soft_quit(&self) {
        self.signals.send_modify(|s| s.soft_quit = true);
    }

    /// Edit the tunables in place.
    pub fn update_tunables(&self, edit: impl FnOnce(&mut Tunables)) {
        self.signals.send_modify(|s| edit(&mut s.tunables));
    }

    /// Queue a message for the worker to send.
    pub async fn send_message(&self, target: impl Into<String>, text: impl Into<String>) -> bool {
        self.outbox
            .send(OutgoingMessage {
                target: target.into(),
                text: text.into(),
            })
            .await
            .is_ok()
    }

    /// Snapshot of the current signals.
    pub fn current(&self) -> ControlSignals {
        self.signals.borrow().clone()
    }
}

impl ControlReceiver {
    /// Whether the operator has asked for an immediate quit.
    pub fn quit_requested(&self) -> bool {
        self.signals.borrow().quit
    }

    /// Take the latest signals, marking them seen.
    pub fn snapshot(&mut self) -> ControlSignals {
        self.signals.borrow_and_update().clone()
    }

    /// Pop one queued operator message without waiting.
    pub fn next_outgoing(&mut self) -> Option<OutgoingMessage> {
        self.outbox.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn behavior_parses_loose_spellings() {
        assert_eq!("getbacon".parse::<Behavior>(), Ok(Behavior::GetBacon));
        assert_eq!("Get_Bacon".parse::<Behavior>(), Ok(Behavior::GetBacon));
        assert_eq!(" escort ".parse::<Behavior>(), Ok(Behavior::Escort));
        assert!("printloop".parse::<Behavior>().is_err());
    }

    #[test]
    fn selection_counter_advances() {
        let (handle, mut rx) = control_channel(ControlSignals::default());
        handle.select_behavior(Some(Behavior::Explore));
        handle.select_behavior(Some(Behavior::Explore));
        let s = rx.snapshot();
        assert_eq!(s.behavior, Some(Behavior::Explore));
        assert_eq!(s.selection, 2);
    }

    #[test]
    fn only_edited_tunables_are_applied() {
        let before = Tunables {
            quest_quota: 5,
            ..Tunables::default()
        };
        let after = Tunables {
            retention_threshold: 7,
            ..before.clone()
        };
        let mut live = Tunables {
            quest_quota: 3,
            ..before.clone()
        };

        live.apply_edits(&before, &after);
        assert_eq!(live.retention_threshold, 7);
        assert_eq!(live.quest_quota, 3);

        let reset = Tunables {
            quest_quota: 10,
            ..after.clone()
        };
        live.apply_edits(&after, &reset);
        assert_eq!(live.quest_quota, 10);
    }

    #[test]
    fn quit_clears_behavior() {
        let (handle, rx) = control_channel(ControlSignals::default());
        handle.select_behavior(Some(Behavior::GetBacon));
        handle.request_quit();
        assert!(rx.quit_requested());
        assert_eq!(handle.current().behavior, None);
    }

    #[test]
    fn tunables_edit_in_place() {
        let (handle, mut rx) = control_channel(ControlSignals::default());
        handle.update_tunables(|t| t.retention_threshold = 12);
        assert_eq!(rx.snapshot().tunables.retention_threshold, 12);
    }

    #[tokio::test]
    async fn outbox_delivers_messages() {
        let (handle, mut rx) = control_channel(ControlSignals::default());
        assert!(handle.send_message("Lamb3", "#party").await);
        assert_eq!(
            rx.next_outgoing(),
            Some(OutgoingMessage {
                target: "Lamb3".into(),
                text: "#party".into()
            })
        );
        assert!(rx.next_outgoing().is_none());
    }
}
