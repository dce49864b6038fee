//! Session state — the single long-lived actor state of the worker.
//!
//! Created once at startup and mutated by every component; nothing in here is
//! persisted across restarts.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::control::{Behavior, Tunables};

/// The most recently announced "time remaining" forecast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeadline {
    pub at: Instant,
    pub label: String,
}

impl PendingDeadline {
    /// A deadline `secs` seconds from now.
    pub fn in_secs(secs: u64, label: impl Into<String>) -> Self {
        Self {
            at: Instant::now() + Duration::from_secs(secs),
            label: label.into(),
        }
    }

    /// Signed whole seconds until the deadline (negative once past).
    pub fn remaining_secs(&self) -> i64 {
        let now = Instant::now();
        if self.at >= now {
            (self.at - now).as_secs() as i64
        } else {
            -((now - self.at).as_secs() as i64)
        }
    }
}

/// Loot accumulated since the session started.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LootTally {
    pub nuyen: f64,
    pub xp: f64,
    pub kills: u32,
    pub items: BTreeMap<String, u32>,
}

impl LootTally {
    pub fn add_item(&mut self, name: &str, count: u32) {
        *self.items.entry(name.to_string()).or_insert(0) += count;
    }

    /// One-line human summary, e.g. `"3 kills, 42.50 nuyen, 7.10 XP, Bacon x2"`.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} kills, {:.2} nuyen, {:.2} XP",
            self.kills, self.nuyen, self.xp
        );
        for (name, count) in &self.items {
            out.push_str(&format!(", {name} x{count}"));
        }
        out
    }
}

/// Flags driven by the escorted companion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscortState {
    /// The companion said "stop" while we were fighting.
    pub deferred_stop: bool,
    /// The companion said "ready".
    pub companion_ready: bool,
    /// A combat episode is in progress.
    pub in_combat: bool,
}

/// The worker's session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Nick of the intermediary game bot.
    pub intermediary: String,
    /// Our own IRC nick.
    pub nick: String,
    /// Server tag the game appends to player names, e.g. `{2}`.
    pub shard: Option<u32>,
    /// Nick of the escorted companion, if escorting.
    pub companion: Option<String>,
    /// The behavior currently running (`None` = idle).
    pub behavior: Option<Behavior>,
    pub tunables: Tunables,
    pub loot: LootTally,
    pub pending: Option<PendingDeadline>,
    pub escort: EscortState,
}

impl Session {
    pub fn new(intermediary: impl Into<String>, nick: impl Into<String>) -> Self {
        Self {
            intermediary: intermediary.into(),
            nick: nick.into(),
            shard: None,
            companion: None,
            behavior: None,
            tunables: Tunables::default(),
            loot: LootTally::default(),
            pending: None,
            escort: EscortState::default(),
        }
    }

    pub fn with_shard(mut self, shard: Option<u32>) -> Self {
        self.shard = shard;
        self
    }

    pub fn with_companion(mut self, companion: Option<String>) -> Self {
        self.companion = companion;
        self
    }

    pub fn with_tunables(mut self, tunables: Tunables) -> Self {
        self.tunables = tunables;
        self
    }

    /// Our name as the game prints it, e.g. `shadowbot{2}`.
    pub fn display_name(&self) -> String {
        match self.shard {
            Some(shard) => format!("{}{{{}}}", self.nick, shard),
            None => self.nick.clone(),
        }
    }

    /// Whether `name` (as printed by the game) is us.
    pub fn is_self(&self, name: &str) -> bool {
        match self.shard {
            Some(_) => name == self.display_name(),
            None => {
                name == self.nick
                    || name
                        .strip_prefix(self.nick.as_str())
                        .is_some_and(|rest| rest.starts_with('{'))
            }
        }
    }

    /// Replace the pending deadline.
    pub fn set_deadline(&mut self, secs: u64, label: impl Into<String>) {
        self.pending = Some(PendingDeadline::in_secs(secs, label));
    }

    /// Whether we are escorting someone right now.
    pub fn escorting(&self) -> bool {
        self.behavior == Some(Behavior::Escort) && self.companion.is_some()
    }
}
