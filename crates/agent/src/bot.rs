//! The worker context shared by every component.
//!
//! A [`Bot`] owns the transport, the session and the worker side of the
//! control channel. The waiter, combat engine, navigator, inventory flusher,
//! behaviors and the loop driver are all `impl Bot` blocks in their own
//! modules, so they can call each other freely without passing half a dozen
//! references around.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use shadowbot_config::{AppConfig, Disposal, PreCommand};
use shadowbot_core::{
    BotEvent, ControlReceiver, EventBus, Flow, Interrupt, Session, Transport, Tunables,
};
use tokio::time::Instant;
use tracing::info;

use crate::crash_log::CrashLog;
use crate::escort::Denylist;

/// Fixed timings and static settings of the worker.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bound on each receive while awaiting a response
    pub response_timeout: Duration,
    /// Bound on each receive during combat
    pub combat_timeout: Duration,
    /// Bound on each receive while idle
    pub idle_timeout: Duration,
    /// Sleep between behavior iterations
    pub iteration_pause: Duration,
    /// Pause after greeting a citizen, to let them answer
    pub meet_pause: Duration,
    /// How far past a deadline a wait may run before giving up
    pub deadline_grace: Duration,
    /// Added to a subway corridor's remaining time before re-polling
    pub subway_margin: Duration,
    pub calm_cooldown: Duration,
    pub max_travel_attempts: u32,
    pub quest_target: String,
    pub explore_start: String,
    pub disposal: Disposal,
    pub flush_every: u32,
    pub sell_denylist: Vec<String>,
    pub escort_denylist: Denylist,
    pub pre_commands: Vec<PreCommand>,
}

impl Settings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            response_timeout: Duration::from_secs(config.game.response_timeout_secs),
            combat_timeout: Duration::from_secs(config.game.combat_timeout_secs),
            idle_timeout: Duration::from_secs(30),
            iteration_pause: Duration::from_secs(3),
            meet_pause: Duration::from_secs(5),
            deadline_grace: Duration::from_secs(60),
            subway_margin: Duration::from_secs(15),
            calm_cooldown: Duration::from_secs(config.game.calm_cooldown_secs),
            max_travel_attempts: config.game.max_travel_attempts,
            quest_target: config.game.quest_target.clone(),
            explore_start: config.game.explore_start.clone(),
            disposal: config.inventory.disposal,
            flush_every: config.inventory.flush_every,
            sell_denylist: config.inventory.sell_denylist.clone(),
            escort_denylist: Denylist::new(config.escort.denylist.clone()),
            pre_commands: config.pre_commands.clone(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// The game worker.
pub struct Bot {
    pub(crate) transport: Box<dyn Transport>,
    pub session: Session,
    pub(crate) control: ControlReceiver,
    pub(crate) events: Arc<EventBus>,
    pub(crate) settings: Settings,
    pub(crate) crash_log: Option<CrashLog>,

    /// When calm was last cast, for the cooldown.
    pub(crate) last_calm: Option<Instant>,
    /// Companion commands received while busy with something else.
    pub(crate) companion_queue: VecDeque<String>,
    /// Last remaining-seconds value reported by a deadline wait.
    pub(crate) last_report: Option<i64>,
    /// Tunables as last taken from the control channel.
    pub(crate) applied_tunables: Tunables,
}

impl Bot {
    pub fn new(
        transport: Box<dyn Transport>,
        session: Session,
        control: ControlReceiver,
        events: Arc<EventBus>,
        settings: Settings,
    ) -> Self {
        let applied_tunables = session.tunables.clone();
        Self {
            transport,
            session,
            control,
            events,
            settings,
            crash_log: None,
            last_calm: None,
            companion_queue: VecDeque::new(),
            last_report: None,
            applied_tunables,
        }
    }

    /// Build a worker from the loaded configuration.
    pub fn from_config(
        config: &AppConfig,
        transport: Box<dyn Transport>,
        control: ControlReceiver,
        events: Arc<EventBus>,
    ) -> Self {
        let session = Session::new(&config.game.intermediary, transport.nick())
            .with_shard(config.game.shard)
            .with_companion(config.escort.companion.clone())
            .with_tunables(config.tunables());

        Self::new(
            transport,
            session,
            control,
            events,
            Settings::from_config(config),
        )
        .with_crash_log(CrashLog::new(config.crash_log_path()))
    }

    /// Record iteration failures to this log.
    pub fn with_crash_log(mut self, log: CrashLog) -> Self {
        self.crash_log = Some(log);
        self
    }

    /// Send a game command to the intermediary.
    pub(crate) async fn command(&mut self, text: &str) -> Flow<()> {
        info!(command = %text, "-> {}", self.session.intermediary);
        let target = self.session.intermediary.clone();
        self.transport.privmsg(&target, text).await?;
        Ok(())
    }

    /// Send a message to the escorted companion, if there is one.
    pub(crate) async fn tell_companion(&mut self, text: &str) -> Flow<()> {
        if let Some(companion) = self.session.companion.clone() {
            self.transport.privmsg(&companion, text).await?;
        }
        Ok(())
    }

    /// Receive one line. Quit is checked once the wait is over.
    pub(crate) async fn receive(&mut self, timeout: Duration) -> Flow<Option<String>> {
        let line = self.transport.receive(timeout).await?;
        self.check_quit()?;
        Ok(line)
    }

    /// A scripted pause. Quit is checked once it is over.
    pub(crate) async fn pause(&mut self, duration: Duration) -> Flow<()> {
        tokio::time::sleep(duration).await;
        self.check_quit()
    }

    pub(crate) fn check_quit(&self) -> Flow<()> {
        if self.control.quit_requested() {
            return Err(Interrupt::UserQuit.into());
        }
        Ok(())
    }

    pub(crate) fn publish(&self, event: BotEvent) {
        self.events.publish(event);
    }
}
