//! Loop driver — the worker's outer loop.
//!
//! While idle the worker keeps the connection serviced. Once the operator
//! selects a behavior it runs one iteration after another, with the
//! pre-iteration commands before each and a short pause after. A failed
//! iteration is written to the crash log and the worker goes back to idle
//! until the operator makes a new selection.

use chrono::Utc;
use shadowbot_config::PreCommand;
use shadowbot_core::{
    Behavior, BotEvent, ControlSignals, Error, Failure, Flow, Halt, Interrupt, Result,
};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::bot::Bot;
use crate::crash_log::CrashEntry;

/// How one behavior iteration ended.
#[derive(Debug)]
pub enum IterationOutcome {
    Continue,
    QuitRequested,
    PlayerDied,
    EscortStopRequested,
    Failed(Failure),
}

impl From<Flow<()>> for IterationOutcome {
    fn from(flow: Flow<()>) -> Self {
        match flow {
            Ok(()) => IterationOutcome::Continue,
            Err(Halt::Interrupted(Interrupt::UserQuit)) => IterationOutcome::QuitRequested,
            Err(Halt::Interrupted(Interrupt::PlayerDied)) => IterationOutcome::PlayerDied,
            Err(Halt::Interrupted(Interrupt::EscortStop)) => IterationOutcome::EscortStopRequested,
            Err(Halt::Failed(e)) => IterationOutcome::Failed(e),
        }
    }
}

/// Why the worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    UserQuit,
    SoftQuit,
    PlayerDied,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::UserQuit => write!(f, "operator quit"),
            StopReason::SoftQuit => write!(f, "operator soft quit"),
            StopReason::PlayerDied => write!(f, "player died"),
        }
    }
}

/// How a run of the selected behavior ended.
enum RunEnd {
    /// The operator picked something else
    Deselected,
    /// An iteration failed; stay idle until a new selection
    Failed,
    Stop(StopReason),
}

impl Bot {
    /// Run the worker until the operator quits, the character dies or the
    /// transport fails.
    pub async fn run(&mut self) -> Result<StopReason> {
        info!(nick = %self.session.display_name(), transport = self.transport.name(), "Worker started");
        let mut failed_selection: Option<u64> = None;

        let result = loop {
            let signals = self.take_signals();
            if signals.quit {
                break Ok(StopReason::UserQuit);
            }
            if signals.soft_quit {
                break Ok(StopReason::SoftQuit);
            }
            if let Err(Halt::Failed(failure)) = self.drain_outbox().await {
                break Err(failure.error);
            }

            match signals.behavior {
                Some(behavior) if failed_selection != Some(signals.selection) => {
                    failed_selection = None;
                    match self.run_selected(behavior, signals.selection).await {
                        RunEnd::Deselected => {}
                        RunEnd::Failed => failed_selection = Some(signals.selection),
                        RunEnd::Stop(reason) => break Ok(reason),
                    }
                }
                _ => match self.idle_tick().await {
                    Ok(None) => {}
                    Ok(Some(reason)) => break Ok(reason),
                    Err(e) => break Err(e),
                },
            }
        };

        let reason = match &result {
            Ok(reason) => reason.to_string(),
            Err(e) => e.to_string(),
        };
        info!(%reason, "Worker stopped");
        self.publish(BotEvent::WorkerStopped {
            reason,
            timestamp: Utc::now(),
        });
        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "Failed to close transport");
        }
        result
    }

    /// Run `behavior` until it is deselected, fails or the worker stops.
    async fn run_selected(&mut self, behavior: Behavior, selection: u64) -> RunEnd {
        info!(%behavior, "Behavior started");
        self.session.behavior = Some(behavior);
        self.publish(BotEvent::BehaviorStarted {
            behavior,
            timestamp: Utc::now(),
        });

        let mut iteration: u64 = 0;
        let end = loop {
            let signals = self.take_signals();
            if signals.quit {
                break RunEnd::Stop(StopReason::UserQuit);
            }
            if signals.soft_quit {
                break RunEnd::Stop(StopReason::SoftQuit);
            }
            if signals.behavior != Some(behavior) || signals.selection != selection {
                break RunEnd::Deselected;
            }

            let started = Instant::now();
            let flow = self.iteration(behavior, iteration).await;
            match IterationOutcome::from(flow) {
                IterationOutcome::Continue => {}
                IterationOutcome::QuitRequested => break RunEnd::Stop(StopReason::UserQuit),
                IterationOutcome::PlayerDied => {
                    error!(%behavior, iteration, "Character died");
                    break RunEnd::Stop(StopReason::PlayerDied);
                }
                IterationOutcome::EscortStopRequested => {
                    info!(iteration, "Companion asked us to stop");
                    self.session.escort.deferred_stop = false;
                    self.companion_queue.clear();
                    if let Err(halt) = self.tell_companion("Stopped.").await {
                        warn!(error = %halt, "Could not answer the companion");
                    }
                }
                IterationOutcome::Failed(failure) => {
                    self.record_failure(behavior, iteration, started, &failure);
                    break RunEnd::Failed;
                }
            }
            iteration += 1;

            if self.control.signals.borrow().soft_quit {
                break RunEnd::Stop(StopReason::SoftQuit);
            }
            if let Err(halt) = self.pause(self.settings.iteration_pause).await {
                debug!(%halt, "Pause interrupted");
                break RunEnd::Stop(StopReason::UserQuit);
            }
        };

        let reason = match &end {
            RunEnd::Deselected => "selection changed".to_string(),
            RunEnd::Failed => "iteration failed".to_string(),
            RunEnd::Stop(reason) => reason.to_string(),
        };
        info!(%behavior, iterations = iteration, %reason, "Behavior stopped");
        self.session.behavior = None;
        self.publish(BotEvent::BehaviorStopped {
            behavior,
            iterations: iteration,
            reason,
            timestamp: Utc::now(),
        });
        end
    }

    /// Pre-iteration commands, queued operator messages, then the behavior.
    async fn iteration(&mut self, behavior: Behavior, iteration: u64) -> Flow<()> {
        self.drain_outbox().await?;
        for pre in self.settings.pre_commands.clone() {
            match pre {
                PreCommand::Command { text } => self.command(&text).await?,
                PreCommand::Pause { seconds } => {
                    self.pause(std::time::Duration::from_secs(seconds)).await?
                }
                PreCommand::Message { target, text } => {
                    self.transport.privmsg(&target, &text).await?
                }
            }
        }
        self.run_behavior(behavior, iteration).await
    }

    /// One bounded receive while no behavior runs.
    async fn idle_tick(&mut self) -> Result<Option<StopReason>> {
        match IterationOutcome::from(self.idle_receive().await) {
            IterationOutcome::Continue | IterationOutcome::EscortStopRequested => Ok(None),
            IterationOutcome::QuitRequested => Ok(Some(StopReason::UserQuit)),
            IterationOutcome::PlayerDied => Ok(Some(StopReason::PlayerDied)),
            IterationOutcome::Failed(Failure {
                error: Error::Transport(e),
                ..
            }) => Err(Error::Transport(e)),
            IterationOutcome::Failed(failure) => {
                warn!(error = %failure, "Failure while idle");
                Ok(None)
            }
        }
    }

    async fn idle_receive(&mut self) -> Flow<()> {
        let Some(raw) = self.receive(self.settings.idle_timeout).await? else {
            return Ok(());
        };
        if let Some(payload) = self.intake(&raw).await? {
            self.interleaved(payload).await?;
        }
        Ok(())
    }

    /// Take the latest operator signals and apply edited tunables.
    fn take_signals(&mut self) -> ControlSignals {
        let signals = self.control.snapshot();
        if signals.tunables != self.applied_tunables {
            info!(tunables = ?signals.tunables, "Tunables updated");
            self.session
                .tunables
                .apply_edits(&self.applied_tunables, &signals.tunables);
            self.applied_tunables = signals.tunables.clone();
        }
        signals
    }

    /// Send everything the operator queued.
    async fn drain_outbox(&mut self) -> Flow<()> {
        while let Some(message) = self.control.next_outgoing() {
            info!(target = %message.target, text = %message.text, "Operator message");
            self.transport
                .privmsg(&message.target, &message.text)
                .await?;
        }
        Ok(())
    }

    fn record_failure(
        &self,
        behavior: Behavior,
        iteration: u64,
        started: Instant,
        failure: &Failure,
    ) {
        let e = &failure.error;
        let elapsed = started.elapsed();
        error!(%behavior, iteration, error = %e, "Iteration failed");

        if let Some(log) = &self.crash_log {
            let entry = CrashEntry {
                timestamp: Utc::now(),
                behavior,
                iteration,
                elapsed,
                error: e,
                backtrace: &failure.backtrace,
            };
            if let Err(io) = log.record(&entry) {
                warn!(path = %log.path().display(), error = %io, "Could not write crash log");
            }
        }

        self.publish(BotEvent::IterationFailed {
            behavior,
            iteration,
            error_message: e.to_string(),
            elapsed_ms: elapsed.as_millis() as u64,
            timestamp: Utc::now(),
        });
    }
}
