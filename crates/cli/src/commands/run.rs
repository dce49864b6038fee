//! `shadowbot run` — connect, start the worker and read operator commands.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use shadowbot_agent::Bot;
use shadowbot_channels::IrcTransport;
use shadowbot_core::{Behavior, BotEvent, ControlSignals, EventBus, control_channel};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{error, info};

use super::console::{ConsoleCommand, HELP};

pub async fn run(
    explicit: Option<&Path>,
    behavior: Option<Behavior>,
    json_events: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(explicit)?;
    let intermediary = config.game.intermediary.clone();

    println!();
    println!("  ShadowBot");
    println!("  Server:        {}:{}", config.irc.server, config.irc.port);
    println!("  Nick:          {}", config.irc.nick);
    println!("  Intermediary:  {intermediary}");
    println!();

    let transport = IrcTransport::connect(&config.irc)
        .await
        .map_err(|e| format!("Could not connect: {e}"))?;
    info!(server = %config.irc.server, "Connected and identified");

    let initial = ControlSignals {
        behavior,
        selection: u64::from(behavior.is_some()),
        tunables: config.tunables(),
        ..ControlSignals::default()
    };
    let (handle, control) = control_channel(initial);
    let events = Arc::new(EventBus::default());

    let mut bot = Bot::from_config(&config, Box::new(transport), control, events.clone());
    let worker = tokio::spawn(async move { bot.run().await });

    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if json_events {
                if let Ok(line) = serde_json::to_string(&*event) {
                    println!("{line}");
                }
            } else {
                println!("  * {}", narrate(&event));
            }
        }
    });

    println!("  Type 'help' for commands.");
    println!();

    let console_handle = handle.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(io::stdin()).lines();
        prompt();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                prompt();
                continue;
            }
            match line.parse::<ConsoleCommand>() {
                Ok(command) => {
                    let quitting = command == ConsoleCommand::Quit;
                    let reply = command.apply(&console_handle, &intermediary).await;
                    println!("  {reply}");
                    if quitting {
                        break;
                    }
                }
                Err(e) => println!("  {e}\n{HELP}"),
            }
            prompt();
        }
    });

    let stopped = worker.await?;
    match stopped {
        Ok(reason) => println!("\n  Stopped: {reason}\n"),
        Err(e) => {
            error!(error = %e, "Worker failed");
            return Err(e.into());
        }
    }

    Ok(())
}

fn prompt() {
    print!("  > ");
    let _ = std::io::stdout().flush();
}

/// One human-readable line per event.
fn narrate(event: &BotEvent) -> String {
    match event {
        BotEvent::BehaviorStarted { behavior, .. } => format!("started {behavior}"),
        BotEvent::BehaviorStopped {
            behavior,
            iterations,
            reason,
            ..
        } => format!("{behavior} stopped after {iterations} iterations ({reason})"),
        BotEvent::IterationFailed {
            behavior,
            iteration,
            error_message,
            ..
        } => format!("{behavior} iteration {iteration} failed: {error_message}"),
        BotEvent::CombatConcluded {
            kills, duration_ms, ..
        } => format!("combat over: {kills} kills in {}s", duration_ms / 1000),
        BotEvent::QuestKill {
            target, remaining, ..
        } => format!("quest kill: {target}, {remaining} left"),
        BotEvent::Arrived { location, .. } => format!("arrived at {location}"),
        BotEvent::LootGained { description, .. } => format!("loot: {description}"),
        BotEvent::WorkerStopped { reason, .. } => format!("worker stopped: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn narration_lines() {
        let line = narrate(&BotEvent::BehaviorStopped {
            behavior: Behavior::Explore,
            iterations: 4,
            reason: "selection changed".into(),
            timestamp: Utc::now(),
        });
        assert_eq!(line, "explore stopped after 4 iterations (selection changed)");

        let line = narrate(&BotEvent::CombatConcluded {
            kills: 3,
            duration_ms: 42_500,
            timestamp: Utc::now(),
        });
        assert_eq!(line, "combat over: 3 kills in 42s");

        let line = narrate(&BotEvent::QuestKill {
            target: "Bum".into(),
            remaining: 4,
            timestamp: Utc::now(),
        });
        assert_eq!(line, "quest kill: Bum, 4 left");
    }
}
