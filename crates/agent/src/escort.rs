//! Escort coordinator — take orders from the player we are escorting.
//!
//! `stop` and `ready` are acted on the moment they arrive (see
//! [`Bot::intake`]); everything else the companion says is queued and run
//! here, one command per behavior iteration.

use shadowbot_core::Flow;
use tracing::{debug, info, warn};

use crate::bot::Bot;

/// Result of checking a relayed command against the denylist.
#[derive(Debug, Clone, PartialEq)]
pub enum DenyCheck {
    Allowed,
    Denied { verb: String, reason: String },
}

/// Game verbs the companion may not have us run.
#[derive(Debug, Clone, Default)]
pub struct Denylist {
    verbs: Vec<String>,
}

impl Denylist {
    pub fn new(verbs: Vec<String>) -> Self {
        Self {
            verbs: verbs
                .into_iter()
                .map(|v| v.trim().trim_start_matches('#').to_ascii_lowercase())
                .filter(|v| !v.is_empty())
                .collect(),
        }
    }

    /// Check a `#verb args...` command.
    ///
    /// An empty list allows everything; `*` denies everything.
    pub fn check(&self, command: &str) -> DenyCheck {
        let verb = command
            .trim()
            .trim_start_matches('#')
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        if self.verbs.iter().any(|v| v == "*") {
            return DenyCheck::Denied {
                verb,
                reason: "Relaying is disabled".into(),
            };
        }

        if self.verbs.iter().any(|v| *v == verb) {
            DenyCheck::Denied {
                reason: format!("#{verb} is not allowed while escorting"),
                verb,
            }
        } else {
            DenyCheck::Allowed
        }
    }
}

/// A queued companion command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscortCommand {
    Goto(String),
    Flush,
    Loot,
    /// A game command to relay verbatim
    Relay(String),
    Unknown(String),
}

impl EscortCommand {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.starts_with('#') {
            return EscortCommand::Relay(text.to_string());
        }

        let (word, rest) = text.split_once(' ').unwrap_or((text, ""));
        match (word.to_ascii_lowercase().as_str(), rest.trim()) {
            ("goto", loc) if !loc.is_empty() => EscortCommand::Goto(loc.to_string()),
            ("flush", _) => EscortCommand::Flush,
            ("loot", _) => EscortCommand::Loot,
            _ => EscortCommand::Unknown(text.to_string()),
        }
    }
}

impl Bot {
    /// One escort iteration: run the next companion command, or wait a while
    /// for one to arrive.
    pub async fn escort_step(&mut self, iteration: u64) -> Flow<()> {
        if iteration == 0 {
            let name = self.session.display_name();
            self.tell_companion(&format!(
                "{name} is escorting you. Say goto <location>, flush, loot, #<command> or stop."
            ))
            .await?;
        }

        let Some(text) = self.next_companion_command().await? else {
            return Ok(());
        };
        let command = EscortCommand::parse(&text);
        info!(?command, "Companion command");

        match command {
            EscortCommand::Goto(location) => {
                self.goto_location(&location).await?;
                self.tell_companion(&format!("We are at {location}")).await
            }
            EscortCommand::Flush => {
                let disposed = self.flush(self.settings.disposal).await?;
                self.tell_companion(&format!("Disposed of {disposed} items"))
                    .await
            }
            EscortCommand::Loot => {
                let summary = self.session.loot.summary();
                self.tell_companion(&summary).await
            }
            EscortCommand::Relay(line) => match self.settings.escort_denylist.check(&line) {
                DenyCheck::Allowed => self.command(&line).await,
                DenyCheck::Denied { verb, reason } => {
                    warn!(%verb, "Refusing relayed command");
                    self.tell_companion(&reason).await
                }
            },
            EscortCommand::Unknown(text) => {
                self.tell_companion(&format!("I don't know how to \"{text}\""))
                    .await
            }
        }
    }

    /// Pop the next queued command, waiting up to the idle timeout for one.
    async fn next_companion_command(&mut self) -> Flow<Option<String>> {
        if let Some(text) = self.companion_queue.pop_front() {
            return Ok(Some(text));
        }

        let timeout = self.settings.idle_timeout;
        let Some(raw) = self.receive(timeout).await? else {
            debug!("No companion command");
            return Ok(None);
        };
        if let Some(payload) = self.intake(&raw).await? {
            self.interleaved(payload).await?;
        }
        Ok(self.companion_queue.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use shadowbot_core::Interrupt;

    fn denylist() -> Denylist {
        Denylist::new(vec!["give".into(), "#Sell".into(), "drop".into()])
    }

    #[test]
    fn denied_verbs_are_refused() {
        let list = denylist();
        assert_eq!(list.check("#party"), DenyCheck::Allowed);
        match list.check("#sell 3") {
            DenyCheck::Denied { verb, .. } => assert_eq!(verb, "sell"),
            other => panic!("Expected denied, got {other:?}"),
        }
        assert!(matches!(list.check("#GIVE friend 1"), DenyCheck::Denied { .. }));
    }

    #[test]
    fn empty_denylist_allows_all() {
        assert_eq!(Denylist::default().check("#drop 1"), DenyCheck::Allowed);
    }

    #[test]
    fn wildcard_denies_all() {
        let list = Denylist::new(vec!["*".into()]);
        assert!(matches!(list.check("#party"), DenyCheck::Denied { .. }));
    }

    #[test]
    fn parses_vocabulary() {
        assert_eq!(
            EscortCommand::parse("goto Redmond_Bank"),
            EscortCommand::Goto("Redmond_Bank".into())
        );
        assert_eq!(EscortCommand::parse("FLUSH"), EscortCommand::Flush);
        assert_eq!(EscortCommand::parse("loot"), EscortCommand::Loot);
        assert_eq!(
            EscortCommand::parse("#cast heal 1"),
            EscortCommand::Relay("#cast heal 1".into())
        );
        assert_eq!(
            EscortCommand::parse("goto"),
            EscortCommand::Unknown("goto".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn relays_allowed_commands() {
        let (mut bot, log) = escort_bot_with(lamb_script().says(COMPANION, "#party"));
        bot.escort_step(1).await.unwrap();
        assert_eq!(log.privmsgs_to(LAMB), vec!["#party"]);
    }

    #[tokio::test(start_paused = true)]
    async fn refuses_denied_commands() {
        let (mut bot, log) = escort_bot_with(lamb_script().says(COMPANION, "#give friend 1"));
        bot.escort_step(1).await.unwrap();
        assert!(log.privmsgs_to(LAMB).is_empty());
        let replies = log.privmsgs_to(COMPANION);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("not allowed"));
    }

    #[tokio::test(start_paused = true)]
    async fn first_iteration_introduces_itself() {
        let (mut bot, log) = escort_bot_with(lamb_script().step(Step::Silence));
        bot.escort_step(0).await.unwrap();
        let replies = log.privmsgs_to(COMPANION);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("escorting you"));
    }

    #[tokio::test(start_paused = true)]
    async fn loot_reports_tally() {
        let (mut bot, log) = escort_bot_with(lamb_script().says(COMPANION, "loot"));
        bot.session.loot.nuyen = 42.0;
        bot.escort_step(3).await.unwrap();
        let replies = log.privmsgs_to(COMPANION);
        assert_eq!(replies, vec![bot.session.loot.summary()]);
    }

    #[tokio::test(start_paused = true)]
    async fn goto_travels_and_reports() {
        let (mut bot, log) = escort_bot_with(
            lamb_script()
                .says(COMPANION, "goto Redmond_Hotel")
                .respond_to("#party", LAMB, &["You are inside Redmond_Hotel."]),
        );
        bot.escort_step(2).await.unwrap();
        assert_eq!(log.privmsgs_to(LAMB), vec!["#party"]);
        assert_eq!(log.privmsgs_to(COMPANION), vec!["We are at Redmond_Hotel"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_the_wait() {
        let (mut bot, _log) = escort_bot_with(lamb_script().says(COMPANION, "stop"));
        let err = bot.escort_step(1).await.unwrap_err();
        assert_eq!(err.interrupt(), Some(Interrupt::EscortStop));
    }
}
