//! Response waiter — block until the game says what we are waiting for.
//!
//! Everything the intermediary says while we wait goes through
//! [`Bot::interleaved`] first: greetings are answered, encounters are fought,
//! timing announcements update the pending deadline, and nothing of that
//! counts as the awaited line.

use std::time::Duration;

use chrono::Utc;
use shadowbot_core::{BotEvent, Flow, Interrupt};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::bot::Bot;
use crate::classifier::classify;
use crate::grammar;

/// Report the remaining time again once it moved by this many seconds.
const REPORT_STEP_SECS: i64 = 30;

impl Bot {
    /// Wait until an intermediary line contains `expected` and return it.
    pub async fn await_response(&mut self, expected: &str) -> Flow<String> {
        self.await_until(expected, None).await
    }

    /// Like [`await_response`](Self::await_response), but with a deadline.
    ///
    /// The remaining time is reported while waiting. Once the deadline is
    /// more than the grace period past, an empty string is returned instead
    /// of waiting any longer.
    pub async fn await_until(&mut self, expected: &str, deadline: Option<Instant>) -> Flow<String> {
        debug!(expected, "Awaiting response");
        self.last_report = None;

        loop {
            let mut timeout = self.settings.response_timeout;
            if let Some(at) = deadline {
                let give_up = at + self.settings.deadline_grace;
                let now = Instant::now();
                if now >= give_up {
                    warn!(expected, "Well past the deadline, no longer waiting");
                    return Ok(String::new());
                }
                self.report_remaining(at, now);
                timeout = timeout.min(give_up - now);
            }

            let Some(raw) = self.receive(timeout).await? else {
                continue;
            };
            let Some(payload) = self.intake(&raw).await? else {
                continue;
            };

            if payload.contains(expected) {
                return Ok(payload.to_string());
            }
            if let Some(rest) = self.interleaved(payload).await? {
                if rest.contains(expected) {
                    return Ok(rest);
                }
            }
        }
    }

    /// Keep the connection serviced for `duration`, handling whatever the
    /// game says in the meantime.
    pub async fn idle_for(&mut self, duration: Duration) -> Flow<()> {
        let until = Instant::now() + duration;
        loop {
            let now = Instant::now();
            if now >= until {
                return Ok(());
            }
            let timeout = (until - now).min(self.settings.response_timeout);
            let Some(raw) = self.receive(timeout).await? else {
                continue;
            };
            if let Some(payload) = self.intake(&raw).await? {
                self.interleaved(payload).await?;
            }
        }
    }

    fn report_remaining(&mut self, at: Instant, now: Instant) {
        let remaining = if at >= now {
            (at - now).as_secs() as i64
        } else {
            -((now - at).as_secs() as i64)
        };
        let due = self
            .last_report
            .is_none_or(|last| (last - remaining).abs() >= REPORT_STEP_SECS);
        if due {
            info!(remaining_secs = remaining, "About {remaining}s remaining");
            self.last_report = Some(remaining);
        }
    }

    /// Classify a raw line.
    ///
    /// Returns the payload of intermediary lines. Companion lines are handled
    /// here when escorting and yield `None`, as does everything else.
    pub(crate) async fn intake<'a>(&mut self, raw: &'a str) -> Flow<Option<&'a str>> {
        let lamb = classify(raw, &self.session.intermediary, &self.session.nick);
        if lamb.from_source {
            debug!(line = %lamb.payload, "<- {}", self.session.intermediary);
            return Ok(Some(lamb.payload));
        }

        if self.session.escorting() {
            let companion = self.session.companion.as_deref().unwrap_or_default();
            let said = classify(raw, companion, &self.session.nick);
            if said.from_source {
                self.companion_says(said.payload).await?;
                return Ok(None);
            }
        }

        trace!(raw, "Ignoring line");
        Ok(None)
    }

    async fn companion_says(&mut self, text: &str) -> Flow<()> {
        info!(text, "Companion says");
        match text.trim().to_ascii_lowercase().as_str() {
            "stop" if self.session.escort.in_combat => {
                self.session.escort.deferred_stop = true;
                self.tell_companion("Fighting right now, I will stop once combat is over")
                    .await
            }
            "stop" => Err(Interrupt::EscortStop.into()),
            "ready" => {
                self.session.escort.companion_ready = true;
                Ok(())
            }
            _ => {
                self.companion_queue.push_back(text.trim().to_string());
                Ok(())
            }
        }
    }

    /// Handle a line that is not the one being waited for.
    ///
    /// Returns the continuation line when the line started a combat episode.
    pub(crate) async fn interleaved(&mut self, payload: &str) -> Flow<Option<String>> {
        let timed = self.note_timing(payload);

        if payload.contains("You were killed") {
            return Err(Interrupt::PlayerDied.into());
        }
        if payload.contains("You meet ") {
            self.greet(payload).await?;
            return Ok(None);
        }
        if payload.contains("You ENCOUNTER") || payload.contains("You are fighting") {
            let rest = self.fight(payload).await?;
            return Ok(Some(rest));
        }
        if let Some((item, count)) = grammar::parse_item_gain(payload) {
            self.session.loot.add_item(&item, count);
            self.publish(BotEvent::LootGained {
                description: format!("{count}x {item}"),
                timestamp: Utc::now(),
            });
            return Ok(None);
        }

        let absorbed = timed
            || payload.contains("You gained +")
            || payload.contains(" casts a ")
            || payload.contains("You are going to")
            || payload.contains("HP:")
            || payload.contains("MP:");
        if absorbed {
            debug!(line = payload, "Absorbed");
        } else {
            warn!(line = payload, "Unhandled");
        }
        Ok(None)
    }

    /// Update the pending deadline from an ETA or remaining-time line.
    pub(crate) fn note_timing(&mut self, payload: &str) -> bool {
        let Some(secs) = grammar::parse_eta(payload).or_else(|| grammar::parse_remaining(payload))
        else {
            return false;
        };
        debug!(secs, "Pending deadline updated");
        self.session.set_deadline(secs, payload);
        true
    }

    async fn greet(&mut self, payload: &str) -> Flow<()> {
        let crowd = grammar::meet_entries(payload);
        let quest_group = self.session.tunables.quest_quota > 0
            && !crowd.is_empty()
            && crowd
                .iter()
                .all(|e| e.contains(self.settings.quest_target.as_str()));

        if quest_group {
            info!(
                quota = self.session.tunables.quest_quota,
                "Quest targets met, attacking"
            );
            return self.command("#fight").await;
        }

        if let Some(phrase) = self.session.tunables.meet_say.clone() {
            self.command(&format!("#say {phrase}")).await?;
            self.pause(self.settings.meet_pause).await?;
        }
        self.command("#bye").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    #[tokio::test(start_paused = true)]
    async fn returns_first_matching_line() {
        let (mut bot, log) = bot_with(
            lamb_script()
                .says(LAMB, "You gained +0.2 MP")
                .says(LAMB, "You arrive at Redmond."),
        );
        let line = bot.await_response("You arrive").await.unwrap();
        assert_eq!(line, "You arrive at Redmond");
        assert!(log.privmsgs_to(LAMB).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn greets_citizens_and_keeps_waiting() {
        let (mut bot, log) = bot_with(
            lamb_script()
                .says(LAMB, "You meet a Citizen.")
                .says(LAMB, "You enter the Redmond Hotel."),
        );
        let line = bot.await_response("You enter the Redmond Hotel").await.unwrap();
        assert_eq!(line, "You enter the Redmond Hotel");
        assert_eq!(log.privmsgs_to(LAMB), vec!["#say shadowrun", "#bye"]);
    }

    #[tokio::test(start_paused = true)]
    async fn quest_group_is_attacked() {
        let (mut bot, log) = bot_with(
            lamb_script()
                .says(LAMB, "You meet 1-Bum[1](2m)(L1), 2-Bum[2](3m)(L1)")
                .says(LAMB, "You arrive at Redmond"),
        );
        bot.session.tunables.quest_quota = 3;
        bot.await_response("You arrive").await.unwrap();
        assert_eq!(log.privmsgs_to(LAMB), vec!["#fight"]);
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_crowd_is_not_a_quest_group() {
        let (mut bot, log) = bot_with(
            lamb_script()
                .says(LAMB, "You meet 1-Bum[1](2m)(L1), 2-Cop[2](3m)(L9)")
                .says(LAMB, "You arrive at Redmond"),
        );
        bot.session.tunables.quest_quota = 3;
        bot.session.tunables.meet_say = None;
        bot.await_response("You arrive").await.unwrap();
        assert_eq!(log.privmsgs_to(LAMB), vec!["#bye"]);
    }

    #[tokio::test(start_paused = true)]
    async fn eta_sets_deadline_and_wait_is_bounded() {
        let (mut bot, _log) = bot_with(
            lamb_script()
                .says(LAMB, "You board the train. ETA: 3m 20s")
                .step(Step::Silence)
                .step(Step::Silence)
                .step(Step::Silence),
        );

        let line = bot.await_response("ETA").await.unwrap();
        assert!(bot.note_timing(&line));
        let deadline = bot.session.pending.clone().unwrap();
        assert_eq!(deadline.remaining_secs(), 200);

        let started = Instant::now();
        let result = bot.await_until("You arrive", Some(deadline.at)).await.unwrap();
        assert_eq!(result, "");
        // never past the deadline plus one minute of grace
        assert_eq!(started.elapsed(), Duration::from_secs(260));
    }

    #[tokio::test(start_paused = true)]
    async fn first_report_is_the_full_remaining_time() {
        let (mut bot, _log) = bot_with(lamb_script().says(LAMB, "You arrive at Seattle"));
        bot.session.set_deadline(200, "subway");
        let at = bot.session.pending.clone().unwrap().at;
        bot.await_until("You arrive", Some(at)).await.unwrap();
        assert_eq!(bot.last_report, Some(200));
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_lines_update_deadline_without_returning() {
        let (mut bot, _log) = bot_with(
            lamb_script()
                .says(LAMB, "You are going to Redmond_Hotel. 1m 30s remaining")
                .says(LAMB, "You arrive at Redmond_Hotel"),
        );
        bot.await_response("You arrive").await.unwrap();
        assert_eq!(bot.session.pending.unwrap().remaining_secs(), 90);
    }

    #[tokio::test(start_paused = true)]
    async fn quit_aborts_the_wait() {
        let (mut bot, handle, _log) =
            bot_with_handle(lamb_script().says(LAMB, "You gained +1 MP"));
        handle.request_quit();
        let halt = bot.await_response("You arrive").await.unwrap_err();
        assert_eq!(halt.interrupt(), Some(Interrupt::UserQuit));
    }

    #[tokio::test(start_paused = true)]
    async fn death_is_fatal() {
        let (mut bot, _log) = bot_with(lamb_script().says(LAMB, "You were killed by 1-Killer[1]"));
        let halt = bot.await_response("You arrive").await.unwrap_err();
        assert_eq!(halt.interrupt(), Some(Interrupt::PlayerDied));
    }

    #[tokio::test(start_paused = true)]
    async fn companion_stop_aborts_when_escorting() {
        let (mut bot, _log) = escort_bot_with(lamb_script().says(COMPANION, "stop"));
        let halt = bot.await_response("You arrive").await.unwrap_err();
        assert_eq!(halt.interrupt(), Some(Interrupt::EscortStop));
    }

    #[tokio::test(start_paused = true)]
    async fn companion_commands_are_queued() {
        let (mut bot, _log) = escort_bot_with(
            lamb_script()
                .says(COMPANION, "ready")
                .says(COMPANION, "goto Redmond_Hotel")
                .says(LAMB, "You arrive at Redmond"),
        );
        bot.await_response("You arrive").await.unwrap();
        assert!(bot.session.escort.companion_ready);
        assert_eq!(bot.companion_queue.pop_front().as_deref(), Some("goto Redmond_Hotel"));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_for_runs_out_the_clock() {
        let (mut bot, _log) = bot_with(
            lamb_script()
                .step(Step::Wait(Duration::from_secs(40)))
                .says(LAMB, "You received 1x Bacon")
                .step(Step::Silence),
        );
        let started = Instant::now();
        bot.idle_for(Duration::from_secs(75)).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(75));
        assert_eq!(bot.session.loot.items.get("Bacon"), Some(&1));
    }
}
