//! Scripted transport — replays a fixed transcript.
//!
//! Used by the agent's tests to drive the game logic deterministically. Lines
//! are delivered in order; reactions inject extra lines when a matching
//! command is sent, which is how a transcript answers `#party` or `#inventory`
//! at the right moment. Everything sent is recorded in a shared [`SentLog`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shadowbot_core::error::TransportError;
use shadowbot_core::transport::Transport;

/// Build the raw line the relay delivers for a private message.
pub fn envelope(from: &str, to: &str, payload: &str) -> String {
    format!(":{from}!~lamb@shadowlamb.org PRIVMSG {to} :{payload}")
}

/// One step of a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Deliver a raw line.
    Line(String),
    /// Nothing arrives; the receive times out.
    Silence,
    /// Nothing arrives for this long, then the transcript continues.
    Wait(Duration),
}

#[derive(Debug, Clone)]
struct Reaction {
    trigger: String,
    lines: Vec<String>,
    repeat: bool,
}

/// Every line sent through a [`ScriptedTransport`], shared with the test.
#[derive(Debug, Clone, Default)]
pub struct SentLog(Arc<Mutex<Vec<String>>>);

impl SentLog {
    fn push(&self, line: &str) {
        if let Ok(mut sent) = self.0.lock() {
            sent.push(line.to_string());
        }
    }

    /// All raw lines sent so far.
    pub fn lines(&self) -> Vec<String> {
        self.0.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Payloads of the private messages sent to `target`, in order.
    pub fn privmsgs_to(&self, target: &str) -> Vec<String> {
        let prefix = format!("PRIVMSG {target} :");
        self.lines()
            .iter()
            .filter_map(|l| l.strip_prefix(prefix.as_str()).map(str::to_string))
            .collect()
    }

    /// How many private messages to `target` start with `command`.
    pub fn count(&self, target: &str, command: &str) -> usize {
        self.privmsgs_to(target)
            .iter()
            .filter(|p| p.starts_with(command))
            .count()
    }
}

/// A transport that replays a transcript.
pub struct ScriptedTransport {
    nick: String,
    steps: VecDeque<Step>,
    injected: VecDeque<String>,
    reactions: Vec<Reaction>,
    sent: SentLog,
    consumed: usize,
}

impl ScriptedTransport {
    pub fn new(nick: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            steps: VecDeque::new(),
            injected: VecDeque::new(),
            reactions: Vec::new(),
            sent: SentLog::default(),
            consumed: 0,
        }
    }

    /// Append a raw line to the transcript.
    pub fn line(mut self, raw: impl Into<String>) -> Self {
        self.steps.push_back(Step::Line(raw.into()));
        self
    }

    /// Append a private message from `from` to us.
    pub fn says(self, from: &str, payload: &str) -> Self {
        let raw = envelope(from, &self.nick, payload);
        self.line(raw)
    }

    /// Append a step.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push_back(step);
        self
    }

    /// The first time a sent line contains `trigger`, deliver `replies` (from
    /// `from`) before the rest of the transcript.
    pub fn respond_to(mut self, trigger: &str, from: &str, replies: &[&str]) -> Self {
        let lines = replies
            .iter()
            .map(|r| envelope(from, &self.nick, r))
            .collect();
        self.reactions.push(Reaction {
            trigger: trigger.to_string(),
            lines,
            repeat: false,
        });
        self
    }

    /// Like [`respond_to`](Self::respond_to), but fires on every match.
    pub fn always_respond_to(mut self, trigger: &str, from: &str, replies: &[&str]) -> Self {
        let lines = replies
            .iter()
            .map(|r| envelope(from, &self.nick, r))
            .collect();
        self.reactions.push(Reaction {
            trigger: trigger.to_string(),
            lines,
            repeat: true,
        });
        self
    }

    /// Handle on the sent-line log; stays valid after the transport is moved.
    pub fn sent(&self) -> SentLog {
        self.sent.clone()
    }

    /// Transcript steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.steps.len() + self.injected.len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    fn nick(&self) -> &str {
        &self.nick
    }

    async fn send(&mut self, line: &str) -> Result<(), TransportError> {
        self.sent.push(line);
        if let Some(pos) = self
            .reactions
            .iter()
            .position(|r| line.contains(r.trigger.as_str()))
        {
            let reaction = if self.reactions[pos].repeat {
                self.reactions[pos].clone()
            } else {
                self.reactions.remove(pos)
            };
            self.injected.extend(reaction.lines);
        }
        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Option<String>, TransportError> {
        if let Some(line) = self.injected.pop_front() {
            self.consumed += 1;
            return Ok(Some(line));
        }

        loop {
            match self.steps.pop_front() {
                Some(Step::Line(line)) => {
                    self.consumed += 1;
                    return Ok(Some(line));
                }
                Some(Step::Silence) => {
                    tokio::time::sleep(timeout).await;
                    return Ok(None);
                }
                Some(Step::Wait(wait)) => {
                    if wait <= timeout {
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    tokio::time::sleep(timeout).await;
                    self.steps.push_front(Step::Wait(wait - timeout));
                    return Ok(None);
                }
                None => {
                    return Err(TransportError::ScriptExhausted {
                        consumed: self.consumed,
                    });
                }
            }
        }
    }
}
