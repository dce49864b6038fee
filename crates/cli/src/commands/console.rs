//! Operator console — one command per stdin line.
//!
//! Every command turns into a [`ControlHandle`] call; the console never
//! touches worker state itself.

use shadowbot_core::{Behavior, ControlHandle};

pub const HELP: &str = "\
  behavior <getbacon|explore|escort|idle>   select what the bot does
  threshold <n>                             keep fewer than n items (0 disables)
  meet <phrase|off>                         what to say to citizens
  quota <n>                                 set quest kills left
  cast <on|off>                             allow heal/calm
  inverse <on|off>                          attack the highest level first
  say <nick> <text>                         send a private message
  lamb <text>                               send text to the intermediary
  status                                    show the current signals
  softquit                                  stop after the current iteration
  quit                                      stop now";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Behavior(Option<Behavior>),
    Threshold(i32),
    Meet(Option<String>),
    Quota(u32),
    Cast(bool),
    Inverse(bool),
    Say { target: String, text: String },
    Lamb(String),
    Status,
    Help,
    SoftQuit,
    Quit,
}

fn switch(arg: &str) -> Result<bool, String> {
    match arg.to_ascii_lowercase().as_str() {
        "on" | "yes" | "true" | "1" => Ok(true),
        "off" | "no" | "false" | "0" => Ok(false),
        other => Err(format!("expected on or off, got '{other}'")),
    }
}

impl std::str::FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match word.to_ascii_lowercase().as_str() {
            "behavior" | "b" => match rest {
                "" => Err("usage: behavior <name|idle>".into()),
                "idle" | "none" | "stop" => Ok(ConsoleCommand::Behavior(None)),
                name => name.parse().map(|b| ConsoleCommand::Behavior(Some(b))),
            },
            "threshold" => rest
                .parse()
                .map(ConsoleCommand::Threshold)
                .map_err(|_| format!("'{rest}' is not a number")),
            "meet" => match rest {
                "" => Err("usage: meet <phrase|off>".into()),
                "off" => Ok(ConsoleCommand::Meet(None)),
                phrase => Ok(ConsoleCommand::Meet(Some(phrase.to_string()))),
            },
            "quota" => rest
                .parse()
                .map(ConsoleCommand::Quota)
                .map_err(|_| format!("'{rest}' is not a number")),
            "cast" => switch(rest).map(ConsoleCommand::Cast),
            "inverse" => switch(rest).map(ConsoleCommand::Inverse),
            "say" => match rest.split_once(' ') {
                Some((target, text)) if !text.trim().is_empty() => Ok(ConsoleCommand::Say {
                    target: target.to_string(),
                    text: text.trim().to_string(),
                }),
                _ => Err("usage: say <nick> <text>".into()),
            },
            "lamb" | "l" if !rest.is_empty() => Ok(ConsoleCommand::Lamb(rest.to_string())),
            "lamb" | "l" => Err("usage: lamb <text>".into()),
            "status" => Ok(ConsoleCommand::Status),
            "help" | "?" => Ok(ConsoleCommand::Help),
            "softquit" => Ok(ConsoleCommand::SoftQuit),
            "quit" | "exit" | "q" => Ok(ConsoleCommand::Quit),
            other => Err(format!("unknown command '{other}', try 'help'")),
        }
    }
}

impl ConsoleCommand {
    /// Apply to the worker through `handle`. Returns a line for the operator.
    pub async fn apply(self, handle: &ControlHandle, intermediary: &str) -> String {
        match self {
            ConsoleCommand::Behavior(behavior) => {
                handle.select_behavior(behavior);
                match behavior {
                    Some(b) => format!("behavior set to {b}"),
                    None => "going idle".into(),
                }
            }
            ConsoleCommand::Threshold(n) => {
                handle.update_tunables(|t| t.retention_threshold = n);
                format!("retention threshold set to {n}")
            }
            ConsoleCommand::Meet(phrase) => {
                let reply = match &phrase {
                    Some(p) => format!("will say '{p}' to citizens"),
                    None => "will not talk to citizens".into(),
                };
                handle.update_tunables(|t| t.meet_say = phrase);
                reply
            }
            ConsoleCommand::Quota(n) => {
                handle.update_tunables(|t| t.quest_quota = n);
                format!("quest quota set to {n}")
            }
            ConsoleCommand::Cast(on) => {
                handle.update_tunables(|t| t.can_cast = on);
                format!("casting {}", if on { "enabled" } else { "disabled" })
            }
            ConsoleCommand::Inverse(on) => {
                handle.update_tunables(|t| t.inverse_priority = on);
                format!("attacking {} level first", if on { "highest" } else { "lowest" })
            }
            ConsoleCommand::Say { target, text } => {
                if handle.send_message(target.as_str(), text).await {
                    format!("queued message to {target}")
                } else {
                    "worker is gone".into()
                }
            }
            ConsoleCommand::Lamb(text) => {
                if handle.send_message(intermediary, text).await {
                    format!("queued for {intermediary}")
                } else {
                    "worker is gone".into()
                }
            }
            ConsoleCommand::Status => {
                let s = handle.current();
                format!(
                    "behavior={} threshold={} quota_set={} cast={} inverse={} soft_quit={}",
                    s.behavior.map_or("idle".to_string(), |b| b.to_string()),
                    s.tunables.retention_threshold,
                    s.tunables.quest_quota,
                    s.tunables.can_cast,
                    s.tunables.inverse_priority,
                    s.soft_quit
                )
            }
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::SoftQuit => {
                handle.request_soft_quit();
                "stopping after the current iteration".into()
            }
            ConsoleCommand::Quit => {
                handle.request_quit();
                "quitting".into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowbot_core::{ControlSignals, control_channel};

    #[test]
    fn parses_commands() {
        assert_eq!(
            "behavior explore".parse(),
            Ok(ConsoleCommand::Behavior(Some(Behavior::Explore)))
        );
        assert_eq!("behavior idle".parse(), Ok(ConsoleCommand::Behavior(None)));
        assert_eq!("threshold 25".parse(), Ok(ConsoleCommand::Threshold(25)));
        assert_eq!("cast on".parse(), Ok(ConsoleCommand::Cast(true)));
        assert_eq!(
            "say friend meet me at the bank".parse(),
            Ok(ConsoleCommand::Say {
                target: "friend".into(),
                text: "meet me at the bank".into()
            })
        );
        assert_eq!(
            "lamb #party".parse(),
            Ok(ConsoleCommand::Lamb("#party".into()))
        );
        assert_eq!("QUIT".parse(), Ok(ConsoleCommand::Quit));
    }

    #[test]
    fn rejects_bad_input() {
        assert!("threshold many".parse::<ConsoleCommand>().is_err());
        assert!("behavior printloop".parse::<ConsoleCommand>().is_err());
        assert!("say friend".parse::<ConsoleCommand>().is_err());
        assert!("dance".parse::<ConsoleCommand>().is_err());
    }

    #[tokio::test]
    async fn edits_reach_the_control_channel() {
        let (handle, mut rx) = control_channel(ControlSignals::default());

        ConsoleCommand::Threshold(12).apply(&handle, "Lamb3").await;
        ConsoleCommand::Behavior(Some(Behavior::GetBacon))
            .apply(&handle, "Lamb3")
            .await;
        ConsoleCommand::Lamb("#party".into())
            .apply(&handle, "Lamb3")
            .await;

        let s = rx.snapshot();
        assert_eq!(s.tunables.retention_threshold, 12);
        assert_eq!(s.behavior, Some(Behavior::GetBacon));
        let queued = rx.next_outgoing().unwrap();
        assert_eq!(queued.target, "Lamb3");
        assert_eq!(queued.text, "#party");
    }
}
