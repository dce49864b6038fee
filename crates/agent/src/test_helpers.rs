use std::sync::Arc;

use shadowbot_core::{
    Behavior, ControlHandle, ControlSignals, EventBus, Session, control_channel,
};

use crate::bot::{Bot, Settings};

pub(crate) use shadowbot_channels::{ScriptedTransport, SentLog, Step};

pub(crate) const LAMB: &str = "Lamb3";
pub(crate) const ME: &str = "shadowbot";
pub(crate) const COMPANION: &str = "friend";

/// An empty transcript addressed to our nick.
pub(crate) fn lamb_script() -> ScriptedTransport {
    ScriptedTransport::new(ME)
}

pub(crate) fn bot_with_handle(script: ScriptedTransport) -> (Bot, ControlHandle, SentLog) {
    let log = script.sent();
    let (handle, control) = control_channel(ControlSignals::default());
    let session = Session::new(LAMB, ME).with_shard(Some(2));
    let bot = Bot::new(
        Box::new(script),
        session,
        control,
        Arc::new(EventBus::default()),
        Settings::default(),
    );
    (bot, handle, log)
}

pub(crate) fn bot_with(script: ScriptedTransport) -> (Bot, SentLog) {
    let (bot, _handle, log) = bot_with_handle(script);
    (bot, log)
}

pub(crate) fn escort_bot_with(script: ScriptedTransport) -> (Bot, SentLog) {
    let (mut bot, log) = bot_with(script);
    bot.session.companion = Some(COMPANION.into());
    bot.session.behavior = Some(Behavior::Escort);
    (bot, log)
}
