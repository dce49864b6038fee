//! `shadowbot status` — show the effective configuration.

use std::path::Path;

pub async fn run(explicit: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(explicit)?;
    let tunables = config.tunables();
    let on_off = |b: bool| if b { "on" } else { "off" };

    println!("ShadowBot Status");
    println!("================");
    println!("  Server:        {}:{}", config.irc.server, config.irc.port);
    println!("  Nick:          {}", config.irc.nick);
    println!("  Identify:      {}", if config.irc.password.is_some() { "password set" } else { "no password" });
    println!("  Channels:      {}", config.irc.channels.join(", "));
    println!("  Send delay:    {}ms", config.irc.send_delay_ms);
    println!("  Intermediary:  {}", config.game.intermediary);
    match config.game.shard {
        Some(shard) => println!("  Shard:         {shard}"),
        None => println!("  Shard:         any"),
    }
    println!("  Meet phrase:   {}", tunables.meet_say.as_deref().unwrap_or("(none)"));
    println!("  Quest:         {} x {}", tunables.quest_quota, config.game.quest_target);
    println!("  Targeting:     {} first, tie-break {:?}",
        if tunables.inverse_priority { "highest level" } else { "lowest level" },
        tunables.tie_break);
    println!("  Casting:       {}", on_off(tunables.can_cast));
    println!("  Inventory:     keep < {}, {} every {} explores",
        tunables.retention_threshold, config.inventory.disposal.verb(), config.inventory.flush_every);
    println!("  Companion:     {}", config.escort.companion.as_deref().unwrap_or("(none)"));
    println!("  Pre-commands:  {}", config.pre_commands.len());
    println!("  Crash log:     {}", config.crash_log_path().display());

    let config_path = super::config_path(explicit);
    if config_path.exists() {
        println!("\n  ✅ Config file found: {}", config_path.display());
    } else {
        println!("\n  ⚠️  No config file — run `shadowbot init` first");
    }

    Ok(())
}
