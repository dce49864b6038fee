//! `shadowbot init` — write a default config file.

use std::path::Path;

use shadowbot_config::AppConfig;

pub async fn run(explicit: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::config_path(explicit);

    println!("ShadowBot — Setup");
    println!("=================\n");

    if let Some(dir) = config_path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
            println!("✅ Created config directory: {}", dir.display());
        }
    }

    if config_path.exists() && !force {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or re-run with --force.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Set [irc] nick and password (or SHADOWBOT_NICK / SHADOWBOT_PASSWORD)");
    println!("   2. Run: shadowbot status");
    println!("   3. Run: shadowbot run --behavior explore\n");

    Ok(())
}
