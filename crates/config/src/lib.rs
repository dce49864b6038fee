//! Configuration loading, validation, and management for ShadowBot.
//!
//! Loads configuration from `~/.shadowbot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use shadowbot_core::{TieBreak, Tunables};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.shadowbot/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// IRC connection settings
    #[serde(default)]
    pub irc: IrcConfig,

    /// Game and combat settings
    #[serde(default)]
    pub game: GameConfig,

    /// Inventory flushing
    #[serde(default)]
    pub inventory: InventoryConfig,

    /// Escort mode
    #[serde(default)]
    pub escort: EscortConfig,

    /// Commands executed before every behavior iteration
    #[serde(default)]
    pub pre_commands: Vec<PreCommand>,

    /// Append-only log of iteration failures (defaults to `~/.shadowbot/crash.log`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crash_log: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Serialize, Deserialize)]
pub struct IrcConfig {
    #[serde(default = "default_server")]
    pub server: String,

    #[serde(default = "default_irc_port")]
    pub port: u16,

    #[serde(default = "default_nick")]
    pub nick: String,

    /// NickServ password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Channels joined after identifying
    #[serde(default)]
    pub channels: Vec<String>,

    /// Pause before every PRIVMSG; the intermediary drops messages sent too fast
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,

    /// Server notice that marks a completed NickServ identify
    #[serde(default = "default_identify_marker")]
    pub identify_marker: String,

    /// Echo every received line at debug level
    #[serde(default = "default_true")]
    pub echo_incoming: bool,
}

fn default_server() -> String {
    "irc.libera.chat".into()
}
fn default_irc_port() -> u16 {
    6667
}
fn default_nick() -> String {
    "shadowbot".into()
}
fn default_send_delay_ms() -> u64 {
    2000
}
fn default_identify_marker() -> String {
    "Last login from".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for IrcConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrcConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("nick", &self.nick)
            .field("password", &redact(&self.password))
            .field("channels", &self.channels)
            .field("send_delay_ms", &self.send_delay_ms)
            .field("identify_marker", &self.identify_marker)
            .field("echo_incoming", &self.echo_incoming)
            .finish()
    }
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            port: default_irc_port(),
            nick: default_nick(),
            password: None,
            channels: vec![],
            send_delay_ms: default_send_delay_ms(),
            identify_marker: default_identify_marker(),
            echo_incoming: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Nick of the intermediary game bot
    #[serde(default = "default_intermediary")]
    pub intermediary: String,

    /// Server tag appended to our name by the game (`nick{shard}`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<u32>,

    /// What to say to citizens met on the street; empty for nothing
    #[serde(default = "default_meet_say")]
    pub meet_say: String,

    /// Enemy name fragment counted by the kill quest
    #[serde(default = "default_quest_target")]
    pub quest_target: String,

    /// Remaining kills for the quest; zero disables quest hunting
    #[serde(default)]
    pub quest_quota: u32,

    /// Attack the highest level enemy first
    #[serde(default)]
    pub inverse_priority: bool,

    #[serde(default)]
    pub tie_break: TieBreak,

    /// Whether heal and calm may be cast
    #[serde(default)]
    pub can_cast: bool,

    #[serde(default = "default_calm_cooldown_secs")]
    pub calm_cooldown_secs: u64,

    /// Where the explore behavior starts
    #[serde(default = "default_explore_start")]
    pub explore_start: String,

    #[serde(default = "default_max_travel_attempts")]
    pub max_travel_attempts: u32,

    /// Bound on each receive while awaiting a response
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,

    /// Bound on each receive during combat
    #[serde(default = "default_combat_timeout_secs")]
    pub combat_timeout_secs: u64,
}

fn default_intermediary() -> String {
    "Lamb3".into()
}
fn default_meet_say() -> String {
    "shadowrun".into()
}
fn default_quest_target() -> String {
    "Bum".into()
}
fn default_calm_cooldown_secs() -> u64 {
    90
}
fn default_explore_start() -> String {
    "Redmond_Hotel".into()
}
fn default_max_travel_attempts() -> u32 {
    16
}
fn default_response_timeout_secs() -> u64 {
    120
}
fn default_combat_timeout_secs() -> u64 {
    45
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            intermediary: default_intermediary(),
            shard: None,
            meet_say: default_meet_say(),
            quest_target: default_quest_target(),
            quest_quota: 0,
            inverse_priority: false,
            tie_break: TieBreak::default(),
            can_cast: false,
            calm_cooldown_secs: default_calm_cooldown_secs(),
            explore_start: default_explore_start(),
            max_travel_attempts: default_max_travel_attempts(),
            response_timeout_secs: default_response_timeout_secs(),
            combat_timeout_secs: default_combat_timeout_secs(),
        }
    }
}

/// How surplus inventory is disposed of.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposal {
    Sell,
    /// Push into the bank
    #[default]
    Push,
    Drop,
}

impl Disposal {
    /// The game command verb, without the sigil.
    pub fn verb(&self) -> &'static str {
        match self {
            Disposal::Sell => "sell",
            Disposal::Push => "push",
            Disposal::Drop => "drop",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Keep fewer than this many items; zero or negative disables flushing
    #[serde(default)]
    pub threshold: i32,

    #[serde(default)]
    pub disposal: Disposal,

    /// Flush every N explore iterations
    #[serde(default = "default_flush_every")]
    pub flush_every: u32,

    /// Item name fragments never sold
    #[serde(default = "default_sell_denylist")]
    pub sell_denylist: Vec<String>,
}

fn default_flush_every() -> u32 {
    10
}
fn default_sell_denylist() -> Vec<String> {
    vec![
        "Credstick".into(),
        "Stimpatch".into(),
        "Scroll".into(),
        "Bacon".into(),
        "Note".into(),
        "Key".into(),
    ]
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            threshold: 0,
            disposal: Disposal::default(),
            flush_every: default_flush_every(),
            sell_denylist: default_sell_denylist(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscortConfig {
    /// Nick of the player we escort
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companion: Option<String>,

    /// Command verbs the companion may not relay through us
    #[serde(default = "default_escort_denylist")]
    pub denylist: Vec<String>,
}

fn default_escort_denylist() -> Vec<String> {
    vec![
        "give".into(),
        "sell".into(),
        "drop".into(),
        "push".into(),
        "quit".into(),
        "reset".into(),
    ]
}

impl Default for EscortConfig {
    fn default() -> Self {
        Self {
            companion: None,
            denylist: default_escort_denylist(),
        }
    }
}

/// A step run before every behavior iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PreCommand {
    /// Send a game command to the intermediary
    Command { text: String },
    /// Sleep for a while
    Pause { seconds: u64 },
    /// Send a message to any nick or channel
    Message { target: String, text: String },
}

impl AppConfig {
    /// Load configuration from the default path (~/.shadowbot/config.toml).
    ///
    /// Also checks environment variables:
    /// - `SHADOWBOT_NICK`
    /// - `SHADOWBOT_PASSWORD`
    /// - `SHADOWBOT_SERVER`
    /// - `SHADOWBOT_INTERMEDIARY`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;

        if let Ok(nick) = std::env::var("SHADOWBOT_NICK") {
            config.irc.nick = nick;
        }
        if config.irc.password.is_none() {
            config.irc.password = std::env::var("SHADOWBOT_PASSWORD").ok();
        }
        if let Ok(server) = std::env::var("SHADOWBOT_SERVER") {
            config.irc.server = server;
        }
        if let Ok(intermediary) = std::env::var("SHADOWBOT_INTERMEDIARY") {
            config.game.intermediary = intermediary;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".shadowbot")
    }

    /// Where iteration failures are appended.
    pub fn crash_log_path(&self) -> PathBuf {
        self.crash_log
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("crash.log"))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.irc.nick.trim().is_empty() {
            return Err(ConfigError::ValidationError("irc.nick must not be empty".into()));
        }

        if self.irc.nick.contains(' ') {
            return Err(ConfigError::ValidationError(
                "irc.nick must not contain spaces".into(),
            ));
        }

        if self.irc.port == 0 {
            return Err(ConfigError::ValidationError("irc.port must be > 0".into()));
        }

        if self.game.intermediary.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "game.intermediary must not be empty".into(),
            ));
        }

        if self.game.response_timeout_secs == 0 || self.game.combat_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "receive timeouts must be > 0".into(),
            ));
        }

        if self.game.max_travel_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "game.max_travel_attempts must be > 0".into(),
            ));
        }

        if self.inventory.flush_every == 0 {
            return Err(ConfigError::ValidationError(
                "inventory.flush_every must be > 0".into(),
            ));
        }

        for step in &self.pre_commands {
            if let PreCommand::Command { text } = step {
                if !text.starts_with('#') {
                    return Err(ConfigError::ValidationError(format!(
                        "pre-command '{text}' must start with '#'"
                    )));
                }
            }
        }

        Ok(())
    }

    /// The operator-editable subset, as the worker starts with it.
    pub fn tunables(&self) -> Tunables {
        Tunables {
            retention_threshold: self.inventory.threshold,
            meet_say: Some(self.game.meet_say.clone()).filter(|s| !s.trim().is_empty()),
            quest_quota: self.game.quest_quota,
            inverse_priority: self.game.inverse_priority,
            can_cast: self.game.can_cast,
            tie_break: self.game.tie_break,
        }
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            irc: IrcConfig::default(),
            game: GameConfig::default(),
            inventory: InventoryConfig::default(),
            escort: EscortConfig::default(),
            pre_commands: vec![],
            crash_log: None,
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
