use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Process configuration: world endpoint, shared files and the list of agents to run.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub minecraft_version: Option<String>,
    /// Said in public chat right after login.
    pub init_message: Option<String>,
    pub prompt_file: String,
    pub keys_file: String,
    /// Address of the world bridge process.
    pub bridge_addr: String,
    pub conversations_dir: PathBuf,
    pub bots: Vec<BotConfig>,
    pub tuning: Tuning,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25565,
            minecraft_version: None,
            init_message: None,
            prompt_file: "prompt.txt".to_string(),
            keys_file: "keys.json".to_string(),
            bridge_addr: "127.0.0.1:7878".to_string(),
            conversations_dir: PathBuf::from("conversations"),
            bots: Vec::new(),
            tuning: Tuning::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bots.is_empty() {
            anyhow::bail!("no [[bots]] configured");
        }
        let mut seen = std::collections::HashSet::new();
        for bot in &self.bots {
            if bot.username.trim().is_empty() {
                anyhow::bail!("bot entry without a username");
            }
            if !seen.insert(bot.username.as_str()) {
                anyhow::bail!("duplicate bot username {:?}", bot.username);
            }
        }
        Ok(())
    }

    /// Explicit per-bot mode wins; otherwise a lone bot talks in public chat and several
    /// bots whisper so they do not answer each other's audience.
    pub fn chat_mode_for(&self, bot: &BotConfig) -> ChatMode {
        bot.chat_mode.unwrap_or(if self.bots.len() == 1 {
            ChatMode::Public
        } else {
            ChatMode::Private
        })
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Openai,
    Ollama,
    Openrouter,
    Gemini,
    Andy,
    Pollinations,
}

impl Provider {
    pub fn base_url(self) -> &'static str {
        match self {
            Provider::Openai => "https://api.openai.com/v1",
            Provider::Ollama => "http://localhost:11434/v1",
            Provider::Openrouter => "https://openrouter.ai/api/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Provider::Andy => "https://mindcraft-ce.com/api/andy/v1",
            Provider::Pollinations => "https://text.pollinations.ai/openai",
        }
    }

    pub fn key_name(self) -> &'static str {
        match self {
            Provider::Openai => "OPENAI_API_KEY",
            Provider::Ollama => "OLLAMA_API_KEY",
            Provider::Openrouter => "OPENROUTER_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::Andy => "ANDY_API_KEY",
            Provider::Pollinations => "POLLINATIONS_API_KEY",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BotConfig {
    pub username: String,
    pub personality: Option<String>,
    pub provider: Provider,
    pub model: String,
    /// Overrides the provider's default endpoint.
    pub base_url: Option<String>,
    pub save_conversation: bool,
    pub action_chat_feedback: bool,
    pub action_conversation_feedback: bool,
    pub look_at_player: bool,
    pub auto_eat: bool,
    pub auto_defend: bool,
    pub defend_against_players: bool,
    pub return_on_death: bool,
    /// 0 disables the idle trigger.
    pub idle_timeout_secs: u64,
    pub idle_message: String,
    pub chat_mode: Option<ChatMode>,
    /// Empty means everyone.
    pub allowed_users: Vec<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            personality: None,
            provider: Provider::default(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            save_conversation: false,
            action_chat_feedback: true,
            action_conversation_feedback: true,
            look_at_player: true,
            auto_eat: true,
            auto_defend: true,
            defend_against_players: false,
            return_on_death: true,
            idle_timeout_secs: 0,
            idle_message: "Nobody has talked to you in a while. Decide what to do next."
                .to_string(),
            chat_mode: None,
            allowed_users: Vec::new(),
        }
    }
}

impl BotConfig {
    pub fn allows(&self, username: &str) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.iter().any(|u| u == username)
    }

    pub fn endpoint(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.base_url())
    }
}

/// Poll intervals, hard ceilings, radii and thresholds of the continuous actions and
/// background behaviors. Durations are in milliseconds unless the name says otherwise.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Tuning {
    pub follow_poll_ms: u64,
    /// Consecutive follow polls without seeing the target before following ends.
    pub follow_lost_polls: u32,
    pub combat_poll_ms: u64,
    pub combat_ceiling_secs: u64,
    pub melee_range: f64,
    /// Pursuit gives up beyond this distance.
    pub pursuit_range: f64,
    /// How far to run from a threat once below the flee floor.
    pub flee_distance: f64,
    pub goal_wait_secs: u64,
    pub item_delay_ms: u64,
    pub dig_pause_ms: u64,
    /// `digDown` stops when there is no floor this far below.
    pub dig_safe_drop: i32,
    pub place_radius: i32,
    pub bed_radius: f64,
    /// Crafting table, furnace and chest search radius.
    pub fixture_radius: f64,
    pub collect_search_radius: f64,
    pub attack_radius: f64,
    pub look_interval_ms: u64,
    pub look_radius: f64,
    pub eat_interval_ms: u64,
    pub emergency_health: f32,
    pub distress_health: f32,
    pub hunger_threshold: u32,
    pub defense_radius: f64,
    pub defense_health_floor: f32,
    pub respawn_settle_ms: u64,
    pub pickup_radius: f64,
    pub pickup_reach: f64,
    pub pickup_poll_ms: u64,
    pub pickup_ceiling_secs: u64,
    pub reconnect_delay_secs: u64,
    pub chat_limit: usize,
    pub chat_margin: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            follow_poll_ms: 1_000,
            follow_lost_polls: 5,
            combat_poll_ms: 500,
            combat_ceiling_secs: 30,
            melee_range: 4.0,
            pursuit_range: 16.0,
            flee_distance: 16.0,
            goal_wait_secs: 60,
            item_delay_ms: 100,
            dig_pause_ms: 1_000,
            dig_safe_drop: 5,
            place_radius: 2,
            bed_radius: 16.0,
            fixture_radius: 6.0,
            collect_search_radius: 32.0,
            attack_radius: 6.0,
            look_interval_ms: 1_000,
            look_radius: 6.0,
            eat_interval_ms: 2_000,
            emergency_health: 8.0,
            distress_health: 4.0,
            hunger_threshold: 14,
            defense_radius: 16.0,
            defense_health_floor: 6.0,
            respawn_settle_ms: 3_000,
            pickup_radius: 8.0,
            pickup_reach: 1.5,
            pickup_poll_ms: 250,
            pickup_ceiling_secs: 10,
            reconnect_delay_secs: 5,
            chat_limit: 256,
            chat_margin: 10,
        }
    }
}

impl Tuning {
    pub fn follow_poll(&self) -> Duration {
        Duration::from_millis(self.follow_poll_ms)
    }

    pub fn combat_poll(&self) -> Duration {
        Duration::from_millis(self.combat_poll_ms)
    }

    pub fn combat_ceiling(&self) -> Duration {
        Duration::from_secs(self.combat_ceiling_secs)
    }

    pub fn goal_wait(&self) -> Duration {
        Duration::from_secs(self.goal_wait_secs)
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn dig_pause(&self) -> Duration {
        Duration::from_millis(self.dig_pause_ms)
    }

    pub fn look_interval(&self) -> Duration {
        Duration::from_millis(self.look_interval_ms)
    }

    pub fn eat_interval(&self) -> Duration {
        Duration::from_millis(self.eat_interval_ms)
    }

    pub fn respawn_settle(&self) -> Duration {
        Duration::from_millis(self.respawn_settle_ms)
    }

    pub fn pickup_poll(&self) -> Duration {
        Duration::from_millis(self.pickup_poll_ms)
    }

    pub fn pickup_ceiling(&self) -> Duration {
        Duration::from_secs(self.pickup_ceiling_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Longest chunk sent in one chat message.
    pub fn chunk_len(&self) -> usize {
        self.chat_limit.saturating_sub(self.chat_margin).max(1)
    }
}

/// API keys by variable name, e.g. `OPENAI_API_KEY`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Keys(HashMap<String, String>);

impl Keys {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str).filter(|k| !k.is_empty())
    }

    pub fn for_provider(&self, provider: Provider) -> Option<&str> {
        self.get(provider.key_name())
    }
}

/// Locates and parses configuration files.
///
/// Search order:
/// 1) `CRAFTBOT_CONFIG_DIR/<relative_path>`
/// 2) `./<relative_path>`
/// 3) `<workspace_root>/config/<relative_path>`
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn parse_from_file<T: DeserializeOwned>(relative_path: &str) -> anyhow::Result<T> {
        let path = Self::resolve_path(relative_path)?;
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        Self::parse_from_string(&text)
    }

    pub fn parse_from_string<T: DeserializeOwned>(text: &str) -> anyhow::Result<T> {
        toml::from_str(text).with_context(|| "Failed to parse TOML")
    }

    pub fn read_json<T: DeserializeOwned>(relative_path: &str) -> anyhow::Result<T> {
        let text = Self::read_text(relative_path)?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse JSON in {relative_path}"))
    }

    pub fn read_text(relative_path: &str) -> anyhow::Result<String> {
        let path = Self::resolve_path(relative_path)?;
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    pub fn resolve_path(relative_path: &str) -> anyhow::Result<PathBuf> {
        let rel = Path::new(relative_path);
        if rel.is_absolute() && rel.is_file() {
            return Ok(rel.to_path_buf());
        }

        if let Some(root) = env::var_os("CRAFTBOT_CONFIG_DIR") {
            let candidate = PathBuf::from(root).join(rel);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        if let Ok(cwd) = env::current_dir() {
            let candidate = cwd.join(rel);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        // This crate lives at <repo_root>/crates/bot-core.
        let candidate = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .ancestors()
            .nth(2)
            .ok_or_else(|| anyhow::anyhow!("CARGO_MANIFEST_DIR has insufficient ancestors"))?
            .join("config")
            .join(rel);
        if candidate.is_file() {
            return Ok(candidate);
        }

        anyhow::bail!("Config file not found for {:?}", rel);
    }
}
