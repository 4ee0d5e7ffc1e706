mod bridge;

use std::sync::{Arc, Mutex};

use clap::Parser;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use craftbot_core::agent::conversation::{Conversation, ConversationStore};
use craftbot_core::agent::game_api::GameApi;
use craftbot_core::agent::prompt::persona_prompt;
use craftbot_core::agent::{AgentLoop, Session, SessionRegistry};
use craftbot_core::config::{BotConfig, Config, ConfigLoader, Keys, Provider};
use craftbot_core::llm::{ChatCompletionsClient, ChatCompletionsConfig};
use craftbot_core::world::data::DataTables;

use crate::bridge::{BridgeGameApi, Login};

#[derive(Debug, Parser)]
#[command(name = "craftbot", about = "Runs LLM-driven agents against a world bridge")]
struct Cli {
    /// TOML config; relative paths are searched in CRAFTBOT_CONFIG_DIR, ./ and config/.
    #[arg(long, env = "CRAFTBOT_CONFIG", default_value = "craftbot.toml")]
    config: String,
    /// Run only the bot with this username.
    #[arg(long)]
    bot: Option<String>,
}

/// Everything one bot keeps across reconnects.
struct BotRuntime {
    config: Arc<Config>,
    bot: BotConfig,
    llm: Arc<ChatCompletionsClient>,
    session: Arc<Session>,
    conversation: Arc<Mutex<Conversation>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    let cli = Cli::parse();
    let config: Config = ConfigLoader::parse_from_file(&cli.config)?;
    config.validate()?;
    let template = ConfigLoader::read_text(&config.prompt_file)?;
    let keys: Keys = match ConfigLoader::read_json(&config.keys_file) {
        Ok(keys) => keys,
        Err(err) => {
            warn!("keys.unavailable: {err:#}");
            Keys::default()
        }
    };

    let config = Arc::new(config);
    let sessions = SessionRegistry::default();
    let mut bots = JoinSet::new();
    for bot in &config.bots {
        if let Some(only) = &cli.bot
            && only != &bot.username
        {
            continue;
        }
        let runtime = match prepare_bot(&config, bot, &template, &keys, &sessions) {
            Ok(runtime) => runtime,
            Err(err) => {
                error!(agent = %bot.username, "bot.skipped: {err:#}");
                continue;
            }
        };
        bots.spawn(run_with_reconnect(runtime));
    }

    if bots.is_empty() {
        anyhow::bail!("no bot could be started");
    }
    while let Some(joined) = bots.join_next().await {
        if let Err(err) = joined {
            error!("bot.panicked: {err}");
        }
    }
    Ok(())
}

fn prepare_bot(
    config: &Arc<Config>,
    bot: &BotConfig,
    template: &str,
    keys: &Keys,
    sessions: &SessionRegistry,
) -> anyhow::Result<BotRuntime> {
    let mut bot = bot.clone();
    bot.chat_mode = Some(config.chat_mode_for(&bot));

    let llm = Arc::new(ChatCompletionsClient::new(llm_config(&bot, keys)?));
    let system_prompt = persona_prompt(template, &bot.username, bot.personality.as_deref());
    let store = bot
        .save_conversation
        .then(|| ConversationStore::new(&config.conversations_dir, &bot.username));
    let conversation = Arc::new(Mutex::new(Conversation::load(&system_prompt, store)));

    Ok(BotRuntime {
        config: Arc::clone(config),
        session: sessions.get_or_create(&bot.username),
        bot,
        llm,
        conversation,
    })
}

/// Local Ollama needs no key; every hosted provider does.
fn llm_config(bot: &BotConfig, keys: &Keys) -> anyhow::Result<ChatCompletionsConfig> {
    let mut cfg = ChatCompletionsConfig::new(bot.endpoint(), bot.model.clone());
    cfg.api_key = keys.for_provider(bot.provider).map(str::to_string);
    if cfg.api_key.is_none() && bot.provider != Provider::Ollama {
        anyhow::bail!(
            "missing {} for provider {:?}",
            bot.provider.key_name(),
            bot.provider
        );
    }
    Ok(cfg)
}

/// How one connection ended.
struct Attempt {
    logged_in: bool,
    reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    Reconnect,
    GiveUp,
}

/// A bot gets one reconnect per drop. Only a reconnect that never logs in uses it up.
fn retry_after(previous_attempt_failed: bool, logged_in: bool) -> Retry {
    if previous_attempt_failed && !logged_in {
        Retry::GiveUp
    } else {
        Retry::Reconnect
    }
}

/// Runs the bot, reconnecting once after each disconnect.
async fn run_with_reconnect(runtime: BotRuntime) {
    let name = runtime.bot.username.clone();
    let mut reconnect_attempted = false;
    loop {
        let attempt = connect_and_run(&runtime).await;
        if retry_after(reconnect_attempted, attempt.logged_in) == Retry::GiveUp {
            error!(
                agent = %name,
                reason = %attempt.reason,
                "Couldn't reconnect: previous attempt failed."
            );
            return;
        }
        reconnect_attempted = true;
        let delay = runtime.config.tuning.reconnect_delay();
        warn!(
            agent = %name,
            reason = %attempt.reason,
            delay_secs = delay.as_secs(),
            "bot.disconnected"
        );
        tokio::time::sleep(delay).await;
    }
}

async fn login(runtime: &BotRuntime) -> anyhow::Result<(Arc<BridgeGameApi>, DataTables)> {
    let config = &runtime.config;
    let api = BridgeGameApi::connect(
        &config.bridge_addr,
        Login {
            username: runtime.bot.username.clone(),
            host: config.host.clone(),
            port: config.port,
            version: config.minecraft_version.clone(),
        },
    )
    .await?;
    let data = api.data_tables().await?;
    info!(agent = %runtime.bot.username, items = data.item_count(), "bot.logged_in");
    Ok((api, data))
}

async fn connect_and_run(runtime: &BotRuntime) -> Attempt {
    let (api, data) = match login(runtime).await {
        Ok(connected) => connected,
        Err(err) => {
            return Attempt {
                logged_in: false,
                reason: format!("{err:#}"),
            };
        }
    };

    let config = &runtime.config;
    if let Some(greeting) = &config.init_message
        && let Err(err) = api.chat(greeting.clone()).await
    {
        return Attempt {
            logged_in: true,
            reason: format!("send init message: {err}"),
        };
    }

    let agent = AgentLoop::new(
        runtime.bot.clone(),
        config.tuning.clone(),
        api,
        Arc::new(data),
        runtime.llm.clone(),
        Arc::clone(&runtime.session),
        Arc::clone(&runtime.conversation),
    );
    let end = agent.run().await;
    Attempt {
        logged_in: true,
        reason: end.reason.unwrap_or_else(|| "connection ended".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(json: &str) -> Keys {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn cli_accepts_a_bot_filter() {
        let cli = Cli::try_parse_from(["craftbot", "--bot", "Andy"]).unwrap();
        assert_eq!(cli.bot.as_deref(), Some("Andy"));
    }

    #[test]
    fn a_reconnect_that_logs_in_earns_another() {
        assert_eq!(retry_after(false, false), Retry::Reconnect);
        assert_eq!(retry_after(false, true), Retry::Reconnect);
        // a later drop or !restart after a good reconnect
        assert_eq!(retry_after(true, true), Retry::Reconnect);
        assert_eq!(retry_after(true, false), Retry::GiveUp);
    }

    #[test]
    fn hosted_providers_need_a_key() {
        let bot = BotConfig {
            username: "Andy".to_string(),
            ..BotConfig::default()
        };
        assert!(llm_config(&bot, &keys("{}")).is_err());
        assert!(llm_config(&bot, &keys(r#"{"OPENAI_API_KEY": ""}"#)).is_err());

        let cfg = llm_config(&bot, &keys(r#"{"OPENAI_API_KEY": "sk-test"}"#)).unwrap();
        assert_eq!(cfg.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn ollama_runs_without_a_key() {
        let bot = BotConfig {
            username: "Andy".to_string(),
            provider: Provider::Ollama,
            model: "llama3".to_string(),
            ..BotConfig::default()
        };
        let cfg = llm_config(&bot, &keys("{}")).unwrap();
        assert!(cfg.api_key.is_none());
        assert_eq!(cfg.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn lone_bot_gets_public_chat() {
        let config = Arc::new(Config {
            bots: vec![BotConfig {
                username: "Andy".to_string(),
                ..BotConfig::default()
            }],
            ..Config::default()
        });
        let sessions = SessionRegistry::default();
        let runtime = prepare_bot(
            &config,
            &config.bots[0],
            "You are {USERNAME}. {PERSONALITY}",
            &keys(r#"{"OPENAI_API_KEY": "sk-test"}"#),
            &sessions,
        )
        .unwrap();
        assert_eq!(
            runtime.bot.chat_mode,
            Some(craftbot_core::config::ChatMode::Public)
        );
        let convo = runtime.conversation.lock().unwrap();
        assert!(convo.messages()[0].content.starts_with("You are Andy."));
        assert_eq!(sessions.len(), 1);
    }
}
