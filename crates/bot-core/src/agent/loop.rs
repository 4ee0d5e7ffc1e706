use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::behaviors;
use super::conversation::Conversation;
use super::game_api::{GameApi, WorldEvent};
use super::harness::{self, LlmClient};
use super::session::Session;
use crate::config::{BotConfig, ChatMode, Tuning};
use crate::world::data::WorldData;

/// Where replies and feedback for one request go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Whispered to one player.
    Player(String),
    /// Whispered to each listed player.
    Players(Vec<String>),
    /// Public chat.
    Everyone,
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Player(name) => f.write_str(name),
            Recipient::Players(names) => f.write_str(&names.join(",")),
            Recipient::Everyone => f.write_str("everyone"),
        }
    }
}

/// Splits `text` into pieces of at most `max_chars` characters, in order.
pub fn chunk_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|c| c.iter().collect::<String>())
        .collect()
}

/// Why `AgentLoop::run` returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEnd {
    pub reason: Option<String>,
}

/// Everything one controlled agent needs: its collaborators, configuration, session state and
/// conversation log. Shared as `Arc<AgentLoop>` by every handler and behavior of that agent.
pub struct AgentLoop {
    pub name: String,
    pub config: BotConfig,
    pub tuning: Tuning,
    pub api: Arc<dyn GameApi>,
    pub data: Arc<dyn WorldData>,
    pub llm: Arc<dyn LlmClient>,
    pub session: Arc<Session>,
    conversation: Arc<Mutex<Conversation>>,
    turn_gate: tokio::sync::Mutex<()>,
}

impl AgentLoop {
    pub fn new(
        config: BotConfig,
        tuning: Tuning,
        api: Arc<dyn GameApi>,
        data: Arc<dyn WorldData>,
        llm: Arc<dyn LlmClient>,
        session: Arc<Session>,
        conversation: Arc<Mutex<Conversation>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: api.username().to_string(),
            config,
            tuning,
            api,
            data,
            llm,
            session,
            conversation,
            turn_gate: tokio::sync::Mutex::new(()),
        })
    }

    pub fn chat_mode(&self) -> ChatMode {
        self.config.chat_mode.unwrap_or(ChatMode::Private)
    }

    pub fn conversation(&self) -> MutexGuard<'_, Conversation> {
        self.conversation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn turn_gate(&self) -> &tokio::sync::Mutex<()> {
        &self.turn_gate
    }

    /// Ignores our own messages and anyone outside a non-empty allow-list.
    pub fn accepts(&self, username: &str) -> bool {
        username != self.name && self.config.allows(username)
    }

    pub fn recipient_for(&self, username: &str) -> Recipient {
        match self.chat_mode() {
            ChatMode::Public => Recipient::Everyone,
            ChatMode::Private => Recipient::Player(username.to_string()),
        }
    }

    /// Audience for messages nobody asked for (idle musings, distress calls).
    pub fn announce_recipient(&self) -> Recipient {
        if self.config.allowed_users.is_empty() {
            Recipient::Everyone
        } else {
            Recipient::Players(self.config.allowed_users.clone())
        }
    }

    /// Delivers `text` in order, split to the chat length limit.
    pub async fn send(&self, to: &Recipient, text: &str) {
        for chunk in chunk_message(text, self.tuning.chunk_len()) {
            let sent = match to {
                Recipient::Everyone => self.api.chat(chunk).await,
                Recipient::Player(name) => self.api.whisper(name.clone(), chunk).await,
                Recipient::Players(names) => {
                    let mut res = Ok(());
                    for name in names {
                        res = res.and(self.api.whisper(name.clone(), chunk.clone()).await);
                    }
                    res
                }
            };
            if let Err(err) = sent {
                warn!(agent = %self.name, user = %to, "chat.send_failed: {err}");
            }
        }
    }

    /// Action feedback: logged, then delivered and/or appended to the log per the agent's
    /// feedback toggles.
    pub async fn report(&self, to: &Recipient, msg: impl Into<String>) {
        let msg = msg.into();
        info!(agent = %self.name, user = %to, "feedback: {msg}");
        if self.config.action_conversation_feedback {
            self.conversation().push_assistant(msg.clone());
        }
        if self.config.action_chat_feedback {
            self.send(to, &msg).await;
        }
    }

    /// Routes world events until the connection ends, then tears down every task of the
    /// session. Saved places survive for the next connection.
    pub async fn run(self: &Arc<Self>) -> RunEnd {
        let mut events = self.api.subscribe();
        behaviors::start(self);
        info!(agent = %self.name, mode = ?self.chat_mode(), "agent.started");

        let reason = loop {
            match events.recv().await {
                Ok(WorldEvent::Chat { username, message }) => {
                    if self.chat_mode() == ChatMode::Public {
                        self.on_message(username, message);
                    }
                }
                Ok(WorldEvent::Whisper { username, message }) => self.on_message(username, message),
                Ok(WorldEvent::End { reason }) => break reason,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(agent = %self.name, skipped, "events.lagged");
                }
                Err(RecvError::Closed) => break Some("event stream closed".to_string()),
            }
        };

        self.session.state().teardown();
        info!(agent = %self.name, reason = ?reason, "agent.stopped");
        RunEnd { reason }
    }

    fn on_message(self: &Arc<Self>, username: String, message: String) {
        if !self.accepts(&username) {
            debug!(agent = %self.name, user = %username, "chat.ignored");
            return;
        }
        let agent = Arc::clone(self);
        let to = self.recipient_for(&username);
        tokio::spawn(async move {
            harness::handle_message(&agent, &to, &message).await;
        });
    }
}
