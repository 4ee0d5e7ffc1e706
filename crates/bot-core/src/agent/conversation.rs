use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One JSON file per agent holding the full message array.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    path: PathBuf,
}

impl ConversationStore {
    pub fn new(dir: impl AsRef<Path>, agent: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{agent}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> anyhow::Result<Option<Vec<ChatMessage>>> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("read conversation {}", self.path.display()))?;
        let messages: Vec<ChatMessage> = serde_json::from_str(&text)
            .with_context(|| format!("parse conversation {}", self.path.display()))?;
        Ok(Some(messages))
    }

    /// Rewrites the whole file.
    pub fn save(&self, messages: &[ChatMessage]) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create conversation dir {}", dir.display()))?;
        }
        let text = serde_json::to_string_pretty(messages).context("serialize conversation")?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("write conversation {}", self.path.display()))
    }
}

/// Role-tagged message log sent to the model on every turn.
///
/// Element 0 is always the current system prompt. With a store attached, every append is
/// followed by a full flush.
#[derive(Debug)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    store: Option<ConversationStore>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::new(Role::System, system_prompt)],
            store: None,
        }
    }

    /// Restores a saved log when one exists and is non-empty, re-syncing element 0 to
    /// `system_prompt`. Unreadable files are logged and replaced by a fresh log.
    pub fn load(system_prompt: &str, store: Option<ConversationStore>) -> Self {
        let mut conversation = Self::new(system_prompt);
        if let Some(store) = &store {
            match store.load() {
                Ok(Some(saved)) if !saved.is_empty() => {
                    conversation.messages = saved;
                    conversation.sync_system_prompt(system_prompt);
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(path = %store.path().display(), "conversation.load_failed: {err:#}");
                }
            }
        }
        conversation.store = store;
        conversation
    }

    fn sync_system_prompt(&mut self, system_prompt: &str) {
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => first.content = system_prompt.to_string(),
            _ => self
                .messages
                .insert(0, ChatMessage::new(Role::System, system_prompt)),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::new(Role::User, content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::new(Role::Assistant, content));
    }

    /// Query results enter the log as assistant-authored context, never as user input.
    pub fn push_query_result(&mut self, query: &str, result: &str) {
        self.push_assistant(format!("{query}: {result}"));
    }

    /// Drops everything but the system prompt.
    pub fn clear(&mut self) {
        self.messages.truncate(1);
        self.flush();
    }

    fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.flush();
    }

    fn flush(&self) {
        if let Some(store) = &self.store
            && let Err(err) = store.save(&self.messages)
        {
            warn!(path = %store.path().display(), "conversation.flush_failed: {err:#}");
        }
    }
}
