use std::sync::Arc;

use tracing::{debug, info, warn};

use super::behaviors::idle;
use super::conversation::ChatMessage;
use super::executor;
use super::game_api::BoxFuture;
use super::queries;
use super::r#loop::{AgentLoop, Recipient};
use super::wire::parse_commands;

pub trait LlmClient: Send + Sync {
    fn complete<'a>(&'a self, messages: Vec<ChatMessage>) -> BoxFuture<'a, anyhow::Result<String>>;
}

/// Re-prompts allowed after a query round while the model keeps emitting actions.
pub const MAX_FOLLOW_UPS: usize = 3;

pub const BRAIN_DISCONNECTED: &str = "My brain disconnected, try again.";
pub const NO_CONTENT: &str = "(no content)";
pub const FOLLOW_UP_FAILED: &str = "(error getting final response)";

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Text delivered to the user.
    pub delivered: String,
    /// Query names resolved during the turn, in order.
    pub queries: Vec<String>,
    /// Action commands handed to the dispatcher.
    pub dispatched: usize,
    pub model_calls: usize,
}

/// One completion over the current log. Failures come back as `Err` for the caller to
/// substitute; an empty completion becomes `NO_CONTENT`.
async fn complete(agent: &AgentLoop) -> anyhow::Result<String> {
    let snapshot = agent.conversation().snapshot();
    let text = agent.llm.complete(snapshot).await?;
    Ok(if text.trim().is_empty() {
        NO_CONTENT.to_string()
    } else {
        text.trim().to_string()
    })
}

/// Runs the resolution loop for one inbound message.
///
/// A reply without queries is delivered as-is and its actions dispatched. A reply with
/// queries stays hidden: each query is resolved into the log as assistant context, the model
/// is asked again, and while that answer still carries action commands they are executed and
/// the model re-prompted, at most `MAX_FOLLOW_UPS` times. Whatever text is pending then is
/// delivered. Turns of one agent never overlap.
pub async fn handle_message(
    agent: &Arc<AgentLoop>,
    from: &Recipient,
    message: &str,
) -> TurnOutcome {
    let _turn = agent.turn_gate().lock().await;
    idle::touch(agent);
    info!(agent = %agent.name, user = %from, "turn.request: {message}");

    agent.conversation().push_user(message);
    let mut model_calls = 1;
    let reply = match complete(agent).await {
        Ok(text) => text,
        Err(err) => {
            warn!(agent = %agent.name, "turn.llm_failed: {err:#}");
            BRAIN_DISCONNECTED.to_string()
        }
    };
    agent.conversation().push_assistant(reply.clone());

    let commands = parse_commands(&reply);
    let query_names: Vec<String> = commands
        .iter()
        .filter(|c| c.is_query())
        .map(|c| c.name.clone())
        .collect();

    if query_names.is_empty() {
        info!(agent = %agent.name, user = %from, "turn.reply: {reply}");
        agent.send(from, &reply).await;
        let dispatched = executor::dispatch_all(agent, &commands, from).len();
        return TurnOutcome {
            delivered: reply,
            queries: query_names,
            dispatched,
            model_calls,
        };
    }

    for name in &query_names {
        if let Some(result) = queries::resolve(agent, name).await {
            debug!(agent = %agent.name, query = %name, "turn.query_result: {result}");
            agent.conversation().push_query_result(name, &result);
        }
    }

    model_calls += 1;
    let mut pending = match complete(agent).await {
        Ok(text) => text,
        Err(err) => {
            warn!(agent = %agent.name, "turn.llm_failed: {err:#}");
            FOLLOW_UP_FAILED.to_string()
        }
    };

    let mut dispatched = 0;
    for round in 0..MAX_FOLLOW_UPS {
        let actions: Vec<_> = parse_commands(&pending)
            .into_iter()
            .filter(|c| !c.is_query())
            .collect();
        if actions.is_empty() {
            break;
        }
        debug!(agent = %agent.name, round, "turn.follow_up: {pending}");
        dispatched += executor::dispatch_all(agent, &actions, from).len();
        agent
            .conversation()
            .push_assistant(format!("Executed commands: {pending}"));

        model_calls += 1;
        match complete(agent).await {
            Ok(text) => pending = text,
            Err(err) => {
                warn!(agent = %agent.name, "turn.follow_up_failed: {err:#}");
                break;
            }
        }
    }

    info!(agent = %agent.name, user = %from, "turn.reply: {pending}");
    agent.send(from, &pending).await;
    agent.conversation().push_assistant(pending.clone());

    TurnOutcome {
        delivered: pending,
        queries: query_names,
        dispatched,
        model_calls,
    }
}
