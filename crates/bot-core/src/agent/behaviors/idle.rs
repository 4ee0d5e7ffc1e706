use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info};

use crate::agent::game_api::WorldEvent;
use crate::agent::harness;
use crate::agent::r#loop::AgentLoop;
use crate::agent::session::Concern;

/// Re-arms the idle timer. When it expires without another touch, the idle message runs
/// through the resolution loop as if someone had said it. No-op when the timeout is 0.
pub fn touch(agent: &Arc<AgentLoop>) {
    let timeout = agent.config.idle_timeout_secs;
    if timeout == 0 {
        return;
    }
    let idler = Arc::clone(agent);
    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(timeout)).await;
        info!(agent = %idler.name, timeout, "idle.fired");
        // The turn touches the timer again, which aborts this task.
        tokio::spawn(async move {
            let to = idler.announce_recipient();
            let message = idler.config.idle_message.clone();
            harness::handle_message(&idler, &to, &message).await;
        });
    });
    agent.session.state().replace_task(Concern::Idle, handle);
}

/// Resets the idle timer on world activity worth treating as "something happened".
pub(super) async fn watch(agent: Arc<AgentLoop>, mut events: broadcast::Receiver<WorldEvent>) {
    loop {
        match events.recv().await {
            Ok(
                WorldEvent::PathUpdate { .. } | WorldEvent::DigCompleted { .. } | WorldEvent::Hurt,
            ) => {
                debug!(agent = %agent.name, "idle.reset");
                touch(&agent);
            }
            Ok(WorldEvent::End { .. }) | Err(RecvError::Closed) => return,
            Ok(_) | Err(RecvError::Lagged(_)) => {}
        }
    }
}
