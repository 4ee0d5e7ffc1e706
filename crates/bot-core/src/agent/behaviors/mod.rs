//! Background behaviors. Each runs as its own task for the lifetime of one connection and is
//! registered with the session so disconnect teardown aborts it.

pub mod death;
pub mod defense;
pub mod eat;
pub mod idle;
pub mod look;

use std::sync::Arc;

use tracing::info;

use super::r#loop::AgentLoop;

/// Starts every behavior the agent's configuration enables. Event-driven behaviors subscribe
/// before returning so nothing emitted right after connect is missed.
pub fn start(agent: &Arc<AgentLoop>) {
    let config = &agent.config;
    let mut handles = Vec::new();
    if config.look_at_player {
        handles.push(tokio::spawn(look::run(Arc::clone(agent))));
    }
    if config.auto_eat {
        handles.push(tokio::spawn(eat::run(Arc::clone(agent))));
    }
    if config.auto_defend {
        handles.push(tokio::spawn(defense::run(Arc::clone(agent), agent.api.subscribe())));
    }
    if config.return_on_death {
        handles.push(tokio::spawn(death::run(Arc::clone(agent), agent.api.subscribe())));
    }
    if config.idle_timeout_secs > 0 {
        handles.push(tokio::spawn(idle::watch(Arc::clone(agent), agent.api.subscribe())));
    }

    info!(agent = %agent.name, count = handles.len(), "behaviors.started");
    {
        let mut state = agent.session.state();
        for handle in handles {
            state.add_behavior(handle);
        }
    }
    idle::touch(agent);
}
