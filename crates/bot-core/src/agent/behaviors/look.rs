use std::sync::Arc;

use tracing::debug;

use crate::agent::game_api::nearest_entity;
use crate::agent::observation::EntityKind;
use crate::agent::r#loop::AgentLoop;
use crate::error::{WorldError, WorldResult};

/// Turns toward the nearest other player within the look radius. Returns whether it turned.
pub async fn look_once(agent: &AgentLoop) -> WorldResult<bool> {
    let here = agent.api.status().await?.position;
    let entities = agent.api.entities().await?;
    let nearest = nearest_entity(entities, here, agent.tuning.look_radius, |e| {
        e.kind == EntityKind::Player && e.username.as_deref() != Some(agent.name.as_str())
    });
    match nearest {
        Some(player) => {
            agent
                .api
                .look_at(player.position.offset(0.0, player.height, 0.0))
                .await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

pub(super) async fn run(agent: Arc<AgentLoop>) {
    let mut ticker = tokio::time::interval(agent.tuning.look_interval());
    loop {
        ticker.tick().await;
        match look_once(&agent).await {
            Ok(_) => {}
            Err(WorldError::Disconnected) => return,
            Err(err) => debug!(agent = %agent.name, "look.failed: {err}"),
        }
    }
}
