use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::agent::actions::combat::{Pursuit, pursue};
use crate::agent::actions::me;
use crate::agent::game_api::{WorldEvent, nearest_entity};
use crate::agent::observation::{EntityKind, EntitySummary};
use crate::agent::r#loop::AgentLoop;
use crate::agent::session::Concern;
use crate::error::{ActionError, FailedContext};

/// Mob kinds the agent fights back against.
pub const HOSTILE_MOBS: [&str; 31] = [
    "blaze",
    "bogged",
    "breeze",
    "cave_spider",
    "creeper",
    "drowned",
    "elder_guardian",
    "enderman",
    "endermite",
    "evoker",
    "ghast",
    "guardian",
    "hoglin",
    "husk",
    "magma_cube",
    "phantom",
    "piglin_brute",
    "pillager",
    "ravager",
    "shulker",
    "silverfish",
    "skeleton",
    "slime",
    "spider",
    "stray",
    "vex",
    "vindicator",
    "warden",
    "witch",
    "wither_skeleton",
    "zombie",
];

fn is_threat(agent: &AgentLoop, entity: &EntitySummary) -> bool {
    match entity.kind {
        EntityKind::Mob => HOSTILE_MOBS.contains(&entity.name.as_str()),
        EntityKind::Player => {
            agent.config.defend_against_players
                && entity.username.as_deref() != Some(agent.name.as_str())
        }
        _ => false,
    }
}

/// Reacts to taking damage: engages the nearest threat unless already fighting it. A new
/// threat replaces the previous defense task. Returns the engaged entity id.
pub async fn on_hurt(agent: &Arc<AgentLoop>) -> Result<Option<u32>, ActionError> {
    let here = me(agent).await?.position;
    let entities = agent
        .api
        .entities()
        .await
        .failed(|| "I can't see who hit me".to_string())?;
    let Some(threat) = nearest_entity(entities, here, agent.tuning.defense_radius, |e| {
        is_threat(agent, e)
    }) else {
        debug!(agent = %agent.name, "defense.no_threat");
        return Ok(None);
    };

    {
        let mut state = agent.session.state();
        if state.defense_target == Some(threat.id) && state.is_active(Concern::Defense) {
            return Ok(Some(threat.id));
        }
        state.defense_target = Some(threat.id);
    }
    info!(agent = %agent.name, target = %threat.label(), "defense.engage");

    let fighter = Arc::clone(agent);
    let pursuit = Pursuit {
        target: threat.id,
        flee_below: Some(agent.tuning.defense_health_floor),
        ceiling: agent.tuning.combat_ceiling(),
    };
    let handle = tokio::spawn(async move {
        match pursue(&fighter, pursuit).await {
            Ok(end) => {
                debug!(agent = %fighter.name, target = pursuit.target, ?end, "defense.ended")
            }
            Err(err) => debug!(agent = %fighter.name, "defense.failed: {err}"),
        }
        let mut state = fighter.session.state();
        if state.defense_target == Some(pursuit.target) {
            state.defense_target = None;
        }
    });
    agent.session.state().replace_task(Concern::Defense, handle);
    Ok(Some(threat.id))
}

pub(super) async fn run(agent: Arc<AgentLoop>, mut events: broadcast::Receiver<WorldEvent>) {
    loop {
        match events.recv().await {
            Ok(WorldEvent::Hurt) => {
                if let Err(err) = on_hurt(&agent).await {
                    debug!(agent = %agent.name, "defense.failed: {err}");
                }
            }
            Ok(WorldEvent::End { .. }) | Err(RecvError::Closed) => return,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(agent = %agent.name, skipped, "defense.events_lagged");
            }
        }
    }
}
