use std::f64::consts::TAU;
use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use super::{locate_player, me, nearest_block, spawn_continuous};
use crate::agent::game_api::{BlockMatcher, Goal, find_player, nearest_entity};
use crate::agent::observation::Vec3;
use crate::agent::r#loop::{AgentLoop, Recipient};
use crate::agent::session::Concern;
use crate::error::{ActionError, FailedContext};

async fn set_goal(agent: &AgentLoop, goal: Goal) -> Result<(), ActionError> {
    agent
        .api
        .set_goal(goal)
        .await
        .failed(|| "I can't move right now".to_string())
}

pub async fn stop(agent: &AgentLoop, to: &Recipient) -> Result<(), ActionError> {
    let cancelled = agent.session.state().cancel_continuous();
    debug!(agent = %agent.name, cancelled, "actions.stopped");
    agent
        .api
        .clear_goal()
        .await
        .failed(|| "Failed to stop".to_string())?;
    agent.report(to, "Stopped all actions").await;
    Ok(())
}

pub async fn go_to_player(
    agent: &AgentLoop,
    to: &Recipient,
    player: &str,
    range: f64,
) -> Result<(), ActionError> {
    let target = locate_player(agent, player).await?;
    agent
        .report(to, format!("Going to player: {player} (distance: {range})"))
        .await;
    set_goal(agent, Goal::Near { pos: target.position, range }).await
}

/// Installs the follow task: every poll, re-issues a proximity goal only when the target is
/// farther than `range`. Ends on `!stop`, a newer follow, or when the target stays out of sight.
pub async fn follow_player(
    agent: &Arc<AgentLoop>,
    to: &Recipient,
    player: &str,
    range: f64,
) -> Result<(), ActionError> {
    locate_player(agent, player).await?;
    agent
        .report(to, format!("Following player: {player} at distance: {range}"))
        .await;

    let follower = Arc::clone(agent);
    let target = player.to_string();
    let to = to.clone();
    spawn_continuous(agent, Concern::Follow, to.clone(), async move {
        follow_loop(&follower, &to, &target, range).await
    });
    agent.session.state().following = Some(player.to_string());
    Ok(())
}

async fn follow_loop(
    agent: &AgentLoop,
    to: &Recipient,
    player: &str,
    range: f64,
) -> Result<(), ActionError> {
    let mut ticker = tokio::time::interval(agent.tuning.follow_poll());
    let mut missed = 0;
    loop {
        ticker.tick().await;
        let target = find_player(agent.api.as_ref(), player)
            .await
            .failed(|| format!("Stopped following {player}"))?;
        let Some(target) = target else {
            missed += 1;
            if missed >= agent.tuning.follow_lost_polls {
                {
                    let mut state = agent.session.state();
                    if state.following.as_deref() == Some(player) {
                        state.following = None;
                    }
                }
                agent.report(to, format!("Lost track of {player}")).await;
                return Ok(());
            }
            continue;
        };
        missed = 0;
        let here = me(agent).await?.position;
        if here.distance_to(target.position) > range {
            set_goal(agent, Goal::Near { pos: target.position, range }).await?;
        }
    }
}

pub async fn go_to_coordinates(
    agent: &AgentLoop,
    to: &Recipient,
    target: Vec3,
    range: f64,
) -> Result<(), ActionError> {
    agent
        .report(
            to,
            format!("Going to coordinates: {}, {}, {}", target.x, target.y, target.z),
        )
        .await;
    set_goal(agent, Goal::Near { pos: target, range }).await
}

pub async fn search_for_block(
    agent: &AgentLoop,
    to: &Recipient,
    block: &str,
    range: f64,
) -> Result<(), ActionError> {
    let info = agent
        .data
        .block_by_name(block)
        .ok_or_else(|| ActionError::resolution(format!("Unknown block type: {block}")))?;
    agent
        .report(to, format!("Searching for block: {block} in range: {range}"))
        .await;
    let found = nearest_block(agent, BlockMatcher::Ids(vec![info.id]), range)
        .await?
        .ok_or_else(|| ActionError::resolution(format!("No {block} found within {range} blocks")))?;
    agent
        .report(to, format!("Found {block} at {}", found.position))
        .await;
    set_goal(agent, Goal::Block { pos: found.position }).await
}

pub async fn search_for_entity(
    agent: &AgentLoop,
    to: &Recipient,
    entity: &str,
    range: f64,
) -> Result<(), ActionError> {
    agent
        .report(to, format!("Searching for entity: {entity} in range: {range}"))
        .await;
    let here = me(agent).await?.position;
    let entities = agent
        .api
        .entities()
        .await
        .failed(|| "I can't look around".to_string())?;
    let found = nearest_entity(entities, here, range, |e| e.name == entity)
        .ok_or_else(|| {
            ActionError::resolution(format!("No {entity} found within {range} blocks"))
        })?;
    agent
        .report(to, format!("Found {entity} at {}", found.position))
        .await;
    set_goal(agent, Goal::Near { pos: found.position, range: 2.0 }).await
}

pub async fn move_away(
    agent: &AgentLoop,
    to: &Recipient,
    distance: f64,
) -> Result<(), ActionError> {
    agent
        .report(to, format!("Moving away distance: {distance}"))
        .await;
    let here = me(agent).await?.position;
    let angle = rand::thread_rng().gen_range(0.0..TAU);
    set_goal(
        agent,
        Goal::Xz {
            x: here.x + angle.cos() * distance,
            z: here.z + angle.sin() * distance,
        },
    )
    .await
}

pub async fn remember_here(
    agent: &AgentLoop,
    to: &Recipient,
    place: &str,
) -> Result<(), ActionError> {
    let pos = me(agent).await?.position;
    agent
        .session
        .state()
        .saved_places
        .insert(place.to_string(), pos);
    agent
        .report(
            to,
            format!("Saved location \"{place}\" at {:.1}, {:.1}, {:.1}", pos.x, pos.y, pos.z),
        )
        .await;
    Ok(())
}

pub async fn go_to_remembered_place(
    agent: &AgentLoop,
    to: &Recipient,
    place: &str,
) -> Result<(), ActionError> {
    let saved = agent.session.state().saved_places.get(place).copied();
    let pos = saved
        .ok_or_else(|| ActionError::resolution(format!("No saved place named: {place}")))?;
    agent
        .report(
            to,
            format!(
                "Going to remembered place: {place} at {:.1}, {:.1}, {:.1}",
                pos.x, pos.y, pos.z
            ),
        )
        .await;
    set_goal(agent, Goal::Near { pos, range: 1.0 }).await
}

/// Clears movement and stops following. A timed stay reports when it is over.
pub async fn stay(
    agent: &Arc<AgentLoop>,
    to: &Recipient,
    seconds: Option<u64>,
) -> Result<(), ActionError> {
    {
        let mut state = agent.session.state();
        state.slot(Concern::Follow).cancel();
        state.following = None;
    }
    agent
        .api
        .clear_goal()
        .await
        .failed(|| "Failed to stay".to_string())?;

    match seconds {
        Some(secs) => {
            agent
                .report(to, format!("Staying for {secs} seconds"))
                .await;
            let stayer = Arc::clone(agent);
            let done_to = to.clone();
            spawn_continuous(agent, Concern::Stay, to.clone(), async move {
                tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
                stayer.report(&done_to, "Finished staying").await;
                Ok(())
            });
        }
        None => {
            agent.session.state().slot(Concern::Stay).cancel();
            agent.report(to, "Staying for forever").await;
        }
    }
    Ok(())
}
