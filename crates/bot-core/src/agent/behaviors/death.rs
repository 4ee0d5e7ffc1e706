use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::agent::actions::go;
use crate::agent::game_api::{Goal, WorldEvent};
use crate::agent::observation::{EntitySummary, Vec3};
use crate::agent::r#loop::AgentLoop;
use crate::error::{ActionError, FailedContext};

async fn dropped_items_near(
    agent: &AgentLoop,
    spot: Vec3,
) -> Result<Vec<EntitySummary>, ActionError> {
    let mut items: Vec<EntitySummary> = agent
        .api
        .entities()
        .await
        .failed(|| "I can't look for my items".to_string())?
        .into_iter()
        .filter(|e| {
            e.is_dropped_item() && e.position.distance_to(spot) <= agent.tuning.pickup_radius
        })
        .collect();
    items.sort_by(|a, b| {
        a.position
            .distance_to(spot)
            .total_cmp(&b.position.distance_to(spot))
    });
    Ok(items)
}

/// Walks onto one dropped item and polls until it is picked up, gone, or the pickup ceiling
/// passes. Returns whether the item went away.
async fn pick_up(agent: &AgentLoop, item: &EntitySummary) -> Result<bool, ActionError> {
    agent
        .api
        .set_goal(Goal::Near { pos: item.position, range: 0.0 })
        .await
        .failed(|| "I can't reach my items".to_string())?;
    let deadline = Instant::now() + agent.tuning.pickup_ceiling();
    let mut ticker = tokio::time::interval(agent.tuning.pickup_poll());
    while Instant::now() < deadline {
        ticker.tick().await;
        let entities = agent
            .api
            .entities()
            .await
            .failed(|| "I can't look for my items".to_string())?;
        let Some(current) = entities.into_iter().find(|e| e.id == item.id) else {
            return Ok(true);
        };
        let here = agent
            .api
            .status()
            .await
            .failed(|| "I can't tell where I am".to_string())?
            .position;
        if here.distance_to(current.position) <= agent.tuning.pickup_reach {
            return Ok(true);
        }
    }
    debug!(agent = %agent.name, item = item.id, "death.pickup_timeout");
    Ok(false)
}

/// After respawning, walks back to `death_spot` and sweeps the dropped items around it.
/// Returns how many items were collected.
pub async fn return_to(agent: &AgentLoop, death_spot: Vec3) -> Result<usize, ActionError> {
    let to = agent.announce_recipient();
    tokio::time::sleep(agent.tuning.respawn_settle()).await;
    agent
        .report(
            &to,
            format!("Going back to where I died at {death_spot} to get my items."),
        )
        .await;
    go(agent, Goal::Near { pos: death_spot, range: 1.0 }).await?;

    let items = dropped_items_near(agent, death_spot).await?;
    if items.is_empty() {
        agent.report(&to, "No items found near my death point.").await;
        return Ok(0);
    }
    let mut collected = 0;
    for item in &items {
        if pick_up(agent, item).await? {
            collected += 1;
        }
    }
    info!(agent = %agent.name, collected, total = items.len(), "death.swept");
    agent.report(&to, "Finished collecting my items.").await;
    Ok(collected)
}

pub(super) async fn run(agent: Arc<AgentLoop>, mut events: broadcast::Receiver<WorldEvent>) {
    loop {
        match events.recv().await {
            Ok(WorldEvent::Death) => match agent.api.status().await {
                Ok(status) => {
                    info!(agent = %agent.name, position = %status.position, "death.recorded");
                    agent.session.state().death_position = Some(status.position);
                }
                Err(err) => warn!(agent = %agent.name, "death.position_unknown: {err}"),
            },
            Ok(WorldEvent::Spawn) => {
                let spot = agent.session.state().death_position.take();
                if let Some(spot) = spot
                    && let Err(err) = return_to(&agent, spot).await
                {
                    agent.report(&agent.announce_recipient(), err.to_string()).await;
                }
            }
            Ok(WorldEvent::End { .. }) | Err(RecvError::Closed) => return,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(agent = %agent.name, skipped, "death.events_lagged");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::agent::observation::EntityKind;
    use crate::agent::testkit::{FakeLlm, FakeWorld, agent_with};

    fn dropped(id: u32, pos: Vec3) -> EntitySummary {
        EntitySummary {
            id,
            kind: EntityKind::Object,
            name: "item".to_string(),
            username: None,
            position: pos,
            height: 0.25,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn respawn_walks_back_and_sweeps_items() {
        let world = FakeWorld::new("Andy");
        let spot = Vec3::new(40.0, 64.0, 0.0);
        world.set_entities(vec![
            dropped(10, Vec3::new(42.0, 64.0, 0.0)),
            dropped(11, Vec3::new(41.0, 64.0, 0.0)),
            dropped(12, Vec3::new(90.0, 64.0, 0.0)),
        ]);
        let agent = agent_with(world.clone(), FakeLlm::new(Vec::<&str>::new()), |_| {});

        let collected = return_to(&agent, spot).await.unwrap();

        assert_eq!(collected, 2);
        let goals: Vec<String> = world
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("set_goal"))
            .collect();
        assert_eq!(
            goals,
            vec![
                "set_goal near 40.0,64.0,0.0 r1",
                "set_goal near 41.0,64.0,0.0 r0",
                "set_goal near 42.0,64.0,0.0 r0",
            ]
        );
        assert_eq!(
            world.chats().last().map(String::as_str),
            Some("Finished collecting my items.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_to_sweep_is_announced() {
        let world = FakeWorld::new("Andy");
        let agent = agent_with(world.clone(), FakeLlm::new(Vec::<&str>::new()), |_| {});

        let started = Instant::now();
        assert_eq!(return_to(&agent, Vec3::new(5.0, 64.0, 5.0)).await.unwrap(), 0);
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(
            world.chats().last().map(String::as_str),
            Some("No items found near my death point.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn death_then_spawn_triggers_the_return() {
        let world = FakeWorld::new("Andy");
        world.set_position(Vec3::new(7.0, 30.0, 7.0));
        let agent = agent_with(world.clone(), FakeLlm::new(Vec::<&str>::new()), |_| {});
        let task = tokio::spawn(run(Arc::clone(&agent), agent.api.subscribe()));

        world.emit(WorldEvent::Death);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            agent.session.state().death_position,
            Some(Vec3::new(7.0, 30.0, 7.0))
        );

        world.set_position(Vec3::new(0.0, 64.0, 0.0));
        world.emit(WorldEvent::Spawn);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(world.calls().contains(&"set_goal near 7.0,30.0,7.0 r1".to_string()));
        assert!(agent.session.state().death_position.is_none());
        task.abort();
    }
}
