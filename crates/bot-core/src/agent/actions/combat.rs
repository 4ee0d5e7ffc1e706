//! Pursue-and-strike combat shared by explicit attacks and auto-defense.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::{locate_player, me, spawn_continuous};
use crate::agent::game_api::{Goal, nearest_entity};
use crate::agent::observation::{EntityKind, Vec3};
use crate::agent::r#loop::{AgentLoop, Recipient};
use crate::agent::session::Concern;
use crate::error::{ActionError, FailedContext};

#[derive(Debug, Clone, Copy)]
pub struct Pursuit {
    pub target: u32,
    /// Run away instead of fighting once health drops below this.
    pub flee_below: Option<f32>,
    pub ceiling: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PursuitEnd {
    /// The target despawned or died.
    TargetLost,
    OutOfRange,
    /// Got away after dropping below the flee floor.
    Fled,
    Ceiling,
}

fn away_from(here: Vec3, threat: Vec3, distance: f64) -> Goal {
    let (dx, dz) = (here.x - threat.x, here.z - threat.z);
    let len = dx.hypot(dz);
    let (ux, uz) = if len < f64::EPSILON { (1.0, 0.0) } else { (dx / len, dz / len) };
    Goal::Xz {
        x: here.x + ux * distance,
        z: here.z + uz * distance,
    }
}

/// Closes in and strikes `pursuit.target` every combat poll until the target is gone, out of
/// pursuit range, or the ceiling elapses. The movement goal is cleared however it ends.
pub async fn pursue(agent: &AgentLoop, pursuit: Pursuit) -> Result<PursuitEnd, ActionError> {
    let outcome = chase(agent, pursuit).await;
    let _ = agent.api.clear_goal().await;
    match &outcome {
        Ok(end) => debug!(agent = %agent.name, target = pursuit.target, ?end, "combat.ended"),
        Err(err) => {
            debug!(agent = %agent.name, target = pursuit.target, "combat.aborted: {err}")
        }
    }
    outcome
}

async fn chase(agent: &AgentLoop, pursuit: Pursuit) -> Result<PursuitEnd, ActionError> {
    let deadline = Instant::now() + pursuit.ceiling;
    let mut ticker = tokio::time::interval(agent.tuning.combat_poll());
    let mut fleeing = false;

    loop {
        ticker.tick().await;
        if Instant::now() >= deadline {
            return Ok(PursuitEnd::Ceiling);
        }
        let entities = agent
            .api
            .entities()
            .await
            .failed(|| "I lost sight of my target".to_string())?;
        let Some(target) = entities.into_iter().find(|e| e.id == pursuit.target) else {
            return Ok(PursuitEnd::TargetLost);
        };
        let status = me(agent).await?;
        if !status.alive {
            return Ok(PursuitEnd::TargetLost);
        }
        let distance = status.position.distance_to(target.position);
        if distance > agent.tuning.pursuit_range {
            return Ok(if fleeing { PursuitEnd::Fled } else { PursuitEnd::OutOfRange });
        }

        if let Some(floor) = pursuit.flee_below
            && status.health < floor
        {
            if !fleeing {
                debug!(
                    agent = %agent.name,
                    target = target.id,
                    health = status.health,
                    "combat.flee"
                );
                fleeing = true;
            }
            agent
                .api
                .set_goal(away_from(
                    status.position,
                    target.position,
                    agent.tuning.flee_distance,
                ))
                .await
                .failed(|| "I can't get away".to_string())?;
            continue;
        }

        if distance <= agent.tuning.melee_range {
            let _ = agent
                .api
                .look_at(target.position.offset(0.0, target.height, 0.0))
                .await;
            agent
                .api
                .attack(target.id)
                .await
                .failed(|| format!("Failed to attack {}", target.label()))?;
        } else {
            agent
                .api
                .set_goal(Goal::Near {
                    pos: target.position,
                    range: agent.tuning.melee_range - 1.0,
                })
                .await
                .failed(|| "I can't reach my target".to_string())?;
        }
    }
}

fn describe_end(name: &str, end: PursuitEnd) -> String {
    match end {
        PursuitEnd::TargetLost => format!("Finished attacking {name}"),
        PursuitEnd::OutOfRange => format!("{name} got away"),
        PursuitEnd::Fled => format!("Escaped from {name}"),
        PursuitEnd::Ceiling => format!("Stopped attacking {name}"),
    }
}

fn start_pursuit(agent: &Arc<AgentLoop>, to: &Recipient, target: u32, name: String) {
    let fighter = Arc::clone(agent);
    let done_to = to.clone();
    let pursuit = Pursuit {
        target,
        flee_below: None,
        ceiling: agent.tuning.combat_ceiling(),
    };
    spawn_continuous(agent, Concern::Combat, to.clone(), async move {
        let end = pursue(&fighter, pursuit).await?;
        fighter.report(&done_to, describe_end(&name, end)).await;
        Ok(())
    });
}

/// Attacks the nearest non-player entity named `entity` within the attack radius.
pub async fn attack(
    agent: &Arc<AgentLoop>,
    to: &Recipient,
    entity: &str,
) -> Result<(), ActionError> {
    let here = me(agent).await?.position;
    let entities = agent
        .api
        .entities()
        .await
        .failed(|| "I can't look around".to_string())?;
    let target = nearest_entity(entities, here, agent.tuning.attack_radius, |e| {
        e.kind != EntityKind::Player && e.name == entity
    })
    .ok_or_else(|| ActionError::resolution(format!("No {entity} found nearby to attack.")))?;

    agent
        .report(to, format!("Attacking nearest {entity}"))
        .await;
    start_pursuit(agent, to, target.id, entity.to_string());
    Ok(())
}

pub async fn attack_player(
    agent: &Arc<AgentLoop>,
    to: &Recipient,
    player: &str,
) -> Result<(), ActionError> {
    let target = locate_player(agent, player).await?;
    agent
        .report(to, format!("Attacking player: {player}"))
        .await;
    start_pursuit(agent, to, target.id, player.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testkit::{FakeLlm, FakeWorld, agent_with, mob, player};

    fn alex() -> Recipient {
        Recipient::Player("Alex".to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_target_stops_at_the_ceiling() {
        let world = FakeWorld::new("Andy");
        world.set_auto_arrive(false);
        world.set_entities(vec![mob(7, "zombie", Vec3::new(10.0, 64.0, 0.0))]);
        let agent = agent_with(world.clone(), FakeLlm::new(Vec::<&str>::new()), |_| {});

        let started = Instant::now();
        let end = pursue(
            &agent,
            Pursuit {
                target: 7,
                flee_below: None,
                ceiling: Duration::from_secs(30),
            },
        )
        .await
        .unwrap();

        assert_eq!(end, PursuitEnd::Ceiling);
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(31));
        assert!(world.calls().iter().all(|c| !c.starts_with("attack")));
        assert_eq!(world.calls().last().map(String::as_str), Some("clear_goal"));
    }

    #[tokio::test(start_paused = true)]
    async fn strikes_in_melee_range_until_the_target_is_gone() {
        let world = FakeWorld::new("Andy");
        world.set_entities(vec![mob(7, "zombie", Vec3::new(2.0, 64.0, 0.0))]);
        let agent = agent_with(world.clone(), FakeLlm::new(Vec::<&str>::new()), |_| {});

        attack(&agent, &alex(), "zombie").await.unwrap();
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(world.calls().contains(&"attack 7".to_string()));

        world.set_entities(vec![]);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!agent.session.state().is_active(Concern::Combat));
        assert!(
            world
                .whispers_to("Alex")
                .contains(&"Finished attacking zombie".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn flees_below_the_floor() {
        let world = FakeWorld::new("Andy");
        world.set_auto_arrive(false);
        world.set_health(3.0);
        world.set_entities(vec![mob(7, "zombie", Vec3::new(2.0, 64.0, 0.0))]);
        let agent = agent_with(world.clone(), FakeLlm::new(Vec::<&str>::new()), |_| {});

        let fight = pursue(
            &agent,
            Pursuit {
                target: 7,
                flee_below: Some(6.0),
                ceiling: Duration::from_secs(2),
            },
        )
        .await
        .unwrap();

        assert_eq!(fight, PursuitEnd::Ceiling);
        assert!(world.calls().iter().all(|c| !c.starts_with("attack")));
        assert!(world.calls().contains(&"set_goal xz -16.0,0.0".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn a_rejected_strike_still_clears_the_goal() {
        let world = FakeWorld::new("Andy");
        world.set_entities(vec![mob(7, "zombie", Vec3::new(2.0, 64.0, 0.0))]);
        world.reject("attack", "not allowed");
        let agent = agent_with(world.clone(), FakeLlm::new(Vec::<&str>::new()), |_| {});

        let err = pursue(
            &agent,
            Pursuit {
                target: 7,
                flee_below: None,
                ceiling: Duration::from_secs(30),
            },
        )
        .await
        .unwrap_err();

        assert!(err.to_string().starts_with("Failed to attack"));
        assert!(err.to_string().ends_with("not allowed"));
        assert_eq!(world.calls().last().map(String::as_str), Some("clear_goal"));
    }

    #[tokio::test]
    async fn attack_ignores_players_and_distant_mobs() {
        let world = FakeWorld::new("Andy");
        world.set_entities(vec![
            player(2, "zombie", Vec3::new(1.0, 64.0, 0.0)),
            mob(7, "zombie", Vec3::new(30.0, 64.0, 0.0)),
        ]);
        let agent = agent_with(world, FakeLlm::new(Vec::<&str>::new()), |_| {});

        let err = attack(&agent, &alex(), "zombie").await.unwrap_err();
        assert_eq!(err.to_string(), "No zombie found nearby to attack.");
    }
}
