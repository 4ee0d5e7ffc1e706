use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::{block_at, go, held, holdings, me, nearest_block, spawn_continuous};
use crate::agent::game_api::{BlockMatcher, EquipSlot, Face, Goal};
use crate::agent::observation::BlockPos;
use crate::agent::r#loop::{AgentLoop, Recipient};
use crate::agent::session::Concern;
use crate::error::{ActionError, FailedContext};

const FLUIDS: [&str; 2] = ["water", "lava"];
const BED_COLORS: [&str; 16] = [
    "white", "orange", "magenta", "light_blue", "yellow", "lime", "pink", "gray", "light_gray",
    "cyan", "purple", "blue", "brown", "green", "red", "black",
];

fn beds() -> BlockMatcher {
    let mut names: Vec<String> = BED_COLORS.iter().map(|c| format!("{c}_bed")).collect();
    names.push("bed".to_string());
    BlockMatcher::Names(names)
}

pub async fn collect_blocks(
    agent: &Arc<AgentLoop>,
    to: &Recipient,
    block: &str,
    count: u32,
) -> Result<(), ActionError> {
    agent
        .report(to, format!("Collecting {count} {block} blocks"))
        .await;
    let info = agent
        .data
        .block_by_name(block)
        .ok_or_else(|| ActionError::resolution(format!("Unknown block type: {block}")))?;

    let worker = Arc::clone(agent);
    let block = block.to_string();
    let done_to = to.clone();
    spawn_continuous(agent, Concern::Work, to.clone(), async move {
        let agent = worker.as_ref();
        let mut collected = 0;
        while collected < count {
            let found = nearest_block(
                agent,
                BlockMatcher::Ids(vec![info.id]),
                agent.tuning.collect_search_radius,
            )
            .await?;
            let Some(target) = found else {
                return Err(ActionError::resolution(format!(
                    "No more {block} blocks found nearby"
                )));
            };
            go(agent, Goal::Block { pos: target.position }).await?;
            agent
                .api
                .dig(target.position)
                .await
                .failed(|| format!("Failed to collect {block}"))?;
            collected += 1;
            debug!(agent = %agent.name, block = %block, collected, "collect.dug");
            tokio::time::sleep(agent.tuning.dig_pause()).await;
        }
        agent
            .report(&done_to, format!("Finished collecting {collected} {block}"))
            .await;
        Ok(())
    });
    Ok(())
}

pub async fn dig_down(
    agent: &Arc<AgentLoop>,
    to: &Recipient,
    count: u32,
) -> Result<(), ActionError> {
    agent
        .report(to, format!("Digging down {count} blocks"))
        .await;

    let worker = Arc::clone(agent);
    let done_to = to.clone();
    spawn_continuous(agent, Concern::Work, to.clone(), async move {
        let agent = worker.as_ref();
        for _ in 0..count {
            let feet = me(agent).await?.position.floored();
            let below = feet.offset(0, -1, 0);
            let Some(floor) = block_at(agent, below).await? else {
                return Err(ActionError::resolution("Nothing to dig below"));
            };
            if FLUIDS.contains(&floor.name.as_str()) {
                return Err(ActionError::resolution(format!(
                    "Stopped digging - found {}",
                    floor.name
                )));
            }
            let drop = feet.offset(0, -agent.tuning.dig_safe_drop, 0);
            if block_at(agent, drop).await?.is_none() {
                return Err(ActionError::resolution(
                    "Stopped digging - dangerous fall detected",
                ));
            }
            agent
                .api
                .dig(below)
                .await
                .failed(|| "Failed to dig".to_string())?;
            tokio::time::sleep(agent.tuning.dig_pause()).await;
        }
        agent
            .report(&done_to, format!("Finished digging down {count} blocks"))
            .await;
        Ok(())
    });
    Ok(())
}

/// Places `item` against the first solid neighbour within the place radius that has an open
/// face.
pub async fn place_here(agent: &AgentLoop, to: &Recipient, item: &str) -> Result<(), ActionError> {
    let inventory = holdings(agent).await?;
    let Some((id, _)) = held(&inventory, item) else {
        return Err(ActionError::resolution(format!("Don't have {item} to place")));
    };
    agent
        .report(to, format!("Searching for a valid spot to place {item} nearby..."))
        .await;
    agent
        .api
        .equip(id, EquipSlot::Hand)
        .await
        .failed(|| format!("Failed to equip {item}"))?;

    let feet = me(agent).await?.position.floored();
    let radius = agent.tuning.place_radius;
    let reach = radius + 1;
    let solid: HashMap<BlockPos, String> = agent
        .api
        .blocks_in_box(feet.offset(-reach, -2, -reach), feet.offset(reach, 2, reach))
        .await
        .failed(|| "I can't see the blocks around me".to_string())?
        .into_iter()
        .map(|b| (b.position, b.name))
        .collect();
    let body = [feet, feet.offset(0, 1, 0)];

    for dx in -radius..=radius {
        for dy in -1..=1 {
            for dz in -radius..=radius {
                let reference = feet.offset(dx, dy, dz);
                match solid.get(&reference) {
                    Some(name) if !FLUIDS.contains(&name.as_str()) => {}
                    _ => continue,
                }
                for face in Face::ALL {
                    let (fx, fy, fz) = face.offset();
                    let target = reference.offset(fx, fy, fz);
                    if solid.contains_key(&target) || body.contains(&target) {
                        continue;
                    }
                    match agent.api.place_block(reference, face).await {
                        Ok(()) => {
                            agent
                                .report(to, format!("Placed {item} at {target}"))
                                .await;
                            return Ok(());
                        }
                        Err(err) => {
                            debug!(agent = %agent.name, %reference, ?face, "place.rejected: {err}");
                        }
                    }
                }
            }
        }
    }
    Err(ActionError::resolution(format!(
        "Could not find a valid spot to place {item} nearby."
    )))
}

pub async fn activate(agent: &AgentLoop, to: &Recipient, block: &str) -> Result<(), ActionError> {
    let found = nearest_block(
        agent,
        BlockMatcher::Names(vec![block.to_string()]),
        agent.tuning.fixture_radius,
    )
    .await?
    .ok_or_else(|| ActionError::resolution(format!("No {block} found nearby")))?;
    agent
        .report(to, format!("Activating nearest {block}"))
        .await;
    go(agent, Goal::Block { pos: found.position }).await?;
    agent
        .api
        .activate_block(found.position)
        .await
        .failed(|| format!("Failed to activate {block}"))
}

pub async fn go_to_bed(agent: &AgentLoop, to: &Recipient) -> Result<(), ActionError> {
    agent.report(to, "Going to bed").await;
    let bed = nearest_block(agent, beds(), agent.tuning.bed_radius)
        .await?
        .ok_or_else(|| ActionError::resolution("No bed found nearby"))?;
    go(agent, Goal::Block { pos: bed.position }).await?;
    agent
        .api
        .sleep_in(bed.position)
        .await
        .failed(|| "Failed to sleep".to_string())?;
    agent.report(to, "Sleeping in bed").await;
    Ok(())
}

pub async fn start_conversation(
    agent: &AgentLoop,
    to: &Recipient,
    player: &str,
    message: &str,
) -> Result<(), ActionError> {
    agent
        .report(to, format!("Starting conversation with {player}: {message}"))
        .await;
    agent
        .api
        .whisper(player.to_string(), message.to_string())
        .await
        .failed(|| format!("Failed to message {player}"))
}
