use std::sync::Arc;

use tokio::sync::oneshot;

use super::actions::chest;
use super::r#loop::{AgentLoop, Recipient};
use super::observation::{BlockPos, MAX_FOOD, MAX_HEALTH};
use super::session::ContainerOp;
use crate::error::WorldError;

/// Appended to every non-empty query result.
pub const INTERNAL_NOTE: &str =
    "Since user cannot see this message, in my next response I will give an overview of this.";

pub fn with_note(body: &str) -> String {
    format!("{body}. {INTERNAL_NOTE}")
}

fn unreadable(what: &str, err: WorldError) -> String {
    format!("Could not read {what}: {err}")
}

/// Resolves one query command against live world state. `None` for names outside the
/// query vocabulary.
pub async fn resolve(agent: &Arc<AgentLoop>, name: &str) -> Option<String> {
    let text = match name {
        "stats" => stats(agent).await,
        "inventory" => inventory(agent).await,
        "nearbyBlocks" => nearby_blocks(agent).await,
        "entities" => entities(agent).await,
        "savedPlaces" => saved_places(agent),
        "viewChest" => view_chest(agent).await,
        _ => return None,
    };
    Some(text)
}

async fn stats(agent: &AgentLoop) -> String {
    match agent.api.status().await {
        Ok(s) => with_note(&format!(
            "Location: {:.1},{:.1},{:.1} | Health: {}/{} | Hunger: {}/{} | Time: {}",
            s.position.x,
            s.position.y,
            s.position.z,
            s.health,
            MAX_HEALTH,
            s.food,
            MAX_FOOD,
            s.time_of_day
        )),
        Err(err) => unreadable("stats", err),
    }
}

async fn inventory(agent: &AgentLoop) -> String {
    match agent.api.inventory().await {
        Ok(items) if items.is_empty() => "Empty".to_string(),
        Ok(items) => {
            let listed: Vec<String> = items
                .iter()
                .map(|i| format!("{} x{}", i.name, i.count))
                .collect();
            with_note(&listed.join(", "))
        }
        Err(err) => unreadable("inventory", err),
    }
}

/// Distinct block names within 3 blocks horizontally and 2 vertically.
async fn nearby_blocks(agent: &AgentLoop) -> String {
    let center = match agent.api.status().await {
        Ok(s) => s.position.floored(),
        Err(err) => return unreadable("surroundings", err),
    };
    let (min, max) = scan_box(center);
    let blocks = match agent.api.blocks_in_box(min, max).await {
        Ok(blocks) => blocks,
        Err(err) => return unreadable("surroundings", err),
    };

    let mut names: Vec<&str> = Vec::new();
    for block in &blocks {
        if !names.contains(&block.name.as_str()) {
            names.push(&block.name);
        }
    }
    if names.is_empty() {
        "None nearby".to_string()
    } else {
        with_note(&names.join(", "))
    }
}

async fn entities(agent: &AgentLoop) -> String {
    match agent.api.entities().await {
        Ok(entities) => {
            let players: Vec<&str> = entities
                .iter()
                .filter_map(|e| e.username.as_deref())
                .filter(|name| *name != agent.name)
                .collect();
            if players.is_empty() {
                "No players nearby".to_string()
            } else {
                with_note(&players.join(", "))
            }
        }
        Err(err) => unreadable("entities", err),
    }
}

fn saved_places(agent: &AgentLoop) -> String {
    let state = agent.session.state();
    if state.saved_places.is_empty() {
        return "No saved places".to_string();
    }
    let listed: Vec<String> = state
        .saved_places
        .iter()
        .map(|(name, p)| format!("{name}: {:.1}, {:.1}, {:.1}", p.x, p.y, p.z))
        .collect();
    with_note(&listed.join(" | "))
}

/// Goes through the container queue so it never overlaps a deposit or withdraw.
async fn view_chest(agent: &Arc<AgentLoop>) -> String {
    let (tx, rx) = oneshot::channel();
    chest::request(agent, ContainerOp::View(tx), Recipient::Everyone);
    rx.await
        .unwrap_or_else(|_| "Cannot access chest".to_string())
}

fn scan_box(center: BlockPos) -> (BlockPos, BlockPos) {
    (center.offset(-3, -2, -3), center.offset(3, 2, 3))
}
