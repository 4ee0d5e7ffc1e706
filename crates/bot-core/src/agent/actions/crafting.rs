use std::collections::HashMap;

use tracing::debug;

use super::{close_window, held, holdings, nearby_fixture};
use crate::agent::game_api::FurnaceSlot;
use crate::agent::observation::ItemStack;
use crate::agent::r#loop::{AgentLoop, Recipient};
use crate::error::{ActionError, FailedContext};
use crate::world::recipe::Recipe;

const CRAFTING_TABLES: [&str; 1] = ["crafting_table"];
const FURNACES: [&str; 2] = ["furnace", "blast_furnace"];
const FUELS: [&str; 3] = ["coal", "charcoal", "coal_block"];

/// Clears the per-agent crafting flag when the craft ends, however it ends.
struct CraftingGuard<'a> {
    agent: &'a AgentLoop,
}

impl<'a> CraftingGuard<'a> {
    fn acquire(agent: &'a AgentLoop) -> Option<Self> {
        let mut state = agent.session.state();
        if state.crafting {
            return None;
        }
        state.crafting = true;
        Some(Self { agent })
    }
}

impl Drop for CraftingGuard<'_> {
    fn drop(&mut self) {
        self.agent.session.state().crafting = false;
    }
}

fn counts_by_id(items: &[ItemStack]) -> HashMap<u32, u32> {
    let mut counts = HashMap::new();
    for item in items {
        *counts.entry(item.id).or_insert(0) += item.count;
    }
    counts
}

pub async fn craft_recipe(
    agent: &AgentLoop,
    to: &Recipient,
    item: &str,
    amount: u32,
) -> Result<(), ActionError> {
    let info = agent
        .data
        .item_by_name(item)
        .ok_or_else(|| ActionError::resolution(format!("Unknown item: {item}")))?;
    let Some(_guard) = CraftingGuard::acquire(agent) else {
        return Err(ActionError::resolution(
            "Already crafting something, wait a moment",
        ));
    };

    let recipes: Vec<Recipe> = agent
        .data
        .recipes_for(info.id)
        .iter()
        .map(Recipe::normalize)
        .collect();
    let Some(recipe) = recipes
        .iter()
        .find(|r| !r.requires_table)
        .or_else(|| recipes.first())
        .cloned()
    else {
        return Err(ActionError::resolution(format!("No recipe found to craft {item}")));
    };

    let table = if recipe.requires_table {
        let found = nearby_fixture(agent, &CRAFTING_TABLES).await?;
        let Some(table) = found else {
            return Err(ActionError::resolution(format!(
                "Recipe for {item} requires a crafting table but none is nearby"
            )));
        };
        Some(table.position)
    } else {
        None
    };

    agent
        .report(to, format!("Attempting to craft {amount} {item}"))
        .await;

    let held = counts_by_id(&holdings(agent).await?);
    let craftable = recipe.max_crafts(&held).unwrap_or(amount);
    if craftable == 0 {
        let missing: Vec<String> = recipe
            .shortfalls(&held)
            .iter()
            .map(|s| {
                format!(
                    "{}: need {}, have {}",
                    agent.data.item_name(s.id),
                    s.need,
                    s.have
                )
            })
            .collect();
        return Err(ActionError::resolution(format!(
            "You do not have the resources to craft {item}. Missing: {}",
            missing.join(", ")
        )));
    }

    let count = amount.min(craftable);
    debug!(agent = %agent.name, item, count, table = table.is_some(), "crafting.start");
    agent
        .api
        .craft(recipe, count, table)
        .await
        .failed(|| format!("Failed to craft {item}"))?;
    agent
        .report(to, format!("Successfully crafted {count} {item}"))
        .await;
    Ok(())
}

pub async fn smelt_item(
    agent: &AgentLoop,
    to: &Recipient,
    item: &str,
    amount: u32,
) -> Result<(), ActionError> {
    let furnace = nearby_fixture(agent, &FURNACES)
        .await?
        .ok_or_else(|| ActionError::resolution("No furnace found nearby"))?;
    let inventory = holdings(agent).await?;
    let (input_id, have) = held(&inventory, item).unwrap_or((0, 0));
    if have < amount {
        return Err(ActionError::resolution(format!("Don't have enough {item} to smelt")));
    }
    let Some((fuel_id, fuel_have)) = FUELS.iter().find_map(|f| held(&inventory, f)) else {
        return Err(ActionError::resolution("No fuel available for smelting"));
    };

    let window = agent
        .api
        .open_furnace(furnace.position)
        .await
        .failed(|| "Failed to open furnace".to_string())?;
    let loaded = async {
        agent
            .api
            .furnace_put(window.id, FurnaceSlot::Input, input_id, amount)
            .await
            .failed(|| format!("Failed to smelt {item}"))?;
        // One piece of coal smelts eight items.
        let fuel = amount.div_ceil(8).min(fuel_have).max(1);
        agent
            .api
            .furnace_put(window.id, FurnaceSlot::Fuel, fuel_id, fuel)
            .await
            .failed(|| "Failed to add fuel".to_string())
    }
    .await;
    close_window(agent, window.id).await;
    loaded?;

    agent
        .report(to, format!("Started smelting {amount} {item}"))
        .await;
    Ok(())
}

pub async fn clear_furnace(agent: &AgentLoop, to: &Recipient) -> Result<(), ActionError> {
    let furnace = nearby_fixture(agent, &FURNACES)
        .await?
        .ok_or_else(|| ActionError::resolution("No furnace found nearby"))?;
    let window = agent
        .api
        .open_furnace(furnace.position)
        .await
        .failed(|| "Failed to open furnace".to_string())?;

    let mut failure = None;
    for slot in [FurnaceSlot::Output, FurnaceSlot::Fuel, FurnaceSlot::Input] {
        if let Err(err) = agent.api.furnace_take(window.id, slot).await {
            failure = Some(ActionError::rejected("Failed to clear furnace", err));
            break;
        }
    }
    close_window(agent, window.id).await;
    if let Some(err) = failure {
        return Err(err);
    }

    agent.report(to, "Cleared all items from furnace").await;
    Ok(())
}
